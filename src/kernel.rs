//! In-process event kernel standing in for an HDL simulator.
//!
//! Region order within one time step:
//! 1. timer callbacks due now,
//! 2. delta loop: value-change callbacks, then device evaluation, then read-write sync,
//!    repeated until nothing changes,
//! 3. read-only sync, where writes are refused,
//! 4. advance to the next timer.
//!
//! A task woken by a clock edge runs in (2) before the device evaluates, so it still sees the
//! pre-edge outputs, and an input it writes there is latched by that same edge.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use intmap::IntMap;
use tracing::{trace, warn};

use crate::config::TbConfig;
use crate::device::{Device, PortDecl, PortDir, Pins};
use crate::error::{ProtocolViolation, SetupError, TimingKind, TimingViolation};
use crate::signal::ObjectKind;
use crate::sim_if::{SimCallback, SimIf};
use crate::trigger::{self, EdgeKind};
use crate::TbResult;

const ROOT: usize = 0;
const MAX_DELTAS: usize = 10_000;

thread_local! {
    static KERNEL: RefCell<Option<Kernel>> = const { RefCell::new(None) };
}

pub(crate) fn with<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    KERNEL.with(|k| {
        let mut slot = k.borrow_mut();
        let kernel = slot
            .as_mut()
            .expect("No simulation is running on this thread.");
        f(kernel)
    })
}

/// Like [`with`], but gives up quietly when no kernel is reachable. Used from `Drop` impls.
pub(crate) fn try_with<R>(f: impl FnOnce(&mut Kernel) -> R) -> Option<R> {
    KERNEL
        .try_with(|k| {
            let mut slot = k.try_borrow_mut().ok()?;
            slot.as_mut().map(f)
        })
        .ok()
        .flatten()
}

pub(crate) fn install(kernel: Kernel) -> TbResult<()> {
    KERNEL.with(|k| {
        let mut slot = k.borrow_mut();
        if slot.is_some() {
            return Err(SetupError::AlreadyRunning.into());
        }
        *slot = Some(kernel);
        Ok(())
    })
}

pub(crate) fn uninstall() -> Option<Kernel> {
    KERNEL.with(|k| k.borrow_mut().take())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Active,
    ReadOnly,
}

enum CbKind {
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

struct Object {
    name: String,
    kind: ObjectKind,
    dir: PortDir,
    value: u32,
    forced: bool,
    last_change: Option<u64>,
}

impl Object {
    fn scope(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ObjectKind::Hier,
            dir: PortDir::Input,
            value: 0,
            forced: false,
            last_change: None,
        }
    }

    fn port(scope: &str, decl: &PortDecl) -> Self {
        Self {
            name: format!("{}.{}", scope, decl.name),
            kind: ObjectKind::Bits(decl.width),
            dir: decl.dir,
            value: 0,
            forced: false,
            last_change: None,
        }
    }

    fn mask(&self) -> u32 {
        match self.kind {
            ObjectKind::Bits(w) if w < 32 => (1 << w) - 1,
            _ => u32::MAX,
        }
    }
}

struct EdgeWatch {
    cb_hdl: usize,
    snapshot: u32,
}

struct SetupCheck {
    data: usize,
    clk: usize,
    window: u64,
    last_clk: bool,
    last_rise: Option<u64>,
}

pub(crate) enum Advance {
    Next,
    Idle,
    Finished,
    Timeout,
}

pub(crate) struct Kernel {
    time: u64,
    precision: i8,
    max_time: u64,
    objects: Vec<Object>,
    names: HashMap<String, usize>,
    device: Box<dyn Device>,
    callbacks: IntMap<CbKind>,
    next_cb: usize,
    timers: BTreeMap<u64, usize>,
    edges: IntMap<EdgeWatch>,
    read_write: Option<usize>,
    read_only: Option<usize>,
    region: Region,
    finished: bool,
    checks: Vec<SetupCheck>,
    violations: Vec<TimingViolation>,
}

impl Kernel {
    pub(crate) fn new(device: Box<dyn Device>, config: &TbConfig) -> TbResult<Self> {
        let scope = device.name().to_string();
        let mut objects = vec![Object::scope(&scope)];
        let mut names = HashMap::new();
        names.insert(scope.clone(), ROOT);
        for decl in device.ports() {
            let obj = Object::port(&scope, decl);
            names.insert(obj.name.clone(), objects.len());
            objects.push(obj);
        }
        Ok(Self {
            time: 0,
            precision: config.precision,
            max_time: config.max_sim_steps()?,
            objects,
            names,
            device,
            callbacks: IntMap::new(),
            next_cb: 0,
            timers: BTreeMap::new(),
            edges: IntMap::new(),
            read_write: None,
            read_only: None,
            region: Region::Active,
            finished: false,
            checks: Vec::new(),
            violations: Vec::new(),
        })
    }

    pub(crate) fn into_violations(self) -> Vec<TimingViolation> {
        self.violations
    }

    fn signal(&self, handle: usize) -> TbResult<&Object> {
        let obj = self
            .objects
            .get(handle)
            .ok_or(SetupError::UnknownHandle(handle))?;
        match obj.kind {
            ObjectKind::Hier => Err(SetupError::NotASignal(obj.name.clone()).into()),
            ObjectKind::Bits(_) => Ok(obj),
        }
    }

    fn due_timer(&mut self) -> Option<u64> {
        let (&t, &cb_hdl) = self.timers.first_key_value()?;
        if t != self.time {
            return None;
        }
        self.timers.remove(&t);
        self.callbacks.remove(cb_hdl as u64);
        Some(t)
    }

    // Watched signals whose value moved away from the snapshot taken at registration.
    fn take_changes(&mut self) -> Vec<(usize, EdgeKind)> {
        let mut changed = Vec::new();
        for (sig, watch) in self.edges.iter() {
            let obj = &self.objects[*sig as usize];
            if obj.value != watch.snapshot {
                let edge = match (obj.kind, watch.snapshot, obj.value) {
                    (ObjectKind::Bits(1), 0, 1) => EdgeKind::Rising,
                    (ObjectKind::Bits(1), 1, 0) => EdgeKind::Falling,
                    _ => EdgeKind::Any,
                };
                changed.push((*sig as usize, edge));
            }
        }
        for (sig, _) in &changed {
            if let Some(watch) = self.edges.remove(*sig as u64) {
                self.callbacks.remove(watch.cb_hdl as u64);
            }
        }
        changed
    }

    fn eval_device(&mut self) -> bool {
        self.check_setup();
        let mut values: Vec<u32> = self.objects[1..].iter().map(|o| o.value).collect();
        self.device.eval(&mut Pins::new(&mut values));

        let mut changed = false;
        for (obj, value) in self.objects[1..].iter_mut().zip(values) {
            if obj.dir != PortDir::Output || obj.forced {
                continue;
            }
            let value = value & obj.mask();
            if obj.value != value {
                obj.value = value;
                obj.last_change = Some(self.time);
                changed = true;
            }
        }
        changed
    }

    fn check_setup(&mut self) {
        for check in self.checks.iter_mut() {
            let clk = self.objects[check.clk].value & 1 == 1;
            if clk && !check.last_clk {
                let data = &self.objects[check.data];
                if let Some(changed_at) = data.last_change {
                    let distance = self.time - changed_at;
                    if distance < check.window {
                        let v = TimingViolation {
                            kind: TimingKind::Setup,
                            signal: data.name.clone(),
                            time: self.time,
                            distance,
                        };
                        warn!("{}", v);
                        self.violations.push(v);
                    }
                }
                check.last_rise = Some(self.time);
            }
            check.last_clk = clk;
        }
    }

    fn check_hold(&mut self, handle: usize) {
        for check in self.checks.iter().filter(|c| c.data == handle) {
            if check.last_rise == Some(self.time) {
                let v = TimingViolation {
                    kind: TimingKind::Hold,
                    signal: self.objects[handle].name.clone(),
                    time: self.time,
                    distance: 0,
                };
                warn!("{}", v);
                self.violations.push(v);
            }
        }
    }

    fn take_read_write(&mut self) -> bool {
        match self.read_write.take() {
            Some(cb_hdl) => {
                self.callbacks.remove(cb_hdl as u64);
                true
            }
            None => false,
        }
    }

    fn enter_read_only(&mut self) -> bool {
        match self.read_only.take() {
            Some(cb_hdl) => {
                self.callbacks.remove(cb_hdl as u64);
                self.region = Region::ReadOnly;
                true
            }
            None => false,
        }
    }

    fn leave_read_only(&mut self) {
        self.region = Region::Active;
    }

    fn advance(&mut self) -> Advance {
        if self.finished {
            return Advance::Finished;
        }
        match self.timers.keys().next() {
            Some(&t) if t > self.max_time => Advance::Timeout,
            Some(&t) => {
                self.time = t;
                Advance::Next
            }
            None => Advance::Idle,
        }
    }

    fn new_cb_hdl(&mut self) -> usize {
        let hdl = self.next_cb;
        self.next_cb += 1;
        hdl
    }
}

impl SimIf for Kernel {
    fn set_value(&mut self, handle: usize, value: u32, force: bool) -> TbResult<()> {
        self.signal(handle)?;
        if self.region == Region::ReadOnly {
            return Err(ProtocolViolation::WriteInReadOnly {
                signal: self.objects[handle].name.clone(),
                time: self.time,
            }
            .into());
        }
        let time = self.time;
        let obj = &mut self.objects[handle];
        if obj.forced && !force {
            return Ok(());
        }
        obj.forced |= force;
        let value = value & obj.mask();
        if obj.value != value {
            obj.value = value;
            obj.last_change = Some(time);
            self.check_hold(handle);
        }
        Ok(())
    }

    fn release(&mut self, handle: usize) -> TbResult<()> {
        self.signal(handle)?;
        self.objects[handle].forced = false;
        Ok(())
    }

    fn get_value(&self, handle: usize) -> TbResult<u32> {
        Ok(self.signal(handle)?.value)
    }

    fn get_handle_by_name(&self, name: &str) -> TbResult<usize> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| SetupError::UnknownSignal(name.to_string()).into())
    }

    fn get_full_name(&self, handle: usize) -> TbResult<String> {
        self.objects
            .get(handle)
            .map(|o| o.name.clone())
            .ok_or_else(|| SetupError::UnknownHandle(handle).into())
    }

    fn get_kind(&self, handle: usize) -> TbResult<ObjectKind> {
        self.objects
            .get(handle)
            .map(|o| o.kind)
            .ok_or_else(|| SetupError::UnknownHandle(handle).into())
    }

    fn get_root_handle(&self) -> usize {
        ROOT
    }

    fn get_sim_time_steps(&self) -> u64 {
        self.time
    }

    fn get_sim_precision(&self) -> i8 {
        self.precision
    }

    fn register_callback(&mut self, cb: SimCallback) -> TbResult<usize> {
        let cb_hdl = self.new_cb_hdl();
        let kind = match cb {
            SimCallback::Time(t) => {
                let t_abs = self.time + t;
                if self.timers.contains_key(&t_abs) {
                    return Err(SetupError::DuplicateCallback(format!("t={}", t_abs)).into());
                }
                self.timers.insert(t_abs, cb_hdl);
                CbKind::Time(t_abs)
            }
            SimCallback::Edge(sig) => {
                let snapshot = self.signal(sig)?.value;
                if self.edges.contains_key(sig as u64) {
                    return Err(SetupError::DuplicateCallback(self.objects[sig].name.clone()).into());
                }
                self.edges.insert(sig as u64, EdgeWatch { cb_hdl, snapshot });
                CbKind::Edge(sig)
            }
            SimCallback::ReadWrite => {
                if self.read_write.replace(cb_hdl).is_some() {
                    return Err(SetupError::DuplicateCallback("read-write".to_string()).into());
                }
                CbKind::ReadWrite
            }
            SimCallback::ReadOnly => {
                if self.read_only.replace(cb_hdl).is_some() {
                    return Err(SetupError::DuplicateCallback("read-only".to_string()).into());
                }
                CbKind::ReadOnly
            }
        };
        self.callbacks.insert(cb_hdl as u64, kind);
        Ok(cb_hdl)
    }

    fn cancel_callback(&mut self, cb_hdl: usize) -> TbResult<()> {
        let Some(cb) = self.callbacks.remove(cb_hdl as u64) else {
            // already fired
            return Ok(());
        };
        match cb {
            CbKind::Time(t_abs) => {
                self.timers.remove(&t_abs);
            }
            CbKind::Edge(sig) => {
                self.edges.remove(sig as u64);
            }
            CbKind::ReadWrite => self.read_write = None,
            CbKind::ReadOnly => self.read_only = None,
        }
        Ok(())
    }

    fn add_setup_check(&mut self, data: usize, clk: usize, window: u64) -> TbResult<()> {
        self.signal(data)?;
        let last_clk = self.signal(clk)?.value & 1 == 1;
        self.checks.push(SetupCheck {
            data,
            clk,
            window,
            last_clk,
            last_rise: None,
        });
        Ok(())
    }

    fn timing_violations(&self) -> &[TimingViolation] {
        &self.violations
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

/// Runs the installed kernel until the test finishes, events run out or time runs out.
pub(crate) fn run_sim() -> TbResult<()> {
    loop {
        if let Some(t) = with(|k| k.due_timer()) {
            trigger::react(SimCallback::Time(t), None);
        }
        settle()?;
        while with(|k| k.enter_read_only()) {
            trigger::react(SimCallback::ReadOnly, None);
            with(|k| k.leave_read_only());
        }
        match with(|k| k.advance()) {
            Advance::Next => {}
            Advance::Finished | Advance::Idle => return Ok(()),
            Advance::Timeout => {
                return Err(with(|k| SetupError::Timeout {
                    time: k.time,
                    limit: k.max_time,
                })
                .into())
            }
        }
    }
}

fn settle() -> TbResult<()> {
    for _ in 0..MAX_DELTAS {
        let changes = with(|k| k.take_changes());
        if !changes.is_empty() {
            for (sig, edge) in changes {
                trace!(sig, ?edge, "value change");
                trigger::react(SimCallback::Edge(sig), Some(edge));
            }
            continue;
        }
        if with(|k| k.eval_device()) {
            continue;
        }
        if with(|k| k.take_read_write()) {
            trigger::react(SimCallback::ReadWrite, None);
            continue;
        }
        return Ok(());
    }
    Err(with(|k| SetupError::DeltaOverflow { time: k.time }).into())
}
