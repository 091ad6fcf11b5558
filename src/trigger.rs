use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use intmap::IntMap;

use crate::executor;
use crate::kernel;
use crate::signal::SimObject;
use crate::sim_if::{self, SimCallback};
use crate::value::Val;
use crate::TbResult;

// IntMap specializes on u64 keys and doesn't need to hash them
thread_local! {
    // key is signal handle
    static EDGE_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    // key is absolute callback time
    static TIMER_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    static READ_ONLY: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
    static READ_WRITE: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
}

#[derive(Default)]
struct CallbackHandles {
    handle: Option<usize>,
    waiters: VecDeque<Waiter>,
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

#[derive(Default)]
struct Slot {
    fired: bool,
    // what the callback reported: new signal value or firing time
    value: Val,
    cancelled: bool,
    waker: Option<Waker>,
}

struct Waiter {
    slot: Arc<Mutex<Slot>>,
    // An edge callback fires on any change; the waiter decides whether this edge is its edge.
    edge_kind: EdgeKind,
}

impl Waiter {
    fn is_cancelled(&self) -> bool {
        self.slot.lock().unwrap().cancelled
    }

    fn fire(self, value: &Val) {
        let waker = {
            let mut slot = self.slot.lock().unwrap();
            if slot.cancelled {
                return;
            }
            slot.fired = true;
            slot.value = value.clone();
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

pub(crate) fn cancel_all_triggers() {
    // Take everything out first: dropping waiters drops tasks, whose triggers look at these
    // maps again from their Drop impls.
    let edges = EDGE_MAP.with(|m| std::mem::replace(&mut *m.borrow_mut(), IntMap::new()));
    let timers = TIMER_MAP.with(|m| std::mem::replace(&mut *m.borrow_mut(), IntMap::new()));
    let ro = READ_ONLY.with(|c| std::mem::take(&mut *c.borrow_mut()));
    let rw = READ_WRITE.with(|c| std::mem::take(&mut *c.borrow_mut()));
    drop((edges, timers, ro, rw));
}

#[derive(Clone, Copy, Debug)]
pub enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
    ReadWrite,
    ReadOnly,
}

/// A simulator event a task can await. Completes only once its callback fired; dropping an
/// unfired trigger unregisters it.
///
/// Edges resolve to the signal's new value, timers to the time they fired at.
pub struct Trigger {
    kind: TrigKind,
    // high exec prio currently only implemented for ReadOnly
    high_exec_prio: bool,
    slot: Option<Arc<Mutex<Slot>>>,
    // absolute time of a registered timer
    key: Option<u64>,
}

impl Trigger {
    fn new(kind: TrigKind) -> Self {
        Trigger {
            kind,
            high_exec_prio: false,
            slot: None,
            key: None,
        }
    }
    pub fn timer(time: u64, unit: &str) -> TbResult<Self> {
        let steps = sim_if::with(|s| s.get_sim_steps(time as f64, unit))?;
        Ok(Trigger::timer_steps(steps))
    }
    pub fn timer_steps(steps: u64) -> Self {
        Trigger::new(TrigKind::Timer(steps))
    }
    pub async fn timer_ro(time: u64, unit: &str) -> TbResult {
        Trigger::timer(time, unit)?.await;
        Trigger::read_only().await;
        Ok(Val::None)
    }
    pub async fn timer_rw(time: u64, unit: &str) -> TbResult {
        Trigger::timer(time, unit)?.await;
        Trigger::read_write().await;
        Ok(Val::None)
    }
    pub fn edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }
    pub fn rising_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }
    pub fn falling_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }
    pub fn read_write() -> Self {
        Trigger::new(TrigKind::ReadWrite)
    }
    pub fn read_only() -> Self {
        Trigger::new(TrigKind::ReadOnly)
    }
    pub(crate) fn read_only_prio() -> Self {
        let mut trigger = Trigger::new(TrigKind::ReadOnly);
        trigger.high_exec_prio = true;
        trigger
    }

    pub fn kind(&self) -> TrigKind {
        self.kind
    }

    fn register(&mut self, waiter: Waiter) {
        match self.kind {
            TrigKind::ReadWrite => READ_WRITE.with(|c| {
                let mut c = c.borrow_mut();
                c.waiters.push_back(waiter);
                if c.handle.is_none() {
                    c.handle = Some(register_callback(SimCallback::ReadWrite));
                }
            }),
            TrigKind::ReadOnly => READ_ONLY.with(|c| {
                let mut c = c.borrow_mut();
                match self.high_exec_prio {
                    false => c.waiters.push_back(waiter),
                    true => c.waiters.push_front(waiter),
                }
                if c.handle.is_none() {
                    c.handle = Some(register_callback(SimCallback::ReadOnly));
                }
            }),
            TrigKind::Timer(t) => {
                // the kernel reports absolute time, not the delta
                let t_abs = t + sim_if::now();
                self.key = Some(t_abs);
                TIMER_MAP.with(|m| {
                    let mut m = m.borrow_mut();
                    if let Some(callbacks) = m.get_mut(t_abs) {
                        callbacks.waiters.push_back(waiter);
                    } else {
                        let handle = register_callback(SimCallback::Time(t));
                        let callbacks = CallbackHandles {
                            handle: Some(handle),
                            waiters: VecDeque::from([waiter]),
                        };
                        m.insert(t_abs, callbacks);
                    }
                });
            }
            TrigKind::Edge(sig_hdl, _) => EDGE_MAP.with(|m| {
                let mut m = m.borrow_mut();
                if let Some(callbacks) = m.get_mut(sig_hdl as u64) {
                    callbacks.waiters.push_back(waiter);
                } else {
                    let handle = register_callback(SimCallback::Edge(sig_hdl));
                    let callbacks = CallbackHandles {
                        handle: Some(handle),
                        waiters: VecDeque::from([waiter]),
                    };
                    m.insert(sig_hdl as u64, callbacks);
                }
            }),
        }
    }

    fn unregister(&self, slot: &Arc<Mutex<Slot>>) {
        let remove = |callbacks: &mut CallbackHandles| {
            callbacks.waiters.retain(|w| !Arc::ptr_eq(&w.slot, slot));
            if callbacks.waiters.is_empty() {
                if let Some(handle) = callbacks.handle.take() {
                    kernel::try_with(|k| {
                        let _ = sim_if::SimIf::cancel_callback(k, handle);
                    });
                }
                true
            } else {
                false
            }
        };
        match self.kind {
            TrigKind::ReadWrite => {
                let _ = READ_WRITE.try_with(|c| c.try_borrow_mut().map(|mut c| remove(&mut *c)));
            }
            TrigKind::ReadOnly => {
                let _ = READ_ONLY.try_with(|c| c.try_borrow_mut().map(|mut c| remove(&mut *c)));
            }
            TrigKind::Timer(_) => {
                if let Some(t_abs) = self.key {
                    let _ = TIMER_MAP.try_with(|m| {
                        if let Ok(mut m) = m.try_borrow_mut() {
                            if m.get_mut(t_abs).map(remove).unwrap_or(false) {
                                m.remove(t_abs);
                            }
                        }
                    });
                }
            }
            TrigKind::Edge(sig_hdl, _) => {
                let _ = EDGE_MAP.try_with(|m| {
                    if let Ok(mut m) = m.try_borrow_mut() {
                        if m.get_mut(sig_hdl as u64).map(remove).unwrap_or(false) {
                            m.remove(sig_hdl as u64);
                        }
                    }
                });
            }
        }
    }
}

fn register_callback(cb: SimCallback) -> usize {
    sim_if::with(|s| s.register_callback(cb))
        .unwrap_or_else(|e| panic!("Could not register {:?} callback: {}", cb, e))
}

impl Future for Trigger {
    type Output = Val;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(slot) = &self.slot {
            let mut slot = slot.lock().unwrap();
            if slot.fired {
                return Poll::Ready(std::mem::take(&mut slot.value));
            }
            // polled again without firing, e.g. as the losing side of a select
            slot.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let slot = Arc::new(Mutex::new(Slot {
            waker: Some(cx.waker().clone()),
            ..Default::default()
        }));
        let edge_kind = match self.kind {
            TrigKind::Edge(_, kind) => kind,
            _ => EdgeKind::Any,
        };
        self.register(Waiter {
            slot: slot.clone(),
            edge_kind,
        });
        self.slot = Some(slot);
        Poll::Pending
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            {
                let mut s = slot.lock().unwrap();
                if s.fired {
                    return;
                }
                s.cancelled = true;
                s.waker = None;
            }
            self.unregister(&slot);
        }
    }
}

#[inline]
pub(crate) fn react(cb: SimCallback, edge: Option<EdgeKind>) {
    let wake: VecDeque<Waiter> = match cb {
        SimCallback::ReadWrite => READ_WRITE.with(|c| {
            let mut c = c.borrow_mut();
            c.handle = None; // the callback is done
            std::mem::take(&mut c.waiters)
        }),
        SimCallback::ReadOnly => READ_ONLY.with(|c| {
            let mut c = c.borrow_mut();
            c.handle = None;
            std::mem::take(&mut c.waiters)
        }),
        SimCallback::Time(t) => TIMER_MAP
            .with(|m| m.borrow_mut().remove(t))
            .map(|c| c.waiters)
            .unwrap_or_default(),
        SimCallback::Edge(sig_hdl) => react_edge(sig_hdl, edge.unwrap_or(EdgeKind::Any)),
    };

    let value = match cb {
        SimCallback::Time(t) => Val::Int(t as i64),
        SimCallback::Edge(sig_hdl) => sim_if::with(|s| s.get_value(sig_hdl))
            .map(Val::Bits)
            .unwrap_or_default(),
        SimCallback::ReadWrite | SimCallback::ReadOnly => Val::None,
    };
    for waiter in wake {
        waiter.fire(&value);
    }
    // execute woken tasks
    executor::run_once();
}

fn react_edge(sig_hdl: usize, edge: EdgeKind) -> VecDeque<Waiter> {
    let Some(callbacks) = EDGE_MAP.with(|m| m.borrow_mut().remove(sig_hdl as u64)) else {
        return VecDeque::new();
    };
    let (wake, resched): (VecDeque<Waiter>, VecDeque<Waiter>) = callbacks
        .waiters
        .into_iter()
        .filter(|w| !w.is_cancelled())
        .partition(|w| edge == EdgeKind::Any || w.edge_kind == EdgeKind::Any || w.edge_kind == edge);
    if !resched.is_empty() {
        // waiting for the opposite edge: watch the signal again from its new value
        let handle = register_callback(SimCallback::Edge(sig_hdl));
        EDGE_MAP.with(|m| {
            m.borrow_mut().insert(
                sig_hdl as u64,
                CallbackHandles {
                    handle: Some(handle),
                    waiters: resched,
                },
            )
        });
    }
    wake
}
