use crate::error::SetupError;
use crate::sim_if;
use crate::trigger::Trigger;
use crate::value::Val;
use crate::TbResult;

/// Handle to a scope or signal of the simulated design.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Bits(u8),
    Hier,
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> String {
        sim_if::with(|s| s.get_full_name(self.handle)).unwrap_or_else(|_| format!("<{}>", self.handle))
    }

    pub fn width(&self) -> Option<u8> {
        match self.kind {
            ObjectKind::Bits(width) => Some(width),
            ObjectKind::Hier => None,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self.kind, ObjectKind::Bits(_))
    }

    pub fn get_child(&self, name: &str) -> TbResult<Self> {
        let mut child_name = self.name();
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&child_name)
    }

    pub fn from_handle(handle: usize) -> TbResult<Self> {
        let kind = sim_if::with(|s| s.get_kind(handle))?;
        Ok(SimObject { handle, kind })
    }

    pub fn from_name(full_name: &str) -> TbResult<Self> {
        let handle = sim_if::with(|s| s.get_handle_by_name(full_name))?;
        SimObject::from_handle(handle)
    }

    pub fn get_root() -> TbResult<Self> {
        SimObject::from_handle(sim_if::with(|s| s.get_root_handle()))
    }

    /// Child lookup for testbench code that treats a missing pin as a bug.
    pub fn c(&self, name: &str) -> Self {
        self.get_child(name)
            .unwrap_or_else(|_| panic!("Could not get object with name {}.{}", self.name(), name))
    }

    pub fn value(&self) -> TbResult<u32> {
        sim_if::with(|s| s.get_value(self.handle))
    }

    pub fn u32(&self) -> u32 {
        self.value()
            .unwrap_or_else(|e| panic!("Could not read {}: {}", self.name(), e))
    }

    pub fn set(&self, val: u32) -> TbResult<()> {
        sim_if::with(|s| s.set_value(self.handle, val, false))
    }

    pub fn force(&self, val: u32) -> TbResult<()> {
        sim_if::with(|s| s.set_value(self.handle, val, true))
    }

    pub fn release(&self) -> TbResult<()> {
        sim_if::with(|s| s.release(self.handle))
    }

    pub fn set_bin(&self, val: &str) -> TbResult<()> {
        // remove '_' and 0b
        let stripped = val.replace("0b", "").replace('_', "");
        let width = self
            .width()
            .ok_or_else(|| SetupError::NotASignal(self.name()))?;
        if stripped.len() != width as usize {
            return Err(SetupError::InvalidConfig {
                key: self.name(),
                value: val.to_string(),
            }
            .into());
        }
        let value = u32::from_str_radix(&stripped, 2).map_err(|_| SetupError::InvalidConfig {
            key: self.name(),
            value: val.to_string(),
        })?;
        self.set(value)
    }

    pub fn bin(&self) -> TbResult<String> {
        let width = self
            .width()
            .ok_or_else(|| SetupError::NotASignal(self.name()))?;
        Ok(format!("{:0width$b}", self.value()?, width = width as usize))
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub async fn rising_edge_ro(self) -> TbResult {
        self.rising_edge().await;
        Trigger::read_only().await;
        Ok(Val::None)
    }
    pub async fn rising_edge_rw(self) -> TbResult {
        self.rising_edge().await;
        Trigger::read_write().await;
        Ok(Val::None)
    }
    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }
    pub fn edge(self) -> Trigger {
        Trigger::edge(self)
    }
}
