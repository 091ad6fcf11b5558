//! Stimulus/sample driver.
//!
//! One rule, enforced here rather than left to each test: the input is changed at the
//! falling edge of the clock, half a period before the rising edge that latches it, and the
//! outputs are read in the read-only region after that rising edge, once the device has
//! updated its state. Exactly one stimulus may be outstanding per clock edge.

use tracing::debug;

use crate::clock::{Armed, Clock};
use crate::error::ProtocolViolation;
use crate::model::Observation;
use crate::signal::SimObject;
use crate::sim_if;
use crate::tb_obj::TbObj;
use crate::trigger::Trigger;
use crate::TbResult;

#[derive(Debug, Clone, Copy)]
struct Pending {
    bit: bool,
    // rising edge that latches the bit, known once the bit is on the pin
    edge: Option<u64>,
}

#[derive(Debug, Default)]
struct DriverState {
    pending: Option<Pending>,
    applied: usize,
    violations_seen: usize,
}

#[derive(Clone)]
pub struct Driver {
    armed: Armed,
    data_in: SimObject,
    data_out: SimObject,
    margin: u64,
    state: TbObj<DriverState>,
}

impl Driver {
    /// Only an armed device accepts stimulus.
    pub fn new(armed: Armed, data_in: SimObject, data_out: SimObject, margin_steps: u64) -> Self {
        let violations_seen = sim_if::with(|s| s.timing_violations().len());
        Self {
            armed,
            data_in,
            data_out,
            margin: margin_steps,
            state: TbObj::new(DriverState {
                violations_seen,
                ..Default::default()
            }),
        }
    }

    fn clock(&self) -> &Clock {
        self.armed.clock()
    }

    /// Number of completed drive/sample pairs.
    pub fn applied(&self) -> usize {
        self.state.get().applied
    }

    /// Puts `bit` on `data_in` in the low phase preceding the next rising edge.
    pub async fn drive(&self, bit: bool) -> TbResult<()> {
        let clash = self.state.with_mut(|s| match s.pending {
            Some(p) => Some(p),
            None => {
                s.pending = Some(Pending { bit, edge: None });
                None
            }
        });
        if clash.is_some() {
            return Err(ProtocolViolation::DoubleDrive {
                bit,
                time: sim_if::now(),
                edge: self.clock().rising_edges(),
            }
            .into());
        }

        if self.clock().is_high()? {
            self.clock().wait_falling().await?;
        }
        let now = sim_if::now();
        let next_rise = self.clock().next_rising_edge()?.unwrap_or(now);
        let margin = next_rise.saturating_sub(now);
        if margin < self.margin {
            self.state.with_mut(|s| s.pending = None);
            return Err(ProtocolViolation::SetupMargin {
                time: now,
                margin,
                required: self.margin,
            }
            .into());
        }

        self.data_in.set(u32::from(bit))?;
        let edge = self.clock().rising_edges() + 1;
        self.state.with_mut(|s| s.pending = Some(Pending { bit, edge: Some(edge) }));
        debug!(time = now, bit, edge, "stimulus driven");
        Ok(())
    }

    /// Waits for the edge latching the outstanding stimulus and reads the outputs after it.
    pub async fn sample(&self) -> TbResult<Observation> {
        let pending = self.state.get().pending;
        let Some(Pending {
            bit,
            edge: Some(edge),
        }) = pending
        else {
            return Err(ProtocolViolation::SampleWithoutStimulus {
                time: sim_if::now(),
            }
            .into());
        };

        while self.clock().rising_edges() < edge {
            self.clock().wait_rising().await?;
        }
        let current = self.clock().rising_edges();
        if current != edge {
            return Err(ProtocolViolation::MissedEdge {
                expected: edge,
                current,
            }
            .into());
        }
        // the edge callback runs before the device evaluates; its outputs settle by read-only
        Trigger::read_only_prio().await;

        self.check_timing()?;
        let obs = Observation::decode(self.data_out.value()?);
        self.state.with_mut(|s| {
            s.pending = None;
            s.applied += 1;
        });
        debug!(
            time = sim_if::now(),
            bit,
            edge,
            output = obs.output,
            state = %obs.state_name(),
            "sampled"
        );
        Ok(obs)
    }

    pub async fn apply_and_sample(&self, bit: bool) -> TbResult<Observation> {
        self.drive(bit).await?;
        self.sample().await
    }

    /// Current outputs, for use right after a reset with no stimulus outstanding.
    pub fn observe(&self) -> TbResult<Observation> {
        if self.state.get().pending.is_some() {
            return Err(ProtocolViolation::StimulusOutstanding {
                time: sim_if::now(),
            }
            .into());
        }
        Ok(Observation::decode(self.data_out.value()?))
    }

    /// Re-asserts reset for `cycles` periods and re-arms the device.
    pub async fn reset(&self, cycles: u32) -> TbResult<Observation> {
        if self.state.get().pending.is_some() {
            return Err(ProtocolViolation::StimulusOutstanding {
                time: sim_if::now(),
            }
            .into());
        }
        self.armed.reset(cycles).await?;
        self.observe()
    }

    fn check_timing(&self) -> TbResult<()> {
        let seen = self.state.get().violations_seen;
        let violation = sim_if::with(|s| s.timing_violations().get(seen).cloned());
        match violation {
            Some(v) => {
                self.state.with_mut(|s| s.violations_seen += 1);
                Err(ProtocolViolation::Timing(v).into())
            }
            None => Ok(()),
        }
    }
}
