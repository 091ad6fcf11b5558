//! Free-running clock and the reset sequence that arms the device.

use futures::future::{select, Either};
use tracing::{debug, info, warn};

use crate::error::SetupError;
use crate::executor::{JoinHandle, Task};
use crate::signal::SimObject;
use crate::sim_if;
use crate::tb_obj::TbObj;
use crate::trigger::Trigger;
use crate::TbResult;

#[derive(Debug, Default)]
struct ClockState {
    rising_edges: u64,
    last_rise: Option<u64>,
    last_fall: Option<u64>,
}

/// Two-phase clock: low for the first half of each period, high for the second.
#[derive(Clone)]
pub struct Clock {
    clk: SimObject,
    low_steps: u64,
    high_steps: u64,
    watchdog_steps: u64,
    state: TbObj<ClockState>,
}

impl Clock {
    pub fn new(clk: SimObject, period_steps: u64, watchdog_periods: u32) -> Self {
        let high_steps = period_steps / 2;
        let low_steps = period_steps - high_steps;
        if period_steps % 2 != 0 {
            warn!(
                "Clock period {} not dividable by 2. High time will be {}; low time will be {}.",
                period_steps, high_steps, low_steps
            );
        }
        Self {
            clk,
            low_steps,
            high_steps,
            watchdog_steps: period_steps * u64::from(watchdog_periods),
            state: TbObj::default(),
        }
    }

    pub fn signal(&self) -> SimObject {
        self.clk
    }

    pub fn period_steps(&self) -> u64 {
        self.low_steps + self.high_steps
    }

    /// Forks the clock into its own task. It runs until the simulation ends.
    pub fn start(&self) -> JoinHandle {
        Task::spawn_from_future(self.clone().drive(), "clock")
    }

    async fn drive(self) -> TbResult {
        loop {
            self.clk.set(0)?;
            let now = sim_if::now();
            self.state.with_mut(|s| s.last_fall = Some(now));
            Trigger::timer_steps(self.low_steps).await;

            self.clk.set(1)?;
            let now = sim_if::now();
            self.state.with_mut(|s| {
                s.rising_edges += 1;
                s.last_rise = Some(now);
            });
            Trigger::timer_steps(self.high_steps).await;
        }
    }

    /// Rising edges driven so far.
    pub fn rising_edges(&self) -> u64 {
        self.state.get().rising_edges
    }

    pub fn is_high(&self) -> TbResult<bool> {
        Ok(self.clk.value()? & 1 == 1)
    }

    /// Time of the rising edge following the current instant, if the clock is running.
    pub fn next_rising_edge(&self) -> TbResult<Option<u64>> {
        let high = self.is_high()?;
        let state = self.state.get();
        Ok(match high {
            false => state.last_fall.map(|t| t + self.low_steps),
            true => state.last_rise.map(|t| t + self.period_steps()),
        })
    }

    pub async fn wait_rising(&self) -> TbResult<()> {
        self.bounded(self.clk.rising_edge()).await
    }

    pub async fn wait_falling(&self) -> TbResult<()> {
        self.bounded(self.clk.falling_edge()).await
    }

    /// Waits for `n` rising edges.
    pub async fn cycles(&self, n: u32) -> TbResult<()> {
        for _ in 0..n {
            self.wait_rising().await?;
        }
        Ok(())
    }

    async fn bounded(&self, edge: Trigger) -> TbResult<()> {
        let watchdog = Trigger::timer_steps(self.watchdog_steps);
        let edge = match select(edge, watchdog).await {
            Either::Left(_) => return Ok(()),
            Either::Right((_, edge)) => edge,
        };
        // The watchdog fires in the timer region; an edge due at the same instant is only
        // driven by the clock's own timer callback, so give it until read-only.
        match select(edge, Trigger::read_only()).await {
            Either::Left(_) => Ok(()),
            Either::Right(_) => Err(SetupError::ClockStalled {
                time: sim_if::now(),
                waited: self.watchdog_steps,
            }
            .into()),
        }
    }
}

/// Pins the sequencer drives besides the clock.
#[derive(Clone, Copy, Debug)]
pub struct ResetPins {
    pub rst_n: SimObject,
    pub ena: SimObject,
    /// Inputs held at zero while the device comes out of reset.
    pub idle_inputs: [SimObject; 2],
}

/// Drives the clock and the reset pulse. Turns into [`Armed`] once the device has seen a full
/// clock period out of reset.
pub struct Sequencer {
    clock: Clock,
    pins: ResetPins,
}

impl Sequencer {
    pub fn new(clock: Clock, pins: ResetPins) -> Self {
        Self { clock, pins }
    }

    /// Starts the clock, then arms the device.
    pub async fn run(self, reset_cycles: u32) -> TbResult<Armed> {
        let period = self.clock.period_steps();
        sim_if::with(|s| {
            s.log(&format!(
                "starting clock, period {} steps, reset for {} cycles",
                period, reset_cycles
            ))
        });
        let _clock = self.clock.start();
        self.arm(reset_cycles).await
    }

    /// Arms the device on an already running clock.
    pub async fn arm(self, reset_cycles: u32) -> TbResult<Armed> {
        self.pins.ena.set(1)?;
        let armed = Armed {
            clock: self.clock,
            rst_n: self.pins.rst_n,
            idle_inputs: self.pins.idle_inputs,
        };
        armed.reset(reset_cycles).await?;
        Ok(armed)
    }
}

/// The device is out of reset and has seen at least one clock edge since.
#[derive(Clone)]
pub struct Armed {
    clock: Clock,
    rst_n: SimObject,
    idle_inputs: [SimObject; 2],
}

impl Armed {
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Holds reset low for at least `cycles` periods, releases it in the low phase and waits
    /// for the next rising edge. Returns in the read-only region of that edge.
    ///
    /// The inputs are zeroed with the reset, so the settle edge latches a 0 and the device
    /// leaves reset in S0 whatever was driven before.
    pub async fn reset(&self, cycles: u32) -> TbResult<()> {
        if self.clock.is_high()? {
            self.clock.wait_falling().await?;
        }
        self.rst_n.set(0)?;
        for input in self.idle_inputs {
            input.set(0)?;
        }
        debug!(time = sim_if::now(), cycles, "reset asserted");
        self.clock.cycles(cycles).await?;

        self.clock.wait_falling().await?;
        self.rst_n.set(1)?;
        debug!(time = sim_if::now(), "reset released");

        // settle edge: the first stimulus must not be latched by the release edge
        self.clock.wait_rising().await?;
        Trigger::read_only().await;
        if self.rst_n.value()? & 1 == 0 {
            return Err(SetupError::ResetStuck {
                time: sim_if::now(),
            }
            .into());
        }
        info!(time = sim_if::now(), edge = self.clock.rising_edges(), "device armed");
        Ok(())
    }
}
