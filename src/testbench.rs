use crate::clock::{Clock, ResetPins, Sequencer};
use crate::config::TbConfig;
use crate::device::Detector101;
use crate::driver::Driver;
use crate::model::Observation;
use crate::scenario::{run_scenario, Scenario};
use crate::signal::SimObject;
use crate::sim_if;
use crate::{SimRun, Simulation, TbResult};

/// Pin handles of a tile-style device plus the timing it is driven with.
#[derive(Clone, Debug)]
pub struct Testbench {
    pub dut: SimObject,
    pub clk: SimObject,
    pub rst_n: SimObject,
    pub ena: SimObject,
    pub ui_in: SimObject,
    pub uio_in: SimObject,
    pub uo_out: SimObject,
    config: TbConfig,
}

impl Testbench {
    pub fn new(dut: SimObject, config: &TbConfig) -> TbResult<Self> {
        Ok(Self {
            dut,
            clk: dut.get_child("clk")?,
            rst_n: dut.get_child("rst_n")?,
            ena: dut.get_child("ena")?,
            ui_in: dut.get_child("ui_in")?,
            uio_in: dut.get_child("uio_in")?,
            uo_out: dut.get_child("uo_out")?,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &TbConfig {
        &self.config
    }

    pub fn clock(&self) -> TbResult<Clock> {
        Ok(Clock::new(
            self.clk,
            self.config.period_steps()?,
            self.config.watchdog_periods,
        ))
    }

    pub fn sequencer(&self) -> TbResult<Sequencer> {
        Ok(Sequencer::new(
            self.clock()?,
            ResetPins {
                rst_n: self.rst_n,
                ena: self.ena,
                idle_inputs: [self.ui_in, self.uio_in],
            },
        ))
    }

    /// Starts the clock, runs the reset sequence and hands out the driver.
    pub async fn arm(&self) -> TbResult<Driver> {
        let margin = self.config.setup_margin_steps()?;
        sim_if::with(|s| s.add_setup_check(self.ui_in.handle(), self.clk.handle(), margin))?;
        let armed = self.sequencer()?.run(self.config.reset_cycles).await?;
        Ok(Driver::new(armed, self.ui_in, self.uo_out, margin))
    }
}

/// Runs `scenario` against a fresh [`Detector101`] in its own simulation.
pub fn simulate(config: &TbConfig, scenario: &Scenario) -> SimRun<Vec<Observation>> {
    let tb_config = config.clone();
    let scenario = scenario.clone();
    Simulation::new(config.clone(), Detector101::new()).run(move |dut| async move {
        let tb = Testbench::new(dut, &tb_config)?;
        let driver = tb.arm().await?;
        run_scenario(&driver, &scenario).await
    })
}
