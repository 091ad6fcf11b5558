#![allow(dead_code)]

use std::future::Future;

use seqtb::device::{self, Device, Pins, PortDecl, TILE_PORTS};
use seqtb::model::{Observation, State};
use seqtb::prelude::*;

/// Runs `test` on a testbench around `device`.
pub fn with_device<T, F, Fut>(config: &TbConfig, device: impl Device + 'static, test: F) -> SimRun<T>
where
    F: FnOnce(Testbench) -> Fut + Send + 'static,
    Fut: Future<Output = TbResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let tb_config = config.clone();
    Simulation::new(config.clone(), device).run(move |dut| async move {
        let tb = Testbench::new(dut, &tb_config)?;
        test(tb).await
    })
}

pub fn with_tb<T, F, Fut>(config: &TbConfig, test: F) -> SimRun<T>
where
    F: FnOnce(Testbench) -> Fut + Send + 'static,
    Fut: Future<Output = TbResult<T>> + Send + 'static,
    T: Send + 'static,
{
    with_device(config, Detector101::new(), test)
}

pub fn outputs(observed: &[Observation]) -> Vec<u8> {
    observed.iter().map(|o| u8::from(o.output)).collect()
}

pub fn states(observed: &[Observation]) -> Vec<State> {
    observed.iter().filter_map(|o| o.state()).collect()
}

/// A detector that forgets the overlap: after a match a 0 goes back to S0.
pub struct NonOverlapping {
    state: State,
    last_clk: bool,
}

impl NonOverlapping {
    pub fn new() -> Self {
        Self {
            state: State::S0,
            last_clk: false,
        }
    }
}

impl Device for NonOverlapping {
    fn name(&self) -> &str {
        "tt_um_non_overlapping"
    }

    fn ports(&self) -> &[PortDecl] {
        &TILE_PORTS
    }

    fn eval(&mut self, pins: &mut Pins<'_>) {
        let clk = pins.bit(device::CLK);
        let rising = clk && !self.last_clk;
        self.last_clk = clk;

        if !pins.bit(device::RST_N) {
            self.state = State::S0;
        } else if rising && pins.bit(device::ENA) {
            let bit = pins.bit(device::UI_IN);
            self.state = match (self.state, bit) {
                (State::S101, false) => State::S0,
                (state, bit) => state.next(bit),
            };
        }
        pins.set(device::UO_OUT, Observation::of(self.state).encode());
    }
}
