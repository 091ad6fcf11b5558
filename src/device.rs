//! Devices the kernel can host, and the pin-level "101" detector.

use crate::model::{Observation, State};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDir {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDecl {
    pub name: &'static str,
    pub width: u8,
    pub dir: PortDir,
}

impl PortDecl {
    pub const fn input(name: &'static str, width: u8) -> Self {
        Self { name, width, dir: PortDir::Input }
    }
    pub const fn output(name: &'static str, width: u8) -> Self {
        Self { name, width, dir: PortDir::Output }
    }
    pub fn mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }
}

/// Port values handed to [`Device::eval`], indexed in `ports()` order.
pub struct Pins<'a> {
    values: &'a mut [u32],
}

impl<'a> Pins<'a> {
    pub fn new(values: &'a mut [u32]) -> Self {
        Self { values }
    }
    pub fn get(&self, port: usize) -> u32 {
        self.values[port]
    }
    pub fn bit(&self, port: usize) -> bool {
        self.values[port] & 1 == 1
    }
    pub fn set(&mut self, port: usize, value: u32) {
        self.values[port] = value;
    }
}

/// A synchronous design evaluated by the kernel.
///
/// `eval` is called at least once per delta cycle and must be idempotent for unchanged
/// inputs: edge detection is the device's own business.
pub trait Device {
    fn name(&self) -> &str;
    fn ports(&self) -> &[PortDecl];
    fn eval(&mut self, pins: &mut Pins<'_>);
}

pub const CLK: usize = 0;
pub const RST_N: usize = 1;
pub const ENA: usize = 2;
pub const UI_IN: usize = 3;
pub const UIO_IN: usize = 4;
pub const UO_OUT: usize = 5;
pub const UIO_OUT: usize = 6;
pub const UIO_OE: usize = 7;

/// Pin set of a tiny user-project tile: clock, active-low reset, enable and three 8-bit buses.
pub const TILE_PORTS: [PortDecl; 8] = [
    PortDecl::input("clk", 1),
    PortDecl::input("rst_n", 1),
    PortDecl::input("ena", 1),
    PortDecl::input("ui_in", 8),
    PortDecl::input("uio_in", 8),
    PortDecl::output("uo_out", 8),
    PortDecl::output("uio_out", 8),
    PortDecl::output("uio_oe", 8),
];

/// Moore "101" detector. `ui_in[0]` is the serial input, `uo_out[0]` the detection flag and
/// `uo_out[2:1]` the state code. Reset is asynchronous and active low.
#[derive(Debug, Clone)]
pub struct Detector101 {
    name: String,
    state: State,
    last_clk: bool,
}

impl Detector101 {
    pub fn new() -> Self {
        Self::with_name("tt_um_moore_101")
    }

    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: State::S0,
            last_clk: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }
}

impl Default for Detector101 {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Detector101 {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &[PortDecl] {
        &TILE_PORTS
    }

    fn eval(&mut self, pins: &mut Pins<'_>) {
        let clk = pins.bit(CLK);
        let rising = clk && !self.last_clk;
        self.last_clk = clk;

        if !pins.bit(RST_N) {
            self.state = State::S0;
        } else if rising && pins.bit(ENA) {
            self.state = self.state.next(pins.bit(UI_IN));
        }

        pins.set(UO_OUT, Observation::of(self.state).encode());
        pins.set(UIO_OUT, 0);
        pins.set(UIO_OE, 0);
    }
}
