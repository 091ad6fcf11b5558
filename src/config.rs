use std::path::PathBuf;

use crate::error::SetupError;
use crate::sim_if;
use crate::TbResult;

/// Testbench timing and reporting knobs.
///
/// Times are given in `unit` and converted to simulator steps with `precision`.
#[derive(Debug, Clone, PartialEq)]
pub struct TbConfig {
    pub period: u64,
    pub unit: String,
    pub reset_cycles: u32,
    /// Minimum distance between an input change and the rising edge that latches it.
    /// `None` means a quarter period.
    pub setup_margin: Option<u64>,
    /// Edge waits give up after this many periods.
    pub watchdog_periods: u32,
    pub max_sim_time: u64,
    pub precision: i8,
    pub junit_path: Option<PathBuf>,
}

impl Default for TbConfig {
    fn default() -> Self {
        Self {
            period: 10,
            unit: "us".to_string(),
            reset_cycles: 5,
            setup_margin: None,
            watchdog_periods: 2,
            max_sim_time: 1_000_000,
            precision: -9,
            junit_path: None,
        }
    }
}

impl TbConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_period(mut self, period: u64, unit: &str) -> Self {
        self.period = period;
        self.unit = unit.to_string();
        self
    }

    pub fn with_reset_cycles(mut self, cycles: u32) -> Self {
        self.reset_cycles = cycles;
        self
    }

    pub fn with_setup_margin(mut self, margin: u64) -> Self {
        self.setup_margin = Some(margin);
        self
    }

    pub fn with_watchdog_periods(mut self, periods: u32) -> Self {
        self.watchdog_periods = periods;
        self
    }

    pub fn with_max_sim_time(mut self, time: u64) -> Self {
        self.max_sim_time = time;
        self
    }

    pub fn with_junit(mut self, path: impl Into<PathBuf>) -> Self {
        self.junit_path = Some(path.into());
        self
    }

    /// Defaults overridden by `SEQTB_PERIOD`, `SEQTB_UNIT`, `SEQTB_RESET_CYCLES` and
    /// `SEQTB_JUNIT`.
    pub fn from_env() -> TbResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TbResult<Self> {
        let mut config = Self::default();
        if let Some(period) = lookup("SEQTB_PERIOD") {
            config.period = parse("SEQTB_PERIOD", &period)?;
        }
        if let Some(unit) = lookup("SEQTB_UNIT") {
            // validates the unit
            sim_if::time_scale(&unit)?;
            config.unit = unit;
        }
        if let Some(cycles) = lookup("SEQTB_RESET_CYCLES") {
            config.reset_cycles = parse("SEQTB_RESET_CYCLES", &cycles)?;
        }
        if let Some(path) = lookup("SEQTB_JUNIT") {
            config.junit_path = Some(PathBuf::from(path));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TbResult<()> {
        if self.period < 2 {
            return Err(invalid("period", self.period));
        }
        if self.reset_cycles == 0 {
            return Err(invalid("reset_cycles", self.reset_cycles));
        }
        if self.watchdog_periods == 0 {
            return Err(invalid("watchdog_periods", self.watchdog_periods));
        }
        Ok(())
    }

    pub fn period_steps(&self) -> TbResult<u64> {
        sim_if::to_steps(self.period as f64, &self.unit, self.precision)
    }

    pub fn setup_margin_steps(&self) -> TbResult<u64> {
        match self.setup_margin {
            Some(margin) => sim_if::to_steps(margin as f64, &self.unit, self.precision),
            None => Ok(self.period_steps()? / 4),
        }
    }

    pub fn max_sim_steps(&self) -> TbResult<u64> {
        sim_if::to_steps(self.max_sim_time as f64, &self.unit, self.precision)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> TbResult<T> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: impl ToString) -> crate::TbError {
    SetupError::InvalidConfig {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}
