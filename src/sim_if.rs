use crate::error::{SetupError, TimingViolation};
use crate::kernel;
use crate::signal::ObjectKind;
use crate::TbResult;

/// Runs `f` against the simulator interface of the simulation running on this thread.
///
/// Panics when no simulation is running, or when called re-entrantly from inside another
/// `with` closure.
pub fn with<R>(f: impl FnOnce(&mut dyn SimIf) -> R) -> R {
    kernel::with(|k| f(k))
}

/// Current simulation time in steps.
pub fn now() -> u64 {
    with(|s| s.get_sim_time_steps())
}

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    // Relative when registering, absolute when the kernel reports it back.
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

/// What the testbench needs from a simulator. Callbacks are one-shot: once reported back they
/// are gone and must be registered again.
pub trait SimIf {
    fn set_value(&mut self, handle: usize, value: u32, force: bool) -> TbResult<()>;
    fn release(&mut self, handle: usize) -> TbResult<()>;
    fn get_value(&self, handle: usize) -> TbResult<u32>;
    fn get_handle_by_name(&self, name: &str) -> TbResult<usize>;
    fn get_full_name(&self, handle: usize) -> TbResult<String>;
    fn get_kind(&self, handle: usize) -> TbResult<ObjectKind>;
    fn get_root_handle(&self) -> usize;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn register_callback(&mut self, cb: SimCallback) -> TbResult<usize>;
    fn cancel_callback(&mut self, cb_hdl: usize) -> TbResult<()>;
    /// Flag `data` changes closer than `window` steps before a rising edge of `clk`, or in
    /// the same step after it.
    fn add_setup_check(&mut self, data: usize, clk: usize, window: u64) -> TbResult<()>;
    fn timing_violations(&self) -> &[TimingViolation];
    /// Stop the simulation at the end of the current time step.
    fn finish(&mut self);

    fn log(&self, msg: &str) {
        tracing::info!(time = self.get_sim_time_steps(), "{}", msg);
    }
    fn get_sim_time(&self, unit: &str) -> TbResult<f64> {
        // this function does not preserve precision, so don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        let precision = self.get_sim_precision();
        Ok(ldexp10(t, i32::from(precision) - i32::from(time_scale(unit)?)))
    }
    fn get_sim_steps(&self, time: f64, unit: &str) -> TbResult<u64> {
        to_steps(time, unit, self.get_sim_precision())
    }
}

pub fn to_steps(time: f64, unit: &str, precision: i8) -> TbResult<u64> {
    let steps = ldexp10(time, i32::from(time_scale(unit)?) - i32::from(precision));
    if steps % 1.0 == 0.0 && steps >= 0.0 && steps < u64::MAX as f64 {
        Ok(steps as u64)
    } else {
        Err(SetupError::InexactTime {
            time,
            unit: unit.to_string(),
            precision,
        }
        .into())
    }
}

pub(crate) fn time_scale(unit: &str) -> TbResult<i8> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" => Ok(0),
        _ => Err(SetupError::InvalidTimeUnit(unit.to_string()).into()),
    }
}

fn ldexp10(frac: f64, exp: i32) -> f64 {
    // Like math.ldexp, but base 10. Powers of ten up to 1e22 are exact in f64, dividing
    // keeps e.g. 5000 * 1e-3 from rounding below 5.
    if exp >= 0 {
        frac * 10_f64.powi(exp)
    } else {
        frac / 10_f64.powi(-exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversion() {
        assert_eq!(to_steps(10.0, "us", -9).unwrap(), 10_000);
        assert_eq!(to_steps(3.0, "ns", -9).unwrap(), 3);
        assert_eq!(to_steps(2.0, "ms", -6).unwrap(), 2_000);
    }

    #[test]
    fn extreme_precision_does_not_overflow() {
        assert!(to_steps(1.0, "sec", i8::MIN).is_err());
        assert_eq!(to_steps(1.0, "sec", -18).unwrap(), 1_000_000_000_000_000_000);
        assert!(to_steps(1.0, "fs", i8::MAX).is_err());
        assert_eq!(ldexp10(7.0, -400), 0.0);
    }

    #[test]
    fn rounding_is_refused() {
        assert!(to_steps(1.0, "ps", -9).is_err());
        assert!(to_steps(1.0, "minutes", -9).unwrap_err().is_setup());
    }
}
