use rand::Rng;
use tracing_subscriber::EnvFilter;

use crate::signal::SimObject;
use crate::{TbError, TbResult, Val};

/// Waits for `n_cycles` rising edges of `signal`.
pub async fn clock_cycles(signal: SimObject, n_cycles: u32) -> TbResult {
    for _ in 0..n_cycles {
        signal.rising_edge().await;
    }
    Ok(Val::None)
}

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`. Does nothing if a
/// subscriber is already set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn report_error(e: &TbError) {
    tracing::error!(code = e.code(), "{}", e);
}

/// `len` random bits from the thread rng.
pub fn rand_bits(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(0..=1)).collect()
}
