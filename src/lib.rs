pub mod clock;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
mod executor;
mod junit;
mod kernel;
pub mod model;
pub mod prelude;
pub mod scenario;
pub mod scoreboard;
mod signal;
pub mod sim_if;
pub mod suite;
mod tb_obj;
pub mod testbench;
mod trigger;
pub mod utils;
mod value;

use std::future::Future;
use std::time;

use once_cell::sync::OnceCell;
use tracing::{debug, info};

pub use device::Device;
pub use error::{ProtocolViolation, SetupError, TbError, TimingViolation};
pub use executor::{JoinHandle, Task};
pub use signal::{ObjectKind, SimObject};
pub use tb_obj::TbObj;
pub use trigger::{EdgeKind, TrigKind, Trigger};
pub use value::Val;

pub type TbResult<T = Val> = Result<T, TbError>;

/// Name used for suite reports; set by [`run_scenarios!`].
pub static SUITE_NAME: OnceCell<String> = OnceCell::new();

/// Wall-clock and simulated time of one run.
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    pub sim_time_ns: f64,
    pub time_secs: f64,
    pub timing_violations: Vec<TimingViolation>,
}

#[derive(Debug)]
pub struct SimRun<T> {
    pub result: TbResult<T>,
    pub stats: SimStats,
}

impl<T> SimRun<T> {
    pub fn into_result(self) -> TbResult<T> {
        self.result
    }
}

/// One simulation: a device hosted by the kernel and a single test future driving it.
pub struct Simulation {
    config: config::TbConfig,
    device: Box<dyn Device>,
}

impl Simulation {
    pub fn new(config: config::TbConfig, device: impl Device + 'static) -> Self {
        Self {
            config,
            device: Box::new(device),
        }
    }

    /// Runs `test` on the device's root scope until it completes, then tears everything
    /// down. The clock and any other forked tasks end with the test.
    pub fn run<T, F, Fut>(self, test: F) -> SimRun<T>
    where
        F: FnOnce(SimObject) -> Fut,
        Fut: Future<Output = TbResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let start = time::Instant::now();
        let installed = self
            .config
            .validate()
            .and_then(|_| kernel::Kernel::new(self.device, &self.config))
            .and_then(kernel::install);
        if let Err(e) = installed {
            return SimRun {
                result: Err(e),
                stats: SimStats::default(),
            };
        }

        let result = start_of_simulation(test);
        let (sim_time_ns, timing_violations) = end_of_simulation();
        let stats = SimStats {
            sim_time_ns,
            time_secs: start.elapsed().as_secs_f64(),
            timing_violations,
        };
        debug!(
            sim_time_ns = stats.sim_time_ns,
            time_secs = stats.time_secs,
            "simulation done"
        );
        SimRun { result, stats }
    }
}

fn start_of_simulation<T, F, Fut>(test: F) -> TbResult<T>
where
    F: FnOnce(SimObject) -> Fut,
    Fut: Future<Output = TbResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let sim_root = SimObject::get_root()?;
    info!(dut = %sim_root.name(), "start of simulation");

    let slot: TbObj<Option<TbResult<T>>> = TbObj::new(None);
    let out = slot.clone();
    let test = test(sim_root);
    Task::spawn_from_future(
        async move {
            let result = test.await;
            out.with_mut(|s| *s = Some(result));
            sim_if::with(|s| s.finish());
            Ok(Val::None)
        },
        "test",
    );

    // execute first simulation tick
    executor::run_once();
    let ran = kernel::run_sim();
    let result = slot.with_mut(|s| s.take());
    match (result, ran) {
        (Some(result), _) => result,
        (None, Err(e)) => Err(e),
        (None, Ok(())) => Err(SetupError::Stalled {
            time: sim_if::now(),
        }
        .into()),
    }
}

fn end_of_simulation() -> (f64, Vec<TimingViolation>) {
    let sim_time_ns = sim_if::with(|s| s.get_sim_time("ns")).unwrap_or_default();
    trigger::cancel_all_triggers();
    executor::clear_ready_queue();
    let violations = kernel::uninstall()
        .map(|k| k.into_violations())
        .unwrap_or_default();
    (sim_time_ns, violations)
}
