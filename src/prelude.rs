pub use crate::clock::{Armed, Clock, ResetPins, Sequencer};
pub use crate::config::TbConfig;
pub use crate::device::{Detector101, Device, Pins, PortDecl};
pub use crate::driver::Driver;
pub use crate::error::{MismatchReport, ProtocolViolation, SetupError, TbError, TimingViolation};
pub use crate::executor::{JoinHandle, Task};
pub use crate::model::{Model, Observation, State};
pub use crate::scenario::{run_scenario, Scenario, Step};
pub use crate::signal::SimObject;
pub use crate::suite::{Suite, SuiteReport};
pub use crate::testbench::{simulate, Testbench};
pub use crate::trigger::Trigger;
pub use crate::utils::clock_cycles;
pub use crate::value::Val;
pub use crate::{run_scenarios, SimRun, Simulation, TbObj, TbResult};
pub use futures::future::FutureExt;
