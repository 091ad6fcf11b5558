use std::fmt;

use thiserror::Error;

use crate::model::Observation;

/// Everything that can end a testbench run.
///
/// Protocol and setup errors abort the run as soon as they happen. Mismatches are collected
/// over the whole scenario and surface once, as a single report.
#[derive(Debug, Clone, Error)]
pub enum TbError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
    #[error("setup error: {0}")]
    Setup(#[from] SetupError),
    #[error("{0}")]
    Mismatch(#[from] MismatchReport),
}

impl TbError {
    /// Process exit code distinguishing the error classes.
    pub fn code(&self) -> i32 {
        match self {
            TbError::Mismatch(_) => 1,
            TbError::Protocol(_) => 2,
            TbError::Setup(_) => 3,
        }
    }

    /// Short class name, used as the failure type in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TbError::Mismatch(_) => "mismatch",
            TbError::Protocol(_) => "protocol",
            TbError::Setup(_) => "setup",
        }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, TbError::Protocol(_))
    }

    pub fn is_setup(&self) -> bool {
        matches!(self, TbError::Setup(_))
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, TbError::Mismatch(_))
    }
}

/// Misuse of the stimulus/sample protocol. Any of these invalidates every later observation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error(
        "stimulus {bit} requested at t={time} while the previous stimulus still waits for its edge (edge #{edge})"
    )]
    DoubleDrive { bit: bool, time: u64, edge: u64 },
    #[error("stimulus still outstanding at t={time}")]
    StimulusOutstanding { time: u64 },
    #[error("sample requested at t={time} without a latched stimulus")]
    SampleWithoutStimulus { time: u64 },
    #[error("stimulus was meant for edge #{expected} but the clock is already at edge #{current}")]
    MissedEdge { expected: u64, current: u64 },
    #[error("stimulus at t={time} is only {margin} steps before the next rising edge, {required} required")]
    SetupMargin { time: u64, margin: u64, required: u64 },
    #[error("write to {signal} at t={time} during the read-only region")]
    WriteInReadOnly { signal: String, time: u64 },
    #[error("{0}")]
    Timing(TimingViolation),
}

/// The simulation environment itself is broken, as opposed to the device logic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    #[error("clock did not toggle within {waited} steps (t={time})")]
    ClockStalled { time: u64, waited: u64 },
    #[error("reset still asserted after release (t={time})")]
    ResetStuck { time: u64 },
    #[error("simulation exceeded the time limit of {limit} steps (t={time})")]
    Timeout { time: u64, limit: u64 },
    #[error("simulation ran out of events at t={time} before the test finished")]
    Stalled { time: u64 },
    #[error("delta cycles did not converge at t={time}")]
    DeltaOverflow { time: u64 },
    #[error("no object named {0}")]
    UnknownSignal(String),
    #[error("no object with handle {0}")]
    UnknownHandle(usize),
    #[error("{0} is a scope and carries no value")]
    NotASignal(String),
    #[error("unknown time unit {0}")]
    InvalidTimeUnit(String),
    #[error("can't convert {time} {unit} to sim steps without rounding (precision 1e{precision})")]
    InexactTime { time: f64, unit: String, precision: i8 },
    #[error("a callback is already registered for {0}")]
    DuplicateCallback(String),
    #[error("invalid value {value:?} for {key}")]
    InvalidConfig { key: String, value: String },
    #[error("a simulation is already running on this thread")]
    AlreadyRunning,
    #[error("task {name} was cancelled before it completed")]
    TaskCancelled { name: String },
    #[error("report output failed: {0}")]
    Report(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingKind {
    Setup,
    Hold,
}

/// A change on a checked input too close to the clock edge that latches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingViolation {
    pub kind: TimingKind,
    pub signal: String,
    pub time: u64,
    /// Steps between the input change and the edge.
    pub distance: u64,
}

impl fmt::Display for TimingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TimingKind::Setup => "setup",
            TimingKind::Hold => "hold",
        };
        write!(
            f,
            "{} violation on {} at t={} ({} steps from the edge)",
            kind, self.signal, self.time, self.distance
        )
    }
}

/// One step where the device disagreed with the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    pub expected: Observation,
    pub actual: Observation,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {}: expected output {} ({}), got output {} with debug state code {:02b}",
            self.index,
            u8::from(self.expected.output),
            self.expected.state_name(),
            u8::from(self.actual.output),
            self.actual.code,
        )
    }
}

/// Every failing step of one scenario, together with the full observed sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct MismatchReport {
    pub scenario: String,
    pub observed: Vec<Observation>,
    pub mismatches: Vec<Mismatch>,
}

impl fmt::Display for MismatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scenario {}: {} of {} steps mismatched",
            self.scenario,
            self.mismatches.len(),
            self.observed.len()
        )?;
        for m in &self.mismatches {
            write!(f, "\n  {}", m)?;
        }
        Ok(())
    }
}
