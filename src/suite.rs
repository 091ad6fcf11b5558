//! Runs a list of scenarios, each in a fresh simulation, and reports on all of them.

use std::path::Path;
use std::time;

use num_format::{Locale, ToFormattedString};
use prettytable::{row, Table};
use tracing::{error, info};

use crate::config::TbConfig;
use crate::junit;
use crate::model::Observation;
use crate::scenario::Scenario;
use crate::testbench;
use crate::{TbResult, SUITE_NAME};

#[derive(Debug)]
pub struct CaseReport {
    pub name: String,
    pub steps: usize,
    pub result: TbResult<Vec<Observation>>,
    pub time_secs: f64,
    pub sim_time_ns: f64,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }

    fn sim_speed(&self) -> f64 {
        if self.time_secs > 0.0 {
            self.sim_time_ns / self.time_secs
        } else {
            0.0
        }
    }
}

pub struct Suite {
    name: String,
    config: TbConfig,
    scenarios: Vec<Scenario>,
}

impl Suite {
    pub fn new(config: TbConfig) -> Self {
        let name = SUITE_NAME
            .get()
            .cloned()
            .unwrap_or_else(|| "seqtb".to_string());
        Self {
            name,
            config,
            scenarios: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn push(&mut self, scenario: Scenario) {
        self.scenarios.push(scenario);
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn run(&self) -> SuiteReport {
        let start = time::Instant::now();
        let cases = self
            .scenarios
            .iter()
            .map(|scenario| {
                let run = testbench::simulate(&self.config, scenario);
                match &run.result {
                    Ok(_) => info!(scenario = %scenario.name, "passed"),
                    Err(e) => error!(scenario = %scenario.name, "{}", e),
                }
                CaseReport {
                    name: scenario.name.clone(),
                    steps: scenario.len(),
                    result: run.result,
                    time_secs: run.stats.time_secs,
                    sim_time_ns: run.stats.sim_time_ns,
                }
            })
            .collect();
        SuiteReport {
            name: self.name.clone(),
            cases,
            time_secs: start.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug)]
pub struct SuiteReport {
    pub name: String,
    pub cases: Vec<CaseReport>,
    pub time_secs: f64,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.cases.iter().all(CaseReport::passed)
    }

    /// 0 if every case passed, otherwise the code of the most severe failure.
    pub fn exit_code(&self) -> i32 {
        self.cases
            .iter()
            .filter_map(|c| c.result.as_ref().err())
            .map(|e| e.code())
            .max()
            .unwrap_or(0)
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row!["TEST", "STEPS", "RESULT", "TIME (s)", "SIM TIME (ns)", "SIM SPEED (ns/s)"]);
        for case in &self.cases {
            let result = match &case.result {
                Ok(_) => "passed",
                Err(e) => e.kind(),
            };
            table.add_row(row![
                case.name,
                r->case.steps,
                result,
                r->format!("{:.3}", case.time_secs),
                r->(case.sim_time_ns as u64).to_formatted_string(&Locale::en),
                r->(case.sim_speed() as u64).to_formatted_string(&Locale::en)
            ]);
        }
        table
    }

    pub fn print_summary(&self) {
        info!("{}\n{}", self.name, self.table());
        let total_sim: f64 = self.cases.iter().map(|c| c.sim_time_ns).sum();
        let failed = self.cases.iter().filter(|c| !c.passed()).count();
        info!(
            "TOTAL: {} passed, {} failed, real time {:.3} s, simulation time {} ns",
            self.cases.len() - failed,
            failed,
            self.time_secs,
            (total_sim as u64).to_formatted_string(&Locale::en)
        );
        for case in self.cases.iter().filter(|c| !c.passed()) {
            if let Err(e) = &case.result {
                error!("TEST {} failed: {}", case.name, e);
            }
        }
    }

    pub fn write_junit(&self, path: &Path) -> TbResult<()> {
        junit::create_junit_xml(&self.name, &self.cases, path)?;
        info!(path = %path.display(), "junit report written");
        Ok(())
    }
}

/// Generates a `main` that runs the listed scenario constructors as one suite.
///
/// Each argument is a function `fn() -> Scenario`. The configuration comes from the
/// environment, see [`TbConfig::from_env`]. The process exits with
/// [`SuiteReport::exit_code`].
#[macro_export]
macro_rules! run_scenarios {
    ($( $i:ident ),+) => {
        fn main() {
            let _ = $crate::SUITE_NAME.set(std::module_path!().to_string());
            $crate::utils::init_logging();
            let config = match $crate::config::TbConfig::from_env() {
                Ok(config) => config,
                Err(e) => {
                    $crate::utils::report_error(&e);
                    std::process::exit(e.code());
                }
            };
            let mut suite = $crate::suite::Suite::new(config.clone());
            $(suite.push($i());)+
            let report = suite.run();
            report.print_summary();
            if let Some(path) = &config.junit_path {
                if let Err(e) = report.write_junit(path) {
                    $crate::utils::report_error(&e);
                    std::process::exit(e.code());
                }
            }
            std::process::exit(report.exit_code());
        }
    };
}
