use std::path::Path;

use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};

use crate::error::SetupError;
use crate::suite::CaseReport;
use crate::TbResult;

pub(crate) fn create_junit_xml(suite_name: &str, cases: &[CaseReport], path: &Path) -> TbResult<()> {
    let mut test_cases = Vec::new();

    for case in cases {
        let duration = Duration::seconds_f64(case.time_secs);
        let tc = match &case.result {
            Ok(_) => TestCaseBuilder::success(&case.name, duration),
            Err(e) => TestCaseBuilder::failure(&case.name, duration, e.kind(), &e.to_string()),
        }
        .build();
        test_cases.push(tc);
    }

    let test_suite = TestSuiteBuilder::new(suite_name)
        .add_testcases(test_cases)
        .build();
    let report = ReportBuilder::new().add_testsuite(test_suite).build();
    let file = std::fs::File::create(path)
        .map_err(|e| SetupError::Report(format!("{}: {}", path.display(), e)))?;
    report
        .write_xml(file)
        .map_err(|e| SetupError::Report(format!("{}: {}", path.display(), e)))?;
    Ok(())
}
