mod common;

use common::{outputs, with_device, with_tb, NonOverlapping};
use seqtb::error::TimingKind;
use seqtb::prelude::*;

fn protocol_error<T: std::fmt::Debug>(run: SimRun<T>) -> ProtocolViolation {
    match run.result {
        Err(TbError::Protocol(v)) => v,
        other => panic!("expected a protocol violation, got {:?}", other),
    }
}

async fn drive_twice(tb: Testbench) -> TbResult<()> {
    let driver = tb.arm().await?;
    driver.drive(true).await?;
    driver.drive(false).await?;
    Ok(())
}

#[test]
fn second_drive_before_its_edge_is_rejected() {
    let violation = protocol_error(with_tb(&TbConfig::default(), drive_twice));
    assert!(matches!(violation, ProtocolViolation::DoubleDrive { bit: false, .. }));
}

async fn late_stimulus(driver: Driver) -> TbResult {
    driver.apply_and_sample(false).await?;
    Ok(Val::None)
}

async fn racing_tasks(tb: Testbench) -> TbResult<(Observation, TbResult)> {
    let driver = tb.arm().await?;
    let second = Task::fork(late_stimulus(driver.clone()));
    let first = driver.apply_and_sample(true).await?;
    Ok((first, second.await))
}

#[test]
fn concurrent_stimulus_is_rejected() {
    let (first, second) = with_tb(&TbConfig::default(), racing_tasks).result.unwrap();
    assert_eq!(first.state(), Some(State::S1));
    assert!(matches!(
        second,
        Err(TbError::Protocol(ProtocolViolation::DoubleDrive { .. }))
    ));
}

async fn sample_first(tb: Testbench) -> TbResult<Observation> {
    let driver = tb.arm().await?;
    driver.sample().await
}

#[test]
fn sample_needs_a_stimulus() {
    let violation = protocol_error(with_tb(&TbConfig::default(), sample_first));
    assert!(matches!(violation, ProtocolViolation::SampleWithoutStimulus { .. }));
}

async fn reset_while_pending(tb: Testbench) -> TbResult<Observation> {
    let driver = tb.arm().await?;
    driver.drive(true).await?;
    driver.reset(2).await
}

#[test]
fn reset_with_outstanding_stimulus_is_rejected() {
    let violation = protocol_error(with_tb(&TbConfig::default(), reset_while_pending));
    assert!(matches!(violation, ProtocolViolation::StimulusOutstanding { .. }));
}

async fn write_read_only(tb: Testbench) -> TbResult<()> {
    Trigger::read_only().await;
    tb.ui_in.set(1)
}

#[test]
fn writes_in_read_only_region_fail() {
    let violation = protocol_error(with_tb(&TbConfig::default(), write_read_only));
    assert!(matches!(violation, ProtocolViolation::WriteInReadOnly { .. }));
}

async fn narrow_margin(tb: Testbench) -> TbResult<Observation> {
    let driver = tb.arm().await?;
    driver.apply_and_sample(true).await
}

#[test]
fn margin_wider_than_low_phase_is_rejected() {
    let config = TbConfig::default().with_setup_margin(6);
    match protocol_error(with_tb(&config, narrow_margin)) {
        ProtocolViolation::SetupMargin {
            margin, required, ..
        } => {
            assert_eq!(margin, 5_000);
            assert_eq!(required, 6_000);
        }
        other => panic!("expected a setup margin violation, got {:?}", other),
    }
}

// Drive and read in the rising-edge callback itself: the device has not latched yet, so
// every read lags one step behind and every write races the edge.
async fn sample_at_edge(tb: Testbench) -> TbResult<Vec<Observation>> {
    let _driver = tb.arm().await?;
    let mut observed = Vec::new();
    for bit in [1, 0, 1, 0, 1] {
        tb.clk.rising_edge().await;
        tb.ui_in.set(bit)?;
        observed.push(Observation::decode(tb.uo_out.value()?));
    }
    Ok(observed)
}

#[test]
fn sampling_at_the_edge_lags_one_step() {
    let run = with_tb(&TbConfig::default(), sample_at_edge);
    let violations = run.stats.timing_violations.clone();
    let observed = run.result.unwrap();
    assert_eq!(outputs(&observed), vec![0, 0, 0, 1, 0]);
    assert_eq!(violations.len(), 5);
    assert!(violations
        .iter()
        .all(|v| v.kind == TimingKind::Setup && v.distance == 0));
}

async fn race_then_drive(tb: Testbench) -> TbResult<Observation> {
    let driver = tb.arm().await?;
    tb.clk.rising_edge().await;
    tb.ui_in.set(1)?;
    driver.apply_and_sample(false).await
}

#[test]
fn driver_reports_earlier_races() {
    let violation = protocol_error(with_tb(&TbConfig::default(), race_then_drive));
    match violation {
        ProtocolViolation::Timing(v) => {
            assert_eq!(v.kind, TimingKind::Setup);
            assert!(v.signal.ends_with(".ui_in"));
        }
        other => panic!("expected a timing violation, got {:?}", other),
    }
}

async fn change_after_edge(tb: Testbench) -> TbResult<()> {
    let _driver = tb.arm().await?;
    tb.clk.rising_edge_rw().await?;
    tb.ui_in.set(1)
}

#[test]
fn change_in_edge_step_is_a_hold_violation() {
    let run = with_tb(&TbConfig::default(), change_after_edge);
    assert!(run.result.is_ok());
    let kinds: Vec<TimingKind> = run.stats.timing_violations.iter().map(|v| v.kind).collect();
    assert_eq!(kinds, vec![TimingKind::Hold]);
}

async fn stream_101(tb: Testbench) -> TbResult<Vec<Observation>> {
    let driver = tb.arm().await?;
    run_scenario(&driver, &Scenario::from_bits("non_overlapping", &[1, 0, 1, 0, 1])).await
}

#[test]
fn every_mismatch_is_reported() {
    let run = with_device(&TbConfig::default(), NonOverlapping::new(), stream_101);
    let err = run.result.unwrap_err();
    assert_eq!(err.code(), 1);
    let TbError::Mismatch(report) = &err else {
        panic!("expected a mismatch, got {:?}", err);
    };
    assert_eq!(report.observed.len(), 5);
    let indices: Vec<usize> = report.mismatches.iter().map(|m| m.index).collect();
    assert_eq!(indices, vec![3, 4]);
    let text = err.to_string();
    assert!(text.contains("step 3: expected output 0 (S10), got output 0 with debug state code 00"));
    assert!(text.contains("step 4: expected output 1 (S101), got output 0 with debug state code 01"));
}
