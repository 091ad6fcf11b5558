mod common;

use common::{outputs, states, with_tb};
use proptest::prelude::*;
use seqtb::model::predict;
use seqtb::prelude::*;
use seqtb::sim_if;
use seqtb::utils::rand_bits;

use seqtb::model::State::{S0, S1, S10, S101};

fn run_bits(bits: &[u8]) -> SimRun<Vec<Observation>> {
    simulate(&TbConfig::default(), &Scenario::from_bits("bits", bits))
}

#[test]
fn detects_on_third_and_fifth_bit() {
    let run = run_bits(&[1, 0, 1, 0, 1]);
    assert!(run.stats.timing_violations.is_empty());
    let observed = run.result.unwrap();
    assert_eq!(outputs(&observed), vec![0, 0, 1, 0, 1]);
    assert_eq!(states(&observed), vec![S1, S10, S101, S10, S101]);
}

#[test]
fn zeros_never_detect() {
    let observed = run_bits(&[0; 12]).result.unwrap();
    assert!(observed.iter().all(|o| !o.output && o.state() == Some(S0)));
}

#[test]
fn ones_never_detect() {
    let observed = run_bits(&[1; 12]).result.unwrap();
    assert!(observed.iter().all(|o| !o.output && o.state() == Some(S1)));
}

#[test]
fn overlapping_matches_all_detect() {
    let observed = run_bits(&[1, 0, 1, 0, 1, 0, 1]).result.unwrap();
    assert_eq!(outputs(&observed), vec![0, 0, 1, 0, 1, 0, 1]);
}

#[test]
fn reset_returns_to_s0_regardless_of_length() {
    let scenario = Scenario::from_bits("reset", &[1, 0])
        .then_reset(1)
        .then_reset(4)
        .then_bits(&[1, 0, 1]);
    let observed = simulate(&TbConfig::default(), &scenario).result.unwrap();
    assert_eq!(states(&observed), vec![S1, S10, S0, S0, S1, S10, S101]);

    for cycles in [1, 3, 8] {
        let config = TbConfig::default().with_reset_cycles(cycles);
        let observed = simulate(&config, &Scenario::from_bits("after_reset", &[1, 0, 1]))
            .result
            .unwrap();
        assert_eq!(outputs(&observed), vec![0, 0, 1]);
    }
}

#[test]
fn reset_right_after_a_one_leaves_s0() {
    let scenario = Scenario::from_bits("one_then_reset", &[1])
        .then_reset(2)
        .then_bits(&[0, 1]);
    let observed = simulate(&TbConfig::default(), &scenario).result.unwrap();
    assert_eq!(states(&observed), vec![S1, S0, S0, S1]);
    assert_eq!(outputs(&observed), vec![0, 0, 0, 0]);

    // a reset in the middle of a match must not let the match complete
    let scenario = Scenario::from_bits("match_then_reset", &[1, 0, 1])
        .then_reset(1)
        .then_bits(&[0, 1]);
    let observed = simulate(&TbConfig::default(), &scenario).result.unwrap();
    assert_eq!(outputs(&observed), vec![0, 0, 1, 0, 0, 0]);
}

#[test]
fn one_period_watchdog_runs_a_healthy_clock() {
    let config = TbConfig::default().with_watchdog_periods(1);
    let observed = simulate(&config, &Scenario::from_bits("tight_watchdog", &[1, 0, 1]))
        .result
        .unwrap();
    assert_eq!(outputs(&observed), vec![0, 0, 1]);
}

#[test]
fn runs_are_deterministic() {
    let scenario = Scenario::random("det", 40, 11);
    let a = simulate(&TbConfig::default(), &scenario);
    let b = simulate(&TbConfig::default(), &scenario);
    assert_eq!(a.result.unwrap(), b.result.unwrap());
    assert_eq!(a.stats.sim_time_ns, b.stats.sim_time_ns);
}

#[test]
fn other_clock_periods() {
    let config = TbConfig::default().with_period(20, "ns");
    let observed = simulate(&config, &Scenario::from_bits("fast", &[1, 0, 1, 1, 0, 1]))
        .result
        .unwrap();
    assert_eq!(outputs(&observed), vec![0, 0, 1, 0, 0, 1]);
}

#[test]
fn thread_rng_stream_matches_model() {
    let bits = rand_bits(48);
    let observed = run_bits(&bits).result.unwrap();
    assert_eq!(observed, predict(bits.iter().map(|b| *b != 0)));
}

async fn log_changes(signal: SimObject, clk: SimObject, log: TbObj<Vec<(u64, u32)>>) -> TbResult {
    loop {
        signal.edge().await;
        let clk = clk.value()?;
        log.with_mut(|l| l.push((sim_if::now(), clk)));
    }
}

async fn watch_output_changes(tb: Testbench) -> TbResult<Vec<(u64, u32)>> {
    let driver = tb.arm().await?;
    let changes: TbObj<Vec<(u64, u32)>> = TbObj::default();
    let _monitor = Task::fork(log_changes(tb.uo_out, tb.clk, changes.clone()));
    run_scenario(&driver, &Scenario::from_bits("watched", &[1, 1, 0, 1, 0, 0, 1, 0, 1])).await?;
    let seen = changes.get().clone();
    Ok(seen)
}

#[test]
fn outputs_change_only_at_rising_edges() {
    let run = with_tb(&TbConfig::default(), watch_output_changes);
    let changes = run.result.unwrap();
    assert!(!changes.is_empty());
    // clock is low for the first half of each 10 us period
    for (time, clk) in changes {
        assert_eq!(time % 10_000, 5_000, "output moved at t={}", time);
        assert_eq!(clk, 1);
    }
}

async fn wait_three_cycles(tb: Testbench) -> TbResult<u64> {
    let _driver = tb.arm().await?;
    let start = sim_if::now();
    clock_cycles(tb.clk, 3).await?;
    Ok(sim_if::now() - start)
}

#[test]
fn clock_cycles_waits_whole_periods() {
    let waited = with_tb(&TbConfig::default(), wait_three_cycles).result.unwrap();
    assert_eq!(waited, 30_000);
}

async fn trigger_values(tb: Testbench) -> TbResult<(Val, Val)> {
    let _driver = tb.arm().await?;
    let edge = tb.clk.falling_edge().await;
    let start = sim_if::now() as i64;
    let timer = Trigger::timer(1, "us")?.await;
    assert_eq!(timer, Val::Int(start + 1_000));
    Ok((edge, timer))
}

#[test]
fn triggers_resolve_to_fired_values() {
    let (edge, _) = with_tb(&TbConfig::default(), trigger_values).result.unwrap();
    assert_eq!(edge, Val::Bits(0));
}

async fn bus_access(tb: Testbench) -> TbResult<String> {
    tb.uio_in.set_bin("0b1010_0101")?;
    assert!(tb.uio_in.set_bin("101").is_err());
    assert!(tb.dut.bin().is_err());
    assert_eq!(tb.dut.c("uio_in").u32(), 0b1010_0101);
    tb.uio_in.bin()
}

#[test]
fn binary_strings_round_trip() {
    let bin = with_tb(&TbConfig::default(), bus_access).result.unwrap();
    assert_eq!(bin, "10100101");
}

#[test]
fn suite_reports_every_case() {
    let mut suite = Suite::new(TbConfig::default()).with_name("detector_suite");
    suite.push(Scenario::from_bits("stream", &[1, 0, 1, 0, 1]));
    suite.push(Scenario::random("random", 16, 3));
    let report = suite.run();
    assert!(report.passed());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.cases.len(), 2);
    assert!(report.cases.iter().all(|c| c.sim_time_ns > 0.0));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn any_stream_matches_model(bits in prop::collection::vec(0u8..=1, 1..40)) {
        let observed = run_bits(&bits).result.unwrap();
        prop_assert_eq!(observed, predict(bits.iter().map(|b| *b != 0)));
    }

    #[test]
    fn reset_after_any_prefix_returns_to_s0(
        prefix in prop::collection::vec(0u8..=1, 0..12),
        cycles in 1u32..4,
        suffix in prop::collection::vec(0u8..=1, 1..8),
    ) {
        let scenario = Scenario::from_bits("prefix_reset", &prefix)
            .then_reset(cycles)
            .then_bits(&suffix);
        let observed = simulate(&TbConfig::default(), &scenario).result.unwrap();
        prop_assert_eq!(observed[prefix.len()], Observation::of(S0));
        prop_assert_eq!(observed, scenario.expected());
    }

    #[test]
    fn seeded_streams_match_model(seed in any::<u64>()) {
        let scenario = Scenario::random("seeded", 24, seed);
        let observed = simulate(&TbConfig::default(), &scenario).result.unwrap();
        prop_assert_eq!(observed, scenario.expected());
    }
}
