use seqtb::prelude::*;

/// The bring-up stream: detection on the third and fifth bit.
fn detect_101_overlap() -> Scenario {
    Scenario::from_bits("detect_101_overlap", &[1, 0, 1, 0, 1])
}

fn all_zeros() -> Scenario {
    Scenario::from_bits("all_zeros", &[0; 16])
}

fn all_ones() -> Scenario {
    Scenario::from_bits("all_ones", &[1; 16])
}

fn triple_overlap() -> Scenario {
    Scenario::from_bits("triple_overlap", &[1, 0, 1, 0, 1, 0, 1])
}

fn reset_mid_stream() -> Scenario {
    Scenario::from_bits("reset_mid_stream", &[1, 0, 1])
        .then_reset(3)
        .then_bits(&[1, 0, 1])
}

fn random_stream() -> Scenario {
    Scenario::random("random_stream", 64, 0x101)
}

run_scenarios!(
    detect_101_overlap,
    all_zeros,
    all_ones,
    triple_overlap,
    reset_mid_stream,
    random_stream
);
