use std::collections::VecDeque;

use crate::error::{Mismatch, MismatchReport};
use crate::model::Observation;

/// In-order comparison of expected and received observations. Keeps going after a
/// mismatch so a single report covers every failing step.
#[derive(Debug, Default)]
pub struct Scoreboard {
    exp_q: VecDeque<Observation>,
    recv_q: VecDeque<Observation>,
    received_all: Vec<Observation>,
    mismatches: Vec<Mismatch>,
    expected: usize,
    received: usize,
    matched: usize,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_exp(&mut self, data: Observation) {
        self.exp_q.push_back(data);
        self.expected += 1;
        self.compare();
    }

    pub fn add_recv(&mut self, data: Observation) {
        self.recv_q.push_back(data);
        self.received_all.push(data);
        self.received += 1;
        self.compare();
    }

    fn compare(&mut self) {
        while !self.exp_q.is_empty() && !self.recv_q.is_empty() {
            let (Some(expected), Some(actual)) = (self.exp_q.pop_front(), self.recv_q.pop_front())
            else {
                break;
            };
            let index = self.matched + self.mismatches.len();
            if expected == actual {
                self.matched += 1;
            } else {
                self.mismatches.push(Mismatch {
                    index,
                    expected,
                    actual,
                });
            }
        }
    }

    pub fn passed(&self) -> bool {
        self.received == self.expected
            && self.matched == self.received
            && self.mismatches.is_empty()
            && self.exp_q.is_empty()
            && self.recv_q.is_empty()
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        &self.mismatches
    }

    pub fn result_str(&self) -> String {
        format!(
            "expected={}, received={}, matched={}, errors={}, expQ: {}, recvQ: {}",
            self.expected,
            self.received,
            self.matched,
            self.mismatches.len(),
            self.exp_q.len(),
            self.recv_q.len()
        )
    }

    /// `Ok` with everything received, or the aggregated mismatch report.
    pub fn finish(self, scenario: &str) -> Result<Vec<Observation>, MismatchReport> {
        if self.passed() {
            Ok(self.received_all)
        } else {
            Err(MismatchReport {
                scenario: scenario.to_string(),
                observed: self.received_all,
                mismatches: self.mismatches,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::State;

    #[test]
    fn collects_every_mismatch() {
        let mut sb = Scoreboard::new();
        let states = [State::S1, State::S10, State::S101];
        let seen = [State::S1, State::S0, State::S1];
        for (e, r) in states.iter().zip(seen.iter()) {
            sb.add_exp(Observation::of(*e));
            sb.add_recv(Observation::of(*r));
        }
        assert!(!sb.passed());
        let indices: Vec<usize> = sb.mismatches().iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![1, 2]);
        let report = sb.finish("partial").unwrap_err();
        assert_eq!(report.observed.len(), 3);
        assert!(report.to_string().contains("step 2: expected output 1 (S101)"));
    }

    #[test]
    fn missing_observations_fail() {
        let mut sb = Scoreboard::new();
        sb.add_exp(Observation::of(State::S1));
        assert!(!sb.passed());
        assert!(sb.result_str().contains("expQ: 1"));
    }

    #[test]
    fn matching_streams_pass() {
        let mut sb = Scoreboard::new();
        sb.add_recv(Observation::of(State::S1));
        sb.add_exp(Observation::of(State::S1));
        assert!(sb.passed());
        assert_eq!(sb.finish("ok").unwrap().len(), 1);
    }
}
