//! Reference model of the Moore "101" detector.
//!
//! The model is pure: one transition per clock edge, no notion of time. Expected output
//! sequences are computed here and compared against what the simulated device shows.

use std::fmt;

/// Detector state. The discriminant is the 2-bit debug code the device exposes on
/// `uo_out[2:1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    S0 = 0b00,
    S1 = 0b01,
    S10 = 0b10,
    S101 = 0b11,
}

impl State {
    pub const ALL: [State; 4] = [State::S0, State::S1, State::S10, State::S101];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<State> {
        State::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Moore output: set only while the last three latched bits were 1, 0, 1.
    pub const fn output(self) -> bool {
        matches!(self, State::S101)
    }

    pub const fn next(self, bit: bool) -> State {
        match (self, bit) {
            (State::S0, false) => State::S0,
            (State::S0, true) => State::S1,
            (State::S1, false) => State::S10,
            (State::S1, true) => State::S1,
            (State::S10, false) => State::S0,
            (State::S10, true) => State::S101,
            // the trailing 1 of a match starts the next one
            (State::S101, false) => State::S10,
            (State::S101, true) => State::S1,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::S0 => "S0",
            State::S1 => "S1",
            State::S10 => "S10",
            State::S101 => "S101",
        };
        f.write_str(name)
    }
}

/// One clock edge: next state, the Moore output of that state and its debug code.
pub fn transition(state: State, bit: bool) -> (State, bool, u8) {
    let next = state.next(bit);
    (next, next.output(), next.code())
}

/// What the outside world sees of the device: detection flag plus debug state code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Observation {
    pub output: bool,
    pub code: u8,
}

impl Observation {
    pub fn of(state: State) -> Self {
        Self {
            output: state.output(),
            code: state.code(),
        }
    }

    /// Splits `uo_out`: bit 0 is the detection flag, bits 2:1 the state code.
    pub fn decode(uo_out: u32) -> Self {
        Self {
            output: uo_out & 1 == 1,
            code: ((uo_out >> 1) & 0b11) as u8,
        }
    }

    pub fn encode(self) -> u32 {
        u32::from(self.output) | (u32::from(self.code & 0b11) << 1)
    }

    pub fn state(&self) -> Option<State> {
        State::from_code(self.code)
    }

    pub fn state_name(&self) -> String {
        match self.state() {
            Some(state) => state.to_string(),
            None => format!("code {:02b}", self.code),
        }
    }
}

/// Stateful wrapper used to predict a whole scenario.
#[derive(Debug, Clone, Copy, Default)]
pub struct Model {
    state: State,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn reset(&mut self) -> Observation {
        self.state = State::S0;
        Observation::of(self.state)
    }

    pub fn step(&mut self, bit: bool) -> Observation {
        let (next, _, _) = transition(self.state, bit);
        self.state = next;
        Observation::of(next)
    }
}

/// Expected observations for `bits`, starting from the post-reset state.
pub fn predict(bits: impl IntoIterator<Item = bool>) -> Vec<Observation> {
    let mut model = Model::new();
    bits.into_iter().map(|bit| model.step(bit)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn outputs(bits: &[u8]) -> Vec<u8> {
        predict(bits.iter().map(|b| *b == 1))
            .into_iter()
            .map(|o| u8::from(o.output))
            .collect()
    }

    #[test]
    fn state_table() {
        let table = [
            (State::S0, State::S0, State::S1),
            (State::S1, State::S10, State::S1),
            (State::S10, State::S0, State::S101),
            (State::S101, State::S10, State::S1),
        ];
        for (state, on_zero, on_one) in table {
            assert_eq!(state.next(false), on_zero, "{} on 0", state);
            assert_eq!(state.next(true), on_one, "{} on 1", state);
        }
    }

    #[test]
    fn codes_are_stable_and_unique() {
        let codes: Vec<u8> = State::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec![0b00, 0b01, 0b10, 0b11]);
        for s in State::ALL {
            assert_eq!(State::from_code(s.code()), Some(s));
        }
        assert_eq!(State::from_code(4), None);
    }

    #[test]
    fn overlapping_stream() {
        let obs = predict([true, false, true, false, true]);
        let states: Vec<State> = obs.iter().filter_map(|o| o.state()).collect();
        assert_eq!(
            states,
            vec![State::S1, State::S10, State::S101, State::S10, State::S101]
        );
        assert_eq!(outputs(&[1, 0, 1, 0, 1]), vec![0, 0, 1, 0, 1]);
    }

    #[test]
    fn triple_overlap() {
        assert_eq!(outputs(&[1, 0, 1, 0, 1, 0, 1]), vec![0, 0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn zeros_and_ones_never_match() {
        assert_eq!(outputs(&[0, 0, 0, 0]), vec![0, 0, 0, 0]);
        assert_eq!(outputs(&[1, 1, 1, 1]), vec![0, 0, 0, 0]);
        assert!(predict([false; 4]).iter().all(|o| o.state() == Some(State::S0)));
    }

    #[test]
    fn observation_wire_format() {
        let obs = Observation::of(State::S101);
        assert_eq!(obs.encode(), 0b111);
        assert_eq!(Observation::decode(0b111), obs);
        // bits above the debug code are ignored
        assert_eq!(Observation::decode(0b1111_0100).state(), Some(State::S10));
    }

    #[test]
    fn reset_returns_to_s0() {
        let mut model = Model::new();
        model.step(true);
        model.step(false);
        assert_eq!(model.state(), State::S10);
        assert_eq!(model.reset(), Observation::of(State::S0));
    }

    proptest! {
        #[test]
        fn output_iff_last_three_bits_are_101(bits in proptest::collection::vec(any::<bool>(), 0..64)) {
            let obs = predict(bits.iter().copied());
            for (i, o) in obs.iter().enumerate() {
                let matched = i >= 2 && bits[i - 2] && !bits[i - 1] && bits[i];
                prop_assert_eq!(o.output, matched, "index {}", i);
            }
        }

        #[test]
        fn output_depends_only_on_state(state in 0u8..4, bit in any::<bool>()) {
            let state = State::from_code(state).unwrap();
            let (next, output, code) = transition(state, bit);
            prop_assert_eq!(output, next == State::S101);
            prop_assert_eq!(code, next.code());
        }
    }
}
