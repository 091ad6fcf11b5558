/// Value a task or trigger resolves to. Most testbench tasks only signal completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Val {
    #[default]
    None,
    /// Simulation time in steps.
    Int(i64),
    /// Signal value.
    Bits(u32),
}
