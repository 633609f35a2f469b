use serde::Serialize;

/// How two generated texts relate to each other for a given prompt.
///
/// All lengths count characters. The comparison is purely textual: a side
/// that echoes the prompt while the other does not will show up as a
/// divergence even when the continuations match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComparisonOutcome {
    pub common_prefix_length: usize,
    pub prompt_length: usize,
    pub a_length: usize,
    pub b_length: usize,
    pub agreement: bool,
}

impl ComparisonOutcome {
    pub fn new(prompt: &str, a: &str, b: &str) -> Self {
        let common_prefix_length = common_prefix_length(a, b);
        let prompt_length = prompt.chars().count();
        Self {
            common_prefix_length,
            prompt_length,
            a_length: a.chars().count(),
            b_length: b.chars().count(),
            agreement: common_prefix_length > prompt_length,
        }
    }
}

/// Number of leading characters `a` and `b` have in common.
pub fn common_prefix_length(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}
