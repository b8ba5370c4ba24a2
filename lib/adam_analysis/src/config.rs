//! Analyzer tunables.

/// Parameters bounding the cost (and the precision) of an analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Maximal number of addresses of one space kept in an alias set before
    /// they collapse to the unknown address of that space.
    pub set_cap: usize,
    /// Number of visits of a block after which its incoming state is widened.
    pub max_block_visits: usize,
    /// Number of rounds spent iterating a recursive method summary.
    pub max_recursion_rounds: usize,
    /// Maximal depth of nested method analyses.
    pub max_call_depth: usize,
    /// Number of call sites kept in allocation keys.
    pub context_depth: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            set_cap: 16,
            max_block_visits: 8,
            max_recursion_rounds: 8,
            max_call_depth: 32,
            context_depth: 1,
        }
    }
}
