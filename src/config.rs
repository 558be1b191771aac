//! Settings of the abstraction and of the refinement loop.
//!
//! Constructed once by the caller and passed by reference.

use std::time::Duration;

use crate::solver::SolverSettings;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AbstractionSettings {
    /// Make every guard a predicate. No bottom states can occur then, and
    /// queries for partially enabled guards are skipped.
    pub add_all_guards: bool,
    /// Add a self-loop command enabled exactly where no other command is.
    pub fix_deadlocks: bool,
    /// Initial capacity of the BDD node table, as a power of two.
    pub bdd_storage_bits: usize,
}

impl Default for AbstractionSettings {
    fn default() -> Self {
        Self {
            add_all_guards: false,
            fix_deadlocks: true,
            bdd_storage_bits: 14,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RefinementSettings {
    /// Seed the prob-0/prob-1 fixpoints with the previous round's results.
    pub reuse_qualitative: bool,
    /// Start value iteration from the previous lower bound, and tighten new
    /// bounds with the previous ones.
    pub reuse_quantitative: bool,
    /// Check monotonicity of qualitative results across rounds.
    pub check_invariants: bool,
    pub solver: SolverSettings,
}

impl Default for RefinementSettings {
    fn default() -> Self {
        Self {
            reuse_qualitative: true,
            reuse_quantitative: true,
            check_invariants: true,
            solver: SolverSettings::default(),
        }
    }
}

/// Limits of one verification run, checked between refinement rounds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Budget {
    pub max_rounds: usize,
    pub time_limit: Option<Duration>,
}

impl Budget {
    pub fn rounds(max_rounds: usize) -> Self {
        Self {
            max_rounds,
            time_limit: None,
        }
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }
}
