//! Small shared types.
use std::fmt;

/// Truth values of the active predicates, in predicate-index order.
pub type Valuation = Vec<bool>;

/// Direction in which a player resolves its choices.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OptimizationDirection {
    Minimize,
    Maximize,
}

impl OptimizationDirection {
    pub fn flip(self) -> Self {
        match self {
            OptimizationDirection::Minimize => OptimizationDirection::Maximize,
            OptimizationDirection::Maximize => OptimizationDirection::Minimize,
        }
    }

    pub fn is_minimize(self) -> bool {
        self == OptimizationDirection::Minimize
    }

    /// Pick the better of two values for this direction.
    pub fn better(self, a: f64, b: f64) -> f64 {
        match self {
            OptimizationDirection::Minimize => a.min(b),
            OptimizationDirection::Maximize => a.max(b),
        }
    }

    /// Is `candidate` strictly better than `current`?
    pub fn improves(self, candidate: f64, current: f64) -> bool {
        match self {
            OptimizationDirection::Minimize => candidate < current,
            OptimizationDirection::Maximize => candidate > current,
        }
    }
}

impl fmt::Display for OptimizationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationDirection::Minimize => write!(f, "min"),
            OptimizationDirection::Maximize => write!(f, "max"),
        }
    }
}
