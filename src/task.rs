//! Properties to check and the results of checking them.

use std::fmt::{Display, Formatter};

use crate::expr::Expr;
pub use crate::types::OptimizationDirection;

#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    /// `φ U ψ`: reach `ψ` while staying in `φ`.
    Until(Expr, Expr),
    /// `F ψ`.
    Eventually(Expr),
    /// `G φ`, checked as `1 - P(F ¬φ)`.
    Globally(Expr),
    /// Expected reward accumulated until reaching `ψ`.
    Reward(Expr),
}

impl Formula {
    /// The (constraint, target) pair of the underlying reachability problem.
    pub fn reachability(&self) -> (Expr, Expr) {
        match self {
            Formula::Until(phi, psi) => (phi.clone(), psi.clone()),
            Formula::Eventually(psi) | Formula::Reward(psi) => (Expr::t(), psi.clone()),
            Formula::Globally(phi) => (Expr::t(), !phi.clone()),
        }
    }

    pub fn is_reward(&self) -> bool {
        matches!(self, Formula::Reward(_))
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Formula::Until(phi, psi) => write!(f, "{} U {}", phi, psi),
            Formula::Eventually(psi) => write!(f, "F {}", psi),
            Formula::Globally(phi) => write!(f, "G {}", phi),
            Formula::Reward(psi) => write!(f, "R [F {}]", psi),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckTask {
    pub formula: Formula,
    pub direction: Option<OptimizationDirection>,
    pub reward_model: Option<String>,
    /// Only decide whether the property holds almost surely.
    pub qualitative: bool,
    /// Largest acceptable gap between lower and upper bound.
    pub precision: f64,
}

impl CheckTask {
    pub const DEFAULT_PRECISION: f64 = 1e-6;

    pub fn new(formula: Formula) -> Self {
        Self {
            formula,
            direction: None,
            reward_model: None,
            qualitative: false,
            precision: Self::DEFAULT_PRECISION,
        }
    }

    pub fn with_direction(mut self, direction: OptimizationDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_reward_model(mut self, name: &str) -> Self {
        self.reward_model = Some(name.to_string());
        self
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    pub fn qualitative(mut self) -> Self {
        self.qualitative = true;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum StateValue {
    Value(f64),
    Truth(bool),
    Unresolved { lower: f64, upper: f64 },
}

impl StateValue {
    pub fn as_value(&self) -> Option<f64> {
        match self {
            StateValue::Value(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UnresolvedReason {
    IterationBudget,
    Deadline,
    NoRefinementProgress,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResultStatus {
    Resolved,
    Unresolved(UnresolvedReason),
}

/// One value per initial state of the abstract model.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub values: Vec<StateValue>,
    pub rounds: usize,
    pub status: ResultStatus,
}

impl CheckResult {
    pub fn is_resolved(&self) -> bool {
        self.status == ResultStatus::Resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachability_pairs() {
        let p = Expr::var_eq("s", 2);
        assert_eq!(Formula::Eventually(p.clone()).reachability(), (Expr::t(), p.clone()));
        assert_eq!(Formula::Globally(p.clone()).reachability(), (Expr::t(), !p.clone()));
        let q = Expr::var("ok");
        assert_eq!(Formula::Until(q.clone(), p.clone()).reachability(), (q, p));
    }

    #[test]
    fn test_builder() {
        let task = CheckTask::new(Formula::Eventually(Expr::var("done")))
            .with_direction(OptimizationDirection::Maximize)
            .with_precision(0.01)
            .qualitative();
        assert_eq!(task.direction, Some(OptimizationDirection::Maximize));
        assert!(task.qualitative);
        assert_eq!(task.precision, 0.01);
        assert_eq!(task.formula.to_string(), "F done");
    }
}
