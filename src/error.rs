use thiserror::Error;

/// Failure to evaluate an expression under an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unbound variable '{0}'")]
    UnboundVariable(String),
    #[error("type mismatch in '{0}'")]
    TypeMismatch(String),
    #[error("arithmetic overflow in '{0}'")]
    Overflow(String),
}

/// Failure while building an abstraction or an explicit model.
///
/// Always fatal: a partially built game cannot be trusted to be sound.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("oracle timed out on query: {query}")]
    OracleTimeout { query: String },
    #[error("oracle failure: {0}")]
    Oracle(String),
    #[error("invalid program: {0}")]
    InvalidProgram(String),
    #[error("state limit of {limit} exceeded")]
    StateLimit { limit: usize },
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("value iteration did not converge after {iterations} iterations (residual {residual})")]
    NonConvergence { iterations: usize, residual: f64 },
}

/// Errors of a verification run.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("build error: {0}")]
    Build(#[from] BuildError),
    #[error("unsupported property: {0}")]
    PropertyUnsupported(String),
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),
    /// A defect in the implementation, never a user error.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}
