//! Satisfiability oracles.
//!
//! The abstraction only ever asks one question: is this expression
//! satisfiable over the program's variable domains? Any decision procedure
//! can answer it through the [`Oracle`] trait. [`EnumerationOracle`] is a
//! brute-force reference implementation for finite domains and
//! [`CachingOracle`] memoizes answers of any oracle.

use std::collections::HashMap;

use log::debug;

use crate::error::BuildError;
use crate::expr::{Env, Expr, Value};
use crate::program::{Program, VariableDecl};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SatResult {
    Sat,
    Unsat,
    Timeout,
}

pub trait Oracle {
    fn check(&mut self, query: &Expr) -> Result<SatResult, BuildError>;
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn check(&mut self, query: &Expr) -> Result<SatResult, BuildError> {
        (**self).check(query)
    }
}

impl<O: Oracle + ?Sized> Oracle for &mut O {
    fn check(&mut self, query: &Expr) -> Result<SatResult, BuildError> {
        (**self).check(query)
    }
}

/// Decides satisfiability by enumerating all assignments to the variables
/// occurring in the query. Queries needing more than `max_assignments`
/// evaluations yield [`SatResult::Timeout`].
#[derive(Debug, Clone)]
pub struct EnumerationOracle {
    variables: Vec<VariableDecl>,
    max_assignments: u64,
}

impl EnumerationOracle {
    pub const DEFAULT_MAX_ASSIGNMENTS: u64 = 1 << 20;

    pub fn new(program: &Program) -> Self {
        Self {
            variables: program.variables.clone(),
            max_assignments: Self::DEFAULT_MAX_ASSIGNMENTS,
        }
    }

    pub fn with_max_assignments(mut self, max_assignments: u64) -> Self {
        self.max_assignments = max_assignments;
        self
    }
}

impl Oracle for EnumerationOracle {
    fn check(&mut self, query: &Expr) -> Result<SatResult, BuildError> {
        let free = query.variables();
        let mut domains: Vec<(&str, Vec<Value>)> = Vec::with_capacity(free.len());
        for name in &free {
            let decl = self
                .variables
                .iter()
                .find(|v| &v.name == name)
                .ok_or_else(|| BuildError::Oracle(format!("undeclared variable '{}' in query", name)))?;
            domains.push((decl.name.as_str(), decl.domain()));
        }

        let total = domains
            .iter()
            .try_fold(1u64, |acc, (_, d)| acc.checked_mul(d.len() as u64));
        match total {
            Some(n) if n <= self.max_assignments => {}
            _ => return Ok(SatResult::Timeout),
        }

        // Odometer over the domains.
        let mut digits = vec![0usize; domains.len()];
        let mut env: Env = domains.iter().map(|(name, d)| (name.to_string(), d[0])).collect();
        loop {
            if query.eval_bool(&env)? {
                return Ok(SatResult::Sat);
            }
            let mut i = 0;
            loop {
                if i == digits.len() {
                    return Ok(SatResult::Unsat);
                }
                let (name, domain) = &domains[i];
                digits[i] += 1;
                if digits[i] < domain.len() {
                    env.insert(name.to_string(), domain[digits[i]]);
                    break;
                }
                digits[i] = 0;
                env.insert(name.to_string(), domain[0]);
                i += 1;
            }
        }
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct OracleStats {
    /// Queries forwarded to the wrapped oracle.
    pub queries: usize,
    pub cache_hits: usize,
}

/// Memoizes the answers of another oracle by syntactic query equality.
///
/// Answers are kept for the lifetime of the oracle, across refinement rounds.
pub struct CachingOracle<O> {
    inner: O,
    cache: HashMap<Expr, SatResult>,
    queries: usize,
    hits: usize,
}

impl<O: Oracle> CachingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            cache: HashMap::new(),
            queries: 0,
            hits: 0,
        }
    }

    pub fn stats(&self) -> OracleStats {
        OracleStats {
            queries: self.queries,
            cache_hits: self.hits,
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    /// Query the oracle, turning anything but a definite answer into an error.
    pub fn is_satisfiable(&mut self, query: &Expr) -> Result<bool, BuildError> {
        match self.check(query)? {
            SatResult::Sat => Ok(true),
            SatResult::Unsat => Ok(false),
            SatResult::Timeout => Err(BuildError::OracleTimeout {
                query: query.to_string(),
            }),
        }
    }
}

impl<O: Oracle> Oracle for CachingOracle<O> {
    fn check(&mut self, query: &Expr) -> Result<SatResult, BuildError> {
        if let Some(&res) = self.cache.get(query) {
            self.hits += 1;
            return Ok(res);
        }
        self.queries += 1;
        let res = self.inner.check(query)?;
        debug!("oracle: {} -> {:?}", query, res);
        if res != SatResult::Timeout {
            self.cache.insert(query.clone(), res);
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::program::{Command, ModelType, Module, Update};

    fn program() -> Program {
        Program::new(
            ModelType::Dtmc,
            vec![VariableDecl::int("x", 0, 3, 0), VariableDecl::boolean("b", false)],
            vec![Module::new(
                "m",
                vec![Command::new("c", Expr::t(), vec![Update::new(1.0, vec![("b", Expr::t())])])],
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_enumeration() {
        let mut oracle = EnumerationOracle::new(&program());

        let sat = Expr::and(vec![Expr::var_eq("x", 3), Expr::var("b")]);
        assert_eq!(oracle.check(&sat).unwrap(), SatResult::Sat);

        let unsat = Expr::gt(Expr::var("x"), Expr::int(3));
        assert_eq!(oracle.check(&unsat).unwrap(), SatResult::Unsat);

        assert_eq!(oracle.check(&Expr::t()).unwrap(), SatResult::Sat);
        assert_eq!(oracle.check(&Expr::f()).unwrap(), SatResult::Unsat);
    }

    #[test]
    fn test_enumeration_budget() {
        let mut oracle = EnumerationOracle::new(&program()).with_max_assignments(3);
        let query = Expr::var_eq("x", 1);
        assert_eq!(oracle.check(&query).unwrap(), SatResult::Timeout);
    }

    #[test]
    fn test_caching() {
        let mut oracle = CachingOracle::new(EnumerationOracle::new(&program()));
        let query = Expr::var_eq("x", 2);

        assert!(oracle.is_satisfiable(&query).unwrap());
        assert!(oracle.is_satisfiable(&query).unwrap());
        let stats = oracle.stats();
        assert_eq!(stats.queries, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[test]
    fn test_timeout_is_an_error() {
        let mut oracle = CachingOracle::new(EnumerationOracle::new(&program()).with_max_assignments(1));
        let res = oracle.is_satisfiable(&Expr::var_eq("x", 2));
        assert!(matches!(res, Err(BuildError::OracleTimeout { .. })));
    }
}
