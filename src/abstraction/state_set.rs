use std::collections::BTreeSet;

use crate::error::{BuildError, CheckError};
use crate::expr::Expr;
use crate::oracle::{CachingOracle, Oracle};
use crate::predicate::PredicateSet;
use crate::reference::Ref;
use crate::types::Valuation;

/// Incremental abstraction of a set of concrete states given by an expression:
/// the valuations of the predicates consistent with some state of the set.
pub struct StateSetAbstractor {
    expr: Expr,
    predicate_count: usize,
    valuations: BTreeSet<Valuation>,
}

impl StateSetAbstractor {
    pub fn new<O: Oracle>(expr: Expr, oracle: &mut CachingOracle<O>) -> Result<Self, BuildError> {
        let mut valuations = BTreeSet::new();
        if oracle.is_satisfiable(&expr)? {
            valuations.insert(Vec::new());
        }
        Ok(Self {
            expr,
            predicate_count: 0,
            valuations,
        })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn extend<O: Oracle>(
        &mut self,
        predicates: &PredicateSet,
        oracle: &mut CachingOracle<O>,
    ) -> Result<(), BuildError> {
        while self.predicate_count < predicates.len() {
            let k = self.predicate_count;
            let mut next = BTreeSet::new();
            for val in &self.valuations {
                for b in [false, true] {
                    let mut parts = vec![self.expr.clone()];
                    parts.extend(predicates.valuation_constraint(val));
                    parts.push(predicates.literal_expr(k, b));
                    if oracle.is_satisfiable(&Expr::and(parts))? {
                        let mut v = val.clone();
                        v.push(b);
                        next.insert(v);
                    }
                }
            }
            self.valuations = next;
            self.predicate_count += 1;
        }
        Ok(())
    }

    pub fn states(&self, predicates: &PredicateSet) -> Result<Ref, CheckError> {
        if self.predicate_count != predicates.len() {
            return Err(CheckError::InvariantViolation(format!(
                "state set abstracted for {} predicates, but {} are active",
                self.predicate_count,
                predicates.len()
            )));
        }
        let bdd = predicates.bdd();
        Ok(bdd.apply_or_many(self.valuations.iter().map(|v| predicates.encode_valuation(v))))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::bdd::Bdd;
    use crate::oracle::EnumerationOracle;
    use crate::program::{ModelType, Program, VariableDecl};

    #[test]
    fn test_initial_states() {
        let program = Program::new(ModelType::Mdp, vec![VariableDecl::int("x", 0, 3, 1)], vec![]).unwrap();
        let mut oracle = CachingOracle::new(EnumerationOracle::new(&program));
        let mut preds = PredicateSet::new(Rc::new(Bdd::default()));

        let mut init = StateSetAbstractor::new(program.initial_expr(), &mut oracle).unwrap();
        preds.insert(Expr::var_eq("x", 0));
        preds.insert(Expr::le(Expr::var("x"), Expr::int(1)));
        init.extend(&preds, &mut oracle).unwrap();

        let states = init.states(&preds).unwrap();
        assert_eq!(states, preds.encode_valuation(&[false, true]));
    }
}
