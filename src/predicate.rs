//! The set of abstraction predicates and their symbolic encoding.
//!
//! Predicate `i` owns two BDD variables: `2i+1` for its value in the current
//! state and `2i+2` for its value in the successor state. Interleaving the
//! copies keeps transition relations small. Predicates are only ever
//! appended, so a valuation over the first `k` predicates is a prefix of the
//! valuations refining it.

use std::collections::HashMap;
use std::rc::Rc;

use crate::bdd::Bdd;
use crate::expr::Expr;
use crate::reference::Ref;

pub struct PredicateSet {
    bdd: Rc<Bdd>,
    predicates: Vec<Expr>,
    index: HashMap<Expr, usize>,
}

impl PredicateSet {
    pub fn new(bdd: Rc<Bdd>) -> Self {
        Self {
            bdd,
            predicates: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn bdd(&self) -> &Rc<Bdd> {
        &self.bdd
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[Expr] {
        &self.predicates
    }

    pub fn get(&self, i: usize) -> &Expr {
        &self.predicates[i]
    }

    fn normalize(expr: &Expr) -> &Expr {
        let mut e = expr;
        while let Expr::Not(inner) = e {
            e = inner;
        }
        e
    }

    pub fn index_of(&self, expr: &Expr) -> Option<usize> {
        self.index.get(Self::normalize(expr)).copied()
    }

    /// Append a predicate. Returns its index, or `None` if it (or its
    /// negation) is already present or it is a constant.
    pub fn insert(&mut self, expr: Expr) -> Option<usize> {
        let expr = Self::normalize(&expr).clone();
        if matches!(expr, Expr::Bool(_)) || self.index.contains_key(&expr) {
            return None;
        }
        let i = self.predicates.len();
        self.index.insert(expr.clone(), i);
        self.predicates.push(expr);
        Some(i)
    }

    pub fn current_var(i: usize) -> u32 {
        2 * i as u32 + 1
    }

    pub fn successor_var(i: usize) -> u32 {
        2 * i as u32 + 2
    }

    pub fn current_vars(&self) -> Vec<u32> {
        (0..self.len()).map(Self::current_var).collect()
    }

    pub fn successor_vars(&self) -> Vec<u32> {
        (0..self.len()).map(Self::successor_var).collect()
    }

    /// Number of BDD variables in use (both copies).
    pub fn num_vars(&self) -> usize {
        2 * self.len()
    }

    pub fn literal(&self, i: usize, value: bool) -> Ref {
        self.bdd.mk_literal(Self::current_var(i), value)
    }

    pub fn successor_literal(&self, i: usize, value: bool) -> Ref {
        self.bdd.mk_literal(Self::successor_var(i), value)
    }

    /// `p_i` or `!p_i` as an expression.
    pub fn literal_expr(&self, i: usize, value: bool) -> Expr {
        let p = self.predicates[i].clone();
        if value {
            p
        } else {
            !p
        }
    }

    /// Conjunction of the predicate literals fixed by `valuation`.
    pub fn valuation_constraint(&self, valuation: &[bool]) -> Vec<Expr> {
        valuation
            .iter()
            .enumerate()
            .map(|(i, &b)| self.literal_expr(i, b))
            .collect()
    }

    pub fn encode_valuation(&self, valuation: &[bool]) -> Ref {
        self.bdd.cube(
            valuation
                .iter()
                .enumerate()
                .map(|(i, &b)| (Self::current_var(i), b)),
        )
    }

    pub fn encode_successor(&self, valuation: &[bool]) -> Ref {
        self.bdd.cube(
            valuation
                .iter()
                .enumerate()
                .map(|(i, &b)| (Self::successor_var(i), b)),
        )
    }

    /// Mapping of successor variables onto current variables.
    pub fn successor_to_current(&self) -> HashMap<u32, u32> {
        (0..self.len())
            .map(|i| (Self::successor_var(i), Self::current_var(i)))
            .collect()
    }

    pub fn current_to_successor(&self) -> HashMap<u32, u32> {
        (0..self.len())
            .map(|i| (Self::current_var(i), Self::successor_var(i)))
            .collect()
    }

    /// The abstract states (over current variables) of a boolean combination
    /// of predicates. `None` if `expr` mentions anything that is not a predicate.
    pub fn states_of(&self, expr: &Expr) -> Option<Ref> {
        if let Some(i) = self.index.get(expr) {
            return Some(self.literal(*i, true));
        }
        match expr {
            Expr::Bool(true) => Some(self.bdd.one),
            Expr::Bool(false) => Some(self.bdd.zero),
            Expr::Not(e) => self.states_of(e).map(|r| -r),
            Expr::And(items) => {
                let parts = items.iter().map(|e| self.states_of(e)).collect::<Option<Vec<_>>>()?;
                Some(self.bdd.apply_and_many(parts))
            }
            Expr::Or(items) => {
                let parts = items.iter().map(|e| self.states_of(e)).collect::<Option<Vec<_>>>()?;
                Some(self.bdd.apply_or_many(parts))
            }
            _ => None,
        }
    }
}
