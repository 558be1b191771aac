//! Predicate abstraction of a single guarded command.
//!
//! For every abstract source region (a valuation of the predicates) in which
//! the guard may hold, an [`AbstractCommand`] keeps the set of feasible
//! successor tuples: one successor valuation per probabilistic update, all
//! realized by a single concrete source state. Keeping the tuples joint
//! (rather than one successor set per update) is what makes the menu game
//! exact with respect to the predicates.
//!
//! The caches are grown one predicate at a time. Adding predicate `k` splits
//! each cached region on the two truth values of `p_k` and extends each
//! cached tuple update by update with the truth value of the weakest
//! precondition `p_k[x := e_j]`. No query involving only older predicates is
//! ever issued again.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;

use crate::error::{BuildError, CheckError};
use crate::expr::Expr;
use crate::oracle::{CachingOracle, Oracle};
use crate::predicate::PredicateSet;
use crate::program::Command;
use crate::reference::Ref;
use crate::types::Valuation;

/// One successor valuation per update of the command.
pub type Outcome = Vec<Valuation>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionEntry {
    /// The guard may also be false for some concrete state of the region.
    pub partial: bool,
    /// Feasible successor tuples.
    pub outcomes: BTreeSet<Outcome>,
}

pub struct AbstractCommand {
    id: (usize, usize),
    command: Command,
    track_partial: bool,
    predicate_count: usize,
    regions: BTreeMap<Valuation, RegionEntry>,
    /// `preconditions[i][j]` is predicate `i` under update `j`.
    preconditions: Vec<Vec<Expr>>,
    guard_memo: Option<(usize, Ref)>,
    partial_memo: Option<(usize, Ref)>,
    update_memo: HashMap<usize, (usize, Ref)>,
}

impl AbstractCommand {
    /// Abstract `command` over the empty predicate set.
    pub fn new<O: Oracle>(
        id: (usize, usize),
        command: Command,
        track_partial: bool,
        oracle: &mut CachingOracle<O>,
    ) -> Result<Self, BuildError> {
        let mut regions = BTreeMap::new();
        if oracle.is_satisfiable(&command.guard)? {
            let partial = track_partial && oracle.is_satisfiable(&!command.guard.clone())?;
            let outcomes = BTreeSet::from([vec![Vec::new(); command.updates.len()]]);
            regions.insert(Vec::new(), RegionEntry { partial, outcomes });
        }
        Ok(Self {
            id,
            command,
            track_partial,
            predicate_count: 0,
            regions,
            preconditions: Vec::new(),
            guard_memo: None,
            partial_memo: None,
            update_memo: HashMap::new(),
        })
    }

    pub fn id(&self) -> (usize, usize) {
        self.id
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn num_updates(&self) -> usize {
        self.command.updates.len()
    }

    pub fn predicate_count(&self) -> usize {
        self.predicate_count
    }

    pub fn regions(&self) -> &BTreeMap<Valuation, RegionEntry> {
        &self.regions
    }

    /// Bring the caches up to date with all predicates of `predicates`.
    pub fn extend<O: Oracle>(
        &mut self,
        predicates: &PredicateSet,
        oracle: &mut CachingOracle<O>,
    ) -> Result<(), BuildError> {
        while self.predicate_count < predicates.len() {
            self.add_predicate(predicates, oracle)?;
        }
        Ok(())
    }

    fn add_predicate<O: Oracle>(
        &mut self,
        predicates: &PredicateSet,
        oracle: &mut CachingOracle<O>,
    ) -> Result<(), BuildError> {
        let k = self.predicate_count;
        let p = predicates.get(k);
        let wps: Vec<Expr> = self
            .command
            .updates
            .iter()
            .map(|u| p.substitute(&u.substitution()))
            .collect();

        let guard = &self.command.guard;
        let mut regions = BTreeMap::new();
        for (val, entry) in &self.regions {
            let val_constraint = predicates.valuation_constraint(val);
            for b in [false, true] {
                let lit = predicates.literal_expr(k, b);

                let mut base = Vec::with_capacity(val_constraint.len() + 2);
                base.push(guard.clone());
                base.extend(val_constraint.iter().cloned());
                base.push(lit.clone());
                if !oracle.is_satisfiable(&Expr::and(base.clone()))? {
                    continue;
                }

                let partial = if entry.partial {
                    let mut negated = Vec::with_capacity(val_constraint.len() + 2);
                    negated.push(!guard.clone());
                    negated.extend(val_constraint.iter().cloned());
                    negated.push(lit);
                    oracle.is_satisfiable(&Expr::and(negated))?
                } else {
                    false
                };

                let mut outcomes = BTreeSet::new();
                for tuple in &entry.outcomes {
                    let mut query = base.clone();
                    for (j, succ) in tuple.iter().enumerate() {
                        for (i, &bit) in succ.iter().enumerate() {
                            query.push(literal(&self.preconditions[i][j], bit));
                        }
                    }
                    let mut bits = Vec::with_capacity(wps.len());
                    extend_tuple(p, b, &wps, &mut query, &mut bits, tuple, &mut outcomes, oracle)?;
                }

                let mut new_val = val.clone();
                new_val.push(b);
                regions.insert(new_val, RegionEntry { partial, outcomes });
            }
        }

        debug!(
            "command {:?}: predicate {} split {} regions into {}",
            self.id,
            k,
            self.regions.len(),
            regions.len()
        );

        self.regions = regions;
        self.preconditions.push(wps);
        self.predicate_count += 1;
        Ok(())
    }

    fn ensure_current(&self, predicates: &PredicateSet) -> Result<(), CheckError> {
        if self.predicate_count != predicates.len() {
            return Err(CheckError::InvariantViolation(format!(
                "command {:?} abstracted for {} predicates, but {} are active",
                self.id,
                self.predicate_count,
                predicates.len()
            )));
        }
        Ok(())
    }

    /// Source states in which the guard may hold.
    pub fn abstract_guard(&mut self, predicates: &PredicateSet) -> Result<Ref, CheckError> {
        self.ensure_current(predicates)?;
        if let Some((count, res)) = self.guard_memo {
            if count == self.predicate_count {
                return Ok(res);
            }
        }
        let bdd = predicates.bdd();
        let res = bdd.apply_or_many(self.regions.keys().map(|v| predicates.encode_valuation(v)));
        self.guard_memo = Some((self.predicate_count, res));
        Ok(res)
    }

    /// Source states in which the guard may also be false.
    pub fn partial_states(&mut self, predicates: &PredicateSet) -> Result<Ref, CheckError> {
        self.ensure_current(predicates)?;
        if let Some((count, res)) = self.partial_memo {
            if count == self.predicate_count {
                return Ok(res);
            }
        }
        let bdd = predicates.bdd();
        let res = bdd.apply_or_many(
            self.regions
                .iter()
                .filter(|(_, e)| e.partial)
                .map(|(v, _)| predicates.encode_valuation(v)),
        );
        self.partial_memo = Some((self.predicate_count, res));
        Ok(res)
    }

    /// Relation over (current, successor) variables of update `option`.
    pub fn abstract_update(&mut self, option: usize, predicates: &PredicateSet) -> Result<Ref, CheckError> {
        self.ensure_current(predicates)?;
        if option >= self.num_updates() {
            return Err(CheckError::InvariantViolation(format!(
                "command {:?} has no update {}",
                self.id, option
            )));
        }
        if let Some(&(count, res)) = self.update_memo.get(&option) {
            if count == self.predicate_count {
                return Ok(res);
            }
        }
        let bdd = predicates.bdd();
        let mut res = bdd.zero;
        for (val, entry) in &self.regions {
            let source = predicates.encode_valuation(val);
            let targets = bdd.apply_or_many(entry.outcomes.iter().map(|t| predicates.encode_successor(&t[option])));
            res = bdd.apply_or(res, bdd.apply_and(source, targets));
        }
        self.update_memo.insert(option, (self.predicate_count, res));
        Ok(res)
    }

    /// Union of the relations of all updates.
    pub fn transition_relation(&mut self, predicates: &PredicateSet) -> Result<Ref, CheckError> {
        let mut parts = Vec::with_capacity(self.num_updates());
        for option in 0..self.num_updates() {
            parts.push(self.abstract_update(option, predicates)?);
        }
        Ok(predicates.bdd().apply_or_many(parts))
    }
}

fn literal(e: &Expr, value: bool) -> Expr {
    if value {
        e.clone()
    } else {
        !e.clone()
    }
}

/// Extend `tuple` with the new predicate's successor bits, one update at a
/// time, keeping only feasible prefixes. `query` holds the constraints of the
/// prefix chosen so far.
#[allow(clippy::too_many_arguments)]
fn extend_tuple<O: Oracle>(
    p: &Expr,
    b: bool,
    wps: &[Expr],
    query: &mut Vec<Expr>,
    bits: &mut Vec<bool>,
    tuple: &Outcome,
    out: &mut BTreeSet<Outcome>,
    oracle: &mut CachingOracle<O>,
) -> Result<(), BuildError> {
    let j = bits.len();
    if j == wps.len() {
        let extended = tuple
            .iter()
            .zip(bits.iter())
            .map(|(succ, &bit)| {
                let mut succ = succ.clone();
                succ.push(bit);
                succ
            })
            .collect();
        out.insert(extended);
        return Ok(());
    }

    // Update leaves the predicate unchanged: the bit is the source bit.
    if &wps[j] == p {
        bits.push(b);
        extend_tuple(p, b, wps, query, bits, tuple, out, oracle)?;
        bits.pop();
        return Ok(());
    }

    for bit in [false, true] {
        query.push(literal(&wps[j], bit));
        if oracle.is_satisfiable(&Expr::and(query.clone()))? {
            bits.push(bit);
            extend_tuple(p, b, wps, query, bits, tuple, out, oracle)?;
            bits.pop();
        }
        query.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use test_log::test;

    use super::*;
    use crate::bdd::Bdd;
    use crate::oracle::EnumerationOracle;
    use crate::program::{ModelType, Module, Program, Update, VariableDecl};

    fn counter() -> Program {
        // x in 0..=2; [x < 2] -> 0.5: x' = x + 1  +  0.5: x' = x
        Program::new(
            ModelType::Dtmc,
            vec![VariableDecl::int("x", 0, 2, 0)],
            vec![Module::new(
                "m",
                vec![Command::new(
                    "inc",
                    Expr::lt(Expr::var("x"), Expr::int(2)),
                    vec![
                        Update::new(0.5, vec![("x", Expr::add(Expr::var("x"), Expr::int(1)))]),
                        Update::new(0.5, vec![]),
                    ],
                )],
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_predicate_set() {
        let program = counter();
        let mut oracle = CachingOracle::new(EnumerationOracle::new(&program));
        let cmd = program.modules[0].commands[0].clone();

        let ac = AbstractCommand::new((0, 0), cmd, true, &mut oracle).unwrap();
        assert_eq!(ac.regions().len(), 1);
        let entry = &ac.regions()[&vec![]];
        assert!(entry.partial);
        assert_eq!(entry.outcomes.len(), 1);
    }

    #[test]
    fn test_split_and_successors() {
        let program = counter();
        let mut oracle = CachingOracle::new(EnumerationOracle::new(&program));
        let bdd = Rc::new(Bdd::default());
        let mut preds = PredicateSet::new(bdd.clone());
        preds.insert(Expr::var_eq("x", 0));

        let cmd = program.modules[0].commands[0].clone();
        let mut ac = AbstractCommand::new((0, 0), cmd, true, &mut oracle).unwrap();
        ac.extend(&preds, &mut oracle).unwrap();

        // x = 0: the guard holds; the first update moves to x = 1, the second stays.
        let at_zero = &ac.regions()[&vec![true]];
        assert!(!at_zero.partial);
        assert_eq!(at_zero.outcomes, BTreeSet::from([vec![vec![false], vec![true]]]));

        // x != 0: x = 1 enables the guard, x = 2 does not.
        let elsewhere = &ac.regions()[&vec![false]];
        assert!(elsewhere.partial);
        assert_eq!(elsewhere.outcomes, BTreeSet::from([vec![vec![false], vec![false]]]));

        let guard = ac.abstract_guard(&preds).unwrap();
        assert_eq!(guard, bdd.one);
        let partial = ac.partial_states(&preds).unwrap();
        assert_eq!(partial, preds.encode_valuation(&[false]));
    }

    #[test]
    fn test_memoized_results_are_identical() {
        let program = counter();
        let mut oracle = CachingOracle::new(EnumerationOracle::new(&program));
        let mut preds = PredicateSet::new(Rc::new(Bdd::default()));
        preds.insert(Expr::var_eq("x", 1));

        let cmd = program.modules[0].commands[0].clone();
        let mut ac = AbstractCommand::new((0, 0), cmd, false, &mut oracle).unwrap();
        ac.extend(&preds, &mut oracle).unwrap();

        let g1 = ac.abstract_guard(&preds).unwrap();
        let u1 = ac.abstract_update(0, &preds).unwrap();
        let queries = oracle.stats().queries;
        let g2 = ac.abstract_guard(&preds).unwrap();
        let u2 = ac.abstract_update(0, &preds).unwrap();
        assert_eq!(g1, g2);
        assert_eq!(u1, u2);
        assert_eq!(oracle.stats().queries, queries);
    }

    #[test]
    fn test_stale_cache_is_detected() {
        let program = counter();
        let mut oracle = CachingOracle::new(EnumerationOracle::new(&program));
        let mut preds = PredicateSet::new(Rc::new(Bdd::default()));

        let cmd = program.modules[0].commands[0].clone();
        let mut ac = AbstractCommand::new((0, 0), cmd, false, &mut oracle).unwrap();
        preds.insert(Expr::var_eq("x", 1));

        let res = ac.abstract_guard(&preds);
        assert!(matches!(res, Err(CheckError::InvariantViolation(_))));
    }
}
