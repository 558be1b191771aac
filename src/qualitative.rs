//! Probability-0 and probability-1 fixpoints on explicit models.
//!
//! All model kinds are solved by the game algorithms: an MDP is a game in
//! which player 2 has a single option, a DTMC an MDP with a single choice.
//! Player directions turn into quantifiers: a maximizing player picks a
//! choice that exists, a minimizing one must cope with all of them.

use log::debug;

use crate::bitset::BitSet;
use crate::model::{Distribution, Dtmc, Game, Mdp};
use crate::types::OptimizationDirection;

/// States with probability exactly 0 and exactly 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualitativeResult {
    pub prob0: BitSet,
    pub prob1: BitSet,
}

/// Qualitative results of both bound computations. `min` belongs to the
/// lower bound, `max` to the upper bound. Exact models fill only `min`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualitativeResultMinMax {
    pub min: Option<QualitativeResult>,
    pub max: Option<QualitativeResult>,
}

impl QualitativeResultMinMax {
    /// The lower-bound side, falling back to the only side present.
    pub fn lower(&self) -> Option<&QualitativeResult> {
        self.min.as_ref().or(self.max.as_ref())
    }

    /// The upper-bound side, falling back to the only side present.
    pub fn upper(&self) -> Option<&QualitativeResult> {
        self.max.as_ref().or(self.min.as_ref())
    }
}

/// Known facts from an earlier round, projected onto the current states.
///
/// `positive` and `prob1` must be subsets of the true sets; `prob0` must be
/// a subset of the true prob-0 set and `prob1_superset` a superset of the
/// true prob-1 set. Under those conditions seeding changes only how fast the
/// fixpoints converge, not their result.
#[derive(Debug, Clone, Default)]
pub struct QualitativeSeeds {
    pub positive: Option<BitSet>,
    pub prob0: Option<BitSet>,
    pub prob1: Option<BitSet>,
    pub prob1_superset: Option<BitSet>,
}

fn quantify<T>(dir: OptimizationDirection, items: &[T], pred: impl Fn(&T) -> bool) -> bool {
    if items.is_empty() {
        return false;
    }
    match dir {
        OptimizationDirection::Maximize => items.iter().any(pred),
        OptimizationDirection::Minimize => items.iter().all(pred),
    }
}

/// States from which the target cannot be reached with positive probability.
pub fn prob0_game(
    game: &Game,
    constraint: &BitSet,
    target: &BitSet,
    p1: OptimizationDirection,
    p2: OptimizationDirection,
    seeds: &QualitativeSeeds,
) -> BitSet {
    let n = game.num_states();

    // E: states with positive probability.
    let mut positive = target.clone();
    if let Some(seed) = &seeds.positive {
        positive.union_with(seed);
    }
    let excluded = seeds.prob0.clone().unwrap_or_default();

    let mut iterations = 0;
    loop {
        iterations += 1;
        let mut changed = false;
        for s in 0..n {
            if positive.contains(s) || !constraint.contains(s) || excluded.contains(s) {
                continue;
            }
            let reaches = quantify(p1, &game.states[s], |choice| {
                quantify(p2, &choice.options, |dist: &Distribution| {
                    dist.iter().any(|&(t, p)| p > 0.0 && positive.contains(t))
                })
            });
            if reaches {
                positive.insert(s);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    debug!("prob0: {} iterations, {} positive states", iterations, positive.len());
    positive.complement(n)
}

/// States from which the target is reached with probability 1.
pub fn prob1_game(
    game: &Game,
    constraint: &BitSet,
    target: &BitSet,
    p1: OptimizationDirection,
    p2: OptimizationDirection,
    seeds: &QualitativeSeeds,
) -> BitSet {
    let n = game.num_states();

    let mut outer = match &seeds.prob1_superset {
        Some(bound) => {
            let mut y = bound.clone();
            y.union_with(target);
            y
        }
        None => BitSet::full(n),
    };

    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut inner = target.clone();
        if let Some(seed) = &seeds.prob1 {
            for s in seed.iter() {
                if outer.contains(s) {
                    inner.insert(s);
                }
            }
        }
        loop {
            let mut changed = false;
            for s in 0..n {
                if inner.contains(s) || !constraint.contains(s) || !outer.contains(s) {
                    continue;
                }
                let good = quantify(p1, &game.states[s], |choice| {
                    quantify(p2, &choice.options, |dist: &Distribution| {
                        dist.iter().all(|&(t, p)| p <= 0.0 || outer.contains(t))
                            && dist.iter().any(|&(t, p)| p > 0.0 && inner.contains(t))
                    })
                });
                if good {
                    inner.insert(s);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        if inner == outer {
            break;
        }
        outer = inner;
    }
    debug!("prob1: {} outer rounds, {} states", rounds, outer.len());
    outer
}

pub fn qualitative_game(
    game: &Game,
    constraint: &BitSet,
    target: &BitSet,
    p1: OptimizationDirection,
    p2: OptimizationDirection,
    seeds: &QualitativeSeeds,
) -> QualitativeResult {
    QualitativeResult {
        prob0: prob0_game(game, constraint, target, p1, p2, seeds),
        prob1: prob1_game(game, constraint, target, p1, p2, seeds),
    }
}

pub fn qualitative_mdp(
    mdp: &Mdp,
    constraint: &BitSet,
    target: &BitSet,
    dir: OptimizationDirection,
    seeds: &QualitativeSeeds,
) -> QualitativeResult {
    // Player 2 has one option per choice, so its direction is irrelevant.
    qualitative_game(&mdp.to_game(), constraint, target, dir, dir, seeds)
}

pub fn qualitative_dtmc(dtmc: &Dtmc, constraint: &BitSet, target: &BitSet, seeds: &QualitativeSeeds) -> QualitativeResult {
    let dir = OptimizationDirection::Maximize;
    qualitative_game(&dtmc.to_mdp().to_game(), constraint, target, dir, dir, seeds)
}
