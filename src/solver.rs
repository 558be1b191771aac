//! Numeric solver: value iteration on explicit models.
//!
//! Reachability values are computed from below with the prob-0 and prob-1
//! states fixed at 0 and 1. Once a sweep moves no value by more than the
//! tolerance, the values plus the requested precision are tried as an upper
//! bound: the guess is kept if one more sweep does not increase it, otherwise
//! the tolerance is halved and iteration resumes. Exceeding the iteration
//! limit is reported as [`SolverError::NonConvergence`].

use log::debug;

use crate::bitset::BitSet;
use crate::error::SolverError;
use crate::model::{Distribution, Dtmc, Game, Mdp};
use crate::types::OptimizationDirection;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SolverSettings {
    pub precision: f64,
    pub max_iterations: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            precision: 1e-9,
            max_iterations: 1_000_000,
        }
    }
}

/// Per-state values, and the (player 1 choice, player 2 option) picked in
/// every state if scheduler extraction was requested.
///
/// `values` approach the solution from below. `upper` is a verified upper
/// bound that exceeds `values` by at most the requested precision.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub values: Vec<f64>,
    pub upper: Vec<f64>,
    pub scheduler: Option<Vec<(usize, usize)>>,
    pub iterations: usize,
}

/// The states and directions of one reachability problem.
pub struct ReachabilityProblem<'a> {
    pub prob0: &'a BitSet,
    pub prob1: &'a BitSet,
    /// Initial guess; must not exceed the solution.
    pub start: Option<&'a [f64]>,
    pub produce_scheduler: bool,
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

fn expectation(dist: &Distribution, values: &[f64]) -> f64 {
    dist.iter().map(|&(t, p)| p * values[t]).sum()
}

fn best_option(options: &[Distribution], values: &[f64], dir: OptimizationDirection) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, dist) in options.iter().enumerate() {
        let v = expectation(dist, values);
        match best {
            Some((_, b)) if !dir.improves(v, b) => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

pub fn solve_game(
    game: &Game,
    problem: &ReachabilityProblem<'_>,
    p1: OptimizationDirection,
    p2: OptimizationDirection,
    settings: &SolverSettings,
) -> Result<Solution, SolverError> {
    let n = game.num_states();
    let fixed = |s: usize| problem.prob0.contains(s) || problem.prob1.contains(s);

    let mut values: Vec<f64> = (0..n)
        .map(|s| {
            if problem.prob1.contains(s) {
                1.0
            } else if problem.prob0.contains(s) {
                0.0
            } else {
                problem
                    .start
                    .and_then(|start| start.get(s).copied())
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0)
            }
        })
        .collect();

    let choice_value = |s: usize, values: &[f64]| -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (c, choice) in game.states[s].iter().enumerate() {
            if let Some((o, v)) = best_option(&choice.options, values, p2) {
                match best {
                    Some((_, _, b)) if !p1.improves(v, b) => {}
                    _ => best = Some((c, o, v)),
                }
            }
        }
        best
    };
    let step = |values: &[f64]| -> Vec<f64> {
        (0..n)
            .map(|s| {
                if fixed(s) {
                    values[s]
                } else {
                    choice_value(s, values).map(|(_, _, v)| v).unwrap_or(0.0)
                }
            })
            .collect()
    };

    let mut iterations = 0;
    let mut tolerance = settings.precision;
    let upper = loop {
        loop {
            if iterations >= settings.max_iterations {
                let residual = distance(&values, &step(&values));
                return Err(SolverError::NonConvergence { iterations, residual });
            }
            iterations += 1;
            let next = step(&values);
            let diff = distance(&values, &next);
            values = next;
            if diff <= tolerance {
                break;
            }
        }

        // Any vector the Bellman operator does not increase bounds the least fixpoint from above.
        let guess: Vec<f64> = (0..n)
            .map(|s| if fixed(s) { values[s] } else { (values[s] + settings.precision).min(1.0) })
            .collect();
        iterations += 1;
        let image = step(&guess);
        if image.iter().zip(&guess).all(|(&b, &u)| b.min(1.0) <= u) {
            break guess;
        }
        tolerance /= 2.0;
        debug!("upper guess rejected, tightening tolerance to {:e}", tolerance);
    };
    debug!("value iteration converged after {} iterations", iterations);

    let scheduler = problem.produce_scheduler.then(|| {
        (0..n)
            .map(|s| choice_value(s, &values).map(|(c, o, _)| (c, o)).unwrap_or((0, 0)))
            .collect()
    });

    Ok(Solution {
        values,
        upper,
        scheduler,
        iterations,
    })
}

pub fn solve_mdp(
    mdp: &Mdp,
    problem: &ReachabilityProblem<'_>,
    dir: OptimizationDirection,
    settings: &SolverSettings,
) -> Result<Solution, SolverError> {
    solve_game(&mdp.to_game(), problem, dir, dir, settings)
}

pub fn solve_dtmc(dtmc: &Dtmc, problem: &ReachabilityProblem<'_>, settings: &SolverSettings) -> Result<Solution, SolverError> {
    let dir = OptimizationDirection::Maximize;
    solve_game(&dtmc.to_mdp().to_game(), problem, dir, dir, settings)
}

/// Expected reward accumulated until reaching the target.
///
/// States that do not reach the target almost surely (those outside
/// `prob1`) get an infinite value. No upper guess is verified here, so
/// `upper` repeats `values`.
pub fn solve_dtmc_rewards(
    dtmc: &Dtmc,
    target: &BitSet,
    prob1: &BitSet,
    rewards: &[f64],
    settings: &SolverSettings,
) -> Result<Solution, SolverError> {
    let n = dtmc.num_states();
    let mut values: Vec<f64> = (0..n)
        .map(|s| if prob1.contains(s) { 0.0 } else { f64::INFINITY })
        .collect();
    let open = |s: usize| prob1.contains(s) && !target.contains(s);

    let mut iterations = 0;
    loop {
        if iterations >= settings.max_iterations {
            return Err(SolverError::NonConvergence {
                iterations,
                residual: f64::NAN,
            });
        }
        iterations += 1;

        let mut diff: f64 = 0.0;
        let next: Vec<f64> = (0..n)
            .map(|s| {
                if !open(s) {
                    return values[s];
                }
                let v = rewards.get(s).copied().unwrap_or(0.0) + expectation(&dtmc.transitions[s], &values);
                diff = diff.max((v - values[s]).abs());
                v
            })
            .collect();
        values = next;
        if diff <= settings.precision {
            break;
        }
    }

    Ok(Solution {
        upper: values.clone(),
        values,
        scheduler: None,
        iterations,
    })
}
