//! The abstraction-refinement loop.
//!
//! [`RefinementDriver`] is independent of how abstractions are built: it
//! talks to them through the [`Abstraction`] capability trait. Each round
//! builds (or fetches) the abstract model, solves it qualitatively, stops
//! early if the states of interest are decided, otherwise computes a lower
//! and an upper bound and stops once they are close enough. If not, the
//! abstraction is asked to refine itself and the next round begins.
//!
//! The loop need not terminate on its own, so every check is bounded by a
//! [`Budget`] that is tested between rounds.

use std::rc::Rc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::bitset::BitSet;
use crate::config::{Budget, RefinementSettings};
use crate::error::CheckError;
use crate::model::{project, AbstractModel, StateKey};
use crate::qualitative::{qualitative_dtmc, qualitative_game, qualitative_mdp, QualitativeResult, QualitativeResultMinMax, QualitativeSeeds};
use crate::solver::{solve_dtmc, solve_dtmc_rewards, solve_game, solve_mdp, ReachabilityProblem, Solution};
use crate::task::{CheckResult, CheckTask, Formula, ResultStatus, StateValue, UnresolvedReason};
use crate::types::OptimizationDirection;

/// The player whose choices stem from the abstraction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AbstractionPlayer {
    /// The model is exact.
    None,
    Player1,
    Player2,
}

/// What the driver hands back to an abstraction asked to refine itself.
pub struct RefinementFeedback<'a> {
    pub round: usize,
    pub model: &'a AbstractModel,
    pub qualitative: &'a QualitativeResultMinMax,
    pub bounds: &'a Bounds,
}

/// Capabilities the driver needs from an abstraction technique.
pub trait Abstraction {
    fn name(&self) -> &str;

    /// Prepare for checking `task` (a reachability task, with `Globally`
    /// already rewritten). Called once, before the first round.
    fn initialize(&mut self, task: &CheckTask) -> Result<(), CheckError>;

    fn abstract_model(&mut self) -> Result<Rc<AbstractModel>, CheckError>;

    /// The constraint and target states of the task in `model`.
    fn constraint_and_target_states(&self, model: &AbstractModel) -> Result<(BitSet, BitSet), CheckError>;

    fn abstraction_player(&self) -> AbstractionPlayer;

    fn requires_scheduler_synthesis(&self) -> bool;

    /// Returns false if the abstraction could not be refined any further.
    fn refine_abstract_model(&mut self, feedback: &RefinementFeedback<'_>) -> Result<bool, CheckError>;

    /// Whether the concrete model has nondeterminism of its own.
    fn is_nondeterministic(&self) -> bool;

    fn supports_reachability_rewards(&self) -> bool {
        false
    }

    fn state_rewards(&self, _model: &AbstractModel, reward_model: Option<&str>) -> Result<Vec<f64>, CheckError> {
        Err(CheckError::PropertyUnsupported(format!(
            "{} does not support reward model {:?}",
            self.name(),
            reward_model
        )))
    }
}

/// Bound vectors over the states of the abstract model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bounds {
    pub lower: Option<Vec<f64>>,
    pub upper: Option<Vec<f64>>,
    pub lower_scheduler: Option<Vec<(usize, usize)>>,
    pub upper_scheduler: Option<Vec<(usize, usize)>>,
}

impl Bounds {
    /// (lower, upper) at state `s`, falling back to the only side present.
    pub fn at(&self, s: usize) -> (f64, f64) {
        let lower = self.lower.as_ref().or(self.upper.as_ref()).map(|v| v[s]);
        let upper = self.upper.as_ref().or(self.lower.as_ref()).map(|v| v[s]);
        (lower.unwrap_or(0.0), upper.unwrap_or(1.0))
    }

    pub fn gap(&self, s: usize) -> f64 {
        let (lower, upper) = self.at(s);
        upper - lower
    }
}

/// A reachability task derived from the user's task. `Globally` formulas
/// are complemented: `P(G φ) = 1 - P(F ¬φ)` with the direction flipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityQuery {
    pub task: CheckTask,
    pub complement: bool,
}

impl ReachabilityQuery {
    pub fn new(task: &CheckTask) -> Self {
        match &task.formula {
            Formula::Globally(phi) => {
                let mut inner = task.clone();
                inner.formula = Formula::Eventually(!phi.clone());
                inner.direction = task.direction.map(OptimizationDirection::flip);
                Self {
                    task: inner,
                    complement: true,
                }
            }
            _ => Self {
                task: task.clone(),
                complement: false,
            },
        }
    }

    fn is_reward(&self) -> bool {
        self.task.formula.is_reward()
    }

    fn finish(&self, value: StateValue) -> StateValue {
        if !self.complement {
            return value;
        }
        match value {
            StateValue::Value(v) => StateValue::Value(1.0 - v),
            StateValue::Unresolved { lower, upper } => StateValue::Unresolved {
                lower: 1.0 - upper,
                upper: 1.0 - lower,
            },
            truth => truth,
        }
    }
}

/// Player directions and states of one bound computation.
#[derive(Debug, Clone)]
pub struct BoundSide {
    pub p1: OptimizationDirection,
    pub p2: OptimizationDirection,
    pub constraint: BitSet,
    pub target: BitSet,
}

/// The lower-bound side, and the upper-bound side unless the model is exact.
#[derive(Debug, Clone)]
pub struct RoundSides {
    pub lower: BoundSide,
    pub upper: Option<BoundSide>,
}

/// Directions of (player 1, player 2) for a bound computed in direction `bound`.
pub fn player_directions(
    player: AbstractionPlayer,
    task_direction: Option<OptimizationDirection>,
    bound: OptimizationDirection,
) -> (OptimizationDirection, OptimizationDirection) {
    let other = task_direction.unwrap_or(bound);
    match player {
        AbstractionPlayer::None => (other, other),
        AbstractionPlayer::Player1 => (bound, other),
        AbstractionPlayer::Player2 => (other, bound),
    }
}

/// Abstract state count and bounds at the states of interest after a round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord {
    pub round: usize,
    pub num_states: usize,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub rounds: usize,
    pub qualitative_computations: usize,
    pub bound_computations: usize,
    pub refinements: usize,
}

struct PreviousRound {
    keys: Vec<StateKey>,
    qualitative: QualitativeResultMinMax,
    bounds: Bounds,
    initial: Vec<usize>,
}

pub struct RefinementDriver {
    settings: RefinementSettings,
    budget: Budget,
    statistics: Statistics,
    history: Vec<RoundRecord>,
    previous: Option<PreviousRound>,
}

fn project_subset(old: &BitSet, map: &[Option<usize>]) -> BitSet {
    BitSet::from_indices(map.len(), (0..map.len()).filter(|&i| map[i].is_some_and(|o| old.contains(o))))
}

fn project_superset(old: &BitSet, map: &[Option<usize>]) -> BitSet {
    BitSet::from_indices(map.len(), (0..map.len()).filter(|&i| map[i].map_or(true, |o| old.contains(o))))
}

impl RefinementDriver {
    pub fn new(settings: &RefinementSettings, budget: Budget) -> Self {
        Self {
            settings: *settings,
            budget,
            statistics: Statistics::default(),
            history: Vec::new(),
            previous: None,
        }
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn history(&self) -> &[RoundRecord] {
        &self.history
    }

    /// Reject tasks the abstraction cannot answer, before any work is done.
    pub fn check_property_support(&self, abstraction: &dyn Abstraction, task: &CheckTask) -> Result<(), CheckError> {
        if task.direction.is_none() && abstraction.is_nondeterministic() {
            return Err(CheckError::PropertyUnsupported(
                "an optimization direction is required for nondeterministic models".to_string(),
            ));
        }
        if task.formula.is_reward() && !abstraction.supports_reachability_rewards() {
            return Err(CheckError::PropertyUnsupported(format!(
                "{} does not support reachability rewards",
                abstraction.name()
            )));
        }
        if task.precision.is_nan() || task.precision < 0.0 {
            return Err(CheckError::PropertyUnsupported(format!("invalid precision {}", task.precision)));
        }
        Ok(())
    }

    pub fn check(&mut self, abstraction: &mut dyn Abstraction, task: &CheckTask) -> Result<CheckResult, CheckError> {
        self.check_property_support(abstraction, task)?;
        let query = ReachabilityQuery::new(task);
        abstraction.initialize(&query.task)?;

        self.statistics = Statistics::default();
        self.history.clear();
        self.previous = None;

        info!("checking {} with {}", task.formula, abstraction.name());
        let start = Instant::now();
        let mut round = 0;
        loop {
            if round >= self.budget.max_rounds {
                warn!("round budget of {} exhausted", self.budget.max_rounds);
                return Ok(self.unresolved(&query, round, UnresolvedReason::IterationBudget));
            }
            if let Some(limit) = self.budget.time_limit {
                if start.elapsed() >= limit {
                    warn!("time limit of {:?} exhausted after {} rounds", limit, round);
                    return Ok(self.unresolved(&query, round, UnresolvedReason::Deadline));
                }
            }
            round += 1;
            self.statistics.rounds = round;

            let model = abstraction.abstract_model()?;
            let (constraint, target) = abstraction.constraint_and_target_states(&model)?;
            let sides = self.round_sides(abstraction.abstraction_player(), &query, &model, constraint, target);

            let qualitative = self.compute_qualitative_result(&model, &sides)?;
            if let Some(values) = self.check_for_result_after_qualitative_check(&model, &query, &sides, &qualitative) {
                info!("round {}: resolved by qualitative analysis", round);
                self.record_resolved(round, &model, &query, &values);
                return Ok(CheckResult {
                    values: values.into_iter().map(|v| query.finish(v)).collect(),
                    rounds: round,
                    status: ResultStatus::Resolved,
                });
            }

            let bounds = if self.skip_quantitative_solution(&model, &query, &qualitative) {
                debug!("round {}: skipping quantitative solution", round);
                self.bounds_from_qualitative(&model, &qualitative)
            } else {
                self.compute_bounds(abstraction, &model, &query, &sides, &qualitative)?
            };
            self.record_round(round, &model, &query, &bounds);

            if !query.task.qualitative {
                if let Some(values) = self.try_to_obtain_result_from_bounds(&model, &query, &bounds) {
                    info!("round {}: bounds are sufficiently close", round);
                    return Ok(CheckResult {
                        values: values.into_iter().map(|v| query.finish(v)).collect(),
                        rounds: round,
                        status: ResultStatus::Resolved,
                    });
                }
            }

            let feedback = RefinementFeedback {
                round,
                model: &model,
                qualitative: &qualitative,
                bounds: &bounds,
            };
            let refined = abstraction.refine_abstract_model(&feedback)?;
            self.previous = Some(PreviousRound {
                keys: model.keys().to_vec(),
                initial: model.initial().to_vec(),
                qualitative,
                bounds,
            });
            if !refined {
                warn!("round {}: refinement made no progress", round);
                return Ok(self.unresolved(&query, round, UnresolvedReason::NoRefinementProgress));
            }
            self.statistics.refinements += 1;
        }
    }

    fn round_sides(
        &self,
        player: AbstractionPlayer,
        query: &ReachabilityQuery,
        model: &AbstractModel,
        constraint: BitSet,
        target: BitSet,
    ) -> RoundSides {
        let side = |bound: OptimizationDirection| {
            let (p1, p2) = player_directions(player, query.task.direction, bound);
            let mut constraint = constraint.clone();
            let mut target = target.clone();
            // Bottom punishes player 1: worth 1 to a minimizer, 0 to a maximizer.
            if let Some(b) = model.bottom() {
                constraint.remove(b);
                if p1.is_minimize() {
                    target.insert(b);
                } else {
                    target.remove(b);
                }
            }
            BoundSide {
                p1,
                p2,
                constraint,
                target,
            }
        };
        match player {
            AbstractionPlayer::None => RoundSides {
                lower: side(query.task.direction.unwrap_or(OptimizationDirection::Minimize)),
                upper: None,
            },
            _ => RoundSides {
                lower: side(OptimizationDirection::Minimize),
                upper: Some(side(OptimizationDirection::Maximize)),
            },
        }
    }

    fn seeds(&self, model: &AbstractModel, lower: bool) -> QualitativeSeeds {
        let Some(previous) = self.previous.as_ref().filter(|_| self.settings.reuse_qualitative) else {
            return QualitativeSeeds::default();
        };
        let map = project(&previous.keys, model.keys());
        let old_n = previous.keys.len();
        if lower {
            match &previous.qualitative.min {
                Some(old) => QualitativeSeeds {
                    positive: Some(project_subset(&old.prob0.complement(old_n), &map)),
                    prob1: Some(project_subset(&old.prob1, &map)),
                    ..Default::default()
                },
                None => QualitativeSeeds::default(),
            }
        } else {
            match &previous.qualitative.max {
                Some(old) => QualitativeSeeds {
                    prob0: Some(project_subset(&old.prob0, &map)),
                    prob1_superset: Some(project_superset(&old.prob1, &map)),
                    ..Default::default()
                },
                None => QualitativeSeeds::default(),
            }
        }
    }

    fn qualitative_side(model: &AbstractModel, side: &BoundSide, seeds: &QualitativeSeeds) -> QualitativeResult {
        match model {
            AbstractModel::Dtmc(m) => qualitative_dtmc(m, &side.constraint, &side.target, seeds),
            AbstractModel::Mdp(m) => qualitative_mdp(m, &side.constraint, &side.target, side.p1, seeds),
            AbstractModel::Game(g) => qualitative_game(g, &side.constraint, &side.target, side.p1, side.p2, seeds),
        }
    }

    /// Prob-0 and prob-1 states of both bound computations.
    pub fn compute_qualitative_result(
        &mut self,
        model: &AbstractModel,
        sides: &RoundSides,
    ) -> Result<QualitativeResultMinMax, CheckError> {
        let min = Self::qualitative_side(model, &sides.lower, &self.seeds(model, true));
        let max = sides
            .upper
            .as_ref()
            .map(|side| Self::qualitative_side(model, side, &self.seeds(model, false)));
        let result = QualitativeResultMinMax { min: Some(min), max };
        self.statistics.qualitative_computations += 1;

        if self.settings.check_invariants {
            self.check_qualitative_monotonicity(model, &result)?;
        }
        Ok(result)
    }

    fn check_qualitative_monotonicity(&self, model: &AbstractModel, result: &QualitativeResultMinMax) -> Result<(), CheckError> {
        let Some(previous) = &self.previous else {
            return Ok(());
        };
        let map = project(&previous.keys, model.keys());
        let violation = |what: &str, s: usize| {
            Err(CheckError::InvariantViolation(format!(
                "{} at state {:?} is not monotone across refinement",
                what,
                model.keys()[s]
            )))
        };
        for (s, o) in map.iter().enumerate() {
            let Some(o) = *o else { continue };
            if let (Some(old), Some(new)) = (&previous.qualitative.min, &result.min) {
                if !old.prob0.contains(o) && new.prob0.contains(s) {
                    return violation("lower prob0", s);
                }
                if old.prob1.contains(o) && !new.prob1.contains(s) {
                    return violation("lower prob1", s);
                }
            }
            if let (Some(old), Some(new)) = (&previous.qualitative.max, &result.max) {
                if old.prob0.contains(o) && !new.prob0.contains(s) {
                    return violation("upper prob0", s);
                }
                if !old.prob1.contains(o) && new.prob1.contains(s) {
                    return violation("upper prob1", s);
                }
            }
        }
        Ok(())
    }

    /// A final answer if the qualitative analysis decides every state of interest.
    pub fn check_for_result_after_qualitative_check(
        &self,
        model: &AbstractModel,
        query: &ReachabilityQuery,
        sides: &RoundSides,
        qualitative: &QualitativeResultMinMax,
    ) -> Option<Vec<StateValue>> {
        let lower = qualitative.lower()?;
        let upper = qualitative.upper()?;
        let mut values = Vec::with_capacity(model.initial().len());
        for &s in model.initial() {
            let value = if query.task.qualitative {
                if query.complement {
                    // G φ holds almost surely iff F ¬φ has probability 0.
                    if upper.prob0.contains(s) {
                        StateValue::Truth(true)
                    } else if !lower.prob0.contains(s) {
                        StateValue::Truth(false)
                    } else {
                        return None;
                    }
                } else if lower.prob1.contains(s) {
                    StateValue::Truth(true)
                } else if !upper.prob1.contains(s) {
                    StateValue::Truth(false)
                } else {
                    return None;
                }
            } else if query.is_reward() {
                if !upper.prob1.contains(s) {
                    StateValue::Value(f64::INFINITY)
                } else if sides.lower.target.contains(s) {
                    StateValue::Value(0.0)
                } else {
                    return None;
                }
            } else if upper.prob0.contains(s) {
                StateValue::Value(0.0)
            } else if lower.prob1.contains(s) {
                StateValue::Value(1.0)
            } else {
                return None;
            };
            values.push(value);
        }
        Some(values)
    }

    /// Whether the qualitative bounds alone are as precise as requested.
    pub fn skip_quantitative_solution(&self, model: &AbstractModel, query: &ReachabilityQuery, qualitative: &QualitativeResultMinMax) -> bool {
        if query.task.qualitative {
            return true;
        }
        if query.is_reward() {
            return false;
        }
        let bounds = self.bounds_from_qualitative(model, qualitative);
        model.initial().iter().all(|&s| bounds.gap(s) <= query.task.precision)
    }

    fn bounds_from_qualitative(&self, model: &AbstractModel, qualitative: &QualitativeResultMinMax) -> Bounds {
        let n = model.num_states();
        let lower = qualitative
            .lower()
            .map(|q| (0..n).map(|s| if q.prob1.contains(s) { 1.0 } else { 0.0 }).collect());
        let upper = qualitative
            .upper()
            .map(|q| (0..n).map(|s| if q.prob0.contains(s) { 0.0 } else { 1.0 }).collect());
        Bounds {
            lower,
            upper,
            ..Default::default()
        }
    }

    fn solve_side(
        &self,
        model: &AbstractModel,
        side: &BoundSide,
        qualitative: &QualitativeResult,
        start: Option<&[f64]>,
        produce_scheduler: bool,
    ) -> Result<Solution, CheckError> {
        let problem = ReachabilityProblem {
            prob0: &qualitative.prob0,
            prob1: &qualitative.prob1,
            start,
            produce_scheduler,
        };
        let solver = &self.settings.solver;
        let solution = match model {
            AbstractModel::Dtmc(m) => solve_dtmc(m, &problem, solver)?,
            AbstractModel::Mdp(m) => solve_mdp(m, &problem, side.p1, solver)?,
            AbstractModel::Game(g) => solve_game(g, &problem, side.p1, side.p2, solver)?,
        };
        Ok(solution)
    }

    /// Solve the lower and (if the model is not exact) the upper bound problem.
    pub fn compute_bounds(
        &mut self,
        abstraction: &dyn Abstraction,
        model: &AbstractModel,
        query: &ReachabilityQuery,
        sides: &RoundSides,
        qualitative: &QualitativeResultMinMax,
    ) -> Result<Bounds, CheckError> {
        self.statistics.bound_computations += 1;
        let missing = || CheckError::InvariantViolation("qualitative result missing".to_string());

        if query.is_reward() {
            let AbstractModel::Dtmc(dtmc) = model else {
                return Err(CheckError::PropertyUnsupported(
                    "expected rewards are only supported for exact DTMCs".to_string(),
                ));
            };
            let rewards = abstraction.state_rewards(model, query.task.reward_model.as_deref())?;
            let q = qualitative.lower().ok_or_else(missing)?;
            let solution = solve_dtmc_rewards(dtmc, &sides.lower.target, &q.prob1, &rewards, &self.settings.solver)?;
            return Ok(Bounds {
                lower: Some(solution.values),
                ..Default::default()
            });
        }

        let map = self.previous.as_ref().map(|p| project(&p.keys, model.keys()));
        let projected = |values: Option<&Vec<f64>>| -> Option<Vec<Option<f64>>> {
            let values = values?;
            let map = map.as_ref()?;
            Some(map.iter().map(|o| o.map(|o| values[o])).collect())
        };
        let (old_lower, old_upper) = if self.settings.reuse_quantitative {
            let previous = self.previous.as_ref();
            (
                projected(previous.and_then(|p| p.bounds.lower.as_ref())),
                projected(previous.and_then(|p| p.bounds.upper.as_ref())),
            )
        } else {
            (None, None)
        };

        let schedulers = abstraction.requires_scheduler_synthesis();
        let start: Option<Vec<f64>> = old_lower
            .as_ref()
            .map(|old| old.iter().map(|v| v.unwrap_or(0.0)).collect());

        let lower_q = qualitative.min.as_ref().ok_or_else(missing)?;
        let lower = self.solve_side(model, &sides.lower, lower_q, start.as_deref(), schedulers)?;
        let upper = match (&sides.upper, &qualitative.max) {
            (Some(side), Some(q)) => Some(self.solve_side(model, side, q, None, schedulers)?),
            _ => None,
        };

        let mut lower_values = lower.values;
        if let Some(old) = &old_lower {
            for (v, o) in lower_values.iter_mut().zip(old) {
                if let Some(o) = o {
                    *v = v.max(*o);
                }
            }
        }
        let (upper_values, upper_scheduler) = match upper {
            Some(upper) => {
                let mut values = upper.upper;
                if let Some(old) = &old_upper {
                    for (v, o) in values.iter_mut().zip(old) {
                        if let Some(o) = o {
                            *v = v.min(*o);
                        }
                    }
                }
                (Some(values), upper.scheduler)
            }
            None => (None, None),
        };

        Ok(Bounds {
            lower: Some(lower_values),
            upper: upper_values,
            lower_scheduler: lower.scheduler,
            upper_scheduler,
        })
    }

    /// A final answer if the bounds determine the value at every state of interest.
    pub fn try_to_obtain_result_from_bounds(
        &self,
        model: &AbstractModel,
        query: &ReachabilityQuery,
        bounds: &Bounds,
    ) -> Option<Vec<StateValue>> {
        match (&bounds.lower, &bounds.upper) {
            (Some(values), None) | (None, Some(values)) => {
                Some(model.initial().iter().map(|&s| StateValue::Value(values[s])).collect())
            }
            (Some(lower), Some(upper)) => {
                let max_gap = model
                    .initial()
                    .iter()
                    .map(|&s| upper[s] - lower[s])
                    .fold(0.0, f64::max);
                if max_gap <= query.task.precision {
                    Some(
                        model
                            .initial()
                            .iter()
                            .map(|&s| StateValue::Value((lower[s] + upper[s]) / 2.0))
                            .collect(),
                    )
                } else {
                    debug!("bound gap {} exceeds precision {}", max_gap, query.task.precision);
                    None
                }
            }
            (None, None) => None,
        }
    }

    fn finished_bounds(query: &ReachabilityQuery, lower: f64, upper: f64) -> (f64, f64) {
        if query.complement {
            (1.0 - upper, 1.0 - lower)
        } else {
            (lower, upper)
        }
    }

    fn record_round(&mut self, round: usize, model: &AbstractModel, query: &ReachabilityQuery, bounds: &Bounds) {
        let (lower, upper): (Vec<f64>, Vec<f64>) = model
            .initial()
            .iter()
            .map(|&s| {
                let (l, u) = bounds.at(s);
                Self::finished_bounds(query, l, u)
            })
            .unzip();
        info!(
            "round {}: {} abstract states, bounds {:?} .. {:?}",
            round,
            model.num_states(),
            lower,
            upper
        );
        self.history.push(RoundRecord {
            round,
            num_states: model.num_states(),
            lower,
            upper,
        });
    }

    fn record_resolved(&mut self, round: usize, model: &AbstractModel, query: &ReachabilityQuery, values: &[StateValue]) {
        let (lower, upper): (Vec<f64>, Vec<f64>) = values
            .iter()
            .map(|v| match query.finish(*v) {
                StateValue::Value(x) => (x, x),
                StateValue::Unresolved { lower, upper } => (lower, upper),
                StateValue::Truth(_) => (0.0, 1.0),
            })
            .unzip();
        self.history.push(RoundRecord {
            round,
            num_states: model.num_states(),
            lower,
            upper,
        });
    }

    fn unresolved(&self, query: &ReachabilityQuery, rounds: usize, reason: UnresolvedReason) -> CheckResult {
        let values = match &self.previous {
            Some(previous) => previous
                .initial
                .iter()
                .map(|&s| {
                    let (lower, upper) = previous.bounds.at(s);
                    query.finish(StateValue::Unresolved { lower, upper })
                })
                .collect(),
            // No abstract model yet, so the initial states are covered by one trivial marker.
            None => vec![query.finish(StateValue::Unresolved { lower: 0.0, upper: 1.0 })],
        };
        CheckResult {
            values,
            rounds,
            status: ResultStatus::Unresolved(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Game, Player1Choice};
    use crate::types::OptimizationDirection::{Maximize, Minimize};

    #[test]
    fn test_player_directions() {
        assert_eq!(player_directions(AbstractionPlayer::Player2, Some(Maximize), Minimize), (Maximize, Minimize));
        assert_eq!(player_directions(AbstractionPlayer::Player2, None, Maximize), (Maximize, Maximize));
        assert_eq!(player_directions(AbstractionPlayer::Player1, Some(Maximize), Minimize), (Minimize, Maximize));
        assert_eq!(player_directions(AbstractionPlayer::None, Some(Minimize), Maximize), (Minimize, Minimize));
    }

    #[test]
    fn test_globally_is_complemented() {
        let phi = crate::expr::Expr::var("safe");
        let task = CheckTask::new(Formula::Globally(phi.clone())).with_direction(Maximize);
        let query = ReachabilityQuery::new(&task);
        assert!(query.complement);
        assert_eq!(query.task.formula, Formula::Eventually(!phi));
        assert_eq!(query.task.direction, Some(Minimize));
        assert_eq!(query.finish(StateValue::Value(0.25)), StateValue::Value(0.75));
        assert_eq!(
            query.finish(StateValue::Unresolved { lower: 0.1, upper: 0.3 }),
            StateValue::Unresolved { lower: 0.7, upper: 0.9 }
        );
    }

    #[test]
    fn test_bounds_fallback() {
        let bounds = Bounds {
            lower: Some(vec![0.4]),
            ..Default::default()
        };
        assert_eq!(bounds.at(0), (0.4, 0.4));
        assert_eq!(Bounds::default().at(0), (0.0, 1.0));
    }

    /// A fixed game whose target set shrinks after the first refinement.
    struct ShrinkingTarget {
        model: Rc<AbstractModel>,
        refined: bool,
    }

    impl ShrinkingTarget {
        fn new() -> Self {
            let choice = |options: Vec<Vec<(usize, f64)>>| Player1Choice {
                label: String::new(),
                command: None,
                options,
            };
            let game = Game {
                states: vec![
                    vec![choice(vec![vec![(1, 1.0)], vec![(2, 1.0)]])],
                    vec![choice(vec![vec![(1, 1.0)]])],
                    vec![choice(vec![vec![(2, 1.0)]])],
                ],
                initial: vec![0],
                keys: (0..3).map(StateKey::Index).collect(),
                bottom: None,
            };
            Self {
                model: Rc::new(AbstractModel::Game(game)),
                refined: false,
            }
        }
    }

    impl Abstraction for ShrinkingTarget {
        fn name(&self) -> &str {
            "shrinking target"
        }

        fn initialize(&mut self, _task: &CheckTask) -> Result<(), CheckError> {
            Ok(())
        }

        fn abstract_model(&mut self) -> Result<Rc<AbstractModel>, CheckError> {
            Ok(Rc::clone(&self.model))
        }

        fn constraint_and_target_states(&self, model: &AbstractModel) -> Result<(BitSet, BitSet), CheckError> {
            let n = model.num_states();
            let target = if self.refined { BitSet::new(n) } else { BitSet::from_indices(n, [1]) };
            Ok((BitSet::full(n), target))
        }

        fn abstraction_player(&self) -> AbstractionPlayer {
            AbstractionPlayer::Player2
        }

        fn requires_scheduler_synthesis(&self) -> bool {
            false
        }

        fn refine_abstract_model(&mut self, _feedback: &RefinementFeedback<'_>) -> Result<bool, CheckError> {
            self.refined = true;
            Ok(true)
        }

        fn is_nondeterministic(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_non_monotone_qualitative_result_is_rejected() {
        let task = CheckTask::new(Formula::Eventually(crate::expr::Expr::var("goal")));
        let settings = RefinementSettings {
            reuse_qualitative: false,
            ..RefinementSettings::default()
        };

        let mut driver = RefinementDriver::new(&settings, Budget::rounds(5));
        let res = driver.check(&mut ShrinkingTarget::new(), &task);
        assert!(matches!(res, Err(CheckError::InvariantViolation(_))));
        assert_eq!(driver.statistics().rounds, 2);

        // Unchecked, the second round is taken at face value.
        let settings = RefinementSettings {
            check_invariants: false,
            ..settings
        };
        let mut driver = RefinementDriver::new(&settings, Budget::rounds(3));
        let result = driver.check(&mut ShrinkingTarget::new(), &task).unwrap();
        assert_eq!(result.rounds, 2);
        assert_eq!(result.values, vec![StateValue::Value(0.0)]);
    }

    #[test]
    fn test_projection_helpers() {
        let old = BitSet::from_indices(2, [1]);
        let map = vec![Some(1), Some(0), None];
        assert_eq!(project_subset(&old, &map), BitSet::from_indices(3, [0]));
        assert_eq!(project_superset(&old, &map), BitSet::from_indices(3, [0, 2]));
    }
}
