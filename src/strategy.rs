//! Refinement strategies: which predicates to add after an unresolved round.
//!
//! The driver does not decide how to refine; a [`ProgramAbstractor`] asks
//! its strategy for new predicates.
//!
//! [`ProgramAbstractor`]: crate::abstraction::program::ProgramAbstractor

use std::collections::VecDeque;

use log::debug;

use crate::abstraction::game::MenuGame;
use crate::expr::Expr;
use crate::model::Player1Choice;
use crate::predicate::PredicateSet;
use crate::program::{Command, Program};
use crate::refinement::RefinementFeedback;

pub trait RefinementStrategy {
    fn name(&self) -> &str;

    /// Whether the strategy reads schedulers from the feedback.
    fn requires_schedulers(&self) -> bool {
        false
    }

    /// Candidate predicates; an empty result ends the refinement loop.
    fn refine(
        &mut self,
        game: &MenuGame,
        predicates: &PredicateSet,
        program: &Program,
        feedback: &RefinementFeedback<'_>,
    ) -> Vec<Expr>;
}

/// Hands out fixed batches of predicates, one batch per round.
#[derive(Debug, Clone, Default)]
pub struct QueuedPredicates {
    batches: VecDeque<Vec<Expr>>,
}

impl QueuedPredicates {
    pub fn new(batches: Vec<Vec<Expr>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }
}

impl RefinementStrategy for QueuedPredicates {
    fn name(&self) -> &str {
        "queued"
    }

    fn refine(&mut self, _: &MenuGame, _: &PredicateSet, _: &Program, _: &RefinementFeedback<'_>) -> Vec<Expr> {
        self.batches.pop_front().unwrap_or_default()
    }
}

/// Refines at the abstract state with the largest bound gap.
///
/// At the pivot state the command chosen by the lower-bound scheduler (or
/// every enabled command, without a scheduler) is inspected: first the
/// atoms of its guard are proposed, then the weakest preconditions of the
/// current predicates under its updates. One new predicate per round.
#[derive(Debug, Clone, Default)]
pub struct PivotRefinement;

fn atoms(e: &Expr, out: &mut Vec<Expr>) {
    match e {
        Expr::Bool(_) => {}
        Expr::Not(inner) => atoms(inner, out),
        Expr::And(items) | Expr::Or(items) => items.iter().for_each(|i| atoms(i, out)),
        Expr::Implies(a, b) => {
            atoms(a, out);
            atoms(b, out);
        }
        other => out.push(other.clone()),
    }
}

fn is_new(predicates: &PredicateSet, e: &Expr) -> bool {
    !matches!(e, Expr::Bool(_)) && predicates.index_of(e).is_none()
}

impl PivotRefinement {
    fn command<'p>(program: &'p Program, choice: &Player1Choice) -> Option<&'p Command> {
        let (m, c) = choice.command?;
        program.modules.get(m)?.commands.get(c)
    }

    fn candidate(predicates: &PredicateSet, program: &Program, choices: &[&Player1Choice]) -> Option<Expr> {
        let commands: Vec<&Command> = choices.iter().filter_map(|c| Self::command(program, c)).collect();

        for command in &commands {
            let mut found = Vec::new();
            atoms(&command.guard, &mut found);
            if let Some(e) = found.into_iter().find(|e| is_new(predicates, e)) {
                return Some(e);
            }
        }

        for command in &commands {
            for update in &command.updates {
                let substitution = update.substitution();
                for p in predicates.predicates() {
                    let wp = p.substitute(&substitution);
                    if &wp != p && is_new(predicates, &wp) {
                        return Some(wp);
                    }
                }
            }
        }
        None
    }
}

impl RefinementStrategy for PivotRefinement {
    fn name(&self) -> &str {
        "pivot"
    }

    fn requires_schedulers(&self) -> bool {
        true
    }

    fn refine(
        &mut self,
        game: &MenuGame,
        predicates: &PredicateSet,
        program: &Program,
        feedback: &RefinementFeedback<'_>,
    ) -> Vec<Expr> {
        let g = game.game();
        let bounds = feedback.bounds;

        let mut pivots: Vec<usize> = (0..g.num_states())
            .filter(|&s| Some(s) != g.bottom && bounds.gap(s) > 0.0)
            .collect();
        pivots.sort_by(|&a, &b| bounds.gap(b).total_cmp(&bounds.gap(a)));

        for s in pivots {
            let all: Vec<&Player1Choice> = g.states[s].iter().collect();
            let scheduled: Vec<&Player1Choice> = bounds
                .lower_scheduler
                .as_ref()
                .and_then(|sched| g.states[s].get(sched[s].0))
                .into_iter()
                .collect();

            let found = Self::candidate(predicates, program, &scheduled).or_else(|| Self::candidate(predicates, program, &all));
            if let Some(e) = found {
                debug!("pivot state {:?} (gap {}): proposing {}", g.keys[s], bounds.gap(s), e);
                return vec![e];
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atoms() {
        let e = Expr::and(vec![Expr::var_eq("s", 1), !Expr::var_eq("y", 1), Expr::t()]);
        let mut out = Vec::new();
        atoms(&e, &mut out);
        assert_eq!(out, vec![Expr::var_eq("s", 1), Expr::var_eq("y", 1)]);
    }
}
