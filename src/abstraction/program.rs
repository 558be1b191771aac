//! Menu-game abstraction of a whole program.
//!
//! [`ProgramAbstractor`] owns the predicate set, the per-module command
//! abstractions and the oracle. It builds the menu game lazily: the game is
//! cached until [`ProgramAbstractor::refine`] adds a predicate, and the
//! command caches are extended (never recomputed) on the next build.

use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};

use crate::abstraction::game::MenuGame;
use crate::abstraction::module::ModuleAbstractor;
use crate::abstraction::state_set::StateSetAbstractor;
use crate::bdd::Bdd;
use crate::bitset::BitSet;
use crate::config::AbstractionSettings;
use crate::error::{BuildError, CheckError};
use crate::expr::Expr;
use crate::model::{add_mass, AbstractModel, Distribution, Game, Player1Choice, StateKey};
use crate::oracle::{CachingOracle, Oracle, OracleStats};
use crate::predicate::PredicateSet;
use crate::program::{Command, ModelType, Program, Update};
use crate::reference::Ref;
use crate::refinement::{Abstraction, AbstractionPlayer, RefinementFeedback};
use crate::strategy::RefinementStrategy;
use crate::task::CheckTask;
use crate::types::Valuation;

pub struct ProgramAbstractor<O: Oracle> {
    program: Program,
    bdd: Rc<Bdd>,
    predicates: PredicateSet,
    oracle: CachingOracle<O>,
    modules: Vec<ModuleAbstractor>,
    initial: StateSetAbstractor,
    settings: AbstractionSettings,
    strategy: Box<dyn RefinementStrategy>,
    game: Option<Rc<MenuGame>>,
    builds: usize,
    constraint: Option<Expr>,
    target: Option<Expr>,
}

impl<O: Oracle> ProgramAbstractor<O> {
    pub fn new(
        program: Program,
        initial_predicates: Vec<Expr>,
        oracle: O,
        settings: &AbstractionSettings,
        strategy: Box<dyn RefinementStrategy>,
    ) -> Result<Self, BuildError> {
        let bdd = Rc::new(Bdd::new(settings.bdd_storage_bits));
        let mut oracle = CachingOracle::new(oracle);
        let track_partial = !settings.add_all_guards;

        let mut modules = Vec::with_capacity(program.modules.len() + 1);
        for (m, module) in program.modules.iter().enumerate() {
            let commands = module
                .commands
                .iter()
                .enumerate()
                .map(|(c, cmd)| ((m, c), cmd.clone()))
                .collect();
            modules.push(ModuleAbstractor::new(&module.name, commands, track_partial, &mut oracle)?);
        }
        if settings.fix_deadlocks {
            let guard = !Expr::or(program.guards());
            let command = Command::new("deadlock", guard, vec![Update::new(1.0, vec![])]);
            let id = (program.modules.len(), 0);
            modules.push(ModuleAbstractor::new("deadlock", vec![(id, command)], track_partial, &mut oracle)?);
        }

        let initial = StateSetAbstractor::new(program.initial_expr(), &mut oracle)?;

        let mut predicates = PredicateSet::new(Rc::clone(&bdd));
        if settings.add_all_guards {
            for guard in program.guards() {
                predicates.insert(guard);
            }
        }
        for p in initial_predicates {
            predicates.insert(p);
        }

        Ok(Self {
            program,
            bdd,
            predicates,
            oracle,
            modules,
            initial,
            settings: *settings,
            strategy,
            game: None,
            builds: 0,
            constraint: None,
            target: None,
        })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn predicates(&self) -> &PredicateSet {
        &self.predicates
    }

    pub fn settings(&self) -> &AbstractionSettings {
        &self.settings
    }

    pub fn bdd(&self) -> &Rc<Bdd> {
        &self.bdd
    }

    pub fn oracle_stats(&self) -> OracleStats {
        self.oracle.stats()
    }

    pub fn oracle(&self) -> &O {
        self.oracle.inner()
    }

    /// Number of games built so far.
    pub fn builds(&self) -> usize {
        self.builds
    }

    pub fn modules_mut(&mut self) -> &mut [ModuleAbstractor] {
        &mut self.modules
    }

    /// Add the predicates not yet present. Returns whether any was added;
    /// only then is the cached game dropped.
    pub fn refine(&mut self, predicates: Vec<Expr>) -> bool {
        let mut added = false;
        for p in predicates {
            if let Some(i) = self.predicates.insert(p) {
                debug!("added predicate {}: {}", i, self.predicates.get(i));
                added = true;
            }
        }
        if added {
            self.game = None;
        }
        added
    }

    /// Abstract states satisfying a boolean combination of predicates.
    pub fn get_states(&self, expr: &Expr) -> Option<Ref> {
        self.predicates.states_of(expr)
    }

    /// All states reachable from `initial` under `relation`.
    pub fn get_reachable_states(&self, initial: Ref, relation: Ref) -> Ref {
        let bdd = &self.bdd;
        let current_vars = self.predicates.current_vars();
        let rename = self.predicates.successor_to_current();

        let mut reachable = initial;
        let mut frontier = initial;
        let mut steps = 0;
        while !bdd.is_zero(frontier) {
            steps += 1;
            let image = bdd.and_exists(frontier, relation, &current_vars);
            let image = bdd.rename(image, &rename);
            frontier = bdd.apply_and(image, -reachable);
            reachable = bdd.apply_or(reachable, frontier);
        }
        debug!("reachability saturated after {} steps", steps);
        reachable
    }

    /// The menu game for the current predicates, built if necessary.
    pub fn get_abstract_game(&mut self) -> Result<Rc<MenuGame>, CheckError> {
        if let Some(game) = &self.game {
            return Ok(Rc::clone(game));
        }
        let game = Rc::new(self.build()?);
        self.builds += 1;
        self.game = Some(Rc::clone(&game));
        Ok(game)
    }

    fn build(&mut self) -> Result<MenuGame, CheckError> {
        for module in &mut self.modules {
            module.refine(&self.predicates, &mut self.oracle)?;
        }
        self.initial.extend(&self.predicates, &mut self.oracle)?;

        let bdd = Rc::clone(&self.bdd);
        let preds = &self.predicates;

        let mut relations = Vec::with_capacity(self.modules.len());
        let mut partial = Vec::new();
        for module in &mut self.modules {
            relations.push(module.transition_relation(preds)?);
            for command in module.commands_mut() {
                partial.push(command.partial_states(preds)?);
            }
        }
        let transitions = bdd.apply_or_many(relations);
        let initial = self.initial.states(preds)?;
        let reachable = self.get_reachable_states(initial, transitions);
        let bottom_sources = bdd.apply_and(bdd.apply_or_many(partial), reachable);

        let valuations = bdd.valuations(reachable, &self.predicates.current_vars());
        let index: HashMap<&Valuation, usize> = valuations.iter().enumerate().map(|(i, v)| (v, i)).collect();
        let n = valuations.len();
        let bottom = n;
        let mut uses_bottom = false;

        let mut states: Vec<Vec<Player1Choice>> = Vec::with_capacity(n + 1);
        for val in &valuations {
            let mut choices = Vec::new();
            for module in &self.modules {
                for command in module.commands() {
                    let Some(entry) = command.regions().get(val) else {
                        continue;
                    };
                    let mut options: Vec<Distribution> = Vec::with_capacity(entry.outcomes.len() + 1);
                    for tuple in &entry.outcomes {
                        let mut dist = Distribution::new();
                        for (update, succ) in command.command().updates.iter().zip(tuple) {
                            let &t = index.get(succ).ok_or_else(|| {
                                CheckError::InvariantViolation(format!("successor {:?} of {:?} is not reachable", succ, val))
                            })?;
                            add_mass(&mut dist, t, update.probability);
                        }
                        options.push(dist);
                    }
                    if entry.partial {
                        options.push(vec![(bottom, 1.0)]);
                        uses_bottom = true;
                    }
                    choices.push(Player1Choice {
                        label: format!("{}.{}", module.name(), command.command().label),
                        command: Some(command.id()),
                        options,
                    });
                }
            }
            if choices.is_empty() {
                let i = index[val];
                choices.push(Player1Choice {
                    label: "self-loop".to_string(),
                    command: None,
                    options: vec![vec![(i, 1.0)]],
                });
            }
            states.push(choices);
        }

        let mut keys: Vec<StateKey> = valuations.iter().cloned().map(StateKey::Valuation).collect();
        let bottom = if uses_bottom {
            states.push(vec![Player1Choice {
                label: "bottom".to_string(),
                command: None,
                options: vec![vec![(bottom, 1.0)]],
            }]);
            keys.push(StateKey::Bottom);
            Some(bottom)
        } else {
            None
        };

        let initial_states = bdd
            .valuations(initial, &self.predicates.current_vars())
            .iter()
            .filter_map(|v| index.get(v).copied())
            .collect();

        let game = Game {
            states,
            initial: initial_states,
            keys,
            bottom,
        };
        info!(
            "built menu game: {} predicates, {} states, menu size {}, bottom {}",
            self.predicates.len(),
            game.num_states(),
            game.max_menu_size(),
            bottom.is_some()
        );

        Ok(MenuGame::new(
            bdd,
            self.predicates.len(),
            reachable,
            initial,
            bottom_sources,
            transitions,
            game,
        ))
    }

    fn states_matching(&self, model: &AbstractModel, expr: &Expr) -> Result<BitSet, CheckError> {
        let set = self.predicates.states_of(expr).ok_or_else(|| {
            CheckError::InvariantViolation(format!("{} is not expressible over the predicates", expr))
        })?;
        let keys = model.keys();
        let mut result = BitSet::new(keys.len());
        for (s, key) in keys.iter().enumerate() {
            if let StateKey::Valuation(v) = key {
                if self.bdd.is_implies(self.predicates.encode_valuation(v), set) {
                    result.insert(s);
                }
            }
        }
        Ok(result)
    }
}

impl<O: Oracle> Abstraction for ProgramAbstractor<O> {
    fn name(&self) -> &str {
        "menu-game abstraction"
    }

    fn initialize(&mut self, task: &CheckTask) -> Result<(), CheckError> {
        if task.formula.is_reward() {
            return Err(CheckError::PropertyUnsupported(
                "menu-game abstraction does not support rewards".to_string(),
            ));
        }
        let (constraint, target) = task.formula.reachability();
        let mut new = Vec::new();
        for e in [&constraint, &target] {
            if self.predicates.states_of(e).is_none() {
                new.push(e.clone());
            }
        }
        self.refine(new);
        self.constraint = Some(constraint);
        self.target = Some(target);
        Ok(())
    }

    fn abstract_model(&mut self) -> Result<Rc<AbstractModel>, CheckError> {
        Ok(self.get_abstract_game()?.model())
    }

    fn constraint_and_target_states(&self, model: &AbstractModel) -> Result<(BitSet, BitSet), CheckError> {
        let (Some(constraint), Some(target)) = (&self.constraint, &self.target) else {
            return Err(CheckError::InvariantViolation("abstraction used before initialize".to_string()));
        };
        Ok((self.states_matching(model, constraint)?, self.states_matching(model, target)?))
    }

    fn abstraction_player(&self) -> AbstractionPlayer {
        AbstractionPlayer::Player2
    }

    fn requires_scheduler_synthesis(&self) -> bool {
        self.strategy.requires_schedulers()
    }

    fn refine_abstract_model(&mut self, feedback: &RefinementFeedback<'_>) -> Result<bool, CheckError> {
        let game = self.get_abstract_game()?;
        let candidates = self.strategy.refine(&game, &self.predicates, &self.program, feedback);
        debug!("strategy {} proposed {} predicates", self.strategy.name(), candidates.len());
        Ok(self.refine(candidates))
    }

    fn is_nondeterministic(&self) -> bool {
        self.program.model_type == ModelType::Mdp
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use test_log::test;

    use super::*;
    use crate::oracle::EnumerationOracle;
    use crate::program::{Module, VariableDecl};
    use crate::strategy::QueuedPredicates;

    fn coin() -> Program {
        Program::new(
            ModelType::Dtmc,
            vec![VariableDecl::int("x", 0, 1, 0)],
            vec![Module::new(
                "coin",
                vec![Command::new(
                    "flip",
                    Expr::t(),
                    vec![
                        Update::new(0.5, vec![("x", Expr::int(0))]),
                        Update::new(0.5, vec![("x", Expr::int(1))]),
                    ],
                )],
            )],
        )
        .unwrap()
    }

    fn abstractor(program: Program, preds: Vec<Expr>) -> ProgramAbstractor<EnumerationOracle> {
        let oracle = EnumerationOracle::new(&program);
        ProgramAbstractor::new(
            program,
            preds,
            oracle,
            &AbstractionSettings::default(),
            Box::new(QueuedPredicates::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_game_is_cached() {
        let mut abs = abstractor(coin(), vec![Expr::var_eq("x", 0)]);
        let g1 = abs.get_abstract_game().unwrap();
        let g2 = abs.get_abstract_game().unwrap();
        assert!(Rc::ptr_eq(&g1, &g2));
        assert_eq!(abs.builds(), 1);
    }

    #[test]
    fn test_duplicate_refine_is_noop() {
        let mut abs = abstractor(coin(), vec![Expr::var_eq("x", 0)]);
        let g1 = abs.get_abstract_game().unwrap();

        assert!(!abs.refine(vec![Expr::var_eq("x", 0)]));
        assert_eq!(abs.predicates().len(), 1);
        let g2 = abs.get_abstract_game().unwrap();
        assert!(Rc::ptr_eq(&g1, &g2));

        assert!(abs.refine(vec![Expr::var_eq("x", 1)]));
        let g3 = abs.get_abstract_game().unwrap();
        assert!(!Rc::ptr_eq(&g1, &g3));
        assert_eq!(abs.builds(), 2);
    }

    #[test]
    fn test_reachable_states() {
        let mut abs = abstractor(coin(), vec![Expr::var_eq("x", 0)]);
        let game = abs.get_abstract_game().unwrap();
        assert_eq!(game.num_reachable_states(), BigUint::from(2u32));
        assert_eq!(game.reachable, abs.bdd().one);
        assert!(game.game().bottom.is_none());
    }

    #[test]
    fn test_deadlock_gets_self_loop() {
        // [x = 0] -> x' = 1; x = 1 deadlocks.
        let program = Program::new(
            ModelType::Dtmc,
            vec![VariableDecl::int("x", 0, 1, 0)],
            vec![Module::new(
                "m",
                vec![Command::new("go", Expr::var_eq("x", 0), vec![Update::new(1.0, vec![("x", Expr::int(1))])])],
            )],
        )
        .unwrap();
        let mut abs = abstractor(program, vec![Expr::var_eq("x", 0)]);
        let game = abs.get_abstract_game().unwrap();
        let g = game.game();

        let done = game.state_of(&StateKey::Valuation(vec![false])).unwrap();
        assert_eq!(g.states[done].len(), 1);
        assert_eq!(g.states[done][0].label, "deadlock.deadlock");
        assert_eq!(g.states[done][0].options, vec![vec![(done, 1.0)]]);
    }

    #[test]
    fn test_partial_guard_adds_bottom() {
        // The guard x = 1 is not a predicate: it is partially enabled in every state.
        let program = Program::new(
            ModelType::Dtmc,
            vec![VariableDecl::int("x", 0, 2, 0)],
            vec![Module::new(
                "m",
                vec![
                    Command::new("a", Expr::le(Expr::var("x"), Expr::int(1)), vec![Update::new(1.0, vec![("x", Expr::int(2))])]),
                ],
            )],
        )
        .unwrap();
        let mut abs = abstractor(program, vec![Expr::var_eq("x", 2)]);
        let game = abs.get_abstract_game().unwrap();
        assert!(game.game().bottom.is_none());

        let mut abs = abstractor(abs.program().clone(), vec![Expr::var_eq("x", 0)]);
        let game = abs.get_abstract_game().unwrap();
        let g = game.game();
        let bottom = g.bottom.unwrap();
        let other = game.state_of(&StateKey::Valuation(vec![false])).unwrap();
        assert!(g.states[other][0].options.contains(&vec![(bottom, 1.0)]));
        assert_eq!(game.bottom_sources, abs.predicates().encode_valuation(&[false]));
    }
}
