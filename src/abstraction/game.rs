use std::rc::Rc;

use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::model::{AbstractModel, Game, StateKey};
use crate::reference::Ref;

/// Snapshot of the menu game for one predicate set.
///
/// Holds the symbolic sets the game was extracted from and the explicit
/// game itself. A snapshot is never modified; refinement produces a new one.
pub struct MenuGame {
    bdd: Rc<Bdd>,
    predicate_count: usize,
    /// Reachable abstract states, over current variables.
    pub reachable: Ref,
    pub initial: Ref,
    /// Reachable states in which some command is only partially enabled.
    pub bottom_sources: Ref,
    /// Union of all command relations, over current and successor variables.
    pub transitions: Ref,
    model: Rc<AbstractModel>,
}

impl MenuGame {
    pub fn new(
        bdd: Rc<Bdd>,
        predicate_count: usize,
        reachable: Ref,
        initial: Ref,
        bottom_sources: Ref,
        transitions: Ref,
        game: Game,
    ) -> Self {
        Self {
            bdd,
            predicate_count,
            reachable,
            initial,
            bottom_sources,
            transitions,
            model: Rc::new(AbstractModel::Game(game)),
        }
    }

    pub fn predicate_count(&self) -> usize {
        self.predicate_count
    }

    pub fn model(&self) -> Rc<AbstractModel> {
        Rc::clone(&self.model)
    }

    pub fn game(&self) -> &Game {
        match &*self.model {
            AbstractModel::Game(game) => game,
            _ => unreachable!("menu games always hold a game"),
        }
    }

    /// Number of reachable abstract states, bottom excluded.
    pub fn num_reachable_states(&self) -> BigUint {
        let k = self.predicate_count;
        self.bdd.sat_count(self.reachable, 2 * k) >> k
    }

    pub fn state_of(&self, key: &StateKey) -> Option<usize> {
        self.game().keys.iter().position(|k| k == key)
    }
}
