//! Explicit models handed from an abstraction to the refinement driver.
//!
//! States are dense indices `0..n`. Every model carries the keys of its
//! states so that results of one refinement round can be projected onto the
//! states of the next.

use std::collections::HashMap;

use crate::types::Valuation;

/// Probability distribution over state indices.
pub type Distribution = Vec<(usize, f64)>;

/// Identity of a state across refinement rounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKey {
    /// An abstract state: truth values of the predicates.
    Valuation(Valuation),
    /// The distinguished bottom state of a menu game.
    Bottom,
    /// A concrete state of an explicit model.
    Index(usize),
}

/// For every state of `new`, the state of `old` it refines, if any.
///
/// Valuations refine the valuations they extend (prefix match); bottom maps
/// to bottom and concrete states to themselves.
pub fn project(old: &[StateKey], new: &[StateKey]) -> Vec<Option<usize>> {
    let index: HashMap<&StateKey, usize> = old.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let old_len = old.iter().find_map(|k| match k {
        StateKey::Valuation(v) => Some(v.len()),
        _ => None,
    });

    new.iter()
        .map(|key| match key {
            StateKey::Valuation(v) => {
                let n = old_len?;
                if v.len() < n {
                    return None;
                }
                index.get(&StateKey::Valuation(v[..n].to_vec())).copied()
            }
            other => index.get(other).copied(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dtmc {
    pub transitions: Vec<Distribution>,
    pub initial: Vec<usize>,
    pub keys: Vec<StateKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub label: String,
    /// Position (module, command) of the command behind the choice.
    pub command: Option<(usize, usize)>,
    pub distribution: Distribution,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mdp {
    pub choices: Vec<Vec<Choice>>,
    pub initial: Vec<usize>,
    pub keys: Vec<StateKey>,
}

/// A choice of player 1, resolved further by player 2 picking one option.
#[derive(Debug, Clone, PartialEq)]
pub struct Player1Choice {
    pub label: String,
    pub command: Option<(usize, usize)>,
    pub options: Vec<Distribution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub states: Vec<Vec<Player1Choice>>,
    pub initial: Vec<usize>,
    pub keys: Vec<StateKey>,
    /// Index of the bottom state, if the game has one.
    pub bottom: Option<usize>,
}

impl Dtmc {
    pub fn num_states(&self) -> usize {
        self.transitions.len()
    }

    /// View as an MDP with a single choice per state.
    pub fn to_mdp(&self) -> Mdp {
        Mdp {
            choices: self
                .transitions
                .iter()
                .map(|d| {
                    vec![Choice {
                        label: String::new(),
                        command: None,
                        distribution: d.clone(),
                    }]
                })
                .collect(),
            initial: self.initial.clone(),
            keys: self.keys.clone(),
        }
    }
}

impl Mdp {
    pub fn num_states(&self) -> usize {
        self.choices.len()
    }

    /// View as a game in which player 2 has no choice.
    pub fn to_game(&self) -> Game {
        Game {
            states: self
                .choices
                .iter()
                .map(|cs| {
                    cs.iter()
                        .map(|c| Player1Choice {
                            label: c.label.clone(),
                            command: c.command,
                            options: vec![c.distribution.clone()],
                        })
                        .collect()
                })
                .collect(),
            initial: self.initial.clone(),
            keys: self.keys.clone(),
            bottom: None,
        }
    }
}

impl Game {
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Largest number of player-1 choices in any state.
    pub fn max_menu_size(&self) -> usize {
        self.states.iter().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbstractModel {
    Dtmc(Dtmc),
    Mdp(Mdp),
    Game(Game),
}

impl AbstractModel {
    pub fn num_states(&self) -> usize {
        match self {
            AbstractModel::Dtmc(m) => m.num_states(),
            AbstractModel::Mdp(m) => m.num_states(),
            AbstractModel::Game(m) => m.num_states(),
        }
    }

    pub fn initial(&self) -> &[usize] {
        match self {
            AbstractModel::Dtmc(m) => &m.initial,
            AbstractModel::Mdp(m) => &m.initial,
            AbstractModel::Game(m) => &m.initial,
        }
    }

    pub fn keys(&self) -> &[StateKey] {
        match self {
            AbstractModel::Dtmc(m) => &m.keys,
            AbstractModel::Mdp(m) => &m.keys,
            AbstractModel::Game(m) => &m.keys,
        }
    }

    pub fn bottom(&self) -> Option<usize> {
        match self {
            AbstractModel::Game(g) => g.bottom,
            _ => None,
        }
    }
}

/// Add `p` to the probability of `target` in `dist`, keeping targets unique.
pub fn add_mass(dist: &mut Distribution, target: usize, p: f64) {
    match dist.iter_mut().find(|(t, _)| *t == target) {
        Some((_, q)) => *q += p,
        None => dist.push((target, p)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_by_prefix() {
        let old = vec![
            StateKey::Valuation(vec![false]),
            StateKey::Valuation(vec![true]),
            StateKey::Bottom,
        ];
        let new = vec![
            StateKey::Valuation(vec![true, false]),
            StateKey::Valuation(vec![false, true]),
            StateKey::Bottom,
            StateKey::Valuation(vec![true, true]),
        ];
        assert_eq!(project(&old, &new), vec![Some(1), Some(0), Some(2), Some(1)]);
    }

    #[test]
    fn test_project_without_match() {
        let old = vec![StateKey::Valuation(vec![true])];
        let new = vec![StateKey::Valuation(vec![false, false]), StateKey::Bottom];
        assert_eq!(project(&old, &new), vec![None, None]);

        let old = vec![StateKey::Index(0), StateKey::Index(1)];
        let new = vec![StateKey::Index(1)];
        assert_eq!(project(&old, &new), vec![Some(1)]);
    }

    #[test]
    fn test_lifting() {
        let dtmc = Dtmc {
            transitions: vec![vec![(0, 0.5), (1, 0.5)], vec![(1, 1.0)]],
            initial: vec![0],
            keys: vec![StateKey::Index(0), StateKey::Index(1)],
        };
        let game = dtmc.to_mdp().to_game();
        assert_eq!(game.num_states(), 2);
        assert_eq!(game.max_menu_size(), 1);
        assert_eq!(game.states[0][0].options, vec![vec![(0, 0.5), (1, 0.5)]]);
    }

    #[test]
    fn test_add_mass() {
        let mut dist = vec![(3, 0.25)];
        add_mass(&mut dist, 3, 0.25);
        add_mass(&mut dist, 1, 0.5);
        assert_eq!(dist, vec![(3, 0.5), (1, 0.5)]);
    }
}
