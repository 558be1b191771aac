//! Explicit-state exploration of a program.
//!
//! Breadth-first search from the initial state. DTMC states with several
//! enabled commands pick one of them uniformly at random; MDP states get one
//! choice per enabled command. States without enabled commands loop.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use log::{debug, info};

use crate::bitset::BitSet;
use crate::error::BuildError;
use crate::expr::{Env, Expr, Value};
use crate::model::{add_mass, AbstractModel, Choice, Distribution, Dtmc, Mdp, StateKey};
use crate::program::{ModelType, Program};

pub struct ConcreteModel {
    variables: Vec<String>,
    states: Vec<Vec<Value>>,
    model: Rc<AbstractModel>,
    /// Per reward model, the reward of every state.
    rewards: Vec<(String, Vec<f64>)>,
}

impl ConcreteModel {
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn model(&self) -> &Rc<AbstractModel> {
        &self.model
    }

    /// Variable values of state `s`, in declaration order.
    pub fn state(&self, s: usize) -> &[Value] {
        &self.states[s]
    }

    pub fn env(&self, s: usize) -> Env {
        self.variables
            .iter()
            .cloned()
            .zip(self.states[s].iter().copied())
            .collect()
    }

    pub fn states_satisfying(&self, expr: &Expr) -> Result<BitSet, BuildError> {
        let mut set = BitSet::new(self.num_states());
        for s in 0..self.num_states() {
            if expr.eval_bool(&self.env(s))? {
                set.insert(s);
            }
        }
        Ok(set)
    }

    pub fn rewards(&self, name: Option<&str>) -> Option<&[f64]> {
        let found = match name {
            Some(name) => self.rewards.iter().find(|(n, _)| n == name),
            None if self.rewards.len() == 1 => self.rewards.first(),
            None => None,
        };
        found.map(|(_, r)| r.as_slice())
    }
}

/// Build the reachable part of `program`, failing beyond `max_states` states.
pub fn explore(program: &Program, max_states: usize) -> Result<ConcreteModel, BuildError> {
    let variables: Vec<String> = program.variables.iter().map(|v| v.name.clone()).collect();
    let initial: Vec<Value> = program.variables.iter().map(|v| v.init).collect();

    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut states: Vec<Vec<Value>> = Vec::new();
    let mut choices: Vec<Vec<Choice>> = Vec::new();
    let mut queue = VecDeque::new();

    index.insert(initial.clone(), 0);
    states.push(initial);
    queue.push_back(0);

    while let Some(s) = queue.pop_front() {
        let env: Env = variables.iter().cloned().zip(states[s].iter().copied()).collect();
        let mut out = Vec::new();

        for (id, command) in program.commands() {
            if !command.guard.eval_bool(&env)? {
                continue;
            }
            let mut distribution = Distribution::new();
            for update in &command.updates {
                let mut next = states[s].clone();
                for (name, e) in &update.assignments {
                    let value = e.eval(&env)?;
                    let pos = variables.iter().position(|v| v == name).ok_or_else(|| {
                        BuildError::InvalidProgram(format!("assignment to unknown variable '{}'", name))
                    })?;
                    if !program.variables[pos].contains(value) {
                        return Err(BuildError::InvalidProgram(format!(
                            "command '{}' assigns {} to '{}', outside its domain",
                            command.label, value, name
                        )));
                    }
                    next[pos] = value;
                }

                let t = match index.get(&next) {
                    Some(&t) => t,
                    None => {
                        if states.len() >= max_states {
                            return Err(BuildError::StateLimit { limit: max_states });
                        }
                        let t = states.len();
                        index.insert(next.clone(), t);
                        states.push(next);
                        queue.push_back(t);
                        t
                    }
                };
                add_mass(&mut distribution, t, update.probability);
            }
            out.push(Choice {
                label: command.label.clone(),
                command: Some(id),
                distribution,
            });
        }

        if out.is_empty() {
            out.push(Choice {
                label: "self-loop".to_string(),
                command: None,
                distribution: vec![(s, 1.0)],
            });
        }
        if choices.len() <= s {
            choices.resize_with(s + 1, Vec::new);
        }
        choices[s] = out;
    }
    debug!("explored {} states", states.len());

    let keys: Vec<StateKey> = (0..states.len()).map(StateKey::Index).collect();
    let model = match program.model_type {
        ModelType::Mdp => AbstractModel::Mdp(Mdp {
            choices,
            initial: vec![0],
            keys,
        }),
        ModelType::Dtmc => {
            let transitions = choices
                .into_iter()
                .map(|cs| {
                    let weight = 1.0 / cs.len() as f64;
                    let mut mixed = Distribution::new();
                    for choice in cs {
                        for (t, p) in choice.distribution {
                            add_mass(&mut mixed, t, weight * p);
                        }
                    }
                    mixed
                })
                .collect();
            AbstractModel::Dtmc(Dtmc {
                transitions,
                initial: vec![0],
                keys,
            })
        }
    };

    let mut rewards = Vec::with_capacity(program.rewards.len());
    for reward_model in &program.rewards {
        let mut values = vec![0.0; states.len()];
        for (s, value) in values.iter_mut().enumerate() {
            let env: Env = variables.iter().cloned().zip(states[s].iter().copied()).collect();
            for (guard, r) in &reward_model.state_rewards {
                if guard.eval_bool(&env)? {
                    *value += r;
                }
            }
        }
        rewards.push((reward_model.name.clone(), values));
    }

    info!("explicit model: {} states", states.len());
    Ok(ConcreteModel {
        variables,
        states,
        model: Rc::new(model),
        rewards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Command, Module, Update, VariableDecl};

    fn walk(model_type: ModelType) -> Program {
        Program::new(
            model_type,
            vec![VariableDecl::int("x", 0, 2, 0)],
            vec![Module::new(
                "w",
                vec![
                    Command::new(
                        "up",
                        Expr::lt(Expr::var("x"), Expr::int(2)),
                        vec![Update::new(1.0, vec![("x", Expr::add(Expr::var("x"), Expr::int(1)))])],
                    ),
                    Command::new("reset", Expr::var_eq("x", 1), vec![Update::new(1.0, vec![("x", Expr::int(0))])]),
                ],
            )],
        )
        .unwrap()
        .with_reward_model("steps", vec![(Expr::lt(Expr::var("x"), Expr::int(2)), 1.0)])
    }

    #[test]
    fn test_explore_dtmc() {
        let m = explore(&walk(ModelType::Dtmc), 100).unwrap();
        assert_eq!(m.num_states(), 3);
        let AbstractModel::Dtmc(dtmc) = &**m.model() else {
            panic!("expected a DTMC");
        };
        // x = 1: up and reset are mixed uniformly.
        assert_eq!(dtmc.transitions[1], vec![(2, 0.5), (0, 0.5)]);
        // x = 2 deadlocks.
        assert_eq!(dtmc.transitions[2], vec![(2, 1.0)]);
        assert_eq!(m.rewards(None), Some(&[1.0, 1.0, 0.0][..]));
    }

    #[test]
    fn test_explore_mdp() {
        let m = explore(&walk(ModelType::Mdp), 100).unwrap();
        let AbstractModel::Mdp(mdp) = &**m.model() else {
            panic!("expected an MDP");
        };
        assert_eq!(mdp.choices[1].len(), 2);
        assert_eq!(mdp.choices[1][1].label, "reset");
        let target = m.states_satisfying(&Expr::var_eq("x", 2)).unwrap();
        assert_eq!(target, BitSet::from_indices(3, [2]));
    }

    #[test]
    fn test_state_limit() {
        let res = explore(&walk(ModelType::Dtmc), 2);
        assert!(matches!(res, Err(BuildError::StateLimit { limit: 2 })));
    }

    #[test]
    fn test_out_of_domain_assignment() {
        let program = Program::new(
            ModelType::Dtmc,
            vec![VariableDecl::int("x", 0, 1, 0)],
            vec![Module::new(
                "m",
                vec![Command::new(
                    "inc",
                    Expr::t(),
                    vec![Update::new(1.0, vec![("x", Expr::add(Expr::var("x"), Expr::int(1)))])],
                )],
            )],
        )
        .unwrap();
        assert!(matches!(explore(&program, 10), Err(BuildError::InvalidProgram(_))));
    }
}
