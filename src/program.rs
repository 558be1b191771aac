//! Probabilistic guarded-command programs.
//!
//! A program declares bounded variables with initial values and a list of
//! modules; each module holds guarded commands whose updates are probability
//! distributions over simultaneous assignments. Programs are constructed
//! directly (there is no textual front end) and validated on construction.

use std::collections::{BTreeSet, HashMap};

use crate::error::BuildError;
use crate::expr::{Expr, Value};

const PROBABILITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ModelType {
    Dtmc,
    Mdp,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VarKind {
    Bool,
    Int { low: i64, high: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub kind: VarKind,
    pub init: Value,
}

impl VariableDecl {
    pub fn int(name: &str, low: i64, high: i64, init: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: VarKind::Int { low, high },
            init: Value::Int(init),
        }
    }

    pub fn boolean(name: &str, init: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: VarKind::Bool,
            init: Value::Bool(init),
        }
    }

    /// All values of the variable's domain, in ascending order.
    pub fn domain(&self) -> Vec<Value> {
        match self.kind {
            VarKind::Bool => vec![Value::Bool(false), Value::Bool(true)],
            VarKind::Int { low, high } => (low..=high).map(Value::Int).collect(),
        }
    }

    pub fn contains(&self, value: Value) -> bool {
        match (self.kind, value) {
            (VarKind::Bool, Value::Bool(_)) => true,
            (VarKind::Int { low, high }, Value::Int(v)) => low <= v && v <= high,
            _ => false,
        }
    }

    fn init_expr(&self) -> Expr {
        match self.init {
            Value::Bool(true) => Expr::var(&self.name),
            Value::Bool(false) => !Expr::var(&self.name),
            Value::Int(v) => Expr::var_eq(&self.name, v),
        }
    }
}

/// One probabilistic option of a command: with `probability`, perform all
/// `assignments` simultaneously.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub probability: f64,
    pub assignments: Vec<(String, Expr)>,
}

impl Update {
    pub fn new(probability: f64, assignments: Vec<(&str, Expr)>) -> Self {
        Self {
            probability,
            assignments: assignments.into_iter().map(|(v, e)| (v.to_string(), e)).collect(),
        }
    }

    /// The substitution `[x := e]` for computing weakest preconditions.
    pub fn substitution(&self) -> HashMap<String, Expr> {
        self.assignments.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub label: String,
    pub guard: Expr,
    pub updates: Vec<Update>,
}

impl Command {
    pub fn new(label: &str, guard: Expr, updates: Vec<Update>) -> Self {
        Self {
            label: label.to_string(),
            guard,
            updates,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub commands: Vec<Command>,
}

impl Module {
    pub fn new(name: &str, commands: Vec<Command>) -> Self {
        Self {
            name: name.to_string(),
            commands,
        }
    }
}

/// State rewards: every state satisfying a guard earns the given reward.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardModel {
    pub name: String,
    pub state_rewards: Vec<(Expr, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub model_type: ModelType,
    pub variables: Vec<VariableDecl>,
    pub modules: Vec<Module>,
    pub rewards: Vec<RewardModel>,
}

impl Program {
    pub fn new(model_type: ModelType, variables: Vec<VariableDecl>, modules: Vec<Module>) -> Result<Self, BuildError> {
        let program = Self {
            model_type,
            variables,
            modules,
            rewards: Vec::new(),
        };
        program.validate()?;
        Ok(program)
    }

    pub fn with_reward_model(mut self, name: &str, state_rewards: Vec<(Expr, f64)>) -> Self {
        self.rewards.push(RewardModel {
            name: name.to_string(),
            state_rewards,
        });
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        let invalid = |msg: String| Err(BuildError::InvalidProgram(msg));

        let mut names = BTreeSet::new();
        for v in &self.variables {
            if !names.insert(v.name.as_str()) {
                return invalid(format!("variable '{}' declared twice", v.name));
            }
            if let VarKind::Int { low, high } = v.kind {
                if low > high {
                    return invalid(format!("variable '{}' has an empty domain", v.name));
                }
            }
            if !v.contains(v.init) {
                return invalid(format!("initial value {} of '{}' is outside its domain", v.init, v.name));
            }
        }

        let check_vars = |e: &Expr, context: &str| -> Result<(), BuildError> {
            for name in e.variables() {
                if !names.contains(name.as_str()) {
                    return Err(BuildError::InvalidProgram(format!("unknown variable '{}' in {}", name, context)));
                }
            }
            Ok(())
        };

        for module in &self.modules {
            for command in &module.commands {
                let context = format!("command '{}' of module '{}'", command.label, module.name);
                check_vars(&command.guard, &context)?;
                if command.updates.is_empty() {
                    return invalid(format!("{} has no updates", context));
                }
                let mut total = 0.0;
                for update in &command.updates {
                    if update.probability <= 0.0 {
                        return invalid(format!("{} has a non-positive probability", context));
                    }
                    total += update.probability;
                    for (name, e) in &update.assignments {
                        if !names.contains(name.as_str()) {
                            return invalid(format!("{} assigns unknown variable '{}'", context, name));
                        }
                        check_vars(e, &context)?;
                    }
                }
                if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
                    return invalid(format!("probabilities of {} sum to {}", context, total));
                }
            }
        }
        Ok(())
    }

    /// The initial-state predicate: every variable equals its initial value.
    pub fn initial_expr(&self) -> Expr {
        Expr::and(self.variables.iter().map(VariableDecl::init_expr).collect())
    }

    /// All commands together with their (module, command) position.
    pub fn commands(&self) -> impl Iterator<Item = ((usize, usize), &Command)> {
        self.modules
            .iter()
            .enumerate()
            .flat_map(|(m, module)| module.commands.iter().enumerate().map(move |(c, cmd)| ((m, c), cmd)))
    }

    pub fn guards(&self) -> Vec<Expr> {
        self.commands().map(|(_, c)| c.guard.clone()).collect()
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDecl> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// The named reward model, or the only one if `name` is not given.
    pub fn reward_model(&self, name: Option<&str>) -> Option<&RewardModel> {
        match name {
            Some(name) => self.rewards.iter().find(|r| r.name == name),
            None if self.rewards.len() == 1 => self.rewards.first(),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin() -> Vec<Module> {
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
        )]
    }

    #[test]
    fn test_valid_program() {
        let program = Program::new(ModelType::Dtmc, vec![VariableDecl::int("x", 0, 1, 0)], coin()).unwrap();
        assert_eq!(program.initial_expr(), Expr::var_eq("x", 0));
        assert_eq!(program.commands().count(), 1);
        assert_eq!(program.variable("x").unwrap().domain().len(), 2);
    }

    #[test]
    fn test_probabilities_must_sum_to_one() {
        let mut modules = coin();
        modules[0].commands[0].updates[0].probability = 0.25;
        let res = Program::new(ModelType::Dtmc, vec![VariableDecl::int("x", 0, 1, 0)], modules);
        assert!(matches!(res, Err(BuildError::InvalidProgram(_))));
    }

    #[test]
    fn test_unknown_variable_and_bad_init() {
        let res = Program::new(ModelType::Dtmc, vec![VariableDecl::int("y", 0, 1, 0)], coin());
        assert!(matches!(res, Err(BuildError::InvalidProgram(_))));

        let res = Program::new(ModelType::Dtmc, vec![VariableDecl::int("x", 0, 1, 5)], coin());
        assert!(matches!(res, Err(BuildError::InvalidProgram(_))));
    }

    #[test]
    fn test_reward_model_lookup() {
        let program = Program::new(ModelType::Dtmc, vec![VariableDecl::int("x", 0, 1, 0)], coin())
            .unwrap()
            .with_reward_model("steps", vec![(Expr::t(), 1.0)]);
        assert!(program.reward_model(None).is_some());
        assert!(program.reward_model(Some("steps")).is_some());
        assert!(program.reward_model(Some("energy")).is_none());
    }
}
