use crate::abstraction::command::AbstractCommand;
use crate::error::{BuildError, CheckError};
use crate::oracle::{CachingOracle, Oracle};
use crate::predicate::PredicateSet;
use crate::program::Command;
use crate::reference::Ref;

/// The abstracted commands of one program module.
pub struct ModuleAbstractor {
    name: String,
    commands: Vec<AbstractCommand>,
}

impl ModuleAbstractor {
    pub fn new<O: Oracle>(
        name: &str,
        commands: Vec<((usize, usize), Command)>,
        track_partial: bool,
        oracle: &mut CachingOracle<O>,
    ) -> Result<Self, BuildError> {
        let commands = commands
            .into_iter()
            .map(|(id, cmd)| AbstractCommand::new(id, cmd, track_partial, oracle))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            commands,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[AbstractCommand] {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut [AbstractCommand] {
        &mut self.commands
    }

    /// Extend all owned commands to the current predicate set.
    pub fn refine<O: Oracle>(&mut self, predicates: &PredicateSet, oracle: &mut CachingOracle<O>) -> Result<(), BuildError> {
        for command in &mut self.commands {
            command.extend(predicates, oracle)?;
        }
        Ok(())
    }

    /// Source states in which some command of the module may be enabled.
    pub fn is_enabled(&mut self, predicates: &PredicateSet) -> Result<Ref, CheckError> {
        let mut guards = Vec::with_capacity(self.commands.len());
        for command in &mut self.commands {
            guards.push(command.abstract_guard(predicates)?);
        }
        Ok(predicates.bdd().apply_or_many(guards))
    }

    pub fn transition_relation(&mut self, predicates: &PredicateSet) -> Result<Ref, CheckError> {
        let mut parts = Vec::with_capacity(self.commands.len());
        for command in &mut self.commands {
            parts.push(command.transition_relation(predicates)?);
        }
        Ok(predicates.bdd().apply_or_many(parts))
    }
}
