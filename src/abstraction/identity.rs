//! The trivial abstraction: the explicit model itself.
//!
//! Lets the refinement driver act as a plain model checker, and serves as
//! the reference the menu-game abstraction is compared against.

use std::rc::Rc;

use crate::bitset::BitSet;
use crate::error::CheckError;
use crate::explore::{explore, ConcreteModel};
use crate::expr::Expr;
use crate::model::AbstractModel;
use crate::program::{ModelType, Program};
use crate::refinement::{Abstraction, AbstractionPlayer, RefinementFeedback};
use crate::task::CheckTask;

pub struct IdentityAbstraction {
    model_type: ModelType,
    concrete: ConcreteModel,
    constraint: Expr,
    target: Expr,
}

impl IdentityAbstraction {
    pub fn new(program: &Program, max_states: usize) -> Result<Self, CheckError> {
        Ok(Self {
            model_type: program.model_type,
            concrete: explore(program, max_states)?,
            constraint: Expr::t(),
            target: Expr::f(),
        })
    }

    pub fn concrete(&self) -> &ConcreteModel {
        &self.concrete
    }
}

impl Abstraction for IdentityAbstraction {
    fn name(&self) -> &str {
        "identity abstraction"
    }

    fn initialize(&mut self, task: &CheckTask) -> Result<(), CheckError> {
        let (constraint, target) = task.formula.reachability();
        self.constraint = constraint;
        self.target = target;
        Ok(())
    }

    fn abstract_model(&mut self) -> Result<Rc<AbstractModel>, CheckError> {
        Ok(Rc::clone(self.concrete.model()))
    }

    fn constraint_and_target_states(&self, _model: &AbstractModel) -> Result<(BitSet, BitSet), CheckError> {
        Ok((
            self.concrete.states_satisfying(&self.constraint)?,
            self.concrete.states_satisfying(&self.target)?,
        ))
    }

    fn abstraction_player(&self) -> AbstractionPlayer {
        AbstractionPlayer::None
    }

    fn requires_scheduler_synthesis(&self) -> bool {
        false
    }

    fn refine_abstract_model(&mut self, _feedback: &RefinementFeedback<'_>) -> Result<bool, CheckError> {
        Ok(false)
    }

    fn is_nondeterministic(&self) -> bool {
        self.model_type == ModelType::Mdp
    }

    fn supports_reachability_rewards(&self) -> bool {
        self.model_type == ModelType::Dtmc
    }

    fn state_rewards(&self, _model: &AbstractModel, reward_model: Option<&str>) -> Result<Vec<f64>, CheckError> {
        self.concrete
            .rewards(reward_model)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| CheckError::PropertyUnsupported(format!("no reward model {:?}", reward_model)))
    }
}
