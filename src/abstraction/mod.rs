//! Abstractions of probabilistic programs.
//!
//! The menu-game abstraction is layered bottom-up: [`command`] abstracts a
//! single guarded command over the current predicates, [`module`] groups the
//! commands of a program module, and [`program`] composes all modules into a
//! [`game::MenuGame`]. [`identity`] skips abstraction altogether.

pub mod command;
pub mod game;
pub mod identity;
pub mod module;
pub mod program;
pub mod state_set;

pub use game::MenuGame;
pub use identity::IdentityAbstraction;
pub use program::ProgramAbstractor;
