//! # prob-cegar: game-based abstraction refinement for probabilistic programs
//!
//! **`prob-cegar`** checks reachability properties of probabilistic programs
//! (DTMCs and MDPs given as guarded commands) without building their state
//! space. The program is abstracted by a set of *predicates* into a
//! **menu game**: player 1 picks a command, player 2 picks one of the
//! abstract outcomes the command may have. Solving the game with player 2
//! minimizing and maximizing yields a lower and an upper bound on the
//! concrete value. If the bounds are too far apart, new predicates are
//! added and the next, finer game is built incrementally from the previous
//! one.
//!
//! ## Basic Usage
//!
//! ```rust
//! use prob_cegar::abstraction::ProgramAbstractor;
//! use prob_cegar::config::{AbstractionSettings, Budget, RefinementSettings};
//! use prob_cegar::expr::Expr;
//! use prob_cegar::oracle::EnumerationOracle;
//! use prob_cegar::program::{Command, ModelType, Module, Program, Update, VariableDecl};
//! use prob_cegar::refinement::RefinementDriver;
//! use prob_cegar::strategy::PivotRefinement;
//! use prob_cegar::task::{CheckTask, Formula, StateValue};
//!
//! // A fair coin, flipped forever.
//! let program = Program::new(
//!     ModelType::Dtmc,
//!     vec![VariableDecl::int("x", 0, 1, 0)],
//!     vec![Module::new(
//!         "coin",
//!         vec![Command::new(
//!             "flip",
//!             Expr::t(),
//!             vec![
//!                 Update::new(0.5, vec![("x", Expr::int(0))]),
//!                 Update::new(0.5, vec![("x", Expr::int(1))]),
//!             ],
//!         )],
//!     )],
//! )
//! .unwrap();
//!
//! let oracle = EnumerationOracle::new(&program);
//! let mut abstraction = ProgramAbstractor::new(
//!     program,
//!     vec![],
//!     oracle,
//!     &AbstractionSettings::default(),
//!     Box::new(PivotRefinement),
//! )
//! .unwrap();
//!
//! let mut driver = RefinementDriver::new(&RefinementSettings::default(), Budget::rounds(10));
//! let task = CheckTask::new(Formula::Eventually(Expr::var_eq("x", 1)));
//! let result = driver.check(&mut abstraction, &task).unwrap();
//! assert!(result.is_resolved());
//! assert_eq!(result.values, vec![StateValue::Value(1.0)]);
//! ```
//!
//! ## Core Components
//!
//! - **[`bdd`]**: The BDD manager holding the symbolic abstract state sets.
//! - **[`abstraction`]**: Command, module and program abstractors, and the menu game.
//! - **[`refinement`]**: The abstraction-refinement loop.
//! - **[`qualitative`]** and **[`solver`]**: Graph analysis and value iteration on games and MDPs.
//! - **[`strategy`]**: How new predicates are chosen.

pub mod abstraction;
pub mod bdd;
pub mod bitset;
pub mod cache;
pub mod config;
pub mod error;
pub mod explore;
pub mod expr;
pub mod model;
pub mod oracle;
pub mod predicate;
pub mod program;
pub mod qualitative;
pub mod reference;
pub mod refinement;
pub mod sat;
pub mod solver;
pub mod strategy;
pub mod table;
pub mod task;
pub mod types;
