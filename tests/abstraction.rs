//! Tests of the incremental menu-game construction.

use std::rc::Rc;

use prob_cegar::abstraction::ProgramAbstractor;
use prob_cegar::config::AbstractionSettings;
use prob_cegar::error::BuildError;
use prob_cegar::expr::Expr;
use prob_cegar::oracle::{EnumerationOracle, Oracle, SatResult};
use prob_cegar::program::{Command, ModelType, Module, Program, Update, VariableDecl};
use prob_cegar::strategy::QueuedPredicates;

/// Forwards to an enumeration oracle and remembers every query it answers.
struct RecordingOracle {
    inner: EnumerationOracle,
    queries: Vec<Expr>,
}

impl Oracle for RecordingOracle {
    fn check(&mut self, query: &Expr) -> Result<SatResult, BuildError> {
        self.queries.push(query.clone());
        self.inner.check(query)
    }
}

/// Two counters: `a` counts up to 3, `b` follows `a` with probability 1/2.
fn counters() -> Program {
    let a = || Expr::var("a");
    let b = || Expr::var("b");
    Program::new(
        ModelType::Mdp,
        vec![VariableDecl::int("a", 0, 3, 0), VariableDecl::int("b", 0, 3, 0)],
        vec![
            Module::new(
                "first",
                vec![Command::new(
                    "inc",
                    Expr::lt(a(), Expr::int(3)),
                    vec![Update::new(1.0, vec![("a", Expr::add(a(), Expr::int(1)))])],
                )],
            ),
            Module::new(
                "second",
                vec![Command::new(
                    "follow",
                    Expr::lt(b(), a()),
                    vec![
                        Update::new(0.5, vec![("b", Expr::add(b(), Expr::int(1)))]),
                        Update::new(0.5, vec![]),
                    ],
                )],
            ),
        ],
    )
    .unwrap()
}

fn predicates() -> Vec<Expr> {
    vec![Expr::var_eq("a", 3), Expr::lt(Expr::var("b"), Expr::var("a"))]
}

fn build(program: Program, predicates: Vec<Expr>) -> ProgramAbstractor<RecordingOracle> {
    let oracle = RecordingOracle {
        inner: EnumerationOracle::new(&program),
        queries: Vec::new(),
    };
    ProgramAbstractor::new(
        program,
        predicates,
        oracle,
        &AbstractionSettings::default(),
        Box::new(QueuedPredicates::default()),
    )
    .unwrap()
}

#[test]
fn independent_builds_agree() {
    let mut first = build(counters(), predicates());
    let mut second = build(counters(), predicates());
    let g1 = first.get_abstract_game().unwrap();
    let g2 = second.get_abstract_game().unwrap();
    assert_eq!(g1.num_reachable_states(), g2.num_reachable_states());
    assert_eq!(g1.game(), g2.game());
    assert_eq!(first.oracle().queries, second.oracle().queries);
}

#[test]
fn refine_with_known_predicates_keeps_game() {
    let mut abs = build(counters(), predicates());
    let game = abs.get_abstract_game().unwrap();
    let queries = abs.oracle_stats().queries;

    // Negated duplicates and constants are no-ops too.
    assert!(!abs.refine(vec![Expr::var_eq("a", 3), !Expr::var_eq("a", 3), Expr::t()]));
    assert!(!abs.refine(vec![]));
    let again = abs.get_abstract_game().unwrap();
    assert!(Rc::ptr_eq(&game, &again));
    assert_eq!(abs.builds(), 1);
    assert_eq!(abs.oracle_stats().queries, queries);
}

#[test]
fn new_queries_mention_the_new_predicate() {
    let mut abs = build(counters(), predicates());
    abs.get_abstract_game().unwrap();
    let before = abs.oracle().queries.len();

    let p = Expr::var_eq("b", 3);
    assert!(abs.refine(vec![p.clone()]));
    abs.get_abstract_game().unwrap();

    let new = &abs.oracle().queries[before..];
    assert!(!new.is_empty());
    for query in new {
        assert!(query.contains(&p), "query {} does not mention {}", query, p);
    }
}

#[test]
fn refinement_does_not_lose_reachable_states() {
    let mut abs = build(counters(), predicates());
    let coarse = abs.get_abstract_game().unwrap();
    abs.refine(vec![Expr::var_eq("b", 3), Expr::var_eq("a", 1)]);
    let fine = abs.get_abstract_game().unwrap();
    assert_eq!(fine.predicate_count(), coarse.predicate_count() + 2);
    assert!(fine.num_reachable_states() >= coarse.num_reachable_states());
}

#[test]
fn guards_as_predicates_avoid_bottom() {
    let program = counters();
    let oracle = EnumerationOracle::new(&program);
    let settings = AbstractionSettings {
        add_all_guards: true,
        ..AbstractionSettings::default()
    };
    let mut abs = ProgramAbstractor::new(program, vec![], oracle, &settings, Box::new(QueuedPredicates::default())).unwrap();
    let game = abs.get_abstract_game().unwrap();
    assert!(game.game().bottom.is_none());
    assert_eq!(abs.predicates().len(), 2);
}
