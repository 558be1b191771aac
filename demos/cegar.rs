use std::time::Duration;

use clap::{Parser, ValueEnum};

use prob_cegar::abstraction::{IdentityAbstraction, ProgramAbstractor};
use prob_cegar::config::{AbstractionSettings, Budget, RefinementSettings};
use prob_cegar::expr::Expr;
use prob_cegar::oracle::EnumerationOracle;
use prob_cegar::program::{Command, ModelType, Module, Program, Update, VariableDecl};
use prob_cegar::refinement::RefinementDriver;
use prob_cegar::strategy::PivotRefinement;
use prob_cegar::task::{CheckTask, Formula, OptimizationDirection};

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Direction {
    Min,
    Max,
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Length of the walk.
    #[arg(value_name = "INT", default_value = "8")]
    n: i64,

    /// Optimization direction.
    #[clap(long, value_enum, default_value = "max")]
    direction: Direction,

    /// Maximal number of refinement rounds.
    #[clap(long, value_name = "INT", default_value = "50")]
    rounds: usize,

    /// Time limit in seconds.
    #[clap(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Required precision of the result.
    #[clap(long, value_name = "FLOAT", default_value = "1e-6")]
    precision: f64,

    /// Make all guards predicates from the start.
    #[clap(long)]
    all_guards: bool,

    /// Also check the explicit model.
    #[clap(long)]
    exact: bool,
}

/// A walk on `0..=n` that moves forward with probability 1/2 and may retreat
/// by one step. A slippery retreat sends the walker back to the start.
fn walk(n: i64) -> color_eyre::Result<Program> {
    let x = || Expr::var("x");
    let program = Program::new(
        ModelType::Mdp,
        vec![VariableDecl::int("x", 0, n, 0)],
        vec![Module::new(
            "walker",
            vec![
                Command::new(
                    "step",
                    Expr::lt(x(), Expr::int(n)),
                    vec![
                        Update::new(0.5, vec![("x", Expr::add(x(), Expr::int(1)))]),
                        Update::new(0.5, vec![]),
                    ],
                ),
                Command::new(
                    "retreat",
                    Expr::and(vec![Expr::gt(x(), Expr::int(0)), Expr::lt(x(), Expr::int(n))]),
                    vec![
                        Update::new(0.9, vec![("x", Expr::sub(x(), Expr::int(1)))]),
                        Update::new(0.1, vec![("x", Expr::int(0))]),
                    ],
                ),
            ],
        )],
    )?;
    Ok(program)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let direction = match args.direction {
        Direction::Min => OptimizationDirection::Minimize,
        Direction::Max => OptimizationDirection::Maximize,
    };
    let task = CheckTask::new(Formula::Eventually(Expr::var_eq("x", args.n)))
        .with_direction(direction)
        .with_precision(args.precision);
    println!("task = {} ({})", task.formula, direction);

    let mut budget = Budget::rounds(args.rounds);
    if let Some(secs) = args.timeout {
        budget = budget.with_time_limit(Duration::from_secs(secs));
    }

    let program = walk(args.n)?;
    let settings = AbstractionSettings {
        add_all_guards: args.all_guards,
        ..AbstractionSettings::default()
    };
    let oracle = EnumerationOracle::new(&program);
    let mut abstraction = ProgramAbstractor::new(program.clone(), vec![], oracle, &settings, Box::new(PivotRefinement))?;

    let mut driver = RefinementDriver::new(&RefinementSettings::default(), budget);
    let result = driver.check(&mut abstraction, &task)?;

    for record in driver.history() {
        println!(
            "round {:>3}: {:>5} states, bounds {:?} .. {:?}",
            record.round, record.num_states, record.lower, record.upper
        );
    }
    println!("status = {:?}", result.status);
    println!("values = {:?}", result.values);
    println!("predicates ({}):", abstraction.predicates().len());
    for p in abstraction.predicates().predicates() {
        println!("  {}", p);
    }
    println!("statistics = {:?}", driver.statistics());
    println!("oracle = {:?}", abstraction.oracle_stats());
    println!("bdd = {:?}", abstraction.bdd());

    if args.exact {
        let mut identity = IdentityAbstraction::new(&program, 1 << 20)?;
        let mut driver = RefinementDriver::new(&RefinementSettings::default(), Budget::rounds(1));
        let exact = driver.check(&mut identity, &task)?;
        println!(
            "exact = {:?} ({} states)",
            exact.values,
            identity.concrete().num_states()
        );
    }

    let time_total = time_total.elapsed();
    println!("\nAll done in {:.3} s", time_total.as_secs_f64());
    Ok(())
}
