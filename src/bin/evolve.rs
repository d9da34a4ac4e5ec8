//! Evolves a neural controller for the arena world.

use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::{App, Arg};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use evobot::bin_utils::args::{ArgAugmenter, CommonArgs, Optimizer, OptimizerArgs};
use evobot::fitness::avoid_collision;
use evobot_core::evolution::test_controller;
use evobot_core::report::Reporter;
use evobot_core::sim::{SimPool, Simulation};
use evobot_models::{Activation, NeuralNet};
use evobot_sim::ArenaSim;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let app = App::new("evolve")
        .about("Evolves a neural controller for the arena world")
        .arg(
            Arg::with_name("hidden")
                .long("hidden")
                .takes_value(true)
                .help("Hidden layer width"),
        )
        .arg(
            Arg::with_name("report")
                .long("report")
                .takes_value(true)
                .help("File for the per-epoch metric series"),
        )
        .arg(
            Arg::with_name("test_points")
                .long("test-points")
                .takes_value(true)
                .help("Random starting positions for the post-run test"),
        );
    let app = CommonArgs.add_args(app);
    let matches = OptimizerArgs {
        common: Default::default(),
        eval: Default::default(),
    }
    .add_args(app)
    .get_matches();

    let (common, eval) = CommonArgs.load_from_args(&matches)?;
    let optimizer = OptimizerArgs {
        common: common.clone(),
        eval: eval.clone(),
    }
    .load_from_args(&matches)?;

    let hidden: usize = matches
        .value_of("hidden")
        .unwrap_or("30")
        .parse()
        .map_err(|e| format!("--hidden: {}", e))?;
    let test_points: usize = matches
        .value_of("test_points")
        .unwrap_or("100")
        .parse()
        .map_err(|e| format!("--test-points: {}", e))?;
    let positions: usize = matches
        .value_of("positions")
        .unwrap_or("1")
        .parse()
        .map_err(|e| format!("--positions: {}", e))?;

    let model = NeuralNet::new(8)
        .layer(hidden, Activation::ReLu)
        .layer(2, Activation::Tanh);

    let mut arena = ArenaSim::default();
    arena.bind_robot(1);
    println!(
        "Using {} simulation(s) per controller, {} worker(s).",
        positions, common.num_workers
    );
    let mut pool = SimPool::new(
        arena,
        optimizer.required_slots(),
        positions,
        common.seed.wrapping_add(1),
    );

    let mut reporter = Reporter::new();
    let outcome = match &optimizer {
        Optimizer::Ga(ga) => ga.run(&model, &mut pool, &avoid_collision, &mut reporter)?,
        Optimizer::De(de) => de.run(&model, &mut pool, &avoid_collision, &mut reporter)?,
        Optimizer::Pso(pso) => pso.run(&model, &mut pool, &avoid_collision, &mut reporter)?,
    };

    println!(
        "Best controller fitness: {:.4} after {} epochs{}.",
        outcome.best.fitness,
        outcome.epochs,
        if outcome.stopped_early {
            " (stopped early)"
        } else {
            ""
        }
    );

    if let Some(report) = matches.value_of("report").map(PathBuf::from) {
        reporter.save(&report)?;
        println!("Metric series written to {}.", report.display());
    }

    if test_points > 0 {
        let mut rng = XorShiftRng::seed_from_u64(common.seed.wrapping_add(2));
        let mean = test_controller(
            &outcome.best,
            &model,
            pool.initial(),
            &eval,
            &avoid_collision,
            test_points,
            2 * eval.num_cycles,
            &mut rng,
        );
        println!(
            "Average fitness over {} random starting positions: {:.4}.",
            test_points, mean
        );
    }
    Ok(())
}
