//! Command-line argument handling for the training binaries.
//!
//! Every argument group owns its parsing through [`ArgAugmenter`]; all
//! values are validated here, before any simulation work starts, so a bad
//! setting never reaches the evaluation loop.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{App, Arg, ArgMatches, SubCommand};

use evobot_core::error::{EvoError, EvoResult};
use evobot_core::evolution::{
    DifferentialEvolution, EvalParams, EvoParams, GeneticAlgorithm, MutationStrategy,
    ParticleSwarm, PositionPolicy,
};
use evobot_core::selection::Selection;

/// Trait to add new arguments to the current app
pub trait ArgAugmenter {
    /// Type of struct to output from this parser
    type Output;

    /// Specifies arguments to add
    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b>;

    /// Parses and validates the arguments
    fn load_from_args<'a>(&self, args: &ArgMatches<'a>) -> EvoResult<Self::Output>;
}

/// The optimizer chosen on the command line.
pub enum Optimizer {
    /// Genetic algorithm
    Ga(GeneticAlgorithm),
    /// Differential evolution
    De(DifferentialEvolution),
    /// Particle swarm optimization
    Pso(ParticleSwarm),
}

impl Optimizer {
    /// Simulation slots the chosen optimizer needs per starting position.
    pub fn required_slots(&self) -> usize {
        match self {
            Optimizer::Ga(ga) => ga.required_slots(),
            Optimizer::De(de) => de.required_slots(),
            Optimizer::Pso(pso) => pso.required_slots(),
        }
    }
}

fn parse_arg<'a, T>(args: &ArgMatches<'a>, name: &str, default: T) -> EvoResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    match args.value_of(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e| {
            EvoError::InvalidConfig(format!("--{} {}: {}", name, raw, e))
        }),
    }
}

/// Arguments shared by every optimizer.
pub struct CommonArgs;

impl ArgAugmenter for CommonArgs {
    type Output = (EvoParams, EvalParams);

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        app.arg(
            Arg::with_name("pop_size")
                .short("p")
                .long("pop-size")
                .takes_value(true)
                .help("Number of controllers in the population"),
        )
        .arg(
            Arg::with_name("epochs")
                .short("e")
                .long("epochs")
                .takes_value(true)
                .help("Maximum number of epochs to run"),
        )
        .arg(
            Arg::with_name("early_stop")
                .long("early-stop")
                .takes_value(true)
                .help("Stop after this many epochs without improvement"),
        )
        .arg(
            Arg::with_name("workers")
                .short("w")
                .long("workers")
                .takes_value(true)
                .help("Parallel evaluation workers; 1 runs sequentially"),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .help("Seed for every random draw of the run"),
        )
        .arg(
            Arg::with_name("positions")
                .long("positions")
                .takes_value(true)
                .help("Starting positions sampled per controller"),
        )
        .arg(
            Arg::with_name("position_policy")
                .long("position-policy")
                .takes_value(true)
                .possible_values(&["static", "dynamic", "moving"])
                .help("How starting positions evolve across epochs"),
        )
        .arg(
            Arg::with_name("move_step")
                .long("move-step")
                .takes_value(true)
                .help("Wheel units driven per epoch under the moving policy"),
        )
        .arg(
            Arg::with_name("move_noise")
                .long("move-noise")
                .takes_value(true)
                .help("Per-wheel jitter under the moving policy"),
        )
        .arg(
            Arg::with_name("cycles")
                .long("cycles")
                .takes_value(true)
                .help("Control cycles per evaluation episode"),
        )
        .arg(
            Arg::with_name("steps")
                .long("steps")
                .takes_value(true)
                .help("Simulation ticks per control cycle"),
        )
        .arg(
            Arg::with_name("max_speed")
                .long("max-speed")
                .takes_value(true)
                .help("Motor command scale"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("Directory for the persisted best genome"),
        )
    }

    fn load_from_args<'a>(&self, args: &ArgMatches<'a>) -> EvoResult<Self::Output> {
        let position = match args.value_of("position_policy").unwrap_or("static") {
            "dynamic" => PositionPolicy::Dynamic,
            "moving" => PositionPolicy::Moving {
                step: parse_arg(args, "move_step", 1.0)?,
                noise: parse_arg(args, "move_noise", 0.0)?,
            },
            _ => PositionPolicy::Static,
        };

        let defaults = EvoParams::default();
        let common = EvoParams {
            pop_size: parse_arg(args, "pop_size", defaults.pop_size)?,
            max_epochs: parse_arg(args, "epochs", defaults.max_epochs)?,
            early_stop: parse_arg(args, "early_stop", defaults.early_stop)?,
            init_limits: defaults.init_limits,
            position,
            num_workers: parse_arg(args, "workers", defaults.num_workers)?,
            seed: parse_arg(args, "seed", defaults.seed)?,
            output_dir: args.value_of("output").map(PathBuf::from),
        };

        let eval_defaults = EvalParams::default();
        let eval = EvalParams {
            num_cycles: parse_arg(args, "cycles", eval_defaults.num_cycles)?,
            steps_per_cycle: parse_arg(args, "steps", eval_defaults.steps_per_cycle)?,
            max_speed: parse_arg(args, "max_speed", eval_defaults.max_speed)?,
            aggregate: eval_defaults.aggregate,
            validation_cycles: eval_defaults.validation_cycles,
        };
        Ok((common, eval))
    }
}

/// The per-algorithm subcommands, built around already-parsed shared
/// parameters.
pub struct OptimizerArgs {
    /// Shared run parameters.
    pub common: EvoParams,
    /// Shared evaluation parameters.
    pub eval: EvalParams,
}

impl ArgAugmenter for OptimizerArgs {
    type Output = Optimizer;

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        app.subcommand(
            SubCommand::with_name("ga")
                .about("Genetic algorithm")
                .arg(
                    Arg::with_name("p_mut")
                        .long("p-mut")
                        .takes_value(true)
                        .help("Per-element mutation probability"),
                )
                .arg(
                    Arg::with_name("p_cross")
                        .long("p-cross")
                        .takes_value(true)
                        .help("Per-pair crossover probability"),
                )
                .arg(
                    Arg::with_name("selection")
                        .short("s")
                        .long("selection")
                        .takes_value(true)
                        .help("Tournament size or \"roulette-wheel\""),
                ),
        )
        .subcommand(
            SubCommand::with_name("de")
                .about("Differential evolution")
                .arg(
                    Arg::with_name("p_cross")
                        .long("p-cross")
                        .takes_value(true)
                        .help("Per-element probability of taking the mutant gene"),
                )
                .arg(
                    Arg::with_name("diff_weight")
                        .short("F")
                        .long("diff-weight")
                        .takes_value(true)
                        .help("Weight applied to the donor difference vector"),
                )
                .arg(
                    Arg::with_name("strategy")
                        .long("strategy")
                        .takes_value(true)
                        .possible_values(&["rand", "best"])
                        .help("Mutation base strategy"),
                ),
        )
        .subcommand(
            SubCommand::with_name("pso")
                .about("Particle swarm optimization")
                .arg(
                    Arg::with_name("inertia")
                        .long("inertia")
                        .takes_value(true)
                        .help("Weight of the particle's own velocity"),
                )
                .arg(
                    Arg::with_name("cognitive")
                        .long("cognitive")
                        .takes_value(true)
                        .help("Pull toward the personal best"),
                )
                .arg(
                    Arg::with_name("social")
                        .long("social")
                        .takes_value(true)
                        .help("Pull toward the global best"),
                ),
        )
    }

    fn load_from_args<'a>(&self, args: &ArgMatches<'a>) -> EvoResult<Self::Output> {
        match args.subcommand() {
            ("ga", Some(sub)) => {
                let selection = match sub.value_of("selection") {
                    Some(raw) => Selection::parse(raw)?,
                    None => Selection::Tournament(3),
                };
                Ok(Optimizer::Ga(GeneticAlgorithm {
                    common: self.common.clone(),
                    eval: self.eval.clone(),
                    p_mut: parse_arg(sub, "p_mut", 0.03)?,
                    p_cross: parse_arg(sub, "p_cross", 0.75)?,
                    selection,
                }))
            }
            ("de", Some(sub)) => {
                let strategy = match sub.value_of("strategy") {
                    Some(raw) => MutationStrategy::parse(raw)?,
                    None => MutationStrategy::Rand,
                };
                Ok(Optimizer::De(DifferentialEvolution {
                    common: self.common.clone(),
                    eval: self.eval.clone(),
                    p_cross: parse_arg(sub, "p_cross", 0.75)?,
                    diff_weight: parse_arg(sub, "diff_weight", 1.0)?,
                    strategy,
                }))
            }
            ("pso", Some(sub)) => Ok(Optimizer::Pso(ParticleSwarm {
                common: self.common.clone(),
                eval: self.eval.clone(),
                inertia: parse_arg(sub, "inertia", 1.0)?,
                cognitive: parse_arg(sub, "cognitive", 2.05)?,
                social: parse_arg(sub, "social", 2.05)?,
            })),
            _ => Err(EvoError::InvalidConfig(
                "pick one of the ga, de or pso subcommands".to_string(),
            )),
        }
    }
}
