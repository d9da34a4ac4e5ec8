//! Optimizer run loops
//! ---
//!
//! The three metaheuristics share one epoch driver.  Each variant
//! contributes a [`Strategy`]: how to build the initial population, how to
//! vary it, how to score the working pool and how to reduce it back to the
//! target size.  The driver owns everything else: starting-position policy,
//! best-genome tracking with early stopping, per-epoch metrics and the final
//! genome persistence.
//!
//! Configuration is a pair of plain immutable values ([`EvoParams`],
//! [`EvalParams`]) plus the variant-specific fields on each optimizer
//! struct, built once and handed to `run`.

pub mod de;
pub mod ga;
pub mod pso;

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use rayon::ThreadPool;

use crate::controller::Controller;
use crate::error::{EvoError, EvoResult};
use crate::model::Model;
use crate::population::eval::{Aggregate, EvalContext};
use crate::report::Reporter;
use crate::sim::{SimPool, Simulation};

pub use self::de::{DifferentialEvolution, MutationStrategy};
pub use self::ga::GeneticAlgorithm;
pub use self::pso::ParticleSwarm;

/// Minimum fitness gain that counts as progress for early stopping.
pub const IMPROVEMENT_EPS: f32 = 1e-4;

/// How simulation starting positions evolve across epochs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionPolicy {
    /// One random starting position drawn before the run, reused every epoch.
    Static,
    /// A fresh random starting position every epoch.
    Dynamic,
    /// The starting position drifts each epoch: the robot is driven `step`
    /// wheel units, jittered by up to `noise`, through the physics.
    Moving {
        /// Wheel units driven per epoch.
        step: f64,
        /// Uniform jitter applied per wheel per epoch.
        noise: f64,
    },
}

/// Run parameters shared by every optimizer variant.
#[derive(Debug, Clone)]
pub struct EvoParams {
    /// Target population size.
    pub pop_size: usize,
    /// Hard cap on the number of epochs.
    pub max_epochs: usize,
    /// Consecutive non-improving epochs tolerated before stopping.
    pub early_stop: usize,
    /// Uniform bounds for initial genome values.
    pub init_limits: (f32, f32),
    /// Starting-position policy.
    pub position: PositionPolicy,
    /// Evaluation worker count; 1 runs sequentially.
    pub num_workers: usize,
    /// Seed for every random draw of the run.
    pub seed: u64,
    /// Where to persist the best genome, if anywhere.
    pub output_dir: Option<PathBuf>,
}

impl Default for EvoParams {
    fn default() -> EvoParams {
        EvoParams {
            pop_size: 100,
            max_epochs: 100,
            early_stop: std::usize::MAX,
            init_limits: (-1.0, 1.0),
            position: PositionPolicy::Static,
            num_workers: 1,
            seed: 42,
            output_dir: None,
        }
    }
}

/// Evaluation parameters shared by every optimizer variant.
#[derive(Debug, Clone)]
pub struct EvalParams {
    /// Control cycles per evaluation episode.
    pub num_cycles: usize,
    /// Simulation ticks per control cycle.
    pub steps_per_cycle: u32,
    /// Motor command scale.
    pub max_speed: f64,
    /// Reduction from per-cycle scores to the episode score.
    pub aggregate: Aggregate,
    /// Episode length for the per-epoch validation probe of the best
    /// controller on the pristine world; 0 disables the probe.
    pub validation_cycles: usize,
}

impl Default for EvalParams {
    fn default() -> EvalParams {
        EvalParams {
            num_cycles: 80,
            steps_per_cycle: 7,
            max_speed: 5.0,
            aggregate: Aggregate::Mean,
            validation_cycles: 800,
        }
    }
}

/// Fitness summary of the population after an epoch.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Best fitness in the population.
    pub max: f32,
    /// Mean fitness.
    pub avg: f32,
    /// Worst fitness.
    pub min: f32,
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Deep copy of the best controller seen, at its tracked fitness.
    pub best: Controller,
    /// Epochs actually run.
    pub epochs: usize,
    /// True when the early-stopping horizon triggered before the epoch cap.
    pub stopped_early: bool,
}

/// Variant-specific step of the epoch loop.
///
/// The driver calls `initialize` once, then per epoch `vary`, `evaluate`
/// and `select` in that order, reading `stats` and `best` afterwards.
pub trait Strategy<M: Model, S: Simulation, F> {
    /// Builds the initial population; variants that need scored parents
    /// evaluate them here and return the simulated time.
    fn initialize(
        &mut self,
        ctx: &EvalContext<M, F>,
        sims: &mut [Vec<S>],
        workers: Option<&ThreadPool>,
        rng: &mut XorShiftRng,
    ) -> EvoResult<Duration>;

    /// Produces this generation's working pool.
    fn vary(&mut self, rng: &mut XorShiftRng) -> EvoResult<()>;

    /// Scores the working pool.
    fn evaluate(
        &mut self,
        ctx: &EvalContext<M, F>,
        sims: &mut [Vec<S>],
        workers: Option<&ThreadPool>,
    ) -> EvoResult<Duration>;

    /// Reduces the working pool back to the target population size.
    fn select(&mut self, rng: &mut XorShiftRng) -> EvoResult<()>;

    /// Fitness summary of the current population.
    fn stats(&self) -> PoolStats;

    /// The current best controller.
    fn best(&self) -> &Controller;
}

/// Runs the shared epoch loop over a variant strategy.
pub fn drive<M, S, F, T>(
    strategy: &mut T,
    label: &str,
    common: &EvoParams,
    eval: &EvalParams,
    model: &M,
    pool: &mut SimPool<S>,
    fitness: &F,
    reporter: &mut Reporter,
) -> EvoResult<Outcome>
where
    M: Model,
    S: Simulation,
    F: Fn(&[f32], f32, f32) -> f32 + Sync,
    T: Strategy<M, S, F>,
{
    validate_common(common)?;
    let workers = build_workers(common.num_workers)?;
    let mut rng = XorShiftRng::seed_from_u64(common.seed);
    let ctx = EvalContext {
        model,
        num_cycles: eval.num_cycles,
        steps_per_cycle: eval.steps_per_cycle,
        max_speed: eval.max_speed,
        eval_func: fitness,
        aggregate: eval.aggregate,
    };

    // The static policy draws its single starting position up front.
    if let PositionPolicy::Static = common.position {
        pool.shuffle_defaults();
    }
    pool.reset_to_defaults();
    strategy.initialize(&ctx, pool.slots_mut(), workers.as_ref(), &mut rng)?;

    let started = SystemTime::now();
    let mut best: Option<Controller> = None;
    let mut no_change = 0usize;
    let mut epoch = 0usize;

    while epoch < common.max_epochs && no_change < common.early_stop {
        match common.position {
            PositionPolicy::Static => {}
            PositionPolicy::Dynamic => pool.shuffle_defaults(),
            PositionPolicy::Moving { step, noise } => pool.advance_defaults(step, noise),
        }
        pool.reset_to_defaults();

        let epoch_start = Instant::now();
        strategy.vary(&mut rng)?;
        let sim_time = strategy.evaluate(&ctx, pool.slots_mut(), workers.as_ref())?;
        strategy.select(&mut rng)?;

        let stats = strategy.stats();
        if let Some(pos) = pool.default_position() {
            reporter.put_point("start_pos", pos);
        }
        reporter.put("max", stats.max);
        reporter.put("avg", stats.avg);
        reporter.put("min", stats.min);
        if eval.validation_cycles > 0 {
            let valid = validate_best(strategy.best(), eval, &ctx, pool.initial());
            reporter.put("valid", valid);
        }

        let (s, m) = started
            .elapsed()
            .map(|e| (e.as_secs(), e.subsec_millis()))
            .unwrap_or((0, 0));
        println!(
            "Time:{}.{:03},\tEpoch: {} ({:.2}s, sim {:.2}s),\tBest: {:.4},\tAvg: {:.4},\tMin: {:.4}",
            s,
            m,
            epoch,
            secs(epoch_start.elapsed()),
            secs(sim_time),
            stats.max,
            stats.avg,
            stats.min
        );

        match best {
            Some(ref tracked) if stats.max - tracked.fitness < IMPROVEMENT_EPS => no_change += 1,
            _ => {
                best = Some(strategy.best().clone());
                no_change = 0;
            }
        }
        epoch += 1;
    }

    let best = best.ok_or_else(|| {
        EvoError::InvalidConfig("the run finished without completing an epoch".to_string())
    })?;

    if let Some(dir) = &common.output_dir {
        let path = dir.join(format!("{}_final_{}.nn", label, unix_seconds()));
        model.save_genome(&path, &best.weights, &best.biases)?;
    }
    println!("Evolution finished after {} epochs.", epoch);

    Ok(Outcome {
        best,
        epochs: epoch,
        stopped_early: no_change >= common.early_stop,
    })
}

/// Scores a controller over `num_points` random starting positions of the
/// given pristine world and returns the mean fitness.  Useful after a run.
pub fn test_controller<M, S, F>(
    controller: &Controller,
    model: &M,
    sim: &S,
    eval: &EvalParams,
    fitness: &F,
    num_points: usize,
    num_cycles: usize,
    rng: &mut XorShiftRng,
) -> f32
where
    M: Model,
    S: Simulation,
    F: Fn(&[f32], f32, f32) -> f32 + Sync,
{
    let ctx = EvalContext {
        model,
        num_cycles,
        steps_per_cycle: eval.steps_per_cycle,
        max_speed: eval.max_speed,
        eval_func: fitness,
        aggregate: Aggregate::Mean,
    };
    let mut probe = controller.clone();
    let mut world = sim.snapshot();
    let mut scores = Vec::with_capacity(num_points);
    for _ in 0..num_points {
        world.restore(sim);
        world.move_robot_random(rng);
        probe.reset_fitness();
        probe.evaluate(&mut world, &ctx);
        scores.push(probe.fitness);
    }
    Aggregate::Mean.apply(&scores)
}

fn validate_common(common: &EvoParams) -> EvoResult<()> {
    if common.max_epochs == 0 {
        return Err(EvoError::InvalidConfig(
            "max_epochs must be at least 1".to_string(),
        ));
    }
    if common.early_stop == 0 {
        return Err(EvoError::InvalidConfig(
            "early_stop must be at least 1".to_string(),
        ));
    }
    if common.init_limits.0 >= common.init_limits.1 {
        return Err(EvoError::InvalidConfig(format!(
            "init_limits ({}, {}) must be an increasing range",
            common.init_limits.0, common.init_limits.1
        )));
    }
    Ok(())
}

fn build_workers(count: usize) -> EvoResult<Option<ThreadPool>> {
    match count {
        0 => Err(EvoError::InvalidConfig(
            "worker count must be at least 1".to_string(),
        )),
        1 => Ok(None),
        n => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map(Some)
            .map_err(|e| EvoError::ThreadPool(e.to_string())),
    }
}

fn validate_best<M, S, F>(
    best: &Controller,
    eval: &EvalParams,
    ctx: &EvalContext<M, F>,
    initial: &S,
) -> f32
where
    M: Model,
    S: Simulation,
    F: Fn(&[f32], f32, f32) -> f32,
{
    let probe_ctx = EvalContext {
        num_cycles: eval.validation_cycles,
        aggregate: Aggregate::Mean,
        ..*ctx
    };
    let mut probe = best.clone();
    probe.reset_fitness();
    let mut world = initial.snapshot();
    probe.evaluate(&mut world, &probe_ctx);
    probe.fitness
}

fn secs(duration: Duration) -> f64 {
    duration.as_secs() as f64 + f64::from(duration.subsec_millis()) / 1000.0
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
