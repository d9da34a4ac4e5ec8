//! Parallel fitness evaluator
//! ---
//!
//! Scoring a controller touches only its own fitness accumulator and the
//! simulation instances assigned exclusively to it, so the dispatch across
//! controllers is embarrassingly parallel and needs no locking.  Variation
//! and selection stay sequential; they run strictly before and after this
//! barrier.
//!
//! All evaluation inputs travel in an explicit, immutable [`EvalContext`]
//! handed to every worker; there is no process-wide shared state.  With a
//! single worker and a fixed seed a run is deterministic; with several
//! workers the per-worker timing interleaving is not, which is a documented
//! limitation rather than a defect.

use std::time::Duration;

use float_ord::FloatOrd;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::controller::Controller;
use crate::error::{EvoError, EvoResult};
use crate::model::Model;
use crate::sim::Simulation;

/// How per-cycle scores reduce to one episode score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    /// Arithmetic mean of the per-cycle scores (the default).
    Mean,
    /// Sum of the per-cycle scores.
    Total,
    /// Worst per-cycle score.
    Min,
}

impl Aggregate {
    /// Reduces `scores` to a single value; empty input reduces to zero.
    pub fn apply(&self, scores: &[f32]) -> f32 {
        if scores.is_empty() {
            return 0.0;
        }
        match self {
            Aggregate::Mean => scores.iter().sum::<f32>() / scores.len() as f32,
            Aggregate::Total => scores.iter().sum(),
            Aggregate::Min => {
                scores
                    .iter()
                    .cloned()
                    .min_by_key(|score| FloatOrd(*score))
                    .unwrap_or(0.0)
            }
        }
    }
}

/// Immutable inputs shared by every evaluation worker.
#[derive(Clone, Copy)]
pub struct EvalContext<'a, M, F> {
    /// The model the genomes parameterize.
    pub model: &'a M,
    /// Control cycles per evaluation episode.
    pub num_cycles: usize,
    /// Simulation ticks driven per control cycle.
    pub steps_per_cycle: u32,
    /// Motor command scale.
    pub max_speed: f64,
    /// Per-cycle scoring function of `(post-step sensors, left, right)`.
    pub eval_func: &'a F,
    /// Reduction from per-cycle scores to the episode score.
    pub aggregate: Aggregate,
}

/// Scores every controller against its row of simulation instances.
///
/// Controller `i` is evaluated once per instance in `sims[i]`; its fitness
/// is reset first and divided by the instance count afterwards, so scores
/// stay comparable regardless of how many starting positions were sampled.
/// Returns the total wall time spent inside simulation steps.
pub fn evaluate_all<M, S, F>(
    members: Vec<&mut Controller>,
    sims: &mut [Vec<S>],
    ctx: &EvalContext<M, F>,
    workers: Option<&ThreadPool>,
) -> EvoResult<Duration>
where
    M: Model,
    S: Simulation,
    F: Fn(&[f32], f32, f32) -> f32 + Sync,
{
    let count = members.len();
    if sims.len() < count {
        return Err(EvoError::InvalidConfig(format!(
            "{} controllers to evaluate but only {} simulation slots",
            count,
            sims.len()
        )));
    }

    match workers {
        None => {
            let mut total = Duration::new(0, 0);
            for (member, row) in members.into_iter().zip(sims.iter_mut()) {
                total += score_one(member, row, ctx);
            }
            Ok(total)
        }
        Some(pool) => {
            let rows = &mut sims[..count];
            Ok(pool.install(|| {
                members
                    .into_par_iter()
                    .zip(rows.par_iter_mut())
                    .map(|(member, row)| score_one(member, row, ctx))
                    .sum()
            }))
        }
    }
}

/// Splits a total simulated duration across the workers that produced it,
/// giving the approximate parallel wall time.
pub(crate) fn worker_share(total: Duration, workers: Option<&ThreadPool>) -> Duration {
    let count = workers.map(|pool| pool.current_num_threads()).unwrap_or(1);
    total / count.max(1) as u32
}

fn score_one<M, S, F>(controller: &mut Controller, sims: &mut Vec<S>, ctx: &EvalContext<M, F>) -> Duration
where
    M: Model,
    S: Simulation,
    F: Fn(&[f32], f32, f32) -> f32,
{
    controller.reset_fitness();
    let mut elapsed = Duration::new(0, 0);
    for sim in sims.iter_mut() {
        elapsed += controller.evaluate(sim, ctx);
    }
    if !sims.is_empty() {
        controller.fitness /= sims.len() as f32;
    }
    elapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{echo_controller, left_speed, EchoModel, MockSim};

    fn sims(rows: usize, per_row: usize) -> Vec<Vec<MockSim>> {
        (0..rows)
            .map(|_| {
                (0..per_row)
                    .map(|_| {
                        let mut sim = MockSim::new(vec![0.0; 8]);
                        sim.bind_robot(0);
                        sim
                    })
                    .collect()
            })
            .collect()
    }

    fn ctx<'a>(
        model: &'a EchoModel,
        f: &'a fn(&[f32], f32, f32) -> f32,
    ) -> EvalContext<'a, EchoModel, fn(&[f32], f32, f32) -> f32> {
        EvalContext {
            model,
            num_cycles: 4,
            steps_per_cycle: 2,
            max_speed: 1.0,
            eval_func: f,
            aggregate: Aggregate::Mean,
        }
    }

    #[test]
    fn test_aggregate() {
        let scores = [1.0, 2.0, 6.0];
        assert_eq!(Aggregate::Mean.apply(&scores), 3.0);
        assert_eq!(Aggregate::Total.apply(&scores), 9.0);
        assert_eq!(Aggregate::Min.apply(&scores), 1.0);
        assert_eq!(Aggregate::Mean.apply(&[]), 0.0);
    }

    #[test]
    fn test_fitness_divided_by_instance_count() {
        let model = EchoModel;
        let f: fn(&[f32], f32, f32) -> f32 = left_speed;
        let ctx = ctx(&model, &f);

        let mut one = echo_controller(0.8);
        let mut two = echo_controller(0.8);
        let mut single = sims(1, 1);
        let mut triple = sims(1, 3);
        evaluate_all(vec![&mut one], &mut single, &ctx, None).unwrap();
        evaluate_all(vec![&mut two], &mut triple, &ctx, None).unwrap();

        // three starting positions must not triple the score
        assert!((one.fitness - two.fitness).abs() < 1e-6);
        assert!((one.fitness - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let model = EchoModel;
        let f: fn(&[f32], f32, f32) -> f32 = left_speed;
        let ctx = ctx(&model, &f);

        let values = [0.1f32, 0.7, 0.3, 0.9, 0.5];
        let mut sequential: Vec<_> = values.iter().map(|v| echo_controller(*v)).collect();
        let mut parallel: Vec<_> = values.iter().map(|v| echo_controller(*v)).collect();

        let mut rows = sims(values.len(), 2);
        evaluate_all(sequential.iter_mut().collect(), &mut rows, &ctx, None).unwrap();

        let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
        let mut rows = sims(values.len(), 2);
        evaluate_all(parallel.iter_mut().collect(), &mut rows, &ctx, Some(&pool)).unwrap();

        for (a, b) in sequential.iter().zip(parallel.iter()) {
            assert_eq!(a.fitness, b.fitness);
        }
    }

    #[test]
    fn test_too_few_slots_is_rejected() {
        let model = EchoModel;
        let f: fn(&[f32], f32, f32) -> f32 = left_speed;
        let ctx = ctx(&model, &f);
        let mut a = echo_controller(0.1);
        let mut b = echo_controller(0.2);
        let mut rows = sims(1, 1);
        let err = evaluate_all(vec![&mut a, &mut b], &mut rows, &ctx, None);
        assert!(err.is_err());
    }
}
