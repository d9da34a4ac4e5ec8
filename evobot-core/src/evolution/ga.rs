//! Genetic algorithm
//! ---
//!
//! Each epoch enlarges the pool with crossover offspring, mutates every
//! member, scores the enlarged pool and selects it back down to the target
//! size.

use std::time::Duration;

use rand_xorshift::XorShiftRng;
use rayon::ThreadPool;

use crate::controller::Controller;
use crate::error::{EvoError, EvoResult};
use crate::model::Model;
use crate::population::eval::EvalContext;
use crate::population::Population;
use crate::report::Reporter;
use crate::selection::Selection;
use crate::sim::{SimPool, Simulation};

use super::{drive, EvalParams, EvoParams, Outcome, PoolStats, Strategy};

/// Configuration for one genetic-algorithm run.
#[derive(Debug, Clone)]
pub struct GeneticAlgorithm {
    /// Shared run parameters.
    pub common: EvoParams,
    /// Shared evaluation parameters.
    pub eval: EvalParams,
    /// Per-element mutation probability.
    pub p_mut: f32,
    /// Per-pair crossover probability.
    pub p_cross: f32,
    /// Selection operator for the next generation.
    pub selection: Selection,
}

impl GeneticAlgorithm {
    /// Working-pool high-water mark: crossover can double the population.
    pub fn required_slots(&self) -> usize {
        2 * self.common.pop_size
    }

    fn validate<S: Simulation>(&self, pool: &SimPool<S>) -> EvoResult<()> {
        if self.common.pop_size < 2 {
            return Err(EvoError::InvalidConfig(
                "the genetic algorithm needs a population of at least 2".to_string(),
            ));
        }
        check_probability("p_mut", self.p_mut)?;
        check_probability("p_cross", self.p_cross)?;
        if let Selection::Tournament(0) = self.selection {
            return Err(EvoError::InvalidConfig(
                "tournament size must be a positive integer".to_string(),
            ));
        }
        if pool.num_slots() < self.required_slots() {
            return Err(EvoError::InvalidConfig(format!(
                "simulation pool has {} slots but the enlarged pool can need {}",
                pool.num_slots(),
                self.required_slots()
            )));
        }
        Ok(())
    }

    /// Runs the full epoch loop and returns the tracked best controller.
    pub fn run<M, S, F>(
        &self,
        model: &M,
        pool: &mut SimPool<S>,
        fitness: &F,
        reporter: &mut Reporter,
    ) -> EvoResult<Outcome>
    where
        M: Model,
        S: Simulation,
        F: Fn(&[f32], f32, f32) -> f32 + Sync,
    {
        self.validate(pool)?;
        let mut state = GaState {
            pop: Population::with_target(self.common.pop_size),
            pop_size: self.common.pop_size,
            init_limits: self.common.init_limits,
            p_mut: self.p_mut,
            p_cross: self.p_cross,
            selection: self.selection,
        };
        drive(
            &mut state,
            "ga",
            &self.common,
            &self.eval,
            model,
            pool,
            fitness,
            reporter,
        )
    }
}

pub(crate) fn check_probability(name: &str, value: f32) -> EvoResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EvoError::InvalidConfig(format!(
            "{} must be a probability in [0, 1], got {}",
            name, value
        )))
    }
}

struct GaState {
    pop: Population,
    pop_size: usize,
    init_limits: (f32, f32),
    p_mut: f32,
    p_cross: f32,
    selection: Selection,
}

impl<M, S, F> Strategy<M, S, F> for GaState
where
    M: Model,
    S: Simulation,
    F: Fn(&[f32], f32, f32) -> f32 + Sync,
{
    fn initialize(
        &mut self,
        ctx: &EvalContext<M, F>,
        _sims: &mut [Vec<S>],
        _workers: Option<&ThreadPool>,
        rng: &mut XorShiftRng,
    ) -> EvoResult<Duration> {
        self.pop = Population::initialize(ctx.model, self.pop_size, self.init_limits, rng);
        Ok(Duration::new(0, 0))
    }

    fn vary(&mut self, rng: &mut XorShiftRng) -> EvoResult<()> {
        self.pop.crossover(self.p_cross, rng);
        self.pop.mutate(self.p_mut, rng);
        Ok(())
    }

    fn evaluate(
        &mut self,
        ctx: &EvalContext<M, F>,
        sims: &mut [Vec<S>],
        workers: Option<&ThreadPool>,
    ) -> EvoResult<Duration> {
        self.pop.evaluate(sims, ctx, workers)
    }

    fn select(&mut self, rng: &mut XorShiftRng) -> EvoResult<()> {
        self.pop = self.pop.select(&self.selection, rng)?;
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            max: self.pop.best().fitness,
            avg: self.pop.average_fitness(),
            min: self.pop.worst().fitness,
        }
    }

    fn best(&self) -> &Controller {
        self.pop.best()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::eval::Aggregate;
    use crate::testkit::{left_speed, EchoModel, MockSim};

    fn optimizer(pop_size: usize) -> GeneticAlgorithm {
        GeneticAlgorithm {
            common: EvoParams {
                pop_size,
                max_epochs: 5,
                seed: 21,
                ..EvoParams::default()
            },
            eval: EvalParams {
                num_cycles: 2,
                steps_per_cycle: 1,
                max_speed: 1.0,
                aggregate: Aggregate::Mean,
                validation_cycles: 0,
            },
            p_mut: 0.5,
            p_cross: 1.0,
            selection: Selection::Tournament(2),
        }
    }

    fn mock_pool(slots: usize) -> SimPool<MockSim> {
        let mut initial = MockSim::new(vec![0.3; 8]);
        initial.bind_robot(0);
        SimPool::new(initial, slots, 1, 13)
    }

    #[test]
    fn test_run_keeps_population_at_target_size() {
        let optimizer = optimizer(6);
        let mut pool = mock_pool(12);
        let mut reporter = Reporter::new();
        let outcome = optimizer
            .run(&EchoModel, &mut pool, &left_speed, &mut reporter)
            .unwrap();
        assert_eq!(outcome.epochs, 5);
        assert_eq!(reporter.len("max"), 5);
    }

    #[test]
    fn test_undersized_pool_is_rejected() {
        let optimizer = optimizer(6);
        let mut pool = mock_pool(6);
        let mut reporter = Reporter::new();
        assert!(optimizer
            .run(&EchoModel, &mut pool, &left_speed, &mut reporter)
            .is_err());
    }

    #[test]
    fn test_bad_probabilities_are_rejected() {
        let mut bad = optimizer(4);
        bad.p_mut = 1.5;
        let mut pool = mock_pool(8);
        let mut reporter = Reporter::new();
        assert!(bad
            .run(&EchoModel, &mut pool, &left_speed, &mut reporter)
            .is_err());
    }
}
