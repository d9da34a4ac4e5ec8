//! Differential evolution
//! ---
//!
//! Each epoch builds one trial candidate per population slot from a
//! base-plus-weighted-difference mutant and binary crossover, scores the
//! candidate list, and keeps whichever of parent and trial scored higher.
//! Per-slot fitness therefore never decreases across a generation.

use std::time::Duration;

use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand_xorshift::XorShiftRng;
use rayon::ThreadPool;

use crate::controller::Controller;
use crate::error::{EvoError, EvoResult};
use crate::model::Model;
use crate::population::eval::{evaluate_all, worker_share, EvalContext};
use crate::population::Population;
use crate::report::Reporter;
use crate::sim::{SimPool, Simulation};

use super::ga::check_probability;
use super::{drive, EvalParams, EvoParams, Outcome, PoolStats, Strategy};

/// Where the mutant's base vector comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MutationStrategy {
    /// Base on a random member distinct from the slot.
    Rand,
    /// Base on the current best member.
    Best,
}

impl MutationStrategy {
    /// Parses `"rand"` or `"best"`; anything else fails immediately.
    pub fn parse(raw: &str) -> EvoResult<MutationStrategy> {
        match raw {
            "rand" => Ok(MutationStrategy::Rand),
            "best" => Ok(MutationStrategy::Best),
            _ => Err(EvoError::InvalidConfig(format!(
                "mutation strategy must be \"rand\" or \"best\", got \"{}\"",
                raw
            ))),
        }
    }
}

/// Configuration for one differential-evolution run.
#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    /// Shared run parameters.
    pub common: EvoParams,
    /// Shared evaluation parameters.
    pub eval: EvalParams,
    /// Per-element probability of taking the mutant gene.
    pub p_cross: f32,
    /// Weight applied to the donor difference vector.
    pub diff_weight: f32,
    /// Mutation base strategy.
    pub strategy: MutationStrategy,
}

impl DifferentialEvolution {
    /// Candidates are scored one per slot; parents keep their carried score.
    pub fn required_slots(&self) -> usize {
        self.common.pop_size
    }

    fn validate<S: Simulation>(&self, pool: &SimPool<S>) -> EvoResult<()> {
        if self.common.pop_size < 4 {
            return Err(EvoError::InvalidConfig(
                "differential evolution needs a population of at least 4".to_string(),
            ));
        }
        check_probability("p_cross", self.p_cross)?;
        if !self.diff_weight.is_finite() {
            return Err(EvoError::InvalidConfig(format!(
                "diff_weight must be finite, got {}",
                self.diff_weight
            )));
        }
        if pool.num_slots() < self.required_slots() {
            return Err(EvoError::InvalidConfig(format!(
                "simulation pool has {} slots but the candidate list needs {}",
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
        let mut state = DeState {
            pop: Population::with_target(self.common.pop_size),
            candidates: Vec::new(),
            pop_size: self.common.pop_size,
            init_limits: self.common.init_limits,
            p_cross: self.p_cross,
            diff_weight: self.diff_weight,
            strategy: self.strategy,
        };
        drive(
            &mut state,
            "de",
            &self.common,
            &self.eval,
            model,
            pool,
            fitness,
            reporter,
        )
    }
}

struct DeState {
    pop: Population,
    candidates: Vec<Controller>,
    pop_size: usize,
    init_limits: (f32, f32),
    p_cross: f32,
    diff_weight: f32,
    strategy: MutationStrategy,
}

impl DeState {
    /// Index of the best parent, for the `Best` base strategy.
    fn best_index(&self) -> usize {
        let members = self.pop.members();
        let mut best = 0;
        for (idx, member) in members.iter().enumerate().skip(1) {
            if member.fitness > members[best].fitness {
                best = idx;
            }
        }
        best
    }
}

impl<M, S, F> Strategy<M, S, F> for DeState
where
    M: Model,
    S: Simulation,
    F: Fn(&[f32], f32, f32) -> f32 + Sync,
{
    fn initialize(
        &mut self,
        ctx: &EvalContext<M, F>,
        sims: &mut [Vec<S>],
        workers: Option<&ThreadPool>,
        rng: &mut XorShiftRng,
    ) -> EvoResult<Duration> {
        self.pop = Population::initialize(ctx.model, self.pop_size, self.init_limits, rng);
        // parents need scores before the first greedy comparison
        self.pop.evaluate(sims, ctx, workers)
    }

    fn vary(&mut self, rng: &mut XorShiftRng) -> EvoResult<()> {
        let members = self.pop.members();
        let best = match self.strategy {
            MutationStrategy::Best => Some(self.best_index()),
            MutationStrategy::Rand => None,
        };

        let mut candidates = Vec::with_capacity(members.len());
        for slot in 0..members.len() {
            let donors: Vec<usize> = (0..members.len())
                .filter(|&idx| idx != slot && Some(idx) != best)
                .collect();
            let (base, fst, snd) = match self.strategy {
                MutationStrategy::Rand => {
                    let picks: Vec<&usize> = donors.choose_multiple(rng, 3).collect();
                    (&members[*picks[0]], &members[*picks[1]], &members[*picks[2]])
                }
                MutationStrategy::Best => {
                    let picks: Vec<&usize> = donors.choose_multiple(rng, 2).collect();
                    let best = best.expect("best index exists for the Best strategy");
                    (&members[best], &members[*picks[0]], &members[*picks[1]])
                }
            };
            let mutant = differential(base, fst, snd, self.diff_weight);
            candidates.push(binary_cross(&members[slot], &mutant, self.p_cross, rng));
        }
        self.candidates = candidates;
        Ok(())
    }

    fn evaluate(
        &mut self,
        ctx: &EvalContext<M, F>,
        sims: &mut [Vec<S>],
        workers: Option<&ThreadPool>,
    ) -> EvoResult<Duration> {
        let refs: Vec<&mut Controller> = self.candidates.iter_mut().collect();
        let total = evaluate_all(refs, sims, ctx, workers)?;
        Ok(worker_share(total, workers))
    }

    fn select(&mut self, _rng: &mut XorShiftRng) -> EvoResult<()> {
        // greedy one-to-one replacement; ties take the trial
        for (parent, trial) in self
            .pop
            .members_mut()
            .iter_mut()
            .zip(self.candidates.drain(..))
        {
            if trial.fitness >= parent.fitness {
                *parent = trial;
            }
        }
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

/// Builds the mutant `base + weight * (fst - snd)`, element-wise over every
/// weight and bias tensor.
fn differential(base: &Controller, fst: &Controller, snd: &Controller, weight: f32) -> Controller {
    let mut mutant = base.clone();
    mutant.reset_fitness();
    for (layer, matrix) in mutant.weights.iter_mut().enumerate() {
        for (row_idx, row) in matrix.iter_mut().enumerate() {
            for (col, value) in row.iter_mut().enumerate() {
                *value += weight
                    * (fst.weights[layer][row_idx][col] - snd.weights[layer][row_idx][col]);
            }
        }
    }
    for (layer, bias) in mutant.biases.iter_mut().enumerate() {
        for (idx, value) in bias.iter_mut().enumerate() {
            *value += weight * (fst.biases[layer][idx] - snd.biases[layer][idx]);
        }
    }
    mutant
}

/// Binary crossover: per element, the trial takes the mutant's value with
/// probability `p_cross` and the parent's otherwise.
fn binary_cross(
    parent: &Controller,
    mutant: &Controller,
    p_cross: f32,
    rng: &mut XorShiftRng,
) -> Controller {
    let gate = Uniform::new_inclusive(0f32, 1f32);
    let mut trial = parent.clone();
    trial.reset_fitness();
    for (layer, matrix) in trial.weights.iter_mut().enumerate() {
        for (row_idx, row) in matrix.iter_mut().enumerate() {
            for (col, value) in row.iter_mut().enumerate() {
                if gate.sample(rng) < p_cross {
                    *value = mutant.weights[layer][row_idx][col];
                }
            }
        }
    }
    for (layer, bias) in trial.biases.iter_mut().enumerate() {
        for (idx, value) in bias.iter_mut().enumerate() {
            if gate.sample(rng) < p_cross {
                *value = mutant.biases[layer][idx];
            }
        }
    }
    trial
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::eval::Aggregate;
    use crate::testkit::{left_speed, EchoModel, MockSim};
    use rand::SeedableRng;

    fn pair(values: [f32; 2]) -> Controller {
        Controller::new(vec![vec![values.to_vec()]], vec![vec![values[0]]])
    }

    #[test]
    fn test_mutant_blend() {
        // base [1, 1], donors [2, 2] and [0, 0], weight 0.5 -> [2, 2]
        let mutant = differential(&pair([1.0, 1.0]), &pair([2.0, 2.0]), &pair([0.0, 0.0]), 0.5);
        assert_eq!(mutant.weights[0][0], vec![2.0, 2.0]);
        assert_eq!(mutant.biases[0], vec![2.0]);
        assert_eq!(mutant.fitness, 0.0);
    }

    #[test]
    fn test_binary_cross_extremes() {
        let mut rng = XorShiftRng::seed_from_u64(41);
        let parent = pair([1.0, 1.0]);
        let mutant = pair([9.0, 9.0]);

        let all_mutant = binary_cross(&parent, &mutant, 1.0, &mut rng);
        assert_eq!(all_mutant.weights[0][0], vec![9.0, 9.0]);

        let all_parent = binary_cross(&parent, &mutant, 0.0, &mut rng);
        assert_eq!(all_parent.weights[0][0], vec![1.0, 1.0]);
    }

    #[test]
    fn test_greedy_replacement_keeps_per_slot_fitness_monotone() {
        let mut members = Vec::new();
        let mut candidates = Vec::new();
        for (parent_fit, trial_fit) in &[(1.0f32, 2.0f32), (2.0, 1.0), (0.5, 0.5)] {
            let mut parent = pair([0.0, 0.0]);
            parent.fitness = *parent_fit;
            members.push(parent);
            let mut trial = pair([1.0, 1.0]);
            trial.fitness = *trial_fit;
            candidates.push(trial);
        }
        let before: Vec<f32> = members.iter().map(|c| c.fitness).collect();

        let mut state = DeState {
            pop: Population::from_members(members, 3),
            candidates,
            pop_size: 3,
            init_limits: (-1.0, 1.0),
            p_cross: 0.5,
            diff_weight: 0.5,
            strategy: MutationStrategy::Rand,
        };
        let mut rng = XorShiftRng::seed_from_u64(1);
        Strategy::<EchoModel, MockSim, fn(&[f32], f32, f32) -> f32>::select(&mut state, &mut rng)
            .unwrap();

        for (slot, old) in before.iter().enumerate() {
            assert!(state.pop.members()[slot].fitness >= *old);
        }
        // the tie at slot 2 takes the trial
        assert_eq!(state.pop.members()[2].weights[0][0], vec![1.0, 1.0]);
        // slot 1 keeps its fitter parent
        assert_eq!(state.pop.members()[1].weights[0][0], vec![0.0, 0.0]);
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!(MutationStrategy::parse("rand").unwrap(), MutationStrategy::Rand);
        assert_eq!(MutationStrategy::parse("best").unwrap(), MutationStrategy::Best);
        assert!(MutationStrategy::parse("ctb").is_err());
    }

    #[test]
    fn test_run_improves_or_holds_every_slot() {
        let optimizer = DifferentialEvolution {
            common: EvoParams {
                pop_size: 6,
                max_epochs: 4,
                seed: 77,
                ..EvoParams::default()
            },
            eval: EvalParams {
                num_cycles: 2,
                steps_per_cycle: 1,
                max_speed: 1.0,
                aggregate: Aggregate::Mean,
                validation_cycles: 0,
            },
            p_cross: 0.9,
            diff_weight: 0.8,
            strategy: MutationStrategy::Rand,
        };
        let mut initial = MockSim::new(vec![0.3; 8]);
        initial.bind_robot(0);
        let mut pool = SimPool::new(initial, 6, 1, 3);
        let mut reporter = Reporter::new();
        let outcome = optimizer
            .run(&EchoModel, &mut pool, &left_speed, &mut reporter)
            .unwrap();
        assert_eq!(outcome.epochs, 4);
        // monotone best under greedy replacement
        if let Some(crate::report::Series::Scalar(series)) = reporter.get("max") {
            for window in series.windows(2) {
                assert!(window[1] >= window[0] - 1e-6);
            }
        } else {
            panic!("max series missing");
        }
    }

    #[test]
    fn test_small_population_is_rejected() {
        let optimizer = DifferentialEvolution {
            common: EvoParams {
                pop_size: 3,
                ..EvoParams::default()
            },
            eval: EvalParams::default(),
            p_cross: 0.5,
            diff_weight: 1.0,
            strategy: MutationStrategy::Best,
        };
        let mut initial = MockSim::new(vec![0.3; 8]);
        initial.bind_robot(0);
        let mut pool = SimPool::new(initial, 3, 1, 3);
        let mut reporter = Reporter::new();
        assert!(optimizer
            .run(&EchoModel, &mut pool, &left_speed, &mut reporter)
            .is_err());
    }
}
