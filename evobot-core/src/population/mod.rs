//! Populations
//! ---
//!
//! A [`Population`] is an ordered pool of controllers with a fixed target
//! size.  During variation the working pool may transiently exceed the
//! target (GA crossover can double it); selection always restores it.

pub mod eval;

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_xorshift::XorShiftRng;
use rayon::ThreadPool;

use crate::controller::Controller;
use crate::error::EvoResult;
use crate::model::Model;
use crate::selection::Selection;
use crate::sim::Simulation;

use self::eval::{evaluate_all, worker_share, EvalContext};

/// Ordered pool of controllers with a fixed target size.
pub struct Population {
    members: Vec<Controller>,
    target_size: usize,
}

impl Population {
    /// An empty pool that selection will later fill to `target_size`.
    pub fn with_target(target_size: usize) -> Population {
        Population {
            members: Vec::new(),
            target_size,
        }
    }

    /// Seeds `size` controllers with random genomes drawn within `limits`.
    pub fn initialize<M: Model>(
        model: &M,
        size: usize,
        limits: (f32, f32),
        rng: &mut XorShiftRng,
    ) -> Population {
        let members = (0..size)
            .map(|_| Controller::random(model, limits, rng))
            .collect();
        Population {
            members,
            target_size: size,
        }
    }

    /// Wraps an existing member list.
    pub fn from_members(members: Vec<Controller>, target_size: usize) -> Population {
        Population {
            members,
            target_size,
        }
    }

    /// Current working-pool size; may exceed the target during variation.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the working pool holds no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The size selection restores after each generation.
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Read access to the members.
    pub fn members(&self) -> &[Controller] {
        &self.members
    }

    /// Mutable access to the members.
    pub fn members_mut(&mut self) -> &mut [Controller] {
        &mut self.members
    }

    /// The member with maximum fitness; ties break to the first occurrence.
    pub fn best(&self) -> &Controller {
        let mut iter = self.members.iter();
        let mut best = iter.next().expect("population is never empty");
        for member in iter {
            if member.fitness > best.fitness {
                best = member;
            }
        }
        best
    }

    /// The member with minimum fitness; ties break to the first occurrence.
    pub fn worst(&self) -> &Controller {
        let mut iter = self.members.iter();
        let mut worst = iter.next().expect("population is never empty");
        for member in iter {
            if member.fitness < worst.fitness {
                worst = member;
            }
        }
        worst
    }

    /// Arithmetic mean of all member fitness values.
    pub fn average_fitness(&self) -> f32 {
        if self.members.is_empty() {
            return 0.0;
        }
        self.members.iter().map(|c| c.fitness).sum::<f32>() / self.members.len() as f32
    }

    /// Shuffles the pool, pairs adjacent members and, with probability
    /// `p_cross` per pair, appends both crossover offspring.  Parents stay
    /// in the pool, so the working size can grow up to twofold.
    pub fn crossover(&mut self, p_cross: f32, rng: &mut XorShiftRng) {
        self.members.shuffle(rng);
        let pairs = self.members.len() / 2;
        for pair in 0..pairs {
            if rng.gen::<f32>() < p_cross {
                let (one, two) =
                    Controller::cross(&self.members[2 * pair], &self.members[2 * pair + 1], rng);
                self.members.push(one);
                self.members.push(two);
            }
        }
    }

    /// Applies point mutation to every member of the working pool.
    pub fn mutate(&mut self, p_mut: f32, rng: &mut XorShiftRng) {
        for member in self.members.iter_mut() {
            member.mutate(p_mut, rng);
        }
    }

    /// Scores the whole working pool (see [`eval::evaluate_all`]) and
    /// returns the total simulated time divided by the worker count, an
    /// approximate parallel-speedup estimate.
    pub fn evaluate<M, S, F>(
        &mut self,
        sims: &mut [Vec<S>],
        ctx: &EvalContext<M, F>,
        workers: Option<&ThreadPool>,
    ) -> EvoResult<Duration>
    where
        M: Model,
        S: Simulation,
        F: Fn(&[f32], f32, f32) -> f32 + Sync,
    {
        let refs: Vec<&mut Controller> = self.members.iter_mut().collect();
        let total = evaluate_all(refs, sims, ctx, workers)?;
        Ok(worker_share(total, workers))
    }

    /// Produces the next generation at the target size using the configured
    /// selection operator.
    pub fn select(&self, selection: &Selection, rng: &mut XorShiftRng) -> EvoResult<Population> {
        let members = selection.apply(&self.members, self.target_size, rng)?;
        Ok(Population {
            members,
            target_size: self.target_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::echo_controller;
    use rand::SeedableRng;

    fn pool(fitness: &[f32]) -> Population {
        let members = fitness
            .iter()
            .map(|f| {
                let mut c = echo_controller(*f);
                c.fitness = *f;
                c
            })
            .collect();
        Population::from_members(members, fitness.len())
    }

    #[test]
    fn test_best_worst_average() {
        let pop = pool(&[0.4, 0.9, 0.1, 0.9]);
        assert_eq!(pop.best().fitness, 0.9);
        // first occurrence wins the tie
        assert_eq!(pop.best().weights[0][0][0], 0.9);
        assert_eq!(pop.worst().fitness, 0.1);
        assert!((pop.average_fitness() - 0.575).abs() < 1e-6);
    }

    #[test]
    fn test_tie_breaks_to_first_occurrence() {
        let mut pop = pool(&[0.5, 0.5, 0.5]);
        pop.members_mut()[0].weights[0][0][0] = -1.0;
        pop.members_mut()[2].weights[0][0][0] = -2.0;
        assert_eq!(pop.best().weights[0][0][0], -1.0);
        assert_eq!(pop.worst().weights[0][0][0], -1.0);
    }

    #[test]
    fn test_crossover_growth_is_bounded_and_even() {
        let mut rng = XorShiftRng::seed_from_u64(3);
        let mut pop = pool(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        pop.crossover(1.0, &mut rng);
        assert_eq!(pop.len(), 12);
        assert_eq!(pop.target_size(), 6);

        let mut pop = pool(&[0.1, 0.2, 0.3, 0.4]);
        pop.crossover(0.0, &mut rng);
        assert_eq!(pop.len(), 4);
    }

    #[test]
    fn test_odd_pool_leaves_unpaired_member_alone() {
        let mut rng = XorShiftRng::seed_from_u64(3);
        let mut pop = pool(&[0.1, 0.2, 0.3]);
        pop.crossover(1.0, &mut rng);
        // one pair, two offspring
        assert_eq!(pop.len(), 5);
    }

    #[test]
    fn test_initialize_produces_target_size() {
        use crate::testkit::EchoModel;
        let mut rng = XorShiftRng::seed_from_u64(11);
        let pop = Population::initialize(&EchoModel, 7, (-1.0, 1.0), &mut rng);
        assert_eq!(pop.len(), 7);
        assert_eq!(pop.target_size(), 7);
        assert!(pop.members().iter().all(|c| c.fitness == 0.0));
    }
}
