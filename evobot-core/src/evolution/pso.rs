//! Particle swarm optimization
//! ---
//!
//! Every particle carries a velocity pair and a personal-best snapshot; the
//! swarm tracks one global-best snapshot.  Both snapshots are deep copies,
//! never aliases into the live swarm.  The swarm size is constant by
//! construction; there is no discrete selection step.

use std::time::Duration;

use float_ord::FloatOrd;
use rand::distributions::{Distribution, Uniform};
use rand_xorshift::XorShiftRng;
use rayon::ThreadPool;

use crate::controller::Controller;
use crate::error::{EvoError, EvoResult};
use crate::model::{Matrix, Model};
use crate::population::eval::{evaluate_all, worker_share, EvalContext};
use crate::report::Reporter;
use crate::sim::{SimPool, Simulation};

use super::{drive, EvalParams, EvoParams, Outcome, PoolStats, PositionPolicy, Strategy};

/// Configuration for one particle-swarm run.
#[derive(Debug, Clone)]
pub struct ParticleSwarm {
    /// Shared run parameters.
    pub common: EvoParams,
    /// Shared evaluation parameters.
    pub eval: EvalParams,
    /// Weight of the particle's own velocity.
    pub inertia: f32,
    /// Pull toward the particle's personal best.
    pub cognitive: f32,
    /// Pull toward the swarm's global best.
    pub social: f32,
}

impl ParticleSwarm {
    /// Constriction factor `2 / |2 - phi - sqrt(phi^2 - 4 phi)|` for
    /// `phi = cognitive + social`.  Requires `phi > 4`; anything else would
    /// put the square root outside the reals, so it is rejected here rather
    /// than letting NaN propagate through the velocity updates.
    pub fn constriction(&self) -> EvoResult<f32> {
        let phi = self.cognitive + self.social;
        if !phi.is_finite() || phi <= 4.0 {
            return Err(EvoError::InvalidConfig(format!(
                "cognitive + social must exceed 4 for a real constriction factor, got {}",
                phi
            )));
        }
        Ok(2.0 / (2.0 - phi - (phi * phi - 4.0 * phi).sqrt()).abs())
    }

    /// Non-static position policies re-score every personal best alongside
    /// the swarm, doubling the slots needed.
    pub fn required_slots(&self) -> usize {
        match self.common.position {
            PositionPolicy::Static => self.common.pop_size,
            _ => 2 * self.common.pop_size,
        }
    }

    fn validate<S: Simulation>(&self, pool: &SimPool<S>) -> EvoResult<()> {
        if self.common.pop_size == 0 {
            return Err(EvoError::InvalidConfig(
                "the swarm needs at least one particle".to_string(),
            ));
        }
        self.constriction()?;
        if pool.num_slots() < self.required_slots() {
            return Err(EvoError::InvalidConfig(format!(
                "simulation pool has {} slots but the swarm needs {}",
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
        let mut state = PsoState {
            swarm: Vec::new(),
            global_best: None,
            pop_size: self.common.pop_size,
            init_limits: self.common.init_limits,
            inertia: self.inertia,
            cognitive: self.cognitive,
            social: self.social,
            constriction: self.constriction()?,
            rescore_bests: self.common.position != PositionPolicy::Static,
        };
        drive(
            &mut state,
            "pso",
            &self.common,
            &self.eval,
            model,
            pool,
            fitness,
            reporter,
        )
    }
}

/// One swarm member: a controller plus its velocity tensors and
/// personal-best snapshot.
struct Particle {
    controller: Controller,
    velocity_w: Vec<Matrix>,
    velocity_b: Vec<Vec<f32>>,
    local_best: Controller,
}

struct PsoState {
    swarm: Vec<Particle>,
    global_best: Option<Controller>,
    pop_size: usize,
    init_limits: (f32, f32),
    inertia: f32,
    cognitive: f32,
    social: f32,
    constriction: f32,
    rescore_bests: bool,
}

impl PsoState {
    /// Recomputes the global best as a deep copy of the fittest personal
    /// best; ties break to the first particle.
    fn update_global_best(&mut self) {
        let mut best: Option<&Controller> = None;
        for particle in self.swarm.iter() {
            let better = match best {
                Some(current) => particle.local_best.fitness > current.fitness,
                None => true,
            };
            if better {
                best = Some(&particle.local_best);
            }
        }
        self.global_best = best.cloned();
    }
}

impl<M, S, F> Strategy<M, S, F> for PsoState
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
        self.swarm = (0..self.pop_size)
            .map(|_| {
                let controller = Controller::random(ctx.model, self.init_limits, rng);
                Particle {
                    local_best: controller.clone(),
                    velocity_w: ctx.model.random_weights(self.init_limits, rng),
                    velocity_b: ctx.model.random_biases(self.init_limits, rng),
                    controller,
                }
            })
            .collect();

        // seed the personal bests from a real evaluation
        let refs: Vec<&mut Controller> = self
            .swarm
            .iter_mut()
            .map(|p| &mut p.controller)
            .collect();
        let total = evaluate_all(refs, sims, ctx, workers)?;
        for particle in self.swarm.iter_mut() {
            particle.local_best = particle.controller.clone();
        }
        self.update_global_best();
        Ok(worker_share(total, workers))
    }

    /// Moves every particle: constriction-damped velocity update toward the
    /// personal and global bests, fresh uniform `[0, 1]` factors per tensor
    /// element, then `position += velocity`.
    fn vary(&mut self, rng: &mut XorShiftRng) -> EvoResult<()> {
        let global = self
            .global_best
            .clone()
            .expect("the swarm is initialized before moving");
        let unit = Uniform::new_inclusive(0f32, 1f32);

        for particle in self.swarm.iter_mut() {
            for layer in 0..particle.velocity_w.len() {
                for row in 0..particle.velocity_w[layer].len() {
                    for col in 0..particle.velocity_w[layer][row].len() {
                        let position = particle.controller.weights[layer][row][col];
                        let toward_local =
                            particle.local_best.weights[layer][row][col] - position;
                        let toward_global = global.weights[layer][row][col] - position;
                        let velocity = self.constriction
                            * (self.inertia * particle.velocity_w[layer][row][col]
                                + unit.sample(rng) * self.cognitive * toward_local
                                + unit.sample(rng) * self.social * toward_global);
                        particle.velocity_w[layer][row][col] = velocity;
                        particle.controller.weights[layer][row][col] += velocity;
                    }
                }
            }
            for layer in 0..particle.velocity_b.len() {
                for idx in 0..particle.velocity_b[layer].len() {
                    let position = particle.controller.biases[layer][idx];
                    let toward_local = particle.local_best.biases[layer][idx] - position;
                    let toward_global = global.biases[layer][idx] - position;
                    let velocity = self.constriction
                        * (self.inertia * particle.velocity_b[layer][idx]
                            + unit.sample(rng) * self.cognitive * toward_local
                            + unit.sample(rng) * self.social * toward_global);
                    particle.velocity_b[layer][idx] = velocity;
                    particle.controller.biases[layer][idx] += velocity;
                }
            }
        }
        Ok(())
    }

    fn evaluate(
        &mut self,
        ctx: &EvalContext<M, F>,
        sims: &mut [Vec<S>],
        workers: Option<&ThreadPool>,
    ) -> EvoResult<Duration> {
        let mut refs = Vec::with_capacity(2 * self.swarm.len());
        let mut best_refs = Vec::with_capacity(self.swarm.len());
        for particle in self.swarm.iter_mut() {
            let Particle {
                controller,
                local_best,
                ..
            } = particle;
            refs.push(controller);
            if self.rescore_bests {
                best_refs.push(local_best);
            }
        }
        // under non-static positions the stored bests are re-scored too, so
        // personal-best comparisons stay position-comparable
        refs.extend(best_refs);
        let total = evaluate_all(refs, sims, ctx, workers)?;
        Ok(worker_share(total, workers))
    }

    fn select(&mut self, _rng: &mut XorShiftRng) -> EvoResult<()> {
        for particle in self.swarm.iter_mut() {
            if particle.controller.fitness > particle.local_best.fitness {
                particle.local_best = particle.controller.clone();
            }
        }
        self.update_global_best();
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        let global = self
            .global_best
            .as_ref()
            .expect("the swarm is initialized before reporting");
        let total: f32 = self.swarm.iter().map(|p| p.controller.fitness).sum();
        let min = self
            .swarm
            .iter()
            .map(|p| FloatOrd(p.controller.fitness))
            .min()
            .expect("the swarm is never empty")
            .0;
        PoolStats {
            max: global.fitness,
            avg: total / self.swarm.len() as f32,
            min,
        }
    }

    fn best(&self) -> &Controller {
        self.global_best
            .as_ref()
            .expect("the swarm is initialized before reporting")
    }
}
