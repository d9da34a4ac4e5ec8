//! Controller genomes
//! ---
//!
//! A [`Controller`] is one candidate solution: ordered weight and bias
//! tensors shaped by the model topology, plus an accumulated fitness scalar
//! (higher is better).  Tensor shapes never change after creation; variation
//! operators only rewrite values.  Every generation owns its controllers
//! exclusively; anything carried across generations is a deep copy.

use std::time::{Duration, Instant};

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_xorshift::XorShiftRng;

use crate::model::{Matrix, Model};
use crate::population::eval::EvalContext;
use crate::sim::Simulation;

/// Half-width of the uniform perturbation applied by point mutation.
const MUTATION_RANGE: f32 = 0.05;

#[derive(Clone, Debug)]
/// One candidate controller: a genome and its accumulated fitness.
pub struct Controller {
    /// Weight tensors, one per network layer.
    pub weights: Vec<Matrix>,
    /// Bias tensors, one per network layer.
    pub biases: Vec<Vec<f32>>,
    /// Accumulated fitness; reset explicitly before each evaluation episode.
    pub fitness: f32,
}

impl Controller {
    /// Wraps existing tensors with zero fitness.
    pub fn new(weights: Vec<Matrix>, biases: Vec<Vec<f32>>) -> Controller {
        Controller {
            weights,
            biases,
            fitness: 0.0,
        }
    }

    /// Draws a fresh genome from the model's random tensor generators.
    pub fn random<M: Model>(model: &M, limits: (f32, f32), rng: &mut XorShiftRng) -> Controller {
        Controller::new(model.random_weights(limits, rng), model.random_biases(limits, rng))
    }

    /// Clears the fitness accumulator.
    pub fn reset_fitness(&mut self) {
        self.fitness = 0.0;
    }

    /// Drives the simulated robot for `ctx.num_cycles` control cycles and
    /// adds the aggregated per-cycle score to the fitness accumulator.
    ///
    /// Each cycle reads the sensors, predicts motor commands, scales them by
    /// `ctx.max_speed`, advances the world `ctx.steps_per_cycle` ticks and
    /// scores the post-step sensor state.  Returns the wall time spent inside
    /// the simulation step calls, for profiling only.  If no robot is bound
    /// the episode is silently abandoned (the oracle already warned).
    pub fn evaluate<M, S, F>(&mut self, sim: &mut S, ctx: &EvalContext<M, F>) -> Duration
    where
        M: Model,
        S: Simulation,
        F: Fn(&[f32], f32, f32) -> f32,
    {
        let mut scores = Vec::with_capacity(ctx.num_cycles);
        let mut elapsed = Duration::new(0, 0);
        for _ in 0..ctx.num_cycles {
            let (left, right) = match sim.sensors() {
                Some(sensors) => ctx.model.predict(sensors, &self.weights, &self.biases),
                None => return elapsed,
            };
            sim.set_speed(f64::from(left) * ctx.max_speed, f64::from(right) * ctx.max_speed);

            let start = Instant::now();
            sim.step(ctx.steps_per_cycle);
            elapsed += start.elapsed();

            match sim.sensors() {
                Some(sensors) => scores.push((ctx.eval_func)(sensors, left, right)),
                None => return elapsed,
            }
        }
        self.fitness += ctx.aggregate.apply(&scores);
        elapsed
    }

    /// Point mutation: independently perturbs tensor elements by a uniform
    /// draw in `[-0.05, 0.05]`, gated per element on `prob`.
    ///
    /// TODO: confirm whether the inverted gate for weights is intentional --
    /// weight elements perturb when the draw exceeds `prob`, bias elements
    /// when it falls below.  Unifying the two changes tuned behavior, so the
    /// asymmetry is kept as observed for now.
    pub fn mutate(&mut self, prob: f32, rng: &mut XorShiftRng) {
        let gate = Uniform::new_inclusive(0f32, 1f32);
        let nudge = Uniform::new_inclusive(-MUTATION_RANGE, MUTATION_RANGE);
        for matrix in self.weights.iter_mut() {
            for row in matrix.iter_mut() {
                for w in row.iter_mut() {
                    if gate.sample(rng) > prob {
                        *w += nudge.sample(rng);
                    }
                }
            }
        }
        for bias in self.biases.iter_mut() {
            for b in bias.iter_mut() {
                if gate.sample(rng) < prob {
                    *b += nudge.sample(rng);
                }
            }
        }
    }

    /// Single-point crossover: for every paired tensor, flattens both
    /// parents, draws one cut point (independently per tensor pair) and
    /// swaps the tails, yielding two offspring with the parents' shapes and
    /// zero fitness.
    pub fn cross(a: &Controller, b: &Controller, rng: &mut XorShiftRng) -> (Controller, Controller) {
        let layers = a.weights.len();
        let mut w1 = Vec::with_capacity(layers);
        let mut w2 = Vec::with_capacity(layers);
        let mut b1 = Vec::with_capacity(layers);
        let mut b2 = Vec::with_capacity(layers);

        for layer in 0..layers {
            let fa = flatten(&a.weights[layer]);
            let fb = flatten(&b.weights[layer]);
            let cut = rng.gen_range(0, fa.len());
            let (c1, c2) = swap_tails(&fa, &fb, cut);
            w1.push(unflatten(c1, &a.weights[layer]));
            w2.push(unflatten(c2, &a.weights[layer]));

            let cut = rng.gen_range(0, a.biases[layer].len());
            let (c1, c2) = swap_tails(&a.biases[layer], &b.biases[layer], cut);
            b1.push(c1);
            b2.push(c2);
        }

        (Controller::new(w1, b1), Controller::new(w2, b2))
    }
}

fn flatten(matrix: &Matrix) -> Vec<f32> {
    let mut flat = Vec::with_capacity(matrix.iter().map(|row| row.len()).sum());
    for row in matrix.iter() {
        flat.extend_from_slice(row);
    }
    flat
}

fn unflatten(flat: Vec<f32>, like: &Matrix) -> Matrix {
    let mut out = Vec::with_capacity(like.len());
    let mut start = 0;
    for row in like.iter() {
        let end = start + row.len();
        out.push(flat[start..end].to_vec());
        start = end;
    }
    out
}

fn swap_tails(a: &[f32], b: &[f32], cut: usize) -> (Vec<f32>, Vec<f32>) {
    let mut c1 = a[..cut].to_vec();
    c1.extend_from_slice(&b[cut..]);
    let mut c2 = b[..cut].to_vec();
    c2.extend_from_slice(&a[cut..]);
    (c1, c2)
}
