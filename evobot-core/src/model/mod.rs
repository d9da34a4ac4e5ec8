use std::io;
use std::path::Path;

use rand_xorshift::XorShiftRng;

/// Row-major weight tensor for one network layer: `[outputs][inputs]`.
pub type Matrix = Vec<Vec<f32>>;

/// Capability contract for the neural model a controller genome parameterizes.
///
/// The engine never stores network topology itself; it hands the genome
/// tensors back to the model for every prediction, and asks the model for
/// fresh random tensors when seeding a population.  Tensor shapes are fixed
/// by the model topology and must never change after creation.
pub trait Model: Send + Sync {
    /// Computes `(left, right)` motor commands from a sensor reading.
    fn predict(&self, sensors: &[f32], weights: &[Matrix], biases: &[Vec<f32>]) -> (f32, f32);

    /// Draws one weight tensor per layer, uniform within `limits`.
    fn random_weights(&self, limits: (f32, f32), rng: &mut XorShiftRng) -> Vec<Matrix>;

    /// Draws one bias tensor per layer, uniform within `limits`.
    fn random_biases(&self, limits: (f32, f32), rng: &mut XorShiftRng) -> Vec<Vec<f32>>;

    /// Persists a genome in the textual layer-by-layer layout.
    fn save_genome(&self, path: &Path, weights: &[Matrix], biases: &[Vec<f32>])
        -> io::Result<()>;
}
