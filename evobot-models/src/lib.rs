//! Library defining the neural controller model
#![warn(missing_docs, unused)]

#[macro_use]
extern crate serde_derive;

/// Defines the fully connected network and its genome persistence
pub mod nn;

pub use crate::nn::{load_genome, load_genome_file, Activation, ModelError, NeuralNet};
