//! Evobot-Core
//! ===
//!
//! This library contains the evolutionary engine used to train neural robot
//! controllers against a simulation oracle.  A controller is a genome of
//! weight and bias tensors; its fitness is accumulated by driving a robot
//! through a simulation and scoring each control cycle.  Three metaheuristics
//! share one population model, one parallel fitness evaluator and one
//! epoch-driven run loop with early stopping:
//!
//! Genetic Algorithm
//! ---
//! Pairwise single-point crossover over flattened tensors plus per-element
//! mutation, followed by tournament or roulette-wheel selection over the
//! enlarged working pool.
//!
//! Differential Evolution
//! ---
//! Per-slot trial candidates built from a base-plus-weighted-difference
//! mutant and binary crossover, kept under greedy one-to-one replacement so
//! per-slot fitness never decreases across a generation.
//!
//! Particle Swarm Optimization
//! ---
//! Constriction-factor velocity updates pulling every particle toward its
//! personal best and the swarm-wide global best.
//!
//! The simulation oracle and the neural model are consumed through the
//! capability traits in [`sim`] and [`model`]; the engine never owns either.

#![warn(missing_docs, unused)]

#[macro_use]
extern crate serde_derive;

/// Defines the genome carrier and its evaluation and variation operators.
pub mod controller;
/// Error conditions surfaced by the engine.
pub mod error;
/// Defines the shared run loop and the three optimizer variants.
pub mod evolution;
/// Defines the capability contract for neural controller models.
pub mod model;
/// Populations of controllers and the parallel fitness evaluator.
pub mod population;
/// Buffered, named metric series emitted once per epoch.
pub mod report;
/// Selection operators producing the next generation.
pub mod selection;
/// Defines the simulation oracle contract and per-controller instance pools.
pub mod sim;

#[cfg(test)]
pub(crate) mod testkit;
