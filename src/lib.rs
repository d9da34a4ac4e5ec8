//! Evobot
//!
//! Evobot is a library and an executable to evolve neural robot controllers
//! with genetic algorithms, differential evolution and particle swarm
//! optimization.
#![warn(missing_docs, unused)]

/// Tools for binaries
pub mod bin_utils;
/// Fitness functions for driving behavior
pub mod fitness;
