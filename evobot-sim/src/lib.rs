//! Simulation support for the evolutionary engine
//!
//! Production runs drive a native physics engine behind the
//! `evobot_core::sim::Simulation` contract.  This crate ships a small
//! deterministic differential-drive arena world implementing the same
//! contract for examples and integration tests.
#![warn(missing_docs, unused)]

/// Defines the walled-arena world with a single differential-drive robot
pub mod arena;

pub use crate::arena::ArenaSim;
