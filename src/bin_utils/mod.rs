//! Defines methods shared by the training binaries

/// Methods for reading arguments
pub mod args;
