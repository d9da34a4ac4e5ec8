use std::error::Error;
use std::fmt;
use std::io;

/// Alias for results produced by the engine.
pub type EvoResult<T> = Result<T, EvoError>;

#[derive(Debug)]
/// Error conditions surfaced by the evolutionary engine.
pub enum EvoError {
    /// Configuration rejected before the run started.
    InvalidConfig(String),
    /// Fitness-proportional selection over non-positive fitness mass.
    DegenerateFitness(f32),
    /// The evaluation worker pool could not be built.
    ThreadPool(String),
    /// Persisting a genome or a report failed.
    Io(io::Error),
}

impl fmt::Display for EvoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EvoError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            EvoError::DegenerateFitness(total) => write!(
                f,
                "roulette-wheel selection needs positive fitness mass, saw {}",
                total
            ),
            EvoError::ThreadPool(msg) => {
                write!(f, "could not build the evaluation worker pool: {}", msg)
            }
            EvoError::Io(err) => write!(f, "i/o failure: {}", err),
        }
    }
}

impl Error for EvoError {}

impl From<io::Error> for EvoError {
    fn from(err: io::Error) -> EvoError {
        EvoError::Io(err)
    }
}
