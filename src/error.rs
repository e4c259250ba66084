use thiserror::Error;

/// Everything that can go wrong while compiling or simulating a model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Malformed model or expression, rejected before any simulation runs.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A symbol could not be resolved in either the local or global table.
    #[error("no value found for symbol `{0}`")]
    DataNotFound(String),
    /// The integrator could not meet its tolerances or budget.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
    /// A priority queue was addressed with an index it never handed out.
    #[error("no element with external index {0}")]
    IndexNotFound(usize),
    #[error("simulation cancelled")]
    Cancelled,
    /// Firing a reaction would have made a population negative.
    #[error("reaction `{reaction}` would make the population of species {species} negative")]
    PopulationUnderflow { reaction: String, species: usize },
    #[error("could not build thread pool: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, Error>;
