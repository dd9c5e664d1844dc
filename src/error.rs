//! Error types for vdw-crunch
//!
//! Per-key failures (malformed trials, insufficient data, non-convergent
//! fits) are recoverable: the pipeline reports them and moves on to the
//! next key. Messages say what went wrong and what to look at.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// vdw-crunch error types
#[derive(Error, Debug)]
pub enum Error {
    /// Caller passed data that violates a precondition
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Fewer data points than the model has parameters
    #[error("Insufficient data: {points} points, at least {required} required for this model")]
    InsufficientData {
        /// Points supplied
        points: usize,
        /// Points the model needs
        required: usize,
    },

    /// Least-squares solver exhausted its evaluation budget
    #[error("Fit did not converge after {evaluations} model evaluations\nTry a different initial guess or raise max_evaluations")]
    NotConverged {
        /// Model evaluations spent
        evaluations: usize,
    },

    /// The search ended where a parameter no longer affects the model
    #[error("Fit degenerated: parameter {parameter} has no effect on the model after {evaluations} evaluations\nThe curve is flat over the data; try an initial guess closer to it")]
    DegenerateFit {
        /// Index of the parameter the model ignores
        parameter: usize,
        /// Model evaluations spent
        evaluations: usize,
    },

    /// Model produced NaN or infinity at the initial guess
    #[error("Model is not finite at the initial guess: {0}")]
    NonFiniteModel(String),

    /// Key filter expression could not be parsed
    #[error("Filter parse error: {0}")]
    ParseError(String),

    /// Invalid pipeline configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage error (trial tables, record store layout)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A stored fit record exists but cannot be decoded
    #[error("Corrupt fit record at {location}: {reason}\nDelete it or rerun with --redo")]
    CorruptRecord {
        /// Where the record lives
        location: String,
        /// Decoder message
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
