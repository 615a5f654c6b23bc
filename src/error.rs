//! Error types for the fusion layer.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Input did not match the expected landmark/tensor contract
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Perspective-n-point solve did not converge
    #[error("Pose solver found no solution: {0}")]
    NoPoseSolution(String),

    /// Configuration file could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model loading or inference error
    #[error("Model error: {0}")]
    Model(String),

    /// Socket or file I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire encoding or config decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
