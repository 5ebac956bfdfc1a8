//! Error types for Grafo
//!
//! The evaluation core treats contract violations (shape mismatches, NaN
//! corruption, invalid operator configuration) as programming errors and
//! fails fast with a panic. This error type covers the recoverable boundary
//! only: parameter persistence and deserialization.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Parameter count mismatch: graph has {expected}, state has {got}")]
    ParameterCount { expected: usize, got: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;
