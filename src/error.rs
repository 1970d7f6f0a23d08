use thiserror::Error;

/// Errors raised by the detector, the prediction curve and the threshold model.
#[derive(Error, Debug)]
pub enum AdError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("model is not fitted")]
    NotFitted,

    #[error("unknown threshold model target: {0}")]
    UnknownTarget(String),

    #[error("corrupt model state: {0}")]
    Serialization(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AdError>;

impl From<serde_json::Error> for AdError {
    fn from(err: serde_json::Error) -> Self {
        AdError::Serialization(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<AdError> for pyo3::PyErr {
    fn from(err: AdError) -> Self {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
        match err {
            AdError::NotFitted => PyRuntimeError::new_err(err.to_string()),
            AdError::Serialization(_) | AdError::Io(_) => {
                PyIOError::new_err(err.to_string())
            }
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}
