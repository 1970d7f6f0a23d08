//! Streaming nearest-neighbour anomaly detection with score calibration.
//!
//! [`NearestNeighborAdImpl`] keeps a sliding window of reference vectors and
//! flags points that lie too far from all of them. [`PredictionCurve`] and
//! [`ThresholdModel`] turn any score stream into ROC / precision-recall
//! measures and a calibrated binary decision.
//!
//! The library never prints; diagnostics are emitted as `tracing` events.

#[cfg(feature = "python")]
use pyo3::prelude::*;

pub mod error;
pub mod models;
pub mod utils;

pub use error::{AdError, Result};
pub use models::base_model::BaseModel;
pub use models::nearest_neighbor::{NearestNeighborAdImpl, NearestNeighborConfig, NearestNeighborModel};
pub use models::threshold::{ThresholdModel, ThresholdTarget};
pub use utils::evaluation::{PrecisionRecallVisitor, PredictionCurve, DEFAULT_SAMPLE_COUNT};
pub use utils::metrics::ClassificationScore;

/// A Python module implemented in Rust.
#[cfg(feature = "python")]
#[pymodule]
fn nnad_rust(_py: Python, m: &PyModule) -> PyResult<()> {
    // NearestNeighborAD:
    m.add_class::<models::nearest_neighbor::NearestNeighborAD>()?;

    // ThresholdModel:
    m.add_class::<models::threshold::PyThresholdModel>()?;

    // PredictionCurve:
    m.add_class::<utils::evaluation::PyPredictionCurve>()?;
    Ok(())
}
