use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AdError, Result};
use crate::utils::evaluation::PredictionCurve;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Operating point a [`ThresholdModel`] calibrates for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThresholdTarget {
    /// Maximise F1.
    F1,
    /// Recall closest to the given level.
    Recall(f64),
    /// Precision closest to the given level.
    Precision(f64),
}

impl ThresholdTarget {
    /// Parse `"f1"`, `"recall"` or `"precision"`. The latter two need a level in [0, 1].
    pub fn parse(target: &str, level: Option<f64>) -> Result<Self> {
        let with_level = |make: fn(f64) -> ThresholdTarget| match level {
            Some(level) if (0.0..=1.0).contains(&level) => Ok(make(level)),
            Some(level) => Err(AdError::InvalidParameter(format!(
                "{} level {} not in range [0, 1]",
                target, level
            ))),
            None => Err(AdError::InvalidParameter(format!(
                "{} target requires a level",
                target
            ))),
        };
        match target {
            "f1" => Ok(ThresholdTarget::F1),
            "recall" => with_level(ThresholdTarget::Recall),
            "precision" => with_level(ThresholdTarget::Precision),
            other => Err(AdError::UnknownTarget(other.to_string())),
        }
    }
}

/// Turns raw scores into a binary decision by calibrating a single cut value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdModel {
    target: ThresholdTarget,
    cut_value: Option<f64>,
}

impl ThresholdModel {
    pub fn new(target: ThresholdTarget) -> Self {
        ThresholdModel {
            target,
            cut_value: None,
        }
    }

    pub fn target(&self) -> ThresholdTarget {
        self.target
    }

    pub fn cut_value(&self) -> Option<f64> {
        self.cut_value
    }

    /// Calibrate the cut value from scores and their ground-truth labels (1 or -1).
    pub fn fit(&mut self, scores: &[f64], labels: &[f64]) -> Result<()> {
        if scores.is_empty() {
            return Err(AdError::InvalidParameter(
                "cannot calibrate on an empty score set".to_string(),
            ));
        }
        let curve = PredictionCurve::from_pairs(labels, scores)?;
        let cut_value = match self.target {
            ThresholdTarget::F1 => curve.best_f1(),
            ThresholdTarget::Recall(level) => curve.desired_recall(level),
            ThresholdTarget::Precision(level) => curve.desired_precision(level),
        };
        debug!(calibration = ?self.target, cut_value, observations = curve.len(), "threshold calibrated");
        self.cut_value = Some(cut_value);
        Ok(())
    }

    pub fn decision_function(&self, x: f64) -> Result<f64> {
        let cut_value = self.cut_value.ok_or(AdError::NotFitted)?;
        Ok(x - cut_value)
    }

    pub fn decision_function_batch(&self, xs: &[f64]) -> Result<Vec<f64>> {
        xs.iter().map(|&x| self.decision_function(x)).collect()
    }

    /// +1 above the cut value, -1 otherwise.
    ///
    /// The comparison is strict, so a score equal to the cut value is -1. A
    /// best-F1 cut value is itself an observed positive score: that observation
    /// falls on the negative side when the calibration scores are predicted again.
    pub fn predict(&self, x: f64) -> Result<i8> {
        Ok(if self.decision_function(x)? > 0.0 { 1 } else { -1 })
    }

    pub fn predict_batch(&self, xs: &[f64]) -> Result<Vec<i8>> {
        xs.iter().map(|&x| self.predict(x)).collect()
    }
}

/// A single score or a sequence of them, as accepted from Python.
#[cfg(feature = "python")]
#[derive(FromPyObject)]
enum ScoreInput {
    One(f64),
    Many(Vec<f64>),
}

/// Python‐exposed wrapper around ThresholdModel
#[cfg(feature = "python")]
#[pyclass(name = "ThresholdModel")]
pub struct PyThresholdModel {
    inner: ThresholdModel,
}

#[cfg(feature = "python")]
#[pymethods]
impl PyThresholdModel {
    #[new]
    #[pyo3(signature = (target="f1", level=None))]
    fn new(target: &str, level: Option<f64>) -> PyResult<Self> {
        let target = ThresholdTarget::parse(target, level)?;
        Ok(PyThresholdModel {
            inner: ThresholdModel::new(target),
        })
    }

    fn fit(&mut self, scores: Vec<f64>, labels: Vec<f64>) -> PyResult<()> {
        self.inner.fit(&scores, &labels)?;
        Ok(())
    }

    fn decision_function(&self, py: Python<'_>, x: ScoreInput) -> PyResult<PyObject> {
        Ok(match x {
            ScoreInput::One(x) => self.inner.decision_function(x)?.into_py(py),
            ScoreInput::Many(xs) => self.inner.decision_function_batch(&xs)?.into_py(py),
        })
    }

    fn predict(&self, py: Python<'_>, x: ScoreInput) -> PyResult<PyObject> {
        Ok(match x {
            ScoreInput::One(x) => self.inner.predict(x)?.into_py(py),
            ScoreInput::Many(xs) => self.inner.predict_batch(&xs)?.into_py(py),
        })
    }

    #[getter]
    fn cut_value(&self) -> Option<f64> {
        self.inner.cut_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCORES: [f64; 4] = [0.9, 0.8, 0.4, 0.1];
    const LABELS: [f64; 4] = [1.0, 1.0, -1.0, -1.0];

    #[test]
    fn parses_targets() {
        assert_eq!(ThresholdTarget::parse("f1", None).unwrap(), ThresholdTarget::F1);
        assert_eq!(
            ThresholdTarget::parse("recall", Some(0.9)).unwrap(),
            ThresholdTarget::Recall(0.9)
        );
        assert!(matches!(
            ThresholdTarget::parse("precision", None),
            Err(AdError::InvalidParameter(_))
        ));
        assert!(matches!(
            ThresholdTarget::parse("recall", Some(1.5)),
            Err(AdError::InvalidParameter(_))
        ));
        assert!(matches!(
            ThresholdTarget::parse("accuracy", Some(0.5)),
            Err(AdError::UnknownTarget(t)) if t == "accuracy"
        ));
    }

    #[test]
    fn f1_target_centres_scores() {
        let mut model = ThresholdModel::new(ThresholdTarget::F1);
        model.fit(&SCORES, &LABELS).unwrap();
        assert_eq!(model.cut_value(), Some(0.8));
        let centred = model.decision_function_batch(&[1.0, 0.8, 0.5]).unwrap();
        assert!((centred[0] - 0.2).abs() < 1e-12);
        assert_eq!(centred[1], 0.0);
        assert_eq!(model.predict_batch(&[0.85, 0.8, 0.1]).unwrap(), vec![1, -1, -1]);
    }

    #[test]
    fn best_f1_cut_value_is_predicted_negative() {
        let mut model = ThresholdModel::new(ThresholdTarget::F1);
        model.fit(&SCORES, &LABELS).unwrap();
        let predicted = model.predict_batch(&SCORES).unwrap();
        assert_eq!(predicted, vec![1, -1, -1, -1]);
        let predicted: Vec<f64> = predicted.iter().map(|&p| f64::from(p)).collect();
        let f1 = crate::utils::metrics::f1_score(&LABELS, &predicted).unwrap();
        assert!((f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn recall_and_precision_targets() {
        let mut recall = ThresholdModel::new(ThresholdTarget::Recall(0.5));
        recall.fit(&SCORES, &LABELS).unwrap();
        assert_eq!(recall.cut_value(), Some(0.9));

        let mut precision = ThresholdModel::new(ThresholdTarget::Precision(0.5));
        precision.fit(&SCORES, &LABELS).unwrap();
        assert_eq!(precision.cut_value(), Some(0.1));
    }

    #[test]
    fn unfitted_and_bad_input() {
        let mut model = ThresholdModel::new(ThresholdTarget::F1);
        assert!(matches!(model.predict(0.3), Err(AdError::NotFitted)));
        assert!(matches!(model.fit(&[], &[]), Err(AdError::InvalidParameter(_))));
        assert!(matches!(
            model.fit(&[0.1, 0.2], &[1.0]),
            Err(AdError::DimensionMismatch { .. })
        ));
        assert_eq!(model.cut_value(), None);
    }
}
