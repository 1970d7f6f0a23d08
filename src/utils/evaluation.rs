use serde::{Deserialize, Serialize};

use crate::error::{AdError, Result};
use crate::utils::linalg::sort_perm_desc;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Default number of samples drawn along a curve.
pub const DEFAULT_SAMPLE_COUNT: usize = 10;

/// Receives one precision/recall operating point per step of the sweep
/// performed by [`PredictionCurve::eval_precision_recall`].
pub trait PrecisionRecallVisitor {
    type Output;

    /// Called after the observation with `score` is moved to the positive side.
    fn update(&mut self, positive: bool, score: f64, precision: f64, recall: f64);

    fn finish(self) -> Self::Output;
}

/// Samples `(recall, precision)` pairs at evenly spaced sweep positions.
#[derive(Debug, Clone)]
pub struct CurveSampler {
    curve: Vec<(f64, f64)>,
    step: usize,
    counter: usize,
    last: (f64, f64),
}

impl CurveSampler {
    pub fn new(length: usize, sample_count: usize) -> Self {
        let step = length / sample_count;
        CurveSampler {
            curve: vec![(0.0, 1.0)],
            step,
            counter: step,
            last: (0.0, 0.0),
        }
    }
}

impl PrecisionRecallVisitor for CurveSampler {
    type Output = Vec<(f64, f64)>;

    fn update(&mut self, _positive: bool, _score: f64, precision: f64, recall: f64) {
        self.counter = self.counter.saturating_sub(1);
        if self.counter == 0 {
            self.curve.push((recall, precision));
            self.counter = self.step;
        }
        self.last = (recall, precision);
    }

    fn finish(mut self) -> Self::Output {
        self.curve.push(self.last);
        self.curve
    }
}

/// Tracks the point where precision and recall are closest.
#[derive(Debug, Clone)]
pub struct BreakEven {
    min_diff: f64,
    bep: f64,
}

impl Default for BreakEven {
    fn default() -> Self {
        BreakEven {
            min_diff: 1.0,
            bep: -1.0,
        }
    }
}

impl PrecisionRecallVisitor for BreakEven {
    type Output = f64;

    fn update(&mut self, _positive: bool, _score: f64, precision: f64, recall: f64) {
        let diff = (precision - recall).abs();
        if diff < self.min_diff {
            self.min_diff = diff;
            self.bep = (precision + recall) / 2.0;
        }
    }

    fn finish(self) -> f64 {
        self.bep
    }
}

/// Tracks the score with the highest F1.
#[derive(Debug, Clone, Default)]
pub struct BestF1 {
    max_f1: f64,
    threshold: f64,
}

impl PrecisionRecallVisitor for BestF1 {
    type Output = f64;

    fn update(&mut self, _positive: bool, score: f64, precision: f64, recall: f64) {
        let f1 = 2.0 * precision * recall / (precision + recall);
        if f1 > self.max_f1 {
            self.max_f1 = f1;
            self.threshold = score;
        }
    }

    fn finish(self) -> f64 {
        self.threshold
    }
}

/// Which side of the operating point a [`ClosestTo`] visitor matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Precision,
    Recall,
}

/// Tracks the score whose precision or recall is nearest to a target level.
#[derive(Debug, Clone)]
pub struct ClosestTo {
    measure: Measure,
    target: f64,
    min_diff: f64,
    threshold: f64,
}

impl ClosestTo {
    pub fn new(measure: Measure, target: f64) -> Self {
        ClosestTo {
            measure,
            target,
            min_diff: 1.0,
            threshold: 0.0,
        }
    }
}

impl PrecisionRecallVisitor for ClosestTo {
    type Output = f64;

    fn update(&mut self, _positive: bool, score: f64, precision: f64, recall: f64) {
        let value = match self.measure {
            Measure::Precision => precision,
            Measure::Recall => recall,
        };
        let diff = (self.target - value).abs();
        if diff < self.min_diff {
            self.min_diff = diff;
            self.threshold = score;
        }
    }

    fn finish(self) -> f64 {
        self.threshold
    }
}

/// Accumulates (ground truth, score) pairs and derives ROC and
/// precision/recall measures from them.
///
/// A ground truth is positive when it is greater than zero. Observations are
/// ranked by descending score; equal scores keep their insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "CurveDocument")]
pub struct PredictionCurve {
    grounds: Vec<bool>,
    predictions: Vec<f64>,
    all_positives: usize,
    all_negatives: usize,
}

/// Unchecked serialized form of a [`PredictionCurve`].
#[derive(Deserialize)]
struct CurveDocument {
    grounds: Vec<bool>,
    predictions: Vec<f64>,
    all_positives: usize,
    all_negatives: usize,
}

impl TryFrom<CurveDocument> for PredictionCurve {
    type Error = AdError;

    fn try_from(doc: CurveDocument) -> Result<Self> {
        if doc.grounds.len() != doc.predictions.len() {
            return Err(AdError::Serialization(format!(
                "{} ground truths for {} predictions",
                doc.grounds.len(),
                doc.predictions.len()
            )));
        }
        let all_positives = doc.grounds.iter().filter(|&&positive| positive).count();
        let all_negatives = doc.grounds.len() - all_positives;
        if (doc.all_positives, doc.all_negatives) != (all_positives, all_negatives) {
            return Err(AdError::Serialization(format!(
                "stored counts {}/{} disagree with ground truths {}/{}",
                doc.all_positives, doc.all_negatives, all_positives, all_negatives
            )));
        }
        Ok(PredictionCurve {
            grounds: doc.grounds,
            predictions: doc.predictions,
            all_positives,
            all_negatives,
        })
    }
}

impl PredictionCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(labels: &[f64], scores: &[f64]) -> Result<Self> {
        if labels.len() != scores.len() {
            return Err(AdError::DimensionMismatch {
                expected: labels.len(),
                got: scores.len(),
            });
        }
        let mut curve = Self::new();
        for (&label, &score) in labels.iter().zip(scores) {
            curve.push(label, score);
        }
        Ok(curve)
    }

    /// Add a measurement with its ground truth (positive when `> 0`) and predicted score.
    pub fn push(&mut self, ground: f64, score: f64) {
        let positive = ground > 0.0;
        self.grounds.push(positive);
        self.predictions.push(score);
        if positive {
            self.all_positives += 1;
        } else {
            self.all_negatives += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    pub fn all_positives(&self) -> usize {
        self.all_positives
    }

    pub fn all_negatives(&self) -> usize {
        self.all_negatives
    }

    /// ROC curve as `(false positive rate, true positive rate)` points, sampled
    /// every `len / sample_count` observations. Always starts at (0, 0) and
    /// ends at (1, 1).
    pub fn roc(&self, sample_count: usize) -> Result<Vec<(f64, f64)>> {
        check_sample_count(sample_count)?;
        let perm = sort_perm_desc(&self.predictions);
        let step = perm.len() / sample_count;

        let (mut tp, mut fp) = (0usize, 0usize);
        let mut curve = vec![(0.0, 0.0)];
        let mut next = step;
        for &i in &perm {
            if self.grounds[i] {
                tp += 1;
            } else {
                fp += 1;
            }
            next = next.saturating_sub(1);
            if next == 0 {
                curve.push((
                    ratio(fp, self.all_negatives),
                    ratio(tp, self.all_positives),
                ));
                next = step;
            }
        }
        curve.push((1.0, 1.0));
        Ok(curve)
    }

    /// Area under the sampled ROC curve, one trapezoid per segment.
    pub fn auc(&self, sample_count: usize) -> Result<f64> {
        let curve = self.roc(sample_count)?;
        Ok(curve
            .windows(2)
            .map(|pair| {
                let (left, right) = (pair[0], pair[1]);
                let width = right.0 - left.0;
                width * left.1 + width * (right.1 - left.1) / 2.0
            })
            .sum())
    }

    /// Sweep the decision threshold down through the ranked observations,
    /// reporting every step that has at least one true positive.
    pub fn eval_precision_recall<V: PrecisionRecallVisitor>(&self, mut visitor: V) -> V::Output {
        let perm = sort_perm_desc(&self.predictions);
        let (mut tp, mut fp) = (0usize, 0usize);
        let mut fn_count = self.all_positives;
        for &i in &perm {
            let positive = self.grounds[i];
            if positive {
                tp += 1;
                fn_count -= 1;
            } else {
                fp += 1;
            }
            if tp + fp > 0 && tp + fn_count > 0 && tp > 0 {
                let precision = tp as f64 / (tp + fp) as f64;
                let recall = tp as f64 / (tp + fn_count) as f64;
                visitor.update(positive, self.predictions[i], precision, recall);
            }
        }
        visitor.finish()
    }

    /// `(recall, precision)` pairs, starting at (0, 1) and ending with the last
    /// operating point of the sweep.
    pub fn precision_recall_curve(&self, sample_count: usize) -> Result<Vec<(f64, f64)>> {
        check_sample_count(sample_count)?;
        Ok(self.eval_precision_recall(CurveSampler::new(self.len(), sample_count)))
    }

    /// Mean of precision and recall where they are closest; -1 if no
    /// operating point exists.
    pub fn break_even_point(&self) -> f64 {
        self.eval_precision_recall(BreakEven::default())
    }

    /// Score that maximises F1 when used as the decision threshold.
    pub fn best_f1(&self) -> f64 {
        self.eval_precision_recall(BestF1::default())
    }

    pub fn desired_recall(&self, target: f64) -> f64 {
        self.eval_precision_recall(ClosestTo::new(Measure::Recall, target))
    }

    pub fn desired_precision(&self, target: f64) -> f64 {
        self.eval_precision_recall(ClosestTo::new(Measure::Precision, target))
    }
}

fn check_sample_count(sample_count: usize) -> Result<()> {
    if sample_count == 0 {
        return Err(AdError::InvalidParameter(
            "sample count must be positive".to_string(),
        ));
    }
    Ok(())
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Python‐exposed wrapper around PredictionCurve
#[cfg(feature = "python")]
#[pyclass(name = "PredictionCurve")]
pub struct PyPredictionCurve {
    inner: PredictionCurve,
}

#[cfg(feature = "python")]
#[pymethods]
impl PyPredictionCurve {
    #[new]
    #[pyo3(signature = (y_true=None, y_pred=None))]
    fn new(y_true: Option<Vec<f64>>, y_pred: Option<Vec<f64>>) -> PyResult<Self> {
        let inner = match (y_true, y_pred) {
            (Some(labels), Some(scores)) => PredictionCurve::from_pairs(&labels, &scores)?,
            (None, None) => PredictionCurve::new(),
            _ => {
                return Err(pyo3::exceptions::PyValueError::new_err(
                    "y_true and y_pred must be given together",
                ))
            }
        };
        Ok(PyPredictionCurve { inner })
    }

    fn push(&mut self, ground: f64, score: f64) {
        self.inner.push(ground, score);
    }

    #[pyo3(signature = (sample=DEFAULT_SAMPLE_COUNT))]
    fn roc(&self, sample: usize) -> PyResult<Vec<(f64, f64)>> {
        Ok(self.inner.roc(sample)?)
    }

    #[pyo3(signature = (sample=DEFAULT_SAMPLE_COUNT))]
    fn auc(&self, sample: usize) -> PyResult<f64> {
        Ok(self.inner.auc(sample)?)
    }

    #[pyo3(signature = (sample=DEFAULT_SAMPLE_COUNT))]
    fn precision_recall_curve(&self, sample: usize) -> PyResult<Vec<(f64, f64)>> {
        Ok(self.inner.precision_recall_curve(sample)?)
    }

    fn break_even_point(&self) -> f64 {
        self.inner.break_even_point()
    }

    fn best_f1(&self) -> f64 {
        self.inner.best_f1()
    }

    fn desired_recall(&self, target: f64) -> f64 {
        self.inner.desired_recall(target)
    }

    fn desired_precision(&self, target: f64) -> f64 {
        self.inner.desired_precision(target)
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }
}
