//! Classification scores and one-shot wrappers around [`PredictionCurve`].

use serde::{Deserialize, Serialize};

use crate::error::{AdError, Result};
use crate::utils::evaluation::PredictionCurve;

/// Running confusion-matrix counts for a binary classifier.
/// Labels and predictions count as positive when greater than zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationScore {
    pub count: usize,
    pub prediction_count: usize,
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_count: usize,
}

impl ClassificationScore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(y_true: &[f64], y_pred: &[f64]) -> Result<Self> {
        check_lengths(y_true, y_pred)?;
        let mut score = Self::new();
        for (&correct, &predicted) in y_true.iter().zip(y_pred) {
            score.push(correct, predicted);
        }
        Ok(score)
    }

    pub fn push(&mut self, correct: f64, predicted: f64) {
        let cat_correct = correct > 0.0;
        let cat_predicted = predicted > 0.0;
        if cat_correct {
            self.count += 1;
        }
        if cat_predicted {
            self.prediction_count += 1;
        }
        match (cat_correct, cat_predicted) {
            (true, true) => self.tp += 1,
            (true, false) => self.fn_count += 1,
            (false, true) => self.fp += 1,
            (false, false) => self.tn += 1,
        }
    }

    pub fn all(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_count
    }

    /// 1 when nothing was predicted positive.
    pub fn precision(&self) -> f64 {
        if self.fp == 0 {
            1.0
        } else {
            self.tp as f64 / (self.tp + self.fp) as f64
        }
    }

    pub fn recall(&self) -> f64 {
        if self.tp + self.fn_count == 0 {
            0.0
        } else {
            self.tp as f64 / (self.tp + self.fn_count) as f64
        }
    }

    pub fn f1(&self) -> f64 {
        let (precision, recall) = (self.precision(), self.recall());
        if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.all() == 0 {
            0.0
        } else {
            (self.tp + self.tn) as f64 / self.all() as f64
        }
    }
}

fn check_lengths(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(AdError::DimensionMismatch {
            expected: y_true.len(),
            got: y_pred.len(),
        });
    }
    Ok(())
}

pub fn accuracy_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    Ok(ClassificationScore::from_pairs(y_true, y_pred)?.accuracy())
}

pub fn precision_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    Ok(ClassificationScore::from_pairs(y_true, y_pred)?.precision())
}

pub fn recall_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    Ok(ClassificationScore::from_pairs(y_true, y_pred)?.recall())
}

pub fn f1_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    Ok(ClassificationScore::from_pairs(y_true, y_pred)?.f1())
}

pub fn roc_curve(y_true: &[f64], y_pred: &[f64], sample_count: usize) -> Result<Vec<(f64, f64)>> {
    PredictionCurve::from_pairs(y_true, y_pred)?.roc(sample_count)
}

pub fn roc_auc_score(y_true: &[f64], y_pred: &[f64], sample_count: usize) -> Result<f64> {
    PredictionCurve::from_pairs(y_true, y_pred)?.auc(sample_count)
}

pub fn precision_recall_curve(
    y_true: &[f64],
    y_pred: &[f64],
    sample_count: usize,
) -> Result<Vec<(f64, f64)>> {
    PredictionCurve::from_pairs(y_true, y_pred)?.precision_recall_curve(sample_count)
}

pub fn break_even_point_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    Ok(PredictionCurve::from_pairs(y_true, y_pred)?.break_even_point())
}

pub fn best_f1_threshold(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    Ok(PredictionCurve::from_pairs(y_true, y_pred)?.best_f1())
}

pub fn desired_recall_threshold(y_true: &[f64], y_pred: &[f64], desired_recall: f64) -> Result<f64> {
    Ok(PredictionCurve::from_pairs(y_true, y_pred)?.desired_recall(desired_recall))
}

pub fn desired_precision_threshold(
    y_true: &[f64],
    y_pred: &[f64],
    desired_precision: f64,
) -> Result<f64> {
    Ok(PredictionCurve::from_pairs(y_true, y_pred)?.desired_precision(desired_precision))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confusion_counts() {
        let score =
            ClassificationScore::from_pairs(&[1.0, 1.0, -1.0, -1.0, 1.0], &[1.0, -1.0, 1.0, -1.0, 1.0])
                .unwrap();
        assert_eq!((score.tp, score.fn_count, score.fp, score.tn), (2, 1, 1, 1));
        assert_eq!(score.count, 3);
        assert_eq!(score.prediction_count, 3);
        assert!((score.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((score.recall() - 2.0 / 3.0).abs() < 1e-12);
        assert!((score.f1() - 2.0 / 3.0).abs() < 1e-12);
        assert!((score.accuracy() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn f1_score_is_not_accuracy() {
        let y_true = [1.0, -1.0, -1.0, -1.0];
        let y_pred = [1.0, 1.0, -1.0, -1.0];
        assert!((f1_score(&y_true, &y_pred).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((accuracy_score(&y_true, &y_pred).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn empty_and_negative_only_inputs() {
        let empty = ClassificationScore::new();
        assert_eq!(empty.precision(), 1.0);
        assert_eq!(empty.recall(), 0.0);
        assert_eq!(empty.accuracy(), 0.0);
        assert_eq!(recall_score(&[-1.0], &[-1.0]).unwrap(), 0.0);
        assert_eq!(precision_score(&[-1.0], &[-1.0]).unwrap(), 1.0);
    }

    #[test]
    fn curve_helpers_delegate() {
        let y_true = [1.0, 1.0, -1.0, -1.0];
        let y_pred = [0.9, 0.8, 0.4, 0.1];
        assert_eq!(best_f1_threshold(&y_true, &y_pred).unwrap(), 0.8);
        assert_eq!(break_even_point_score(&y_true, &y_pred).unwrap(), 1.0);
        assert!((roc_auc_score(&y_true, &y_pred, 10).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(roc_curve(&y_true, &y_pred, 10).unwrap()[0], (0.0, 0.0));
        assert_eq!(desired_recall_threshold(&y_true, &y_pred, 0.5).unwrap(), 0.9);
        assert_eq!(desired_precision_threshold(&y_true, &y_pred, 0.5).unwrap(), 0.1);
        assert_eq!(
            precision_recall_curve(&y_true, &y_pred, 10).unwrap().last(),
            Some(&(1.0, 0.5))
        );
    }

    #[test]
    fn length_mismatch_is_reported() {
        assert!(matches!(
            accuracy_score(&[1.0, 1.0], &[1.0]),
            Err(AdError::DimensionMismatch { expected: 2, got: 1 })
        ));
        assert!(matches!(
            best_f1_threshold(&[1.0], &[]),
            Err(AdError::DimensionMismatch { expected: 1, got: 0 })
        ));
    }
}
