use ndarray::ArrayView1;

/// Euclidean distance between two equally sized vectors.
pub fn euclidean_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Permutation that orders `values` descending. Ties keep their original order.
pub fn sort_perm_desc(values: &[f64]) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..values.len()).collect();
    perm.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    perm
}

/// Element at `floor(quantile * len)` of the ascending sorted copy of `values`.
///
/// The index is clamped to the last element, so `quantile == 1.0` picks the
/// maximum instead of reading past the end. Returns `None` for empty input.
pub fn order_statistic(values: &[f64], quantile: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let idx = ((quantile * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    Some(sorted[idx])
}
