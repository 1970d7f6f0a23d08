use std::ffi::OsString;
use std::fs;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::error::{AdError, Result};
use crate::models::base_model::BaseModel;
use crate::utils::linalg::{euclidean_distance, order_statistic};

#[cfg(feature = "python")]
use numpy::{PyArray1, PyArray2, ToPyArray};
#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyDict;

/// Parameters of the nearest-neighbour anomaly detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestNeighborConfig {
    /// Expected fraction of emitted anomalies, in (0, 1].
    pub rate: f64,
    /// Number of most recent instances kept in the window.
    pub window_size: usize,
    /// Vector dimensionality. Taken from the first vector when `None`.
    pub dim: Option<usize>,
    /// Distance of an entry that has no neighbour yet. Should exceed the data diameter.
    pub max_dist: f64,
}

impl Default for NearestNeighborConfig {
    fn default() -> Self {
        NearestNeighborConfig {
            rate: 0.05,
            window_size: 100,
            dim: None,
            max_dist: 1e10,
        }
    }
}

impl NearestNeighborConfig {
    pub fn new(rate: f64, window_size: usize, dim: Option<usize>) -> Result<Self> {
        let config = NearestNeighborConfig {
            rate,
            window_size,
            dim,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Copy of this configuration with the given fields replaced, validated.
    pub fn with_overrides(
        &self,
        rate: Option<f64>,
        window_size: Option<usize>,
        dim: Option<usize>,
    ) -> Result<Self> {
        let config = NearestNeighborConfig {
            rate: rate.unwrap_or(self.rate),
            window_size: window_size.unwrap_or(self.window_size),
            dim: dim.or(self.dim),
            max_dist: self.max_dist,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.rate > 0.0 && self.rate <= 1.0) {
            return Err(AdError::InvalidParameter(format!(
                "rate {} not in range (0, 1]",
                self.rate
            )));
        }
        if self.window_size < 1 {
            return Err(AdError::InvalidParameter(
                "window size must be positive".to_string(),
            ));
        }
        if self.dim == Some(0) {
            return Err(AdError::InvalidParameter(
                "dimension must be positive".to_string(),
            ));
        }
        if !(self.max_dist.is_finite() && self.max_dist > 0.0) {
            return Err(AdError::InvalidParameter(format!(
                "max distance {} must be finite and positive",
                self.max_dist
            )));
        }
        Ok(())
    }
}

/// Read-only view of the detector internals.
#[derive(Debug, Clone)]
pub struct NearestNeighborModel<'a> {
    pub nearest_dist: &'a [f64],
    pub nearest_id: &'a [usize],
    /// Populated window columns, one reference vector per column.
    pub window: ArrayView2<'a, f64>,
    pub threshold: f64,
    pub next_slot: usize,
}

/// On-disk layout. Field order is the persisted order.
#[derive(Debug, Serialize, Deserialize)]
struct NearestNeighborState {
    rate: f64,
    window_size: usize,
    dim: Option<usize>,
    threshold: f64,
    fill_count: usize,
    next_slot: usize,
    max_dist: f64,
    nearest_dist: Vec<f64>,
    nearest_id: Vec<usize>,
    window: Array2<f64>,
}

/// Pure‐Rust nearest-neighbour anomaly detector over a sliding window.
///
/// The window is a `dim x window_size` column store filled in order and then
/// overwritten in ring-buffer order. For every populated column the detector
/// keeps the distance to, and index of, its nearest other column. Insertions
/// and evictions only rescan the entries they invalidate. The threshold is the
/// `(1 - rate)` order statistic of those distances.
#[derive(Debug, Clone)]
pub struct NearestNeighborAdImpl {
    config: NearestNeighborConfig,
    window: Array2<f64>,
    nearest_dist: Vec<f64>,
    nearest_id: Vec<usize>,
    threshold: f64,
    next_slot: usize,
}

impl NearestNeighborAdImpl {
    pub fn new(config: NearestNeighborConfig) -> Result<Self> {
        config.validate()?;
        let window = Array2::zeros((config.dim.unwrap_or(0), config.window_size));
        Ok(NearestNeighborAdImpl {
            config,
            window,
            nearest_dist: Vec::new(),
            nearest_id: Vec::new(),
            threshold: 0.0,
            next_slot: 0,
        })
    }

    pub fn params(&self) -> &NearestNeighborConfig {
        &self.config
    }

    /// Replace the parameters. Window size and dimension are fixed once the
    /// window holds data; a new rate takes effect immediately.
    pub fn set_params(&mut self, mut config: NearestNeighborConfig) -> Result<()> {
        config.validate()?;
        config.dim = config.dim.or(self.config.dim);
        if self.fill_count() > 0
            && (config.window_size != self.config.window_size
                || config.dim != self.config.dim
                || config.max_dist != self.config.max_dist)
        {
            return Err(AdError::InvalidParameter(
                "window size, dimension and max distance cannot change once fitted".to_string(),
            ));
        }
        if self.fill_count() == 0 {
            self.window = Array2::zeros((config.dim.unwrap_or(0), config.window_size));
        }
        self.config = config;
        self.update_threshold();
        Ok(())
    }

    pub fn dim(&self) -> Option<usize> {
        self.config.dim
    }

    pub fn fill_count(&self) -> usize {
        self.nearest_dist.len()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn next_slot(&self) -> usize {
        self.next_slot
    }

    pub fn model(&self) -> NearestNeighborModel<'_> {
        NearestNeighborModel {
            nearest_dist: &self.nearest_dist,
            nearest_id: &self.nearest_id,
            window: self.window.slice(s![.., ..self.fill_count()]),
            threshold: self.threshold,
            next_slot: self.next_slot,
        }
    }

    /// Insert one vector into the window and refresh the threshold.
    pub fn partial_fit(&mut self, x: ArrayView1<f64>) -> Result<()> {
        check_finite(x)?;
        self.bind_dim(x.len())?;
        let window_size = self.config.window_size;
        if self.fill_count() < window_size {
            let x_id = self.fill_count();
            self.add_vector(x, x_id);
            if self.fill_count() == window_size {
                info!(window_size, "nearest neighbor window filled");
            }
        } else {
            let x_id = self.next_slot;
            self.del_vector(x_id);
            self.add_vector(x, x_id);
            self.next_slot = (self.next_slot + 1) % window_size;
        }
        self.update_threshold();
        Ok(())
    }

    /// Insert every column of `a`, in column order.
    pub fn fit_matrix(&mut self, a: ArrayView2<f64>) -> Result<()> {
        for x in a.axis_iter(Axis(1)) {
            self.partial_fit(x)?;
        }
        Ok(())
    }

    /// Distance from `x` to the closest vector in the window.
    pub fn nearest_distance(&self, x: ArrayView1<f64>) -> Result<f64> {
        let fill = self.fill_count();
        if fill == 0 {
            return Err(AdError::NotFitted);
        }
        self.check_dim(x.len())?;
        check_finite(x)?;
        Ok((0..fill)
            .map(|i| euclidean_distance(x, self.window.column(i)))
            .fold(f64::INFINITY, f64::min))
    }

    /// How far `x` lies beyond the threshold. Positive means anomalous.
    pub fn decision_function(&self, x: ArrayView1<f64>) -> Result<f64> {
        Ok(self.nearest_distance(x)? - self.threshold)
    }

    /// 1 if `x` is an anomaly, 0 otherwise.
    pub fn predict(&self, x: ArrayView1<f64>) -> Result<u8> {
        Ok(u8::from(self.decision_function(x)? > 0.0))
    }

    /// Decision function for every column of `xs`, scored in parallel.
    pub fn decision_function_batch(&self, xs: ArrayView2<f64>) -> Result<Array1<f64>> {
        let columns: Vec<ArrayView1<f64>> = xs.axis_iter(Axis(1)).collect();
        let scores = columns
            .par_iter()
            .map(|x| self.decision_function(*x))
            .collect::<Result<Vec<f64>>>()?;
        Ok(Array1::from(scores))
    }

    pub fn predict_batch(&self, xs: ArrayView2<f64>) -> Result<Vec<u8>> {
        Ok(self
            .decision_function_batch(xs)?
            .iter()
            .map(|&d| u8::from(d > 0.0))
            .collect())
    }

    pub fn save<W: Write>(&self, mut writer: W) -> Result<()> {
        let buf = serde_json::to_vec(&self.to_state())?;
        writer.write_all(&buf)?;
        writer.flush()?;
        debug!(bytes = buf.len(), "saved nearest neighbor detector");
        Ok(())
    }

    /// Write the state next to `path` and rename it into place, so readers
    /// see either the old file or the complete new one.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let buf = serde_json::to_vec(&self.to_state())?;
        let mut tmp_name = OsString::from(path.as_os_str());
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let written = fs::File::create(&tmp_path).and_then(|mut file| {
            file.write_all(&buf)?;
            file.sync_all()
        });
        if let Err(err) = written.and_then(|_| fs::rename(&tmp_path, path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        debug!(path = %path.display(), bytes = buf.len(), "saved nearest neighbor detector");
        Ok(())
    }

    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let state: NearestNeighborState = serde_json::from_reader(reader)?;
        let detector = Self::from_state(state)?;
        debug!(
            fill_count = detector.fill_count(),
            threshold = detector.threshold,
            "loaded nearest neighbor detector"
        );
        Ok(detector)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = fs::File::open(path)?;
        Self::load(BufReader::new(file))
    }

    fn to_state(&self) -> NearestNeighborState {
        NearestNeighborState {
            rate: self.config.rate,
            window_size: self.config.window_size,
            dim: self.config.dim,
            threshold: self.threshold,
            fill_count: self.fill_count(),
            next_slot: self.next_slot,
            max_dist: self.config.max_dist,
            nearest_dist: self.nearest_dist.clone(),
            nearest_id: self.nearest_id.clone(),
            window: self.window.clone(),
        }
    }

    fn from_state(state: NearestNeighborState) -> Result<Self> {
        let config = NearestNeighborConfig {
            rate: state.rate,
            window_size: state.window_size,
            dim: state.dim,
            max_dist: state.max_dist,
        };
        config
            .validate()
            .map_err(|err| AdError::Serialization(err.to_string()))?;

        let fill = state.fill_count;
        let corrupt = |msg: String| Err(AdError::Serialization(msg));
        if fill > state.window_size {
            return corrupt(format!(
                "fill count {} exceeds window size {}",
                fill, state.window_size
            ));
        }
        if state.nearest_dist.len() != fill || state.nearest_id.len() != fill {
            return corrupt(format!(
                "expected {} neighbor entries, found {} distances and {} ids",
                fill,
                state.nearest_dist.len(),
                state.nearest_id.len()
            ));
        }
        if state.next_slot >= state.window_size || (fill < state.window_size && state.next_slot != 0)
        {
            return corrupt(format!("write cursor {} out of place", state.next_slot));
        }
        if state.nearest_id.iter().any(|&id| id >= fill) {
            return corrupt("neighbor id out of range".to_string());
        }
        if fill > 0 && state.dim.is_none() {
            return corrupt("populated window without a dimension".to_string());
        }
        let expected_shape = (state.dim.unwrap_or(0), state.window_size);
        if state.window.dim() != expected_shape {
            return corrupt(format!(
                "window shape {:?}, expected {:?}",
                state.window.dim(),
                expected_shape
            ));
        }
        if !state.threshold.is_finite() {
            return corrupt("threshold is not finite".to_string());
        }
        if state.nearest_dist.iter().any(|d| !d.is_finite())
            || state.window.iter().any(|v| !v.is_finite())
        {
            return corrupt("non-finite distance or window value".to_string());
        }

        Ok(NearestNeighborAdImpl {
            config,
            window: state.window,
            nearest_dist: state.nearest_dist,
            nearest_id: state.nearest_id,
            threshold: state.threshold,
            next_slot: state.next_slot,
        })
    }

    fn bind_dim(&mut self, got: usize) -> Result<()> {
        match self.config.dim {
            Some(expected) if expected != got => Err(AdError::DimensionMismatch { expected, got }),
            Some(_) => Ok(()),
            None if got == 0 => Err(AdError::InvalidParameter(
                "cannot infer dimension from an empty vector".to_string(),
            )),
            None => {
                self.config.dim = Some(got);
                self.window = Array2::zeros((got, self.config.window_size));
                Ok(())
            }
        }
    }

    fn check_dim(&self, got: usize) -> Result<()> {
        match self.config.dim {
            Some(expected) if expected != got => Err(AdError::DimensionMismatch { expected, got }),
            Some(_) => Ok(()),
            None => Err(AdError::NotFitted),
        }
    }

    // place x at column x_id, either appending or overwriting an evicted slot
    fn add_vector(&mut self, x: ArrayView1<f64>, x_id: usize) {
        if x_id == self.nearest_dist.len() {
            self.nearest_dist.push(self.config.max_dist);
            self.nearest_id.push(x_id);
        } else {
            self.nearest_dist[x_id] = self.config.max_dist;
            self.nearest_id[x_id] = x_id;
        }
        self.window.column_mut(x_id).assign(&x);
        self.update_distances(x_id, None);
    }

    // re-home every entry whose nearest neighbour is x_id
    fn del_vector(&mut self, x_id: usize) {
        let stale: Vec<usize> = self
            .nearest_id
            .iter()
            .enumerate()
            .filter(|&(i, &id)| i != x_id && id == x_id)
            .map(|(i, _)| i)
            .collect();
        trace!(slot = x_id, rescans = stale.len(), "evicting window entry");
        for y_id in stale {
            self.update_distances(y_id, Some(x_id));
        }
    }

    /// Recompute the nearest neighbour of column `x_id`, skipping `ignore_id`,
    /// and let `x_id` claim any entry it is strictly closer to.
    fn update_distances(&mut self, x_id: usize, ignore_id: Option<usize>) {
        let ignore_id = ignore_id.unwrap_or(x_id);
        let x = self.window.column(x_id);
        let dists: Vec<f64> = (0..self.fill_count())
            .map(|i| euclidean_distance(x, self.window.column(i)))
            .collect();

        let mut min_dist = self.config.max_dist;
        let mut min_id = x_id;
        for (i, &d) in dists.iter().enumerate() {
            if i == x_id || i == ignore_id {
                continue;
            }
            if d < self.nearest_dist[i] {
                self.nearest_dist[i] = d;
                self.nearest_id[i] = x_id;
            }
            if d < min_dist {
                min_dist = d;
                min_id = i;
            }
        }
        self.nearest_dist[x_id] = min_dist;
        self.nearest_id[x_id] = min_id;
    }

    fn update_threshold(&mut self) {
        if let Some(threshold) = order_statistic(&self.nearest_dist, 1.0 - self.config.rate) {
            self.threshold = threshold;
            debug!(threshold, fill_count = self.fill_count(), "threshold updated");
        }
    }
}

fn check_finite(x: ArrayView1<f64>) -> Result<()> {
    match x.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(AdError::InvalidParameter(format!(
            "component {} is {}",
            i, x[i]
        ))),
        None => Ok(()),
    }
}

impl BaseModel for NearestNeighborAdImpl {
    fn fit_partial(&mut self, x: &[f64]) -> Result<()> {
        self.partial_fit(ArrayView1::from(x))
    }

    fn score_partial(&self, x: &[f64]) -> Result<f64> {
        self.decision_function(ArrayView1::from(x))
    }

    fn fit_score_partial(&mut self, x: &[f64]) -> Result<f64> {
        // nothing to compare the very first instance against
        let score = if self.fill_count() == 0 {
            0.0
        } else {
            self.score_partial(x)?
        };
        self.fit_partial(x)?;
        Ok(score)
    }
}

/// Python‐exposed wrapper around NearestNeighborAdImpl.
///
/// Matrices coming from numpy hold one instance per row.
#[cfg(feature = "python")]
#[pyclass]
pub struct NearestNeighborAD {
    inner: NearestNeighborAdImpl,
}

#[cfg(feature = "python")]
#[pymethods]
impl NearestNeighborAD {
    #[new]
    #[pyo3(signature = (rate=0.05, window_size=100, dim=None))]
    fn new(rate: f64, window_size: usize, dim: Option<usize>) -> PyResult<Self> {
        let config = NearestNeighborConfig::new(rate, window_size, dim)?;
        Ok(NearestNeighborAD {
            inner: NearestNeighborAdImpl::new(config)?,
        })
    }

    fn partial_fit(&mut self, x: &PyArray1<f64>) -> PyResult<()> {
        let x = unsafe { x.as_array() };
        self.inner.partial_fit(x)?;
        Ok(())
    }

    fn fit(&mut self, xs: &PyArray2<f64>) -> PyResult<()> {
        let xs = unsafe { xs.as_array() };
        self.inner.fit_matrix(xs.t())?;
        Ok(())
    }

    fn decision_function(&self, x: &PyArray1<f64>) -> PyResult<f64> {
        let x = unsafe { x.as_array() };
        Ok(self.inner.decision_function(x)?)
    }

    fn predict(&self, x: &PyArray1<f64>) -> PyResult<u8> {
        let x = unsafe { x.as_array() };
        Ok(self.inner.predict(x)?)
    }

    fn decision_function_batch(&self, py: Python<'_>, xs: &PyArray2<f64>) -> PyResult<Py<PyArray1<f64>>> {
        let xs = unsafe { xs.as_array() };
        let scores = self.inner.decision_function_batch(xs.t())?;
        Ok(scores.to_pyarray(py).into_py(py))
    }

    fn predict_batch(&self, xs: &PyArray2<f64>) -> PyResult<Vec<u8>> {
        let xs = unsafe { xs.as_array() };
        Ok(self.inner.predict_batch(xs.t())?)
    }

    fn get_params(&self, py: Python<'_>) -> PyResult<Py<PyDict>> {
        let config = self.inner.params();
        let params = PyDict::new(py);
        params.set_item("rate", config.rate)?;
        params.set_item("window_size", config.window_size)?;
        params.set_item("dim", config.dim)?;
        Ok(params.into())
    }

    #[pyo3(signature = (rate=None, window_size=None, dim=None))]
    fn set_params(
        &mut self,
        rate: Option<f64>,
        window_size: Option<usize>,
        dim: Option<usize>,
    ) -> PyResult<()> {
        let config = self.inner.params().with_overrides(rate, window_size, dim)?;
        self.inner.set_params(config)?;
        Ok(())
    }

    fn fit_score_partial(&mut self, x: &PyArray1<f64>) -> PyResult<f64> {
        let slice = unsafe { x.as_slice()? };
        Ok(BaseModel::fit_score_partial(&mut self.inner, slice)?)
    }

    #[getter]
    fn threshold(&self) -> f64 {
        self.inner.threshold()
    }

    #[getter]
    fn next_slot(&self) -> usize {
        self.inner.next_slot()
    }

    #[getter]
    fn nearest_dist(&self) -> Vec<f64> {
        self.inner.model().nearest_dist.to_vec()
    }

    #[getter]
    fn nearest_id(&self) -> Vec<usize> {
        self.inner.model().nearest_id.to_vec()
    }

    fn save(&self, path: &str) -> PyResult<()> {
        self.inner.save_to_path(path)?;
        Ok(())
    }

    #[staticmethod]
    fn load(path: &str) -> PyResult<Self> {
        Ok(NearestNeighborAD {
            inner: NearestNeighborAdImpl::load_from_path(path)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn detector(rate: f64, window_size: usize) -> NearestNeighborAdImpl {
        NearestNeighborAdImpl::new(NearestNeighborConfig::new(rate, window_size, None).unwrap()).unwrap()
    }

    fn brute_force(det: &NearestNeighborAdImpl) -> Vec<f64> {
        let model = det.model();
        let n = model.window.ncols();
        (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| j != i)
                    .map(|j| euclidean_distance(model.window.column(i), model.window.column(j)))
                    .fold(det.params().max_dist, f64::min)
            })
            .collect()
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(
            NearestNeighborConfig::new(0.0, 10, None),
            Err(AdError::InvalidParameter(_))
        ));
        assert!(matches!(
            NearestNeighborConfig::new(1.5, 10, None),
            Err(AdError::InvalidParameter(_))
        ));
        assert!(matches!(
            NearestNeighborConfig::new(0.1, 0, None),
            Err(AdError::InvalidParameter(_))
        ));
        assert!(NearestNeighborConfig::new(1.0, 1, Some(3)).is_ok());
    }

    #[test]
    fn four_point_window_flags_far_probe() {
        let mut det = detector(0.5, 4);
        let xs = array![[0.0, 0.0, 0.0, 10.0]];
        det.fit_matrix(xs.view()).unwrap();

        assert_eq!(det.model().nearest_dist, &[0.0, 0.0, 0.0, 10.0]);
        assert_eq!(det.threshold(), 0.0);

        let probe = array![5.0];
        assert!((det.decision_function(probe.view()).unwrap() - 5.0).abs() < 1e-12);
        assert_eq!(det.predict(probe.view()).unwrap(), 1);
        assert_eq!(det.predict(array![0.0].view()).unwrap(), 0);
    }

    #[test]
    fn eviction_rehomes_orphaned_neighbors() {
        let mut det = detector(0.5, 3);
        for v in [0.0, 1.0, 5.0] {
            det.partial_fit(array![v].view()).unwrap();
        }
        // slot 0 (value 0) is evicted; entry 1 pointed at it
        det.partial_fit(array![9.0].view()).unwrap();
        assert_eq!(det.next_slot(), 1);
        assert_eq!(det.model().window.row(0).to_vec(), vec![9.0, 1.0, 5.0]);
        assert_eq!(det.model().nearest_dist, &[4.0, 4.0, 4.0]);
        assert_eq!(det.model().nearest_dist, brute_force(&det).as_slice());
    }

    #[test]
    fn ring_buffer_matches_brute_force() {
        let mut det = detector(0.2, 5);
        let stream = [
            [0.0, 0.0],
            [1.0, 0.5],
            [3.0, 3.0],
            [0.2, 0.1],
            [7.0, 1.0],
            [0.1, 0.1],
            [2.0, 2.0],
            [6.5, 1.2],
            [0.0, 0.3],
            [9.0, 9.0],
            [1.0, 1.0],
            [0.0, 0.0],
        ];
        for x in stream.iter() {
            det.partial_fit(ArrayView1::from(&x[..])).unwrap();
            assert_eq!(det.model().nearest_dist, brute_force(&det).as_slice());
            let expected =
                order_statistic(det.model().nearest_dist, 1.0 - det.params().rate).unwrap();
            assert_eq!(det.threshold(), expected);
        }
    }

    #[test]
    fn single_slot_window_never_flags() {
        let mut det = detector(0.5, 1);
        det.partial_fit(array![1.0].view()).unwrap();
        det.partial_fit(array![100.0].view()).unwrap();
        assert_eq!(det.fill_count(), 1);
        assert_eq!(det.threshold(), det.params().max_dist);
        assert_eq!(det.predict(array![-50.0].view()).unwrap(), 0);
    }

    #[test]
    fn tiny_rate_clamps_threshold_index() {
        let mut det = NearestNeighborAdImpl::new(NearestNeighborConfig {
            rate: 1e-17,
            window_size: 3,
            ..Default::default()
        })
        .unwrap();
        det.fit_matrix(array![[0.0, 1.0, 4.0]].view()).unwrap();
        assert_eq!(det.threshold(), 3.0);
    }

    #[test]
    fn queries_before_fit_fail() {
        let det = detector(0.1, 4);
        assert!(matches!(
            det.decision_function(array![1.0].view()),
            Err(AdError::NotFitted)
        ));
        assert!(matches!(det.predict(array![1.0].view()), Err(AdError::NotFitted)));
    }

    #[test]
    fn dimension_is_fixed_by_first_vector() {
        let mut det = detector(0.1, 4);
        det.partial_fit(array![1.0, 2.0].view()).unwrap();
        assert_eq!(det.dim(), Some(2));
        assert!(matches!(
            det.partial_fit(array![1.0].view()),
            Err(AdError::DimensionMismatch { expected: 2, got: 1 })
        ));
        assert!(matches!(
            det.decision_function(array![1.0, 2.0, 3.0].view()),
            Err(AdError::DimensionMismatch { expected: 2, got: 3 })
        ));
        assert_eq!(det.fill_count(), 1);
    }

    #[test]
    fn non_finite_vectors_are_rejected() {
        let mut det = detector(0.5, 3);
        det.partial_fit(array![0.0].view()).unwrap();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                det.partial_fit(array![bad].view()),
                Err(AdError::InvalidParameter(_))
            ));
            assert!(matches!(
                det.decision_function(array![bad].view()),
                Err(AdError::InvalidParameter(_))
            ));
        }
        assert_eq!(det.fill_count(), 1);
        assert_eq!(det.dim(), Some(1));

        // a NaN as the very first vector must not bind the dimension either
        let mut fresh = detector(0.5, 3);
        assert!(fresh.partial_fit(array![1.0, f64::NAN].view()).is_err());
        assert_eq!(fresh.dim(), None);

        det.partial_fit(array![1.0].view()).unwrap();
        assert_eq!(det.model().nearest_dist, brute_force(&det).as_slice());
        let mut buf = Vec::new();
        det.save(&mut buf).unwrap();
        let loaded = NearestNeighborAdImpl::load(buf.as_slice()).unwrap();
        assert_eq!(loaded.model().nearest_dist, &[1.0, 1.0]);
    }

    #[test]
    fn batch_scoring_matches_single() {
        let mut det = detector(0.25, 4);
        det.fit_matrix(array![[0.0, 1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 0.0]].view())
            .unwrap();
        let probes = array![[0.5, 10.0, -4.0], [0.0, 1.0, 0.0]];
        let batch = det.decision_function_batch(probes.view()).unwrap();
        for (i, probe) in probes.axis_iter(Axis(1)).enumerate() {
            assert_eq!(batch[i], det.decision_function(probe).unwrap());
        }
        assert_eq!(det.predict_batch(probes.view()).unwrap(), vec![0, 1, 1]);
    }

    #[test]
    fn fit_score_partial_scores_before_inserting() {
        let mut det = detector(0.5, 4);
        assert_eq!(det.fit_score_partial(&[0.0]).unwrap(), 0.0);
        let score = det.fit_score_partial(&[3.0]).unwrap();
        // the single-entry window has threshold max_dist
        assert!((score - (3.0 - det.params().max_dist)).abs() < 1e-3);
        assert_eq!(det.fill_count(), 2);
    }

    #[test]
    fn set_params_changes_rate_but_not_window() {
        let mut det = detector(0.5, 4);
        det.fit_matrix(array![[0.0, 1.0, 3.0, 10.0]].view()).unwrap();
        let mut config = det.params().clone();
        config.rate = 1.0;
        det.set_params(config.clone()).unwrap();
        assert_eq!(det.threshold(), 1.0);

        config.window_size = 8;
        assert!(matches!(det.set_params(config), Err(AdError::InvalidParameter(_))));
    }

    #[test]
    fn overrides_keep_unset_fields() {
        let base = NearestNeighborConfig::new(0.1, 20, Some(3)).unwrap();
        let rate_only = base.with_overrides(Some(0.4), None, None).unwrap();
        assert_eq!(rate_only.rate, 0.4);
        assert_eq!(rate_only.window_size, 20);
        assert_eq!(rate_only.dim, Some(3));
        assert_eq!(base.with_overrides(None, None, None).unwrap(), base);
        assert!(matches!(
            base.with_overrides(None, Some(0), None),
            Err(AdError::InvalidParameter(_))
        ));

        let mut det = detector(0.5, 4);
        det.fit_matrix(array![[0.0, 1.0, 3.0, 10.0]].view()).unwrap();
        let config = det.params().with_overrides(Some(1.0), None, None).unwrap();
        det.set_params(config).unwrap();
        assert_eq!(det.threshold(), 1.0);
        assert_eq!(det.predict_batch(array![[0.5, 20.0]].view()).unwrap(), vec![0, 1]);
    }

    #[test]
    fn save_load_round_trip_in_memory() {
        let mut det = detector(0.3, 4);
        det.fit_matrix(array![[0.0, 1.0, 3.0, 10.0, 11.0, 2.5]].view())
            .unwrap();
        let mut buf = Vec::new();
        det.save(&mut buf).unwrap();
        let loaded = NearestNeighborAdImpl::load(buf.as_slice()).unwrap();

        assert_eq!(loaded.threshold(), det.threshold());
        assert_eq!(loaded.next_slot(), det.next_slot());
        assert_eq!(loaded.model().nearest_id, det.model().nearest_id);
        for v in [-3.0, 0.0, 4.2, 20.0] {
            let probe = array![v];
            assert_eq!(
                loaded.decision_function(probe.view()).unwrap(),
                det.decision_function(probe.view()).unwrap()
            );
        }
    }

    #[test]
    fn load_rejects_inconsistent_state() {
        let mut det = detector(0.3, 4);
        det.fit_matrix(array![[0.0, 1.0]].view()).unwrap();
        let mut doc: serde_json::Value = serde_json::from_slice(&{
            let mut buf = Vec::new();
            det.save(&mut buf).unwrap();
            buf
        })
        .unwrap();
        doc["fill_count"] = serde_json::json!(3);
        let bytes = serde_json::to_vec(&doc).unwrap();
        assert!(matches!(
            NearestNeighborAdImpl::load(bytes.as_slice()),
            Err(AdError::Serialization(_))
        ));
        assert!(matches!(
            NearestNeighborAdImpl::load(&b"{\"rate\": 0.1"[..]),
            Err(AdError::Serialization(_))
        ));
    }

    #[test]
    fn empty_detector_round_trips() {
        let det = NearestNeighborAdImpl::new(NearestNeighborConfig::default()).unwrap();
        let mut buf = Vec::new();
        det.save(&mut buf).unwrap();
        let loaded = NearestNeighborAdImpl::load(buf.as_slice()).unwrap();
        assert_eq!(loaded.fill_count(), 0);
        assert_eq!(loaded.params(), det.params());
        assert_eq!(loaded.model().window.dim(), (0, 0));
    }
}
