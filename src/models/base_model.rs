use crate::error::Result;

/// A common Rust trait for streaming anomaly models.
pub trait BaseModel {
    /// Incorporate one instance.
    fn fit_partial(&mut self, x: &[f64]) -> Result<()>;

    /// Score one instance. Higher means more anomalous.
    fn score_partial(&self, x: &[f64]) -> Result<f64>;

    /// Default: score against the current state, then fit.
    fn fit_score_partial(&mut self, x: &[f64]) -> Result<f64> {
        let score = self.score_partial(x)?;
        self.fit_partial(x)?;
        Ok(score)
    }

    /// Default: fit a batch of instances.
    fn fit(&mut self, xs: &[Vec<f64>]) -> Result<()> {
        for x in xs {
            self.fit_partial(x)?;
        }
        Ok(())
    }

    /// Default: score a batch.
    fn score(&self, xs: &[Vec<f64>]) -> Result<Vec<f64>> {
        xs.iter().map(|x| self.score_partial(x)).collect()
    }

    /// Default: fit+score a batch.
    fn fit_score(&mut self, xs: &[Vec<f64>]) -> Result<Vec<f64>> {
        xs.iter().map(|x| self.fit_score_partial(x)).collect()
    }
}
