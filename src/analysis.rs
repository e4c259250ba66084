use crate::error::{Error, Result};
use crate::time_series::TimeSeries;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Per-sample mean and variance of every symbol across an ensemble.
///
/// Trajectories that stopped early (cancelled, out of budget, failed)
/// contribute only the samples they produced, so `counts` may decrease
/// towards the end of the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleStatistics {
    symbols: Vec<String>,
    times: Vec<f64>,
    counts: Vec<usize>,
    mean: Array2<f64>,
    variance: Array2<f64>,
}

impl EnsembleStatistics {
    /// Accumulates `series`, all of which must report `symbols` and sample a
    /// prefix of `times`.
    pub fn from_series<'a>(
        symbols: &[String],
        times: &[f64],
        series: impl IntoIterator<Item = &'a TimeSeries>,
    ) -> Result<Self> {
        let shape = (times.len(), symbols.len());
        let mut counts = vec![0usize; times.len()];
        let mut mean = Array2::zeros(shape);
        let mut m2 = Array2::<f64>::zeros(shape);

        for trajectory in series {
            if trajectory.symbols() != symbols {
                return Err(Error::InvalidInput(format!(
                    "trajectory reports {:?} instead of {:?}",
                    trajectory.symbols(),
                    symbols
                )));
            }
            if !times.starts_with(trajectory.times()) {
                return Err(Error::InvalidInput(
                    "trajectory was sampled at different times".to_string(),
                ));
            }
            for (sample, row) in trajectory.values().rows().into_iter().enumerate() {
                counts[sample] += 1;
                let n = counts[sample] as f64;
                for (symbol, &value) in row.iter().enumerate() {
                    // Welford's update
                    let delta = value - mean[[sample, symbol]];
                    mean[[sample, symbol]] += delta / n;
                    m2[[sample, symbol]] += delta * (value - mean[[sample, symbol]]);
                }
            }
        }

        let mut variance = m2;
        for (mut row, &count) in variance.rows_mut().into_iter().zip(counts.iter()) {
            if count > 1 {
                row /= (count - 1) as f64;
            } else {
                row.fill(0.);
            }
        }

        Ok(EnsembleStatistics {
            symbols: symbols.to_vec(),
            times: times.to_vec(),
            counts,
            mean,
            variance,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Number of trajectories contributing to each sample.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn mean(&self) -> &Array2<f64> {
        &self.mean
    }

    /// Unbiased sample variance. Zero where fewer than two trajectories
    /// contribute.
    pub fn variance(&self) -> &Array2<f64> {
        &self.variance
    }

    pub fn mean_of(&self, symbol: &str) -> Option<ArrayView1<'_, f64>> {
        let index = self.symbols.iter().position(|s| s == symbol)?;
        Some(self.mean.column(index))
    }

    pub fn variance_of(&self, symbol: &str) -> Option<ArrayView1<'_, f64>> {
        let index = self.symbols.iter().position(|s| s == symbol)?;
        Some(self.variance.column(index))
    }

    /// Standard error of the mean of `symbol` at `sample`.
    pub fn standard_error(&self, sample: usize, symbol: &str) -> Option<f64> {
        let count = *self.counts.get(sample)?;
        let variance = self.variance_of(symbol)?[sample];
        (count > 0).then(|| (variance / count as f64).sqrt())
    }
}
