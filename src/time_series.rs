use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// `num_samples` evenly spaced times from `start` to `end`, both included.
/// A single sample is taken at `end`.
pub fn sample_times(start: f64, end: f64, num_samples: usize) -> Vec<f64> {
    match num_samples {
        0 => Vec::new(),
        1 => vec![end],
        n => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i + 1 == n { end } else { start + i as f64 * step })
                .collect()
        }
    }
}

/// Receives samples as a run produces them, in increasing time order.
pub trait SampleSink {
    /// `values` follows the order of the requested symbols.
    fn record(&mut self, time: f64, values: &[f64]);
}

impl<F> SampleSink for F
where
    F: FnMut(f64, &[f64]),
{
    fn record(&mut self, time: f64, values: &[f64]) {
        self(time, values)
    }
}

/// Values of the requested symbols at each sample time. Row `i` of `values`
/// holds the sample taken at `times[i]`, with one column per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    symbols: Vec<String>,
    times: Vec<f64>,
    values: Array2<f64>,
}

impl TimeSeries {
    pub fn new(symbols: Vec<String>, times: Vec<f64>, values: Array2<f64>) -> Result<Self> {
        if values.dim() != (times.len(), symbols.len()) {
            return Err(Error::InvalidInput(format!(
                "{} samples of {} symbols cannot hold values of shape {:?}",
                times.len(),
                symbols.len(),
                values.dim()
            )));
        }
        Ok(TimeSeries {
            symbols,
            times,
            values,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn symbol_index(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Every sample of one symbol.
    pub fn column(&self, symbol: &str) -> Option<ArrayView1<'_, f64>> {
        self.symbol_index(symbol)
            .map(|index| self.values.column(index))
    }

    pub fn value(&self, sample: usize, symbol: &str) -> Option<f64> {
        let index = self.symbol_index(symbol)?;
        self.values.get((sample, index)).copied()
    }

    /// The last sample taken, if any.
    pub fn last(&self) -> Option<(f64, ArrayView1<'_, f64>)> {
        let last = self.times.len().checked_sub(1)?;
        Some((self.times[last], self.values.row(last)))
    }
}

/// A sink that stores every sample and turns them into a `TimeSeries`.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    symbols: Vec<String>,
    times: Vec<f64>,
    values: Vec<f64>,
}

impl Recorder {
    pub fn new(symbols: Vec<String>) -> Self {
        Recorder {
            symbols,
            times: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn finish(self) -> Result<TimeSeries> {
        let shape = (self.times.len(), self.symbols.len());
        let values = Array2::from_shape_vec(shape, self.values)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        TimeSeries::new(self.symbols, self.times, values)
    }
}

impl SampleSink for Recorder {
    fn record(&mut self, time: f64, values: &[f64]) {
        self.times.push(time);
        self.values.extend_from_slice(values);
    }
}
