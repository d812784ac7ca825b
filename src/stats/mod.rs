//! Summary statistics used by the post-processing steps
//!
//! All spreads are population standard deviations, matching how the
//! per-run summaries have always been reported for this testbed.

use serde::{Deserialize, Serialize};

/// Arithmetic mean; zero for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; zero for fewer than two values
pub fn pstdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Mean, spread and sample count of one series
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl Summary {
    pub fn of(values: &[f64]) -> Self {
        match values {
            [] => Self { mean: 0.0, std_dev: 0.0, count: 0 },
            [single] => Self { mean: *single, std_dev: 0.0, count: 1 },
            _ => Self {
                mean: mean(values),
                std_dev: pstdev(values),
                count: values.len(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Scale mean and spread, e.g. microseconds to milliseconds
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            mean: self.mean * factor,
            std_dev: self.std_dev * factor,
            count: self.count,
        }
    }
}
