//! Numerically stable accumulation helpers.
//!
//! Cell statistics are computed in two passes over observations shifted by a
//! common origin near the data: first the compensated mean of `x - origin`, then
//! the compensated sum of squared deviations from it. Shifting keeps a large
//! common offset out of the arithmetic, so the sum-of-squares identity holds for
//! data such as `1e9 ± 0.1`. Accumulators of different cells are combined with
//! Chan's pairwise merge.

use std::cmp::Ordering;

/// Count, mean and sum of squared deviations of a sample.
///
/// The mean is relative to the origin the sample was shifted by.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Moments {
    count: usize,
    mean: f64,
    sum_of_squares: f64,
}

impl Moments {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moments of an unshifted sample.
    pub fn from_slice(values: &[f64]) -> Self {
        Self::about(values, 0.0)
    }

    /// Moments of `values - origin`.
    pub fn about(values: &[f64], origin: f64) -> Self {
        if values.is_empty() {
            return Self::new();
        }
        let count = values.len();
        let mean = compensated_sum(values.iter().map(|x| x - origin)) / count as f64;
        let sum_of_squares = compensated_sum(values.iter().map(|x| (x - origin - mean).powi(2)));
        Moments {
            count,
            mean,
            sum_of_squares,
        }
    }

    /// Combine two accumulators as if all observations had been collected into one.
    ///
    /// Both must be relative to the same origin.
    pub fn merge(&self, other: &Moments) -> Moments {
        let count = self.count + other.count;
        if count == 0 {
            return Moments::new();
        }
        if self.count == 0 {
            return *other;
        }
        if other.count == 0 {
            return *self;
        }
        let delta = other.mean - self.mean;
        let weight_self = self.count as f64;
        let weight_other = other.count as f64;
        let total = count as f64;
        Moments {
            count,
            mean: (weight_self * self.mean + weight_other * other.mean) / total,
            sum_of_squares: self.sum_of_squares
                + other.sum_of_squares
                + delta * delta * weight_self * weight_other / total,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sum of squared deviations from the sample mean.
    pub fn sum_of_squares(&self) -> f64 {
        self.sum_of_squares
    }

    /// Unbiased sample variance, `None` for fewer than two observations.
    pub fn variance(&self) -> Option<f64> {
        if self.count < 2 {
            None
        } else {
            Some(self.sum_of_squares / (self.count - 1) as f64)
        }
    }
}

/// Neumaier-compensated summation.
pub fn compensated_sum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    for value in values {
        let t = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - t) + value;
        } else {
            compensation += (value - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}

/// Median of a sample; `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
