//! Running statistics used by the calibration solvers
//!
//! `SummaryStatistics` is a mergeable running accumulator (Welford update,
//! Chan et al. pairwise merge). Accumulators built on separate workers can be
//! folded together in any fixed order and produce the same mean regardless of
//! which thread saw which value first.

use serde::{Deserialize, Serialize};

/// Running count / mean / variance accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    n: u64,
    mean: f64,
    m2: f64,
}

impl SummaryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an accumulator from a slice of values
    pub fn from_values(values: &[f64]) -> Self {
        let mut stats = Self::new();
        for v in values {
            stats.add_value(*v);
        }
        stats
    }

    pub fn add_value(&mut self, value: f64) {
        self.n += 1;
        let delta = value - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Combine two accumulators as if every value had been added to one
    pub fn merge(&mut self, other: &SummaryStatistics) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }
        let n = self.n + other.n;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.n as f64 / n as f64;
        let m2 = self.m2 + other.m2 + delta * delta * (self.n as f64 * other.n as f64) / n as f64;
        self.n = n;
        self.mean = mean;
        self.m2 = m2;
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    /// Arithmetic mean, NaN when empty
    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Sample variance (n - 1 denominator), NaN for fewer than two values
    pub fn variance(&self) -> f64 {
        if self.n < 2 {
            f64::NAN
        } else {
            self.m2 / (self.n - 1) as f64
        }
    }

    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Standard error of the mean
    pub fn standard_error(&self) -> f64 {
        self.standard_deviation() / (self.n as f64).sqrt()
    }
}

/// Median of a sample, averaging the two middle values for even counts.
///
/// Returns `None` for an empty sample. NaN values sort last.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let stats = SummaryStatistics::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.n(), 8);
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        // Sample variance of the classic example is 32/7
        assert!((stats.variance() - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_and_single_value() {
        let empty = SummaryStatistics::new();
        assert!(empty.mean().is_nan());
        assert!(empty.variance().is_nan());

        let single = SummaryStatistics::from_values(&[3.5]);
        assert_eq!(single.mean(), 3.5);
        assert!(single.standard_deviation().is_nan());
        assert!(single.standard_error().is_nan());
    }

    #[test]
    fn test_merge_matches_sequential() {
        let all = [1.0, -2.0, 3.5, 8.0, 0.25, 4.0, 4.0];
        let sequential = SummaryStatistics::from_values(&all);

        let mut left = SummaryStatistics::from_values(&all[..3]);
        let right = SummaryStatistics::from_values(&all[3..]);
        left.merge(&right);

        assert_eq!(left.n(), sequential.n());
        assert!((left.mean() - sequential.mean()).abs() < 1e-12);
        assert!((left.variance() - sequential.variance()).abs() < 1e-12);
    }

    #[test]
    fn test_merge_with_empty() {
        let mut stats = SummaryStatistics::new();
        stats.merge(&SummaryStatistics::from_values(&[1.0, 3.0]));
        assert_eq!(stats.mean(), 2.0);

        stats.merge(&SummaryStatistics::new());
        assert_eq!(stats.n(), 2);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[5.0, 5.2, 4.9]), Some(5.0));
        assert_eq!(median(&[1.0, 4.0, 2.0, 3.0]), Some(2.5));
    }
}
