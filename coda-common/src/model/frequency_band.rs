//! Frequency band identity

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A (low, high) frequency pair in Hz
///
/// Equality and hashing compare the raw bit patterns of both bounds so the
/// type can key hash maps; ordering is `(low, high)` under `total_cmp`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low: f64,
    pub high: f64,
}

impl FrequencyBand {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Arithmetic center, where source spectra are evaluated
    pub fn center(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    /// Geometric center, used by the attenuation (Q) term
    pub fn geometric_center(&self) -> f64 {
        (self.low * self.high).sqrt()
    }

    /// Both bounds finite, positive and ordered
    pub fn is_valid(&self) -> bool {
        self.low.is_finite() && self.high.is_finite() && self.low > 0.0 && self.high > self.low
    }
}

impl PartialEq for FrequencyBand {
    fn eq(&self, other: &Self) -> bool {
        self.low.to_bits() == other.low.to_bits() && self.high.to_bits() == other.high.to_bits()
    }
}

impl Eq for FrequencyBand {}

impl Hash for FrequencyBand {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.low.to_bits().hash(state);
        self.high.to_bits().hash(state);
    }
}

impl PartialOrd for FrequencyBand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrequencyBand {
    fn cmp(&self, other: &Self) -> Ordering {
        self.low
            .total_cmp(&other.low)
            .then_with(|| self.high.total_cmp(&other.high))
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} Hz", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_identity_by_bounds() {
        let mut map = HashMap::new();
        map.insert(FrequencyBand::new(1.0, 2.0), "a");
        assert_eq!(map.get(&FrequencyBand::new(1.0, 2.0)), Some(&"a"));
        assert_eq!(map.get(&FrequencyBand::new(1.0, 2.5)), None);
    }

    #[test]
    fn test_centers() {
        let band = FrequencyBand::new(1.0, 4.0);
        assert_eq!(band.center(), 2.5);
        assert_eq!(band.geometric_center(), 2.0);
    }

    #[test]
    fn test_ordering() {
        let mut bands = vec![
            FrequencyBand::new(2.0, 3.0),
            FrequencyBand::new(0.5, 0.7),
            FrequencyBand::new(2.0, 2.5),
        ];
        bands.sort();
        assert_eq!(bands[0], FrequencyBand::new(0.5, 0.7));
        assert_eq!(bands[1], FrequencyBand::new(2.0, 2.5));
    }

    #[test]
    fn test_validity() {
        assert!(FrequencyBand::new(1.0, 2.0).is_valid());
        assert!(!FrequencyBand::new(0.0, 2.0).is_valid());
        assert!(!FrequencyBand::new(2.0, 1.0).is_valid());
        assert!(!FrequencyBand::new(f64::NAN, 1.0).is_valid());
    }
}
