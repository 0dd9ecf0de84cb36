//! Cardinality ranges: how many data quanta flow over a channel.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardinalityEstimate {
    pub lower: u64,
    pub upper: u64,
    /// Confidence in [0, 1] that the true value lies within the range.
    pub correctness: f64,
}

impl CardinalityEstimate {
    pub fn new(lower: u64, upper: u64, correctness: f64) -> Self {
        Self {
            lower: lower.min(upper),
            upper: upper.max(lower),
            correctness: correctness.clamp(0.0, 1.0),
        }
    }

    pub fn exact(n: u64) -> Self {
        Self::new(n, n, 1.0)
    }

    /// Nothing is known: zero to a large bound, with no confidence.
    pub fn unknown() -> Self {
        Self::new(0, 1_000_000, 0.0)
    }

    pub fn is_exact(&self) -> bool {
        self.lower == self.upper
    }

    pub fn mean(&self) -> f64 {
        (self.lower as f64 + self.upper as f64) / 2.0
    }

    pub fn plus(&self, other: &CardinalityEstimate) -> Self {
        Self::new(
            self.lower.saturating_add(other.lower),
            self.upper.saturating_add(other.upper),
            self.correctness.min(other.correctness),
        )
    }

    /// Stretch the range by independent factors on each bound.
    pub fn scale(&self, lower_factor: f64, upper_factor: f64, correctness: f64) -> Self {
        Self::new(
            (self.lower as f64 * lower_factor).floor() as u64,
            (self.upper as f64 * upper_factor).ceil() as u64,
            self.correctness.min(correctness),
        )
    }
}

impl Default for CardinalityEstimate {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_orders_bounds() {
        let c = CardinalityEstimate::new(10, 2, 1.5);
        assert_eq!((c.lower, c.upper), (2, 10));
        assert_eq!(c.correctness, 1.0);
    }

    #[test]
    fn plus_takes_weakest_confidence() {
        let a = CardinalityEstimate::new(1, 5, 0.9);
        let b = CardinalityEstimate::exact(10);
        let s = a.plus(&b);
        assert_eq!((s.lower, s.upper), (11, 15));
        assert_eq!(s.correctness, 0.9);
    }

    #[test]
    fn scale_widens_range() {
        let c = CardinalityEstimate::exact(100).scale(0.0, 1.0, 0.7);
        assert_eq!((c.lower, c.upper), (0, 100));
        assert_eq!(c.correctness, 0.7);
    }
}
