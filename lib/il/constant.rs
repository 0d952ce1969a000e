use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A floating point constant with total equality and ordering, so it can live
/// inside hashed and ordered IL and formula structures.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct Float(f64);

impl Float {
    pub fn new(value: f64) -> Float {
        // Collapse -0.0 into 0.0 so equal values hash equally.
        if value == 0.0 {
            Float(0.0)
        } else {
            Float(value)
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for Float {
    fn eq(&self, other: &Float) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Float {}

impl PartialOrd for Float {
    fn partial_cmp(&self, other: &Float) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Float {
    fn cmp(&self, other: &Float) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Float {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state)
    }
}

impl From<f64> for Float {
    fn from(value: f64) -> Float {
        Float::new(value)
    }
}

impl From<f32> for Float {
    fn from(value: f32) -> Float {
        Float::new(value as f64)
    }
}

impl fmt::Display for Float {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.fract() == 0.0 && self.0.is_finite() {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_zero_is_zero() {
        assert_eq!(Float::new(-0.0), Float::new(0.0));
        assert!(Float::new(-1.5) < Float::new(0.25));
        assert_eq!(Float::new(2.0).to_string(), "2.0");
        assert_eq!(Float::new(0.25).to_string(), "0.25");
    }
}
