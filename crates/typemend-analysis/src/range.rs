//! Value ranges.

/// Optional signed bounds on the values a declaration was seen to hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueRange {
    /// Smallest observed value.
    pub min: Option<i64>,
    /// Largest observed value.
    pub max: Option<i64>,
}

impl ValueRange {
    /// An empty range (no observations).
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single-point range.
    pub fn single(value: i64) -> Self {
        Self {
            min: Some(value),
            max: Some(value),
        }
    }

    /// True if neither bound is known.
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Widens this range to cover `other`.
    pub fn union(&mut self, other: &ValueRange) {
        if let Some(omin) = other.min {
            self.min = Some(match self.min {
                Some(m) => m.min(omin),
                None => omin,
            });
        }
        if let Some(omax) = other.max {
            self.max = Some(match self.max {
                Some(m) => m.max(omax),
                None => omax,
            });
        }
    }

    /// True if any observed value was negative.
    pub fn has_negative(&self) -> bool {
        self.min.is_some_and(|m| m < 0)
    }
}
