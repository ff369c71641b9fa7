//! Closed acceptance intervals for floating-point expectations.

use std::fmt;

use crate::value::ValueError;

/// Closed interval `[begin, end]` over f64.
///
/// The unbounded interval accepts every value, NaN included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    begin: f64,
    end: f64,
}

impl Interval {
    pub fn new(begin: f64, end: f64) -> Result<Self, ValueError> {
        if begin.is_nan() || end.is_nan() || begin > end {
            return Err(ValueError::Malformed(format!(
                "invalid interval bounds [{begin}, {end}]"
            )));
        }
        Ok(Self { begin, end })
    }

    #[must_use]
    pub fn point(value: f64) -> Self {
        Self {
            begin: value,
            end: value,
        }
    }

    #[must_use]
    pub fn any() -> Self {
        Self {
            begin: f64::NEG_INFINITY,
            end: f64::INFINITY,
        }
    }

    #[must_use]
    pub fn begin(&self) -> f64 {
        self.begin
    }

    #[must_use]
    pub fn end(&self) -> f64 {
        self.end
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        self.begin == f64::NEG_INFINITY && self.end == f64::INFINITY
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        if self.is_any() {
            return true;
        }
        !value.is_nan() && self.begin <= value && value <= self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("any")
        } else if self.begin == self.end {
            write!(f, "{:?}", self.begin)
        } else {
            write!(f, "[{:?}, {:?}]", self.begin, self.end)
        }
    }
}
