//! Expected results and the comparators that judge returned values.

use std::fmt;
use std::sync::Arc;

use gllm_value_model::{Interval, Value};

/// Outcome of comparing one returned value against its expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    /// Returned value, formatted for diagnostics.
    pub got: String,
    /// Expectation, formatted for diagnostics.
    pub expected: String,
}

/// Custom comparison capability.
pub trait Comparator: Send + Sync {
    fn compare(&self, got: &Value) -> MatchResult;

    /// Short tag shown in debug output.
    fn kind(&self) -> &'static str {
        "custom"
    }
}

/// What a case expects its operation to return.
#[derive(Clone)]
pub enum Expectation {
    /// Exact value match (NaN matches NaN, signed zeros are equal).
    Value(Value),
    /// Scalar float contained in the interval.
    Interval(Interval),
    /// One interval per vector lane.
    Intervals(Vec<Interval>),
    /// One interval per matrix element, indexed `[column][row]`.
    IntervalGrid(Vec<Vec<Interval>>),
    Comparator(Arc<dyn Comparator>),
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Numeric components of a float value; `None` for non-float kinds.
fn float_components(value: &Value) -> Option<Vec<f64>> {
    value.components().iter().map(|c| c.as_f64()).collect()
}

impl Expectation {
    /// Judge `got` against this expectation.
    #[must_use]
    pub fn evaluate(&self, got: &Value) -> MatchResult {
        let got_text = got.to_string();
        let (matched, expected) = match self {
            Self::Value(expected) => (got.matches(expected), expected.to_string()),
            Self::Interval(interval) => {
                let matched = got.ty().is_scalar()
                    && float_components(got).is_some_and(|c| interval.contains(c[0]));
                (matched, interval.to_string())
            }
            Self::Intervals(lanes) => {
                let matched = !got.ty().is_scalar()
                    && got.components().len() == lanes.len()
                    && float_components(got).is_some_and(|c| {
                        c.iter().zip(lanes).all(|(v, interval)| interval.contains(*v))
                    });
                (matched, format!("[{}]", join(lanes)))
            }
            Self::IntervalGrid(columns) => {
                let flat: Vec<Interval> = columns.iter().flatten().copied().collect();
                let shape_ok = match got.ty() {
                    gllm_value_model::ValueType::Matrix { cols, rows, .. } => {
                        columns.len() == usize::from(*cols)
                            && columns.iter().all(|col| col.len() == usize::from(*rows))
                    }
                    _ => false,
                };
                let matched = shape_ok
                    && float_components(got).is_some_and(|c| {
                        c.iter().zip(&flat).all(|(v, interval)| interval.contains(*v))
                    });
                let rendered = columns
                    .iter()
                    .map(|col| format!("[{}]", join(col)))
                    .collect::<Vec<_>>();
                (matched, format!("[{}]", rendered.join(", ")))
            }
            Self::Comparator(comparator) => return comparator.compare(got),
        };
        MatchResult {
            matched,
            got: got_text,
            expected,
        }
    }
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Interval(i) => f.debug_tuple("Interval").field(i).finish(),
            Self::Intervals(i) => f.debug_tuple("Intervals").field(i).finish(),
            Self::IntervalGrid(g) => f.debug_tuple("IntervalGrid").field(g).finish(),
            Self::Comparator(c) => write!(f, "Comparator({})", c.kind()),
        }
    }
}

impl From<Value> for Expectation {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Interval> for Expectation {
    fn from(interval: Interval) -> Self {
        Self::Interval(interval)
    }
}

impl From<Vec<Interval>> for Expectation {
    fn from(lanes: Vec<Interval>) -> Self {
        Self::Intervals(lanes)
    }
}

impl From<Arc<dyn Comparator>> for Expectation {
    fn from(comparator: Arc<dyn Comparator>) -> Self {
        Self::Comparator(comparator)
    }
}
