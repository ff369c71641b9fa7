//! Value model for expression conformance: WGSL scalar/vector/matrix types,
//! concrete values, and the codecs between them.
//!
//! These serve as:
//! 1. The host side of the host↔device wire format (`Value::write_to`,
//!    `ValueType::read`), laid out with WGSL host-shareable rules.
//! 2. The source of constant literals baked into synthesized programs
//!    (`Value::wgsl`).
//! 3. Acceptance intervals for floating-point expectations (`Interval`).

pub mod interval;
pub mod types;
pub mod value;

pub use interval::Interval;
pub use types::{ScalarKind, ValueType};
pub use value::{Scalar, Value, ValueError};
