//! Concrete values, their host-shareable byte encoding and WGSL literals.
//!
//! Encoding follows WGSL host-shareable layout: scalars are 4 bytes (`f16`
//! is 2), vector components are packed, matrix columns are padded to the
//! column stride. Booleans are carried as `u32` 0/1 and abstract floats are
//! concretized to `f32`, matching what a program stores into a buffer.

use std::fmt;

use half::f16;
use thiserror::Error;

use crate::types::{ScalarKind, ValueType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("{ty} at offset {offset} does not fit in a {len}-byte buffer")]
    OutOfBounds {
        ty: String,
        offset: usize,
        len: usize,
    },
    #[error("malformed value: {0}")]
    Malformed(String),
}

// ── Scalar ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    F16(f16),
    AbstractFloat(f64),
}

impl Scalar {
    #[must_use]
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Bool(_) => ScalarKind::Bool,
            Self::I32(_) => ScalarKind::I32,
            Self::U32(_) => ScalarKind::U32,
            Self::F32(_) => ScalarKind::F32,
            Self::F16(_) => ScalarKind::F16,
            Self::AbstractFloat(_) => ScalarKind::AbstractFloat,
        }
    }

    /// Numeric value of a floating-point scalar.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F32(v) => Some(f64::from(*v)),
            Self::F16(v) => Some(v.to_f64()),
            Self::AbstractFloat(v) => Some(*v),
            _ => None,
        }
    }

    /// Exact equality as used by value expectations: any NaN matches any
    /// NaN and signed zeros compare equal.
    #[must_use]
    pub fn matches(&self, other: &Scalar) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) if self.kind() == other.kind() => {
                (a.is_nan() && b.is_nan()) || a == b
            }
            _ => self == other,
        }
    }

    fn storage_bytes(&self) -> [u8; 4] {
        match *self {
            Self::Bool(b) => u32::from(b).to_le_bytes(),
            Self::I32(v) => v.to_le_bytes(),
            Self::U32(v) => v.to_le_bytes(),
            Self::F32(v) => v.to_le_bytes(),
            Self::F16(v) => {
                let [lo, hi] = v.to_le_bytes();
                [lo, hi, 0, 0]
            }
            Self::AbstractFloat(v) => (v as f32).to_le_bytes(),
        }
    }

    /// `bytes` must hold at least `kind.storage_size()` bytes.
    fn from_storage_bytes(kind: ScalarKind, bytes: &[u8]) -> Scalar {
        if kind == ScalarKind::F16 {
            return Self::F16(f16::from_le_bytes([bytes[0], bytes[1]]));
        }
        let word = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match kind {
            ScalarKind::Bool => Self::Bool(u32::from_le_bytes(word) != 0),
            ScalarKind::I32 => Self::I32(i32::from_le_bytes(word)),
            ScalarKind::U32 => Self::U32(u32::from_le_bytes(word)),
            ScalarKind::AbstractFloat => Self::AbstractFloat(f64::from(f32::from_le_bytes(word))),
            _ => Self::F32(f32::from_le_bytes(word)),
        }
    }

    /// WGSL literal expression for this scalar.
    ///
    /// Non-finite floats have no literal form and are spelled as bitcasts;
    /// a non-finite abstract float is emitted as its `f32` bit pattern.
    #[must_use]
    pub fn wgsl(&self) -> String {
        match *self {
            Self::Bool(b) => b.to_string(),
            Self::I32(v) => format!("i32({v})"),
            Self::U32(v) => format!("{v}u"),
            Self::F32(v) if v.is_finite() => format!("{v:?}f"),
            Self::F32(v) => format!("bitcast<f32>({:#010x}u)", v.to_bits()),
            Self::F16(v) if v.is_finite() => format!("{:?}h", v.to_f32()),
            Self::F16(v) => format!("bitcast<vec2<f16>>({:#010x}u).x", v.to_bits()),
            Self::AbstractFloat(v) if v.is_finite() => format!("{v:?}"),
            Self::AbstractFloat(v) => format!("bitcast<f32>({:#010x}u)", (v as f32).to_bits()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v:?}"),
            Self::F16(v) => write!(f, "{:?}", v.to_f32()),
            Self::AbstractFloat(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f16> for Scalar {
    fn from(v: f16) -> Self {
        Self::F16(v)
    }
}

// ── Value ────────────────────────────────────────────────────────────

/// A concrete value: its type plus components (column-major for matrices).
///
/// Invariant: `components.len() == ty.component_count()` and every
/// component has kind `ty.element()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    ty: ValueType,
    components: Vec<Scalar>,
}

fn homogeneous_kind(components: &[Scalar]) -> Result<ScalarKind, ValueError> {
    let first = components
        .first()
        .ok_or_else(|| ValueError::Malformed("composite value without components".into()))?
        .kind();
    if let Some(other) = components.iter().find(|c| c.kind() != first) {
        return Err(ValueError::Malformed(format!(
            "mixed component kinds {first} and {}",
            other.kind()
        )));
    }
    Ok(first)
}

impl Value {
    #[must_use]
    pub fn scalar(value: impl Into<Scalar>) -> Self {
        let value = value.into();
        Self {
            ty: ValueType::Scalar(value.kind()),
            components: vec![value],
        }
    }

    #[must_use]
    pub fn abstract_float(value: f64) -> Self {
        Self::scalar(Scalar::AbstractFloat(value))
    }

    /// Build a `vecN` from 2, 3 or 4 components of one kind.
    pub fn vector(components: Vec<Scalar>) -> Result<Self, ValueError> {
        if !(2..=4).contains(&components.len()) {
            return Err(ValueError::Malformed(format!(
                "vector width {} outside 2..=4",
                components.len()
            )));
        }
        let element = homogeneous_kind(&components)?;
        Ok(Self {
            ty: ValueType::vec(components.len() as u8, element),
            components,
        })
    }

    /// Build a `matCxR` from column-major float components.
    pub fn matrix(cols: u8, rows: u8, components: Vec<Scalar>) -> Result<Self, ValueError> {
        if !(2..=4).contains(&cols) || !(2..=4).contains(&rows) {
            return Err(ValueError::Malformed(format!(
                "matrix shape {cols}x{rows} outside 2..=4"
            )));
        }
        if components.len() != usize::from(cols) * usize::from(rows) {
            return Err(ValueError::Malformed(format!(
                "mat{cols}x{rows} needs {} components, got {}",
                usize::from(cols) * usize::from(rows),
                components.len()
            )));
        }
        let element = homogeneous_kind(&components)?;
        if !element.is_float() {
            return Err(ValueError::Malformed(format!(
                "matrix elements must be floating point, got {element}"
            )));
        }
        Ok(Self {
            ty: ValueType::mat(cols, rows, element),
            components,
        })
    }

    #[must_use]
    pub fn ty(&self) -> &ValueType {
        &self.ty
    }

    #[must_use]
    pub fn components(&self) -> &[Scalar] {
        &self.components
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self.ty {
            ValueType::Scalar(_) => self.components.first().copied(),
            _ => None,
        }
    }

    /// Component-wise [`Scalar::matches`] on values of identical type.
    #[must_use]
    pub fn matches(&self, other: &Value) -> bool {
        self.ty == other.ty
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.matches(b))
    }

    /// Encode into `buffer` at `offset` using the storage encoding.
    pub fn write_to(&self, buffer: &mut [u8], offset: usize) -> Result<(), ValueError> {
        check_bounds(&self.ty, buffer.len(), offset)?;
        let size = self.ty.element().storage_size();
        for (index, component) in self.components.iter().enumerate() {
            let at = offset + self.ty.component_offset(index);
            buffer[at..at + size].copy_from_slice(&component.storage_bytes()[..size]);
        }
        Ok(())
    }

    /// WGSL constructor expression for this value.
    #[must_use]
    pub fn wgsl(&self) -> String {
        let args = || {
            self.components
                .iter()
                .map(Scalar::wgsl)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let element = self.ty.element();
        let template = if element.is_abstract() {
            String::new()
        } else {
            format!("<{element}>")
        };
        match &self.ty {
            ValueType::Scalar(_) => self.components[0].wgsl(),
            ValueType::Vector { width, .. } => format!("vec{width}{template}({})", args()),
            ValueType::Matrix { cols, rows, .. } => {
                format!("mat{cols}x{rows}{template}({})", args())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scalar) = self.as_scalar() {
            return write!(f, "{scalar}");
        }
        let parts = self
            .components
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        write!(f, "{}({})", self.ty, parts.join(", "))
    }
}

macro_rules! value_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::scalar(v)
                }
            }
        )*
    };
}

value_from_scalar!(bool, i32, u32, f32, f16, Scalar);

fn check_bounds(ty: &ValueType, len: usize, offset: usize) -> Result<(), ValueError> {
    let end = offset
        .checked_add(ty.byte_size())
        .ok_or_else(|| ValueError::Malformed("offset overflow".into()))?;
    if end > len {
        return Err(ValueError::OutOfBounds {
            ty: ty.to_string(),
            offset,
            len,
        });
    }
    Ok(())
}

impl ValueType {
    /// Decode a value of this type from `bytes` at `offset`.
    pub fn read(&self, bytes: &[u8], offset: usize) -> Result<Value, ValueError> {
        check_bounds(self, bytes.len(), offset)?;
        let kind = self.element();
        let components = (0..self.component_count())
            .map(|index| {
                let at = offset + self.component_offset(index);
                Scalar::from_storage_bytes(kind, &bytes[at..])
            })
            .collect();
        Ok(Value {
            ty: self.clone(),
            components,
        })
    }
}
