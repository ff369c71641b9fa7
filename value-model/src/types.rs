//! Scalar kinds and composite value types.

use std::fmt;

/// Element kind of a scalar, vector or matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    I32,
    U32,
    F32,
    F16,
    /// Unconstrained-precision float that only exists in constant expressions.
    AbstractFloat,
}

impl ScalarKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::AbstractFloat => "abstract-float",
        }
    }

    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F16 | Self::AbstractFloat)
    }

    #[must_use]
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::AbstractFloat)
    }

    /// Kind used to carry values of this kind through a binding buffer.
    ///
    /// Booleans travel as `u32` 0/1, abstract floats are concretized to `f32`.
    #[must_use]
    pub fn storage_kind(self) -> ScalarKind {
        match self {
            Self::Bool => Self::U32,
            Self::AbstractFloat => Self::F32,
            other => other,
        }
    }

    /// Bytes one element occupies in a binding buffer.
    #[must_use]
    pub fn storage_size(&self) -> usize {
        match self.storage_kind() {
            Self::F16 => 2,
            _ => 4,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a value: scalar, `vecN<T>` or `matCxR<T>`.
///
/// Widths, column and row counts are 2, 3 or 4 for every type produced by
/// the engine; other shapes are representable so callers can report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Scalar(ScalarKind),
    Vector { width: u8, element: ScalarKind },
    Matrix { cols: u8, rows: u8, element: ScalarKind },
}

impl ValueType {
    pub const BOOL: Self = Self::Scalar(ScalarKind::Bool);
    pub const I32: Self = Self::Scalar(ScalarKind::I32);
    pub const U32: Self = Self::Scalar(ScalarKind::U32);
    pub const F32: Self = Self::Scalar(ScalarKind::F32);
    pub const F16: Self = Self::Scalar(ScalarKind::F16);
    pub const ABSTRACT_FLOAT: Self = Self::Scalar(ScalarKind::AbstractFloat);

    #[must_use]
    pub fn vec(width: u8, element: ScalarKind) -> Self {
        Self::Vector { width, element }
    }

    #[must_use]
    pub fn mat(cols: u8, rows: u8, element: ScalarKind) -> Self {
        Self::Matrix {
            cols,
            rows,
            element,
        }
    }

    #[must_use]
    pub fn element(&self) -> ScalarKind {
        match self {
            Self::Scalar(kind) => *kind,
            Self::Vector { element, .. } | Self::Matrix { element, .. } => *element,
        }
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// Number of scalar components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector { width, .. } => usize::from(*width),
            Self::Matrix { cols, rows, .. } => usize::from(*cols) * usize::from(*rows),
        }
    }

    /// Same shape with the element kind replaced by its storage kind.
    #[must_use]
    pub fn storage_type(&self) -> ValueType {
        match self {
            Self::Scalar(kind) => Self::Scalar(kind.storage_kind()),
            Self::Vector { width, element } => Self::Vector {
                width: *width,
                element: element.storage_kind(),
            },
            Self::Matrix {
                cols,
                rows,
                element,
            } => Self::Matrix {
                cols: *cols,
                rows: *rows,
                element: element.storage_kind(),
            },
        }
    }

    /// Byte distance between two matrix columns (column vectors are aligned
    /// like `vec2` for two rows and like `vec4` otherwise).
    #[must_use]
    pub fn column_stride(&self) -> usize {
        let size = self.element().storage_size();
        match self {
            Self::Matrix { rows: 2, .. } => 2 * size,
            Self::Matrix { .. } => 4 * size,
            Self::Vector { width, .. } => usize::from(*width) * size,
            Self::Scalar(_) => size,
        }
    }

    /// Byte offset of component `index` relative to the start of the value.
    /// Matrix components are numbered column-major.
    #[must_use]
    pub fn component_offset(&self, index: usize) -> usize {
        let size = self.element().storage_size();
        match self {
            Self::Matrix { rows, .. } => {
                let rows = usize::from(*rows);
                (index / rows) * self.column_stride() + (index % rows) * size
            }
            _ => index * size,
        }
    }

    /// Bytes covered by an encoded value of this type, padding between
    /// matrix columns included.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Matrix { cols, .. } => usize::from(*cols) * self.column_stride(),
            _ => self.component_count() * self.element().storage_size(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => write!(f, "{kind}"),
            Self::Vector { width, element } => write!(f, "vec{width}<{element}>"),
            Self::Matrix {
                cols,
                rows,
                element,
            } => write!(f, "mat{cols}x{rows}<{element}>"),
        }
    }
}
