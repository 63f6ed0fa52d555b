//! Field descriptors: the `(field id, type, default)` triples through which
//! schema-driven code talks to the engine.
//!
//! Generated code normally calls the typed methods on
//! [`Builder`](crate::Builder) and [`Table`](crate::Table) directly. Code that
//! only knows its schema at runtime can describe each scalar field once with a
//! [`FieldDescriptor`] and go through [`Builder::add_field`](crate::Builder::add_field),
//! [`Table::read_field`](crate::Table::read_field) and
//! [`TableVerifier::visit_field`](crate::TableVerifier::visit_field).

use std::fmt;

/// Scalar types a table field can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `bool`, one byte
    Bool,
    /// `i8`
    I8,
    /// `u8`
    U8,
    /// `i16`
    I16,
    /// `u16`
    U16,
    /// `i32`
    I32,
    /// `u32`
    U32,
    /// `i64`
    I64,
    /// `u64`
    U64,
    /// `f32`
    F32,
    /// `f64`
    F64,
}

impl ScalarKind {
    /// Encoded width in bytes, which is also the alignment
    pub fn size(self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

/// A scalar value tagged with its type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    /// `bool`
    Bool(bool),
    /// `i8`
    I8(i8),
    /// `u8`
    U8(u8),
    /// `i16`
    I16(i16),
    /// `u16`
    U16(u16),
    /// `i32`
    I32(i32),
    /// `u32`
    U32(u32),
    /// `i64`
    I64(i64),
    /// `u64`
    U64(u64),
    /// `f32`
    F32(f32),
    /// `f64`
    F64(f64),
}

impl ScalarValue {
    /// Type tag of this value
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Bool(_) => ScalarKind::Bool,
            Self::I8(_) => ScalarKind::I8,
            Self::U8(_) => ScalarKind::U8,
            Self::I16(_) => ScalarKind::I16,
            Self::U16(_) => ScalarKind::U16,
            Self::I32(_) => ScalarKind::I32,
            Self::U32(_) => ScalarKind::U32,
            Self::I64(_) => ScalarKind::I64,
            Self::U64(_) => ScalarKind::U64,
            Self::F32(_) => ScalarKind::F32,
            Self::F64(_) => ScalarKind::F64,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ScalarValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_scalar!(
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);

/// Description of one scalar table field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    /// Slot index in the vtable
    pub id: u16,
    /// Value substituted when the field is absent; also fixes the field type
    pub default: ScalarValue,
    /// Whether verification should reject tables missing this field
    pub required: bool,
}

impl FieldDescriptor {
    /// Describes an optional field with the given default
    pub fn new(id: u16, default: impl Into<ScalarValue>) -> Self {
        Self {
            id,
            default: default.into(),
            required: false,
        }
    }

    /// Marks the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declared type of the field
    pub fn kind(&self) -> ScalarKind {
        self.default.kind()
    }
}
