//! Typed positions of objects written by the builder.

use std::fmt;
use std::marker::PhantomData;

use crate::buffer::UOffset;

/// Position of an already-written object, measured from the end of the
/// buffer
///
/// The type parameter records what was written there so that, for example, a
/// string cannot be passed where a table is expected.
pub struct Offset<T> {
    value: UOffset,
    marker: PhantomData<T>,
}

impl<T> Offset<T> {
    /// Wraps a raw position
    pub fn new(value: UOffset) -> Self {
        Self {
            value,
            marker: PhantomData,
        }
    }

    /// Raw distance from the end of the buffer
    pub fn value(self) -> UOffset {
        self.value
    }
}

// Manual impls: derives would require `T` itself to implement each trait.
impl<T> Clone for Offset<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Offset<T> {}

impl<T> PartialEq for Offset<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Offset<T> {}

impl<T> fmt::Debug for Offset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Offset").field(&self.value).finish()
    }
}

/// Marks an [`Offset`] to a table
#[derive(Debug)]
pub enum TableMarker {}

/// Marks an [`Offset`] to a string or byte string
#[derive(Debug)]
pub enum StringMarker {}

/// Marks an [`Offset`] to an inline struct
#[derive(Debug)]
pub enum StructMarker {}

/// Marks an [`Offset`] to a vector of `T`
#[derive(Debug)]
pub struct VectorMarker<T>(PhantomData<T>);

/// Position of a finished table
pub type TableOffset = Offset<TableMarker>;

/// Position of a string
pub type StringOffset = Offset<StringMarker>;

/// Position of an inline struct
pub type StructOffset = Offset<StructMarker>;

/// Position of a vector of `T`
pub type VectorOffset<T> = Offset<VectorMarker<T>>;
