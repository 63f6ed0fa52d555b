//! Fixed-layout structs: inline, no vtable, every field always present.

use crate::buffer::{read_scalar, Scalar};

/// A type with a fixed little-endian layout that can be stored inline
///
/// Implementations describe where each field lives; padding bytes must be
/// left as zero by [`write_to`](Self::write_to).
///
/// ```
/// use flatweave_core::{read_scalar, write_scalar, StructLayout};
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// struct Vec2 {
///     x: f32,
///     y: f32,
/// }
///
/// impl StructLayout for Vec2 {
///     const SIZE: usize = 8;
///     const ALIGNMENT: usize = 4;
///
///     fn write_to(&self, dst: &mut [u8]) {
///         write_scalar(dst, 0, self.x);
///         write_scalar(dst, 4, self.y);
///     }
///
///     fn read_from(src: &[u8]) -> Self {
///         Vec2 { x: read_scalar(src, 0), y: read_scalar(src, 4) }
///     }
/// }
/// ```
pub trait StructLayout: Sized {
    /// Total size in bytes, including trailing padding
    const SIZE: usize;

    /// Alignment of the widest field
    const ALIGNMENT: usize;

    /// Encodes `self` into `dst`, which is exactly `SIZE` zeroed bytes
    fn write_to(&self, dst: &mut [u8]);

    /// Decodes a value from `src`, which is exactly `SIZE` bytes
    fn read_from(src: &[u8]) -> Self;
}

/// Read-only view of a struct at a fixed position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Struct<'a> {
    buf: &'a [u8],
    loc: usize,
}

impl<'a> Struct<'a> {
    /// Wraps the struct starting at `loc`
    pub fn new(buf: &'a [u8], loc: usize) -> Self {
        Self { buf, loc }
    }

    /// Absolute position of the struct
    pub fn position(&self) -> usize {
        self.loc
    }

    /// Reads the scalar at `byte_offset` from the start of the struct
    pub fn get<T: Scalar>(&self, byte_offset: usize) -> T {
        read_scalar(self.buf, self.loc + byte_offset)
    }

    /// View of a struct nested at `byte_offset`
    pub fn get_struct(&self, byte_offset: usize) -> Struct<'a> {
        Struct::new(self.buf, self.loc + byte_offset)
    }

    /// Decodes the whole struct
    pub fn read<S: StructLayout>(&self) -> S {
        S::read_from(&self.buf[self.loc..self.loc + S::SIZE])
    }
}
