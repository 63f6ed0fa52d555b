//! Little-endian scalar encoding shared by the builder, accessors and verifier.
//!
//! Every value in a flatweave buffer is stored little-endian at an address
//! aligned to its own size. Offsets come in three flavours:
//!
//! - `uoffset` (u32): forward reference from the slot holding it
//! - `soffset` (i32): table to vtable back-reference
//! - `voffset` (u16): field position inside a table, stored in vtables

/// Unsigned forward offset
pub type UOffset = u32;

/// Signed table to vtable offset
pub type SOffset = i32;

/// Offset stored inside a vtable
pub type VOffset = u16;

/// Byte width of a [`UOffset`]
pub const SIZE_UOFFSET: usize = 4;

/// Byte width of a [`SOffset`]
pub const SIZE_SOFFSET: usize = 4;

/// Byte width of a [`VOffset`]
pub const SIZE_VOFFSET: usize = 2;

/// Byte width of the optional size prefix
pub const SIZE_PREFIX_LENGTH: usize = 4;

/// Byte width of the optional file identifier
pub const FILE_IDENTIFIER_LENGTH: usize = 4;

/// A fixed-width value that can be stored in a buffer
///
/// Implemented for `bool`, the integer types up to 64 bits and both float
/// widths. `bool` is stored as a single byte, any non-zero byte reads as true.
pub trait Scalar: Copy + PartialEq + std::fmt::Debug {
    /// Encoded width in bytes (also the required alignment)
    const SIZE: usize;

    /// Writes `self` into the first `SIZE` bytes of `dst`
    fn write_le(self, dst: &mut [u8]);

    /// Reads a value from the first `SIZE` bytes of `src`
    fn read_le(src: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_le(self, dst: &mut [u8]) {
                    dst[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(src: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&src[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Scalar for bool {
    const SIZE: usize = 1;

    #[inline]
    fn write_le(self, dst: &mut [u8]) {
        dst[0] = u8::from(self);
    }

    #[inline]
    fn read_le(src: &[u8]) -> Self {
        src[0] != 0
    }
}

/// Reads a scalar at an absolute position
///
/// Panics if the value does not fit inside `buf`.
#[inline]
pub fn read_scalar<T: Scalar>(buf: &[u8], pos: usize) -> T {
    T::read_le(&buf[pos..pos + T::SIZE])
}

/// Overwrites a scalar at an absolute position
///
/// Panics if the value does not fit inside `buf`.
#[inline]
pub fn write_scalar<T: Scalar>(buf: &mut [u8], pos: usize, value: T) {
    value.write_le(&mut buf[pos..pos + T::SIZE]);
}

/// Number of zero bytes needed so that `len` becomes a multiple of `alignment`
///
/// `alignment` must be a power of two.
#[inline]
pub fn padding_bytes(len: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (!len).wrapping_add(1) & (alignment - 1)
}

/// Follows the uoffset stored at `pos` and returns the absolute target
#[inline]
pub(crate) fn follow_uoffset(buf: &[u8], pos: usize) -> usize {
    pos + read_scalar::<UOffset>(buf, pos) as usize
}
