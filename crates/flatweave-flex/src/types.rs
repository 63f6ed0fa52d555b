//! Type codes and bit widths.
//!
//! Every value carries a packed type byte `(type << 2) | bit_width`. Inline
//! types store the value itself in their slot, everything else stores an
//! unsigned offset pointing backwards to its payload.

use crate::error::{Error, Result};

/// The type of a FlexBuffer value
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum FlexType {
    Null = 0,
    Int = 1,
    UInt = 2,
    Float = 3,
    Key = 4,
    String = 5,
    IndirectInt = 6,
    IndirectUInt = 7,
    IndirectFloat = 8,
    Map = 9,
    Vector = 10,
    VectorInt = 11,
    VectorUInt = 12,
    VectorFloat = 13,
    VectorKey = 14,
    /// Typed vector of strings; readable but never written
    VectorString = 15,
    VectorInt2 = 16,
    VectorUInt2 = 17,
    VectorFloat2 = 18,
    VectorInt3 = 19,
    VectorUInt3 = 20,
    VectorFloat3 = 21,
    VectorInt4 = 22,
    VectorUInt4 = 23,
    VectorFloat4 = 24,
    Blob = 25,
    Bool = 26,
    VectorBool = 36,
}

impl TryFrom<u8> for FlexType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        use FlexType::*;
        const TABLE: [FlexType; 27] = [
            Null, Int, UInt, Float, Key, String, IndirectInt, IndirectUInt, IndirectFloat, Map,
            Vector, VectorInt, VectorUInt, VectorFloat, VectorKey, VectorString, VectorInt2,
            VectorUInt2, VectorFloat2, VectorInt3, VectorUInt3, VectorFloat3, VectorInt4,
            VectorUInt4, VectorFloat4, Blob, Bool,
        ];
        match value {
            36 => Ok(VectorBool),
            v => TABLE
                .get(v as usize)
                .copied()
                .ok_or(Error::UnknownType(v)),
        }
    }
}

impl FlexType {
    /// Stored directly in the parent's slot
    pub fn is_inline(self) -> bool {
        matches!(self, Self::Null | Self::Bool | Self::Int | Self::UInt | Self::Float)
    }

    /// May appear as the element type of a typed vector
    pub fn is_typed_vector_element(self) -> bool {
        matches!(
            self,
            Self::Int | Self::UInt | Self::Float | Self::Key | Self::String | Self::Bool
        )
    }

    /// A variable-length typed vector
    pub fn is_typed_vector(self) -> bool {
        (Self::VectorInt..=Self::VectorString).contains(&self) || self == Self::VectorBool
    }

    /// A typed vector of 2, 3 or 4 elements without a length prefix
    pub fn is_fixed_typed_vector(self) -> bool {
        (Self::VectorInt2..=Self::VectorFloat4).contains(&self)
    }

    /// Any vector type, typed or not, but not a map
    pub fn is_vector(self) -> bool {
        self == Self::Vector || self.is_typed_vector() || self.is_fixed_typed_vector()
    }

    /// The typed vector type holding `element`, fixed to `fixed_len` elements
    /// when non-zero
    pub fn typed_vector_of(element: FlexType, fixed_len: usize) -> Option<FlexType> {
        match (fixed_len, element) {
            (0, Self::Bool) => Some(Self::VectorBool),
            (0, e) if e.is_typed_vector_element() => {
                Self::try_from(e as u8 - Self::Int as u8 + Self::VectorInt as u8).ok()
            }
            (2..=4, Self::Int | Self::UInt | Self::Float) => {
                let code = Self::VectorInt2 as u8
                    + (fixed_len as u8 - 2) * 3
                    + (element as u8 - Self::Int as u8);
                Self::try_from(code).ok()
            }
            _ => None,
        }
    }

    /// Element type of a typed or fixed typed vector
    ///
    /// Elements of the deprecated `VectorString` read as keys: their length
    /// prefixes may be wider than the vector's slots, the terminator is not.
    pub fn typed_vector_element(self) -> Option<FlexType> {
        if self == Self::VectorBool {
            Some(Self::Bool)
        } else if self == Self::VectorString {
            Some(Self::Key)
        } else if self.is_typed_vector() {
            Self::try_from(self as u8 - Self::VectorInt as u8 + Self::Int as u8).ok()
        } else if self.is_fixed_typed_vector() {
            Self::try_from((self as u8 - Self::VectorInt2 as u8) % 3 + Self::Int as u8).ok()
        } else {
            None
        }
    }

    /// Element count of a fixed typed vector, 0 for every other type
    pub fn fixed_len(self) -> usize {
        if self.is_fixed_typed_vector() {
            (self as u8 - Self::VectorInt2 as u8) as usize / 3 + 2
        } else {
            0
        }
    }
}

/// Storage width of a value, offset or length
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum BitWidth {
    /// 1 byte
    #[default]
    W8 = 0,
    /// 2 bytes
    W16 = 1,
    /// 4 bytes
    W32 = 2,
    /// 8 bytes
    W64 = 3,
}

impl BitWidth {
    /// All widths, narrowest first
    pub const ALL: [BitWidth; 4] = [Self::W8, Self::W16, Self::W32, Self::W64];

    /// Number of bytes
    pub fn byte_width(self) -> usize {
        1 << self as u8
    }

    /// The width occupying `bytes` bytes
    pub fn from_byte_width(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(Self::W8),
            2 => Some(Self::W16),
            4 => Some(Self::W32),
            8 => Some(Self::W64),
            _ => None,
        }
    }

    /// Narrowest width holding an unsigned value
    pub fn for_u64(value: u64) -> Self {
        if value <= u8::MAX as u64 {
            Self::W8
        } else if value <= u16::MAX as u64 {
            Self::W16
        } else if value <= u32::MAX as u64 {
            Self::W32
        } else {
            Self::W64
        }
    }

    /// Narrowest width holding a signed value
    pub fn for_i64(value: i64) -> Self {
        if i8::try_from(value).is_ok() {
            Self::W8
        } else if i16::try_from(value).is_ok() {
            Self::W16
        } else if i32::try_from(value).is_ok() {
            Self::W32
        } else {
            Self::W64
        }
    }

    /// `W32` when the value survives a round trip through `f32`
    pub fn for_f64(value: f64) -> Self {
        if (value as f32) as f64 == value {
            Self::W32
        } else {
            Self::W64
        }
    }
}

/// Packs a type and width into one type byte
pub fn pack_type(ty: FlexType, width: BitWidth) -> u8 {
    (ty as u8) << 2 | width as u8
}

/// Splits a type byte into its type and width
pub fn unpack_type(packed: u8) -> Result<(FlexType, BitWidth)> {
    let ty = FlexType::try_from(packed >> 2)?;
    let width = BitWidth::ALL[(packed & 3) as usize];
    Ok((ty, width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_try_from_covers_every_code() {
        for code in 0..=26u8 {
            assert_eq!(FlexType::try_from(code).map(|t| t as u8), Ok(code));
        }
        assert_eq!(FlexType::try_from(36), Ok(FlexType::VectorBool));
        assert_eq!(FlexType::try_from(27), Err(Error::UnknownType(27)));
        assert_eq!(FlexType::try_from(35), Err(Error::UnknownType(35)));
    }

    #[test]
    fn test_typed_vector_mapping() {
        assert_eq!(FlexType::typed_vector_of(FlexType::Int, 0), Some(FlexType::VectorInt));
        assert_eq!(FlexType::typed_vector_of(FlexType::Key, 0), Some(FlexType::VectorKey));
        assert_eq!(FlexType::typed_vector_of(FlexType::Bool, 0), Some(FlexType::VectorBool));
        assert_eq!(FlexType::typed_vector_of(FlexType::UInt, 4), Some(FlexType::VectorUInt4));
        assert_eq!(FlexType::typed_vector_of(FlexType::Float, 3), Some(FlexType::VectorFloat3));
        assert_eq!(FlexType::typed_vector_of(FlexType::Key, 2), None);
        assert_eq!(FlexType::typed_vector_of(FlexType::Map, 0), None);

        assert_eq!(FlexType::VectorFloat3.typed_vector_element(), Some(FlexType::Float));
        assert_eq!(FlexType::VectorUInt2.typed_vector_element(), Some(FlexType::UInt));
        assert_eq!(FlexType::VectorString.typed_vector_element(), Some(FlexType::Key));
        assert_eq!(FlexType::VectorBool.typed_vector_element(), Some(FlexType::Bool));
        assert_eq!(FlexType::Vector.typed_vector_element(), None);

        assert_eq!(FlexType::VectorInt4.fixed_len(), 4);
        assert_eq!(FlexType::VectorFloat2.fixed_len(), 2);
        assert_eq!(FlexType::VectorInt.fixed_len(), 0);
    }

    #[test]
    fn test_width_selection() {
        assert_eq!(BitWidth::for_i64(127), BitWidth::W8);
        assert_eq!(BitWidth::for_i64(-128), BitWidth::W8);
        assert_eq!(BitWidth::for_i64(128), BitWidth::W16);
        assert_eq!(BitWidth::for_i64(300), BitWidth::W16);
        assert_eq!(BitWidth::for_i64(100_000), BitWidth::W32);
        assert_eq!(BitWidth::for_i64(i64::from(i32::MIN) - 1), BitWidth::W64);

        assert_eq!(BitWidth::for_u64(255), BitWidth::W8);
        assert_eq!(BitWidth::for_u64(256), BitWidth::W16);
        assert_eq!(BitWidth::for_u64(u64::from(u32::MAX)), BitWidth::W32);
        assert_eq!(BitWidth::for_u64(u64::MAX), BitWidth::W64);

        assert_eq!(BitWidth::for_f64(4.5), BitWidth::W32);
        assert_eq!(BitWidth::for_f64(0.1), BitWidth::W64);
    }

    #[test]
    fn test_pack_unpack() {
        assert_eq!(pack_type(FlexType::Map, BitWidth::W8), 36);
        assert_eq!(pack_type(FlexType::Int, BitWidth::W16), 5);
        assert_eq!(unpack_type(15), Ok((FlexType::Float, BitWidth::W64)));
        assert_eq!(unpack_type(144), Ok((FlexType::VectorBool, BitWidth::W8)));
        assert_eq!(unpack_type(27 << 2), Err(Error::UnknownType(27)));
    }
}
