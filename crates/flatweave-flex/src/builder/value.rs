//! Values waiting on the builder stack.

use crate::types::{pack_type, BitWidth, FlexType};

use super::FlexBuilder;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Payload {
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Absolute position of an already written payload
    Offset(usize),
}

/// A value that has been pushed but not yet placed in a container
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Value {
    pub(crate) payload: Payload,
    pub(crate) ty: FlexType,
    /// Inline types: narrowest width holding the value. Offset types: the
    /// width of the payload's own lengths and elements.
    pub(crate) min_width: BitWidth,
}

impl Value {
    pub(crate) fn null() -> Self {
        Self {
            payload: Payload::UInt(0),
            ty: FlexType::Null,
            min_width: BitWidth::W8,
        }
    }

    pub(crate) fn bool(value: bool) -> Self {
        Self {
            payload: Payload::UInt(value as u64),
            ty: FlexType::Bool,
            min_width: BitWidth::W8,
        }
    }

    pub(crate) fn int(value: i64) -> Self {
        Self {
            payload: Payload::Int(value),
            ty: FlexType::Int,
            min_width: BitWidth::for_i64(value),
        }
    }

    pub(crate) fn uint(value: u64) -> Self {
        Self {
            payload: Payload::UInt(value),
            ty: FlexType::UInt,
            min_width: BitWidth::for_u64(value),
        }
    }

    pub(crate) fn float(value: f64, width: BitWidth) -> Self {
        Self {
            payload: Payload::Float(value),
            ty: FlexType::Float,
            min_width: width,
        }
    }

    pub(crate) fn offset(ty: FlexType, target: usize, width: BitWidth) -> Self {
        Self {
            payload: Payload::Offset(target),
            ty,
            min_width: width,
        }
    }

    /// Width this value needs as element `elem_index` of a container whose
    /// body starts at the (not yet aligned) end of the buffer
    ///
    /// Offsets are relative, so whether one fits a width depends on where it
    /// will be written, which in turn depends on the width. Each width is
    /// tried in turn.
    pub(crate) fn elem_width(&self, buf_len: usize, elem_index: usize) -> BitWidth {
        let Payload::Offset(target) = self.payload else {
            return self.min_width;
        };
        for width in BitWidth::ALL {
            let bw = width.byte_width();
            let slot = buf_len + padding_bytes(buf_len, bw) + elem_index * bw;
            if BitWidth::for_u64((slot - target) as u64) <= width {
                return width;
            }
        }
        BitWidth::W64
    }

    /// Width recorded in the type byte when stored in a `parent` wide slot
    pub(crate) fn stored_width(&self, parent: BitWidth) -> BitWidth {
        if self.ty.is_inline() {
            self.min_width.max(parent)
        } else {
            self.min_width
        }
    }

    pub(crate) fn stored_packed_type(&self, parent: BitWidth) -> u8 {
        pack_type(self.ty, self.stored_width(parent))
    }
}

pub(crate) fn padding_bytes(len: usize, alignment: usize) -> usize {
    len.wrapping_neg() & (alignment - 1)
}

/// A handle to a value already pushed, for pushing it again
///
/// Obtained from [`FlexBuilder::last_value`]. Reusing a string, blob or
/// container stores a second offset to the same payload instead of a copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackValue(pub(crate) Value);

/// One value for the slice-based helpers
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum Element<'a> {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(&'a str),
    Blob(&'a [u8]),
}

macro_rules! impl_element_from {
    ($($ty:ty => $variant:ident as $conv:ty),* $(,)?) => {
        $(
            impl<'a> From<$ty> for Element<'a> {
                fn from(value: $ty) -> Self {
                    Element::$variant(value as $conv)
                }
            }
        )*
    };
}

impl_element_from!(
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
);

impl<'a> From<bool> for Element<'a> {
    fn from(value: bool) -> Self {
        Element::Bool(value)
    }
}

impl<'a> From<&'a str> for Element<'a> {
    fn from(value: &'a str) -> Self {
        Element::String(value)
    }
}

impl<'a> From<&'a [u8]> for Element<'a> {
    fn from(value: &'a [u8]) -> Self {
        Element::Blob(value)
    }
}

impl<'a, T: Into<Element<'a>>> From<Option<T>> for Element<'a> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Element::Null, Into::into)
    }
}

/// A Rust scalar that can fill a typed vector
pub trait FlexScalar: Copy {
    /// Element type in the buffer
    const TYPE: FlexType;

    /// Pushes the value onto the builder stack
    fn push_into(self, builder: &mut FlexBuilder);
}

macro_rules! impl_flex_scalar {
    ($($ty:ty => $kind:ident, $method:ident as $conv:ty);* $(;)?) => {
        $(
            impl FlexScalar for $ty {
                const TYPE: FlexType = FlexType::$kind;

                fn push_into(self, builder: &mut FlexBuilder) {
                    builder.$method(self as $conv);
                }
            }
        )*
    };
}

impl_flex_scalar! {
    i8 => Int, int as i64;
    i16 => Int, int as i64;
    i32 => Int, int as i64;
    i64 => Int, int as i64;
    u8 => UInt, uint as u64;
    u16 => UInt, uint as u64;
    u32 => UInt, uint as u64;
    u64 => UInt, uint as u64;
    f32 => Float, float as f64;
    f64 => Float, float as f64;
}

impl FlexScalar for bool {
    const TYPE: FlexType = FlexType::Bool;

    fn push_into(self, builder: &mut FlexBuilder) {
        builder.bool(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inline_widths() {
        assert_eq!(Value::int(-129).min_width, BitWidth::W16);
        assert_eq!(Value::uint(65_536).min_width, BitWidth::W32);
        assert_eq!(Value::bool(true).elem_width(1000, 7), BitWidth::W8);
    }

    #[test]
    fn test_offset_elem_width_grows_with_distance() {
        let near = Value::offset(FlexType::String, 10, BitWidth::W8);
        assert_eq!(near.elem_width(12, 1), BitWidth::W8);

        // 300 bytes back does not fit one byte, fits two once aligned
        let far = Value::offset(FlexType::String, 0, BitWidth::W8);
        assert_eq!(far.elem_width(299, 1), BitWidth::W16);
        assert_eq!(far.elem_width(70_000, 0), BitWidth::W32);
    }

    #[test]
    fn test_stored_width() {
        assert_eq!(Value::int(1).stored_packed_type(BitWidth::W64), 7);
        assert_eq!(Value::bool(true).stored_packed_type(BitWidth::W8), 104);
        let string = Value::offset(FlexType::String, 0, BitWidth::W8);
        assert_eq!(string.stored_packed_type(BitWidth::W64), 20);
    }

    #[test]
    fn test_padding() {
        assert_eq!(padding_bytes(5, 8), 3);
        assert_eq!(padding_bytes(8, 8), 0);
        assert_eq!(padding_bytes(7, 1), 0);
    }

    #[test]
    fn test_element_conversions() {
        assert_eq!(Element::from(3u8), Element::UInt(3));
        assert_eq!(Element::from(-3i16), Element::Int(-3));
        assert_eq!(Element::from("x"), Element::String("x"));
        assert_eq!(Element::from(None::<i32>), Element::Null);
        assert_eq!(Element::from(Some(true)), Element::Bool(true));
    }
}
