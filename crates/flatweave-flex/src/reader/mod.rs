//! Zero-copy FlexBuffer reader.
//!
//! A [`Reference`] is a typed view of one value: where its slot is, how wide
//! the slot is and the packed type byte describing it. Nothing is decoded
//! until an accessor asks for it.
//!
//! Two families of accessors exist. The `get_*` methods are strict and
//! return an error when the type does not match. The `as_*` methods coerce
//! where a sensible conversion exists and fall back to a zero value
//! otherwise, so they never fail.

mod json;
mod map;
mod vector;

use std::fmt;

use crate::error::{Error, Result};
use crate::types::{unpack_type, BitWidth, FlexType};

pub use map::{MapIter, MapReader};
pub use vector::{VectorIter, VectorReader};

/// Bytes `start..start + len`, or an error naming the range
pub(crate) fn bytes_at(buf: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    start
        .checked_add(len)
        .and_then(|end| buf.get(start..end))
        .ok_or_else(|| Error::out_of_bounds(start, len, buf.len()))
}

pub(crate) fn read_uint(buf: &[u8], pos: usize, width: BitWidth) -> Result<u64> {
    let bytes = bytes_at(buf, pos, width.byte_width())?;
    let mut raw = [0u8; 8];
    raw[..bytes.len()].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(raw))
}

pub(crate) fn read_int(buf: &[u8], pos: usize, width: BitWidth) -> Result<i64> {
    let raw = read_uint(buf, pos, width)?;
    let shift = 64 - 8 * width.byte_width() as u32;
    Ok(((raw << shift) as i64) >> shift)
}

pub(crate) fn read_float(buf: &[u8], pos: usize, width: BitWidth) -> Result<f64> {
    match width {
        BitWidth::W32 => Ok(f32::from_bits(read_uint(buf, pos, width)? as u32) as f64),
        BitWidth::W64 => Ok(f64::from_bits(read_uint(buf, pos, width)?)),
        narrow => Err(Error::InvalidWidth {
            width: narrow.byte_width() as u64,
            position: pos,
        }),
    }
}

/// Follows the backwards offset stored at `pos`
pub(crate) fn indirect(buf: &[u8], pos: usize, width: BitWidth) -> Result<usize> {
    let offset = read_uint(buf, pos, width)?;
    usize::try_from(offset)
        .ok()
        .and_then(|offset| pos.checked_sub(offset))
        .ok_or(Error::InvalidOffset { position: pos })
}

/// Reads a width stored as a byte count (1, 2, 4 or 8)
pub(crate) fn read_width(buf: &[u8], pos: usize, width: BitWidth) -> Result<BitWidth> {
    let stored = read_uint(buf, pos, width)?;
    usize::try_from(stored)
        .ok()
        .and_then(BitWidth::from_byte_width)
        .ok_or(Error::InvalidWidth {
            width: stored,
            position: pos,
        })
}

/// Bytes of the NUL-terminated string at `pos`, without the terminator
pub(crate) fn c_str_at(buf: &[u8], pos: usize) -> Result<&[u8]> {
    let rest = buf
        .get(pos..)
        .ok_or_else(|| Error::out_of_bounds(pos, 1, buf.len()))?;
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::out_of_bounds(pos, rest.len() + 1, buf.len()))?;
    Ok(&rest[..end])
}

fn utf8(bytes: &[u8], position: usize) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|source| Error::Utf8 { position, source })
}

/// A number decoded from any numeric-looking value
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    UInt(u64),
    Float(f64),
}

/// A view of one value in a FlexBuffer
#[derive(Clone, Copy)]
pub struct Reference<'a> {
    buf: &'a [u8],
    /// Position of the value's slot in its parent
    offset: usize,
    /// Width of that slot
    parent_width: BitWidth,
    /// The value's own width, from its type byte
    width: BitWidth,
    ty: FlexType,
}

impl fmt::Debug for Reference<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("type", &self.ty)
            .field("width", &self.width)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<'a> Reference<'a> {
    /// The root value of a finished buffer
    ///
    /// The buffer ends with the root slot, its packed type byte and the
    /// root slot width. Only that trailer is checked here; the value itself
    /// is read lazily.
    pub fn root(buf: &'a [u8]) -> Result<Self> {
        let len = buf.len();
        if len < 3 {
            return Err(Error::BufferTooShort { len });
        }
        let root_width = buf[len - 1];
        let parent_width =
            BitWidth::from_byte_width(root_width as usize).ok_or(Error::InvalidRootWidth(root_width))?;
        let packed = buf[len - 2];
        let offset = (len - 2)
            .checked_sub(root_width as usize)
            .ok_or(Error::BufferTooShort { len })?;
        Self::from_packed(buf, offset, parent_width, packed)
    }

    pub(crate) fn from_packed(buf: &'a [u8], offset: usize, parent_width: BitWidth, packed: u8) -> Result<Self> {
        let (ty, width) = unpack_type(packed)?;
        Ok(Self::new(buf, offset, parent_width, width, ty))
    }

    pub(crate) fn new(
        buf: &'a [u8],
        offset: usize,
        parent_width: BitWidth,
        width: BitWidth,
        ty: FlexType,
    ) -> Self {
        Self {
            buf,
            offset,
            parent_width,
            width,
            ty,
        }
    }

    /// The value's type
    pub fn flex_type(&self) -> FlexType {
        self.ty
    }

    /// The value's own width from its type byte
    pub fn bit_width(&self) -> BitWidth {
        self.width
    }

    pub(crate) fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn parent_width(&self) -> BitWidth {
        self.parent_width
    }

    /// Position of the out-of-line payload
    pub(crate) fn target(&self) -> Result<usize> {
        indirect(self.buf, self.offset, self.parent_width)
    }

    #[allow(missing_docs)]
    pub fn is_null(&self) -> bool {
        self.ty == FlexType::Null
    }

    #[allow(missing_docs)]
    pub fn is_bool(&self) -> bool {
        self.ty == FlexType::Bool
    }

    /// Signed integer, inline or indirect
    pub fn is_int(&self) -> bool {
        matches!(self.ty, FlexType::Int | FlexType::IndirectInt)
    }

    /// Unsigned integer, inline or indirect
    pub fn is_uint(&self) -> bool {
        matches!(self.ty, FlexType::UInt | FlexType::IndirectUInt)
    }

    /// Float, inline or indirect
    pub fn is_float(&self) -> bool {
        matches!(self.ty, FlexType::Float | FlexType::IndirectFloat)
    }

    /// Any integer or float
    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_uint() || self.is_float()
    }

    #[allow(missing_docs)]
    pub fn is_string(&self) -> bool {
        self.ty == FlexType::String
    }

    #[allow(missing_docs)]
    pub fn is_key(&self) -> bool {
        self.ty == FlexType::Key
    }

    #[allow(missing_docs)]
    pub fn is_blob(&self) -> bool {
        self.ty == FlexType::Blob
    }

    /// Any vector, typed or not; maps excluded
    pub fn is_vector(&self) -> bool {
        self.ty.is_vector()
    }

    #[allow(missing_docs)]
    pub fn is_map(&self) -> bool {
        self.ty == FlexType::Map
    }

    // ---- strict accessors ----

    /// The boolean value
    pub fn get_bool(&self) -> Result<bool> {
        match self.ty {
            FlexType::Bool => Ok(read_uint(self.buf, self.offset, self.parent_width)? != 0),
            found => Err(Error::mismatch("bool", found)),
        }
    }

    /// A signed integer value
    pub fn get_i64(&self) -> Result<i64> {
        match self.ty {
            FlexType::Int => read_int(self.buf, self.offset, self.parent_width),
            FlexType::IndirectInt => read_int(self.buf, self.target()?, self.width),
            found => Err(Error::mismatch("int", found)),
        }
    }

    /// An unsigned integer value
    pub fn get_u64(&self) -> Result<u64> {
        match self.ty {
            FlexType::UInt => read_uint(self.buf, self.offset, self.parent_width),
            FlexType::IndirectUInt => read_uint(self.buf, self.target()?, self.width),
            found => Err(Error::mismatch("uint", found)),
        }
    }

    /// A float value
    pub fn get_f64(&self) -> Result<f64> {
        match self.ty {
            FlexType::Float => read_float(self.buf, self.offset, self.parent_width),
            FlexType::IndirectFloat => read_float(self.buf, self.target()?, self.width),
            found => Err(Error::mismatch("float", found)),
        }
    }

    /// A string or key
    pub fn get_str(&self) -> Result<&'a str> {
        match self.ty {
            FlexType::String => {
                let bytes = self.sized_payload()?;
                utf8(bytes, self.target()?)
            }
            FlexType::Key => self.get_key(),
            found => Err(Error::mismatch("string", found)),
        }
    }

    /// A map key
    pub fn get_key(&self) -> Result<&'a str> {
        match self.ty {
            FlexType::Key => {
                let target = self.target()?;
                utf8(c_str_at(self.buf, target)?, target)
            }
            found => Err(Error::mismatch("key", found)),
        }
    }

    pub(crate) fn key_bytes(&self) -> Result<&'a [u8]> {
        c_str_at(self.buf, self.target()?)
    }

    /// A blob's bytes; strings are accepted too
    pub fn get_blob(&self) -> Result<&'a [u8]> {
        match self.ty {
            FlexType::Blob | FlexType::String => self.sized_payload(),
            found => Err(Error::mismatch("blob", found)),
        }
    }

    /// Length-prefixed payload of a string or blob
    fn sized_payload(&self) -> Result<&'a [u8]> {
        let target = self.target()?;
        let bw = self.width.byte_width();
        let prefix = target
            .checked_sub(bw)
            .ok_or(Error::InvalidOffset { position: self.offset })?;
        let len = read_uint(self.buf, prefix, self.width)?;
        let len = usize::try_from(len).map_err(|_| Error::out_of_bounds(target, usize::MAX, self.buf.len()))?;
        bytes_at(self.buf, target, len)
    }

    /// A vector, typed vector or the values of a map
    pub fn get_vector(&self) -> Result<VectorReader<'a>> {
        VectorReader::from_reference(self)
    }

    /// A map
    pub fn get_map(&self) -> Result<MapReader<'a>> {
        MapReader::from_reference(self)
    }

    // ---- lenient accessors ----

    fn number(&self) -> Option<Number> {
        match self.ty {
            FlexType::Int | FlexType::IndirectInt => self.get_i64().ok().map(Number::Int),
            FlexType::UInt | FlexType::IndirectUInt => self.get_u64().ok().map(Number::UInt),
            FlexType::Float | FlexType::IndirectFloat => self.get_f64().ok().map(Number::Float),
            FlexType::Bool => self.get_bool().ok().map(|b| Number::UInt(b as u64)),
            FlexType::String => {
                let text = self.get_str().ok()?.trim();
                text.parse()
                    .map(Number::Int)
                    .or_else(|_| text.parse().map(Number::UInt))
                    .or_else(|_| text.parse().map(Number::Float))
                    .ok()
            }
            ty if ty.is_vector() || ty == FlexType::Map => {
                self.get_vector().ok().map(|v| Number::UInt(v.len() as u64))
            }
            _ => None,
        }
    }

    /// The value as a signed integer
    ///
    /// Floats truncate, strings are parsed, vectors and maps give their
    /// length. Anything else is 0.
    pub fn as_i64(&self) -> i64 {
        match self.number() {
            Some(Number::Int(i)) => i,
            Some(Number::UInt(u)) => u as i64,
            Some(Number::Float(f)) => f as i64,
            None => 0,
        }
    }

    /// The value as an unsigned integer, with the same coercions as
    /// [`as_i64`](Self::as_i64)
    pub fn as_u64(&self) -> u64 {
        match self.number() {
            Some(Number::Int(i)) => i as u64,
            Some(Number::UInt(u)) => u,
            Some(Number::Float(f)) => f as u64,
            None => 0,
        }
    }

    /// The value as a float, with the same coercions as
    /// [`as_i64`](Self::as_i64)
    pub fn as_f64(&self) -> f64 {
        match self.number() {
            Some(Number::Int(i)) => i as f64,
            Some(Number::UInt(u)) => u as f64,
            Some(Number::Float(f)) => f,
            None => 0.0,
        }
    }

    /// Booleans as stored; anything else is true when its
    /// [`as_u64`](Self::as_u64) is non-zero
    pub fn as_bool(&self) -> bool {
        match self.ty {
            FlexType::Bool => self.get_bool().unwrap_or(false),
            _ => self.as_u64() != 0,
        }
    }

    /// String or key text, or `""`
    pub fn as_str(&self) -> &'a str {
        self.get_str().unwrap_or("")
    }

    /// Blob or string bytes, or an empty slice
    pub fn as_blob(&self) -> &'a [u8] {
        self.get_blob().unwrap_or(&[])
    }

    /// The vector, or an empty one
    pub fn as_vector(&self) -> VectorReader<'a> {
        self.get_vector().unwrap_or_else(|_| VectorReader::empty(self.buf))
    }

    /// The map, or an empty one
    pub fn as_map(&self) -> MapReader<'a> {
        self.get_map().unwrap_or_else(|_| MapReader::empty(self.buf))
    }
}

impl fmt::Display for Reference<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}
