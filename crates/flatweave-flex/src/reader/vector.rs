use std::fmt;

use crate::error::{Error, Result};
use crate::types::{BitWidth, FlexType};

use super::{bytes_at, read_uint, Reference};

/// A view of an untyped, typed or fixed typed vector
///
/// Untyped vectors keep one type byte per element after the element slots.
/// Typed vectors share a single element type and fixed typed vectors also
/// drop the length prefix.
#[derive(Clone, Copy)]
pub struct VectorReader<'a> {
    buf: &'a [u8],
    /// First element slot
    data: usize,
    len: usize,
    width: BitWidth,
    /// Element type of a typed vector, `None` when each element carries its own
    element: Option<FlexType>,
}

impl fmt::Debug for VectorReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorReader")
            .field("len", &self.len)
            .field("width", &self.width)
            .field("element", &self.element)
            .finish()
    }
}

/// Reads the length stored just before `data`
pub(crate) fn read_len(buf: &[u8], data: usize, width: BitWidth) -> Result<usize> {
    let prefix = data
        .checked_sub(width.byte_width())
        .ok_or(Error::InvalidOffset { position: data })?;
    let len = read_uint(buf, prefix, width)?;
    usize::try_from(len).map_err(|_| Error::out_of_bounds(data, usize::MAX, buf.len()))
}

impl<'a> VectorReader<'a> {
    pub(super) fn from_reference(r: &Reference<'a>) -> Result<Self> {
        let ty = r.flex_type();
        let buf = r.buffer();
        let width = r.bit_width();
        if ty == FlexType::Vector || ty == FlexType::Map {
            let data = r.target()?;
            let len = read_len(buf, data, width)?;
            Self::new(buf, data, len, width, None)
        } else if ty.is_typed_vector() {
            let data = r.target()?;
            let len = read_len(buf, data, width)?;
            Self::new(buf, data, len, width, ty.typed_vector_element())
        } else if ty.is_fixed_typed_vector() {
            let data = r.target()?;
            Self::new(buf, data, ty.fixed_len(), width, ty.typed_vector_element())
        } else {
            Err(Error::mismatch("vector", ty))
        }
    }

    /// Checks that every slot, and the type bytes of an untyped vector, lie
    /// inside the buffer
    pub(crate) fn new(
        buf: &'a [u8],
        data: usize,
        len: usize,
        width: BitWidth,
        element: Option<FlexType>,
    ) -> Result<Self> {
        let per_element = width.byte_width() + usize::from(element.is_none());
        let span = len
            .checked_mul(per_element)
            .ok_or_else(|| Error::out_of_bounds(data, usize::MAX, buf.len()))?;
        bytes_at(buf, data, span)?;
        Ok(Self {
            buf,
            data,
            len,
            width,
            element,
        })
    }

    /// A vector with no elements
    pub fn empty(buf: &'a [u8]) -> Self {
        Self {
            buf,
            data: 0,
            len: 0,
            width: BitWidth::W8,
            element: None,
        }
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Width of each element slot in bytes
    pub fn byte_width(&self) -> usize {
        self.width.byte_width()
    }

    /// Shared element type, for typed vectors only
    pub fn element_type(&self) -> Option<FlexType> {
        self.element
    }

    /// The element at `index`
    pub fn get(&self, index: usize) -> Result<Reference<'a>> {
        if index >= self.len {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        let slot = self.data + index * self.width.byte_width();
        match self.element {
            Some(ty) => Ok(Reference::new(self.buf, slot, self.width, BitWidth::W8, ty)),
            None => {
                let packed = self.buf[self.data + self.len * self.width.byte_width() + index];
                Reference::from_packed(self.buf, slot, self.width, packed)
            }
        }
    }

    /// Elements in order
    pub fn iter(&self) -> VectorIter<'a> {
        VectorIter {
            vector: *self,
            index: 0,
        }
    }
}

impl<'a> IntoIterator for VectorReader<'a> {
    type Item = Result<Reference<'a>>;
    type IntoIter = VectorIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the elements of a [`VectorReader`]
#[derive(Debug, Clone)]
pub struct VectorIter<'a> {
    vector: VectorReader<'a>,
    index: usize,
}

impl<'a> Iterator for VectorIter<'a> {
    type Item = Result<Reference<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.vector.len {
            return None;
        }
        let item = self.vector.get(self.index);
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.len - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for VectorIter<'_> {}
