//! Zero-copy views over length-prefixed vectors.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

use super::structs::{Struct, StructLayout};
use super::{read_str, Table};
use crate::buffer::{follow_uoffset, read_scalar, UOffset, SIZE_UOFFSET};

/// An element type that can be read out of a vector
///
/// Scalars are stored inline; strings and tables are stored as uoffsets to
/// their payloads.
pub trait VectorElement<'a>: Sized {
    /// Bytes each element occupies in the vector body
    const SIZE: usize;

    /// Reads the element whose slot starts at `pos`
    fn read(buf: &'a [u8], pos: usize) -> Self;
}

macro_rules! impl_scalar_element {
    ($($ty:ty),* $(,)?) => {
        $(
            impl<'a> VectorElement<'a> for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn read(buf: &'a [u8], pos: usize) -> Self {
                    read_scalar(buf, pos)
                }
            }
        )*
    };
}

impl_scalar_element!(bool, u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl<'a> VectorElement<'a> for &'a str {
    const SIZE: usize = SIZE_UOFFSET;

    fn read(buf: &'a [u8], pos: usize) -> Self {
        read_str(buf, follow_uoffset(buf, pos))
    }
}

impl<'a> VectorElement<'a> for Table<'a> {
    const SIZE: usize = SIZE_UOFFSET;

    fn read(buf: &'a [u8], pos: usize) -> Self {
        Table::new(buf, follow_uoffset(buf, pos))
    }
}

/// A vector of scalars, strings or tables
pub struct Vector<'a, T> {
    buf: &'a [u8],
    loc: usize,
    marker: PhantomData<T>,
}

impl<'a, T> Clone for Vector<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for Vector<'a, T> {}

impl<'a, T> fmt::Debug for Vector<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vector")
            .field("loc", &self.loc)
            .field("len", &self.len())
            .finish()
    }
}

impl<'a, T> Vector<'a, T> {
    /// Number of elements
    pub fn len(&self) -> usize {
        read_scalar::<UOffset>(self.buf, self.loc) as usize
    }

    /// Returns true if the vector has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absolute position of the length prefix
    pub fn position(&self) -> usize {
        self.loc
    }
}

impl<'a, T: VectorElement<'a>> Vector<'a, T> {
    /// Wraps the vector whose length prefix is at `loc`
    pub fn new(buf: &'a [u8], loc: usize) -> Self {
        Self {
            buf,
            loc,
            marker: PhantomData,
        }
    }

    /// Element at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> T {
        let len = self.len();
        assert!(index < len, "index {index} out of bounds for vector of {len}");
        T::read(self.buf, self.element_position(index))
    }

    /// Iterates over the elements in order
    pub fn iter(&self) -> VectorIter<'a, T> {
        VectorIter {
            vector: *self,
            next: 0,
            end: self.len(),
        }
    }

    fn element_position(&self, index: usize) -> usize {
        self.loc + SIZE_UOFFSET + index * T::SIZE
    }
}

impl<'a> Vector<'a, u8> {
    /// The element bytes as a slice
    pub fn as_bytes(&self) -> &'a [u8] {
        let start = self.loc + SIZE_UOFFSET;
        &self.buf[start..start + self.len()]
    }
}

impl<'a> Vector<'a, Table<'a>> {
    /// Binary search over tables sorted by the string field `key_field`
    ///
    /// The vector must have been written with
    /// [`Builder::create_vector_of_sorted_tables`](crate::Builder::create_vector_of_sorted_tables)
    /// or be otherwise sorted by byte-wise key order.
    pub fn lookup_by_key(&self, key_field: u16, key: &str) -> Option<Table<'a>> {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let table = self.get(mid);
            let probe = table.get_str(key_field).unwrap_or_default();
            match probe.as_bytes().cmp(key.as_bytes()) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(table),
            }
        }
        None
    }
}

impl<'a, T: VectorElement<'a>> IntoIterator for Vector<'a, T> {
    type Item = T;
    type IntoIter = VectorIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`Vector`]
#[derive(Debug, Clone)]
pub struct VectorIter<'a, T> {
    vector: Vector<'a, T>,
    next: usize,
    end: usize,
}

impl<'a, T: VectorElement<'a>> Iterator for VectorIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.next >= self.end {
            return None;
        }
        let item = T::read(self.vector.buf, self.vector.element_position(self.next));
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl<'a, T: VectorElement<'a>> ExactSizeIterator for VectorIter<'a, T> {}

impl<'a, T: VectorElement<'a>> DoubleEndedIterator for VectorIter<'a, T> {
    fn next_back(&mut self) -> Option<T> {
        if self.next >= self.end {
            return None;
        }
        self.end -= 1;
        Some(T::read(self.vector.buf, self.vector.element_position(self.end)))
    }
}

/// A vector of inline structs
pub struct StructVector<'a, S> {
    buf: &'a [u8],
    loc: usize,
    marker: PhantomData<S>,
}

impl<'a, S> Clone for StructVector<'a, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, S> Copy for StructVector<'a, S> {}

impl<'a, S> fmt::Debug for StructVector<'a, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructVector").field("loc", &self.loc).finish()
    }
}

impl<'a, S: StructLayout> StructVector<'a, S> {
    /// Wraps the vector whose length prefix is at `loc`
    pub fn new(buf: &'a [u8], loc: usize) -> Self {
        Self {
            buf,
            loc,
            marker: PhantomData,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        read_scalar::<UOffset>(self.buf, self.loc) as usize
    }

    /// Returns true if the vector has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accessor for the struct at `index` without decoding it
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn view(&self, index: usize) -> Struct<'a> {
        let len = self.len();
        assert!(index < len, "index {index} out of bounds for vector of {len}");
        Struct::new(self.buf, self.loc + SIZE_UOFFSET + index * S::SIZE)
    }

    /// Decodes the struct at `index`
    pub fn get(&self, index: usize) -> S {
        self.view(index).read()
    }

    /// Decodes every element in order
    pub fn iter(&self) -> impl Iterator<Item = S> + 'a
    where
        S: 'a,
    {
        let this = *self;
        (0..this.len()).map(move |i| this.get(i))
    }
}
