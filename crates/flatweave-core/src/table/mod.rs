//! Zero-copy read access to finished buffers.
//!
//! A [`Table`] is just a `(buffer, position)` pair. Every read resolves the
//! field through the table's vtable and falls back to the caller-supplied
//! default when the field is absent. Nothing is decoded up front and nothing
//! is allocated.
//!
//! ## Trust
//!
//! Accessors do not validate what they read. On a buffer that did not pass
//! [`verify_buffer`](crate::verify_buffer) they may panic (out-of-range slice
//! indexing, invalid UTF-8), but they never read outside the slice they were
//! given. Use [`root_table_checked`](crate::root_table_checked) for untrusted
//! input.

mod structs;
mod vector;

use std::str;

use crate::buffer::{
    follow_uoffset, read_scalar, write_scalar, SOffset, Scalar, UOffset, VOffset,
    FILE_IDENTIFIER_LENGTH, SIZE_PREFIX_LENGTH, SIZE_UOFFSET,
};
use crate::error::{Error, Result};
use crate::field::{FieldDescriptor, ScalarValue};
use crate::vtable::VTable;

pub use structs::{Struct, StructLayout};
pub use vector::{StructVector, Vector, VectorElement, VectorIter};

#[cfg(test)]
pub(crate) use structs::tests::Vec3;

/// Read-only view of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table<'a> {
    buf: &'a [u8],
    loc: usize,
}

/// The resolved payload of a union field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnionValue<'a> {
    /// Variant tag, never 0 (the "none" variant)
    pub tag: u8,
    /// The variant's table
    pub table: Table<'a>,
}

impl<'a> Table<'a> {
    /// Wraps the table whose soffset is at `loc`
    pub fn new(buf: &'a [u8], loc: usize) -> Self {
        Self { buf, loc }
    }

    /// The underlying buffer
    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    /// Absolute position of the table
    pub fn position(&self) -> usize {
        self.loc
    }

    /// The vtable describing this table
    pub fn vtable(&self) -> VTable<'a> {
        let soffset = read_scalar::<SOffset>(self.buf, self.loc);
        VTable::init(self.buf, (self.loc as i64 - soffset as i64) as usize)
    }

    /// Offset of a field from the table start, or `None` when absent
    pub fn field_offset(&self, field_id: u16) -> Option<VOffset> {
        match self.vtable().get(field_id) {
            0 => None,
            voffset => Some(voffset),
        }
    }

    /// Returns true if the field was written
    pub fn has_field(&self, field_id: u16) -> bool {
        self.field_offset(field_id).is_some()
    }

    fn field_position(&self, field_id: u16) -> Option<usize> {
        self.field_offset(field_id)
            .map(|voffset| self.loc + voffset as usize)
    }

    /// Follows the uoffset stored in a field
    fn indirect(&self, field_id: u16) -> Option<usize> {
        self.field_position(field_id)
            .map(|pos| follow_uoffset(self.buf, pos))
    }

    /// Reads a scalar field, or `default` when absent
    pub fn get_scalar<T: Scalar>(&self, field_id: u16, default: T) -> T {
        self.get_optional(field_id).unwrap_or(default)
    }

    /// Reads a scalar field that has no default
    pub fn get_optional<T: Scalar>(&self, field_id: u16) -> Option<T> {
        self.field_position(field_id)
            .map(|pos| read_scalar(self.buf, pos))
    }

    /// Reads a field described at runtime
    pub fn read_field(&self, field: &FieldDescriptor) -> ScalarValue {
        let id = field.id;
        match field.default {
            ScalarValue::Bool(d) => ScalarValue::Bool(self.get_scalar(id, d)),
            ScalarValue::I8(d) => ScalarValue::I8(self.get_scalar(id, d)),
            ScalarValue::U8(d) => ScalarValue::U8(self.get_scalar(id, d)),
            ScalarValue::I16(d) => ScalarValue::I16(self.get_scalar(id, d)),
            ScalarValue::U16(d) => ScalarValue::U16(self.get_scalar(id, d)),
            ScalarValue::I32(d) => ScalarValue::I32(self.get_scalar(id, d)),
            ScalarValue::U32(d) => ScalarValue::U32(self.get_scalar(id, d)),
            ScalarValue::I64(d) => ScalarValue::I64(self.get_scalar(id, d)),
            ScalarValue::U64(d) => ScalarValue::U64(self.get_scalar(id, d)),
            ScalarValue::F32(d) => ScalarValue::F32(self.get_scalar(id, d)),
            ScalarValue::F64(d) => ScalarValue::F64(self.get_scalar(id, d)),
        }
    }

    /// Reads a string field
    pub fn get_str(&self, field_id: u16) -> Option<&'a str> {
        self.indirect(field_id).map(|pos| read_str(self.buf, pos))
    }

    /// Reads a byte string or `[u8]` vector field
    pub fn get_bytes(&self, field_id: u16) -> Option<&'a [u8]> {
        self.indirect(field_id).map(|pos| read_bytes(self.buf, pos))
    }

    /// Reads a nested table field
    pub fn get_table(&self, field_id: u16) -> Option<Table<'a>> {
        self.indirect(field_id).map(|pos| Table::new(self.buf, pos))
    }

    /// Decodes an inline struct field
    pub fn get_struct<S: StructLayout>(&self, field_id: u16) -> Option<S> {
        self.get_struct_view(field_id).map(|view| view.read())
    }

    /// Accessor for an inline struct field
    pub fn get_struct_view(&self, field_id: u16) -> Option<Struct<'a>> {
        self.field_position(field_id)
            .map(|pos| Struct::new(self.buf, pos))
    }

    /// Reads a vector of scalars, strings or tables
    pub fn get_vector<T: VectorElement<'a>>(&self, field_id: u16) -> Option<Vector<'a, T>> {
        self.indirect(field_id).map(|pos| Vector::new(self.buf, pos))
    }

    /// Reads a vector of inline structs
    pub fn get_struct_vector<S: StructLayout>(&self, field_id: u16) -> Option<StructVector<'a, S>> {
        self.indirect(field_id)
            .map(|pos| StructVector::new(self.buf, pos))
    }

    /// Resolves a union stored as a `u8` tag field plus a table field
    ///
    /// Returns `None` when the union is unset (tag 0 or no payload).
    pub fn get_union(&self, type_field: u16, value_field: u16) -> Option<UnionValue<'a>> {
        let tag = self.get_scalar::<u8>(type_field, 0);
        if tag == 0 {
            return None;
        }
        self.get_table(value_field)
            .map(|table| UnionValue { tag, table })
    }

    /// Root table of a flatweave buffer nested inside a `[u8]` vector field
    pub fn get_nested_root(&self, field_id: u16) -> Option<Table<'a>> {
        self.get_bytes(field_id).map(root_table)
    }
}

/// Reads the string whose length prefix is at `pos`
///
/// # Panics
///
/// Panics if the bytes are not UTF-8; verified buffers never are.
pub(crate) fn read_str(buf: &[u8], pos: usize) -> &str {
    let bytes = read_bytes(buf, pos);
    match str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => panic!("string at position {pos} is not UTF-8 ({e}); verify untrusted buffers first"),
    }
}

/// Reads the byte payload whose length prefix is at `pos`
pub(crate) fn read_bytes(buf: &[u8], pos: usize) -> &[u8] {
    let len = read_scalar::<UOffset>(buf, pos) as usize;
    let start = pos + SIZE_UOFFSET;
    &buf[start..start + len]
}

/// Accesses the root table of a finished buffer without verification
pub fn root_table(buf: &[u8]) -> Table<'_> {
    Table::new(buf, follow_uoffset(buf, 0))
}

/// Accesses the root table of a size-prefixed buffer without verification
pub fn size_prefixed_root_table(buf: &[u8]) -> Table<'_> {
    Table::new(buf, follow_uoffset(buf, SIZE_PREFIX_LENGTH))
}

/// Returns true if the buffer carries the given file identifier
pub fn buffer_has_identifier(buf: &[u8], identifier: &[u8; 4], size_prefixed: bool) -> bool {
    let start = SIZE_UOFFSET + if size_prefixed { SIZE_PREFIX_LENGTH } else { 0 };
    buf.get(start..start + FILE_IDENTIFIER_LENGTH) == Some(&identifier[..])
}

/// Mutable view of a table for in-place scalar updates
///
/// Only fields that were written can be changed; an absent field has no bytes
/// to overwrite and the buffer layout is never altered. The caller must hold
/// the only reference to the buffer for the duration of the update.
#[derive(Debug)]
pub struct TableMut<'a> {
    buf: &'a mut [u8],
    loc: usize,
}

impl<'a> TableMut<'a> {
    /// Wraps the table whose soffset is at `loc`
    pub fn new(buf: &'a mut [u8], loc: usize) -> Self {
        Self { buf, loc }
    }

    /// Wraps the root table of a finished buffer
    pub fn root(buf: &'a mut [u8]) -> Self {
        let loc = follow_uoffset(buf, 0);
        Self { buf, loc }
    }

    /// Read-only view of the same table
    pub fn as_table(&self) -> Table<'_> {
        Table::new(self.buf, self.loc)
    }

    fn present_field(&self, field_id: u16) -> Result<usize> {
        self.as_table()
            .field_position(field_id)
            .ok_or(Error::FieldNotPresent { field_id })
    }

    /// Overwrites a scalar field
    pub fn set_scalar<T: Scalar>(&mut self, field_id: u16, value: T) -> Result<()> {
        let pos = self.present_field(field_id)?;
        write_scalar(self.buf, pos, value);
        Ok(())
    }

    /// Overwrites a field described at runtime
    pub fn set_field(&mut self, field: &FieldDescriptor, value: ScalarValue) -> Result<()> {
        assert_eq!(
            field.kind(),
            value.kind(),
            "value type does not match field {}",
            field.id
        );
        let id = field.id;
        match value {
            ScalarValue::Bool(v) => self.set_scalar(id, v),
            ScalarValue::I8(v) => self.set_scalar(id, v),
            ScalarValue::U8(v) => self.set_scalar(id, v),
            ScalarValue::I16(v) => self.set_scalar(id, v),
            ScalarValue::U16(v) => self.set_scalar(id, v),
            ScalarValue::I32(v) => self.set_scalar(id, v),
            ScalarValue::U32(v) => self.set_scalar(id, v),
            ScalarValue::I64(v) => self.set_scalar(id, v),
            ScalarValue::U64(v) => self.set_scalar(id, v),
            ScalarValue::F32(v) => self.set_scalar(id, v),
            ScalarValue::F64(v) => self.set_scalar(id, v),
        }
    }

    /// Overwrites a scalar inside an inline struct field of layout `S`
    ///
    /// # Panics
    ///
    /// Panics if the scalar at `byte_offset` would extend past the struct.
    pub fn set_struct_scalar<S: StructLayout, T: Scalar>(
        &mut self,
        field_id: u16,
        byte_offset: usize,
        value: T,
    ) -> Result<()> {
        assert!(
            byte_offset + T::SIZE <= S::SIZE,
            "{} byte scalar at offset {byte_offset} overruns a {} byte struct",
            T::SIZE,
            S::SIZE
        );
        let pos = self.present_field(field_id)?;
        write_scalar(self.buf, pos + byte_offset, value);
        Ok(())
    }

    /// Overwrites one element of a scalar vector field
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set_vector_element<T: Scalar>(&mut self, field_id: u16, index: usize, value: T) -> Result<()> {
        let pos = follow_uoffset(self.buf, self.present_field(field_id)?);
        let len = read_scalar::<UOffset>(self.buf, pos) as usize;
        assert!(index < len, "index {index} out of bounds for vector of {len}");
        write_scalar(self.buf, pos + SIZE_UOFFSET + index * T::SIZE, value);
        Ok(())
    }

    /// Mutable view of a nested table field
    pub fn table_mut(&mut self, field_id: u16) -> Result<TableMut<'_>> {
        let loc = follow_uoffset(self.buf, self.present_field(field_id)?);
        Ok(TableMut::new(self.buf, loc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Hand-assembled buffer:
    //   root uoffset -> table at 12
    //   vtable at 4: size 8, object 12, field0 at +4, field1 at +8
    //   table at 12: soffset 8, i32 field0 = 300, uoffset field1 -> "hi"
    fn sample() -> Vec<u8> {
        vec![
            12, 0, 0, 0, // root
            8, 0, 12, 0, 4, 0, 8, 0, // vtable
            8, 0, 0, 0, // soffset
            44, 1, 0, 0, // 300
            4, 0, 0, 0, // -> string at 24
            2, 0, 0, 0, b'h', b'i', 0, 0,
        ]
    }

    #[test]
    fn test_reads_present_and_absent_fields() {
        let buf = sample();
        let table = root_table(&buf);

        assert_eq!(table.position(), 12);
        assert_eq!(table.field_offset(0), Some(4));
        assert_eq!(table.get_scalar::<i32>(0, 7), 300);
        assert_eq!(table.get_str(1), Some("hi"));
        assert_eq!(table.get_scalar::<i32>(5, 7), 7);
        assert_eq!(table.get_optional::<i32>(2), None);
        assert_eq!(table.get_str(3), None);
    }

    #[test]
    fn test_read_field_by_descriptor() {
        let buf = sample();
        let table = root_table(&buf);
        let present = FieldDescriptor::new(0, 0i32);
        let absent = FieldDescriptor::new(4, 2.5f64);

        assert_eq!(table.read_field(&present), ScalarValue::I32(300));
        assert_eq!(table.read_field(&absent), ScalarValue::F64(2.5));
    }

    #[test]
    fn test_identifier_check() {
        let buf = [8, 0, 0, 0, b'F', b'W', b'T', b'1'];
        assert!(buffer_has_identifier(&buf, b"FWT1", false));
        assert!(!buffer_has_identifier(&buf, b"FWT2", false));
        assert!(!buffer_has_identifier(&buf, b"FWT1", true));
    }

    #[test]
    fn test_mutate_present_field() {
        let mut buf = sample();
        let mut table = TableMut::root(&mut buf);

        table.set_scalar(0, -5i32).unwrap();
        assert_eq!(table.as_table().get_scalar::<i32>(0, 0), -5);

        let err = table.set_scalar(2, 1i32).unwrap_err();
        assert_eq!(err, Error::FieldNotPresent { field_id: 2 });
        assert_eq!(root_table(&buf).get_scalar::<i32>(0, 0), -5);
    }
}
