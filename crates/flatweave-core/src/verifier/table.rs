//! Field-level verification of a single table.

use super::{verify_from, Verifier};
use crate::buffer::{read_scalar, Scalar, VOffset, SIZE_UOFFSET, SIZE_VOFFSET};
use crate::error::{Error, Result};
use crate::field::FieldDescriptor;
use crate::vtable::field_index_to_offset;

/// Verifies the fields of one table
///
/// Created by [`Verifier::verify_table_start`] once the table header and its
/// vtable have been checked. Each `visit_*` method checks one field and
/// returns an error if it is malformed or, when `required` is set, absent.
#[derive(Debug)]
pub struct TableVerifier<'v, 'buf> {
    verifier: &'v mut Verifier<'buf>,
    pos: usize,
    vtable: usize,
    vtable_len: usize,
    object_size: usize,
}

impl<'v, 'buf> TableVerifier<'v, 'buf> {
    pub(super) fn new(
        verifier: &'v mut Verifier<'buf>,
        pos: usize,
        vtable: usize,
        vtable_len: usize,
        object_size: usize,
    ) -> Self {
        Self {
            verifier,
            pos,
            vtable,
            vtable_len,
            object_size,
        }
    }

    /// Absolute position of the table
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The pass this table belongs to
    pub fn verifier(&mut self) -> &mut Verifier<'buf> {
        &mut *self.verifier
    }

    /// Position of a field, or `None` when absent
    ///
    /// The vtable range was checked on entry, so this read is in bounds.
    fn deref(&self, field_id: u16) -> Option<usize> {
        let entry = field_index_to_offset(field_id);
        if entry + SIZE_VOFFSET > self.vtable_len {
            return None;
        }
        match read_scalar::<VOffset>(self.verifier.buf, self.vtable + entry) {
            0 => None,
            voffset => Some(self.pos + voffset as usize),
        }
    }

    fn locate(&self, field_id: u16, required: bool) -> Result<Option<usize>> {
        match self.deref(field_id) {
            None if required => Err(Error::missing_field(field_id, self.pos)),
            found => Ok(found),
        }
    }

    fn visit_inline(&mut self, field_id: u16, size: usize, alignment: usize, required: bool) -> Result<()> {
        let Some(field) = self.locate(field_id, required)? else {
            return Ok(());
        };
        if field + size > self.pos + self.object_size {
            return Err(Error::invalid_vtable(
                self.vtable,
                format!("field {field_id} extends past the end of its table"),
            ));
        }
        self.verifier.check_alignment(field, alignment)?;
        self.verifier.check_element(field, size)
    }

    /// Follows an offset field, returning the position it refers to
    fn visit_offset(&mut self, field_id: u16, required: bool) -> Result<Option<usize>> {
        match self.locate(field_id, required)? {
            Some(field) => self.verifier.check_indirect_offset(field).map(Some),
            None => Ok(None),
        }
    }

    /// Checks a scalar field
    pub fn visit_scalar<T: Scalar>(&mut self, field_id: u16, required: bool) -> Result<()> {
        self.visit_inline(field_id, T::SIZE, T::SIZE, required)
    }

    /// Checks a field described at runtime
    pub fn visit_field(&mut self, field: &FieldDescriptor) -> Result<()> {
        let size = field.kind().size();
        self.visit_inline(field.id, size, size, field.required)
    }

    /// Checks an inline struct field
    pub fn visit_struct(&mut self, field_id: u16, size: usize, alignment: usize, required: bool) -> Result<()> {
        self.visit_inline(field_id, size, alignment, required)
    }

    /// Checks a string field
    pub fn visit_string(&mut self, field_id: u16, required: bool) -> Result<()> {
        if let Some(target) = self.visit_offset(field_id, required)? {
            self.verifier.check_string(target)?;
        }
        Ok(())
    }

    /// Checks a vector of scalars
    pub fn visit_vector<T: Scalar>(&mut self, field_id: u16, required: bool) -> Result<()> {
        self.visit_struct_vector(field_id, T::SIZE, T::SIZE, required)
    }

    /// Checks a vector of inline structs of `size` bytes each
    pub fn visit_struct_vector(
        &mut self,
        field_id: u16,
        size: usize,
        alignment: usize,
        required: bool,
    ) -> Result<()> {
        if let Some(target) = self.visit_offset(field_id, required)? {
            let elements = self.verifier.check_vector_or_string(target, size)?;
            self.verifier.check_alignment(elements.start, alignment)?;
        }
        Ok(())
    }

    /// Checks a vector of strings, including every string
    pub fn visit_vector_of_strings(&mut self, field_id: u16, required: bool) -> Result<()> {
        let Some(target) = self.visit_offset(field_id, required)? else {
            return Ok(());
        };
        let elements = self.verifier.check_vector_or_string(target, SIZE_UOFFSET)?;
        for slot in elements.step_by(SIZE_UOFFSET) {
            let string = self.verifier.check_indirect_offset(slot)?;
            self.verifier.check_string(string)?;
        }
        Ok(())
    }

    /// Checks a sub-table field with its own schema callback
    pub fn visit_table<F>(&mut self, field_id: u16, required: bool, verify: F) -> Result<()>
    where
        F: FnOnce(&mut TableVerifier<'_, 'buf>) -> Result<()>,
    {
        match self.visit_offset(field_id, required)? {
            Some(target) => self.verifier.verify_table(target, verify),
            None => Ok(()),
        }
    }

    /// Checks a vector of tables, calling `verify` on each element
    pub fn visit_vector_of_tables<F>(&mut self, field_id: u16, required: bool, verify: F) -> Result<()>
    where
        F: Fn(&mut TableVerifier<'_, 'buf>) -> Result<()>,
    {
        let Some(target) = self.visit_offset(field_id, required)? else {
            return Ok(());
        };
        let elements = self.verifier.check_vector_or_string(target, SIZE_UOFFSET)?;
        for slot in elements.step_by(SIZE_UOFFSET) {
            let table = self.verifier.check_indirect_offset(slot)?;
            self.verifier.verify_table(table, &verify)?;
        }
        Ok(())
    }

    /// Checks a union stored as a `u8` tag field plus an offset field
    ///
    /// Tag and value must be both present or both absent (a present tag of 0,
    /// the "none" variant, with no value is also accepted). `verify` receives
    /// the tag, the verifier and the position of the payload, and dispatches
    /// to the variant's own checks.
    pub fn visit_union<F>(&mut self, type_field: u16, value_field: u16, required: bool, verify: F) -> Result<()>
    where
        F: FnOnce(u8, &mut Verifier<'buf>, usize) -> Result<()>,
    {
        let inconsistent = Error::InconsistentUnion {
            type_field,
            value_field,
            position: self.pos,
        };

        match (self.deref(type_field), self.deref(value_field)) {
            (None, None) if required => Err(Error::missing_field(value_field, self.pos)),
            (None, None) => Ok(()),
            (None, Some(_)) => Err(inconsistent),
            (Some(_), None) => {
                self.visit_scalar::<u8>(type_field, false)?;
                match self.tag_at(type_field) {
                    0 if !required => Ok(()),
                    _ => Err(inconsistent),
                }
            }
            (Some(_), Some(value)) => {
                self.visit_scalar::<u8>(type_field, false)?;
                let tag = self.tag_at(type_field);
                if tag == 0 {
                    return Err(inconsistent);
                }
                let payload = self.verifier.check_indirect_offset(value)?;
                verify(tag, &mut *self.verifier, payload)
            }
        }
    }

    fn tag_at(&self, type_field: u16) -> u8 {
        self.deref(type_field)
            .map_or(0, |pos| self.verifier.buf[pos])
    }

    /// Checks a `[u8]` field holding a complete nested buffer
    ///
    /// The nested buffer is verified as a separate pass with the same
    /// options; alignment is checked relative to the start of its bytes.
    pub fn visit_nested_buffer<F>(
        &mut self,
        field_id: u16,
        identifier: Option<&[u8; 4]>,
        required: bool,
        verify: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut TableVerifier<'_, 'buf>) -> Result<()>,
    {
        let Some(target) = self.visit_offset(field_id, required)? else {
            return Ok(());
        };
        let bytes = self.verifier.check_vector_or_string(target, 1)?;
        let nested = &self.verifier.buf[bytes];
        verify_from(nested, 0, &self.verifier.options, identifier, verify).map(|_| ())
    }

    /// Leaves the table
    pub fn finish(self) {
        self.verifier.verify_table_end();
    }
}
