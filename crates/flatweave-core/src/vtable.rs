//! VTables: per-shape field offset tables, deduplicated by content.
//!
//! A vtable is laid out as
//!
//! ```text
//! [vtable_byte_size: u16][table_byte_size: u16][voffset_0: u16]...[voffset_n: u16]
//! ```
//!
//! where `voffset_i` is the byte offset of field `i` from the start of the
//! table, or 0 when the field is absent. Two tables with byte-identical
//! vtables share a single copy.

use std::collections::HashMap;

use tracing::trace;

use crate::buffer::{read_scalar, BackingBuffer, UOffset, VOffset, SIZE_VOFFSET};

/// Size of the two-entry vtable header
pub const VTABLE_HEADER_SIZE: usize = 2 * SIZE_VOFFSET;

/// Number of field slots a table may declare
///
/// The last slot must still yield a vtable whose byte size fits in a `u16`.
pub const MAX_FIELDS: usize = (u16::MAX as usize - VTABLE_HEADER_SIZE) / SIZE_VOFFSET;

/// Position of field `field_id`'s entry inside a vtable
#[inline]
pub fn field_index_to_offset(field_id: u16) -> usize {
    VTABLE_HEADER_SIZE + field_id as usize * SIZE_VOFFSET
}

/// Read-only view of a vtable inside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VTable<'a> {
    buf: &'a [u8],
    loc: usize,
}

impl<'a> VTable<'a> {
    /// Wraps the vtable starting at `loc`
    pub fn init(buf: &'a [u8], loc: usize) -> Self {
        Self { buf, loc }
    }

    /// Absolute position of the vtable
    pub fn position(&self) -> usize {
        self.loc
    }

    /// Size of the vtable itself in bytes
    pub fn num_bytes(&self) -> usize {
        read_scalar::<VOffset>(self.buf, self.loc) as usize
    }

    /// Size of the table's inline data, including its soffset
    pub fn object_inline_num_bytes(&self) -> usize {
        read_scalar::<VOffset>(self.buf, self.loc + SIZE_VOFFSET) as usize
    }

    /// Number of field slots recorded
    pub fn num_fields(&self) -> usize {
        self.num_bytes().saturating_sub(VTABLE_HEADER_SIZE) / SIZE_VOFFSET
    }

    /// Offset of a field within its table, 0 when absent or out of range
    pub fn get(&self, field_id: u16) -> VOffset {
        let entry = field_index_to_offset(field_id);
        if entry + SIZE_VOFFSET > self.num_bytes() {
            return 0;
        }
        read_scalar::<VOffset>(self.buf, self.loc + entry)
    }

    /// Raw bytes of the vtable
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buf[self.loc..self.loc + self.num_bytes()]
    }
}

/// Field map of the open table plus the cache of vtables already written
#[derive(Debug, Default)]
pub(crate) struct VTableRegistry {
    /// `revpos` of each field in the open table; 0 means unset
    slots: Vec<UOffset>,
    /// Highest slot set in the open table
    max_slot: Option<usize>,
    /// Serialized vtables already in the buffer, keyed by content
    written: HashMap<Box<[u8]>, UOffset>,
    /// Reused serialization buffer
    scratch: Vec<u8>,
}

impl VTableRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Clears the field map for a new table
    pub(crate) fn start(&mut self) {
        if let Some(max) = self.max_slot.take() {
            self.slots[..=max].fill(0);
        }
    }

    /// Records that `field_id` was written at `revpos`
    ///
    /// # Panics
    ///
    /// Panics if the field was already written for this table, or if the
    /// slot index exceeds [`MAX_FIELDS`].
    pub(crate) fn set(&mut self, field_id: u16, revpos: UOffset) {
        let slot = field_id as usize;
        assert!(
            slot < MAX_FIELDS,
            "field id {field_id} exceeds the maximum of {} slots",
            MAX_FIELDS
        );
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, 0);
        }
        assert!(
            self.slots[slot] == 0,
            "field {field_id} was written twice in the same table"
        );
        self.slots[slot] = revpos;
        self.max_slot = Some(self.max_slot.map_or(slot, |max| max.max(slot)));
    }

    /// Returns true if `field_id` was written in the open table
    pub(crate) fn is_set(&self, field_id: u16) -> bool {
        self.slots
            .get(field_id as usize)
            .is_some_and(|&revpos| revpos != 0)
    }

    /// Number of distinct vtables written so far
    pub(crate) fn len(&self) -> usize {
        self.written.len()
    }

    /// Forgets every table and vtable, for builder reuse
    pub(crate) fn clear(&mut self) {
        self.start();
        self.written.clear();
    }

    /// Serializes the open field map and returns the `revpos` of the vtable
    /// describing it, writing a new one only on a cache miss
    ///
    /// `object_revpos` is the position of the table's soffset and
    /// `object_size` the table's inline size.
    pub(crate) fn finish(
        &mut self,
        buf: &mut BackingBuffer,
        object_revpos: UOffset,
        object_size: u16,
    ) -> UOffset {
        let field_count = self.max_slot.map_or(0, |max| max + 1);
        let vtable_size = VTABLE_HEADER_SIZE + field_count * SIZE_VOFFSET;

        self.scratch.clear();
        self.scratch
            .extend_from_slice(&(vtable_size as VOffset).to_le_bytes());
        self.scratch.extend_from_slice(&object_size.to_le_bytes());
        for &revpos in &self.slots[..field_count] {
            let voffset = if revpos == 0 {
                0
            } else {
                (object_revpos - revpos) as VOffset
            };
            self.scratch.extend_from_slice(&voffset.to_le_bytes());
        }
        self.start();

        if let Some(&existing) = self.written.get(self.scratch.as_slice()) {
            trace!("Reusing vtable at revpos {}", existing);
            return existing;
        }

        let revpos = buf.push_bytes(&self.scratch) as UOffset;
        trace!("Wrote new {}-byte vtable at revpos {}", vtable_size, revpos);
        self.written
            .insert(self.scratch.clone().into_boxed_slice(), revpos);
        revpos
    }
}
