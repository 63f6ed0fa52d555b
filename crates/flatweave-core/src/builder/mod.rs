//! Forward-only buffer builder.
//!
//! Objects are written depth-first, children before parents: strings,
//! vectors and sub-tables are created first, then the table referring to them
//! is opened with [`Builder::start_table`], filled with field writes and closed
//! with [`Builder::end_table`]. Finally [`Builder::finish`] writes the root
//! offset.
//!
//! ```
//! use flatweave_core::{root_table, Builder};
//!
//! let mut builder = Builder::new();
//! let name = builder.create_string("orc");
//! builder.start_table();
//! builder.add_offset(0, name);
//! builder.add_scalar(1, 150i16, 100);
//! let monster = builder.end_table();
//! builder.finish(monster, None);
//!
//! let table = root_table(builder.finished_data());
//! assert_eq!(table.get_str(0), Some("orc"));
//! assert_eq!(table.get_scalar::<i16>(1, 100), 150);
//! ```
//!
//! ## Misuse
//!
//! Calling operations out of order (opening a table inside another, writing
//! a field with no table open, writing the same field twice, exceeding the
//! 64 KiB table or 2 GiB buffer limits) is a bug in the calling code and
//! panics with a description of what went wrong.

mod offset;

use std::collections::HashMap;

use bytes::Bytes;
use tracing::debug;

use crate::buffer::{
    BackingBuffer, Scalar, SOffset, UOffset, DEFAULT_CAPACITY, FILE_IDENTIFIER_LENGTH,
    MAX_BUFFER_SIZE, SIZE_PREFIX_LENGTH, SIZE_UOFFSET,
};
use crate::field::{FieldDescriptor, ScalarValue};
use crate::table::{StructLayout, Table};
use crate::vtable::VTableRegistry;

pub use offset::{
    Offset, StringMarker, StringOffset, StructMarker, StructOffset, TableMarker, TableOffset,
    VectorMarker, VectorOffset,
};

/// Largest inline size of a single table (the vtable stores it as `u16`)
pub const MAX_TABLE_SIZE: usize = u16::MAX as usize;

/// Configuration for the builder
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Bytes allocated up front
    pub initial_capacity: usize,
    /// Write scalar fields even when they equal their default
    pub force_defaults: bool,
    /// Size the buffer may never exceed (clamped to 2^31 - 1)
    pub max_buffer_size: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            force_defaults: false,
            max_buffer_size: MAX_BUFFER_SIZE,
        }
    }
}

impl BuilderConfig {
    /// Creates a new builder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial allocation
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets whether default-valued scalars are written anyway
    pub fn force_defaults(mut self, force: bool) -> Self {
        self.force_defaults = force;
        self
    }

    /// Sets the buffer size ceiling
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }
}

/// What the builder is currently in the middle of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nesting {
    Idle,
    Table { start: UOffset },
    Vector { len: usize },
}

/// Builds a single flatweave buffer
#[derive(Debug)]
pub struct Builder {
    buf: BackingBuffer,
    vtables: VTableRegistry,
    shared_strings: HashMap<Box<[u8]>, UOffset>,
    nesting: Nesting,
    finished: bool,
    force_defaults: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Creates a builder with default configuration
    pub fn new() -> Self {
        Self::with_config(BuilderConfig::default())
    }

    /// Creates a builder with a given initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(BuilderConfig::new().initial_capacity(capacity))
    }

    /// Creates a builder with custom configuration
    pub fn with_config(config: BuilderConfig) -> Self {
        Self {
            buf: BackingBuffer::with_limit(config.initial_capacity, config.max_buffer_size),
            vtables: VTableRegistry::new(),
            shared_strings: HashMap::new(),
            nesting: Nesting::Idle,
            finished: false,
            force_defaults: config.force_defaults,
        }
    }

    /// Clears all state so the allocation can be reused for a new buffer
    pub fn reset(&mut self) {
        self.buf.clear();
        self.vtables.clear();
        self.shared_strings.clear();
        self.nesting = Nesting::Idle;
        self.finished = false;
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns true once [`finish`](Self::finish) has been called
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of distinct vtables written
    pub fn vtable_count(&self) -> usize {
        self.vtables.len()
    }

    /// Sets whether default-valued scalars are written anyway
    pub fn set_force_defaults(&mut self, force: bool) {
        self.force_defaults = force;
    }

    fn assert_not_finished(&self) {
        assert!(
            !self.finished,
            "builder is already finished; call reset() to build another buffer"
        );
    }

    fn assert_not_nested(&self, operation: &str) {
        self.assert_not_finished();
        assert!(
            self.nesting == Nesting::Idle,
            "{operation} cannot be called while a {} is open",
            match self.nesting {
                Nesting::Table { .. } => "table",
                _ => "vector",
            }
        );
    }

    fn assert_in_table(&self, operation: &str) -> UOffset {
        match self.nesting {
            Nesting::Table { start } => start,
            _ => panic!("{operation} requires an open table; call start_table() first"),
        }
    }

    /// Writes a uoffset to `target`, returning its own position
    fn push_uoffset<T>(&mut self, target: Offset<T>) -> UOffset {
        self.buf.align(SIZE_UOFFSET, SIZE_UOFFSET);
        let target = target.value() as usize;
        assert!(
            target != 0 && target <= self.buf.len(),
            "offset {target} does not refer to data already written ({} bytes)",
            self.buf.len()
        );
        let relative = self.buf.len() + SIZE_UOFFSET - target;
        self.buf.push(relative as UOffset) as UOffset
    }

    // Tables

    /// Opens a new table
    pub fn start_table(&mut self) {
        self.assert_not_nested("start_table");
        self.vtables.start();
        self.nesting = Nesting::Table {
            start: self.buf.len() as UOffset,
        };
    }

    /// Writes a scalar field unless it equals `default`
    pub fn add_scalar<T: Scalar>(&mut self, field_id: u16, value: T, default: T) {
        self.assert_in_table("add_scalar");
        if value == default && !self.force_defaults {
            return;
        }
        self.add_scalar_always(field_id, value);
    }

    /// Writes a scalar field regardless of its default
    pub fn add_scalar_always<T: Scalar>(&mut self, field_id: u16, value: T) {
        self.assert_in_table("add_scalar_always");
        let revpos = self.buf.push(value) as UOffset;
        self.vtables.set(field_id, revpos);
    }

    /// Writes a scalar field that has no default, omitting it when `None`
    pub fn add_optional<T: Scalar>(&mut self, field_id: u16, value: Option<T>) {
        if let Some(value) = value {
            self.add_scalar_always(field_id, value);
        }
    }

    /// Writes a field described at runtime
    ///
    /// # Panics
    ///
    /// Panics if `value` is not of the field's declared type.
    pub fn add_field(&mut self, field: &FieldDescriptor, value: ScalarValue) {
        let id = field.id;
        match (value, field.default) {
            (ScalarValue::Bool(v), ScalarValue::Bool(d)) => self.add_scalar(id, v, d),
            (ScalarValue::I8(v), ScalarValue::I8(d)) => self.add_scalar(id, v, d),
            (ScalarValue::U8(v), ScalarValue::U8(d)) => self.add_scalar(id, v, d),
            (ScalarValue::I16(v), ScalarValue::I16(d)) => self.add_scalar(id, v, d),
            (ScalarValue::U16(v), ScalarValue::U16(d)) => self.add_scalar(id, v, d),
            (ScalarValue::I32(v), ScalarValue::I32(d)) => self.add_scalar(id, v, d),
            (ScalarValue::U32(v), ScalarValue::U32(d)) => self.add_scalar(id, v, d),
            (ScalarValue::I64(v), ScalarValue::I64(d)) => self.add_scalar(id, v, d),
            (ScalarValue::U64(v), ScalarValue::U64(d)) => self.add_scalar(id, v, d),
            (ScalarValue::F32(v), ScalarValue::F32(d)) => self.add_scalar(id, v, d),
            (ScalarValue::F64(v), ScalarValue::F64(d)) => self.add_scalar(id, v, d),
            (value, default) => panic!(
                "field {id} is declared {:?} but was given {:?}",
                default.kind(),
                value.kind()
            ),
        }
    }

    /// Writes a uoffset field pointing at an already-written object
    pub fn add_offset<T>(&mut self, field_id: u16, child: Offset<T>) {
        self.assert_in_table("add_offset");
        let revpos = self.push_uoffset(child);
        self.vtables.set(field_id, revpos);
    }

    /// Records a struct written immediately before as a field
    ///
    /// # Panics
    ///
    /// Panics if anything was written between the struct and this call.
    pub fn add_struct(&mut self, field_id: u16, value: StructOffset) {
        self.assert_in_table("add_struct");
        assert_eq!(
            value.value() as usize,
            self.buf.len(),
            "struct for field {field_id} must be written inline right before add_struct"
        );
        self.vtables.set(field_id, value.value());
    }

    /// Writes a struct inline and records it as a field
    pub fn add_struct_value<S: StructLayout>(&mut self, field_id: u16, value: &S) {
        self.assert_in_table("add_struct_value");
        let written = self.create_struct(value);
        self.add_struct(field_id, written);
    }

    /// Writes a union as a `u8` tag field plus a table field
    pub fn add_union(&mut self, type_field: u16, value_field: u16, tag: u8, value: TableOffset) {
        self.add_scalar_always(type_field, tag);
        self.add_offset(value_field, value);
    }

    /// Closes the open table and returns its position
    pub fn end_table(&mut self) -> TableOffset {
        let start = self.assert_in_table("end_table");

        let object_revpos = self.buf.push::<SOffset>(0) as UOffset;
        let object_size = (object_revpos - start) as usize;
        assert!(
            object_size <= MAX_TABLE_SIZE,
            "table of {object_size} bytes exceeds the {MAX_TABLE_SIZE}-byte limit"
        );

        let vtable_revpos = self
            .vtables
            .finish(&mut self.buf, object_revpos, object_size as u16);
        let soffset = vtable_revpos as i64 - object_revpos as i64;
        self.buf.write_at(object_revpos as usize, soffset as SOffset);

        self.nesting = Nesting::Idle;
        Offset::new(object_revpos)
    }

    /// Asserts that a just-finished table contains a field
    ///
    /// # Panics
    ///
    /// Panics naming `field_name` if the field is absent.
    pub fn required(&self, table: TableOffset, field_id: u16, field_name: &str) {
        let data = self.buf.data();
        let view = Table::new(data, self.buf.position_of(table.value() as usize));
        assert!(
            view.has_field(field_id),
            "required field '{field_name}' (id {field_id}) was not written"
        );
    }

    // Strings

    /// Writes a UTF-8 string
    pub fn create_string(&mut self, text: &str) -> StringOffset {
        self.create_byte_string(text.as_bytes())
    }

    /// Writes a string, reusing an identical one written earlier by this
    /// builder
    pub fn create_shared_string(&mut self, text: &str) -> StringOffset {
        if let Some(&existing) = self.shared_strings.get(text.as_bytes()) {
            return Offset::new(existing);
        }
        let written = self.create_string(text);
        self.shared_strings
            .insert(text.as_bytes().into(), written.value());
        written
    }

    /// Writes a length-prefixed, NUL-terminated byte payload
    pub fn create_byte_string(&mut self, bytes: &[u8]) -> StringOffset {
        self.assert_not_nested("create_string");
        self.buf.align(bytes.len() + 1, SIZE_UOFFSET);
        self.buf.push_bytes(&[0]);
        self.buf.push_bytes(bytes);
        Offset::new(self.buf.push(bytes.len() as UOffset) as UOffset)
    }

    // Structs

    /// Writes a struct at the write head, honoring its alignment
    pub fn create_struct<S: StructLayout>(&mut self, value: &S) -> StructOffset {
        self.assert_not_finished();
        self.buf.align(S::SIZE, S::ALIGNMENT);
        value.write_to(self.buf.make_space(S::SIZE));
        Offset::new(self.buf.len() as UOffset)
    }

    // Vectors

    /// Opens a vector of `len` elements of `elem_size` bytes each
    ///
    /// Elements are then pushed last to first with
    /// [`push_element`](Self::push_element) or
    /// [`push_element_offset`](Self::push_element_offset).
    pub fn start_vector(&mut self, elem_size: usize, len: usize, alignment: usize) {
        self.assert_not_nested("start_vector");
        self.buf
            .align(elem_size * len, alignment.max(SIZE_UOFFSET));
        self.nesting = Nesting::Vector { len };
    }

    fn assert_in_vector(&self, operation: &str) -> usize {
        match self.nesting {
            Nesting::Vector { len } => len,
            _ => panic!("{operation} requires an open vector; call start_vector() first"),
        }
    }

    /// Pushes one scalar element into the open vector
    pub fn push_element<T: Scalar>(&mut self, value: T) {
        self.assert_in_vector("push_element");
        self.buf.push(value);
    }

    /// Pushes one offset element into the open vector
    pub fn push_element_offset<T>(&mut self, value: Offset<T>) {
        self.assert_in_vector("push_element_offset");
        self.push_uoffset(value);
    }

    /// Closes the open vector, writing its length prefix
    pub fn end_vector<T>(&mut self, len: usize) -> VectorOffset<T> {
        let declared = self.assert_in_vector("end_vector");
        assert_eq!(
            declared, len,
            "vector was started with {declared} elements but ended with {len}"
        );
        self.nesting = Nesting::Idle;
        Offset::new(self.buf.push(len as UOffset) as UOffset)
    }

    /// Writes a vector of scalars
    pub fn create_vector<T: Scalar>(&mut self, items: &[T]) -> VectorOffset<T> {
        self.start_vector(T::SIZE, items.len(), T::SIZE);
        self.buf.push_slice(items);
        self.end_vector(items.len())
    }

    /// Writes a `[u8]` vector
    pub fn create_byte_vector(&mut self, bytes: &[u8]) -> VectorOffset<u8> {
        self.start_vector(1, bytes.len(), 1);
        self.buf.push_bytes(bytes);
        self.end_vector(bytes.len())
    }

    /// Writes a vector of offsets to strings, tables or other vectors
    pub fn create_vector_of_offsets<T>(&mut self, items: &[Offset<T>]) -> VectorOffset<Offset<T>> {
        self.start_vector(SIZE_UOFFSET, items.len(), SIZE_UOFFSET);
        for &item in items.iter().rev() {
            self.push_uoffset(item);
        }
        self.end_vector(items.len())
    }

    /// Writes each string, then a vector referring to them
    pub fn create_vector_of_strings(&mut self, items: &[&str]) -> VectorOffset<StringOffset> {
        let offsets: Vec<StringOffset> = items.iter().map(|s| self.create_string(s)).collect();
        self.create_vector_of_offsets(&offsets)
    }

    /// Writes a vector of inline structs
    pub fn create_vector_of_structs<S: StructLayout>(&mut self, items: &[S]) -> VectorOffset<S> {
        self.start_vector(S::SIZE, items.len(), S::ALIGNMENT);
        let dst = self.buf.make_space(items.len() * S::SIZE);
        for (item, chunk) in items.iter().zip(dst.chunks_exact_mut(S::SIZE)) {
            item.write_to(chunk);
        }
        self.end_vector(items.len())
    }

    /// Sorts tables by the string field `key_field`, then writes a vector
    /// referring to them, suitable for
    /// [`Vector::lookup_by_key`](crate::Vector::lookup_by_key)
    ///
    /// Tables without the key sort first.
    pub fn create_vector_of_sorted_tables(
        &mut self,
        tables: &mut [TableOffset],
        key_field: u16,
    ) -> VectorOffset<TableOffset> {
        let data = self.buf.data();
        let key_of = |table: &TableOffset| {
            let view = Table::new(data, data.len() - table.value() as usize);
            view.get_bytes(key_field).unwrap_or_default()
        };
        tables.sort_by(|a, b| key_of(a).cmp(key_of(b)));
        self.create_vector_of_offsets(tables)
    }

    // Finishing

    /// Writes the root offset, optionally preceded by a file identifier
    pub fn finish<T>(&mut self, root: Offset<T>, file_identifier: Option<&[u8; 4]>) {
        self.finish_with(root, file_identifier, false);
    }

    /// Like [`finish`](Self::finish), also prepending the buffer size
    pub fn finish_size_prefixed<T>(&mut self, root: Offset<T>, file_identifier: Option<&[u8; 4]>) {
        self.finish_with(root, file_identifier, true);
    }

    /// Writes only the root offset
    pub fn finish_minimal<T>(&mut self, root: Offset<T>) {
        self.finish_with(root, None, false);
    }

    fn finish_with<T>(&mut self, root: Offset<T>, file_identifier: Option<&[u8; 4]>, size_prefixed: bool) {
        self.assert_not_nested("finish");

        let mut trailer = SIZE_UOFFSET;
        if size_prefixed {
            trailer += SIZE_PREFIX_LENGTH;
        }
        if file_identifier.is_some() {
            trailer += FILE_IDENTIFIER_LENGTH;
        }
        let min_align = self.buf.min_align();
        self.buf.align(trailer, min_align);

        if let Some(identifier) = file_identifier {
            self.buf.push_bytes(identifier);
        }
        self.push_uoffset(root);
        if size_prefixed {
            let size = self.buf.len() as UOffset;
            self.buf.push(size);
        }

        self.finished = true;
        debug!(
            "Finished buffer: {} bytes, {} distinct vtables",
            self.buf.len(),
            self.vtables.len()
        );
    }

    /// The finished buffer
    ///
    /// # Panics
    ///
    /// Panics if [`finish`](Self::finish) has not been called.
    pub fn finished_data(&self) -> &[u8] {
        assert!(self.finished, "finished_data() called before finish()");
        self.buf.data()
    }

    /// Consumes the builder, returning the finished buffer without copying
    ///
    /// # Panics
    ///
    /// Panics if [`finish`](Self::finish) has not been called.
    pub fn finished_bytes(self) -> Bytes {
        assert!(self.finished, "finished_bytes() called before finish()");
        self.buf.freeze()
    }
}
