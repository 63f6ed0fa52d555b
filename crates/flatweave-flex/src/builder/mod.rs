//! FlexBuffer encoder.
//!
//! Scalars are pushed onto a value stack. Strings, blobs, keys and indirect
//! numbers are written to the buffer immediately and leave an offset on the
//! stack. Closing a container pops its children, picks the narrowest width
//! that fits all of them, writes them out and pushes the container in their
//! place. [`FlexBuilder::finish`] writes the single remaining value as root.
//!
//! ```
//! use flatweave_flex::{FlexBuilder, Reference};
//!
//! let mut builder = FlexBuilder::new();
//! builder.map(|m| {
//!     m.key("name");
//!     m.string("orc");
//!     m.key("hp");
//!     m.int(150);
//!     m.key("pos");
//!     m.fixed_typed_vector_from(&[1.0f32, 2.0, 3.0]);
//! });
//! let data = builder.finish();
//!
//! let root = Reference::root(data)?;
//! assert_eq!(root.as_map().get("hp")?.as_i64(), 150);
//! assert_eq!(root.to_json(), r#"{"hp":150,"name":"orc","pos":[1.0,2.0,3.0]}"#);
//! # Ok::<(), flatweave_flex::Error>(())
//! ```
//!
//! ## Misuse
//!
//! Unbalanced containers, mixed types in a typed vector, map entries that
//! are not key/value pairs, duplicate map keys and pushing after `finish` are
//! bugs in the calling code and panic.

mod value;

use std::collections::HashMap;

use bytes::Bytes;
use tracing::debug;

use crate::types::{BitWidth, FlexType};

pub use value::{Element, FlexScalar, StackValue};
pub(crate) use value::{padding_bytes, Payload, Value};

/// Default initial buffer capacity in bytes
pub const DEFAULT_CAPACITY: usize = 256;

/// Configuration for a [`FlexBuilder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexBuilderConfig {
    /// Write each distinct key once
    pub share_keys: bool,
    /// Write each distinct string once
    pub share_strings: bool,
    /// Narrowest width any vector or map may use
    pub force_min_width: BitWidth,
    /// Initial buffer capacity in bytes
    pub initial_capacity: usize,
}

impl Default for FlexBuilderConfig {
    fn default() -> Self {
        Self {
            share_keys: true,
            share_strings: false,
            force_min_width: BitWidth::W8,
            initial_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl FlexBuilderConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable key deduplication
    pub fn share_keys(mut self, share: bool) -> Self {
        self.share_keys = share;
        self
    }

    /// Enable or disable string deduplication
    pub fn share_strings(mut self, share: bool) -> Self {
        self.share_strings = share;
        self
    }

    /// Set the narrowest width containers may use
    pub fn force_min_width(mut self, width: BitWidth) -> Self {
        self.force_min_width = width;
        self
    }

    /// Set the initial buffer capacity
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Per-element type bytes after the body
    Untyped,
    /// One element type for all, with a length prefix
    Typed,
    /// One element type for all, length implied by the type
    Fixed,
}

/// Builds one FlexBuffer
#[derive(Debug)]
pub struct FlexBuilder {
    buf: Vec<u8>,
    stack: Vec<Value>,
    key_pool: HashMap<Box<[u8]>, usize>,
    string_pool: HashMap<Box<[u8]>, Value>,
    config: FlexBuilderConfig,
    finished: bool,
}

impl Default for FlexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlexBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::with_config(FlexBuilderConfig::default())
    }

    /// Create a new builder with custom configuration
    pub fn with_config(config: FlexBuilderConfig) -> Self {
        Self {
            buf: Vec::with_capacity(config.initial_capacity),
            stack: Vec::new(),
            key_pool: HashMap::new(),
            string_pool: HashMap::new(),
            config,
            finished: false,
        }
    }

    /// Clears all state, keeping the allocation
    pub fn reset(&mut self) {
        self.buf.clear();
        self.stack.clear();
        self.key_pool.clear();
        self.string_pool.clear();
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

    /// Returns true once [`finish`](Self::finish) has run
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn assert_not_finished(&self, op: &str) {
        assert!(
            !self.finished,
            "flexbuffer is already finished; call reset() before {op}"
        );
    }

    fn push_value(&mut self, value: Value) {
        self.assert_not_finished("pushing values");
        self.stack.push(value);
    }

    // ---- scalars ----

    /// Pushes a null
    pub fn null(&mut self) {
        self.push_value(Value::null());
    }

    /// Pushes a boolean
    pub fn bool(&mut self, value: bool) {
        self.push_value(Value::bool(value));
    }

    /// Pushes a signed integer in its narrowest width
    pub fn int(&mut self, value: i64) {
        self.push_value(Value::int(value));
    }

    /// Pushes an unsigned integer in its narrowest width
    pub fn uint(&mut self, value: u64) {
        self.push_value(Value::uint(value));
    }

    /// Pushes a float, stored in 4 bytes when that loses nothing
    pub fn float(&mut self, value: f64) {
        self.push_value(Value::float(value, BitWidth::for_f64(value)));
    }

    /// Pushes a float that always occupies 8 bytes
    pub fn double(&mut self, value: f64) {
        self.push_value(Value::float(value, BitWidth::W64));
    }

    /// Pushes any [`Element`]
    pub fn push(&mut self, element: Element<'_>) {
        match element {
            Element::Null => self.null(),
            Element::Bool(b) => self.bool(b),
            Element::Int(i) => self.int(i),
            Element::UInt(u) => self.uint(u),
            Element::Float(f) => self.float(f),
            Element::String(s) => self.string(s),
            Element::Blob(b) => self.blob(b),
        }
    }

    // ---- out-of-line values ----

    /// Writes a length-prefixed, NUL-terminated string
    pub fn string(&mut self, value: &str) {
        self.assert_not_finished("string");
        if self.config.share_strings {
            if let Some(&pooled) = self.string_pool.get(value.as_bytes()) {
                self.stack.push(pooled);
                return;
            }
        }
        let written = self.write_blob(value.as_bytes(), true, FlexType::String);
        if self.config.share_strings {
            self.string_pool.insert(value.as_bytes().into(), written);
        }
        self.stack.push(written);
    }

    /// Writes a length-prefixed byte blob
    pub fn blob(&mut self, value: &[u8]) {
        self.assert_not_finished("blob");
        let written = self.write_blob(value, false, FlexType::Blob);
        self.stack.push(written);
    }

    /// Writes a NUL-terminated key
    ///
    /// Inside a map every value must be preceded by its key.
    ///
    /// # Panics
    ///
    /// Panics if `key` contains a NUL byte.
    pub fn key(&mut self, key: &str) {
        self.assert_not_finished("key");
        assert!(
            !key.as_bytes().contains(&0),
            "keys cannot contain NUL bytes: {key:?}"
        );
        let pooled = if self.config.share_keys {
            self.key_pool.get(key.as_bytes()).copied()
        } else {
            None
        };
        let position = match pooled {
            Some(position) => position,
            None => {
                let position = self.buf.len();
                self.buf.extend_from_slice(key.as_bytes());
                self.buf.push(0);
                if self.config.share_keys {
                    self.key_pool.insert(key.as_bytes().into(), position);
                }
                position
            }
        };
        self.stack.push(Value::offset(FlexType::Key, position, BitWidth::W8));
    }

    /// Writes a signed integer out of line so it does not widen its parent
    pub fn indirect_int(&mut self, value: i64) {
        self.write_indirect(Payload::Int(value), FlexType::IndirectInt, BitWidth::for_i64(value));
    }

    /// Writes an unsigned integer out of line
    pub fn indirect_uint(&mut self, value: u64) {
        self.write_indirect(Payload::UInt(value), FlexType::IndirectUInt, BitWidth::for_u64(value));
    }

    /// Writes a float out of line
    pub fn indirect_float(&mut self, value: f64) {
        self.write_indirect(Payload::Float(value), FlexType::IndirectFloat, BitWidth::for_f64(value));
    }

    fn write_indirect(&mut self, payload: Payload, ty: FlexType, width: BitWidth) {
        self.assert_not_finished("indirect values");
        let bw = self.align(width);
        let position = self.buf.len();
        self.write_payload(payload, bw);
        self.stack.push(Value::offset(ty, position, width));
    }

    /// The most recently pushed value
    pub fn last_value(&self) -> Option<StackValue> {
        self.stack.last().copied().map(StackValue)
    }

    /// Pushes a value again without rewriting its payload
    pub fn reuse_value(&mut self, value: StackValue) {
        self.push_value(value.0);
    }

    // ---- containers ----

    /// Marks the start of a vector; pass the result to an `end_*` method
    pub fn start_vector(&mut self) -> usize {
        self.assert_not_finished("start_vector");
        self.stack.len()
    }

    /// Marks the start of a map; pass the result to [`end_map`](Self::end_map)
    pub fn start_map(&mut self) -> usize {
        self.assert_not_finished("start_map");
        self.stack.len()
    }

    /// Closes a vector whose elements may differ in type
    pub fn end_vector(&mut self, start: usize) -> StackValue {
        self.end_container(start, Layout::Untyped)
    }

    /// Closes a vector whose elements all share one type
    ///
    /// # Panics
    ///
    /// Panics if the elements differ in type or are strings, maps or vectors.
    pub fn end_typed_vector(&mut self, start: usize) -> StackValue {
        self.end_container(start, Layout::Typed)
    }

    /// Closes a typed vector of 2 to 4 ints, uints or floats, stored without
    /// a length
    pub fn end_fixed_typed_vector(&mut self, start: usize) -> StackValue {
        self.end_container(start, Layout::Fixed)
    }

    fn end_container(&mut self, start: usize, layout: Layout) -> StackValue {
        let elems = self.take_from(start);
        let vector = self.create_vector(&elems, layout, FlexType::Int, None);
        self.stack.push(vector);
        StackValue(vector)
    }

    /// Closes a map
    ///
    /// Entries are sorted by key so readers can binary search them.
    ///
    /// # Panics
    ///
    /// Panics if the entries are not key/value pairs or a key repeats.
    pub fn end_map(&mut self, start: usize) -> StackValue {
        let entries = self.take_from(start);
        assert!(
            entries.len() % 2 == 0,
            "map entries must be key/value pairs, found {} values",
            entries.len()
        );
        let mut pairs: Vec<(Value, Value)> = entries.chunks_exact(2).map(|p| (p[0], p[1])).collect();
        for (key, _) in &pairs {
            assert!(
                key.ty == FlexType::Key,
                "every map value must follow a key(), found {:?} in key position",
                key.ty
            );
        }

        let buf = &self.buf;
        pairs.sort_by(|a, b| key_bytes(buf, &a.0).cmp(key_bytes(buf, &b.0)));
        if let Some(dup) = pairs
            .windows(2)
            .find(|w| key_bytes(buf, &w[0].0) == key_bytes(buf, &w[1].0))
        {
            panic!(
                "duplicate map key {:?}",
                String::from_utf8_lossy(key_bytes(buf, &dup[0].0))
            );
        }

        let (keys, values): (Vec<Value>, Vec<Value>) = pairs.into_iter().unzip();
        let keys = self.create_vector(&keys, Layout::Typed, FlexType::Key, None);
        let map = self.create_vector(&values, Layout::Untyped, FlexType::Int, Some(keys));
        self.stack.push(map);
        StackValue(map)
    }

    fn take_from(&mut self, start: usize) -> Vec<Value> {
        self.assert_not_finished("closing a container");
        assert!(
            start <= self.stack.len(),
            "container start {start} is past the {} values on the stack; containers must nest",
            self.stack.len()
        );
        self.stack.split_off(start)
    }

    /// Builds an untyped vector from whatever `build` pushes
    pub fn vector<F: FnOnce(&mut Self)>(&mut self, build: F) {
        let start = self.start_vector();
        build(self);
        self.end_vector(start);
    }

    /// Builds a typed vector from whatever `build` pushes
    pub fn typed_vector<F: FnOnce(&mut Self)>(&mut self, build: F) {
        let start = self.start_vector();
        build(self);
        self.end_typed_vector(start);
    }

    /// Builds a map from the key/value pairs `build` pushes
    pub fn map<F: FnOnce(&mut Self)>(&mut self, build: F) {
        let start = self.start_map();
        build(self);
        self.end_map(start);
    }

    /// Writes a typed vector of scalars
    pub fn typed_vector_from<T: FlexScalar>(&mut self, items: &[T]) {
        let start = self.start_vector();
        for &item in items {
            item.push_into(self);
        }
        let elems = self.take_from(start);
        let vector = self.create_vector(&elems, Layout::Typed, T::TYPE, None);
        self.stack.push(vector);
    }

    /// Writes a fixed typed vector of 2 to 4 scalars
    pub fn fixed_typed_vector_from<T: FlexScalar>(&mut self, items: &[T]) {
        let start = self.start_vector();
        for &item in items {
            item.push_into(self);
        }
        self.end_fixed_typed_vector(start);
    }

    /// Writes an untyped vector of elements
    pub fn vector_from_elements(&mut self, items: &[Element<'_>]) {
        let start = self.start_vector();
        for &item in items {
            self.push(item);
        }
        self.end_vector(start);
    }

    /// Writes a map from entries in any order
    pub fn map_from_entries(&mut self, entries: &[(&str, Element<'_>)]) {
        let start = self.start_map();
        for &(key, value) in entries {
            self.key(key);
            self.push(value);
        }
        self.end_map(start);
    }

    // ---- finishing ----

    /// Writes the root trailer and returns the finished buffer
    ///
    /// # Panics
    ///
    /// Panics unless exactly one value remains on the stack.
    pub fn finish(&mut self) -> &[u8] {
        self.assert_not_finished("finish");
        assert!(
            self.stack.len() == 1,
            "finish requires exactly one root value, found {}; check that every container was closed",
            self.stack.len()
        );
        let root = self.stack[0];
        let bw = self.align(root.elem_width(self.buf.len(), 0));
        self.write_value(&root, bw);
        self.buf.push(root.stored_packed_type(BitWidth::W8));
        self.buf.push(bw as u8);
        self.stack.clear();
        self.finished = true;

        debug!(
            "Finished flexbuffer: {} bytes, {} pooled keys",
            self.buf.len(),
            self.key_pool.len()
        );
        &self.buf
    }

    /// The finished buffer
    ///
    /// # Panics
    ///
    /// Panics if [`finish`](Self::finish) has not been called.
    pub fn finished_data(&self) -> &[u8] {
        assert!(self.finished, "finished_data() requires finish() first");
        &self.buf
    }

    /// Converts the finished buffer into shared [`Bytes`] without copying
    pub fn into_bytes(self) -> Bytes {
        assert!(self.finished, "into_bytes() requires finish() first");
        Bytes::from(self.buf)
    }

    // ---- encoding ----

    fn create_vector(
        &mut self,
        elems: &[Value],
        layout: Layout,
        empty_type: FlexType,
        keys: Option<Value>,
    ) -> Value {
        let len = elems.len();
        let mut width = self.config.force_min_width.max(BitWidth::for_u64(len as u64));
        let mut prefix = 1;
        if let Some(keys) = &keys {
            width = width.max(keys.elem_width(self.buf.len(), 0));
            prefix += 2;
        }
        for (i, elem) in elems.iter().enumerate() {
            width = width.max(elem.elem_width(self.buf.len(), i + prefix));
        }

        let ty = match layout {
            Layout::Untyped if keys.is_some() => FlexType::Map,
            Layout::Untyped => FlexType::Vector,
            Layout::Typed | Layout::Fixed => {
                let element = shared_element_type(elems, empty_type);
                let fixed = layout == Layout::Fixed;
                // A fixed length of 0 would read back as a variable-length vector
                let typed = match (fixed, len) {
                    (true, 0) => None,
                    (true, _) => FlexType::typed_vector_of(element, len),
                    (false, _) => FlexType::typed_vector_of(element, 0),
                }
                .filter(|_| element != FlexType::String);
                let Some(typed) = typed else {
                    panic!(
                        "{element:?} cannot form a {}typed vector of {len} elements",
                        if fixed { "fixed " } else { "" }
                    );
                };
                typed
            }
        };

        let bw = self.align(width);
        if let Some(keys) = &keys {
            self.write_value(keys, bw);
            self.write_uint(keys.min_width.byte_width() as u64, bw);
        }
        if layout != Layout::Fixed {
            self.write_uint(len as u64, bw);
        }
        let body = self.buf.len();
        for elem in elems {
            self.write_value(elem, bw);
        }
        if layout == Layout::Untyped {
            self.buf
                .extend(elems.iter().map(|elem| elem.stored_packed_type(width)));
        }
        Value::offset(ty, body, width)
    }

    fn write_blob(&mut self, bytes: &[u8], terminate: bool, ty: FlexType) -> Value {
        let width = BitWidth::for_u64(bytes.len() as u64);
        let bw = self.align(width);
        self.write_uint(bytes.len() as u64, bw);
        let position = self.buf.len();
        self.buf.extend_from_slice(bytes);
        if terminate {
            self.buf.push(0);
        }
        Value::offset(ty, position, width)
    }

    /// Pads to `width` and returns it in bytes
    fn align(&mut self, width: BitWidth) -> usize {
        let bw = width.byte_width();
        let padding = padding_bytes(self.buf.len(), bw);
        self.buf.resize(self.buf.len() + padding, 0);
        bw
    }

    fn write_uint(&mut self, value: u64, bw: usize) {
        self.buf.extend_from_slice(&value.to_le_bytes()[..bw]);
    }

    fn write_payload(&mut self, payload: Payload, bw: usize) {
        match payload {
            Payload::Int(i) => self.write_uint(i as u64, bw),
            Payload::UInt(u) => self.write_uint(u, bw),
            Payload::Float(f) if bw == 4 => self.buf.extend_from_slice(&(f as f32).to_le_bytes()),
            Payload::Float(f) if bw == 8 => self.buf.extend_from_slice(&f.to_le_bytes()),
            Payload::Float(_) => panic!("floats need a 4 or 8 byte slot, not {bw}"),
            Payload::Offset(target) => {
                let relative = self.buf.len() - target;
                debug_assert!(bw == 8 || relative < 1 << (bw * 8));
                self.write_uint(relative as u64, bw);
            }
        }
    }

    fn write_value(&mut self, value: &Value, bw: usize) {
        self.write_payload(value.payload, bw);
    }
}

fn shared_element_type(elems: &[Value], empty_type: FlexType) -> FlexType {
    let Some(first) = elems.first() else {
        return empty_type;
    };
    if let Some(other) = elems.iter().find(|e| e.ty != first.ty) {
        panic!(
            "typed vector elements must share one type, found {:?} after {:?}",
            other.ty, first.ty
        );
    }
    first.ty
}

/// Bytes of the key a key value points at, without the terminator
fn key_bytes<'b>(buf: &'b [u8], key: &Value) -> &'b [u8] {
    let Payload::Offset(position) = key.payload else {
        return &[];
    };
    let rest = &buf[position..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    &rest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode(build: impl FnOnce(&mut FlexBuilder)) -> Vec<u8> {
        let mut builder = FlexBuilder::new();
        build(&mut builder);
        builder.finish().to_vec()
    }

    #[test]
    fn test_scalar_roots() {
        assert_eq!(encode(|b| b.null()), [0, 0, 1]);
        assert_eq!(encode(|b| b.bool(true)), [1, 104, 1]);
        assert_eq!(encode(|b| b.bool(false)), [0, 104, 1]);
        assert_eq!(encode(|b| b.int(25)), [25, 4, 1]);
        assert_eq!(encode(|b| b.int(-25)), [231, 4, 1]);
        assert_eq!(encode(|b| b.uint(230)), [230, 8, 1]);
        assert_eq!(encode(|b| b.int(230)), [230, 0, 5, 2]);
        assert_eq!(encode(|b| b.int(1025)), [1, 4, 5, 2]);
        assert_eq!(encode(|b| b.int(-1025)), [255, 251, 5, 2]);
        assert_eq!(encode(|b| b.int(i32::MAX.into())), [255, 255, 255, 127, 6, 4]);
        assert_eq!(encode(|b| b.int(0x1_0000_0001)), [1, 0, 0, 0, 1, 0, 0, 0, 7, 8]);
        assert_eq!(encode(|b| b.uint(u64::MAX)), [255, 255, 255, 255, 255, 255, 255, 255, 11, 8]);
        assert_eq!(encode(|b| b.float(4.5)), [0, 0, 144, 64, 14, 4]);
        assert_eq!(
            encode(|b| b.float(0.1)),
            [154, 153, 153, 153, 153, 153, 185, 63, 15, 8]
        );
        assert_eq!(encode(|b| b.double(0.5)), [0, 0, 0, 0, 0, 0, 224, 63, 15, 8]);
    }

    #[test]
    fn test_width_grows_with_magnitude() {
        assert_eq!(encode(|b| b.int(300)), [44, 1, 5, 2]);
        assert_eq!(encode(|b| b.int(100_000)), [160, 134, 1, 0, 6, 4]);
        assert_eq!(encode(|b| b.uint(1 << 20)), [0, 0, 16, 0, 10, 4]);
    }

    #[test]
    fn test_strings_and_blobs() {
        assert_eq!(encode(|b| b.string("Maxim")), [5, 77, 97, 120, 105, 109, 0, 6, 20, 1]);
        assert_eq!(encode(|b| b.blob(&[1, 2, 3])), [3, 1, 2, 3, 3, 100, 1]);
        assert_eq!(encode(|b| b.string("")), [0, 0, 1, 20, 1]);
    }

    #[test]
    fn test_indirect_int() {
        assert_eq!(encode(|b| b.indirect_int(-9500)), [0xe4, 0xda, 2, 25, 1]);
        assert_eq!(encode(|b| b.indirect_uint(7)), [7, 1, 28, 1]);
    }

    #[test]
    fn test_untyped_vector_of_strings() {
        let data = encode(|b| {
            b.vector(|v| {
                v.string("foo");
                v.string("bar");
                v.string("baz");
            })
        });
        assert_eq!(
            data,
            [
                3, 102, 111, 111, 0, 3, 98, 97, 114, 0, 3, 98, 97, 122, 0, // strings
                3, 15, 11, 7, // vector
                20, 20, 20, // types
                6, 40, 1,
            ]
        );
    }

    #[test]
    fn test_nested_typed_vector() {
        let data = encode(|b| {
            b.vector(|v| {
                v.typed_vector(|t| t.int(61));
                v.int(64);
            })
        });
        assert_eq!(data, [1, 61, 2, 2, 64, 44, 4, 4, 40, 1]);
    }

    #[test]
    fn test_typed_and_fixed_vectors() {
        assert_eq!(
            encode(|b| b.typed_vector_from(&[true, false, true])),
            [3, 1, 0, 1, 3, 144, 1]
        );
        assert_eq!(
            encode(|b| b.fixed_typed_vector_from(&[-1i64, 256])),
            [255, 255, 0, 1, 4, 65, 1]
        );
        assert_eq!(
            encode(|b| b.fixed_typed_vector_from(&[1i32, 2, 4])),
            [1, 2, 4, 3, 76, 1]
        );
        assert_eq!(
            encode(|b| b.fixed_typed_vector_from(&[2u8, 3, 5, 7])),
            [2, 3, 5, 7, 4, 92, 1]
        );
        assert_eq!(encode(|b| b.typed_vector_from::<i32>(&[])), [0, 0, 44, 1]);
    }

    #[test]
    fn test_heterogeneous_vector_widens_to_largest_element() {
        let data = encode(|b| {
            b.vector_from_elements(&[
                "foo".into(),
                1.into(),
                (-5).into(),
                1.3f64.into(),
                true.into(),
            ])
        });
        #[rustfmt::skip]
        let expected = [
            3, 102, 111, 111, 0, 0, 0, 0,
            5, 0, 0, 0, 0, 0, 0, 0,
            15, 0, 0, 0, 0, 0, 0, 0,
            1, 0, 0, 0, 0, 0, 0, 0,
            251, 255, 255, 255, 255, 255, 255, 255,
            205, 204, 204, 204, 204, 204, 244, 63,
            1, 0, 0, 0, 0, 0, 0, 0,
            20, 7, 7, 15, 107,
            45, 43, 1,
        ];
        assert_eq!(data, expected);
    }

    #[test]
    fn test_map_sorts_keys() {
        let data = encode(|b| {
            b.map(|m| {
                m.key("foo");
                m.int(1);
                m.key("bar");
                m.int(2);
                m.key("baz");
                m.int(3);
            })
        });
        #[rustfmt::skip]
        let expected = [
            102, 111, 111, 0, 98, 97, 114, 0, 98, 97, 122, 0, // keys
            3, 9, 6, 15, // key vector
            3, 1, 3, // keys offset, keys width, length
            2, 3, 1, // values
            4, 4, 4, // types
            6, 36, 1,
        ];
        assert_eq!(data, expected);

        let data = encode(|b| b.map_from_entries(&[("a", 12.into()), ("", 45.into())]));
        assert_eq!(data, [97, 0, 0, 2, 2, 5, 2, 1, 2, 45, 12, 4, 4, 4, 36, 1]);
    }

    #[test]
    fn test_shared_keys() {
        let build = |b: &mut FlexBuilder| {
            b.vector(|v| {
                v.map_from_entries(&[("something", 12.into())]);
                v.map_from_entries(&[("something", 45.into())]);
            })
        };

        let mut shared = FlexBuilder::new();
        build(&mut shared);
        #[rustfmt::skip]
        let expected = [
            115, 111, 109, 101, 116, 104, 105, 110, 103, 0,
            1, 11, 1, 1, 1, 12, 4,
            1, 18, 1, 1, 1, 45, 4,
            2, 10, 4, 36, 36,
            4, 40, 1,
        ];
        assert_eq!(shared.finish(), expected);

        let mut unshared = FlexBuilder::with_config(FlexBuilderConfig::new().share_keys(false));
        build(&mut unshared);
        let data = unshared.finish();
        assert_eq!(data.len(), expected.len() + 10);
        assert_eq!(&data[17..27], b"something\0");
    }

    #[test]
    fn test_shared_strings() {
        let mut builder = FlexBuilder::with_config(FlexBuilderConfig::new().share_strings(true));
        builder.vector(|v| {
            v.string("something");
            v.string("something");
            v.string("dark");
        });
        #[rustfmt::skip]
        let expected = [
            9, 115, 111, 109, 101, 116, 104, 105, 110, 103, 0,
            4, 100, 97, 114, 107, 0,
            3, 17, 18, 8,
            20, 20, 20,
            6, 40, 1,
        ];
        assert_eq!(builder.finish(), expected);
    }

    #[test]
    fn test_force_min_width() {
        let mut builder = FlexBuilder::with_config(FlexBuilderConfig::new().force_min_width(BitWidth::W32));
        builder.typed_vector_from(&[0u8, 1]);
        assert_eq!(builder.finish(), [2, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 8, 50, 1]);
    }

    #[test]
    fn test_reuse_value() {
        let data = encode(|b| {
            b.vector(|v| {
                v.string("hi");
                let hi = v.last_value().unwrap();
                v.reuse_value(hi);
            })
        });
        assert_eq!(data, [2, 104, 105, 0, 2, 4, 5, 20, 20, 4, 40, 1]);
    }

    #[test]
    fn test_reset_and_into_bytes() {
        let mut builder = FlexBuilder::new();
        builder.string("first");
        builder.finish();
        assert!(builder.is_finished());

        builder.reset();
        assert!(builder.is_empty());
        builder.int(7);
        builder.finish();
        let bytes = builder.into_bytes();
        assert_eq!(&bytes[..], [7, 4, 1]);
    }

    #[test]
    #[should_panic(expected = "exactly one root value, found 2")]
    fn test_finish_with_two_values() {
        let mut builder = FlexBuilder::new();
        builder.int(1);
        builder.int(2);
        builder.finish();
    }

    #[test]
    #[should_panic(expected = "exactly one root value, found 0")]
    fn test_finish_empty() {
        FlexBuilder::new().finish();
    }

    #[test]
    #[should_panic(expected = "must share one type")]
    fn test_typed_vector_mixed_types() {
        let mut builder = FlexBuilder::new();
        builder.typed_vector(|t| {
            t.int(1);
            t.float(2.5);
        });
    }

    #[test]
    #[should_panic(expected = "cannot form a typed vector")]
    fn test_typed_vector_of_strings() {
        let mut builder = FlexBuilder::new();
        builder.typed_vector(|t| t.string("no"));
    }

    #[test]
    #[should_panic(expected = "cannot form a fixed typed vector of 5")]
    fn test_fixed_vector_too_long() {
        FlexBuilder::new().fixed_typed_vector_from(&[1, 2, 3, 4, 5]);
    }

    #[test]
    #[should_panic(expected = "cannot form a fixed typed vector of 0")]
    fn test_fixed_vector_empty() {
        FlexBuilder::new().fixed_typed_vector_from::<i32>(&[]);
    }

    #[test]
    #[should_panic(expected = "cannot form a fixed typed vector of 0")]
    fn test_fixed_vector_empty_scope() {
        let mut builder = FlexBuilder::new();
        let start = builder.start_vector();
        builder.end_fixed_typed_vector(start);
    }

    #[test]
    #[should_panic(expected = "cannot form a fixed typed vector of 1")]
    fn test_fixed_vector_too_short() {
        FlexBuilder::new().fixed_typed_vector_from(&[1.5f32]);
    }

    #[test]
    #[should_panic(expected = "duplicate map key \"x\"")]
    fn test_duplicate_keys() {
        FlexBuilder::new().map_from_entries(&[("x", 1.into()), ("y", 2.into()), ("x", 3.into())]);
    }

    #[test]
    #[should_panic(expected = "key/value pairs")]
    fn test_map_missing_value() {
        let mut builder = FlexBuilder::new();
        builder.map(|m| m.key("lonely"));
    }

    #[test]
    #[should_panic(expected = "must follow a key()")]
    fn test_map_value_without_key() {
        let mut builder = FlexBuilder::new();
        builder.map(|m| {
            m.int(1);
            m.int(2);
        });
    }

    #[test]
    #[should_panic(expected = "cannot contain NUL")]
    fn test_key_with_nul() {
        FlexBuilder::new().key("a\0b");
    }

    #[test]
    #[should_panic(expected = "already finished")]
    fn test_push_after_finish() {
        let mut builder = FlexBuilder::new();
        builder.null();
        builder.finish();
        builder.int(1);
    }
}
