//! Growable backing store written from the high end toward the low end.
//!
//! Children are written before their parents, so a parent can always refer to
//! a child that is already placed. Positions handed out by the buffer are
//! measured as "distance from the end" (`revpos`), which stays valid when the
//! allocation grows: growth copies existing content flush against the new high
//! end.
//!
//! ```text
//!  0            head                         capacity
//!  |  free space |  written bytes (len)       |
//! ```

mod scalar;

use bytes::Bytes;
use tracing::trace;

pub use scalar::{
    padding_bytes, read_scalar, write_scalar, SOffset, Scalar, UOffset, VOffset,
    FILE_IDENTIFIER_LENGTH, SIZE_PREFIX_LENGTH, SIZE_SOFFSET, SIZE_UOFFSET, SIZE_VOFFSET,
};
pub(crate) use scalar::follow_uoffset;

/// Largest buffer the builder will produce (signed 32-bit addressable)
pub const MAX_BUFFER_SIZE: usize = (1 << 31) - 1;

/// Initial allocation used when none is requested
pub const DEFAULT_CAPACITY: usize = 1024;

/// Back-to-front byte buffer with alignment tracking
#[derive(Debug, Clone)]
pub struct BackingBuffer {
    data: Vec<u8>,
    head: usize,
    min_align: usize,
    max_size: usize,
}

impl Default for BackingBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl BackingBuffer {
    /// Creates a buffer with the given initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_limit(capacity, MAX_BUFFER_SIZE)
    }

    /// Creates a buffer that refuses to grow beyond `max_size` bytes
    ///
    /// `max_size` is clamped to [`MAX_BUFFER_SIZE`].
    pub fn with_limit(capacity: usize, max_size: usize) -> Self {
        let max_size = max_size.min(MAX_BUFFER_SIZE);
        let capacity = capacity.min(max_size);
        Self {
            data: vec![0; capacity],
            head: capacity,
            min_align: 1,
            max_size,
        }
    }

    /// Number of bytes written so far
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    /// Returns true if nothing has been written
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current allocation size
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Largest alignment requested so far
    pub fn min_align(&self) -> usize {
        self.min_align
    }

    /// Written bytes, lowest address first
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// Mutable view of the written bytes
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.head..]
    }

    /// Discards all written bytes, keeping the allocation
    pub fn clear(&mut self) {
        self.data[self.head..].fill(0);
        self.head = self.data.len();
        self.min_align = 1;
    }

    /// Ensures at least `additional` free bytes below the head
    ///
    /// # Panics
    ///
    /// Panics if the buffer would exceed its size limit.
    pub fn reserve(&mut self, additional: usize) {
        if additional <= self.head {
            return;
        }

        let used = self.len();
        let needed = used.saturating_add(additional);
        assert!(
            needed <= self.max_size,
            "flatweave buffer cannot grow beyond {} bytes (needs {})",
            self.max_size,
            needed
        );

        let mut new_capacity = self.data.len().max(1);
        while new_capacity < needed {
            new_capacity = new_capacity.saturating_mul(2);
        }
        let new_capacity = new_capacity.min(self.max_size);

        trace!(
            "Growing backing buffer from {} to {} bytes",
            self.data.len(),
            new_capacity
        );

        let mut grown = vec![0u8; new_capacity];
        grown[new_capacity - used..].copy_from_slice(&self.data[self.head..]);
        self.data = grown;
        self.head = new_capacity - used;
    }

    /// Claims `n` zeroed bytes at the front and returns them
    pub fn make_space(&mut self, n: usize) -> &mut [u8] {
        self.reserve(n);
        self.head -= n;
        let space = &mut self.data[self.head..self.head + n];
        space.fill(0);
        space
    }

    /// Writes `n` zero bytes
    pub fn pad(&mut self, n: usize) {
        self.make_space(n);
    }

    /// Pads so that after writing `len` more bytes the buffer length is a
    /// multiple of `alignment`, and records `alignment` as seen
    pub fn align(&mut self, len: usize, alignment: usize) {
        self.min_align = self.min_align.max(alignment);
        let padding = padding_bytes(self.len() + len, alignment);
        if padding > 0 {
            self.pad(padding);
        }
    }

    /// Aligns and writes a scalar, returning the new length
    pub fn push<T: Scalar>(&mut self, value: T) -> usize {
        self.align(T::SIZE, T::SIZE);
        value.write_le(self.make_space(T::SIZE));
        self.len()
    }

    /// Writes a contiguous run of scalars, first element at the lowest
    /// address, without any alignment of its own
    pub fn push_slice<T: Scalar>(&mut self, values: &[T]) -> usize {
        let dst = self.make_space(values.len() * T::SIZE);
        for (value, chunk) in values.iter().zip(dst.chunks_exact_mut(T::SIZE)) {
            value.write_le(chunk);
        }
        self.len()
    }

    /// Writes raw bytes without alignment, returning the new length
    pub fn push_bytes(&mut self, raw: &[u8]) -> usize {
        self.make_space(raw.len()).copy_from_slice(raw);
        self.len()
    }

    /// Absolute index (within [`data`](Self::data)) of a `revpos`
    #[inline]
    pub fn position_of(&self, revpos: usize) -> usize {
        self.len() - revpos
    }

    /// Reads a scalar previously written at `revpos`
    pub fn read_at<T: Scalar>(&self, revpos: usize) -> T {
        read_scalar(self.data(), self.position_of(revpos))
    }

    /// Overwrites a scalar previously written at `revpos`
    pub fn write_at<T: Scalar>(&mut self, revpos: usize, value: T) {
        let pos = self.position_of(revpos);
        write_scalar(self.data_mut(), pos, value);
    }

    /// Freezes the written bytes into a shareable [`Bytes`] without copying
    pub fn freeze(self) -> Bytes {
        Bytes::from(self.data).slice(self.head..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_pads_before_scalar() {
        let mut buf = BackingBuffer::with_capacity(16);
        buf.push(0x2Au8);
        buf.push(-1i16);
        assert_eq!(buf.data(), &[0xFF, 0xFF, 0x00, 0x2A]);
        assert_eq!(buf.min_align(), 2);
    }

    #[test]
    fn test_growth_preserves_revpos() {
        let mut buf = BackingBuffer::with_capacity(2);
        let first = buf.push(7u32);
        buf.push(9u64);
        buf.push_bytes(&[1, 2, 3]);

        assert!(buf.capacity() >= buf.len());
        assert_eq!(buf.read_at::<u32>(first), 7);
        assert_eq!(&buf.data()[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_zero_capacity_grows() {
        let mut buf = BackingBuffer::with_capacity(0);
        buf.push(5u8);
        assert_eq!(buf.data(), &[5]);
    }

    #[test]
    fn test_write_at_overwrites() {
        let mut buf = BackingBuffer::default();
        let pos = buf.push(0i32);
        buf.push(1u32);
        buf.write_at(pos, -4i32);
        assert_eq!(buf.data(), &[1, 0, 0, 0, 252, 255, 255, 255]);
    }

    #[test]
    fn test_clear_keeps_allocation() {
        let mut buf = BackingBuffer::with_capacity(8);
        buf.push(1u64);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.min_align(), 1);
    }

    #[test]
    fn test_freeze_slices_written_region() {
        let mut buf = BackingBuffer::with_capacity(32);
        buf.push_bytes(b"abc");
        let frozen = buf.freeze();
        assert_eq!(&frozen[..], b"abc");
    }

    #[test]
    #[should_panic(expected = "cannot grow beyond")]
    fn test_size_limit() {
        let mut buf = BackingBuffer::with_limit(4, 8);
        buf.push(1u64);
        buf.push(2u8);
    }
}
