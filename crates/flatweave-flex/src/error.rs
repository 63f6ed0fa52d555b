//! Error types for the flatweave-flex library.
//!
//! Reading and mutating report malformed or mismatched data through
//! [`Error`]. Misuse of the [`FlexBuilder`](crate::FlexBuilder) panics.

use std::ops::Range;
use std::str::Utf8Error;
use thiserror::Error;

use crate::types::FlexType;

/// Result type alias for FlexBuffer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for reading and mutating FlexBuffers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The buffer cannot hold the root trailer
    #[error("buffer of {len} bytes is too short to hold a root value")]
    BufferTooShort {
        /// Length of the buffer
        len: usize,
    },

    /// The trailing root width byte is not 1, 2, 4 or 8
    #[error("invalid root byte width {0}")]
    InvalidRootWidth(u8),

    /// A type byte names no known type
    #[error("unknown type code {0}")]
    UnknownType(u8),

    /// A width field inside a container is not 1, 2, 4 or 8
    #[error("invalid byte width {width} at position {position}")]
    InvalidWidth {
        /// The stored width
        width: u64,
        /// Where it was read
        position: usize,
    },

    /// The value has a different type than requested
    #[error("expected {expected}, found {found:?}")]
    TypeMismatch {
        /// What the caller asked for
        expected: &'static str,
        /// What the buffer holds
        found: FlexType,
    },

    /// A vector or map index is past the end
    #[error("index {index} is out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Container length
        len: usize,
    },

    /// A map has no entry for the key
    #[error("key '{0}' not found")]
    KeyNotFound(String),

    /// An offset points before the start of the buffer
    #[error("offset stored at position {position} points outside the buffer")]
    InvalidOffset {
        /// Position of the offset slot
        position: usize,
    },

    /// A read or write would fall outside the buffer
    #[error("range {}..{} is out of bounds for a buffer of {len} bytes", range.start, range.end)]
    RangeOutOfBounds {
        /// The requested byte range
        range: Range<usize>,
        /// Length of the buffer
        len: usize,
    },

    /// A map's key vector and value vector disagree on length
    #[error("map at position {position} has {keys} keys but {values} values")]
    MapLengthMismatch {
        /// Position of the map's values
        position: usize,
        /// Length of the key vector
        keys: usize,
        /// Length of the value vector
        values: usize,
    },

    /// String or key bytes are not valid UTF-8
    #[error("invalid UTF-8 at position {position}")]
    Utf8 {
        /// Position of the first byte of the string
        position: usize,
        /// Underlying decode error
        #[source]
        source: Utf8Error,
    },

    /// The new value needs a wider slot than the one already allocated
    #[error("{value} does not fit in {width} bytes")]
    DoesNotFit {
        /// The rejected value, rendered as text
        value: String,
        /// Width of the existing slot in bytes
        width: usize,
    },

    /// The new string is longer than the existing one
    #[error("string of {len} bytes does not fit in a slot of {capacity} bytes")]
    StringTooLong {
        /// Length of the new string
        len: usize,
        /// Length of the string being replaced
        capacity: usize,
    },
}

impl Error {
    /// Creates a new out-of-bounds error
    pub fn out_of_bounds(start: usize, len: usize, buf_len: usize) -> Self {
        Self::RangeOutOfBounds {
            range: start..start.saturating_add(len),
            len: buf_len,
        }
    }

    /// Creates a new type mismatch error
    pub fn mismatch(expected: &'static str, found: FlexType) -> Self {
        Self::TypeMismatch { expected, found }
    }

    /// Creates a new does-not-fit error
    pub fn does_not_fit(value: impl ToString, width: usize) -> Self {
        Self::DoesNotFit {
            value: value.to_string(),
            width,
        }
    }
}
