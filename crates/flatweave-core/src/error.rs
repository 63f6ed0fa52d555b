//! Error types for the flatweave-core library.
//!
//! Only data-driven failures are reported through [`Error`]: verification of
//! untrusted buffers and in-place mutation of existing ones. Misuse of the
//! [`Builder`](crate::Builder) is a bug in the calling code and panics instead.

use std::ops::Range;
use thiserror::Error;

/// Result type alias for flatweave operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for verification and in-place mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A read would fall outside the buffer
    #[error("range {}..{} is out of bounds for a buffer of {len} bytes", range.start, range.end)]
    RangeOutOfBounds {
        /// The requested byte range
        range: Range<usize>,
        /// Length of the buffer
        len: usize,
    },

    /// A scalar is not aligned to its own size
    #[error("position {position} is not aligned to {alignment} bytes")]
    Unaligned {
        /// Absolute position of the scalar
        position: usize,
        /// Required alignment
        alignment: usize,
    },

    /// A table's soffset points at a vtable outside the buffer
    #[error("soffset {soffset} at position {position} points outside the buffer")]
    SignedOffsetOutOfBounds {
        /// The stored soffset
        soffset: i32,
        /// Position of the table holding it
        position: usize,
    },

    /// A uoffset is zero or overflows the address space
    #[error("invalid uoffset {offset} at position {position}")]
    InvalidOffset {
        /// The stored uoffset
        offset: u32,
        /// Position of the offset slot
        position: usize,
    },

    /// A vtable header is malformed
    #[error("malformed vtable at position {position}: {details}")]
    InvalidVTable {
        /// Position of the vtable
        position: usize,
        /// What is wrong with it
        details: String,
    },

    /// A string is not followed by a NUL byte
    #[error("string at {}..{} is missing its NUL terminator", range.start, range.end)]
    MissingNullTerminator {
        /// Byte range of the string payload
        range: Range<usize>,
    },

    /// A string payload is not valid UTF-8
    #[error("string at {}..{} is not valid UTF-8: {source}", range.start, range.end)]
    Utf8 {
        /// Byte range of the string payload
        range: Range<usize>,
        /// Underlying UTF-8 error
        #[source]
        source: std::str::Utf8Error,
    },

    /// Tables are nested deeper than allowed
    #[error("nesting depth exceeded the limit of {max}")]
    DepthLimitReached {
        /// Configured maximum depth
        max: usize,
    },

    /// More tables were visited than allowed
    #[error("visited more than {max} tables")]
    TooManyTables {
        /// Configured maximum table count
        max: usize,
    },

    /// Total bytes touched during verification exceeded the limit
    #[error("apparent size {size} exceeds the limit of {max} bytes")]
    ApparentSizeTooLarge {
        /// Bytes accounted so far
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// A required field is absent
    #[error("required field {field_id} is missing from table at position {position}")]
    MissingRequiredField {
        /// Slot index of the field
        field_id: u16,
        /// Position of the table
        position: usize,
    },

    /// Exactly one of a union's type and value fields is present
    #[error("union fields {type_field}/{value_field} are inconsistent in table at position {position}")]
    InconsistentUnion {
        /// Slot index of the type tag
        type_field: u16,
        /// Slot index of the value offset
        value_field: u16,
        /// Position of the table
        position: usize,
    },

    /// Buffer is too short to hold a root offset
    #[error("buffer of {len} bytes is too small, at least {min} bytes are required")]
    BufferTooSmall {
        /// Length of the buffer
        len: usize,
        /// Minimum length
        min: usize,
    },

    /// The file identifier does not match
    #[error("expected file identifier {expected:?}, found {found:?}")]
    IdentifierMismatch {
        /// Requested identifier
        expected: [u8; 4],
        /// Bytes found in the buffer
        found: [u8; 4],
    },

    /// The size prefix does not match the remaining buffer length
    #[error("size prefix {prefix} does not match the {actual} bytes that follow it")]
    SizePrefixMismatch {
        /// Stored size prefix
        prefix: u32,
        /// Actual remaining length
        actual: usize,
    },

    /// In-place mutation targeted a field that was never written
    #[error("field {field_id} is absent and cannot be mutated in place")]
    FieldNotPresent {
        /// Slot index of the field
        field_id: u16,
    },
}

impl Error {
    /// Creates a new out-of-bounds error
    pub fn out_of_bounds(range: Range<usize>, len: usize) -> Self {
        Self::RangeOutOfBounds { range, len }
    }

    /// Creates a new malformed vtable error
    pub fn invalid_vtable(position: usize, details: impl Into<String>) -> Self {
        Self::InvalidVTable {
            position,
            details: details.into(),
        }
    }

    /// Creates a new missing required field error
    pub fn missing_field(field_id: u16, position: usize) -> Self {
        Self::MissingRequiredField { field_id, position }
    }

    /// Returns true if this error was produced while verifying a buffer
    pub fn is_verification_failure(&self) -> bool {
        !matches!(self, Self::FieldNotPresent { .. })
    }
}
