//! # flatweave-core
//!
//! Zero-copy binary serialization in the FlatBuffers wire format.
//!
//! This crate provides:
//! - A forward-only [`Builder`] that writes tables, structs, strings and
//!   vectors back to front into one contiguous buffer, deduplicating vtables
//! - Accessors ([`Table`], [`Vector`], [`Struct`]) that read fields straight
//!   out of the finished bytes without parsing
//! - A [`Verifier`] that checks untrusted buffers before they are read
//! - In-place mutation of fixed-size fields through [`TableMut`]
//!
//! ## Architecture
//!
//! - [`buffer`]: scalar encoding and the back-to-front backing buffer
//! - [`vtable`]: vtable layout and deduplication
//! - [`builder`]: buffer construction
//! - [`table`]: read-side accessors and mutation
//! - [`verifier`]: bounds and structure checks
//! - [`field`]: runtime field descriptors and scalar values
//! - [`error`]: error types
//!
//! ## Example
//!
//! ```
//! use flatweave_core::{root_table_checked, Builder, VerifierOptions};
//!
//! let mut builder = Builder::new();
//! let name = builder.create_string("orc");
//! let inventory = builder.create_vector(&[1u8, 2, 3]);
//! builder.start_table();
//! builder.add_offset(0, name);
//! builder.add_scalar(1, 150i16, 100);
//! builder.add_offset(2, inventory);
//! let monster = builder.end_table();
//! builder.finish(monster, Some(b"MONS"));
//!
//! let data = builder.finished_data();
//! let table = root_table_checked(data, &VerifierOptions::default(), Some(b"MONS"), |t| {
//!     t.visit_string(0, true)?;
//!     t.visit_scalar::<i16>(1, false)?;
//!     t.visit_vector::<u8>(2, false)
//! })?;
//!
//! assert_eq!(table.get_str(0), Some("orc"));
//! assert_eq!(table.get_scalar::<i16>(1, 100), 150);
//! assert_eq!(table.get_vector::<u8>(2).map(|v| v.as_bytes()), Some(&[1u8, 2, 3][..]));
//! # Ok::<(), flatweave_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod buffer;
pub mod builder;
pub mod error;
pub mod field;
pub mod table;
pub mod verifier;
pub mod vtable;

// Re-export primary types for convenience
pub use buffer::{read_scalar, write_scalar, Scalar};
pub use builder::{
    Builder, BuilderConfig, Offset, StringOffset, StructOffset, TableOffset, VectorOffset,
};
pub use error::{Error, Result};
pub use field::{FieldDescriptor, ScalarKind, ScalarValue};
pub use table::{
    buffer_has_identifier, root_table, size_prefixed_root_table, Struct, StructLayout,
    StructVector, Table, TableMut, UnionValue, Vector, VectorElement,
};
pub use verifier::{
    root_table_checked, size_prefixed_root_table_checked, verify_buffer,
    verify_size_prefixed_buffer, TableVerifier, Verifier, VerifierOptions,
};
pub use vtable::VTable;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
