//! # flatweave-flex
//!
//! Schema-less self-describing binary values in the FlexBuffers format.
//!
//! Every value carries its own type and width, so a buffer can be read
//! without knowing how it was written. Reading is zero-copy: a
//! [`Reference`] is a view into the bytes and nothing is decoded until an
//! accessor asks for it.
//!
//! ## Architecture
//!
//! - [`builder`]: the [`FlexBuilder`] value stack and container encoding
//! - [`reader`]: [`Reference`], [`VectorReader`] and [`MapReader`] views,
//!   plus JSON rendering
//! - [`mutate`]: in-place updates that keep the buffer layout
//! - [`types`]: type codes and bit widths
//! - [`error`]: error types
//!
//! ## Example
//!
//! ```
//! use flatweave_flex::{FlexBuilder, FlexType, Reference};
//!
//! let mut builder = FlexBuilder::new();
//! builder.vector(|v| {
//!     v.int(1);
//!     v.string("two");
//!     v.typed_vector_from(&[3.5f64, 4.25]);
//! });
//! let data = builder.finish();
//!
//! let root = Reference::root(data)?;
//! let items = root.as_vector();
//! assert_eq!(items.len(), 3);
//! assert_eq!(items.get(1)?.as_str(), "two");
//! assert_eq!(items.get(2)?.flex_type(), FlexType::VectorFloat);
//! assert_eq!(root.to_json(), r#"[1,"two",[3.5,4.25]]"#);
//! # Ok::<(), flatweave_flex::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod builder;
pub mod error;
pub mod mutate;
pub mod reader;
pub mod types;

// Re-export primary types for convenience
pub use builder::{Element, FlexBuilder, FlexBuilderConfig, FlexScalar, StackValue};
pub use error::{Error, Result};
pub use mutate::Slot;
pub use reader::{MapIter, MapReader, Reference, VectorIter, VectorReader};
pub use types::{pack_type, unpack_type, BitWidth, FlexType};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
