//! Structural verification of untrusted buffers.
//!
//! The verifier walks a buffer using only the sizes and offsets it declares
//! about itself and rejects it if any access would leave the buffer, land on a
//! misaligned address, or exceed the configured nesting, table-count or
//! apparent-size limits. It never panics on malformed input.
//!
//! The engine knows nothing about schemas. Per-type checks are supplied as
//! callbacks that receive a [`TableVerifier`] and visit each field:
//!
//! ```
//! use flatweave_core::{verify_buffer, Builder, Result, TableVerifier, VerifierOptions};
//!
//! fn verify_monster(table: &mut TableVerifier<'_, '_>) -> Result<()> {
//!     table.visit_string(0, true)?;
//!     table.visit_scalar::<i16>(1, false)?;
//!     table.visit_table(2, false, verify_monster)
//! }
//!
//! let mut builder = Builder::new();
//! let name = builder.create_string("orc");
//! builder.start_table();
//! builder.add_offset(0, name);
//! let root = builder.end_table();
//! builder.finish(root, None);
//!
//! verify_buffer(builder.finished_data(), &VerifierOptions::default(), None, verify_monster)?;
//! # Ok::<(), flatweave_core::Error>(())
//! ```

mod table;

use std::ops::Range;

use tracing::debug;

use crate::buffer::{
    read_scalar, SOffset, Scalar, UOffset, VOffset, FILE_IDENTIFIER_LENGTH, SIZE_PREFIX_LENGTH,
    SIZE_UOFFSET, SIZE_VOFFSET,
};
use crate::error::{Error, Result};
use crate::table::Table;
use crate::vtable::VTABLE_HEADER_SIZE;

pub use table::TableVerifier;

/// Limits applied during verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierOptions {
    /// Maximum table nesting depth
    pub max_depth: usize,
    /// Maximum number of tables visited in one pass
    pub max_tables: usize,
    /// Maximum number of bytes a pass may account for, counting shared
    /// sub-objects once per visit
    pub max_apparent_size: usize,
    /// Require strings to be followed by a NUL byte
    pub check_nul_terminator: bool,
    /// Require scalars and offsets to be aligned to their size
    pub check_alignment: bool,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_tables: 1_000_000,
            max_apparent_size: 1 << 31,
            check_nul_terminator: true,
            check_alignment: true,
        }
    }
}

impl VerifierOptions {
    /// Creates options with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the maximum table count
    pub fn max_tables(mut self, tables: usize) -> Self {
        self.max_tables = tables;
        self
    }

    /// Sets the apparent size limit
    pub fn max_apparent_size(mut self, size: usize) -> Self {
        self.max_apparent_size = size;
        self
    }

    /// Sets whether string terminators are checked
    pub fn check_nul_terminator(mut self, check: bool) -> Self {
        self.check_nul_terminator = check;
        self
    }

    /// Sets whether alignment is checked
    pub fn check_alignment(mut self, check: bool) -> Self {
        self.check_alignment = check;
        self
    }
}

/// State of one verification pass over one buffer
#[derive(Debug)]
pub struct Verifier<'buf> {
    buf: &'buf [u8],
    options: VerifierOptions,
    depth: usize,
    num_tables: usize,
    apparent_size: usize,
}

impl<'buf> Verifier<'buf> {
    /// Starts a pass over `buf`
    pub fn new(buf: &'buf [u8], options: &VerifierOptions) -> Self {
        Self {
            buf,
            options: options.clone(),
            depth: 0,
            num_tables: 0,
            apparent_size: 0,
        }
    }

    /// The buffer being verified
    pub fn buffer(&self) -> &'buf [u8] {
        self.buf
    }

    /// Current table nesting depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Tables visited so far
    pub fn num_tables(&self) -> usize {
        self.num_tables
    }

    /// Bytes accounted for so far
    pub fn apparent_size(&self) -> usize {
        self.apparent_size
    }

    /// Checks that `size` bytes starting at `pos` lie inside the buffer
    pub fn check_element(&mut self, pos: usize, size: usize) -> Result<()> {
        let end = pos
            .checked_add(size)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::out_of_bounds(pos..pos.saturating_add(size), self.buf.len()))?;

        self.apparent_size = self.apparent_size.saturating_add(end - pos);
        if self.apparent_size > self.options.max_apparent_size {
            return Err(Error::ApparentSizeTooLarge {
                size: self.apparent_size,
                max: self.options.max_apparent_size,
            });
        }
        Ok(())
    }

    /// Checks that `pos` is a multiple of `alignment`, when enabled
    pub fn check_alignment(&self, pos: usize, alignment: usize) -> Result<()> {
        if self.options.check_alignment && pos % alignment != 0 {
            return Err(Error::Unaligned {
                position: pos,
                alignment,
            });
        }
        Ok(())
    }

    /// Checks and reads an aligned scalar
    pub fn check_scalar<T: Scalar>(&mut self, pos: usize) -> Result<T> {
        self.check_alignment(pos, T::SIZE)?;
        self.check_element(pos, T::SIZE)?;
        Ok(read_scalar(self.buf, pos))
    }

    /// Checks the uoffset at `pos` and returns the position it refers to
    ///
    /// The offset must be non-zero and land inside the buffer.
    pub fn check_indirect_offset(&mut self, pos: usize) -> Result<usize> {
        let offset = self.check_scalar::<UOffset>(pos)?;
        if offset == 0 {
            return Err(Error::InvalidOffset {
                offset,
                position: pos,
            });
        }
        match pos.checked_add(offset as usize) {
            Some(target) if target < self.buf.len() => Ok(target),
            _ => Err(Error::InvalidOffset {
                offset,
                position: pos,
            }),
        }
    }

    /// Checks a length-prefixed vector or string at `pos` and returns the
    /// byte range of its elements
    pub fn check_vector_or_string(&mut self, pos: usize, elem_size: usize) -> Result<Range<usize>> {
        let len = self.check_scalar::<UOffset>(pos)? as usize;
        let start = pos + SIZE_UOFFSET;
        let byte_len = len
            .checked_mul(elem_size)
            .ok_or_else(|| Error::out_of_bounds(start..usize::MAX, self.buf.len()))?;
        self.check_element(start, byte_len)?;
        Ok(start..start + byte_len)
    }

    /// Checks a string at `pos`, including its terminator and encoding
    pub fn check_string(&mut self, pos: usize) -> Result<&'buf str> {
        let range = self.check_vector_or_string(pos, 1)?;
        if self.options.check_nul_terminator {
            self.check_element(range.end, 1)?;
            if self.buf[range.end] != 0 {
                return Err(Error::MissingNullTerminator { range });
            }
        }
        let buf = self.buf;
        std::str::from_utf8(&buf[range.clone()]).map_err(|source| Error::Utf8 { range, source })
    }

    /// Checks the table header at `pos` and enters it
    ///
    /// Increments the depth and table counters, then validates the soffset,
    /// the vtable header and the table's inline extent.
    pub fn verify_table_start(&mut self, pos: usize) -> Result<TableVerifier<'_, 'buf>> {
        self.depth += 1;
        self.num_tables += 1;
        if self.depth > self.options.max_depth {
            return Err(Error::DepthLimitReached {
                max: self.options.max_depth,
            });
        }
        if self.num_tables > self.options.max_tables {
            return Err(Error::TooManyTables {
                max: self.options.max_tables,
            });
        }

        let soffset = self.check_scalar::<SOffset>(pos)?;
        let vtable = pos as i64 - soffset as i64;
        if vtable < 0 || vtable as u64 >= self.buf.len() as u64 {
            return Err(Error::SignedOffsetOutOfBounds {
                soffset,
                position: pos,
            });
        }
        let vtable = vtable as usize;

        let vtable_len = self.check_scalar::<VOffset>(vtable)? as usize;
        if vtable_len < VTABLE_HEADER_SIZE || vtable_len % SIZE_VOFFSET != 0 {
            return Err(Error::invalid_vtable(
                vtable,
                format!("vtable size {vtable_len} is not an even number of at least 4"),
            ));
        }
        self.check_element(vtable, vtable_len)?;

        let object_size = read_scalar::<VOffset>(self.buf, vtable + SIZE_VOFFSET) as usize;
        if object_size < SIZE_UOFFSET {
            return Err(Error::invalid_vtable(
                vtable,
                format!("table size {object_size} cannot hold its soffset"),
            ));
        }
        self.check_element(pos, object_size)?;

        Ok(TableVerifier::new(self, pos, vtable, vtable_len, object_size))
    }

    pub(crate) fn verify_table_end(&mut self) {
        self.depth -= 1;
    }

    /// Verifies the table at `pos` with a schema callback
    pub fn verify_table<F>(&mut self, pos: usize, verify: F) -> Result<()>
    where
        F: FnOnce(&mut TableVerifier<'_, 'buf>) -> Result<()>,
    {
        let mut table = self.verify_table_start(pos)?;
        verify(&mut table)?;
        table.finish();
        Ok(())
    }

    /// Verifies the root offset at `start`, the optional identifier after it
    /// and the root table, returning the root table's position
    fn verify_root<F>(&mut self, start: usize, identifier: Option<&[u8; 4]>, verify: F) -> Result<usize>
    where
        F: FnOnce(&mut TableVerifier<'_, 'buf>) -> Result<()>,
    {
        let min = start + SIZE_UOFFSET + identifier.map_or(0, |_| FILE_IDENTIFIER_LENGTH);
        if self.buf.len() < min {
            return Err(Error::BufferTooSmall {
                len: self.buf.len(),
                min,
            });
        }
        if let Some(expected) = identifier {
            let ident_start = start + SIZE_UOFFSET;
            let mut found = [0u8; FILE_IDENTIFIER_LENGTH];
            found.copy_from_slice(&self.buf[ident_start..ident_start + FILE_IDENTIFIER_LENGTH]);
            if &found != expected {
                return Err(Error::IdentifierMismatch {
                    expected: *expected,
                    found,
                });
            }
        }

        let root = self.check_indirect_offset(start)?;
        self.verify_table(root, verify)?;
        Ok(root)
    }
}

fn verify_from<'buf, F>(
    buf: &'buf [u8],
    start: usize,
    options: &VerifierOptions,
    identifier: Option<&[u8; 4]>,
    verify: F,
) -> Result<usize>
where
    F: FnOnce(&mut TableVerifier<'_, 'buf>) -> Result<()>,
{
    let mut verifier = Verifier::new(buf, options);
    let result = verifier.verify_root(start, identifier, verify);
    if let Err(e) = &result {
        debug!("Rejected buffer of {} bytes: {}", buf.len(), e);
    }
    result
}

/// Verifies a finished buffer, calling `verify` on its root table
///
/// When `identifier` is given the buffer must carry it.
pub fn verify_buffer<'buf, F>(
    buf: &'buf [u8],
    options: &VerifierOptions,
    identifier: Option<&[u8; 4]>,
    verify: F,
) -> Result<()>
where
    F: FnOnce(&mut TableVerifier<'_, 'buf>) -> Result<()>,
{
    verify_from(buf, 0, options, identifier, verify).map(|_| ())
}

/// Verifies a size-prefixed buffer
///
/// The prefix may not claim more bytes than follow it; any trailing bytes
/// beyond the prefixed region (for example the next message in a stream) are
/// ignored.
pub fn verify_size_prefixed_buffer<'buf, F>(
    buf: &'buf [u8],
    options: &VerifierOptions,
    identifier: Option<&[u8; 4]>,
    verify: F,
) -> Result<()>
where
    F: FnOnce(&mut TableVerifier<'_, 'buf>) -> Result<()>,
{
    let message = size_prefixed_region(buf)?;
    verify_from(message, SIZE_PREFIX_LENGTH, options, identifier, verify).map(|_| ())
}

/// The size prefix plus the message it covers
fn size_prefixed_region(buf: &[u8]) -> Result<&[u8]> {
    if buf.len() < SIZE_PREFIX_LENGTH {
        return Err(Error::BufferTooSmall {
            len: buf.len(),
            min: SIZE_PREFIX_LENGTH,
        });
    }
    let prefix = read_scalar::<u32>(buf, 0);
    let actual = buf.len() - SIZE_PREFIX_LENGTH;
    if prefix as usize > actual {
        return Err(Error::SizePrefixMismatch { prefix, actual });
    }
    Ok(&buf[..SIZE_PREFIX_LENGTH + prefix as usize])
}

/// Verifies a buffer and returns its root table
pub fn root_table_checked<'buf, F>(
    buf: &'buf [u8],
    options: &VerifierOptions,
    identifier: Option<&[u8; 4]>,
    verify: F,
) -> Result<Table<'buf>>
where
    F: FnOnce(&mut TableVerifier<'_, 'buf>) -> Result<()>,
{
    let root = verify_from(buf, 0, options, identifier, verify)?;
    Ok(Table::new(buf, root))
}

/// Verifies a size-prefixed buffer and returns its root table
pub fn size_prefixed_root_table_checked<'buf, F>(
    buf: &'buf [u8],
    options: &VerifierOptions,
    identifier: Option<&[u8; 4]>,
    verify: F,
) -> Result<Table<'buf>>
where
    F: FnOnce(&mut TableVerifier<'_, 'buf>) -> Result<()>,
{
    let message = size_prefixed_region(buf)?;
    let root = verify_from(message, SIZE_PREFIX_LENGTH, options, identifier, verify)?;
    Ok(Table::new(message, root))
}
