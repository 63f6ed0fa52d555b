//! In-place mutation of finished FlexBuffers.
//!
//! A [`Slot`] remembers where a value lives and how wide it is, without
//! holding on to the buffer. Take slots from a shared borrow, then apply
//! them to a mutable one:
//!
//! ```
//! use flatweave_flex::{FlexBuilder, Reference};
//!
//! let mut builder = FlexBuilder::new();
//! builder.map(|m| {
//!     m.key("hp");
//!     m.int(90);
//! });
//! let mut data = builder.finish().to_vec();
//!
//! let slot = Reference::root(&data)?.as_map().get("hp")?.slot()?;
//! slot.mutate_int(&mut data, -20)?;
//! assert_eq!(Reference::root(&data)?.as_map().get("hp")?.as_i64(), -20);
//! # Ok::<(), flatweave_flex::Error>(())
//! ```
//!
//! Nothing ever moves: a value that needs a wider slot, or a longer
//! string, is rejected.

use tracing::trace;

use crate::error::{Error, Result};
use crate::reader::{bytes_at, read_uint, Reference};
use crate::types::{BitWidth, FlexType};

/// Location of a mutable value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    ty: FlexType,
    /// Where the value's bytes start: the slot itself for inline values,
    /// the payload for indirect numbers and strings
    position: usize,
    width: BitWidth,
}

impl Reference<'_> {
    /// The mutable location of this value
    pub fn slot(&self) -> Result<Slot> {
        let (position, width) = match self.flex_type() {
            FlexType::Null | FlexType::Bool | FlexType::Int | FlexType::UInt | FlexType::Float => {
                (self.offset(), self.parent_width())
            }
            _ => (self.target()?, self.bit_width()),
        };
        Ok(Slot {
            ty: self.flex_type(),
            position,
            width,
        })
    }
}

impl Slot {
    /// Type of the value at this slot
    pub fn flex_type(&self) -> FlexType {
        self.ty
    }

    /// Width of the slot in bytes
    pub fn byte_width(&self) -> usize {
        self.width.byte_width()
    }

    fn check_type(&self, expected: &'static str, allowed: &[FlexType]) -> Result<()> {
        if allowed.contains(&self.ty) {
            Ok(())
        } else {
            Err(Error::mismatch(expected, self.ty))
        }
    }

    fn write(&self, buf: &mut [u8], position: usize, bytes: &[u8]) -> Result<()> {
        bytes_at(buf, position, bytes.len())?;
        buf[position..position + bytes.len()].copy_from_slice(bytes);
        trace!("Overwrote {} bytes at position {}", bytes.len(), position);
        Ok(())
    }

    /// Overwrites a signed integer, inline or indirect
    pub fn mutate_int(&self, buf: &mut [u8], value: i64) -> Result<()> {
        self.check_type("int", &[FlexType::Int, FlexType::IndirectInt])?;
        if BitWidth::for_i64(value) > self.width {
            return Err(Error::does_not_fit(value, self.byte_width()));
        }
        self.write(buf, self.position, &value.to_le_bytes()[..self.byte_width()])
    }

    /// Overwrites an unsigned integer, inline or indirect
    pub fn mutate_uint(&self, buf: &mut [u8], value: u64) -> Result<()> {
        self.check_type("uint", &[FlexType::UInt, FlexType::IndirectUInt])?;
        if BitWidth::for_u64(value) > self.width {
            return Err(Error::does_not_fit(value, self.byte_width()));
        }
        self.write(buf, self.position, &value.to_le_bytes()[..self.byte_width()])
    }

    /// Overwrites a float, inline or indirect
    ///
    /// A 4-byte slot only takes values that survive the round trip through
    /// `f32`.
    pub fn mutate_float(&self, buf: &mut [u8], value: f64) -> Result<()> {
        self.check_type("float", &[FlexType::Float, FlexType::IndirectFloat])?;
        match self.width {
            BitWidth::W32 if BitWidth::for_f64(value) == BitWidth::W32 => {
                self.write(buf, self.position, &(value as f32).to_le_bytes())
            }
            BitWidth::W64 => self.write(buf, self.position, &value.to_le_bytes()),
            _ => Err(Error::does_not_fit(value, self.byte_width())),
        }
    }

    /// Overwrites a boolean
    pub fn mutate_bool(&self, buf: &mut [u8], value: bool) -> Result<()> {
        self.check_type("bool", &[FlexType::Bool])?;
        let bytes = (value as u64).to_le_bytes();
        self.write(buf, self.position, &bytes[..self.byte_width()])
    }

    /// Replaces a string with one of equal or shorter length
    ///
    /// The length prefix and terminator are rewritten and the freed tail is
    /// zeroed.
    pub fn mutate_string(&self, buf: &mut [u8], value: &str) -> Result<()> {
        self.check_type("string", &[FlexType::String])?;
        let bw = self.byte_width();
        let prefix = self
            .position
            .checked_sub(bw)
            .ok_or(Error::InvalidOffset {
                position: self.position,
            })?;
        let capacity = read_uint(buf, prefix, self.width)? as usize;
        let new_len = value.len();
        if new_len > capacity {
            return Err(Error::StringTooLong {
                len: new_len,
                capacity,
            });
        }
        // The old terminator must be in bounds before anything is written
        bytes_at(buf, self.position, capacity.saturating_add(1))?;

        self.write(buf, prefix, &(new_len as u64).to_le_bytes()[..bw])?;
        self.write(buf, self.position, value.as_bytes())?;
        buf[self.position + new_len..=self.position + capacity].fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FlexBuilder;
    use pretty_assertions::assert_eq;

    fn encode(build: impl FnOnce(&mut FlexBuilder)) -> Vec<u8> {
        let mut b = FlexBuilder::new();
        build(&mut b);
        b.finish().to_vec()
    }

    fn root_slot(data: &[u8]) -> Slot {
        Reference::root(data).unwrap().slot().unwrap()
    }

    #[test]
    fn test_int_fits_existing_width() {
        let mut data = encode(|b| b.int(5));
        let slot = root_slot(&data);
        assert_eq!(slot.byte_width(), 1);

        for value in [-128, 127, 0] {
            slot.mutate_int(&mut data, value).unwrap();
            assert_eq!(Reference::root(&data).unwrap().get_i64(), Ok(value));
        }
        assert_eq!(
            slot.mutate_int(&mut data, 128),
            Err(Error::does_not_fit(128, 1))
        );
        assert_eq!(
            slot.mutate_int(&mut data, -129),
            Err(Error::does_not_fit(-129, 1))
        );
        assert_eq!(Reference::root(&data).unwrap().get_i64(), Ok(0));
    }

    #[test]
    fn test_uint_boundaries() {
        let mut data = encode(|b| b.uint(1));
        let slot = root_slot(&data);
        slot.mutate_uint(&mut data, 255).unwrap();
        assert_eq!(Reference::root(&data).unwrap().get_u64(), Ok(255));
        assert_eq!(
            slot.mutate_uint(&mut data, 256),
            Err(Error::does_not_fit(256, 1))
        );
        assert_eq!(
            slot.mutate_int(&mut data, 1),
            Err(Error::mismatch("int", FlexType::UInt))
        );
    }

    #[test]
    fn test_inline_value_in_wide_vector() {
        // 300 forces two byte slots, so the small neighbour can grow
        let mut data = encode(|b| b.vector_from_elements(&[1.into(), 300.into()]));
        let slot = Reference::root(&data).unwrap().as_vector().get(0).unwrap().slot().unwrap();
        assert_eq!(slot.byte_width(), 2);
        slot.mutate_int(&mut data, -30_000).unwrap();
        let v = Reference::root(&data).unwrap().as_vector();
        assert_eq!(v.get(0).unwrap().as_i64(), -30_000);
        assert_eq!(v.get(1).unwrap().as_i64(), 300);
    }

    #[test]
    fn test_indirect_numbers() {
        let mut data = encode(|b| b.indirect_int(1 << 40));
        let slot = root_slot(&data);
        assert_eq!(slot.flex_type(), FlexType::IndirectInt);
        assert_eq!(slot.byte_width(), 8);
        slot.mutate_int(&mut data, -(1 << 50)).unwrap();
        assert_eq!(Reference::root(&data).unwrap().get_i64(), Ok(-(1 << 50)));

        let mut data = encode(|b| b.indirect_float(0.1));
        root_slot(&data).mutate_float(&mut data, 2.75).unwrap();
        assert_eq!(Reference::root(&data).unwrap().get_f64(), Ok(2.75));
    }

    #[test]
    fn test_float_widths() {
        let mut data = encode(|b| b.float(1.5));
        let slot = root_slot(&data);
        assert_eq!(slot.byte_width(), 4);
        slot.mutate_float(&mut data, -0.375).unwrap();
        assert_eq!(Reference::root(&data).unwrap().get_f64(), Ok(-0.375));
        assert_eq!(
            slot.mutate_float(&mut data, 0.1),
            Err(Error::does_not_fit(0.1, 4))
        );
        assert_eq!(Reference::root(&data).unwrap().get_f64(), Ok(-0.375));

        let mut data = encode(|b| b.double(1.5));
        let slot = root_slot(&data);
        assert_eq!(slot.byte_width(), 8);
        slot.mutate_float(&mut data, 0.1).unwrap();
        assert_eq!(Reference::root(&data).unwrap().get_f64(), Ok(0.1));
    }

    #[test]
    fn test_bool() {
        let mut data = encode(|b| b.typed_vector_from(&[true, true]));
        let second = Reference::root(&data).unwrap().as_vector().get(1).unwrap().slot().unwrap();
        second.mutate_bool(&mut data, false).unwrap();
        assert_eq!(Reference::root(&data).unwrap().to_json(), "[true,false]");
    }

    #[test]
    fn test_string_shrinks_in_place() {
        let mut data = encode(|b| {
            b.vector(|v| {
                v.string("goblin");
                v.string("orc");
            })
        });
        let len = data.len();
        let slot = Reference::root(&data).unwrap().as_vector().get(0).unwrap().slot().unwrap();

        slot.mutate_string(&mut data, "elf").unwrap();
        assert_eq!(data.len(), len);
        assert_eq!(&data[..8], &[3, b'e', b'l', b'f', 0, 0, 0, 0]);
        assert_eq!(Reference::root(&data).unwrap().to_json(), r#"["elf","orc"]"#);

        slot.mutate_string(&mut data, "ent").unwrap();
        assert_eq!(Reference::root(&data).unwrap().as_vector().get(0).unwrap().as_str(), "ent");

        // Capacity is the current length, so a shrink is permanent
        slot.mutate_string(&mut data, "").unwrap();
        assert_eq!(
            slot.mutate_string(&mut data, "x"),
            Err(Error::StringTooLong { len: 1, capacity: 0 })
        );
    }

    #[test]
    fn test_longer_string_is_rejected() {
        let mut data = encode(|b| b.string("abc"));
        let before = data.clone();
        let slot = root_slot(&data);
        assert_eq!(
            slot.mutate_string(&mut data, "abcd"),
            Err(Error::StringTooLong { len: 4, capacity: 3 })
        );
        assert_eq!(data, before);
    }

    #[test]
    fn test_mutation_persists_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.flex");
        std::fs::write(
            &path,
            encode(|b| {
                b.map(|m| {
                    m.key("level");
                    m.uint(3);
                    m.key("name");
                    m.string("rogue");
                })
            }),
        )
        .unwrap();

        let mut data = std::fs::read(&path).unwrap();
        let map = Reference::root(&data).unwrap().as_map();
        let level = map.get("level").unwrap().slot().unwrap();
        let name = map.get("name").unwrap().slot().unwrap();
        level.mutate_uint(&mut data, 4).unwrap();
        name.mutate_string(&mut data, "mage").unwrap();
        std::fs::write(&path, &data).unwrap();

        let reloaded = std::fs::read(&path).unwrap();
        let root = Reference::root(&reloaded).unwrap();
        assert_eq!(root.to_json(), r#"{"level":4,"name":"mage"}"#);
    }
}
