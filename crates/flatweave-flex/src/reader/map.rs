use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};
use crate::types::FlexType;

use super::vector::{read_len, VectorReader};
use super::{indirect, read_width, Reference};

/// A view of a map: a sorted typed vector of keys alongside an untyped
/// vector of values
///
/// The values carry a three slot prefix before their length: the offset
/// to the key vector and that vector's byte width.
#[derive(Clone, Copy)]
pub struct MapReader<'a> {
    keys: VectorReader<'a>,
    values: VectorReader<'a>,
}

impl fmt::Debug for MapReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().filter_map(|entry| entry.ok()))
            .finish()
    }
}

impl<'a> MapReader<'a> {
    pub(super) fn from_reference(r: &Reference<'a>) -> Result<Self> {
        if r.flex_type() != FlexType::Map {
            return Err(Error::mismatch("map", r.flex_type()));
        }
        let buf = r.buffer();
        let width = r.bit_width();
        let bw = width.byte_width();
        let values = VectorReader::from_reference(r)?;

        let data = r.target()?;
        let keys_slot = data
            .checked_sub(3 * bw)
            .ok_or(Error::InvalidOffset { position: data })?;
        let keys_data = indirect(buf, keys_slot, width)?;
        let keys_width = read_width(buf, keys_slot + bw, width)?;
        let keys_len = read_len(buf, keys_data, keys_width)?;
        let keys = VectorReader::new(buf, keys_data, keys_len, keys_width, Some(FlexType::Key))?;

        if keys.len() != values.len() {
            return Err(Error::MapLengthMismatch {
                position: data,
                keys: keys.len(),
                values: values.len(),
            });
        }
        Ok(Self { keys, values })
    }

    /// A map with no entries
    pub fn empty(buf: &'a [u8]) -> Self {
        Self {
            keys: VectorReader::empty(buf),
            values: VectorReader::empty(buf),
        }
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The sorted key vector
    pub fn keys(&self) -> VectorReader<'a> {
        self.keys
    }

    /// The values, in key order
    pub fn values(&self) -> VectorReader<'a> {
        self.values
    }

    fn key_bytes(&self, index: usize) -> Result<&'a [u8]> {
        self.keys.get(index)?.key_bytes()
    }

    /// Key of the entry at `index`
    pub fn key_at(&self, index: usize) -> Result<&'a str> {
        self.keys.get(index)?.get_key()
    }

    /// Value of the entry at `index`
    pub fn value_at(&self, index: usize) -> Result<Reference<'a>> {
        self.values.get(index)
    }

    /// Binary search over the sorted keys
    pub fn index_of(&self, key: &str) -> Result<Option<usize>> {
        let needle = key.as_bytes();
        let (mut low, mut high) = (0, self.len());
        while low < high {
            let mid = low + (high - low) / 2;
            match self.key_bytes(mid)?.cmp(needle) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return Ok(Some(mid)),
            }
        }
        Ok(None)
    }

    /// The value stored under `key`
    pub fn get(&self, key: &str) -> Result<Reference<'a>> {
        match self.index_of(key)? {
            Some(index) => self.values.get(index),
            None => Err(Error::KeyNotFound(key.to_string())),
        }
    }

    #[allow(missing_docs)]
    pub fn contains_key(&self, key: &str) -> bool {
        matches!(self.index_of(key), Ok(Some(_)))
    }

    /// Entries in key order
    pub fn iter(&self) -> MapIter<'a> {
        MapIter {
            map: *self,
            index: 0,
        }
    }
}

impl<'a> IntoIterator for MapReader<'a> {
    type Item = Result<(&'a str, Reference<'a>)>;
    type IntoIter = MapIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of a [`MapReader`]
#[derive(Debug, Clone)]
pub struct MapIter<'a> {
    map: MapReader<'a>,
    index: usize,
}

impl<'a> Iterator for MapIter<'a> {
    type Item = Result<(&'a str, Reference<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.map.len() {
            return None;
        }
        let index = self.index;
        self.index += 1;
        Some(
            self.map
                .key_at(index)
                .and_then(|key| Ok((key, self.map.value_at(index)?))),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.map.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MapIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Element, FlexBuilder, FlexBuilderConfig};
    use pretty_assertions::assert_eq;

    fn map(data: &[u8]) -> MapReader<'_> {
        Reference::root(data).unwrap().get_map().unwrap()
    }

    #[test]
    fn test_map_lookup() {
        // {"foo": 1, "bar": 2, "baz": 3}
        let data = [
            102, 111, 111, 0, 98, 97, 114, 0, 98, 97, 122, 0, 3, 9, 6, 15, 3, 1, 3, 2, 3, 1, 4, 4,
            4, 6, 36, 1,
        ];
        let m = map(&data);
        assert_eq!(m.len(), 3);
        let keys: Vec<&str> = m.keys().iter().map(|k| k.unwrap().as_str()).collect();
        assert_eq!(keys, ["bar", "baz", "foo"]);
        assert_eq!(m.get("bar").map(|v| v.as_i64()), Ok(2));
        assert_eq!(m.get("baz").map(|v| v.as_i64()), Ok(3));
        assert_eq!(m.get("foo").map(|v| v.as_i64()), Ok(1));
        assert_eq!(m.get("qux").unwrap_err(), Error::KeyNotFound("qux".to_string()));
        assert!(m.contains_key("foo"));
        assert!(!m.contains_key("fo"));
    }

    #[test]
    fn test_map_of_ints() {
        // {"bar": 14, "foo": 13}
        let data = [98, 97, 114, 0, 102, 111, 111, 0, 2, 9, 6, 2, 1, 2, 14, 13, 4, 4, 4, 36, 1];
        let m = map(&data);
        assert_eq!(m.index_of("foo"), Ok(Some(1)));
        assert_eq!(m.get("foo").and_then(|v| v.get_i64()), Ok(13));
        assert_eq!(m.get("bar").and_then(|v| v.get_i64()), Ok(14));
        assert_eq!(m.key_at(0), Ok("bar"));

        let entries: Vec<(&str, i64)> = m
            .iter()
            .map(|e| e.map(|(k, v)| (k, v.as_i64())).unwrap())
            .collect();
        assert_eq!(entries, [("bar", 14), ("foo", 13)]);

        // A map read as a vector gives its values
        let values = Reference::root(&data).unwrap().as_vector();
        assert_eq!(values.get(1).unwrap().as_i64(), 13);
    }

    #[test]
    fn test_empty_map() {
        let mut b = FlexBuilder::new();
        b.map(|_| {});
        let data = b.finish();
        let m = map(data);
        assert!(m.is_empty());
        assert_eq!(m.index_of("a"), Ok(None));
        assert_eq!(m.iter().count(), 0);
    }

    #[test]
    fn test_map_with_empty_key() {
        // {"a": 12, "": 45}
        let data = [97, 0, 0, 2, 2, 5, 2, 1, 2, 45, 12, 4, 4, 4, 36, 1];
        let m = map(&data);
        assert_eq!(m.key_at(0), Ok(""));
        assert_eq!(m.get("").and_then(|v| v.get_i64()), Ok(45));
        assert_eq!(m.get("a").and_then(|v| v.get_i64()), Ok(12));
    }

    #[test]
    fn test_key_vector_length_must_match() {
        // {"bar": 14, "foo": 13} with the value count bumped to 3
        let data = [98, 97, 114, 0, 102, 111, 111, 0, 2, 9, 6, 2, 1, 3, 14, 13, 4, 4, 4, 36, 1];
        let err = Reference::root(&data).unwrap().get_map().unwrap_err();
        assert!(matches!(err, Error::MapLengthMismatch { keys: 2, values: 3, .. }), "{err:?}");
    }

    #[test]
    fn test_not_a_map() {
        let data = [1, 2, 4, 3, 76, 1];
        let r = Reference::root(&data).unwrap();
        assert_eq!(r.get_map().unwrap_err(), Error::mismatch("map", FlexType::VectorInt3));
        assert!(r.as_map().is_empty());
    }

    #[test]
    fn test_lookup_across_many_keys() {
        let names: Vec<String> = (0..500).map(|i| format!("key{i:04}")).collect();
        let entries: Vec<(&str, Element<'_>)> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), Element::Int(i as i64 * 7)))
            .collect();

        for share_keys in [true, false] {
            let mut b = FlexBuilder::with_config(FlexBuilderConfig::new().share_keys(share_keys));
            b.map_from_entries(&entries);
            let data = b.finish();
            let m = map(data);
            assert_eq!(m.len(), 500);
            assert_eq!(m.keys().byte_width(), 2);
            for (i, name) in names.iter().enumerate() {
                assert_eq!(m.get(name).map(|v| v.as_i64()), Ok(i as i64 * 7));
            }
        }
    }

    #[test]
    fn test_nested_maps() {
        let mut b = FlexBuilder::new();
        b.map(|m| {
            m.key("inner");
            m.map(|inner| {
                inner.key("z");
                inner.bool(true);
                inner.key("a");
                inner.null();
            });
            m.key("list");
            m.vector(|v| {
                v.map(|e| {
                    e.key("id");
                    e.uint(9);
                });
            });
        });
        let data = b.finish();
        let root = map(data);
        let inner = root.get("inner").unwrap().as_map();
        assert_eq!(inner.key_at(0), Ok("a"));
        assert!(inner.get("z").unwrap().as_bool());
        let id = root.get("list").unwrap().as_vector().get(0).unwrap().as_map().get("id");
        assert_eq!(id.map(|v| v.as_u64()), Ok(9));
    }
}
