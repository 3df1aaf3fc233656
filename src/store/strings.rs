//! Persistent string intern pool.
//!
//! Stores each distinct string exactly once in a single append-only buffer
//! and hands out byte offsets as handles. Offsets stay valid across runs
//! because the buffer is persisted verbatim.
//!
//! Buffer layout, one entry after another:
//! ```text
//! [length: u64 LE][bytes: length][NUL]
//! ```
//! A handle is the offset of the payload bytes; the length sits at a fixed
//! negative offset (-8) in front of it.
//!
//! `find_or_add` is idempotent on content: equal inputs return equal
//! offsets. Entries are never collected during a run; `clear` is the only
//! way to drop them, and it invalidates every outstanding handle.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Width of the length prefix in front of each payload.
const LEN_PREFIX: usize = std::mem::size_of::<u64>();

/// Intern pool for variable-length strings. Single-owner per rank; no
/// internal synchronization.
#[derive(Debug, Default)]
pub struct StringStore {
    /// Concatenated `[len][bytes][NUL]` entries.
    data: Vec<u8>,
    /// Dedup index: string -> payload offset. Rebuilt when a heap image is
    /// loaded; not part of the persistent form.
    index: HashMap<String, u64>,
}

impl StringStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning the offset of its payload bytes.
    ///
    /// Repeated calls with byte-equal input return the same offset.
    pub fn find_or_add(&mut self, s: &str) -> u64 {
        if let Some(&off) = self.index.get(s) {
            return off;
        }

        let payload_off = (self.data.len() + LEN_PREFIX) as u64;
        self.data.extend_from_slice(&(s.len() as u64).to_le_bytes());
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        self.index.insert(s.to_string(), payload_off);
        payload_off
    }

    /// Look up a string without inserting. Lookup by `&str` allocates no key.
    pub fn find(&self, s: &str) -> Option<u64> {
        self.index.get(s).copied()
    }

    /// Payload length for a handle. The length lives at `offset - 8`.
    pub fn len_at(&self, offset: u64) -> usize {
        let start = offset as usize - LEN_PREFIX;
        let raw: [u8; LEN_PREFIX] = self.data[start..start + LEN_PREFIX]
            .try_into()
            .expect("length prefix in bounds");
        u64::from_le_bytes(raw) as usize
    }

    /// Resolve a handle to its string.
    pub fn get(&self, offset: u64) -> &str {
        let len = self.len_at(offset);
        let start = offset as usize;
        // Entries are validated UTF-8 on load and come from &str on insert.
        std::str::from_utf8(&self.data[start..start + len]).expect("interned string is UTF-8")
    }

    /// Number of distinct interned strings.
    pub fn size(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Iterate `(offset, string)` pairs in insertion order.
    pub fn iter(&self) -> StringStoreIter<'_> {
        StringStoreIter {
            store: self,
            pos: 0,
        }
    }

    /// Drop every entry. Outstanding handles become invalid.
    pub fn clear(&mut self) {
        self.data.clear();
        self.index.clear();
    }

    /// Rebuild the dedup index by walking the buffer. Validates entry
    /// bounds and UTF-8.
    fn rebuild_index(data: &[u8]) -> Result<HashMap<String, u64>> {
        let mut index = HashMap::new();
        let mut pos = 0usize;
        while pos < data.len() {
            if pos + LEN_PREFIX > data.len() {
                return Err(GraphError::InvalidFormat(
                    "String store entry header truncated".into(),
                ));
            }
            let raw: [u8; LEN_PREFIX] = data[pos..pos + LEN_PREFIX].try_into().unwrap();
            let len = u64::from_le_bytes(raw) as usize;
            let payload = pos + LEN_PREFIX;
            let end = payload + len;
            if end + 1 > data.len() {
                return Err(GraphError::InvalidFormat(
                    "String store entry out of bounds".into(),
                ));
            }
            let s = std::str::from_utf8(&data[payload..end]).map_err(|_| {
                GraphError::InvalidFormat("String store contains invalid UTF-8".into())
            })?;
            index.insert(s.to_string(), payload as u64);
            pos = end + 1;
        }
        Ok(index)
    }
}

pub struct StringStoreIter<'a> {
    store: &'a StringStore,
    pos: usize,
}

impl<'a> Iterator for StringStoreIter<'a> {
    type Item = (u64, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.store.data.len() {
            return None;
        }
        let payload = (self.pos + LEN_PREFIX) as u64;
        let len = self.store.len_at(payload);
        let s = self.store.get(payload);
        self.pos += LEN_PREFIX + len + 1;
        Some((payload, s))
    }
}

// The persistent form is the raw buffer; the index is derived state.

impl Serialize for StringStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("StringStore", 1)?;
        st.serialize_field("data", &self.data)?;
        st.end()
    }
}

impl<'de> Deserialize<'de> for StringStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StoreVisitor;

        impl<'de> Visitor<'de> for StoreVisitor {
            type Value = StringStore;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("struct StringStore")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<StringStore, A::Error> {
                let mut data: Option<Vec<u8>> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "data" => data = Some(map.next_value()?),
                        _ => {
                            let _: de::IgnoredAny = map.next_value()?;
                        }
                    }
                }
                let data = data.ok_or_else(|| de::Error::missing_field("data"))?;
                let index = StringStore::rebuild_index(&data)
                    .map_err(|e| de::Error::custom(e.to_string()))?;
                Ok(StringStore { data, index })
            }

            fn visit_seq<A: de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<StringStore, A::Error> {
                let data: Vec<u8> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let index = StringStore::rebuild_index(&data)
                    .map_err(|e| de::Error::custom(e.to_string()))?;
                Ok(StringStore { data, index })
            }
        }

        deserializer.deserialize_struct("StringStore", &["data"], StoreVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store() {
        let st = StringStore::new();
        assert_eq!(st.size(), 0);
        assert!(st.is_empty());
        assert_eq!(st.find("anything"), None);
        assert_eq!(st.iter().count(), 0);
    }

    #[test]
    fn test_find_or_add_idempotent() {
        let mut st = StringStore::new();
        let a = st.find_or_add("hello");
        let b = st.find_or_add("hello");
        let c = st.find_or_add("hello");
        let d = st.find_or_add("hello");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(c, d);
        assert_eq!(st.size(), 1);
        assert_eq!(st.get(a), "hello");
    }

    #[test]
    fn test_distinct_strings_get_distinct_offsets() {
        let mut st = StringStore::new();
        let a = st.find_or_add("alpha");
        let b = st.find_or_add("beta");
        assert_ne!(a, b);
        assert_eq!(st.get(a), "alpha");
        assert_eq!(st.get(b), "beta");
        assert_eq!(st.size(), 2);
    }

    #[test]
    fn test_length_at_negative_offset() {
        let mut st = StringStore::new();
        let off = st.find_or_add("four");
        assert_eq!(st.len_at(off), 4);
        let off2 = st.find_or_add("");
        assert_eq!(st.len_at(off2), 0);
        assert_eq!(st.get(off2), "");
    }

    #[test]
    fn test_find_does_not_insert() {
        let mut st = StringStore::new();
        assert_eq!(st.find("ghost"), None);
        assert_eq!(st.size(), 0);
        let off = st.find_or_add("ghost");
        assert_eq!(st.find("ghost"), Some(off));
    }

    #[test]
    fn test_iteration_in_insertion_order() {
        let mut st = StringStore::new();
        st.find_or_add("c");
        st.find_or_add("a");
        st.find_or_add("b");
        let collected: Vec<&str> = st.iter().map(|(_, s)| s).collect();
        assert_eq!(collected, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_clear() {
        let mut st = StringStore::new();
        st.find_or_add("x");
        st.find_or_add("y");
        st.clear();
        assert_eq!(st.size(), 0);
        assert_eq!(st.find("x"), None);
        // Interning after clear starts a fresh offset space.
        let off = st.find_or_add("x");
        assert_eq!(st.get(off), "x");
    }

    #[test]
    fn test_serde_roundtrip_rebuilds_index() {
        let mut st = StringStore::new();
        let a = st.find_or_add("foo");
        let b = st.find_or_add("bar");
        st.find_or_add("\u{1F600}\u{0410}");

        let bytes = bincode::serialize(&st).unwrap();
        let mut loaded: StringStore = bincode::deserialize(&bytes).unwrap();

        assert_eq!(loaded.size(), 3);
        assert_eq!(loaded.get(a), "foo");
        assert_eq!(loaded.get(b), "bar");
        // Dedup keeps working against reloaded entries.
        assert_eq!(loaded.find_or_add("foo"), a);
        assert_eq!(loaded.size(), 3);
    }

    #[test]
    fn test_corrupt_image_rejected() {
        let mut st = StringStore::new();
        st.find_or_add("hello");
        let bytes = bincode::serialize(&st).unwrap();

        // Truncating the buffer must fail the load, not panic.
        let truncated = &bytes[..bytes.len() - 3];
        assert!(bincode::deserialize::<StringStore>(truncated).is_err());
    }

    #[test]
    fn test_long_string() {
        let long = "z".repeat(100_000);
        let mut st = StringStore::new();
        let off = st.find_or_add(&long);
        assert_eq!(st.get(off), long.as_str());
        assert_eq!(st.len_at(off), 100_000);
    }
}
