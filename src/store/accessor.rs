//! Short-string-optimized handle into the string store.
//!
//! A fixed 16-byte value type that either carries the string inline or
//! references a pooled entry by offset. The byte layout is part of the
//! persistent ABI and cannot change without a format version bump:
//!
//! ```text
//! Inline (length <= 14):
//! Offset  Size  Field
//! 0       len   string bytes
//! len     1     NUL slot
//! 15      1     length (0..=14)
//!
//! Pooled:
//! Offset  Size  Field
//! 0       8     string store offset: u64 LE
//! 8       4     length: u32 LE
//! 12      3     zero padding
//! 15      1     tag: 0xFF
//! ```
//!
//! Equality is raw-byte equality. That is value equality: short strings are
//! never pooled, and pooled offsets are canonical because the store interns.

use serde::{Deserialize, Serialize};

use crate::store::strings::StringStore;

/// Compile-time inline capacity in bytes.
pub const INLINE_CAP: usize = 14;

/// Tag byte marking a pooled handle.
const POOLED_TAG: u8 = 0xFF;

/// A compact handle representing one string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct StrHandle {
    raw: [u8; 16],
}

impl StrHandle {
    /// Build a handle, pooling the payload when it exceeds the inline bound.
    pub fn new(s: &str, pool: &mut StringStore) -> Self {
        if s.len() <= INLINE_CAP {
            Self::inline(s)
        } else {
            Self::pooled(pool.find_or_add(s), s.len())
        }
    }

    /// Inline construction. Caller guarantees `s.len() <= INLINE_CAP`.
    pub fn inline(s: &str) -> Self {
        debug_assert!(s.len() <= INLINE_CAP);
        let mut raw = [0u8; 16];
        raw[..s.len()].copy_from_slice(s.as_bytes());
        raw[15] = s.len() as u8;
        Self { raw }
    }

    /// Pooled construction from a store offset and payload length.
    pub fn pooled(offset: u64, len: usize) -> Self {
        let mut raw = [0u8; 16];
        raw[0..8].copy_from_slice(&offset.to_le_bytes());
        raw[8..12].copy_from_slice(&(len as u32).to_le_bytes());
        raw[15] = POOLED_TAG;
        Self { raw }
    }

    pub fn is_inline(&self) -> bool {
        self.raw[15] != POOLED_TAG
    }

    pub fn len(&self) -> usize {
        if self.is_inline() {
            self.raw[15] as usize
        } else {
            u32::from_le_bytes(self.raw[8..12].try_into().unwrap()) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pool offset of a pooled handle.
    fn offset(&self) -> u64 {
        debug_assert!(!self.is_inline());
        u64::from_le_bytes(self.raw[0..8].try_into().unwrap())
    }

    /// View of the full string regardless of inline vs pooled.
    pub fn as_str<'a>(&'a self, pool: &'a StringStore) -> &'a str {
        if self.is_inline() {
            let len = self.raw[15] as usize;
            std::str::from_utf8(&self.raw[..len]).expect("inline handle holds UTF-8")
        } else {
            pool.get(self.offset())
        }
    }
}
