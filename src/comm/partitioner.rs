//! Rank assignment by stable hash of a string key.
//!
//! The hash must agree across every rank in a run; it is computed with
//! blake3 so rank assignment never depends on process-local hasher state.
//! Stability across versions is a non-goal.

/// First eight little-endian bytes of the blake3 digest.
pub fn stable_hash64(key: &str) -> u64 {
    let digest = blake3::hash(key.as_bytes());
    u64::from_le_bytes(digest.as_bytes()[0..8].try_into().expect("digest >= 8 bytes"))
}

/// Maps node keys to their owning rank.
#[derive(Debug, Clone, Copy)]
pub struct KeyPartitioner {
    world_size: usize,
}

impl KeyPartitioner {
    pub fn new(world_size: usize) -> Self {
        debug_assert!(world_size >= 1);
        Self { world_size }
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn owner(&self, key: &str) -> usize {
        (stable_hash64(key) % self.world_size as u64) as usize
    }
}
