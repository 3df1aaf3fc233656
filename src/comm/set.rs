//! Distributed string set, sharded by the node-key partitioner.
//!
//! Inserts are fire-and-forget messages to the owning rank; local reads
//! touch only this rank's shard. Collective operations (`new`, `size`,
//! `clear`) must be called on every rank.

use std::collections::HashSet;

use super::{Comm, KeyPartitioner, ObjId};

pub struct DistSet<'a> {
    comm: &'a Comm,
    id: ObjId,
    part: KeyPartitioner,
}

impl<'a> DistSet<'a> {
    /// Collective constructor.
    pub fn new(comm: &'a Comm) -> Self {
        let id = comm.register(HashSet::<String>::new());
        Self {
            comm,
            id,
            part: KeyPartitioner::new(comm.world_size()),
        }
    }

    /// Rebind a handle inside a task closure, by id.
    pub fn attach(comm: &'a Comm, id: ObjId) -> Self {
        Self {
            comm,
            id,
            part: KeyPartitioner::new(comm.world_size()),
        }
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn owner(&self, key: &str) -> usize {
        self.part.owner(key)
    }

    /// Insert on the owning rank. Visible after the next barrier.
    pub fn async_insert(&self, key: String) {
        let id = self.id;
        let dest = self.owner(&key);
        self.comm.send(dest, move |c| {
            c.with_object::<HashSet<String>, _>(id, |s| {
                s.insert(key);
            });
        });
    }

    /// Insert on the owning rank; when the key was new, run `then` there
    /// after the insert.
    pub fn async_insert_exec_if_missing(
        &self,
        key: String,
        then: impl FnOnce(&Comm, &str) + Send + 'static,
    ) {
        let id = self.id;
        let dest = self.owner(&key);
        self.comm.send(dest, move |c| {
            let inserted = c.with_object::<HashSet<String>, _>(id, |s| s.insert(key.clone()));
            if inserted {
                then(c, &key);
            }
        });
    }

    /// Run `then` on the owning rank iff the key is a member.
    pub fn async_exec_if_contains(
        &self,
        key: String,
        then: impl FnOnce(&Comm, &str) + Send + 'static,
    ) {
        let id = self.id;
        let dest = self.owner(&key);
        self.comm.send(dest, move |c| {
            let found = c.with_object::<HashSet<String>, _>(id, |s| s.contains(&key));
            if found {
                then(c, &key);
            }
        });
    }

    /// Insert directly into this rank's shard. The caller owns the key's
    /// placement (used from handlers already running on the owner).
    pub fn local_insert(&self, key: String) -> bool {
        self.comm
            .with_object::<HashSet<String>, _>(self.id, |s| s.insert(key))
    }

    pub fn local_contains(&self, key: &str) -> bool {
        self.comm
            .with_object::<HashSet<String>, _>(self.id, |s| s.contains(key))
    }

    pub fn local_len(&self) -> usize {
        self.comm.with_object::<HashSet<String>, _>(self.id, |s| s.len())
    }

    /// Visit this rank's shard.
    pub fn local_for_all(&self, mut f: impl FnMut(&str)) {
        self.comm.with_object::<HashSet<String>, _>(self.id, |s| {
            for key in s.iter() {
                f(key);
            }
        });
    }

    /// Drain this rank's shard into a vector.
    pub fn local_drain(&self) -> Vec<String> {
        self.comm
            .with_object::<HashSet<String>, _>(self.id, |s| s.drain().collect())
    }

    /// Collective: global element count. Implies a barrier.
    pub fn size(&self) -> u64 {
        let local = self.local_len() as u64;
        self.comm.all_reduce_sum(local)
    }

    /// Collective: clear every shard.
    pub fn clear(&self) {
        self.comm
            .with_object::<HashSet<String>, _>(self.id, |s| s.clear());
    }

    /// Swap local shards with another set.
    pub fn swap(&self, other: &DistSet<'_>) {
        self.comm.with_object::<HashSet<String>, _>(self.id, |a| {
            other
                .comm
                .with_object::<HashSet<String>, _>(other.id, |b| std::mem::swap(a, b));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::World;

    #[test]
    fn test_solo_insert_and_size() {
        let comm = Comm::solo();
        let set = DistSet::new(&comm);
        set.async_insert("a".into());
        set.async_insert("b".into());
        set.async_insert("a".into());
        assert_eq!(set.size(), 2);
        assert!(set.local_contains("a"));
    }

    #[test]
    fn test_keys_land_on_owning_rank() {
        let results = World::run(3, |comm| {
            let set = DistSet::new(comm);
            // Every rank inserts the same keys; dedup happens at owners.
            for i in 0..30 {
                set.async_insert(format!("key-{}", i));
            }
            comm.barrier();

            let mut local = Vec::new();
            set.local_for_all(|k| local.push(k.to_string()));
            for k in &local {
                assert_eq!(set.owner(k), comm.rank());
            }
            (set.size(), local.len())
        });
        let total: usize = results.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 30);
        for (size, _) in results {
            assert_eq!(size, 30);
        }
    }

    #[test]
    fn test_insert_exec_if_missing_fires_once() {
        let results = World::run(2, |comm| {
            let set = DistSet::new(comm);
            let hits = comm.register(0u64);
            for _ in 0..4 {
                set.async_insert_exec_if_missing("dup".into(), move |c, _| {
                    c.with_object::<u64, _>(hits, |n| *n += 1);
                });
            }
            comm.barrier();
            comm.with_object::<u64, _>(hits, |n| *n)
        });
        // The key has one owner; the callback ran exactly once there.
        assert_eq!(results.iter().sum::<u64>(), 1);
    }

    #[test]
    fn test_clear_collective() {
        World::run(2, |comm| {
            let set = DistSet::new(comm);
            set.async_insert(format!("from-{}", comm.rank()));
            comm.barrier();
            set.clear();
            assert_eq!(set.size(), 0);
        });
    }
}
