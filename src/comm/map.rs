//! Distributed map from string key to an arbitrary value, sharded by the
//! node-key partitioner, plus a plain rank-local slot for algorithm
//! scratch state reachable from task closures.
//!
//! Async operations run on the key's owning rank before the next barrier
//! completes. Visitor closures may send further messages (including to the
//! map they run on — those are deferred), but must not synchronously
//! re-enter the same object.

use std::collections::HashMap;

use super::{Comm, KeyPartitioner, ObjId};

pub struct DistMap<'a, V> {
    comm: &'a Comm,
    id: ObjId,
    part: KeyPartitioner,
    _marker: std::marker::PhantomData<V>,
}

impl<'a, V: Send + 'static> DistMap<'a, V> {
    /// Collective constructor.
    pub fn new(comm: &'a Comm) -> Self {
        let id = comm.register(HashMap::<String, V>::new());
        Self {
            comm,
            id,
            part: KeyPartitioner::new(comm.world_size()),
            _marker: std::marker::PhantomData,
        }
    }

    /// Rebind a handle inside a task closure, by id.
    pub fn attach(comm: &'a Comm, id: ObjId) -> Self {
        Self {
            comm,
            id,
            part: KeyPartitioner::new(comm.world_size()),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn owner(&self, key: &str) -> usize {
        self.part.owner(key)
    }

    pub fn is_mine(&self, key: &str) -> bool {
        self.owner(key) == self.comm.rank()
    }

    /// Visit the entry on its owning rank, default-constructing it first
    /// when absent.
    pub fn async_visit(&self, key: String, f: impl FnOnce(&Comm, &str, &mut V) + Send + 'static)
    where
        V: Default,
    {
        let id = self.id;
        let dest = self.owner(&key);
        self.comm.send(dest, move |c| {
            c.with_object::<HashMap<String, V>, _>(id, |m| {
                let entry = m.entry(key.clone()).or_default();
                f(c, &key, entry);
            });
        });
    }

    /// Visit the entry on its owning rank iff it exists.
    pub fn async_visit_if_exists(
        &self,
        key: String,
        f: impl FnOnce(&Comm, &str, &mut V) + Send + 'static,
    ) {
        let id = self.id;
        let dest = self.owner(&key);
        self.comm.send(dest, move |c| {
            c.with_object::<HashMap<String, V>, _>(id, |m| {
                if let Some(entry) = m.get_mut(&key) {
                    f(c, &key, entry);
                }
            });
        });
    }

    /// Insert or overwrite on the owning rank.
    pub fn async_insert(&self, key: String, value: V) {
        let id = self.id;
        let dest = self.owner(&key);
        self.comm.send(dest, move |c| {
            c.with_object::<HashMap<String, V>, _>(id, |m| {
                m.insert(key, value);
            });
        });
    }

    /// Insert on the owning rank unless the key is already present.
    pub fn async_insert_if_missing(&self, key: String, value: V) {
        let id = self.id;
        let dest = self.owner(&key);
        self.comm.send(dest, move |c| {
            c.with_object::<HashMap<String, V>, _>(id, |m| {
                m.entry(key).or_insert(value);
            });
        });
    }

    /// Insert, or combine with the existing value on collision.
    pub fn async_reduce(
        &self,
        key: String,
        value: V,
        combine: impl FnOnce(&V, V) -> V + Send + 'static,
    ) {
        let id = self.id;
        let dest = self.owner(&key);
        self.comm.send(dest, move |c| {
            c.with_object::<HashMap<String, V>, _>(id, |m| {
                match m.remove(&key) {
                    Some(old) => {
                        let merged = combine(&old, value);
                        m.insert(key, merged);
                    }
                    None => {
                        m.insert(key, value);
                    }
                }
            });
        });
    }

    // ── Rank-local operations ─────────────────────────────────────────

    pub fn local_insert(&self, key: String, value: V) {
        self.comm
            .with_object::<HashMap<String, V>, _>(self.id, |m| {
                m.insert(key, value);
            });
    }

    pub fn local_contains(&self, key: &str) -> bool {
        self.comm
            .with_object::<HashMap<String, V>, _>(self.id, |m| m.contains_key(key))
    }

    pub fn local_get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.comm
            .with_object::<HashMap<String, V>, _>(self.id, |m| m.get(key).cloned())
    }

    pub fn local_len(&self) -> usize {
        self.comm
            .with_object::<HashMap<String, V>, _>(self.id, |m| m.len())
    }

    /// Visit this rank's shard.
    pub fn local_for_all(&self, mut f: impl FnMut(&str, &mut V)) {
        self.comm.with_object::<HashMap<String, V>, _>(self.id, |m| {
            for (key, value) in m.iter_mut() {
                f(key, value);
            }
        });
    }

    /// Collective: global entry count. Implies a barrier.
    pub fn size(&self) -> u64 {
        let local = self.local_len() as u64;
        self.comm.all_reduce_sum(local)
    }

    /// Swap local shards with another map of the same type.
    pub fn swap(&self, other: &DistMap<'_, V>) {
        self.comm.with_object::<HashMap<String, V>, _>(self.id, |a| {
            other
                .comm
                .with_object::<HashMap<String, V>, _>(other.id, |b| std::mem::swap(a, b));
        });
    }

    pub fn local_clear(&self) {
        self.comm
            .with_object::<HashMap<String, V>, _>(self.id, |m| m.clear());
    }
}

/// A single rank-local value reachable from task closures by id.
pub struct RankLocal<'a, T> {
    comm: &'a Comm,
    id: ObjId,
    _marker: std::marker::PhantomData<T>,
}

impl<'a, T: 'static> RankLocal<'a, T> {
    pub fn new(comm: &'a Comm, value: T) -> Self {
        let id = comm.register(value);
        Self {
            comm,
            id,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn attach(comm: &'a Comm, id: ObjId) -> Self {
        Self {
            comm,
            id,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.comm.with_object::<T, _>(self.id, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::World;

    #[test]
    fn test_visit_creates_default() {
        let comm = Comm::solo();
        let map: DistMap<Vec<String>> = DistMap::new(&comm);
        map.async_visit("u".into(), |_, _, adj| adj.push("v".into()));
        map.async_visit("u".into(), |_, _, adj| adj.push("w".into()));
        comm.barrier();
        assert_eq!(map.local_get("u"), Some(vec!["v".into(), "w".into()]));
    }

    #[test]
    fn test_visit_if_exists_skips_absent() {
        let comm = Comm::solo();
        let map: DistMap<u64> = DistMap::new(&comm);
        map.async_insert("present".into(), 1);
        comm.barrier();
        map.async_visit_if_exists("present".into(), |_, _, v| *v += 1);
        map.async_visit_if_exists("absent".into(), |_, _, v| *v += 1);
        comm.barrier();
        assert_eq!(map.local_get("present"), Some(2));
        assert!(!map.local_contains("absent"));
    }

    #[test]
    fn test_insert_if_missing() {
        let comm = Comm::solo();
        let map: DistMap<u64> = DistMap::new(&comm);
        map.async_insert_if_missing("k".into(), 1);
        map.async_insert_if_missing("k".into(), 2);
        comm.barrier();
        assert_eq!(map.local_get("k"), Some(1));
    }

    #[test]
    fn test_async_reduce_keeps_minimum() {
        let comm = Comm::solo();
        let map: DistMap<String> = DistMap::new(&comm);
        map.async_reduce("n".into(), "c".into(), |a, b| std::cmp::min(a.clone(), b));
        map.async_reduce("n".into(), "a".into(), |a, b| std::cmp::min(a.clone(), b));
        map.async_reduce("n".into(), "b".into(), |a, b| std::cmp::min(a.clone(), b));
        comm.barrier();
        assert_eq!(map.local_get("n"), Some("a".into()));
    }

    #[test]
    fn test_swap_and_clear() {
        let comm = Comm::solo();
        let a: DistMap<u64> = DistMap::new(&comm);
        let b: DistMap<u64> = DistMap::new(&comm);
        a.local_insert("x".into(), 1);
        a.swap(&b);
        assert_eq!(a.local_len(), 0);
        assert_eq!(b.local_len(), 1);
        b.local_clear();
        assert_eq!(b.local_len(), 0);
    }

    #[test]
    fn test_sharding_across_ranks() {
        let results = World::run(3, |comm| {
            let map: DistMap<u64> = DistMap::new(comm);
            for i in 0..30 {
                map.async_reduce(format!("k{}", i), 1, |a, b| a + b);
            }
            comm.barrier();

            let mut local = 0;
            map.local_for_all(|k, _| {
                assert!(map.is_mine(k));
                local += 1;
            });
            (map.size(), local)
        });
        assert_eq!(results[0].0, 30);
        let total: u64 = results.iter().map(|(_, n)| *n as u64).sum();
        assert_eq!(total, 30);
    }

    #[test]
    fn test_handler_reaches_sibling_objects() {
        // A visitor on one map updates a rank-local table and re-sends to
        // another map; the classic frontier-expansion shape.
        let results = World::run(2, |comm| {
            let frontier: DistMap<u64> = DistMap::new(comm);
            let seen = RankLocal::new(comm, 0u64);
            let seen_id = seen.id();
            let next: DistMap<u64> = DistMap::new(comm);
            let next_id = next.id();

            frontier.async_visit("start".into(), move |c, _, v| {
                *v = 1;
                RankLocal::<u64>::attach(c, seen_id).with(|n| *n += 1);
                DistMap::<u64>::attach(c, next_id).async_insert("next-hop".into(), 2);
            });
            comm.barrier();
            let total_next = next.size();
            let local_seen = seen.with(|n| *n);
            (total_next, local_seen)
        });
        assert_eq!(results[0].0, 1);
        let seen_total: u64 = results.iter().map(|(_, s)| s).sum();
        assert_eq!(seen_total, 1);
    }
}
