//! Distributed counting set: key → occurrence count, sharded by the
//! node-key partitioner. The workhorse of the degree computations.

use std::collections::HashMap;

use super::{Comm, KeyPartitioner, ObjId};

pub struct DistCountingSet<'a> {
    comm: &'a Comm,
    id: ObjId,
    part: KeyPartitioner,
}

impl<'a> DistCountingSet<'a> {
    /// Collective constructor.
    pub fn new(comm: &'a Comm) -> Self {
        let id = comm.register(HashMap::<String, u64>::new());
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

    /// Count one occurrence on the owning rank.
    pub fn async_insert(&self, key: String) {
        self.async_insert_count(key, 1);
    }

    /// Count `n` occurrences on the owning rank.
    pub fn async_insert_count(&self, key: String, n: u64) {
        let id = self.id;
        let dest = self.owner(&key);
        self.comm.send(dest, move |c| {
            c.with_object::<HashMap<String, u64>, _>(id, |m| {
                *m.entry(key).or_insert(0) += n;
            });
        });
    }

    /// Visit this rank's shard.
    pub fn local_for_all(&self, mut f: impl FnMut(&str, u64)) {
        self.comm.with_object::<HashMap<String, u64>, _>(self.id, |m| {
            for (key, count) in m.iter() {
                f(key, *count);
            }
        });
    }

    pub fn local_len(&self) -> usize {
        self.comm
            .with_object::<HashMap<String, u64>, _>(self.id, |m| m.len())
    }

    /// Collective: number of distinct keys. Implies a barrier.
    pub fn size(&self) -> u64 {
        let local = self.local_len() as u64;
        self.comm.all_reduce_sum(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::World;

    #[test]
    fn test_solo_counts() {
        let comm = Comm::solo();
        let counts = DistCountingSet::new(&comm);
        counts.async_insert("a".into());
        counts.async_insert("a".into());
        counts.async_insert("b".into());
        comm.barrier();

        let mut got = Vec::new();
        counts.local_for_all(|k, n| got.push((k.to_string(), n)));
        got.sort();
        assert_eq!(got, vec![("a".to_string(), 2), ("b".to_string(), 1)]);
    }

    #[test]
    fn test_counts_accumulate_across_ranks() {
        let results = World::run(3, |comm| {
            let counts = DistCountingSet::new(comm);
            // Each rank counts the shared key once and its own key twice.
            counts.async_insert("shared".into());
            counts.async_insert_count(format!("own-{}", comm.rank()), 2);
            comm.barrier();

            let mut local = HashMap::new();
            counts.local_for_all(|k, n| {
                local.insert(k.to_string(), n);
            });
            (counts.size(), local)
        });

        assert_eq!(results[0].0, 4); // "shared" + three "own-*"
        let merged: HashMap<String, u64> = results
            .into_iter()
            .flat_map(|(_, m)| m.into_iter())
            .collect();
        assert_eq!(merged["shared"], 3);
        assert_eq!(merged["own-0"], 2);
        assert_eq!(merged["own-1"], 2);
        assert_eq!(merged["own-2"], 2);
    }
}
