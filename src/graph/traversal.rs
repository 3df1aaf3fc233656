//! Breadth-first traversals: single-source BFS levels and multi-source
//! n-hops distances.

use std::collections::HashMap;

use crate::comm::{DistMap, DistSet, RankLocal};
use crate::error::Result;
use crate::graph::components::split_clause;
use crate::graph::report::OpReport;
use crate::graph::{Graph, WhereClause};
use crate::store::value::PrimitiveType;

impl Graph<'_> {
    /// Single-source BFS. The source is level 0; each round advances the
    /// frontier one level, setting a neighbor's level iff currently unset.
    /// Optionally writes the levels into a new u64 node series; returns
    /// the total number of nodes visited. Collective.
    pub fn bfs(
        &mut self,
        source: &str,
        undirected: bool,
        out_name: Option<&str>,
        where_: Option<&WhereClause>,
    ) -> Result<(u64, OpReport)> {
        let out_idx = match out_name {
            Some(name) => Some(self.fresh_node_series(name, PrimitiveType::UInt64)?.1),
            None => None,
        };
        let (node_where, edge_where) = split_clause(where_)?;
        let comm = self.comm();

        let adj: DistMap<Vec<String>> = DistMap::new(comm);
        self.for_all_nodes(node_where, |row| {
            if let Ok(key) = self
                .nodes()
                .get_str(self.node_id_col(), row, self.strings())
            {
                adj.async_insert_if_missing(key.to_string(), Vec::new());
            }
        })?;
        comm.barrier();

        let u_col = self.edge_u_col();
        let v_col = self.edge_v_col();
        self.for_all_edges(edge_where, |row| {
            let u = self.edges().get_str(u_col, row, self.strings());
            let v = self.edges().get_str(v_col, row, self.strings());
            let (Ok(u), Ok(v)) = (u, v) else { return };
            let (u, v) = (u.to_string(), v.to_string());
            let v2 = v.clone();
            let u2 = u.clone();
            adj.async_visit_if_exists(u, move |_, _, list| list.push(v2));
            if undirected {
                adj.async_visit_if_exists(v, move |_, _, list| list.push(u2));
            }
        })?;
        comm.barrier();

        let levels: RankLocal<HashMap<String, u64>> = RankLocal::new(comm, HashMap::new());
        let levels_id = levels.id();
        if adj.is_mine(source) {
            levels.with(|t| t.insert(source.to_string(), 0));
        }
        comm.barrier();

        let mut local_visited = 0u64;
        let mut level = 0u64;
        loop {
            let mut count = 0u64;
            adj.local_for_all(|vertex, neighbors| {
                let at_level = levels.with(|t| t.get(vertex) == Some(&level));
                if !at_level {
                    return;
                }
                count += 1;
                for neighbor in neighbors.iter() {
                    adj.async_visit_if_exists(neighbor.clone(), move |c, n_key, _| {
                        RankLocal::<HashMap<String, u64>>::attach(c, levels_id).with(|t| {
                            t.entry(n_key.to_string()).or_insert(level + 1);
                        });
                    });
                }
            });
            comm.barrier();
            local_visited += count;
            if comm.all_reduce_sum(count) == 0 {
                break;
            }
            level += 1;
        }

        let mut report = OpReport::new();
        if let Some(out_idx) = out_idx {
            let entries = levels.with(std::mem::take);
            self.write_node_column_u64(out_idx, entries, &mut report)?;
        }
        let visited = comm.all_reduce_sum(local_visited);
        report.set_info("num_visited", visited);
        Ok((visited, report))
    }

    /// Multi-source frontier expansion: hop distance to the closest
    /// source for every node within `hops`, written to a new u64 node
    /// series. Adjacency honors the per-edge direction flag. Collective.
    pub fn nhops(
        &mut self,
        out_name: &str,
        hops: usize,
        sources: &[String],
        where_: Option<&WhereClause>,
    ) -> Result<OpReport> {
        let (_, out_idx) = self.fresh_node_series(out_name, PrimitiveType::UInt64)?;
        let comm = self.comm();

        let u_col = self.edge_u_col();
        let v_col = self.edge_v_col();
        let dir_col = self.edge_dir_col();
        let adj: DistMap<Vec<String>> = DistMap::new(comm);
        self.for_all_edges(where_, |row| {
            let u = self.edges().get_str(u_col, row, self.strings());
            let v = self.edges().get_str(v_col, row, self.strings());
            let (Ok(u), Ok(v)) = (u, v) else { return };
            let directed = self.edges().get_bool(dir_col, row).unwrap_or(true);
            let (u, v) = (u.to_string(), v.to_string());
            let v2 = v.clone();
            let u2 = u.clone();
            adj.async_visit(u, move |_, _, list| list.push(v2));
            if !directed {
                adj.async_visit(v, move |_, _, list| list.push(u2));
            }
        })?;
        comm.barrier();

        let visited = DistSet::new(comm);
        let current = DistSet::new(comm);
        let next = DistSet::new(comm);
        let next_id = next.id();
        if comm.rank() == 0 {
            for source in sources {
                visited.async_insert(source.clone());
                next.async_insert(source.clone());
            }
        }
        comm.barrier();

        let hop_table: RankLocal<HashMap<String, u64>> = RankLocal::new(comm, HashMap::new());
        let mut dist = 0u64;
        while next.size() > 0 && dist <= hops as u64 {
            current.swap(&next);
            next.clear();
            let expand = dist < hops as u64;
            current.local_for_all(|vertex| {
                hop_table.with(|t| t.insert(vertex.to_string(), dist));
                if !expand {
                    return;
                }
                if let Some(neighbors) = adj.local_get(vertex) {
                    for neighbor in neighbors {
                        visited.async_insert_exec_if_missing(neighbor, move |c, n_key| {
                            DistSet::attach(c, next_id).local_insert(n_key.to_string());
                        });
                    }
                }
            });
            comm.barrier();
            dist += 1;
        }

        let mut report = OpReport::new();
        let entries = hop_table.with(std::mem::take);
        self.write_node_column_u64(out_idx, entries, &mut report)?;
        Ok(report)
    }
}
