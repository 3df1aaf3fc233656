//! Connected components and k-core over the undirected interpretation of
//! the edge store.
//!
//! Both build a distributed adjacency structure keyed by node, run a
//! barrier-synchronous fixpoint over it, and join the result back into a
//! node column locally (node keys and adjacency entries share the same
//! partitioner, so the join never leaves the rank).

use std::collections::HashSet;

use crate::comm::{DistMap, RankLocal};
use crate::error::{GraphError, Result};
use crate::graph::report::OpReport;
use crate::graph::{Graph, WhereClause};
use crate::store::value::PrimitiveType;

impl Graph<'_> {
    /// Synchronous label propagation. Writes a new string series holding,
    /// per node, the lexicographic minimum key of its component; the
    /// distinct-label count lands in `info["num_components"]`. Collective.
    pub fn connected_components(
        &mut self,
        out_name: &str,
        where_: Option<&WhereClause>,
    ) -> Result<OpReport> {
        let (_, out_idx) = self.fresh_node_series(out_name, PrimitiveType::Str)?;
        let (node_where, edge_where) = split_clause(where_)?;
        let comm = self.comm();

        // Adjacency over filtered nodes; an edge contributes both
        // directions, and only when both endpoints are present.
        let adj: DistMap<Vec<String>> = DistMap::new(comm);
        let adj_id = adj.id();
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
            let u = u.to_string();
            let v = v.to_string();
            adj.async_visit_if_exists(v.clone(), move |c, v_key, _| {
                let v2 = v_key.to_string();
                let adj = DistMap::<Vec<String>>::attach(c, adj_id);
                adj.async_visit_if_exists(u, move |c2, u_key, u_list| {
                    u_list.push(v2.clone());
                    let u3 = u_key.to_string();
                    DistMap::<Vec<String>>::attach(c2, adj_id)
                        .async_visit_if_exists(v2, move |_, _, v_list| v_list.push(u3));
                });
            });
        })?;
        comm.barrier();

        // label := own key, everything active.
        let labels: DistMap<String> = DistMap::new(comm);
        let active: DistMap<String> = DistMap::new(comm);
        let next_active: DistMap<String> = DistMap::new(comm);
        let labels_id = labels.id();
        let next_id = next_active.id();
        adj.local_for_all(|key, _| {
            labels.local_insert(key.to_string(), key.to_string());
            active.local_insert(key.to_string(), key.to_string());
        });
        comm.barrier();

        let mut rounds = 0u64;
        while active.size() > 0 {
            rounds += 1;
            active.local_for_all(|vertex, cc_id| {
                let cc = cc_id.clone();
                adj.async_visit_if_exists(vertex.to_string(), move |c, _, neighbors| {
                    for neighbor in neighbors.iter() {
                        // A label can only improve a neighbor whose key
                        // (an upper bound on its label) is larger.
                        if cc < *neighbor {
                            let cc = cc.clone();
                            DistMap::<String>::attach(c, labels_id).async_visit_if_exists(
                                neighbor.clone(),
                                move |c2, n_key, n_label| {
                                    if cc < *n_label {
                                        *n_label = cc.clone();
                                        DistMap::<String>::attach(c2, next_id).async_reduce(
                                            n_key.to_string(),
                                            cc,
                                            |a, b| std::cmp::min(a.clone(), b),
                                        );
                                    }
                                },
                            );
                        }
                    }
                });
            });
            comm.barrier();
            active.local_clear();
            active.swap(&next_active);
        }
        tracing::debug!(rounds, "label propagation converged");

        let mut local_roots = 0u64;
        let mut assignments = Vec::new();
        labels.local_for_all(|key, label| {
            if key == label.as_str() {
                local_roots += 1;
            }
            assignments.push((key.to_string(), label.clone()));
        });
        let total_roots = comm.all_reduce_sum(local_roots);

        let mut report = OpReport::new();
        self.write_node_column_str(out_idx, assignments, &mut report)?;
        report.set_info("num_components", total_roots);
        Ok(report)
    }

    /// Iterative k-core pruning. Writes, per pruned node, its core number
    /// into a new u64 series and returns the count pruned at each core
    /// level (index i = level i). Collective.
    pub fn kcore(
        &mut self,
        out_name: &str,
        max_k: usize,
        where_: Option<&WhereClause>,
    ) -> Result<(Vec<u64>, OpReport)> {
        let (_, out_idx) = self.fresh_node_series(out_name, PrimitiveType::UInt64)?;
        let (node_where, edge_where) = split_clause(where_)?;
        let comm = self.comm();

        let adj_set: DistMap<HashSet<String>> = DistMap::new(comm);
        self.for_all_nodes(node_where, |row| {
            if let Ok(key) = self
                .nodes()
                .get_str(self.node_id_col(), row, self.strings())
            {
                adj_set.async_insert_if_missing(key.to_string(), HashSet::new());
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
            adj_set.async_visit_if_exists(u, move |_, _, set| {
                set.insert(v2);
            });
            adj_set.async_visit_if_exists(v, move |_, _, set| {
                set.insert(u2);
            });
        })?;
        comm.barrier();

        let core_table: RankLocal<std::collections::HashMap<String, u64>> =
            RankLocal::new(comm, std::collections::HashMap::new());

        let mut prune_counts = Vec::with_capacity(max_k + 1);
        for k in 1..=max_k + 1 {
            let mut level_total = 0u64;
            loop {
                let mut locally_pruned = 0u64;
                adj_set.local_for_all(|vertex, adj| {
                    if adj.is_empty() || adj.len() >= k {
                        return;
                    }
                    // Below the threshold: tell every neighbor, then leave
                    // an empty entry so the vertex never re-prunes.
                    for neighbor in adj.iter() {
                        let vert = vertex.to_string();
                        adj_set.async_visit_if_exists(neighbor.clone(), move |_, _, set| {
                            set.remove(&vert);
                        });
                    }
                    adj.clear();
                    core_table.with(|t| t.insert(vertex.to_string(), (k - 1) as u64));
                    locally_pruned += 1;
                });
                comm.barrier();
                let pruned = comm.all_reduce_sum(locally_pruned);
                if pruned == 0 {
                    break;
                }
                level_total += pruned;
            }
            prune_counts.push(level_total);
        }

        let mut report = OpReport::new();
        let entries = core_table.with(std::mem::take);
        self.write_node_column_u64(out_idx, entries, &mut report)?;
        Ok((prune_counts, report))
    }
}

/// A clause filters the side it names: node clauses restrict which nodes
/// seed the adjacency, edge clauses restrict which edges contribute.
pub(crate) fn split_clause(
    where_: Option<&WhereClause>,
) -> Result<(Option<&WhereClause>, Option<&WhereClause>)> {
    match where_ {
        None => Ok((None, None)),
        Some(w) if w.is_empty() => Ok((None, None)),
        Some(w) if w.is_node_clause() => Ok((Some(w), None)),
        Some(w) if w.is_edge_clause() => Ok((None, Some(w))),
        Some(_) => Err(GraphError::MixedClause),
    }
}
