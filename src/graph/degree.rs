//! Degree computations over the edge store.
//!
//! Each matching edge pushes `(endpoint key, 1)` into a distributed
//! counting set keyed by node. After the barrier every count sits on the
//! rank that owns the node, so the join against the node store is local.
//! Undirected edges count on both sides.

use crate::comm::DistCountingSet;
use crate::error::Result;
use crate::graph::report::OpReport;
use crate::graph::{Graph, WhereClause, EDGE_DIRECTED, EDGE_U, EDGE_V};
use crate::store::value::PrimitiveType;

impl Graph<'_> {
    /// Count, per node, the matching edges leaving it (`edge.u`), writing
    /// a new u64 series. Collective.
    pub fn out_degree(&mut self, out_name: &str, where_: Option<&WhereClause>) -> Result<OpReport> {
        self.in_out_degree(out_name, where_, true)
    }

    /// Count, per node, the matching edges entering it (`edge.v`), writing
    /// a new u64 series. Collective.
    pub fn in_degree(&mut self, out_name: &str, where_: Option<&WhereClause>) -> Result<OpReport> {
        self.in_out_degree(out_name, where_, false)
    }

    fn in_out_degree(
        &mut self,
        out_name: &str,
        where_: Option<&WhereClause>,
        outdeg: bool,
    ) -> Result<OpReport> {
        let (_, out_idx) = self.fresh_node_series(out_name, PrimitiveType::UInt64)?;

        let (deg_col, other_col) = if outdeg {
            (self.edge_u_col(), self.edge_v_col())
        } else {
            (self.edge_v_col(), self.edge_u_col())
        };
        let dir_col = self.edge_dir_col();

        let degrees = DistCountingSet::new(self.comm());
        self.for_all_edges(where_, |row| {
            if let Ok(key) = self.edges().get_str(deg_col, row, self.strings()) {
                degrees.async_insert(key.to_string());
            }
            // Undirected edges are symmetric: the far endpoint counts too.
            let directed = self.edges().get_bool(dir_col, row).unwrap_or(true);
            if !directed {
                if let Ok(key) = self.edges().get_str(other_col, row, self.strings()) {
                    degrees.async_insert(key.to_string());
                }
            }
        })?;
        self.comm().barrier();

        let mut report = OpReport::new();
        let counts: Vec<(String, u64)> = {
            let mut out = Vec::new();
            degrees.local_for_all(|k, n| out.push((k.to_string(), n)));
            out
        };
        self.write_node_column_u64(out_idx, counts, &mut report)?;
        Ok(report)
    }

    /// In- and out-degree in one edge pass, writing two new u64 series.
    /// Looks the endpoint columns up by name on every edge and writes both
    /// columns directly through the node index; keys without a matching
    /// node are skipped. Collective.
    pub fn degrees(
        &mut self,
        in_name: &str,
        out_name: &str,
        where_: Option<&WhereClause>,
    ) -> Result<OpReport> {
        let (_, in_idx) = self.fresh_node_series(in_name, PrimitiveType::UInt64)?;
        let (_, out_idx) = self.fresh_node_series(out_name, PrimitiveType::UInt64)?;

        let indegrees = DistCountingSet::new(self.comm());
        let outdegrees = DistCountingSet::new(self.comm());
        self.for_all_edges(where_, |row| {
            let u = self.edges().get_str(EDGE_U, row, self.strings());
            let v = self.edges().get_str(EDGE_V, row, self.strings());
            let (Ok(u), Ok(v)) = (u, v) else { return };
            outdegrees.async_insert(u.to_string());
            indegrees.async_insert(v.to_string());

            let directed = self
                .edges()
                .get_bool(EDGE_DIRECTED, row)
                .unwrap_or(true);
            if !directed {
                outdegrees.async_insert(v.to_string());
                indegrees.async_insert(u.to_string());
            }
        })?;
        self.comm().barrier();

        // Counts and nodes share the partitioner, so every key's row is
        // local; write the cells in place.
        let mut in_counts = Vec::new();
        indegrees.local_for_all(|k, n| in_counts.push((k.to_string(), n)));
        let mut out_counts = Vec::new();
        outdegrees.local_for_all(|k, n| out_counts.push((k.to_string(), n)));

        for (key, count) in in_counts {
            if let Some(row) = self.local_node_row(&key) {
                self.nodes_mut().0.set_u64(in_idx, row, count)?;
            }
        }
        for (key, count) in out_counts {
            if let Some(row) = self.local_node_row(&key) {
                self.nodes_mut().0.set_u64(out_idx, row, count)?;
            }
        }
        Ok(OpReport::new())
    }

    /// Same result as [`Graph::degrees`], but resolves the endpoint column
    /// indices once up front and routes both columns through the shared
    /// column setter, reporting unmatched keys as warnings. Collective.
    pub fn degrees2(
        &mut self,
        in_name: &str,
        out_name: &str,
        where_: Option<&WhereClause>,
    ) -> Result<OpReport> {
        let (_, in_idx) = self.fresh_node_series(in_name, PrimitiveType::UInt64)?;
        let (_, out_idx) = self.fresh_node_series(out_name, PrimitiveType::UInt64)?;
        let (indeg, outdeg) = self.count_degrees(where_)?;

        let mut report = OpReport::new();
        let mut in_report = OpReport::new();
        self.write_node_column_u64(in_idx, indeg, &mut in_report)?;
        let mut out_report = OpReport::new();
        self.write_node_column_u64(out_idx, outdeg, &mut out_report)?;
        report.merge_warnings(in_report);
        report.merge_warnings(out_report);
        Ok(report)
    }

    /// One pass over matching edges with pre-resolved endpoint columns,
    /// producing local (key, count) shards for in- and out-degree.
    fn count_degrees(
        &self,
        where_: Option<&WhereClause>,
    ) -> Result<(Vec<(String, u64)>, Vec<(String, u64)>)> {
        let u_col = self.edge_u_col();
        let v_col = self.edge_v_col();
        let dir_col = self.edge_dir_col();

        let indegrees = DistCountingSet::new(self.comm());
        let outdegrees = DistCountingSet::new(self.comm());
        self.for_all_edges(where_, |row| {
            let u = self.edges().get_str(u_col, row, self.strings());
            let v = self.edges().get_str(v_col, row, self.strings());
            let (Ok(u), Ok(v)) = (u, v) else { return };
            outdegrees.async_insert(u.to_string());
            indegrees.async_insert(v.to_string());

            let directed = self.edges().get_bool(dir_col, row).unwrap_or(true);
            if !directed {
                outdegrees.async_insert(v.to_string());
                indegrees.async_insert(u.to_string());
            }
        })?;
        self.comm().barrier();

        let mut indeg = Vec::new();
        indegrees.local_for_all(|k, n| indeg.push((k.to_string(), n)));
        let mut outdeg = Vec::new();
        outdegrees.local_for_all(|k, n| outdeg.push((k.to_string(), n)));
        Ok((indeg, outdeg))
    }
}
