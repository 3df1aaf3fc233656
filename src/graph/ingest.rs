//! Columnar ingest into the edge and node stores.
//!
//! Every rank streams its share of the rows. Edge rows materialize on the
//! ingesting rank; endpoint keys travel through a distributed set so the
//! owning ranks can backfill missing nodes after the barrier. Vertex rows
//! are hash-routed whole to the rank owning their key.

use std::collections::BTreeSet;
use std::path::Path;

use crate::comm::{DistSet, RankLocal};
use crate::error::{GraphError, Result};
use crate::graph::name::SeriesName;
use crate::graph::report::OpReport;
use crate::graph::{is_reserved, Graph, EDGE_U, EDGE_V};
use crate::io::{ColumnSpec, ColumnType, ColumnarFormat};
use crate::store::record::SeriesIdx;
use crate::store::value::Value;

/// A source column mapped onto a target series.
struct MappedColumn {
    position: usize,
    series: SeriesIdx,
}

impl Graph<'_> {
    /// Ingest edges from a columnar file or directory. `col_u`/`col_v`
    /// name the endpoint columns (byte-array, required); `meta` limits
    /// which other columns become edge series (default: all of them).
    /// Every ingested edge gets `edge.directed = directed`. Collective.
    pub fn ingest_edges(
        &mut self,
        format: &dyn ColumnarFormat,
        path: &Path,
        recursive: bool,
        col_u: &str,
        col_v: &str,
        directed: bool,
        meta: Option<&[SeriesName]>,
    ) -> Result<OpReport> {
        self.guard_writable()?;
        let mut report = OpReport::new();
        let mut source =
            format.open(path, recursive, self.comm().rank(), self.comm().world_size())?;
        let schema: Vec<ColumnSpec> = source.schema().to_vec();

        let mut metaset: BTreeSet<SeriesName> = match meta {
            Some(names) => {
                for name in names {
                    if is_reserved(name) {
                        return Err(GraphError::ReservedSeries(name.qualified()));
                    }
                    if !name.is_edge_series() {
                        return Err(GraphError::InvalidSeriesName(name.qualified()));
                    }
                }
                names.iter().cloned().collect()
            }
            None => schema
                .iter()
                .filter(|c| c.name != col_u && c.name != col_v)
                .map(|c| SeriesName::edge(&c.name))
                .collect(),
        };
        metaset.insert(SeriesName::edge(col_u));
        metaset.insert(SeriesName::edge(col_v));

        // Map source columns onto series, creating metadata series as
        // needed. Endpoints map onto the reserved columns.
        let mut u_position = None;
        let mut v_position = None;
        let mut mapped: Vec<MappedColumn> = Vec::new();
        for (position, col) in schema.iter().enumerate() {
            if !metaset.contains(&SeriesName::edge(&col.name)) {
                continue;
            }
            let target = if col.name == col_u || col.name == col_v {
                if col.ty != ColumnType::ByteArray {
                    return Err(GraphError::InvalidFormat(format!(
                        "Endpoint column '{}' is {}, expected byte_array",
                        col.name, col.ty
                    )));
                }
                if col.name == col_u {
                    u_position = Some(position);
                    SeriesName::edge(EDGE_U)
                } else {
                    v_position = Some(position);
                    SeriesName::edge(EDGE_V)
                }
            } else {
                let target = SeriesName::edge(&col.name);
                if !self.has_series_name(&target) {
                    match col.ty.series_type() {
                        Some(ty) => {
                            self.add_series(&target.qualified(), ty)?;
                        }
                        None => {
                            report.warn(format!("Unsupported column type: {}", col.ty));
                            continue;
                        }
                    }
                }
                target
            };
            let series = self
                .edges()
                .find_series(target.unqualified())
                .ok_or_else(|| GraphError::SeriesNotFound(target.qualified()))?;
            mapped.push(MappedColumn { position, series });
        }

        let u_position =
            u_position.ok_or_else(|| GraphError::ColumnNotFound(col_u.to_string()))?;
        let v_position =
            v_position.ok_or_else(|| GraphError::ColumnNotFound(col_v.to_string()))?;
        let dir_col = self.edge_dir_col();

        let nodeset = DistSet::new(self.comm());
        let mut local_edges = 0u64;
        let mut null_endpoints = 0u64;
        let mut coercion_failures = 0u64;
        while let Some(row) = source.next_row()? {
            // Endpoint strings are required; a row missing either is
            // dropped whole.
            let (Value::Str(u_key), Value::Str(v_key)) = (&row[u_position], &row[v_position])
            else {
                null_endpoints += 1;
                continue;
            };

            let rec = self.edges_mut().0.add_record();
            self.edges_mut().0.set_bool(dir_col, rec, directed)?;
            for col in &mapped {
                let value = &row[col.position];
                if value.is_none() {
                    continue;
                }
                let (edges, strings) = self.edges_mut();
                match edges.set(col.series, rec, value.as_ref(), strings) {
                    Ok(()) => {}
                    Err(GraphError::TypeMismatch { .. }) => coercion_failures += 1,
                    Err(e) => return Err(e),
                }
            }
            nodeset.async_insert(u_key.clone());
            nodeset.async_insert(v_key.clone());
            local_edges += 1;
        }
        report.warn_count("null endpoint in edge row; row dropped", null_endpoints);
        report.warn_count("cell type did not match series; cell skipped", coercion_failures);
        self.comm().barrier();

        // Backfill: every endpoint key observed anywhere becomes a node
        // on its owning rank unless one exists already.
        let mut new_nodes = 0u64;
        for key in nodeset.local_drain() {
            if self.local_node_row(&key).is_none() {
                self.local_node_find_or_insert(&key)?;
                new_nodes += 1;
            }
        }

        let total_edges = self.comm().all_reduce_sum(local_edges);
        let total_new_nodes = self.comm().all_reduce_sum(new_nodes);
        tracing::info!(
            edges = total_edges,
            new_nodes = total_new_nodes,
            "edge ingest complete"
        );
        report.set_info("num_edges_ingested", total_edges);
        report.set_info("num_new_nodes", total_new_nodes);
        Ok(report)
    }

    /// Ingest vertex records, hash-routing each row to the rank owning
    /// its key. Existing cells are overwritten when `overwrite` is set,
    /// preserved otherwise. Collective.
    pub fn ingest_verts(
        &mut self,
        format: &dyn ColumnarFormat,
        path: &Path,
        recursive: bool,
        key_col: &str,
        meta: Option<&[SeriesName]>,
        overwrite: bool,
    ) -> Result<OpReport> {
        self.guard_writable()?;
        let mut report = OpReport::new();
        let mut source =
            format.open(path, recursive, self.comm().rank(), self.comm().world_size())?;
        let schema: Vec<ColumnSpec> = source.schema().to_vec();

        let metaset: BTreeSet<SeriesName> = match meta {
            Some(names) => {
                for name in names {
                    if is_reserved(name) {
                        return Err(GraphError::ReservedSeries(name.qualified()));
                    }
                    if !name.is_node_series() {
                        return Err(GraphError::InvalidSeriesName(name.qualified()));
                    }
                }
                names.iter().cloned().collect()
            }
            None => schema
                .iter()
                .filter(|c| c.name != key_col)
                .map(|c| SeriesName::node(&c.name))
                .collect(),
        };

        let mut key_position = None;
        let mut mapped: Vec<MappedColumn> = Vec::new();
        for (position, col) in schema.iter().enumerate() {
            if col.name == key_col {
                if col.ty != ColumnType::ByteArray {
                    return Err(GraphError::InvalidFormat(format!(
                        "Key column '{}' is {}, expected byte_array",
                        col.name, col.ty
                    )));
                }
                key_position = Some(position);
                continue;
            }
            let target = SeriesName::node(&col.name);
            if !metaset.contains(&target) {
                continue;
            }
            if !self.has_series_name(&target) {
                match col.ty.series_type() {
                    Some(ty) => {
                        self.add_series(&target.qualified(), ty)?;
                    }
                    None => {
                        report.warn(format!("Unsupported column type: {}", col.ty));
                        continue;
                    }
                }
            }
            let series = self
                .nodes()
                .find_series(target.unqualified())
                .ok_or_else(|| GraphError::SeriesNotFound(target.qualified()))?;
            mapped.push(MappedColumn { position, series });
        }
        let key_position =
            key_position.ok_or_else(|| GraphError::ColumnNotFound(key_col.to_string()))?;

        // Rows stage on their owning rank and materialize after the
        // barrier, keeping the node store single-writer.
        type StagedRow = (String, Vec<(SeriesIdx, Value)>);
        let staged: RankLocal<Vec<StagedRow>> = RankLocal::new(self.comm(), Vec::new());
        let staged_id = staged.id();

        let mut local_rows = 0u64;
        let mut null_keys = 0u64;
        while let Some(row) = source.next_row()? {
            let Value::Str(key) = &row[key_position] else {
                null_keys += 1;
                continue;
            };
            let cells: Vec<(SeriesIdx, Value)> = mapped
                .iter()
                .filter(|col| !row[col.position].is_none())
                .map(|col| (col.series, row[col.position].clone()))
                .collect();
            let dest = self.partitioner().owner(key);
            let key = key.clone();
            self.comm().send(dest, move |c| {
                RankLocal::<Vec<StagedRow>>::attach(c, staged_id).with(|rows| {
                    rows.push((key, cells));
                });
            });
            local_rows += 1;
        }
        report.warn_count("null key in vertex row; row dropped", null_keys);
        self.comm().barrier();

        let mut new_nodes = 0u64;
        let mut coercion_failures = 0u64;
        for (key, cells) in staged.with(std::mem::take) {
            let existed = self.local_node_row(&key).is_some();
            let row = self.local_node_find_or_insert(&key)?;
            if !existed {
                new_nodes += 1;
            }
            for (series, value) in cells {
                if !overwrite && !self.nodes().is_none(series, row) {
                    continue;
                }
                let (nodes, strings) = self.nodes_mut();
                match nodes.set(series, row, value.as_ref(), strings) {
                    Ok(()) => {}
                    Err(GraphError::TypeMismatch { .. }) => coercion_failures += 1,
                    Err(e) => return Err(e),
                }
            }
        }
        report.warn_count("cell type did not match series; cell skipped", coercion_failures);

        let total_rows = self.comm().all_reduce_sum(local_rows);
        let total_new_nodes = self.comm().all_reduce_sum(new_nodes);
        tracing::info!(
            rows = total_rows,
            new_nodes = total_new_nodes,
            "vertex ingest complete"
        );
        report.set_info("num_rows_ingested", total_rows);
        report.set_info("num_new_nodes", total_new_nodes);
        Ok(report)
    }
}
