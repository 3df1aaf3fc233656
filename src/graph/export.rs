//! Columnar export: one shard per rank.
//!
//! Each rank writes its local live rows to `<prefix>_<rank>.<ext>`. The
//! output schema is derived by sampling rows until every requested column
//! shows a concrete value; columns that never do default to string. The
//! schema is finalized before the first row is written, and later rows
//! must conform.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::graph::name::SeriesName;
use crate::graph::report::OpReport;
use crate::graph::{is_reserved, Graph, Namespace, EDGE_U, EDGE_V, NODE_ID};
use crate::io::{ColumnSpec, ColumnType, ColumnarFormat};
use crate::store::record::{RecordStore, RowId, SeriesIdx};
use crate::store::value::{PrimitiveType, Value};

/// Unsigned cells leave as int64; columnar formats carry one integer
/// width.
fn export_cell(value: Value) -> Value {
    match value {
        Value::UInt64(v) => Value::Int64(v as i64),
        other => other,
    }
}

/// Sample live rows until the column shows a value; entirely-missing
/// columns report `None` (the caller defaults them to string).
fn sample_column_type(store: &RecordStore, idx: SeriesIdx) -> Option<PrimitiveType> {
    let mut found = None;
    store.for_all_rows(|row| {
        if found.is_some() {
            return;
        }
        if !store.is_none(idx, row) {
            found = store.series_type(idx).ok();
        }
    });
    // Unsigned series surface as int64 on the way out.
    found.map(|ty| match ty {
        PrimitiveType::UInt64 => PrimitiveType::Int64,
        other => other,
    })
}

impl Graph<'_> {
    /// Dump node records: `node.id` plus the requested metadata series.
    /// Collective; every rank writes `<prefix>_<rank>.<ext>`.
    pub fn dump_verts(
        &self,
        format: &dyn ColumnarFormat,
        prefix: &Path,
        meta: &[SeriesName],
        overwrite: bool,
    ) -> Result<OpReport> {
        self.dump_store(
            format,
            prefix,
            meta,
            overwrite,
            Namespace::Node,
            &[(NODE_ID, self.node_id_col())],
        )
    }

    /// Dump edge records: `edge.u`, `edge.v` plus the requested metadata
    /// series. Collective; every rank writes `<prefix>_<rank>.<ext>`.
    pub fn dump_edges(
        &self,
        format: &dyn ColumnarFormat,
        prefix: &Path,
        meta: &[SeriesName],
        overwrite: bool,
    ) -> Result<OpReport> {
        self.dump_store(
            format,
            prefix,
            meta,
            overwrite,
            Namespace::Edge,
            &[(EDGE_U, self.edge_u_col()), (EDGE_V, self.edge_v_col())],
        )
    }

    fn dump_store(
        &self,
        format: &dyn ColumnarFormat,
        prefix: &Path,
        meta: &[SeriesName],
        overwrite: bool,
        ns: Namespace,
        key_columns: &[(&str, SeriesIdx)],
    ) -> Result<OpReport> {
        let mut report = OpReport::new();
        let store = self.store_for(ns);

        // Resolve metadata columns; unknown names warn, reserved names
        // are silently skipped (the key columns already cover them).
        let mut meta_columns: Vec<(String, SeriesIdx)> = Vec::new();
        for name in meta {
            if is_reserved(name) {
                continue;
            }
            if name.namespace() != ns {
                report.warn(format!("Column '{}' not found", name.qualified()));
                continue;
            }
            match store.find_series(name.unqualified()) {
                Some(idx) => meta_columns.push((name.unqualified().to_string(), idx)),
                None => report.warn(format!("Column '{}' not found", name.qualified())),
            }
        }

        let mut schema: Vec<ColumnSpec> = key_columns
            .iter()
            .map(|(name, _)| ColumnSpec::new(*name, ColumnType::ByteArray))
            .collect();
        for (name, idx) in &meta_columns {
            let sampled = sample_column_type(store, *idx).unwrap_or(PrimitiveType::Str);
            schema.push(ColumnSpec::new(name.clone(), ColumnType::from_series_type(sampled)));
        }

        let shard_path = shard_file(prefix, self.comm().rank(), format.extension());
        let mut writer = format.create(&shard_path, &schema, overwrite)?;

        let mut local_rows = 0u64;
        let mut write_result = Ok(());
        store.for_all_rows(|row| {
            if write_result.is_err() {
                return;
            }
            let mut out: Vec<Value> = Vec::with_capacity(schema.len());
            for (_, idx) in key_columns {
                out.push(self.cell_value(store, *idx, row));
            }
            for (_, idx) in &meta_columns {
                out.push(export_cell(self.cell_value(store, *idx, row)));
            }
            write_result = writer.write_row(&out);
            local_rows += 1;
        });
        write_result?;
        writer.finish()?;

        let total = self.comm().all_reduce_sum(local_rows);
        tracing::info!(rows = total, path = %shard_path.display(), "dump complete");
        report.set_info("num_rows_dumped", total);
        report.set_info("shard", shard_path.display().to_string());
        Ok(report)
    }

    fn cell_value(&self, store: &RecordStore, idx: SeriesIdx, row: RowId) -> Value {
        match store.get(idx, row, self.strings()) {
            Ok(v) => v.to_owned(),
            Err(_) => Value::None,
        }
    }
}

fn shard_file(prefix: &Path, rank: usize, extension: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("_{}.{}", rank, extension));
    PathBuf::from(name)
}
