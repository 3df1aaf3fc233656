//! Distributed graph façade.
//!
//! Two record stores (`nodes`, `edges`) in a per-rank persistent heap
//! shard, a shared string store, and a node-key → row-id index. Nodes are
//! partitioned across ranks by the stable hash of `node.id`; edges live on
//! the rank that ingested them. Four reserved series carry the graph
//! structure:
//!
//! - `node.id`   (string) unique node key, partitions the node store
//! - `edge.u`    (string) source endpoint key
//! - `edge.v`    (string) target endpoint key
//! - `edge.directed` (bool) per-edge direction flag
//!
//! Collective methods (anything touching counts, ingest, dump, or the
//! graph primitives) must be called on every rank of the world.

pub mod components;
pub mod degree;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod name;
pub mod report;
pub mod topk;
pub mod traversal;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::comm::{Comm, KeyPartitioner};
use crate::error::{GraphError, Result};
use crate::heap::{HeapMode, PersistentHeap};
use crate::store::record::{RecordStore, RowId, SeriesIdx};
use crate::store::series::ContainerKind;
use crate::store::strings::StringStore;
use crate::store::value::{PrimitiveType, Value, ValueRef};

pub use filter::WhereClause;
pub use name::{Namespace, SeriesName};
pub use report::OpReport;
pub use topk::SortOrder;

/// Well-known object names inside each heap shard.
const OBJ_NODES: &str = "nodes";
const OBJ_EDGES: &str = "edges";
const OBJ_NODE_INDEX: &str = "nodeindex";
const OBJ_STRINGS: &str = "strings";

/// Graph-level metadata file at the graph root (above the rank shards).
const GRAPH_META_FILE: &str = "graph.json";
const GRAPH_FORMAT_VERSION: u32 = 1;

/// Reserved column names, unqualified (as stored).
pub(crate) const NODE_ID: &str = "id";
pub(crate) const EDGE_U: &str = "u";
pub(crate) const EDGE_V: &str = "v";
pub(crate) const EDGE_DIRECTED: &str = "directed";

/// The four reserved qualified names with fixed semantics.
pub fn reserved_names() -> [SeriesName; 4] {
    [
        SeriesName::node(NODE_ID),
        SeriesName::edge(EDGE_U),
        SeriesName::edge(EDGE_V),
        SeriesName::edge(EDGE_DIRECTED),
    ]
}

fn is_reserved(name: &SeriesName) -> bool {
    reserved_names().iter().any(|r| r == name)
}

fn reserved_type(name: &SeriesName) -> Option<PrimitiveType> {
    if name == &SeriesName::edge(EDGE_DIRECTED) {
        Some(PrimitiveType::Bool)
    } else if is_reserved(name) {
        Some(PrimitiveType::Str)
    } else {
        None
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphMeta {
    format_version: u32,
    world_size: usize,
}

/// A distributed, persistent property graph.
pub struct Graph<'a> {
    comm: &'a Comm,
    heap: PersistentHeap,
    strings: StringStore,
    nodes: RecordStore,
    edges: RecordStore,
    /// node key → local row id, for keys owned by this rank
    node_index: HashMap<String, RowId>,
    partitioner: KeyPartitioner,
    read_only: bool,
    closed: bool,
    node_id_col: SeriesIdx,
    edge_u_col: SeriesIdx,
    edge_v_col: SeriesIdx,
    edge_dir_col: SeriesIdx,
}

impl<'a> Graph<'a> {
    // ── Lifecycle ─────────────────────────────────────────────────────

    /// Open a graph read-write. Creates a fresh one when the path holds no
    /// graph or `overwrite` is set; otherwise reopens in place.
    pub fn open(comm: &'a Comm, path: impl AsRef<Path>, overwrite: bool) -> Result<Self> {
        let path = path.as_ref();
        comm.barrier();
        let fresh = overwrite || !path.join(GRAPH_META_FILE).exists();
        if fresh {
            Self::create(comm, path, overwrite)
        } else {
            Self::reopen(comm, path, HeapMode::ReadWrite)
        }
    }

    /// Reopen an existing graph rejecting every mutating operation.
    pub fn open_read_only(comm: &'a Comm, path: impl AsRef<Path>) -> Result<Self> {
        comm.barrier();
        Self::reopen(comm, path.as_ref(), HeapMode::ReadOnly)
    }

    fn create(comm: &'a Comm, path: &Path, overwrite: bool) -> Result<Self> {
        if overwrite && comm.rank() == 0 {
            PersistentHeap::destroy(path)?;
        }
        comm.barrier();
        if comm.rank() == 0 {
            fs::create_dir_all(path)?;
            let meta = GraphMeta {
                format_version: GRAPH_FORMAT_VERSION,
                world_size: comm.world_size(),
            };
            fs::write(path.join(GRAPH_META_FILE), serde_json::to_vec_pretty(&meta)?)?;
        }
        comm.barrier();

        let heap = PersistentHeap::create(Self::shard_dir(path, comm.rank()))?;
        let strings = StringStore::new();
        let mut nodes = RecordStore::new();
        let mut edges = RecordStore::new();

        let node_id_col = nodes.add_series(NODE_ID, PrimitiveType::Str, ContainerKind::Dense);
        let edge_u_col = edges.add_series(EDGE_U, PrimitiveType::Str, ContainerKind::Dense);
        let edge_v_col = edges.add_series(EDGE_V, PrimitiveType::Str, ContainerKind::Dense);
        let edge_dir_col =
            edges.add_series(EDGE_DIRECTED, PrimitiveType::Bool, ContainerKind::Dense);

        let mut graph = Self {
            comm,
            heap,
            strings,
            nodes,
            edges,
            node_index: HashMap::new(),
            partitioner: KeyPartitioner::new(comm.world_size()),
            read_only: false,
            closed: false,
            node_id_col,
            edge_u_col,
            edge_v_col,
            edge_dir_col,
        };
        graph.flush()?;
        tracing::info!(path = %path.display(), rank = comm.rank(), "created graph");
        Ok(graph)
    }

    fn reopen(comm: &'a Comm, path: &Path, mode: HeapMode) -> Result<Self> {
        let meta: GraphMeta = serde_json::from_slice(&fs::read(path.join(GRAPH_META_FILE))?)?;
        if meta.format_version != GRAPH_FORMAT_VERSION {
            return Err(GraphError::InvalidFormat(format!(
                "Unsupported graph version: {}",
                meta.format_version
            )));
        }
        if meta.world_size != comm.world_size() {
            return Err(GraphError::WorldSizeMismatch {
                expected: meta.world_size,
                actual: comm.world_size(),
            });
        }

        let heap = PersistentHeap::open(Self::shard_dir(path, comm.rank()), mode)?;
        let strings: StringStore = heap.load(OBJ_STRINGS)?;
        let nodes: RecordStore = heap.load(OBJ_NODES)?;
        let edges: RecordStore = heap.load(OBJ_EDGES)?;
        let mut node_index: HashMap<String, RowId> = heap.load(OBJ_NODE_INDEX)?;

        let node_id_col = nodes
            .find_series(NODE_ID)
            .ok_or_else(|| GraphError::InvalidFormat("node store lacks 'id'".into()))?;
        let edge_u_col = edges
            .find_series(EDGE_U)
            .ok_or_else(|| GraphError::InvalidFormat("edge store lacks 'u'".into()))?;
        let edge_v_col = edges
            .find_series(EDGE_V)
            .ok_or_else(|| GraphError::InvalidFormat("edge store lacks 'v'".into()))?;
        let edge_dir_col = edges
            .find_series(EDGE_DIRECTED)
            .ok_or_else(|| GraphError::InvalidFormat("edge store lacks 'directed'".into()))?;

        // The index must mirror the node store; rebuild when it diverged
        // (e.g. an ingest failed mid-batch).
        if node_index.len() != nodes.num_records() {
            tracing::warn!(
                indexed = node_index.len(),
                live = nodes.num_records(),
                "node index inconsistent with node store; rebuilding"
            );
            node_index = Self::rebuild_node_index(&nodes, &strings, node_id_col);
        }

        Ok(Self {
            comm,
            heap,
            strings,
            nodes,
            edges,
            node_index,
            partitioner: KeyPartitioner::new(comm.world_size()),
            read_only: mode == HeapMode::ReadOnly,
            closed: false,
            node_id_col,
            edge_u_col,
            edge_v_col,
            edge_dir_col,
        })
    }

    fn shard_dir(path: &Path, rank: usize) -> PathBuf {
        path.join(format!("rank_{}", rank))
    }

    fn rebuild_node_index(
        nodes: &RecordStore,
        strings: &StringStore,
        node_id_col: SeriesIdx,
    ) -> HashMap<String, RowId> {
        let mut index = HashMap::with_capacity(nodes.num_records());
        let _ = nodes.for_all(node_id_col, strings, |row, v| {
            if let ValueRef::Str(key) = v {
                index.insert(key.to_string(), row);
            }
        });
        index
    }

    /// Persist all four objects into this rank's heap shard.
    pub fn flush(&mut self) -> Result<()> {
        if self.read_only {
            return Err(GraphError::ReadOnlyMode);
        }
        self.heap.store(OBJ_STRINGS, &self.strings)?;
        self.heap.store(OBJ_NODES, &self.nodes)?;
        self.heap.store(OBJ_EDGES, &self.edges)?;
        self.heap.store(OBJ_NODE_INDEX, &self.node_index)?;
        Ok(())
    }

    /// Flush (when writable) and tear down. Collective.
    pub fn close(mut self) -> Result<()> {
        if !self.read_only {
            self.flush()?;
        }
        self.closed = true;
        self.comm.barrier();
        Ok(())
    }

    // ── Introspection ─────────────────────────────────────────────────

    /// The communicator, with the world's lifetime (not tied to `&self`,
    /// so distributed containers can outlive store borrows).
    pub fn comm(&self) -> &'a Comm {
        self.comm
    }

    pub fn partitioner(&self) -> &KeyPartitioner {
        &self.partitioner
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn guard_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(GraphError::ReadOnlyMode);
        }
        Ok(())
    }

    pub fn local_num_nodes(&self) -> usize {
        self.nodes.num_records()
    }

    pub fn local_num_edges(&self) -> usize {
        self.edges.num_records()
    }

    /// Global live-node count, optionally filtered. Collective.
    pub fn num_nodes(&self, where_: Option<&WhereClause>) -> Result<u64> {
        let mut local = 0u64;
        match where_ {
            None => local = self.local_num_nodes() as u64,
            Some(w) if w.is_empty() => local = self.local_num_nodes() as u64,
            Some(w) => self.for_all_nodes(Some(w), |_| local += 1)?,
        }
        Ok(self.comm.all_reduce_sum(local))
    }

    /// Global live-edge count, optionally filtered. Collective.
    pub fn num_edges(&self, where_: Option<&WhereClause>) -> Result<u64> {
        let mut local = 0u64;
        match where_ {
            None => local = self.local_num_edges() as u64,
            Some(w) if w.is_empty() => local = self.local_num_edges() as u64,
            Some(w) => self.for_all_edges(Some(w), |_| local += 1)?,
        }
        Ok(self.comm.all_reduce_sum(local))
    }

    // ── Series management ─────────────────────────────────────────────

    /// Add a series under a qualified name. Returns false when it already
    /// exists. Reserved names cannot change type.
    pub fn add_series(&mut self, name: &str, ty: PrimitiveType) -> Result<bool> {
        self.guard_writable()?;
        let name = SeriesName::parse(name)?;
        if let Some(expected) = reserved_type(&name) {
            if ty != expected {
                return Err(GraphError::ReservedSeries(name.qualified()));
            }
        }
        if self.has_series_name(&name) {
            return Ok(false);
        }
        let store = self.store_for_mut(name.namespace());
        store.add_series(name.unqualified(), ty, ContainerKind::Dense);
        tracing::debug!(series = %name, %ty, "added series");
        Ok(true)
    }

    /// Drop a series by qualified name. Reserved names are refused.
    pub fn drop_series(&mut self, name: &str) -> Result<bool> {
        self.guard_writable()?;
        let name = SeriesName::parse(name)?;
        if is_reserved(&name) {
            return Err(GraphError::ReservedSeries(name.qualified()));
        }
        let store = self.store_for_mut(name.namespace());
        Ok(store.remove_series(name.unqualified()))
    }

    pub fn has_series(&self, name: &str) -> bool {
        SeriesName::parse(name)
            .map(|n| self.has_series_name(&n))
            .unwrap_or(false)
    }

    pub(crate) fn has_series_name(&self, name: &SeriesName) -> bool {
        self.store_for(name.namespace())
            .contains_series(name.unqualified())
    }

    pub fn get_node_series_names(&self) -> Vec<String> {
        self.nodes
            .series_names()
            .into_iter()
            .map(|n| SeriesName::node(n).qualified())
            .collect()
    }

    pub fn get_edge_series_names(&self) -> Vec<String> {
        self.edges
            .series_names()
            .into_iter()
            .map(|n| SeriesName::edge(n).qualified())
            .collect()
    }

    pub fn num_node_series(&self) -> usize {
        self.nodes.num_series()
    }

    pub fn num_edge_series(&self) -> usize {
        self.edges.num_series()
    }

    // ── Cell access (rank-local) ──────────────────────────────────────

    /// Read a cell by qualified series name on this rank's store.
    pub fn get(&self, name: &str, row: RowId) -> Result<ValueRef<'_>> {
        let name = SeriesName::parse(name)?;
        let store = self.store_for(name.namespace());
        store.get(name.unqualified(), row, &self.strings)
    }

    /// Write a cell by qualified series name on this rank's store.
    /// Writing `node.id` keeps the node index in sync.
    pub fn set(&mut self, name: &str, row: RowId, value: ValueRef<'_>) -> Result<()> {
        self.guard_writable()?;
        let name = SeriesName::parse(name)?;
        if name == SeriesName::node(NODE_ID) {
            if let ValueRef::Str(key) = value {
                self.nodes
                    .set(self.node_id_col, row, value, &mut self.strings)?;
                self.node_index.insert(key.to_string(), row);
                return Ok(());
            }
        }
        match name.namespace() {
            Namespace::Node => self
                .nodes
                .set(name.unqualified(), row, value, &mut self.strings),
            Namespace::Edge => self
                .edges
                .set(name.unqualified(), row, value, &mut self.strings),
        }
    }

    pub fn is_none(&self, name: &str, row: RowId) -> bool {
        match SeriesName::parse(name) {
            Ok(n) => self.store_for(n.namespace()).is_none(n.unqualified(), row),
            Err(_) => true,
        }
    }

    /// Append a node record locally. The caller is responsible for placing
    /// the key on its owning rank and setting `node.id`.
    pub fn add_node_record(&mut self) -> Result<RowId> {
        self.guard_writable()?;
        Ok(self.nodes.add_record())
    }

    /// Append an edge record locally. Edges live on the rank that created
    /// them; the caller sets `edge.u`, `edge.v`, and `edge.directed`.
    pub fn add_edge_record(&mut self) -> Result<RowId> {
        self.guard_writable()?;
        Ok(self.edges.add_record())
    }

    /// Switch a series between its dense and sparse representation.
    pub fn convert_series(&mut self, name: &str, kind: ContainerKind) -> Result<()> {
        self.guard_writable()?;
        let name = SeriesName::parse(name)?;
        self.store_for_mut(name.namespace())
            .convert(name.unqualified(), kind)
    }

    /// Direct store access for read paths.
    pub fn nodes(&self) -> &RecordStore {
        &self.nodes
    }

    pub fn edges(&self) -> &RecordStore {
        &self.edges
    }

    pub fn strings(&self) -> &StringStore {
        &self.strings
    }

    /// Row id of a locally-owned node key.
    pub fn local_node_row(&self, key: &str) -> Option<RowId> {
        self.node_index.get(key).copied()
    }

    pub(crate) fn store_for(&self, ns: Namespace) -> &RecordStore {
        match ns {
            Namespace::Node => &self.nodes,
            Namespace::Edge => &self.edges,
        }
    }

    fn store_for_mut(&mut self, ns: Namespace) -> &mut RecordStore {
        match ns {
            Namespace::Node => &mut self.nodes,
            Namespace::Edge => &mut self.edges,
        }
    }

    pub(crate) fn node_id_col(&self) -> SeriesIdx {
        self.node_id_col
    }

    pub(crate) fn edge_u_col(&self) -> SeriesIdx {
        self.edge_u_col
    }

    pub(crate) fn edge_v_col(&self) -> SeriesIdx {
        self.edge_v_col
    }

    pub(crate) fn edge_dir_col(&self) -> SeriesIdx {
        self.edge_dir_col
    }

    /// Find the local row for a node key, creating the node when absent.
    pub(crate) fn local_node_find_or_insert(&mut self, key: &str) -> Result<RowId> {
        if let Some(&row) = self.node_index.get(key) {
            return Ok(row);
        }
        let row = self.nodes.add_record();
        self.nodes
            .set_str(self.node_id_col, row, key, &mut self.strings)?;
        self.node_index.insert(key.to_string(), row);
        Ok(row)
    }

    pub(crate) fn nodes_mut(&mut self) -> (&mut RecordStore, &mut StringStore) {
        (&mut self.nodes, &mut self.strings)
    }

    pub(crate) fn edges_mut(&mut self) -> (&mut RecordStore, &mut StringStore) {
        (&mut self.edges, &mut self.strings)
    }

    // ── Where-clause plumbing ─────────────────────────────────────────

    /// Resolve a clause against one store. `None`/empty clauses compile to
    /// `None`; a clause for the other namespace (or a mixed one) is an
    /// error; unknown series are errors.
    pub(crate) fn compile_clause(
        &self,
        ns: Namespace,
        where_: Option<&WhereClause>,
    ) -> Result<Option<Vec<SeriesIdx>>> {
        let Some(w) = where_ else {
            return Ok(None);
        };
        if w.is_empty() {
            return Ok(None);
        }
        if !w.is_uniform() {
            return Err(GraphError::MixedClause);
        }
        if w.series()[0].namespace() != ns {
            return Err(GraphError::InvalidSeriesName(format!(
                "{} clause used in {} context",
                w.series()[0].namespace().prefix(),
                ns.prefix()
            )));
        }
        let store = self.store_for(ns);
        w.series()
            .iter()
            .map(|name| {
                store
                    .find_series(name.unqualified())
                    .ok_or_else(|| GraphError::SeriesNotFound(name.qualified()))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Gather the clause tuple for one row; missing cells become
    /// `Value::None`.
    pub(crate) fn gather_tuple(&self, ns: Namespace, idxs: &[SeriesIdx], row: RowId) -> Vec<Value> {
        let store = self.store_for(ns);
        idxs.iter()
            .map(|&idx| match store.get(idx, row, &self.strings) {
                Ok(v) => v.to_owned(),
                Err(_) => Value::None,
            })
            .collect()
    }

    /// Visit every live node row passing the (node) clause.
    pub(crate) fn for_all_nodes(
        &self,
        where_: Option<&WhereClause>,
        mut f: impl FnMut(RowId),
    ) -> Result<()> {
        let compiled = self.compile_clause(Namespace::Node, where_)?;
        self.nodes.for_all_rows(|row| match (&compiled, where_) {
            (Some(idxs), Some(w)) => {
                if w.evaluate(&self.gather_tuple(Namespace::Node, idxs, row)) {
                    f(row);
                }
            }
            _ => f(row),
        });
        Ok(())
    }

    /// Visit every live edge row passing the (edge) clause.
    pub(crate) fn for_all_edges(
        &self,
        where_: Option<&WhereClause>,
        mut f: impl FnMut(RowId),
    ) -> Result<()> {
        let compiled = self.compile_clause(Namespace::Edge, where_)?;
        self.edges.for_all_rows(|row| match (&compiled, where_) {
            (Some(idxs), Some(w)) => {
                if w.evaluate(&self.gather_tuple(Namespace::Edge, idxs, row)) {
                    f(row);
                }
            }
            _ => f(row),
        });
        Ok(())
    }

    // ── Row-level operations ──────────────────────────────────────────

    /// Set a value on every row matching the clause, creating the series
    /// (typed after the value) when missing. Collective.
    pub fn assign(
        &mut self,
        name: &str,
        value: &Value,
        where_: Option<&WhereClause>,
    ) -> Result<OpReport> {
        self.guard_writable()?;
        let parsed = SeriesName::parse(name)?;
        if is_reserved(&parsed) {
            return Err(GraphError::ReservedSeries(parsed.qualified()));
        }
        let Some(ty) = value.primitive_type() else {
            return Err(GraphError::InvalidFormat(
                "cannot assign the missing value".into(),
            ));
        };

        let mut rows = Vec::new();
        match parsed.namespace() {
            Namespace::Node => self.for_all_nodes(where_, |row| rows.push(row))?,
            Namespace::Edge => self.for_all_edges(where_, |row| rows.push(row))?,
        }

        let store = self.store_for_mut(parsed.namespace());
        let idx = store.add_series(parsed.unqualified(), ty, ContainerKind::Dense);
        let value_ref = value.as_ref();
        for &row in &rows {
            match parsed.namespace() {
                Namespace::Node => self.nodes.set(idx, row, value_ref, &mut self.strings)?,
                Namespace::Edge => self.edges.set(idx, row, value_ref, &mut self.strings)?,
            }
        }

        let mut report = OpReport::new();
        let assigned = self.comm.all_reduce_sum(rows.len() as u64);
        report.set_info("num_assigned", assigned);
        Ok(report)
    }

    /// Remove every edge matching the clause. Collective.
    pub fn erase_edges(&mut self, where_: Option<&WhereClause>) -> Result<OpReport> {
        self.guard_writable()?;
        let mut rows = Vec::new();
        self.for_all_edges(where_, |row| rows.push(row))?;
        for &row in &rows {
            self.edges.remove_record(row);
        }
        let mut report = OpReport::new();
        let erased = self.comm.all_reduce_sum(rows.len() as u64);
        report.set_info("num_edges_erased", erased);
        Ok(report)
    }

    /// Remove every edge whose named string column holds a key from the
    /// set. The key set is hash-routed first, so each rank may pass any
    /// subset. Collective.
    pub fn erase_edges_by_key(&mut self, name: &str, keys: Vec<String>) -> Result<OpReport> {
        use crate::comm::{DistSet, RankLocal};

        self.guard_writable()?;
        let parsed = SeriesName::parse(name)?;
        if !parsed.is_edge_series() {
            return Err(GraphError::InvalidSeriesName(parsed.qualified()));
        }
        let col = self
            .edges
            .find_series(parsed.unqualified())
            .ok_or_else(|| GraphError::SeriesNotFound(parsed.qualified()))?;
        if self.edges.series_type(col)? != PrimitiveType::Str {
            return Err(GraphError::TypeMismatch {
                series: parsed.qualified(),
                expected: PrimitiveType::Str,
                actual: self.edges.series_type(col)?,
            });
        }

        let haystack = DistSet::new(self.comm);
        for key in keys {
            haystack.async_insert(key);
        }
        self.comm.barrier();

        // Ask each key's owner about membership; hits are reported back to
        // the edge's rank, which removes the rows after the barrier.
        let doomed: RankLocal<Vec<RowId>> = RankLocal::new(self.comm, Vec::new());
        let doomed_id = doomed.id();
        let my_rank = self.comm.rank();
        self.edges.for_all(col, &self.strings, |row, v| {
            if let ValueRef::Str(key) = v {
                haystack.async_exec_if_contains(key.to_string(), move |c, _| {
                    c.send(my_rank, move |c2| {
                        RankLocal::<Vec<RowId>>::attach(c2, doomed_id).with(|d| d.push(row));
                    });
                });
            }
        })?;
        self.comm.barrier();

        let rows = doomed.with(std::mem::take);
        for &row in &rows {
            self.edges.remove_record(row);
        }
        let mut report = OpReport::new();
        let erased = self.comm.all_reduce_sum(rows.len() as u64);
        report.set_info("num_edges_erased", erased);
        Ok(report)
    }

    // ── Selection ─────────────────────────────────────────────────────

    /// Up to `limit` node keys matching the clause, gathered globally.
    /// Collective; every rank receives the same list.
    pub fn sample_nodes(&self, limit: usize, where_: Option<&WhereClause>) -> Result<Vec<String>> {
        let mut local = Vec::new();
        self.for_all_nodes(where_, |row| {
            if local.len() < limit {
                if let Ok(key) = self.nodes.get_str(self.node_id_col, row, &self.strings) {
                    local.push(key.to_string());
                }
            }
        })?;
        let mut all = self.comm.all_reduce(local, |mut a, b| {
            a.extend(b);
            a
        });
        all.truncate(limit);
        Ok(all)
    }

    /// Up to `limit` rows of the requested node series for matching rows.
    /// Collective; every rank receives the same rows.
    pub fn select_nodes(
        &self,
        series: &[&str],
        where_: Option<&WhereClause>,
        limit: usize,
    ) -> Result<Vec<Vec<Value>>> {
        self.select_rows(Namespace::Node, series, where_, limit)
    }

    /// Up to `limit` rows of the requested edge series for matching rows.
    /// Collective; every rank receives the same rows.
    pub fn select_edges(
        &self,
        series: &[&str],
        where_: Option<&WhereClause>,
        limit: usize,
    ) -> Result<Vec<Vec<Value>>> {
        self.select_rows(Namespace::Edge, series, where_, limit)
    }

    fn select_rows(
        &self,
        ns: Namespace,
        series: &[&str],
        where_: Option<&WhereClause>,
        limit: usize,
    ) -> Result<Vec<Vec<Value>>> {
        let store = self.store_for(ns);
        let idxs: Vec<SeriesIdx> = series
            .iter()
            .map(|raw| {
                let name = SeriesName::parse(raw)?;
                if name.namespace() != ns {
                    return Err(GraphError::InvalidSeriesName(name.qualified()));
                }
                store
                    .find_series(name.unqualified())
                    .ok_or_else(|| GraphError::SeriesNotFound(name.qualified()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut local = Vec::new();
        let visit = |row: RowId| {
            if local.len() < limit {
                local.push(self.gather_tuple(ns, &idxs, row));
            }
        };
        match ns {
            Namespace::Node => self.for_all_nodes(where_, visit)?,
            Namespace::Edge => self.for_all_edges(where_, visit)?,
        }

        let mut all = self.comm.all_reduce(local, |mut a, b| {
            a.extend(b);
            a
        });
        all.truncate(limit);
        Ok(all)
    }

    // ── Column write-back helpers for the graph primitives ────────────

    /// Write a u64 node column from key → value pairs local to this rank.
    /// Keys without a matching node are counted in the report.
    pub(crate) fn write_node_column_u64(
        &mut self,
        idx: SeriesIdx,
        entries: impl IntoIterator<Item = (String, u64)>,
        report: &mut OpReport,
    ) -> Result<()> {
        let mut unmatched = 0u64;
        for (key, value) in entries {
            match self.node_index.get(&key) {
                Some(&row) => self.nodes.set_u64(idx, row, value)?,
                None => unmatched += 1,
            }
        }
        report.warn_count("key does not name a node", unmatched);
        Ok(())
    }

    /// Write a string node column from key → value pairs local to this
    /// rank.
    pub(crate) fn write_node_column_str(
        &mut self,
        idx: SeriesIdx,
        entries: impl IntoIterator<Item = (String, String)>,
        report: &mut OpReport,
    ) -> Result<()> {
        let mut unmatched = 0u64;
        for (key, value) in entries {
            match self.node_index.get(&key) {
                Some(&row) => self
                    .nodes
                    .set_str(idx, row, &value, &mut self.strings)?,
                None => unmatched += 1,
            }
        }
        report.warn_count("key does not name a node", unmatched);
        Ok(())
    }

    /// Require that a node series does not exist yet, then create it.
    pub(crate) fn fresh_node_series(
        &mut self,
        name: &str,
        ty: PrimitiveType,
    ) -> Result<(SeriesName, SeriesIdx)> {
        self.guard_writable()?;
        let parsed = SeriesName::parse(name)?;
        if !parsed.is_node_series() {
            return Err(GraphError::InvalidSeriesName(parsed.qualified()));
        }
        if self.nodes.contains_series(parsed.unqualified()) {
            return Err(GraphError::SeriesExists(parsed.qualified()));
        }
        let idx = self
            .nodes
            .add_series(parsed.unqualified(), ty, ContainerKind::Dense);
        Ok((parsed, idx))
    }
}

impl Drop for Graph<'_> {
    fn drop(&mut self) {
        if !self.closed && !self.read_only {
            if let Err(e) = self.flush() {
                tracing::warn!(error = %e, "flush on drop failed");
            }
        }
    }
}
