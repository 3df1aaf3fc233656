//! StrataDB — distributed persistent column-oriented record engine.
//!
//! A schema-flexible record store whose columns (series) each hold one
//! primitive type in an adaptive dense or sparse container, persisted in
//! a per-rank heap of named objects. On top of the store sits a
//! distributed property graph: node and edge record stores, reserved
//! structural columns, key-hash partitioning across SPMD ranks, and
//! message-driven graph primitives (degrees, connected components,
//! k-core, BFS, n-hops, top-k).
//!
//! ```
//! use stratadb::comm::Comm;
//! use stratadb::{Graph, PrimitiveType, ValueRef};
//!
//! let comm = Comm::solo();
//! let dir = tempfile::tempdir().unwrap();
//! let mut graph = Graph::open(&comm, dir.path().join("g"), false).unwrap();
//!
//! graph.add_series("node.age", PrimitiveType::Int64).unwrap();
//! let row = graph.add_node_record().unwrap();
//! graph.set("node.id", row, ValueRef::Str("alice")).unwrap();
//! graph.set("node.age", row, ValueRef::Int64(30)).unwrap();
//! assert_eq!(graph.num_nodes(None).unwrap(), 1);
//! graph.close().unwrap();
//! ```

pub mod comm;
pub mod error;
pub mod graph;
pub mod heap;
pub mod io;
pub mod store;

pub use error::{GraphError, Result};
pub use graph::{Graph, Namespace, OpReport, SeriesName, SortOrder, WhereClause};
pub use heap::{HeapMode, PersistentHeap};
pub use store::{ContainerKind, PrimitiveType, RecordStore, StringStore, Value, ValueRef};
