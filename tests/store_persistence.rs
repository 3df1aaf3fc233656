//! Persistence tests: stores survive a close/reopen cycle in place, and
//! the read-only mode rejects mutation.

use stratadb::comm::Comm;
use stratadb::heap::{HeapMode, PersistentHeap};
use stratadb::store::{
    ContainerKind, PrimitiveType, RecordStore, StrHandle, StringStore, ValueRef, INLINE_CAP,
};
use stratadb::{Graph, GraphError};
use tempfile::tempdir;

#[test]
fn test_create_set_reopen_read_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people");
    let comm = Comm::solo();

    {
        let mut graph = Graph::open(&comm, &path, false).unwrap();
        graph.add_series("node.age", PrimitiveType::Int64).unwrap();
        let row = graph.add_node_record().unwrap();
        graph.set("node.id", row, ValueRef::Str("alice")).unwrap();
        graph.set("node.age", row, ValueRef::Int64(30)).unwrap();
        graph.close().unwrap();
    }

    let graph = Graph::open_read_only(&comm, &path).unwrap();
    assert_eq!(graph.num_nodes(None).unwrap(), 1);
    assert_eq!(graph.get("node.age", 0).unwrap(), ValueRef::Int64(30));
    assert_eq!(graph.get("node.id", 0).unwrap(), ValueRef::Str("alice"));
    assert_eq!(graph.local_node_row("alice"), Some(0));

    // Mutation is rejected wholesale.
    let mut graph = graph;
    assert!(matches!(
        graph.set("node.age", 0, ValueRef::Int64(31)),
        Err(GraphError::ReadOnlyMode)
    ));
    assert!(matches!(
        graph.add_series("node.x", PrimitiveType::Bool),
        Err(GraphError::ReadOnlyMode)
    ));
    assert!(matches!(
        graph.add_node_record(),
        Err(GraphError::ReadOnlyMode)
    ));
}

#[test]
fn test_record_store_survives_heap_roundtrip_across_conversions() {
    let dir = tempdir().unwrap();
    let heap_path = dir.path().join("heap");

    let mut pool = StringStore::new();
    let mut rs = RecordStore::new();
    rs.add_series("s", PrimitiveType::Int64, ContainerKind::Sparse);
    for _ in 0..1001 {
        rs.add_record();
    }
    rs.set("s", 0, ValueRef::Int64(10), &mut pool).unwrap();
    rs.set("s", 100, ValueRef::Int64(20), &mut pool).unwrap();
    rs.set("s", 1000, ValueRef::Int64(30), &mut pool).unwrap();
    assert!((rs.load_factor("s").unwrap() - 3.0 / 1001.0).abs() < 1e-12);

    {
        let heap = PersistentHeap::create(&heap_path).unwrap();
        heap.store("records", &rs).unwrap();
        heap.store("strings", &pool).unwrap();
    }

    let heap = PersistentHeap::open(&heap_path, HeapMode::ReadWrite).unwrap();
    let mut rs: RecordStore = heap.load("records").unwrap();
    assert_eq!(rs.size("s").unwrap(), 3);
    assert_eq!(rs.series_kind("s").unwrap(), ContainerKind::Sparse);

    rs.convert("s", ContainerKind::Dense).unwrap();
    assert_eq!(rs.get_i64("s", 0).unwrap(), 10);
    assert_eq!(rs.get_i64("s", 100).unwrap(), 20);
    assert_eq!(rs.get_i64("s", 1000).unwrap(), 30);
    assert_eq!(rs.size("s").unwrap(), 3);
    assert!(rs.capacity("s").unwrap() >= 1001);

    rs.convert("s", ContainerKind::Sparse).unwrap();
    assert_eq!(rs.capacity("s").unwrap(), 3);
    assert_eq!(rs.get_i64("s", 100).unwrap(), 20);
}

#[test]
fn test_string_store_interning_and_accessor_bounds() {
    let mut pool = StringStore::new();

    let offsets: Vec<u64> = (0..4).map(|_| pool.find_or_add("hello")).collect();
    assert_eq!(pool.size(), 1);
    assert!(offsets.windows(2).all(|w| w[0] == w[1]));

    // A 64-byte string is pooled, a 3-byte string stays inline.
    let long = "x".repeat(64);
    let handle = StrHandle::new(&long, &mut pool);
    assert!(!handle.is_inline());
    assert_eq!(pool.size(), 2);
    assert_eq!(handle.as_str(&pool), long);

    let short = StrHandle::new("abc", &mut pool);
    assert!(short.is_inline());
    assert_eq!(short.as_str(&pool), "abc");
    assert_eq!(pool.size(), 2);

    assert_eq!(INLINE_CAP, 14);
}

#[test]
fn test_string_handles_stay_valid_after_reopen() {
    let dir = tempdir().unwrap();
    let heap_path = dir.path().join("heap");

    let mut pool = StringStore::new();
    let long = "a string comfortably past the inline capacity";
    let handle = StrHandle::new(long, &mut pool);
    {
        let heap = PersistentHeap::create(&heap_path).unwrap();
        heap.store("strings", &pool).unwrap();
        heap.store("handle", &handle).unwrap();
    }

    let heap = PersistentHeap::open(&heap_path, HeapMode::ReadOnly).unwrap();
    let pool: StringStore = heap.load("strings").unwrap();
    let handle: StrHandle = heap.load("handle").unwrap();
    assert_eq!(handle.as_str(&pool), long);
}

#[test]
fn test_reopen_missing_graph_fails() {
    let dir = tempdir().unwrap();
    let comm = Comm::solo();
    assert!(Graph::open_read_only(&comm, dir.path().join("absent")).is_err());
}

#[test]
fn test_row_ids_not_reused_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("g");
    let comm = Comm::solo();

    let first;
    {
        let mut graph = Graph::open(&comm, &path, false).unwrap();
        first = graph.add_node_record().unwrap();
        graph.set("node.id", first, ValueRef::Str("n0")).unwrap();
        let second = graph.add_node_record().unwrap();
        graph.set("node.id", second, ValueRef::Str("n1")).unwrap();
        // Removing keeps the id retired forever.
        assert!(graph.nodes().contains_record(second));
        graph.close().unwrap();
    }

    let mut graph = Graph::open(&comm, &path, false).unwrap();
    let next = graph.add_node_record().unwrap();
    assert_eq!(next, 2);
    assert_ne!(next, first);
}
