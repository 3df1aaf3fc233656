//! Persistent heap: a directory of named, header-validated object images.
//!
//! Each named object is one file, `<name>.obj`:
//! ```text
//! Offset  Size  Field
//! 0       4     magic: b"SDH1"
//! 4       2     version: u16 LE
//! 6       2     reserved: 0x0000
//! 8       ...   bincode payload
//! ```
//! Writes go to a temp file and are renamed into place. Reads memory-map
//! the file, validate the header, and deserialize the payload. Persistent
//! structures store offsets, never process pointers, so an image written
//! by one run reads identically in the next.
//!
//! A `manifest.json` written at creation records the format version; opening
//! a heap with an unknown version fails rather than misreading images.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Magic bytes for heap object files.
const OBJECT_MAGIC: [u8; 4] = *b"SDH1";

/// Object format version.
const OBJECT_VERSION: u16 = 1;

/// Object header size in bytes.
const HEADER_SIZE: usize = 8;

/// Heap format version recorded in the manifest.
const HEAP_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapMode {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
}

/// A directory of named persistent objects.
#[derive(Debug)]
pub struct PersistentHeap {
    root: PathBuf,
    mode: HeapMode,
}

impl PersistentHeap {
    /// Create a fresh heap directory. Fails if a manifest already exists.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let manifest_path = root.join(MANIFEST_FILE);
        if manifest_path.exists() {
            return Err(GraphError::PathExists(root.display().to_string()));
        }
        let manifest = Manifest {
            format_version: HEAP_VERSION,
        };
        fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;
        tracing::info!(path = %root.display(), "created persistent heap");
        Ok(Self {
            root,
            mode: HeapMode::ReadWrite,
        })
    }

    /// Open an existing heap, validating the manifest.
    pub fn open(root: impl AsRef<Path>, mode: HeapMode) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(GraphError::MissingObject(format!(
                "{} (no heap at {})",
                MANIFEST_FILE,
                root.display()
            )));
        }
        let manifest: Manifest = serde_json::from_slice(&fs::read(&manifest_path)?)?;
        if manifest.format_version != HEAP_VERSION {
            return Err(GraphError::InvalidFormat(format!(
                "Unsupported heap version: {}",
                manifest.format_version
            )));
        }
        Ok(Self { root, mode })
    }

    /// Remove a heap directory entirely. Missing paths are fine.
    pub fn destroy(root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        if root.exists() {
            fs::remove_dir_all(root)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> HeapMode {
        self.mode
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == HeapMode::ReadOnly
    }

    pub fn contains(&self, name: &str) -> bool {
        self.object_path(name).exists()
    }

    /// Serialize an object under `name`, replacing any previous image.
    pub fn store<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        if self.is_read_only() {
            return Err(GraphError::ReadOnlyMode);
        }
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.extend_from_slice(&OBJECT_MAGIC);
        buf.extend_from_slice(&OBJECT_VERSION.to_le_bytes());
        buf.extend_from_slice(&[0u8; 2]);
        bincode::serialize_into(&mut buf, value)?;

        let tmp = self.root.join(format!(".{}.tmp", name));
        fs::write(&tmp, &buf)?;
        fs::rename(&tmp, self.object_path(name))?;
        Ok(())
    }

    /// Load the object stored under `name`.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.object_path(name);
        if !path.exists() {
            return Err(GraphError::MissingObject(name.to_string()));
        }
        let file = File::open(&path)?;
        // Safety: object files are written atomically and not mutated while
        // mapped; a rank owns its heap shard exclusively.
        let map = unsafe { Mmap::map(&file)? };
        let bytes: &[u8] = &map;
        if bytes.len() < HEADER_SIZE {
            return Err(GraphError::InvalidFormat(format!(
                "Object '{}' too small",
                name
            )));
        }
        if bytes[0..4] != OBJECT_MAGIC {
            return Err(GraphError::InvalidFormat(format!(
                "Object '{}' has wrong magic",
                name
            )));
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != OBJECT_VERSION {
            return Err(GraphError::InvalidFormat(format!(
                "Object '{}' has unsupported version {}",
                name, version
            )));
        }
        Ok(bincode::deserialize(&bytes[HEADER_SIZE..])?)
    }

    fn object_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.obj", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_store_load() {
        let dir = tempdir().unwrap();
        let heap = PersistentHeap::create(dir.path().join("h")).unwrap();

        heap.store("numbers", &vec![1u64, 2, 3]).unwrap();
        assert!(heap.contains("numbers"));
        let loaded: Vec<u64> = heap.load("numbers").unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);
    }

    #[test]
    fn test_named_lookup_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h");
        {
            let heap = PersistentHeap::create(&path).unwrap();
            heap.store("greeting", &"hello".to_string()).unwrap();
        }
        let heap = PersistentHeap::open(&path, HeapMode::ReadWrite).unwrap();
        let s: String = heap.load("greeting").unwrap();
        assert_eq!(s, "hello");
    }

    #[test]
    fn test_missing_object() {
        let dir = tempdir().unwrap();
        let heap = PersistentHeap::create(dir.path().join("h")).unwrap();
        let err = heap.load::<String>("ghost").unwrap_err();
        assert!(matches!(err, GraphError::MissingObject(_)));
        assert!(!heap.contains("ghost"));
    }

    #[test]
    fn test_read_only_rejects_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h");
        PersistentHeap::create(&path).unwrap();

        let heap = PersistentHeap::open(&path, HeapMode::ReadOnly).unwrap();
        let err = heap.store("x", &1u8).unwrap_err();
        assert!(matches!(err, GraphError::ReadOnlyMode));
    }

    #[test]
    fn test_create_over_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h");
        PersistentHeap::create(&path).unwrap();
        assert!(matches!(
            PersistentHeap::create(&path),
            Err(GraphError::PathExists(_))
        ));
    }

    #[test]
    fn test_open_missing_heap_fails() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            PersistentHeap::open(dir.path().join("nope"), HeapMode::ReadWrite),
            Err(GraphError::MissingObject(_))
        ));
    }

    #[test]
    fn test_corrupt_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h");
        let heap = PersistentHeap::create(&path).unwrap();
        heap.store("x", &42u32).unwrap();

        let obj = path.join("x.obj");
        let mut bytes = fs::read(&obj).unwrap();
        bytes[0] = b'Z';
        fs::write(&obj, bytes).unwrap();

        let err = heap.load::<u32>("x").unwrap_err();
        assert!(matches!(err, GraphError::InvalidFormat(_)));
    }

    #[test]
    fn test_store_replaces() {
        let dir = tempdir().unwrap();
        let heap = PersistentHeap::create(dir.path().join("h")).unwrap();
        heap.store("v", &1u32).unwrap();
        heap.store("v", &2u32).unwrap();
        assert_eq!(heap.load::<u32>("v").unwrap(), 2);
    }

    #[test]
    fn test_destroy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h");
        PersistentHeap::create(&path).unwrap();
        assert!(path.exists());
        PersistentHeap::destroy(&path).unwrap();
        assert!(!path.exists());
        // Destroying a missing path is not an error.
        PersistentHeap::destroy(&path).unwrap();
    }
}
