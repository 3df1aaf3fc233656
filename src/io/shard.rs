//! Bundled binary shard format.
//!
//! A self-contained columnar shard file used for ingest fixtures, export
//! targets, and round-trip testing. One file holds a schema and its rows:
//!
//! ```text
//! Offset  Size  Field
//! 0       4     magic: b"SDS1"
//! 4       2     version: u16 LE
//! 6       2     reserved: 0x0000
//! 8       ...   bincode payload: ShardPayload { schema, rows }
//! ```
//!
//! Opening a directory reads every `*.shard` file in name order; rows are
//! dealt to ranks file-by-file round-robin, so every rank streams a
//! disjoint share.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use super::{ColumnSpec, ColumnarFormat, RowSource, RowWriter};
use crate::error::{GraphError, Result};
use crate::store::value::Value;

const SHARD_MAGIC: [u8; 4] = *b"SDS1";
const SHARD_VERSION: u16 = 1;
const HEADER_SIZE: usize = 8;

pub const SHARD_EXTENSION: &str = "shard";

#[derive(Debug, Serialize, Deserialize)]
struct ShardPayload {
    schema: Vec<ColumnSpec>,
    rows: Vec<Vec<Value>>,
}

fn read_shard_file(path: &Path) -> Result<ShardPayload> {
    let file = File::open(path)?;
    // Safety: shard files are written whole via temp-and-rename and are
    // not mutated afterwards.
    let map = unsafe { Mmap::map(&file)? };
    let bytes: &[u8] = &map;
    if bytes.len() < HEADER_SIZE {
        return Err(GraphError::InvalidFormat(format!(
            "Shard file too small: {}",
            path.display()
        )));
    }
    if bytes[0..4] != SHARD_MAGIC {
        return Err(GraphError::InvalidFormat(format!(
            "Not a shard file: {}",
            path.display()
        )));
    }
    let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
    if version != SHARD_VERSION {
        return Err(GraphError::InvalidFormat(format!(
            "Unsupported shard version: {}",
            version
        )));
    }
    Ok(bincode::deserialize(&bytes[HEADER_SIZE..])?)
}

/// The bundled format adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryShardFormat;

impl BinaryShardFormat {
    pub fn new() -> Self {
        Self
    }

    fn shard_files(path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }
        if !path.is_dir() {
            return Err(GraphError::MissingObject(path.display().to_string()));
        }
        let mut files = Vec::new();
        let mut stack = vec![path.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let p = entry.path();
                if p.is_dir() {
                    if recursive {
                        stack.push(p);
                    }
                } else if p.extension().and_then(|e| e.to_str()) == Some(SHARD_EXTENSION) {
                    files.push(p);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

impl ColumnarFormat for BinaryShardFormat {
    fn extension(&self) -> &str {
        SHARD_EXTENSION
    }

    fn open(
        &self,
        path: &Path,
        recursive: bool,
        rank: usize,
        world_size: usize,
    ) -> Result<Box<dyn RowSource>> {
        let files = Self::shard_files(path, recursive)?;
        if files.is_empty() {
            return Err(GraphError::MissingObject(format!(
                "no shard files under {}",
                path.display()
            )));
        }

        let mut schema: Option<Vec<ColumnSpec>> = None;
        let mut rows = Vec::new();
        for (i, file) in files.iter().enumerate() {
            let payload = read_shard_file(file)?;
            match &schema {
                None => schema = Some(payload.schema),
                Some(expected) => {
                    if *expected != payload.schema {
                        return Err(GraphError::InvalidFormat(format!(
                            "Shard schema mismatch in {}",
                            file.display()
                        )));
                    }
                }
            }
            // File-granularity round-robin share.
            if i % world_size == rank {
                rows.extend(payload.rows);
            }
        }

        Ok(Box::new(ShardReader {
            schema: schema.expect("at least one shard file"),
            rows: rows.into_iter(),
        }))
    }

    fn create(
        &self,
        path: &Path,
        schema: &[ColumnSpec],
        overwrite: bool,
    ) -> Result<Box<dyn RowWriter>> {
        if path.exists() && !overwrite {
            return Err(GraphError::PathExists(path.display().to_string()));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Box::new(ShardWriter {
            path: path.to_path_buf(),
            schema: schema.to_vec(),
            rows: Vec::new(),
            finished: false,
        }))
    }
}

struct ShardReader {
    schema: Vec<ColumnSpec>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl RowSource for ShardReader {
    fn schema(&self) -> &[ColumnSpec] {
        &self.schema
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.rows.next())
    }
}

struct ShardWriter {
    path: PathBuf,
    schema: Vec<ColumnSpec>,
    rows: Vec<Vec<Value>>,
    finished: bool,
}

impl RowWriter for ShardWriter {
    fn write_row(&mut self, row: &[Value]) -> Result<()> {
        if row.len() != self.schema.len() {
            return Err(GraphError::InvalidFormat(format!(
                "Row has {} cells, schema has {} columns",
                row.len(),
                self.schema.len()
            )));
        }
        for (cell, col) in row.iter().zip(&self.schema) {
            if cell.is_none() {
                continue;
            }
            let expected = col.ty.series_type();
            if cell.primitive_type() != expected {
                return Err(GraphError::InvalidFormat(format!(
                    "Column '{}' expects {}, row holds {:?}",
                    col.name, col.ty, cell
                )));
            }
        }
        self.rows.push(row.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let payload = ShardPayload {
            schema: std::mem::take(&mut self.schema),
            rows: std::mem::take(&mut self.rows),
        };
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.extend_from_slice(&SHARD_MAGIC);
        buf.extend_from_slice(&SHARD_VERSION.to_le_bytes());
        buf.extend_from_slice(&[0u8; 2]);
        bincode::serialize_into(&mut buf, &payload)?;

        let tmp = self.path.with_extension("shard.tmp");
        fs::write(&tmp, &buf)?;
        fs::rename(&tmp, &self.path)?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for ShardWriter {
    fn drop(&mut self) {
        if !self.finished && (!self.rows.is_empty() || !self.schema.is_empty()) {
            tracing::warn!(path = %self.path.display(), "shard writer dropped without finish; shard discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ColumnType;
    use tempfile::tempdir;

    fn sample_schema() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("u", ColumnType::ByteArray),
            ColumnSpec::new("v", ColumnType::ByteArray),
            ColumnSpec::new("weight", ColumnType::Double),
        ]
    }

    fn write_sample(path: &Path, rows: &[Vec<Value>]) {
        let fmt = BinaryShardFormat::new();
        let mut w = fmt.create(path, &sample_schema(), false).unwrap();
        for row in rows {
            w.write_row(row).unwrap();
        }
        w.finish().unwrap();
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edges.shard");
        let rows = vec![
            vec![Value::Str("a".into()), Value::Str("b".into()), Value::Double(1.5)],
            vec![Value::Str("b".into()), Value::Str("c".into()), Value::None],
        ];
        write_sample(&path, &rows);

        let fmt = BinaryShardFormat::new();
        let mut src = fmt.open(&path, false, 0, 1).unwrap();
        assert_eq!(src.schema(), sample_schema().as_slice());
        assert_eq!(src.next_row().unwrap(), Some(rows[0].clone()));
        assert_eq!(src.next_row().unwrap(), Some(rows[1].clone()));
        assert_eq!(src.next_row().unwrap(), None);
    }

    #[test]
    fn test_directory_share_partitions_rows() {
        let dir = tempdir().unwrap();
        for i in 0..4 {
            write_sample(
                &dir.path().join(format!("part{}.shard", i)),
                &[vec![
                    Value::Str(format!("u{}", i)),
                    Value::Str(format!("v{}", i)),
                    Value::None,
                ]],
            );
        }

        let fmt = BinaryShardFormat::new();
        let mut total = 0;
        for rank in 0..2 {
            let mut src = fmt.open(dir.path(), false, rank, 2).unwrap();
            while let Some(_row) = src.next_row().unwrap() {
                total += 1;
            }
        }
        assert_eq!(total, 4);

        // Every file goes to exactly one rank.
        let mut src0 = fmt.open(dir.path(), false, 0, 2).unwrap();
        let mut rank0 = 0;
        while src0.next_row().unwrap().is_some() {
            rank0 += 1;
        }
        assert_eq!(rank0, 2);
    }

    #[test]
    fn test_overwrite_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.shard");
        write_sample(&path, &[]);

        let fmt = BinaryShardFormat::new();
        assert!(matches!(
            fmt.create(&path, &sample_schema(), false),
            Err(GraphError::PathExists(_))
        ));
        // With overwrite the writer replaces the file.
        let mut w = fmt.create(&path, &sample_schema(), true).unwrap();
        w.write_row(&[Value::Str("x".into()), Value::Str("y".into()), Value::None])
            .unwrap();
        w.finish().unwrap();

        let mut src = fmt.open(&path, false, 0, 1).unwrap();
        assert!(src.next_row().unwrap().is_some());
        assert!(src.next_row().unwrap().is_none());
    }

    #[test]
    fn test_type_checked_rows() {
        let dir = tempdir().unwrap();
        let fmt = BinaryShardFormat::new();
        let mut w = fmt
            .create(&dir.path().join("x.shard"), &sample_schema(), false)
            .unwrap();
        let err = w.write_row(&[Value::Int64(1), Value::Str("v".into()), Value::None]);
        assert!(matches!(err, Err(GraphError::InvalidFormat(_))));
        let err = w.write_row(&[Value::Str("u".into()), Value::Str("v".into())]);
        assert!(matches!(err, Err(GraphError::InvalidFormat(_))));
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.shard");
        fs::write(&path, b"XXXXXXXXXXXX").unwrap();
        let fmt = BinaryShardFormat::new();
        assert!(matches!(
            fmt.open(&path, false, 0, 1),
            Err(GraphError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_int32_widening_accepted() {
        // A schema declaring int32 accepts Int64 cell values (widened).
        let dir = tempdir().unwrap();
        let schema = vec![ColumnSpec::new("n", ColumnType::Int32)];
        let fmt = BinaryShardFormat::new();
        let path = dir.path().join("w.shard");
        let mut w = fmt.create(&path, &schema, false).unwrap();
        w.write_row(&[Value::Int64(7)]).unwrap();
        w.finish().unwrap();

        let mut src = fmt.open(&path, false, 0, 1).unwrap();
        assert_eq!(src.next_row().unwrap(), Some(vec![Value::Int64(7)]));
    }
}
