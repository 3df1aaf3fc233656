//! Columnar file interfaces.
//!
//! The engine consumes row streams and drives row writers; the concrete
//! file format behind them is an adapter concern. A source presents a
//! schema of `(name, column type)` pairs and yields rows of cell values
//! (`Value::None` for nulls); a writer accepts rows matching the schema it
//! was created with.
//!
//! Sources are SPMD: each rank opens the same path and receives its share
//! of the rows.

pub mod shard;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::value::{PrimitiveType, Value};

pub use shard::BinaryShardFormat;

/// Physical column types a source can declare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    ByteArray,
    /// Anything the engine cannot map; carried for warning messages.
    Other(String),
}

impl ColumnType {
    /// The series type a column materializes as, or `None` when the
    /// column is unsupported. int32 widens to int64, float to double.
    pub fn series_type(&self) -> Option<PrimitiveType> {
        match self {
            ColumnType::Boolean => Some(PrimitiveType::Bool),
            ColumnType::Int32 | ColumnType::Int64 => Some(PrimitiveType::Int64),
            ColumnType::Float | ColumnType::Double => Some(PrimitiveType::Double),
            ColumnType::ByteArray => Some(PrimitiveType::Str),
            ColumnType::Other(_) => None,
        }
    }

    /// Column type used when exporting a series.
    pub fn from_series_type(ty: PrimitiveType) -> Self {
        match ty {
            PrimitiveType::Bool => ColumnType::Boolean,
            PrimitiveType::Int64 => ColumnType::Int64,
            PrimitiveType::UInt64 => ColumnType::Int64,
            PrimitiveType::Double => ColumnType::Double,
            PrimitiveType::Str => ColumnType::ByteArray,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Boolean => f.write_str("boolean"),
            ColumnType::Int32 => f.write_str("int32"),
            ColumnType::Int64 => f.write_str("int64"),
            ColumnType::Float => f.write_str("float"),
            ColumnType::Double => f.write_str("double"),
            ColumnType::ByteArray => f.write_str("byte_array"),
            ColumnType::Other(name) => write!(f, "other({})", name),
        }
    }
}

/// One column of a source or sink schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A stream of rows with a known schema. Values arrive widened to the
/// engine's primitives (int32 → int64, float → double); nulls arrive as
/// `Value::None`.
pub trait RowSource {
    fn schema(&self) -> &[ColumnSpec];

    /// The next row for this rank, or `None` at end of stream. Row length
    /// equals the schema length.
    fn next_row(&mut self) -> Result<Option<Vec<Value>>>;
}

/// A sink accepting rows that match its creation schema.
pub trait RowWriter {
    /// Append one row. Non-null cells must match the schema column types.
    fn write_row(&mut self, row: &[Value]) -> Result<()>;

    /// Flush and close the file. Must be called; dropping without
    /// finishing discards the shard.
    fn finish(&mut self) -> Result<()>;
}

/// Opens sources and creates writers for one concrete file format.
pub trait ColumnarFormat {
    /// File extension used for shard naming.
    fn extension(&self) -> &str;

    /// Open `path` (a file or a directory of shard files) and return this
    /// rank's share of the rows.
    fn open(
        &self,
        path: &Path,
        recursive: bool,
        rank: usize,
        world_size: usize,
    ) -> Result<Box<dyn RowSource>>;

    /// Create a writer at `path`. Refuses to replace an existing file
    /// unless `overwrite` is set.
    fn create(
        &self,
        path: &Path,
        schema: &[ColumnSpec],
        overwrite: bool,
    ) -> Result<Box<dyn RowWriter>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_mapping() {
        assert_eq!(
            ColumnType::Int32.series_type(),
            Some(PrimitiveType::Int64)
        );
        assert_eq!(
            ColumnType::Int64.series_type(),
            Some(PrimitiveType::Int64)
        );
        assert_eq!(
            ColumnType::Float.series_type(),
            Some(PrimitiveType::Double)
        );
        assert_eq!(
            ColumnType::ByteArray.series_type(),
            Some(PrimitiveType::Str)
        );
        assert_eq!(
            ColumnType::Boolean.series_type(),
            Some(PrimitiveType::Bool)
        );
        assert_eq!(ColumnType::Other("int96".into()).series_type(), None);
    }

    #[test]
    fn test_series_type_to_column() {
        assert_eq!(
            ColumnType::from_series_type(PrimitiveType::UInt64),
            ColumnType::Int64
        );
        assert_eq!(
            ColumnType::from_series_type(PrimitiveType::Str),
            ColumnType::ByteArray
        );
    }
}
