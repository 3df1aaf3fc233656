//! Error types for the record engine

use thiserror::Error;

use crate::store::value::PrimitiveType;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    #[error("Series '{series}' holds {actual}, not {expected}")]
    TypeMismatch {
        series: String,
        expected: PrimitiveType,
        actual: PrimitiveType,
    },

    #[error("Record {0} out of range")]
    RecordOutOfRange(u64),

    #[error("No value for record {record} in series '{series}'")]
    CellMissing { series: String, record: u64 },

    #[error("Series '{0}' is reserved")]
    ReservedSeries(String),

    #[error("Series already exists: {0}")]
    SeriesExists(String),

    #[error("Invalid series name: {0}")]
    InvalidSeriesName(String),

    #[error("Where clause mixes node and edge series")]
    MixedClause,

    #[error("Operation not allowed in read-only mode")]
    ReadOnlyMode,

    #[error("Object '{0}' not found in persistent heap")]
    MissingObject(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Path already exists: {0}")]
    PathExists(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("World size mismatch: heap was written by {expected} ranks, opened with {actual}")]
    WorldSizeMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
