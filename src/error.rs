//! Error kinds surfaced by the library.
//!
//! Each phase has its own enum so callers can tell a bad argument from a
//! broken index. Nothing here is retried internally.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while answering a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Rejected before any index access.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored document could not be turned back into a place.
    #[error("document {id} is corrupt: {reason}")]
    Corrupt { id: u64, reason: String },

    /// A posting key did not have the expected `term:id` layout.
    #[error("malformed posting key {0:?}")]
    CorruptPosting(Vec<u8>),

    #[error("index storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("geohash error: {0}")]
    Geohash(#[from] geohash::GeohashError),
}

/// Errors raised while building an index.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Input row `id` failed validation.
    #[error("record {id} is invalid: {reason}")]
    InvalidRecord { id: u64, reason: String },

    #[error("failed to encode record {id}: {reason}")]
    Encode { id: u64, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while opening an index.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("index not found at {0}")]
    Missing(PathBuf),

    #[error("{0} is not an index directory")]
    NotAnIndex(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index storage error: {0}")]
    Storage(#[from] sled::Error),

    /// The metadata record is written last, so its absence means the build
    /// never finished.
    #[error("index at {0} is incomplete (no metadata record)")]
    Incomplete(PathBuf),

    #[error("index metadata is corrupt: {0}")]
    Corrupt(String),

    #[error("index schema version {found} is not supported (expected {expected})")]
    SchemaMismatch { found: u32, expected: u32 },
}

/// Errors raised while reading the CSV dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: column '{field}' has unparseable value {value:?}")]
    Parse {
        line: u64,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: expected 7 columns, found {found}")]
    ColumnCount { line: u64, found: usize },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
