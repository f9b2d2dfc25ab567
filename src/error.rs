//! Error types for the schema alignment engine.
//!
//! Mirrors the split this codebase favors elsewhere: a precise, closed
//! `thiserror` enum for library code, with `anyhow` reserved for the CLI
//! boundary where causal chains matter more than matching on a variant.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SchemaAlignError>;

/// The closed error hierarchy produced by the dispatcher, adapter, diff
/// engine, risk evaluator, fixer, and schema loader.
#[derive(Debug, Error)]
pub enum SchemaAlignError {
    /// Generator returned no SQL where required, or an argument was invalid
    /// (e.g. an empty rename target).
    #[error("unknown DDL operation failure on `{operation}`: {detail}")]
    DdlUnknown { operation: String, detail: String },

    /// Operation referenced a table not present in the live database.
    #[error("table `{table}` does not exist")]
    TableMissing { table: String },

    /// Operation referenced a column not present in the live database.
    #[error("column `{table}.{field}` does not exist")]
    FieldMissing { table: String, field: String },

    /// Create on an existing table, or a rename target clash.
    #[error("table `{table}` already exists")]
    TableAlreadyExists { table: String },

    /// Add on an existing column.
    #[error("column `{table}.{field}` already exists")]
    FieldAlreadyExists { table: String, field: String },

    /// Column participates in an index during a change or drop; caller must
    /// drop dependent indexes first.
    #[error("column `{table}.{field}` is referenced by index `{index}`")]
    Dependency {
        table: String,
        field: String,
        index: String,
    },

    /// The adapter's DDL execution failed.
    #[error("DDL execution failed for `{table}`: {detail}")]
    ChangeStructure { table: String, detail: String },

    /// Schema description loading failed (§4.A.1's TOML loader).
    #[error("failed to load schema description from {path}: {detail}")]
    SchemaLoad { path: PathBuf, detail: String },

    /// Underlying SQLite error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Underlying filesystem/IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Schema description file was not valid TOML or failed validation.
    #[error("invalid schema description: {0}")]
    InvalidSchema(String),

    /// CLI argument was malformed beyond what clap itself validates.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The target database has not been initialised (no tables, no schema).
    #[error("database has not been initialised")]
    NotInitialized,
}

impl SchemaAlignError {
    /// Process exit code this error should map to, per §6/§4.H.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NotInitialized => 2,
            _ => 1,
        }
    }
}
