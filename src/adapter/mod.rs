//! Live-database introspection and DDL/DML execution (§4.B).
//!
//! `DatabaseAdapter` is the seam between the engine and a concrete database
//! engine. One concrete implementation ships in this crate (`sqlite`); the
//! trait is written so another dialect's adapter can be dropped in without
//! touching the diff engine, risk evaluator, or fixer.

pub mod sqlite;

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::Result;
use crate::schema::FieldType;

pub use sqlite::SqliteAdapter;

/// The single-character type codes a live column descriptor reports,
/// normalised into `FieldType` via a fixed map (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaType {
    /// Integer (`I`).
    I,
    /// Record/row-id integer (`R`).
    R,
    /// Number/decimal (`N`).
    N,
    /// Floating point, normalised like `N` (`F`).
    F,
    /// Fixed-length character (`C`).
    C,
    /// Variable-length text (`X`).
    X,
    /// Binary (`B`).
    B,
    /// Timestamp (`T`).
    T,
    /// Datetime (`D`).
    D,
}

impl MetaType {
    /// The fixed `meta_type → Field.type` map from §3.
    #[must_use]
    pub const fn normalized(self) -> FieldType {
        match self {
            Self::I | Self::R => FieldType::Integer,
            Self::N | Self::F => FieldType::Number,
            Self::C => FieldType::Char,
            Self::X => FieldType::Text,
            Self::B => FieldType::Binary,
            Self::T => FieldType::Timestamp,
            Self::D => FieldType::Datetime,
        }
    }
}

/// A column as the live database reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveColumn {
    pub meta_type: MetaType,
    pub max_length: i64,
    pub scale: i64,
    pub not_null: bool,
    pub has_default: bool,
    pub default_value: Option<String>,
}

/// A live index as the database reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveIndex {
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Abstraction over live database introspection and DDL/DML execution
/// (§4.B). Implementations are expected to be single-writer: the fixer
/// calls `reset_caches` once before a run and is the sole mutator after.
pub trait DatabaseAdapter {
    /// All table names currently in the database.
    fn get_tables(&self) -> Result<HashSet<String>>;

    /// Column descriptors for `table`, in the database's native column
    /// order.
    fn get_columns(&self, table: &str) -> Result<IndexMap<String, LiveColumn>>;

    /// Indexes defined on `table`. When `include_primary` is false, the
    /// index backing the primary key (if the dialect models one as an
    /// ordinary index) is omitted.
    fn get_indexes(&self, table: &str, include_primary: bool) -> Result<IndexMap<String, LiveIndex>>;

    /// The primary-key column names for `table`, in declared order, or empty
    /// if the table has none. Covers dialects where a single-column primary
    /// key is not modelled as an ordinary index (e.g. SQLite's `INTEGER
    /// PRIMARY KEY` rowid alias), which `get_indexes` cannot recover.
    fn primary_key_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Execute a batch of DDL statements against `affected_tables`,
    /// transactionally where the dialect supports it.
    ///
    /// # Errors
    ///
    /// Returns `SchemaAlignError::ChangeStructure` if execution fails.
    fn execute_ddl(&self, statements: &[String], affected_tables: &[String]) -> Result<()>;

    /// Number of rows currently in `table`.
    fn count_rows(&self, table: &str) -> Result<i64>;

    /// Whether any row in `table` matches `predicate` (a SQL boolean
    /// expression referencing only `table`'s own columns) bound to `args`.
    fn exists_where(&self, table: &str, predicate: &str, args: &[&str]) -> Result<bool>;

    /// Stream every value of `columns` in `table`, invoking `visit` for each
    /// row. `visit` receives the row as a slice of optional strings aligned
    /// with `columns`; returning `Err` stops iteration.
    fn iterate(
        &self,
        table: &str,
        columns: &[String],
        visit: &mut dyn FnMut(&[Option<String>]) -> Result<()>,
    ) -> Result<()>;

    /// Set `column` to `value` in every row of `table` matching `predicate`
    /// bound to `args`.
    fn set_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
        predicate: &str,
        args: &[&str],
    ) -> Result<u64>;

    /// Invalidate any memoised column/index maps. MUST be called before a
    /// fixer run (§4.B, §5).
    fn reset_caches(&self);

    /// Row-format conversion hook some dialects need before an index can be
    /// created (e.g. MySQL's `ROW_FORMAT=DYNAMIC`). `None` means the
    /// dialect has no such concept; the dispatcher then does not retry.
    fn convert_table_row_format(&self, _table: &str) -> Option<Result<()>> {
        None
    }
}
