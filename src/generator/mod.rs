//! Per-dialect SQL statement emission (§4.C), injected into the dispatcher.
//!
//! One concrete implementation ships in this crate (`sqlite`). Other
//! dialects are a matter of implementing this trait; nothing above the
//! dispatcher is dialect-aware.

pub mod sqlite;

pub use sqlite::SqliteGenerator;

use indexmap::IndexMap;

use crate::adapter::LiveColumn;
use crate::schema::{Field, Index, Key};

/// The suffix used when synthesising a canonical key identifier via
/// `identifier_for` (§4.D, `find_key_name`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySuffix {
    PrimaryKey,
    UniqueKey,
    ForeignKey,
}

impl KeySuffix {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryKey => "pk",
            Self::UniqueKey => "uk",
            Self::ForeignKey => "fk",
        }
    }
}

/// Per-dialect DDL/identifier rendering, injected into the dispatcher
/// (§4.C). Implementations are pure: they never touch the database.
pub trait SqlGenerator {
    fn create_table_sql(&self, table: &str, fields: &[Field], keys: &[Key]) -> String;
    fn drop_table_sql(&self, table: &str) -> String;
    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String;

    fn add_field_sql(&self, table: &str, field: &Field) -> Vec<String>;

    /// Drop `field` from `table`. `columns` is the table's current live
    /// column set (as `DatabaseAdapter::get_columns` returns it), supplied
    /// so dialects with no native `DROP COLUMN` can rebuild the table
    /// around the surviving columns. `primary_key` is the table's current
    /// primary-key column names (as `DatabaseAdapter::primary_key_columns`
    /// returns them), so a dialect that rebuilds the whole table can recreate
    /// the constraint.
    fn drop_field_sql(
        &self,
        table: &str,
        columns: &IndexMap<String, LiveColumn>,
        field: &str,
        primary_key: &[String],
    ) -> Vec<String>;

    /// Change `old_name`'s type/length/precision/nullability/default to
    /// match `new_field`. `columns` is the table's current live column set,
    /// supplied for the same reason as `drop_field_sql`. `primary_key` is the
    /// table's current primary-key column names, for the same reason.
    fn alter_field_sql(
        &self,
        table: &str,
        columns: &IndexMap<String, LiveColumn>,
        old_name: &str,
        new_field: &Field,
        primary_key: &[String],
    ) -> Vec<String>;

    /// Change only `field`'s default. Unreachable through the dispatcher in
    /// this crate (`change_field_default` delegates wholesale to
    /// `change_field_type`, §9 "deprecated wrappers"); kept for interface
    /// completeness.
    fn modify_default_sql(&self, table: &str, field: &Field) -> Vec<String>;

    /// Rename `old_name` to `new_field.name`, possibly also changing its
    /// definition. `columns` is the table's current live column set,
    /// supplied for the same reason as `drop_field_sql`. `primary_key` is the
    /// table's current primary-key column names, for the same reason; if
    /// `old_name` is among them the implementation is responsible for
    /// recreating the constraint under the new name.
    fn rename_field_sql(
        &self,
        table: &str,
        columns: &IndexMap<String, LiveColumn>,
        old_name: &str,
        new_field: &Field,
        primary_key: &[String],
    ) -> Vec<String>;

    fn add_key_sql(&self, table: &str, key: &Key) -> Vec<String>;
    fn drop_key_sql(&self, table: &str, key: &Key) -> Vec<String>;
    fn rename_key_sql(&self, table: &str, old_name: &str, key: &Key) -> Vec<String>;

    fn add_index_sql(&self, table: &str, index: &Index) -> String;
    fn drop_index_sql(&self, table: &str, index_name: &str) -> String;
    fn rename_index_sql(&self, table: &str, old_name: &str, index: &Index) -> Vec<String>;

    fn reset_sequence_sql(&self, table: &str, field: &str) -> Option<String>;
    fn create_structure_sql(&self, structure: &crate::schema::Structure) -> Vec<String>;

    /// The column-literal rendering of `field`'s declared default, as used
    /// by DDL (e.g. `''`, `0`, `CURRENT_TIMESTAMP`).
    fn default_value(&self, field: &Field) -> Option<String>;

    /// The same value, formatted the way the diff engine compares it
    /// against a live column's `default_value` (§4.E, default mismatch).
    fn formatted_default(&self, field: &Field) -> Option<String>;

    /// Canonical identifier for a table/columns/suffix combination, used
    /// when no explicit name was declared (`find_key_name`, §4.D).
    fn identifier_for(&self, table: &str, columns: &[String], suffix: KeySuffix) -> String;

    /// Name the dialect gives to a table's primary key object, if it models
    /// one as a separately-named object at all.
    fn primary_key_name(&self, table: &str) -> Option<String>;

    /// Table-name prefix this deployment uses, if any (§4.E.3).
    fn prefix(&self) -> &str;

    /// Terminate each statement with this dialect's statement separator,
    /// for embedding in human-readable diagnostics (§4.C).
    fn ended_statements(&self, statements: &[String]) -> Vec<String> {
        statements
            .iter()
            .map(|s| {
                let trimmed = s.trim_end();
                if trimmed.ends_with(';') {
                    trimmed.to_string()
                } else {
                    format!("{trimmed};")
                }
            })
            .collect()
    }
}
