//! Concrete `SqlGenerator` for SQLite (§4.C.1).
//!
//! SQLite has no native `ALTER COLUMN`, no `ALTER TABLE ADD CONSTRAINT`, and
//! (for the purposes of this crate) is treated as though it also lacks
//! `DROP COLUMN`/`RENAME COLUMN`: every column-definition change goes
//! through the documented "twelve-step" table-rebuild recipe — create a
//! replacement table with the desired final column set, copy rows across,
//! drop the original, rename the replacement into place — all inside the
//! single transaction `SqliteAdapter::execute_ddl` already provides.
//! Non-primary keys (`UNIQUE`/`FOREIGN`/`FOREIGN_UNIQUE`) are realised as
//! plain indexes: this crate explicitly does not enforce foreign-key
//! reference integrity beyond the supporting index (§1, Non-goals).

use indexmap::IndexMap;

use crate::adapter::LiveColumn;
use crate::schema::{DefaultValue, Field, FieldType, Index, Key, KeyType, Structure};

use super::{KeySuffix, SqlGenerator};

/// Canonical SQLite declared-type string for a field, in the
/// `NAME(len[,scale])` convention `SqliteAdapter` parses back (§4.B.1).
fn sql_type(field: &Field) -> String {
    match field.normalized_type() {
        FieldType::Integer => format!("INTEGER({})", field.clamped_length()),
        FieldType::Number => format!("NUMERIC({},{})", field.length, field.decimals),
        FieldType::Char => format!("CHAR({})", field.length),
        FieldType::Text => "TEXT".to_string(),
        FieldType::Binary => "BLOB".to_string(),
        FieldType::Timestamp => "TIMESTAMP".to_string(),
        FieldType::Datetime => "DATETIME".to_string(),
        FieldType::Float => unreachable!("normalized_type never returns Float"),
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// The DDL-literal rendering of a field's default, e.g. `''`, `0`,
/// `CURRENT_TIMESTAMP`.
fn default_literal(field: &Field) -> Option<String> {
    match field.default.as_ref()? {
        DefaultValue::Str(s) => {
            if matches!(field.normalized_type(), FieldType::Timestamp | FieldType::Datetime)
                && s.eq_ignore_ascii_case("CURRENT_TIMESTAMP")
            {
                Some("CURRENT_TIMESTAMP".to_string())
            } else {
                Some(format!("'{}'", escape_literal(s)))
            }
        }
        DefaultValue::Num(n) => Some(format_number(*n)),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

fn column_clause(field: &Field) -> String {
    let mut clause = format!("{} {}", quote_ident(&field.name), sql_type(field));
    if field.notnull {
        clause.push_str(" NOT NULL");
    }
    if let Some(default) = default_literal(field) {
        clause.push_str(" DEFAULT ");
        clause.push_str(&default);
    }
    clause
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQL renderer targeting SQLite.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteGenerator;

impl SqliteGenerator {
    /// Render the full table-rebuild sequence: create a replacement table
    /// with `new_fields` (in order), copy data across mapping position `i`
    /// from `source_names[i]` (the live column feeding that position, or
    /// `None` for a brand-new column with no prior data), drop the
    /// original, rename the replacement into place.
    #[must_use]
    pub fn rebuild_table_sql(
        &self,
        table: &str,
        new_fields: &[Field],
        source_names: &[Option<String>],
        primary_key: Option<&[String]>,
    ) -> Vec<String> {
        let temp_name = format!("{table}__schemalign_rebuild");
        let mut create = format!("CREATE TABLE {} (\n", quote_ident(&temp_name));
        let column_defs: Vec<String> = new_fields.iter().map(column_clause).collect();
        create.push_str(&column_defs.join(",\n"));
        if let Some(pk_cols) = primary_key {
            if !pk_cols.is_empty() {
                let cols = pk_cols
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                create.push_str(&format!(",\n  PRIMARY KEY ({cols})"));
            }
        }
        create.push_str("\n)");

        let dest_cols = new_fields
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect::<Vec<_>>()
            .join(", ");
        let source_exprs = new_fields
            .iter()
            .zip(source_names.iter())
            .map(|(field, source)| match source {
                Some(name) => quote_ident(name),
                None => default_literal(field).unwrap_or_else(|| "NULL".to_string()),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let copy = format!(
            "INSERT INTO {} ({dest_cols}) SELECT {source_exprs} FROM {}",
            quote_ident(&temp_name),
            quote_ident(table)
        );
        let drop_old = format!("DROP TABLE {}", quote_ident(table));
        let rename = format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&temp_name),
            quote_ident(table)
        );

        vec![create, copy, drop_old, rename]
    }
}

impl SqlGenerator for SqliteGenerator {
    fn create_table_sql(&self, table: &str, fields: &[Field], keys: &[Key]) -> String {
        let mut sql = format!("CREATE TABLE {} (\n", quote_ident(table));
        let column_defs: Vec<String> = fields.iter().map(column_clause).collect();
        sql.push_str(&column_defs.join(",\n"));

        if let Some(pk) = keys.iter().find(|k| k.key_type == KeyType::Primary) {
            let cols = pk
                .fields
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(",\n  PRIMARY KEY ({cols})"));
        }
        sql.push_str("\n)");
        sql
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", quote_ident(table))
    }

    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(old_name),
            quote_ident(new_name)
        )
    }

    fn add_field_sql(&self, table: &str, field: &Field) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            column_clause(field)
        )]
    }

    fn drop_field_sql(
        &self,
        table: &str,
        columns: &IndexMap<String, LiveColumn>,
        field: &str,
        primary_key: &[String],
    ) -> Vec<String> {
        let (new_fields, source_names) = surviving_columns(columns, field);
        let pk: Vec<String> = primary_key.iter().filter(|c| c.as_str() != field).cloned().collect();
        self.rebuild_table_sql(table, &new_fields, &source_names, Some(&pk))
    }

    fn alter_field_sql(
        &self,
        table: &str,
        columns: &IndexMap<String, LiveColumn>,
        old_name: &str,
        new_field: &Field,
        primary_key: &[String],
    ) -> Vec<String> {
        let (new_fields, source_names) = replace_column(columns, old_name, new_field);
        self.rebuild_table_sql(table, &new_fields, &source_names, Some(primary_key))
    }

    fn modify_default_sql(&self, _table: &str, _field: &Field) -> Vec<String> {
        // Unreachable: `change_field_default` delegates wholesale to
        // `change_field_type` (§9, "deprecated wrappers").
        Vec::new()
    }

    fn rename_field_sql(
        &self,
        table: &str,
        columns: &IndexMap<String, LiveColumn>,
        old_name: &str,
        new_field: &Field,
        primary_key: &[String],
    ) -> Vec<String> {
        let (new_fields, source_names) = replace_column(columns, old_name, new_field);
        let pk: Vec<String> = primary_key
            .iter()
            .map(|c| if c == old_name { new_field.name.clone() } else { c.clone() })
            .collect();
        self.rebuild_table_sql(table, &new_fields, &source_names, Some(&pk))
    }

    fn add_key_sql(&self, table: &str, key: &Key) -> Vec<String> {
        vec![self.add_index_sql(table, &key_as_index(key))]
    }

    fn drop_key_sql(&self, table: &str, key: &Key) -> Vec<String> {
        vec![self.drop_index_sql(table, &key.name)]
    }

    fn rename_key_sql(&self, table: &str, old_name: &str, key: &Key) -> Vec<String> {
        self.rename_index_sql(table, old_name, &key_as_index(key))
    }

    fn add_index_sql(&self, table: &str, index: &Index) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        let cols = index
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE {unique}INDEX {} ON {} ({cols})",
            quote_ident(&index.name),
            quote_ident(table)
        )
    }

    fn drop_index_sql(&self, _table: &str, index_name: &str) -> String {
        format!("DROP INDEX {}", quote_ident(index_name))
    }

    fn rename_index_sql(&self, table: &str, old_name: &str, index: &Index) -> Vec<String> {
        vec![
            self.drop_index_sql(table, old_name),
            self.add_index_sql(table, index),
        ]
    }

    fn reset_sequence_sql(&self, table: &str, field: &str) -> Option<String> {
        // SQLite's autoincrement counter lives in `sqlite_sequence`; only
        // meaningful for a field declared as the table's rowid alias.
        Some(format!(
            "DELETE FROM sqlite_sequence WHERE name = '{}'",
            escape_literal(table)
        ))
        .filter(|_| field == "id")
    }

    fn create_structure_sql(&self, structure: &Structure) -> Vec<String> {
        structure
            .tables()
            .iter()
            .map(|t| self.create_table_sql(&t.name, t.fields(), t.keys()))
            .collect()
    }

    fn default_value(&self, field: &Field) -> Option<String> {
        default_literal(field)
    }

    fn formatted_default(&self, field: &Field) -> Option<String> {
        field.default.as_ref().map(DefaultValue::display)
    }

    fn identifier_for(&self, table: &str, columns: &[String], suffix: KeySuffix) -> String {
        format!("{table}_{}_{}", columns.join("_"), suffix.as_str())
    }

    fn primary_key_name(&self, _table: &str) -> Option<String> {
        // SQLite has no separately-named primary key object.
        None
    }

    fn prefix(&self) -> &str {
        ""
    }
}

/// Reconstruct a `Field`-shaped column spec from what the adapter reports
/// live, for columns the rebuild carries across unchanged.
fn live_column_to_field(name: &str, col: &LiveColumn) -> Field {
    let field_type = col.meta_type.normalized();
    let default = col.default_value.as_ref().map(|v| {
        if field_type == FieldType::Number {
            v.parse::<f64>()
                .map(DefaultValue::Num)
                .unwrap_or_else(|_| DefaultValue::Str(v.clone()))
        } else {
            DefaultValue::Str(v.clone())
        }
    });
    Field {
        name: name.to_string(),
        field_type,
        length: col.max_length,
        decimals: col.scale,
        notnull: col.not_null,
        default,
        sequence: false,
    }
}

/// The rebuild column set and per-position copy sources for dropping
/// `drop_field` from `columns`.
fn surviving_columns(
    columns: &IndexMap<String, LiveColumn>,
    drop_field: &str,
) -> (Vec<Field>, Vec<Option<String>>) {
    columns
        .iter()
        .filter(|(name, _)| name.as_str() != drop_field)
        .map(|(name, col)| (live_column_to_field(name, col), Some(name.clone())))
        .unzip()
}

/// The rebuild column set and per-position copy sources for replacing
/// `old_name`'s definition with `new_field`, keeping every other column.
fn replace_column(
    columns: &IndexMap<String, LiveColumn>,
    old_name: &str,
    new_field: &Field,
) -> (Vec<Field>, Vec<Option<String>>) {
    columns
        .iter()
        .map(|(name, col)| {
            if name == old_name {
                (new_field.clone(), Some(old_name.to_string()))
            } else {
                (live_column_to_field(name, col), Some(name.clone()))
            }
        })
        .unzip()
}

fn key_as_index(key: &Key) -> Index {
    Index {
        name: key.name.clone(),
        unique: key.key_type.implies_unique_index(),
        columns: key.fields.clone(),
    }
}
