//! Compares a declared schema against the live database, emitting typed,
//! safety-classified error records (§4.E).
//!
//! The diff engine never returns `Err`: every discrepancy it finds becomes
//! an `ErrorRecord` rather than aborting the run. It is the only component
//! besides the fixer that reads through the `Dispatcher` (for `index_exists`
//! — §4.D's note on that operation living at the dispatcher layer, not the
//! adapter).

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::adapter::{LiveColumn, LiveIndex};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::schema::{Field, FieldType, Index as DeclaredIndex, KeyType, Structure, Table};

/// A discrepancy's ordered severity. `Ord` follows §3's total order:
/// `safe < dbindex < risky < unsafe < unfixable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Safety {
    Safe,
    DbIndex,
    Risky,
    Unsafe,
    Unfixable,
}

/// The kind of discrepancy an `ErrorRecord` describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    MissingTables,
    ExtraTables,
    MissingColumns,
    ExtraColumns,
    ChangedColumns,
    MissingIndexes,
    ExtraIndexes,
}

/// Which aspect of a column changed, for `ChangedColumns` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Issue {
    Type,
    Null,
    Length,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Info,
    Warning,
    Error,
}

/// A data transformation the fixer must run before a schema change is
/// applied, attached to a `ChangedColumns` record by the risk evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FixTag {
    NullDefault,
    Truncate,
}

/// One discrepancy between the declared schema and the live database.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub table: String,
    pub error_type: ErrorType,
    pub issue: Option<Issue>,
    pub field: Option<String>,
    pub dbfield: Option<String>,
    pub index: Option<String>,
    pub desc: String,
    pub status: Status,
    pub safety: Safety,
    pub fixes: HashSet<FixTag>,
}

impl ErrorRecord {
    fn new(table: &str, error_type: ErrorType, safety: Safety, status: Status, desc: String) -> Self {
        Self {
            table: table.to_string(),
            error_type,
            issue: None,
            field: None,
            dbfield: None,
            index: None,
            desc,
            status,
            safety,
            fixes: HashSet::new(),
        }
    }

    fn with_issue(mut self, issue: Issue) -> Self {
        self.issue = Some(issue);
        self
    }

    fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    fn with_index(mut self, index: &str) -> Self {
        self.index = Some(index.to_string());
        self
    }
}

/// Which classes of discrepancy to look for (§4.E). All default to `true`.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub missing_tables: bool,
    pub extra_tables: bool,
    pub missing_columns: bool,
    pub extra_columns: bool,
    pub changed_columns: bool,
    pub missing_indexes: bool,
    pub extra_indexes: bool,
    pub limit: Option<HashSet<String>>,
    pub exclude: Option<HashSet<String>>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            missing_tables: true,
            extra_tables: true,
            missing_columns: true,
            extra_columns: true,
            changed_columns: true,
            missing_indexes: true,
            extra_indexes: true,
            limit: None,
            exclude: None,
        }
    }
}

/// A table this crate never reports extra indexes for (§4.E.e): a known
/// legacy leftover from full-text search support in the source system.
const EXEMPT_EXTRA_INDEX_TABLE: &str = "search_simpledb_index";

/// Compare `structure` (already filtered by `get_schema` if the caller
/// wants table selection) against the live database, returning every
/// discrepancy grouped by table in discovery order.
///
/// # Errors
///
/// Returns an error only if a read against the live database fails; the
/// discrepancies themselves are never surfaced as `Err`.
pub fn diff_schema(
    structure: &Structure,
    dispatcher: &Dispatcher,
    options: &DiffOptions,
) -> Result<IndexMap<String, Vec<ErrorRecord>>> {
    let structure = structure.get_schema(options.limit.as_ref(), options.exclude.as_ref());
    let mut results: IndexMap<String, Vec<ErrorRecord>> = IndexMap::new();
    let mut db_tables: HashSet<String> = dispatcher.adapter().get_tables()?;

    for table in structure.tables() {
        let entry = results.entry(table.name.clone()).or_default();

        if !db_tables.contains(&table.name) {
            if options.missing_tables {
                entry.push(ErrorRecord::new(
                    &table.name,
                    ErrorType::MissingTables,
                    Safety::Safe,
                    Status::Error,
                    format!("table `{}` is missing", table.name),
                ));
            }
            continue;
        }

        let mut db_fields = dispatcher.adapter().get_columns(&table.name)?;
        let mut db_indexes = dispatcher.adapter().get_indexes(&table.name, true)?;

        if options.missing_columns || options.changed_columns {
            for field in table.fields() {
                match db_fields.shift_remove(&field.name) {
                    None => {
                        if options.missing_columns {
                            entry.push(missing_column_record(dispatcher, table, field)?);
                        }
                    }
                    Some(live) => {
                        if options.changed_columns {
                            entry.extend(changed_column_records(dispatcher, table, field, &live));
                        }
                    }
                }
            }
        }

        if options.missing_indexes {
            for key in table.keys().iter().filter(|k| k.key_type != KeyType::Primary) {
                let synthetic = DeclaredIndex {
                    name: key.name.clone(),
                    unique: key.key_type.implies_unique_index(),
                    columns: key.fields.clone(),
                };
                missing_index_pass(dispatcher, table, &synthetic, &mut db_indexes, entry)?;
            }
            for index in table.indexes() {
                missing_index_pass(dispatcher, table, index, &mut db_indexes, entry)?;
            }
        }

        if options.extra_indexes && table.name != EXEMPT_EXTRA_INDEX_TABLE {
            for (name, _) in &db_indexes {
                entry.push(
                    ErrorRecord::new(
                        &table.name,
                        ErrorType::ExtraIndexes,
                        Safety::DbIndex,
                        Status::Info,
                        format!("index `{name}` is not declared"),
                    )
                    .with_index(name),
                );
            }
        }

        if options.extra_columns {
            for (name, _) in &db_fields {
                entry.push(
                    ErrorRecord::new(
                        &table.name,
                        ErrorType::ExtraColumns,
                        Safety::Unsafe,
                        Status::Info,
                        format!("column `{name}` is not declared"),
                    )
                    .with_field(name),
                );
            }
        }

        db_tables.remove(&table.name);
    }

    if options.extra_tables && !dispatcher.generator().prefix().is_empty() {
        for name in &db_tables {
            if name.starts_with("pma_") {
                continue;
            }
            if options.limit.as_ref().is_some_and(|l| !l.contains(name)) {
                continue;
            }
            if options.exclude.as_ref().is_some_and(|e| e.contains(name)) {
                continue;
            }
            let safety = if name.starts_with("test") {
                Safety::Safe
            } else {
                Safety::Unsafe
            };
            results.entry(name.clone()).or_default().push(ErrorRecord::new(
                name,
                ErrorType::ExtraTables,
                safety,
                Status::Warning,
                format!("table `{name}` is not declared"),
            ));
        }
    }

    Ok(results)
}

fn missing_column_record(dispatcher: &Dispatcher, table: &Table, field: &Field) -> Result<ErrorRecord> {
    let table_empty = dispatcher.adapter().count_rows(&table.name)? == 0;
    let safety = if field.has_effective_default() || table_empty {
        Safety::Safe
    } else {
        Safety::Unfixable
    };
    Ok(ErrorRecord::new(
        &table.name,
        ErrorType::MissingColumns,
        safety,
        Status::Error,
        format!("column `{}.{}` is missing", table.name, field.name),
    )
    .with_field(&field.name))
}

fn changed_column_records(
    dispatcher: &Dispatcher,
    table: &Table,
    field: &Field,
    live: &LiveColumn,
) -> Vec<ErrorRecord> {
    let mut records = Vec::new();
    let generator = dispatcher.generator();
    let declared_type = field.normalized_type();
    let live_type = live.meta_type.normalized();

    if declared_type != live_type {
        let safety = if declared_type == FieldType::Text {
            Safety::Safe
        } else {
            Safety::Risky
        };
        let mut desc = format!(
            "column `{}.{}` type {:?} does not match declared {:?}",
            table.name, field.name, live_type, declared_type
        );
        if let Some(code) = declared_type.meta_char() {
            desc.push_str(&format!(" (expected `{code}`)"));
        }
        records.push(
            ErrorRecord::new(&table.name, ErrorType::ChangedColumns, safety, Status::Warning, desc)
                .with_issue(Issue::Type)
                .with_field(&field.name),
        );
    }

    if matches!(declared_type, FieldType::Timestamp | FieldType::Datetime) {
        records.push(
            ErrorRecord::new(
                &table.name,
                ErrorType::ChangedColumns,
                Safety::Risky,
                Status::Warning,
                format!("column `{}.{}`: type not supported", table.name, field.name),
            )
            .with_issue(Issue::Type)
            .with_field(&field.name),
        );
    }

    if field.notnull != live.not_null {
        let tightening = !live.not_null && field.notnull;
        let safety = if tightening { Safety::Risky } else { Safety::Safe };
        records.push(
            ErrorRecord::new(
                &table.name,
                ErrorType::ChangedColumns,
                safety,
                Status::Warning,
                format!(
                    "column `{}.{}` nullability does not match (declared notnull={})",
                    table.name, field.name, field.notnull
                ),
            )
            .with_issue(Issue::Null)
            .with_field(&field.name),
        );
    }

    if declared_type == live_type {
        if let Some(record) = length_mismatch_record(table, field, live, declared_type) {
            records.push(record);
        }
    }

    if let Some((declared_repr, db_repr)) = default_mismatch(field, live, generator.as_ref()) {
        records.push(
            ErrorRecord::new(
                &table.name,
                ErrorType::ChangedColumns,
                Safety::Safe,
                Status::Info,
                format!(
                    "column `{}.{}` default `{db_repr}` does not match declared `{declared_repr}`",
                    table.name, field.name
                ),
            )
            .with_issue(Issue::Default)
            .with_field(&field.name),
        );
    }

    records
}

fn length_mismatch_record(
    table: &Table,
    field: &Field,
    live: &LiveColumn,
    declared_type: FieldType,
) -> Option<ErrorRecord> {
    // FLOAT never gets a length/precision diff, even though it normalizes to
    // Number for type-change purposes; this must check the declared type,
    // not `declared_type` (already normalized by the caller).
    if field.field_type == FieldType::Float {
        return None;
    }
    let safety = match declared_type {
        FieldType::Number => {
            if field.decimals < live.scale {
                Safety::Unsafe
            } else if field.length < live.max_length || field.decimals > live.scale {
                Safety::Risky
            } else {
                return None;
            }
        }
        FieldType::Char => {
            if field.length == live.max_length {
                return None;
            }
            if field.length > live.max_length {
                Safety::Safe
            } else {
                Safety::Risky
            }
        }
        FieldType::Integer => {
            if field.clamped_length() > live.max_length {
                Safety::Safe
            } else {
                return None;
            }
        }
        FieldType::Text | FieldType::Binary | FieldType::Timestamp | FieldType::Datetime | FieldType::Float => {
            return None;
        }
    };
    Some(
        ErrorRecord::new(
            &table.name,
            ErrorType::ChangedColumns,
            safety,
            Status::Warning,
            format!(
                "column `{}.{}` length/precision ({},{}) does not match declared ({},{})",
                table.name, field.name, live.max_length, live.scale, field.length, field.decimals
            ),
        )
        .with_issue(Issue::Length)
        .with_field(&field.name),
    )
}

fn default_mismatch(
    field: &Field,
    live: &LiveColumn,
    generator: &dyn crate::generator::SqlGenerator,
) -> Option<(String, String)> {
    let declared = generator.formatted_default(field);
    let db_default = if live.has_default { live.default_value.clone() } else { None };

    let equal = if field.normalized_type() == FieldType::Number {
        match (declared.as_deref().and_then(|s| s.parse::<f64>().ok()), db_default.as_deref().and_then(|s| s.parse::<f64>().ok())) {
            (Some(d), Some(b)) => (d - b).abs() < f64::EPSILON,
            (None, None) => declared == db_default,
            _ => false,
        }
    } else {
        declared == db_default
    };

    if equal {
        None
    } else {
        Some((
            declared.unwrap_or_else(|| "NULL".to_string()),
            db_default.unwrap_or_else(|| "NULL".to_string()),
        ))
    }
}

fn missing_index_pass(
    dispatcher: &Dispatcher,
    table: &Table,
    index: &DeclaredIndex,
    db_indexes: &mut IndexMap<String, LiveIndex>,
    entry: &mut Vec<ErrorRecord>,
) -> Result<()> {
    if dispatcher.index_exists(&table.name, &index.columns)? {
        let matching_name = db_indexes
            .iter()
            .find(|(_, live)| live.columns == index.columns)
            .map(|(name, _)| name.clone());
        if let Some(name) = matching_name {
            db_indexes.shift_remove(&name);
        }
        return Ok(());
    }

    let add_sql = dispatcher.generator().add_index_sql(&table.name, index);
    let ended = dispatcher
        .generator()
        .ended_statements(std::slice::from_ref(&add_sql))
        .pop()
        .unwrap_or(add_sql);
    entry.push(
        ErrorRecord::new(
            &table.name,
            ErrorType::MissingIndexes,
            Safety::Safe,
            Status::Error,
            format!("index `{}` is missing: {ended}", index.name),
        )
        .with_index(&index.name),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SqliteAdapter;
    use crate::generator::SqliteGenerator;
    use crate::schema::builder::{field, index, not_null_field, primary_key, unique_key};
    use crate::schema::builder::{StructureBuilder, TableBuilder};
    use crate::schema::DefaultValue;
    use std::sync::Arc;

    fn dispatcher_with(ddl: &[&str]) -> Dispatcher {
        let adapter = Arc::new(SqliteAdapter::open_memory().unwrap());
        let generator = Arc::new(SqliteGenerator);
        for stmt in ddl {
            adapter.execute_ddl(&[(*stmt).to_string()], &[]).unwrap();
        }
        Dispatcher::new(adapter, generator)
    }

    #[test]
    fn matching_schema_has_no_errors() {
        let dispatcher = dispatcher_with(&[
            "CREATE TABLE users (id INTEGER(11) NOT NULL, email CHAR(100) NOT NULL DEFAULT '')",
        ]);
        let structure = StructureBuilder::new("1")
            .table(
                TableBuilder::new("users")
                    .field(not_null_field("id", FieldType::Integer, 11))
                    .field(crate::schema::builder::field_with_default(
                        "email",
                        FieldType::Char,
                        100,
                        DefaultValue::Str(String::new()),
                    ))
                    .build(),
            )
            .build();

        let errors = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        let users = errors.get("users").cloned().unwrap_or_default();
        assert!(
            users.iter().all(|e| e.issue.is_none() || e.issue != Some(Issue::Default) || e.safety == Safety::Safe),
        );
        assert!(!users.iter().any(|e| e.error_type == ErrorType::MissingColumns));
    }

    #[test]
    fn missing_table_is_reported_as_safe() {
        let dispatcher = dispatcher_with(&[]);
        let structure = StructureBuilder::new("1")
            .table(
                TableBuilder::new("users")
                    .field(not_null_field("id", FieldType::Integer, 11))
                    .field(not_null_field("email", FieldType::Char, 100))
                    .key(primary_key(vec!["id".to_string()]))
                    .build(),
            )
            .build();

        let errors = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        let users = &errors["users"];
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].error_type, ErrorType::MissingTables);
        assert_eq!(users[0].safety, Safety::Safe);
    }

    #[test]
    fn narrowing_char_is_risky() {
        let dispatcher = dispatcher_with(&["CREATE TABLE notes (body CHAR(200))"]);
        let structure = StructureBuilder::new("1")
            .table(
                TableBuilder::new("notes")
                    .field(field("body", FieldType::Char, 100))
                    .build(),
            )
            .build();

        let errors = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        let notes = &errors["notes"];
        let length_error = notes.iter().find(|e| e.issue == Some(Issue::Length)).unwrap();
        assert_eq!(length_error.safety, Safety::Risky);
    }

    #[test]
    fn narrowing_float_never_reports_length_mismatch() {
        let dispatcher = dispatcher_with(&["CREATE TABLE metrics (value NUMERIC(10,2))"]);
        let structure = StructureBuilder::new("1")
            .table(
                TableBuilder::new("metrics")
                    .field(Field {
                        decimals: 2,
                        ..field("value", FieldType::Float, 8)
                    })
                    .build(),
            )
            .build();

        let errors = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        let metrics = errors.get("metrics").cloned().unwrap_or_default();
        assert!(!metrics.iter().any(|e| e.issue == Some(Issue::Length)));
    }

    #[test]
    fn missing_index_reports_add_index_sql() {
        let dispatcher = dispatcher_with(&["CREATE TABLE notes (id INTEGER(11), slug CHAR(40))"]);
        let structure = StructureBuilder::new("1")
            .table(
                TableBuilder::new("notes")
                    .field(not_null_field("id", FieldType::Integer, 11))
                    .field(field("slug", FieldType::Char, 40))
                    .index(index("idx_slug", true, vec!["slug".to_string()]))
                    .build(),
            )
            .build();

        let errors = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        let notes = &errors["notes"];
        assert!(notes
            .iter()
            .any(|e| e.error_type == ErrorType::MissingIndexes && e.safety == Safety::Safe));
        let _ = unique_key;
    }
}
