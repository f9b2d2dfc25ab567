//! Orchestrates the seven ordered repair passes (§4.G).
//!
//! Every pass re-tests existence before acting, so a fixer run can always
//! be safely repeated after a partial failure. `align_column_definitions`
//! is the only pass that touches data as well as schema: it drops every
//! index referencing a column being changed, applies the alignment, then
//! restores those indexes — logging and continuing if the restore itself
//! fails (§5, "scoped region").

use std::collections::HashSet;

use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, instrument};

use crate::diff::{ErrorRecord, ErrorType, FixTag, Safety};
use crate::dispatch::Dispatcher;
use crate::error::{Result, SchemaAlignError};
use crate::risk::evaluate_risky;
use crate::schema::{Field, Index, Key, KeyType, Structure, Table};

/// Apply every error in `errors` whose `(type, safety)` is selected by
/// `levels`, in the fixed pass order of §4.G. Returns the number of
/// changes applied.
///
/// # Errors
///
/// Surfaces any error a pass does not itself catch and recover from (only
/// `align_column_definitions`'s `ddl_change_structure` is caught locally).
#[instrument(skip(errors, structure, dispatcher))]
pub fn fix(
    errors: &mut IndexMap<String, Vec<ErrorRecord>>,
    structure: &Structure,
    dispatcher: &Dispatcher,
    levels: &HashSet<Safety>,
) -> Result<usize> {
    dispatcher.adapter().reset_caches();
    let mut applied = 0;

    applied += add_missing_tables(errors, structure, dispatcher, levels)?;
    applied += add_missing_fields(errors, structure, dispatcher, levels)?;
    applied += align_column_definitions(errors, structure, dispatcher, levels)?;
    applied += add_missing_indexes(errors, structure, dispatcher, levels)?;
    applied += drop_extra_indexes(errors, dispatcher, levels)?;
    applied += drop_extra_fields(errors, dispatcher, levels)?;
    applied += drop_extra_tables(errors, dispatcher, levels)?;

    Ok(applied)
}

fn selected<'a>(
    errors: &'a IndexMap<String, Vec<ErrorRecord>>,
    error_type: ErrorType,
    levels: &'a HashSet<Safety>,
) -> impl Iterator<Item = &'a ErrorRecord> + 'a {
    errors
        .values()
        .flatten()
        .filter(move |e| e.error_type == error_type && levels.contains(&e.safety))
}

fn add_missing_tables(
    errors: &IndexMap<String, Vec<ErrorRecord>>,
    structure: &Structure,
    dispatcher: &Dispatcher,
    levels: &HashSet<Safety>,
) -> Result<usize> {
    let mut applied = 0;
    for error in selected(errors, ErrorType::MissingTables, levels) {
        if dispatcher.adapter().get_tables()?.contains(&error.table) {
            continue;
        }
        let Some(table) = structure.table(&error.table) else {
            continue;
        };
        dispatcher.create_table(&table.name, table.fields(), table.keys())?;
        applied += 1;
    }
    Ok(applied)
}

fn add_missing_fields(
    errors: &IndexMap<String, Vec<ErrorRecord>>,
    structure: &Structure,
    dispatcher: &Dispatcher,
    levels: &HashSet<Safety>,
) -> Result<usize> {
    let mut applied = 0;
    for error in selected(errors, ErrorType::MissingColumns, levels) {
        let Some(field_name) = &error.field else { continue };
        if dispatcher.adapter().get_columns(&error.table)?.contains_key(field_name) {
            continue;
        }
        let Some(field) = structure.table(&error.table).and_then(|t| t.field(field_name)) else {
            continue;
        };
        dispatcher.add_field(&error.table, field)?;
        applied += 1;
    }
    Ok(applied)
}

fn align_column_definitions(
    errors: &mut IndexMap<String, Vec<ErrorRecord>>,
    structure: &Structure,
    dispatcher: &Dispatcher,
    levels: &HashSet<Safety>,
) -> Result<usize> {
    if levels.contains(&Safety::Risky) {
        evaluate_risky(errors, structure, dispatcher)?;
    }

    let mut applied = 0;
    // (table, field) -> number of distinct issues, used as the increment.
    let mut groups: IndexMap<(String, String), usize> = IndexMap::new();
    for error in errors
        .values()
        .flatten()
        .filter(|e| e.error_type == ErrorType::ChangedColumns && levels.contains(&e.safety))
    {
        let Some(field) = &error.field else { continue };
        *groups.entry((error.table.clone(), field.clone())).or_insert(0) += 1;
    }

    for ((table_name, field_name), issue_count) in groups {
        let Some(declared_field) = structure.table(&table_name).and_then(|t| t.field(&field_name)) else {
            continue;
        };

        let fixes = errors
            .get(&table_name)
            .into_iter()
            .flatten()
            .filter(|e| {
                e.error_type == ErrorType::ChangedColumns
                    && e.field.as_deref() == Some(field_name.as_str())
            })
            .flat_map(|e| e.fixes.iter().copied())
            .collect::<HashSet<_>>();

        apply_data_fixes(&table_name, declared_field, &fixes, dispatcher)?;

        let dropped = drop_referencing_indexes(&table_name, &field_name, dispatcher)?;

        let result = dispatcher
            .change_field_type(&table_name, &field_name, declared_field)
            .and_then(|()| dispatcher.change_field_default(&table_name, &declared_field.name, declared_field));

        for index in &dropped {
            if let Err(err) = dispatcher.add_index(&table_name, index) {
                error!(table = %table_name, index = %index.name, error = %err, "failed to restore index after column alignment");
            }
        }

        match result {
            Ok(()) => applied += issue_count,
            Err(SchemaAlignError::ChangeStructure { table, detail }) => {
                error!(table = %table, detail = %detail, "column alignment failed, continuing with next column");
            }
            Err(other) => return Err(other),
        }
    }

    Ok(applied)
}

fn apply_data_fixes(
    table: &str,
    field: &Field,
    fixes: &HashSet<FixTag>,
    dispatcher: &Dispatcher,
) -> Result<()> {
    let quoted = quote_ident(&field.name);
    if fixes.contains(&FixTag::NullDefault) {
        let replacement = dispatcher
            .generator()
            .formatted_default(field)
            .unwrap_or_default();
        dispatcher.adapter().set_where(
            table,
            &field.name,
            &replacement,
            &format!("{quoted} IS NULL"),
            &[],
        )?;
    }
    if fixes.contains(&FixTag::Truncate) {
        let target_length = usize::try_from(field.length).unwrap_or(0);
        let mut overflowing = Vec::new();
        dispatcher.adapter().iterate(table, std::slice::from_ref(&field.name), &mut |row| {
            if let Some(Some(value)) = row.first() {
                if value.chars().count() > target_length {
                    overflowing.push(value.clone());
                }
            }
            Ok(())
        })?;
        let progress = progress_bar(overflowing.len(), &format!("truncating {table}.{}", field.name));
        for value in overflowing {
            let truncated: String = value.chars().take(target_length).collect();
            dispatcher.adapter().set_where(
                table,
                &field.name,
                &truncated,
                &format!("{quoted} = ?"),
                &[value.as_str()],
            )?;
            progress.inc(1);
        }
        progress.finish_and_clear();
    }
    Ok(())
}

fn drop_referencing_indexes(table: &str, field: &str, dispatcher: &Dispatcher) -> Result<Vec<Index>> {
    let live_indexes = dispatcher.adapter().get_indexes(table, false)?;
    let mut dropped = Vec::new();
    for (name, live) in &live_indexes {
        if live.columns.iter().any(|c| c == field) {
            dispatcher.drop_index(table, name)?;
            dropped.push(Index {
                name: name.clone(),
                unique: live.unique,
                columns: live.columns.clone(),
            });
        }
    }
    Ok(dropped)
}

fn add_missing_indexes(
    errors: &IndexMap<String, Vec<ErrorRecord>>,
    structure: &Structure,
    dispatcher: &Dispatcher,
    levels: &HashSet<Safety>,
) -> Result<usize> {
    let mut applied = 0;
    for error in selected(errors, ErrorType::MissingIndexes, levels) {
        let Some(index_name) = &error.index else { continue };
        let Some(table) = structure.table(&error.table) else { continue };
        let Some(index) = resolve_declared_index(table, index_name) else {
            continue;
        };
        let live_columns = dispatcher.adapter().get_columns(&error.table)?;
        if index.columns.iter().any(|c| !live_columns.contains_key(c)) {
            continue;
        }
        if dispatcher.index_exists(&error.table, &index.columns)? {
            continue;
        }
        dispatcher.add_index(&error.table, &index)?;
        applied += 1;
    }
    Ok(applied)
}

fn resolve_declared_index(table: &Table, name: &str) -> Option<Index> {
    if let Some(index) = table.indexes().iter().find(|i| i.name == name) {
        return Some(index.clone());
    }
    table
        .keys()
        .iter()
        .find(|k| k.name == name && k.key_type != KeyType::Primary)
        .map(key_as_index)
}

fn key_as_index(key: &Key) -> Index {
    Index {
        name: key.name.clone(),
        unique: key.key_type.implies_unique_index(),
        columns: key.fields.clone(),
    }
}

fn drop_extra_indexes(
    errors: &IndexMap<String, Vec<ErrorRecord>>,
    dispatcher: &Dispatcher,
    levels: &HashSet<Safety>,
) -> Result<usize> {
    let mut applied = 0;
    for error in selected(errors, ErrorType::ExtraIndexes, levels) {
        let Some(index_name) = &error.index else { continue };
        if !dispatcher.adapter().get_indexes(&error.table, true)?.contains_key(index_name) {
            continue;
        }
        dispatcher.drop_index(&error.table, index_name)?;
        applied += 1;
    }
    Ok(applied)
}

fn drop_extra_fields(
    errors: &IndexMap<String, Vec<ErrorRecord>>,
    dispatcher: &Dispatcher,
    levels: &HashSet<Safety>,
) -> Result<usize> {
    let mut applied = 0;
    for error in selected(errors, ErrorType::ExtraColumns, levels) {
        let Some(field_name) = &error.field else { continue };
        if !dispatcher.adapter().get_columns(&error.table)?.contains_key(field_name) {
            continue;
        }
        drop_referencing_indexes(&error.table, field_name, dispatcher)?;
        dispatcher.drop_field(&error.table, field_name)?;
        applied += 1;
    }
    Ok(applied)
}

fn drop_extra_tables(
    errors: &IndexMap<String, Vec<ErrorRecord>>,
    dispatcher: &Dispatcher,
    levels: &HashSet<Safety>,
) -> Result<usize> {
    let mut applied = 0;
    for error in selected(errors, ErrorType::ExtraTables, levels) {
        if !dispatcher.adapter().get_tables()?.contains(&error.table) {
            continue;
        }
        dispatcher.drop_table(&error.table)?;
        applied += 1;
    }
    Ok(applied)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A row-count progress bar for a long-running data fix, written to stderr
/// so it never contaminates the §6 stdout report. Hidden entirely when
/// there is nothing to do.
fn progress_bar(len: usize, message: &str) -> ProgressBar {
    if len == 0 {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message.to_string());
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SqliteAdapter;
    use crate::diff::{diff_schema, DiffOptions};
    use crate::generator::SqliteGenerator;
    use crate::schema::builder::{not_null_field, primary_key, StructureBuilder, TableBuilder};
    use crate::schema::FieldType;
    use std::sync::Arc;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(SqliteAdapter::open_memory().unwrap()), Arc::new(SqliteGenerator))
    }

    #[test]
    fn fixes_a_missing_table() {
        let dispatcher = dispatcher();
        let structure = StructureBuilder::new("1")
            .table(
                TableBuilder::new("users")
                    .field(not_null_field("id", FieldType::Integer, 11))
                    .field(not_null_field("email", FieldType::Char, 100))
                    .key(primary_key(vec!["id".to_string()]))
                    .build(),
            )
            .build();

        let levels: HashSet<Safety> = [Safety::Safe].into_iter().collect();

        let mut errors = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        let applied = fix(&mut errors, &structure, &dispatcher, &levels).unwrap();
        assert_eq!(applied, 1);

        let errors_after = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        assert!(errors_after.values().all(Vec::is_empty));
    }

    #[test]
    fn fix_is_idempotent() {
        let dispatcher = dispatcher();
        let structure = StructureBuilder::new("1")
            .table(
                TableBuilder::new("users")
                    .field(not_null_field("id", FieldType::Integer, 11))
                    .build(),
            )
            .build();
        let levels: HashSet<Safety> = [Safety::Safe, Safety::DbIndex, Safety::Unsafe].into_iter().collect();

        let mut errors = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        fix(&mut errors, &structure, &dispatcher, &levels).unwrap();

        let mut errors_again = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        let second_run = fix(&mut errors_again, &structure, &dispatcher, &levels).unwrap();
        assert_eq!(second_run, 0);
    }
}
