//! Escalates `Risky` `ChangedColumns` groups to `Safe`, `Unsafe`, or
//! `Unfixable` by probing the live data (§4.F).
//!
//! Every `ChangedColumns` record for the same `(table, field)` pair is
//! logically one decision — `evaluate_risky` groups them, decides once, and
//! writes the same `safety`/`fixes` back onto every record in the group.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::adapter::DatabaseAdapter;
use crate::diff::{ErrorRecord, ErrorType, FixTag, Issue, Safety};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::schema::{Field, FieldType, Structure};

/// Re-evaluate every `Risky` `ChangedColumns` group in `errors` in place.
///
/// # Errors
///
/// Returns an error if a probing query against the live database fails.
pub fn evaluate_risky(
    errors: &mut IndexMap<String, Vec<ErrorRecord>>,
    structure: &Structure,
    dispatcher: &Dispatcher,
) -> Result<()> {
    let adapter = dispatcher.adapter().as_ref();

    for (table_name, records) in errors.iter_mut() {
        let Some(table) = structure.table(table_name) else {
            continue;
        };

        let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (idx, record) in records.iter().enumerate() {
            if record.error_type == ErrorType::ChangedColumns {
                if let Some(field_name) = &record.field {
                    groups.entry(field_name.clone()).or_default().push(idx);
                }
            }
        }

        for (field_name, indices) in groups {
            let group_safety = indices
                .iter()
                .map(|&i| records[i].safety)
                .max()
                .unwrap_or(Safety::Safe);
            if group_safety != Safety::Risky {
                continue;
            }
            let Some(field) = table.field(&field_name) else {
                continue;
            };
            let issues: HashSet<Issue> = indices.iter().filter_map(|&i| records[i].issue).collect();

            let (safety, fixes) = evaluate_group(table_name, field, &issues, adapter)?;
            for &i in &indices {
                records[i].safety = safety;
                records[i].fixes.clone_from(&fixes);
            }
        }
    }

    Ok(())
}

fn evaluate_group(
    table: &str,
    field: &Field,
    issues: &HashSet<Issue>,
    adapter: &dyn DatabaseAdapter,
) -> Result<(Safety, HashSet<FixTag>)> {
    let quoted = quote_ident(&field.name);
    let mut safety = Safety::Safe;
    let mut fixes = HashSet::new();

    if issues.contains(&Issue::Null)
        && field.notnull
        && adapter.exists_where(table, &format!("{quoted} IS NULL"), &[])?
    {
        safety = Safety::Unsafe;
        fixes.insert(FixTag::NullDefault);
    }

    let target = field.normalized_type();

    if issues.contains(&Issue::Type) && !matches!(target, FieldType::Text | FieldType::Char) {
        let invalid = match target {
            FieldType::Integer => any_value_fails(adapter, table, &field.name, |v| v.parse::<i64>().is_err())?,
            FieldType::Number => any_value_fails(adapter, table, &field.name, |v| v.parse::<f64>().is_err())?,
            _ => true,
        };
        if invalid {
            return Ok((Safety::Unfixable, fixes));
        }
    }

    match target {
        FieldType::Text | FieldType::Integer => {}
        FieldType::Char => {
            if adapter.exists_where(table, &format!("length({quoted}) > {}", field.length), &[])? {
                safety = safety.max(Safety::Unsafe);
                fixes.insert(FixTag::Truncate);
            }
        }
        FieldType::Number => {
            let live_scale = adapter.get_columns(table)?.get(&field.name).map_or(0, |c| c.scale);
            if field.decimals < live_scale {
                safety = safety.max(Safety::Unsafe);
            }

            let mut unfixable = false;
            let mut precision_loss = false;
            adapter.iterate(table, std::slice::from_ref(&field.name), &mut |row| {
                if let Some(Some(raw)) = row.first() {
                    let trimmed = raw.strip_prefix('-').unwrap_or(raw);
                    let mut parts = trimmed.splitn(2, '.');
                    let intpart = parts.next().unwrap_or("");
                    let fracpart = parts.next().unwrap_or("");
                    let intdigits = i64::try_from(intpart.len()).unwrap_or(i64::MAX);
                    let decdigits = i64::try_from(fracpart.len()).unwrap_or(0);
                    if intdigits > field.length - field.decimals {
                        unfixable = true;
                    } else if decdigits > field.decimals {
                        precision_loss = true;
                    }
                }
                Ok(())
            })?;

            if unfixable {
                return Ok((Safety::Unfixable, fixes));
            }
            if precision_loss {
                safety = safety.max(Safety::Unsafe);
            }
        }
        FieldType::Binary | FieldType::Timestamp | FieldType::Datetime | FieldType::Float => {
            safety = Safety::Unfixable;
        }
    }

    Ok((safety, fixes))
}

fn any_value_fails(
    adapter: &dyn DatabaseAdapter,
    table: &str,
    column: &str,
    mut predicate: impl FnMut(&str) -> bool,
) -> Result<bool> {
    let mut failed = false;
    adapter.iterate(table, std::slice::from_ref(&column.to_string()), &mut |row| {
        if let Some(Some(value)) = row.first() {
            if predicate(value) {
                failed = true;
            }
        }
        Ok(())
    })?;
    Ok(failed)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
