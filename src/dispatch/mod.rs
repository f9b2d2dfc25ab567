//! Safe wrappers around the adapter and generator: existence checks,
//! dependency checks, and a small sum-typed error surface (§4.D).
//!
//! Every operation here re-checks the live database before acting — the
//! fixer relies on that idempotency to be safely re-runnable after a
//! partial failure (§4.G).

use std::sync::Arc;

use tracing::instrument;

use crate::adapter::DatabaseAdapter;
use crate::error::{Result, SchemaAlignError};
use crate::generator::{KeySuffix, SqlGenerator};
use crate::schema::{Field, Index, Key, KeyType};

/// Bundles a database adapter and SQL generator behind the
/// existence-and-dependency-checked operations the diff engine and fixer
/// call through. Neither collaborator is dialect-aware above this point.
pub struct Dispatcher {
    adapter: Arc<dyn DatabaseAdapter>,
    generator: Arc<dyn SqlGenerator>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(adapter: Arc<dyn DatabaseAdapter>, generator: Arc<dyn SqlGenerator>) -> Self {
        Self { adapter, generator }
    }

    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.adapter
    }

    #[must_use]
    pub fn generator(&self) -> &Arc<dyn SqlGenerator> {
        &self.generator
    }

    fn require_table(&self, table: &str) -> Result<()> {
        if self.adapter.get_tables()?.contains(table) {
            Ok(())
        } else {
            Err(SchemaAlignError::TableMissing {
                table: table.to_string(),
            })
        }
    }

    fn require_field(&self, table: &str, field: &str) -> Result<()> {
        self.require_table(table)?;
        if self.adapter.get_columns(table)?.contains_key(field) {
            Ok(())
        } else {
            Err(SchemaAlignError::FieldMissing {
                table: table.to_string(),
                field: field.to_string(),
            })
        }
    }

    /// Fails `ddl_dependency` if `field` participates in any index on
    /// `table`; the caller (the fixer) is responsible for dropping such
    /// indexes first (§4.D).
    fn require_no_index_dependency(&self, table: &str, field: &str) -> Result<()> {
        let indexes = self.adapter.get_indexes(table, true)?;
        if let Some((name, _)) = indexes
            .iter()
            .find(|(_, idx)| idx.columns.iter().any(|c| c == field))
        {
            return Err(SchemaAlignError::Dependency {
                table: table.to_string(),
                field: field.to_string(),
                index: name.clone(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, field), fields(table, field = %field.name))]
    pub fn add_field(&self, table: &str, field: &Field) -> Result<()> {
        self.require_table(table)?;
        if self.adapter.get_columns(table)?.contains_key(&field.name) {
            return Err(SchemaAlignError::FieldAlreadyExists {
                table: table.to_string(),
                field: field.name.clone(),
            });
        }
        if field.notnull && field.default.is_none() && self.adapter.count_rows(table)? > 0 {
            return Err(SchemaAlignError::DdlUnknown {
                operation: "add_field".to_string(),
                detail: format!(
                    "`{table}.{}` is NOT NULL with no default on a non-empty table",
                    field.name
                ),
            });
        }
        let statements = self.generator.add_field_sql(table, field);
        self.adapter.execute_ddl(&statements, &[table.to_string()])
    }

    #[instrument(skip(self))]
    pub fn drop_field(&self, table: &str, field: &str) -> Result<()> {
        self.require_field(table, field)?;
        self.require_no_index_dependency(table, field)?;
        let columns = self.adapter.get_columns(table)?;
        let primary_key = self.adapter.primary_key_columns(table)?;
        let statements = self.generator.drop_field_sql(table, &columns, field, &primary_key);
        self.adapter.execute_ddl(&statements, &[table.to_string()])
    }

    /// The single code path every `change_field_*` wrapper delegates to:
    /// type, precision, nullability and default changes all funnel through
    /// one ALTER sequence (§9, "deprecated wrappers").
    #[instrument(skip(self, new_field), fields(table, old_name))]
    pub fn change_field_type(&self, table: &str, old_name: &str, new_field: &Field) -> Result<()> {
        self.require_field(table, old_name)?;
        self.require_no_index_dependency(table, old_name)?;
        let columns = self.adapter.get_columns(table)?;
        let primary_key = self.adapter.primary_key_columns(table)?;
        let statements = self
            .generator
            .alter_field_sql(table, &columns, old_name, new_field, &primary_key);
        self.adapter.execute_ddl(&statements, &[table.to_string()])
    }

    pub fn change_field_precision(&self, table: &str, old_name: &str, new_field: &Field) -> Result<()> {
        self.change_field_type(table, old_name, new_field)
    }

    pub fn change_field_notnull(&self, table: &str, old_name: &str, new_field: &Field) -> Result<()> {
        self.change_field_type(table, old_name, new_field)
    }

    pub fn change_field_default(&self, table: &str, old_name: &str, new_field: &Field) -> Result<()> {
        self.change_field_type(table, old_name, new_field)
    }

    #[instrument(skip(self, new_field), fields(table, old_name))]
    pub fn rename_field(&self, table: &str, old_name: &str, new_field: &Field) -> Result<()> {
        if old_name == "id" {
            return Err(SchemaAlignError::DdlUnknown {
                operation: "rename_field".to_string(),
                detail: "renaming `id` is rejected".to_string(),
            });
        }
        self.require_field(table, old_name)?;
        self.require_no_index_dependency(table, old_name)?;
        let columns = self.adapter.get_columns(table)?;
        let primary_key = self.adapter.primary_key_columns(table)?;
        let statements = self
            .generator
            .rename_field_sql(table, &columns, old_name, new_field, &primary_key);
        self.adapter.execute_ddl(&statements, &[table.to_string()])
    }

    #[instrument(skip(self, index), fields(table, index = %index.name))]
    pub fn add_index(&self, table: &str, index: &Index) -> Result<()> {
        self.require_table(table)?;
        if self.index_exists(table, &index.columns)? {
            return Err(SchemaAlignError::DdlUnknown {
                operation: "add_index".to_string(),
                detail: format!("an index on `{table}` already covers {:?}", index.columns),
            });
        }
        let statement = self.generator.add_index_sql(table, index);
        match self.adapter.execute_ddl(&[statement.clone()], &[table.to_string()]) {
            Ok(()) => Ok(()),
            Err(err @ SchemaAlignError::ChangeStructure { .. }) => {
                match self.adapter.convert_table_row_format(table) {
                    Some(Ok(())) => {
                        self.adapter.execute_ddl(&[statement], &[table.to_string()])
                    }
                    Some(Err(conversion_err)) => Err(conversion_err),
                    None => Err(err),
                }
            }
            Err(other) => Err(other),
        }
    }

    #[instrument(skip(self))]
    pub fn drop_index(&self, table: &str, index_name: &str) -> Result<()> {
        self.require_table(table)?;
        if !self.adapter.get_indexes(table, true)?.contains_key(index_name) {
            return Err(SchemaAlignError::DdlUnknown {
                operation: "drop_index".to_string(),
                detail: format!("no index named `{index_name}` on `{table}`"),
            });
        }
        let statement = self.generator.drop_index_sql(table, index_name);
        self.adapter.execute_ddl(&[statement], &[table.to_string()])
    }

    #[instrument(skip(self, index), fields(table, old_name, index = %index.name))]
    pub fn rename_index(&self, table: &str, old_name: &str, index: &Index) -> Result<()> {
        self.require_table(table)?;
        let statements = self.generator.rename_index_sql(table, old_name, index);
        self.adapter.execute_ddl(&statements, &[table.to_string()])
    }

    #[instrument(skip(self, key), fields(table, key = %key.name))]
    pub fn add_key(&self, table: &str, key: &Key) -> Result<()> {
        if key.key_type == KeyType::Primary {
            return Err(SchemaAlignError::DdlUnknown {
                operation: "add_key".to_string(),
                detail: "adding a PRIMARY key after table creation is rejected".to_string(),
            });
        }
        self.require_table(table)?;
        let statements = self.generator.add_key_sql(table, key);
        self.adapter.execute_ddl(&statements, &[table.to_string()])
    }

    #[instrument(skip(self, key), fields(table, key = %key.name))]
    pub fn drop_key(&self, table: &str, key: &Key) -> Result<()> {
        if key.key_type == KeyType::Primary {
            return Err(SchemaAlignError::DdlUnknown {
                operation: "drop_key".to_string(),
                detail: "dropping a PRIMARY key is rejected".to_string(),
            });
        }
        self.require_table(table)?;
        let statements = self.generator.drop_key_sql(table, key);
        self.adapter.execute_ddl(&statements, &[table.to_string()])
    }

    #[instrument(skip(self, key), fields(table, old_name, key = %key.name))]
    pub fn rename_key(&self, table: &str, old_name: &str, key: &Key) -> Result<()> {
        if key.key_type == KeyType::Primary {
            return Err(SchemaAlignError::DdlUnknown {
                operation: "rename_key".to_string(),
                detail: "renaming a PRIMARY key is rejected".to_string(),
            });
        }
        self.require_table(table)?;
        let statements = self.generator.rename_key_sql(table, old_name, key);
        self.adapter.execute_ddl(&statements, &[table.to_string()])
    }

    #[instrument(skip(self, fields, keys), fields(table))]
    pub fn create_table(&self, table: &str, fields: &[Field], keys: &[Key]) -> Result<()> {
        if self.adapter.get_tables()?.contains(table) {
            return Err(SchemaAlignError::TableAlreadyExists {
                table: table.to_string(),
            });
        }
        let statement = self.generator.create_table_sql(table, fields, keys);
        self.adapter.execute_ddl(&[statement], &[table.to_string()])
    }

    #[instrument(skip(self))]
    pub fn drop_table(&self, table: &str) -> Result<()> {
        self.require_table(table)?;
        let statement = self.generator.drop_table_sql(table);
        self.adapter.execute_ddl(&[statement], &[table.to_string()])
    }

    /// Disambiguates "already renamed" (source absent, target present, a
    /// benign no-op) from "target already in use" (a real conflict).
    #[instrument(skip(self))]
    pub fn rename_table(&self, old_name: &str, new_name: &str) -> Result<()> {
        let tables = self.adapter.get_tables()?;
        let old_present = tables.contains(old_name);
        let new_present = tables.contains(new_name);
        match (old_present, new_present) {
            (false, true) => Ok(()),
            (false, false) => Err(SchemaAlignError::TableMissing {
                table: old_name.to_string(),
            }),
            (true, true) => Err(SchemaAlignError::TableAlreadyExists {
                table: new_name.to_string(),
            }),
            (true, false) => {
                let statement = self.generator.rename_table_sql(old_name, new_name);
                self.adapter
                    .execute_ddl(&[statement], &[old_name.to_string(), new_name.to_string()])
            }
        }
    }

    /// True iff a database index exists whose column sequence exactly
    /// equals `columns` (exact ordered equality).
    pub fn index_exists(&self, table: &str, columns: &[String]) -> Result<bool> {
        let indexes = self.adapter.get_indexes(table, true)?;
        Ok(indexes.values().any(|idx| idx.columns == columns))
    }

    /// The name(s) of every database index whose column **set** equals
    /// `columns`'s set — intentionally looser than `index_exists`'s exact
    /// sequence equality (§9, preserved asymmetry).
    pub fn find_index_name(&self, table: &str, columns: &[String]) -> Result<Vec<String>> {
        use std::collections::HashSet;
        let wanted: HashSet<&str> = columns.iter().map(String::as_str).collect();
        let indexes = self.adapter.get_indexes(table, true)?;
        Ok(indexes
            .iter()
            .filter(|(_, idx)| {
                let have: HashSet<&str> = idx.columns.iter().map(String::as_str).collect();
                have == wanted
            })
            .map(|(name, _)| name.clone())
            .collect())
    }

    /// The generator's canonical name for a key — purely nominal, never
    /// consults the database.
    #[must_use]
    pub fn find_key_name(&self, table: &str, columns: &[String], key_type: KeyType) -> String {
        if key_type == KeyType::Primary {
            if let Some(name) = self.generator.primary_key_name(table) {
                return name;
            }
        }
        let suffix = match key_type {
            KeyType::Primary => KeySuffix::PrimaryKey,
            KeyType::Unique | KeyType::ForeignUnique => KeySuffix::UniqueKey,
            KeyType::Foreign => KeySuffix::ForeignKey,
        };
        self.generator.identifier_for(table, columns, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SqliteAdapter;
    use crate::generator::SqliteGenerator;
    use crate::schema::builder::{field, index, not_null_field};
    use crate::schema::FieldType;

    fn dispatcher() -> Dispatcher {
        let adapter = Arc::new(SqliteAdapter::open_memory().unwrap());
        let generator = Arc::new(SqliteGenerator);
        adapter
            .execute_ddl(
                &["CREATE TABLE t (id INTEGER(11) NOT NULL, name CHAR(20))".to_string()],
                &["t".to_string()],
            )
            .unwrap();
        Dispatcher::new(adapter, generator)
    }

    #[test]
    fn add_field_rejects_duplicate() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .add_field("t", &field("name", FieldType::Char, 20))
            .unwrap_err();
        assert!(matches!(err, SchemaAlignError::FieldAlreadyExists { .. }));
    }

    #[test]
    fn add_field_rejects_not_null_without_default_on_nonempty_table() {
        let dispatcher = dispatcher();
        dispatcher
            .adapter()
            .execute_ddl(&["INSERT INTO t (id) VALUES (1)".to_string()], &["t".to_string()])
            .unwrap();
        let err = dispatcher
            .add_field("t", &not_null_field("age", FieldType::Integer, 3))
            .unwrap_err();
        assert!(matches!(err, SchemaAlignError::DdlUnknown { .. }));
    }

    #[test]
    fn add_key_and_drop_key_reject_primary() {
        let dispatcher = dispatcher();
        let pk = Key {
            name: "pk".into(),
            key_type: KeyType::Primary,
            fields: vec!["id".to_string()],
            ref_table: None,
            ref_fields: Vec::new(),
        };
        assert!(matches!(
            dispatcher.add_key("t", &pk).unwrap_err(),
            SchemaAlignError::DdlUnknown { .. }
        ));
        assert!(matches!(
            dispatcher.drop_key("t", &pk).unwrap_err(),
            SchemaAlignError::DdlUnknown { .. }
        ));
    }

    #[test]
    fn index_exists_uses_sequence_equality_find_index_name_uses_set_equality() {
        let dispatcher = dispatcher();
        dispatcher
            .add_index(
                "t",
                &index("idx_id_name", false, vec!["id".to_string(), "name".to_string()]),
            )
            .unwrap();

        assert!(dispatcher
            .index_exists("t", &["id".to_string(), "name".to_string()])
            .unwrap());
        assert!(!dispatcher
            .index_exists("t", &["name".to_string(), "id".to_string()])
            .unwrap());
        assert_eq!(
            dispatcher
                .find_index_name("t", &["name".to_string(), "id".to_string()])
                .unwrap(),
            vec!["idx_id_name".to_string()]
        );
    }
}
