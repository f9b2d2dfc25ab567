//! Ergonomic construction of a `Structure` in-process.
//!
//! Stands in for the external XML-description parser (explicitly out of
//! scope — §1, §4.A): tests and the TOML loader (`loader.rs`) both build
//! `Structure` values through this builder rather than constructing the raw
//! struct literals by hand.

use super::{DefaultValue, Field, FieldType, Index, Key, KeyType, Structure, Table};

/// Incrementally assembles a `Structure`.
#[derive(Debug, Default)]
pub struct StructureBuilder {
    version: String,
    tables: Vec<Table>,
}

impl StructureBuilder {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            tables: Vec::new(),
        }
    }

    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    #[must_use]
    pub fn build(self) -> Structure {
        Structure::new(self.version, self.tables)
    }
}

/// Incrementally assembles a `Table`.
#[derive(Debug, Default)]
pub struct TableBuilder {
    name: String,
    fields: Vec<Field>,
    keys: Vec<Key>,
    indexes: Vec<Index>,
}

impl TableBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn key(mut self, key: Key) -> Self {
        self.keys.push(key);
        self
    }

    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    #[must_use]
    pub fn build(self) -> Table {
        Table {
            name: self.name,
            fields: self.fields,
            keys: self.keys,
            indexes: self.indexes,
        }
    }
}

/// Builds a field with the most common shape (fixed type, nullable, no
/// default) so call sites only need to override what differs.
#[must_use]
pub fn field(name: impl Into<String>, field_type: FieldType, length: i64) -> Field {
    Field {
        name: name.into(),
        field_type,
        length,
        decimals: 0,
        notnull: false,
        default: None,
        sequence: false,
    }
}

#[must_use]
pub fn not_null_field(name: impl Into<String>, field_type: FieldType, length: i64) -> Field {
    Field {
        notnull: true,
        ..field(name, field_type, length)
    }
}

#[must_use]
pub fn field_with_default(
    name: impl Into<String>,
    field_type: FieldType,
    length: i64,
    default: DefaultValue,
) -> Field {
    Field {
        default: Some(default),
        ..field(name, field_type, length)
    }
}

#[must_use]
pub fn primary_key(fields: Vec<String>) -> Key {
    Key {
        name: "primary".to_string(),
        key_type: KeyType::Primary,
        fields,
        ref_table: None,
        ref_fields: Vec::new(),
    }
}

#[must_use]
pub fn unique_key(name: impl Into<String>, fields: Vec<String>) -> Key {
    Key {
        name: name.into(),
        key_type: KeyType::Unique,
        fields,
        ref_table: None,
        ref_fields: Vec::new(),
    }
}

#[must_use]
pub fn foreign_key(
    name: impl Into<String>,
    fields: Vec<String>,
    ref_table: impl Into<String>,
    ref_fields: Vec<String>,
) -> Key {
    Key {
        name: name.into(),
        key_type: KeyType::Foreign,
        fields,
        ref_table: Some(ref_table.into()),
        ref_fields,
    }
}

#[must_use]
pub fn index(name: impl Into<String>, unique: bool, columns: Vec<String>) -> Index {
    Index {
        name: name.into(),
        unique,
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_simple_structure() {
        let structure = StructureBuilder::new("1")
            .table(
                TableBuilder::new("users")
                    .field(not_null_field("id", FieldType::Integer, 11))
                    .field(not_null_field("email", FieldType::Char, 100))
                    .key(primary_key(vec!["id".to_string()]))
                    .build(),
            )
            .build();

        assert_eq!(structure.tables().len(), 1);
        assert_eq!(structure.table("users").unwrap().fields().len(), 2);
    }
}
