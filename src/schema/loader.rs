//! Minimal TOML schema-description loader (§4.A.1).
//!
//! The distilled specification keeps XML description-file parsing out of
//! scope entirely; this loader is not a reimplementation of that parser but
//! a small, self-contained convenience so the CLI and tests can exercise
//! the engine without one. It carries no diffing semantics of its own —
//! everything it produces goes straight through `StructureBuilder`.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, SchemaAlignError};

use super::{DefaultValue, Field, FieldType, Index, Key, KeyType, Structure, Table};

#[derive(Debug, Deserialize)]
struct RawStructure {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    table: Vec<RawTable>,
}

fn default_version() -> String {
    "0".to_string()
}

#[derive(Debug, Deserialize)]
struct RawTable {
    name: String,
    #[serde(default)]
    field: Vec<RawField>,
    #[serde(default)]
    key: Vec<RawKey>,
    #[serde(default)]
    index: Vec<RawIndex>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    r#type: String,
    #[serde(default)]
    length: i64,
    #[serde(default)]
    decimals: i64,
    #[serde(default)]
    notnull: bool,
    #[serde(default)]
    default: Option<toml::Value>,
    #[serde(default)]
    sequence: bool,
}

#[derive(Debug, Deserialize)]
struct RawKey {
    #[serde(default)]
    name: Option<String>,
    r#type: String,
    fields: Vec<String>,
    #[serde(default)]
    ref_table: Option<String>,
    #[serde(default)]
    ref_fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawIndex {
    name: String,
    #[serde(default)]
    unique: bool,
    columns: Vec<String>,
}

fn parse_field_type(raw: &str) -> Result<FieldType> {
    match raw.to_ascii_uppercase().as_str() {
        "INTEGER" => Ok(FieldType::Integer),
        "NUMBER" => Ok(FieldType::Number),
        "FLOAT" => Ok(FieldType::Float),
        "CHAR" => Ok(FieldType::Char),
        "TEXT" => Ok(FieldType::Text),
        "BINARY" => Ok(FieldType::Binary),
        "TIMESTAMP" => Ok(FieldType::Timestamp),
        "DATETIME" => Ok(FieldType::Datetime),
        other => Err(SchemaAlignError::InvalidSchema(format!(
            "unknown field type `{other}`"
        ))),
    }
}

fn parse_key_type(raw: &str) -> Result<KeyType> {
    match raw.to_ascii_uppercase().as_str() {
        "PRIMARY" => Ok(KeyType::Primary),
        "UNIQUE" => Ok(KeyType::Unique),
        "FOREIGN" => Ok(KeyType::Foreign),
        "FOREIGN_UNIQUE" => Ok(KeyType::ForeignUnique),
        other => Err(SchemaAlignError::InvalidSchema(format!(
            "unknown key type `{other}`"
        ))),
    }
}

fn parse_default(value: &toml::Value) -> Result<DefaultValue> {
    match value {
        toml::Value::String(s) => Ok(DefaultValue::Str(s.clone())),
        toml::Value::Integer(i) => Ok(DefaultValue::Num(*i as f64)),
        toml::Value::Float(f) => Ok(DefaultValue::Num(*f)),
        other => Err(SchemaAlignError::InvalidSchema(format!(
            "unsupported default value `{other}`"
        ))),
    }
}

fn key_name(raw: &RawKey, table: &str) -> String {
    raw.name.clone().unwrap_or_else(|| {
        let suffix = match raw.r#type.to_ascii_uppercase().as_str() {
            "PRIMARY" => "pk",
            "UNIQUE" => "uk",
            _ => "fk",
        };
        format!("{table}_{suffix}")
    })
}

fn convert_table(raw: RawTable) -> Result<Table> {
    let mut fields = Vec::with_capacity(raw.field.len());
    for f in raw.field {
        let field_type = parse_field_type(&f.r#type)?;
        let default = f.default.as_ref().map(parse_default).transpose()?;
        fields.push(Field {
            name: f.name,
            field_type,
            length: f.length,
            decimals: f.decimals,
            notnull: f.notnull,
            default,
            sequence: f.sequence,
        });
    }

    let mut keys = Vec::with_capacity(raw.key.len());
    for k in raw.key {
        let key_type = parse_key_type(&k.r#type)?;
        let name = key_name(&k, &raw.name);
        keys.push(Key {
            name,
            key_type,
            fields: k.fields,
            ref_table: k.ref_table,
            ref_fields: k.ref_fields,
        });
    }

    let indexes = raw
        .index
        .into_iter()
        .map(|i| Index {
            name: i.name,
            unique: i.unique,
            columns: i.columns,
        })
        .collect();

    Ok(Table {
        name: raw.name,
        fields,
        keys,
        indexes,
    })
}

/// Load a `Structure` from a TOML schema-description file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, or
/// references an unknown field/key type.
pub fn load_structure_from_toml(path: &Path) -> Result<Structure> {
    let contents = std::fs::read_to_string(path).map_err(|e| SchemaAlignError::SchemaLoad {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let raw: RawStructure =
        toml::from_str(&contents).map_err(|e| SchemaAlignError::SchemaLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let mut tables = Vec::with_capacity(raw.table.len());
    for raw_table in raw.table {
        tables.push(convert_table(raw_table)?);
    }

    Ok(Structure::new(raw.version, tables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_minimal_structure() {
        let toml_src = r#"
            version = "1"

            [[table]]
            name = "users"

            [[table.field]]
            name = "id"
            type = "INTEGER"
            length = 11
            notnull = true
            sequence = true

            [[table.field]]
            name = "email"
            type = "CHAR"
            length = 100
            notnull = true

            [[table.key]]
            type = "PRIMARY"
            fields = ["id"]

            [[table.index]]
            name = "idx_email"
            unique = true
            columns = ["email"]
        "#;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml_src.as_bytes()).unwrap();

        let structure = load_structure_from_toml(file.path()).unwrap();
        assert_eq!(structure.version, "1");
        let table = structure.table("users").unwrap();
        assert_eq!(table.fields().len(), 2);
        assert_eq!(table.keys()[0].key_type, KeyType::Primary);
        assert_eq!(table.indexes()[0].name, "idx_email");
    }

    #[test]
    fn rejects_unknown_field_type() {
        let toml_src = r#"
            [[table]]
            name = "t"
            [[table.field]]
            name = "x"
            type = "BOGUS"
        "#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml_src.as_bytes()).unwrap();
        assert!(load_structure_from_toml(file.path()).is_err());
    }
}
