//! In-memory representation of a declared relational schema.
//!
//! Tables, fields, keys and indexes described here are the declared side of
//! every comparison the diff engine performs. Values are read-only once
//! built; order is a property of the containing `Vec`, not of materialised
//! sibling pointers (see `DESIGN.md` — the source this was distilled from
//! threads `previous`/`next` links through tables, which we deliberately do
//! not reproduce).

pub mod builder;
mod loader;

pub use builder::StructureBuilder;
pub use loader::load_structure_from_toml;

use std::collections::HashSet;

/// The declared type of a field. `Float` is accepted on input but treated as
/// `Number` everywhere diffing and alignment happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Integer,
    Number,
    Float,
    Char,
    Text,
    Binary,
    Timestamp,
    Datetime,
}

impl FieldType {
    /// The type used for all diffing and alignment decisions: `Float`
    /// collapses into `Number`, everything else is unchanged.
    #[must_use]
    pub const fn normalized(self) -> Self {
        match self {
            Self::Float => Self::Number,
            other => other,
        }
    }

    /// Single-character code as used by live column descriptors (§3), where
    /// that mapping can be reversed unambiguously. `Float` has no live
    /// counterpart distinct from `Number` and so has no reverse code.
    #[must_use]
    pub const fn meta_char(self) -> Option<char> {
        match self {
            Self::Integer => Some('I'),
            Self::Number => Some('N'),
            Self::Char => Some('C'),
            Self::Text => Some('X'),
            Self::Binary => Some('B'),
            Self::Timestamp => Some('T'),
            Self::Datetime => Some('D'),
            Self::Float => None,
        }
    }
}

/// A field's declared default value. Kept distinct from "no default"
/// (`None` on `Field::default`): the diff engine's default-mismatch check
/// treats a missing default and the literal string `"NULL"` as different
/// values (§9, "Dynamic type coercion for default comparison").
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Str(String),
    Num(f64),
}

impl DefaultValue {
    /// Render as the canonical string used in default-mismatch diagnostics.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Num(n) => format!("{n}"),
        }
    }
}

/// A declared column.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub length: i64,
    pub decimals: i64,
    pub notnull: bool,
    pub default: Option<DefaultValue>,
    pub sequence: bool,
}

impl Field {
    /// `FieldType::normalized`, applied to this field.
    #[must_use]
    pub const fn normalized_type(&self) -> FieldType {
        self.field_type.normalized()
    }

    /// `length`, clamped to the comparison ceiling for `INTEGER` columns.
    #[must_use]
    pub fn clamped_length(&self) -> i64 {
        const INTEGER_LENGTH_CEILING: i64 = 18;
        if self.normalized_type() == FieldType::Integer {
            self.length.min(INTEGER_LENGTH_CEILING)
        } else {
            self.length
        }
    }

    /// Whether this field has an effective default: either an explicit
    /// declared default, or is nullable (NULL is itself an effective
    /// default for an add-column that won't conflict with existing rows).
    #[must_use]
    pub const fn has_effective_default(&self) -> bool {
        !self.notnull || self.default.is_some()
    }
}

/// The role a declared key plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Primary,
    Unique,
    Foreign,
    ForeignUnique,
}

impl KeyType {
    /// Whether this key type implies a unique index when materialised as
    /// one (§4.E.2.d): `UNIQUE` and `FOREIGN_UNIQUE` do, plain `FOREIGN`
    /// does not, and `PRIMARY` is never materialised as an ordinary index.
    #[must_use]
    pub const fn implies_unique_index(self) -> bool {
        matches!(self, Self::Unique | Self::ForeignUnique)
    }
}

/// A declared key (primary, unique, or foreign).
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub name: String,
    pub key_type: KeyType,
    pub fields: Vec<String>,
    pub ref_table: Option<String>,
    pub ref_fields: Vec<String>,
}

/// A declared index. Two indexes are logically equal by **exact sequence
/// equality** of their column lists — not set equality. `find_index_name`
/// (§4.D) intentionally uses set equality instead; that asymmetry is
/// preserved, not "fixed" (§9 open question).
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

impl Index {
    /// Exact, ordered column-sequence equality — the logical equality used
    /// by `index_exists`.
    #[must_use]
    pub fn same_sequence(&self, other: &[String]) -> bool {
        self.columns == other
    }

    /// Set equality on column names — the (intentionally looser) equality
    /// used by `find_index_name`.
    #[must_use]
    pub fn same_set(&self, other: &[String]) -> bool {
        let a: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let b: HashSet<&str> = other.iter().map(String::as_str).collect();
        a == b
    }
}

/// A declared table: an unprefixed name plus ordered fields, keys, indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub fields: Vec<Field>,
    pub keys: Vec<Key>,
    pub indexes: Vec<Index>,
}

impl Table {
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Whether this table declares no fields: used as a stand-in for "table
    /// is empty" in contexts where the live row count isn't yet known.
    #[must_use]
    pub fn is_declared_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// An ordered collection of declared tables plus a version tag — the
/// top-level declared schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub version: String,
    tables: Vec<Table>,
}

impl Structure {
    #[must_use]
    pub const fn new(version: String, tables: Vec<Table>) -> Self {
        Self { version, tables }
    }

    #[must_use]
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// A filtered view containing only tables whose names pass both an
    /// inclusion list (`limit`) and an exclusion list (`exclude`).
    ///
    /// Inclusion: a table passes if `limit` is unset, or the name is a
    /// member. Exclusion: a table passes if `exclude` is unset, or the name
    /// is *not* a member. Both must pass.
    #[must_use]
    pub fn get_schema(
        &self,
        limit: Option<&HashSet<String>>,
        exclude: Option<&HashSet<String>>,
    ) -> Self {
        let tables = self
            .tables
            .iter()
            .filter(|t| limit.is_none_or(|l| l.contains(&t.name)))
            .filter(|t| exclude.is_none_or(|e| !e.contains(&t.name)))
            .cloned()
            .collect();
        Self {
            version: self.version.clone(),
            tables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table(name: &str) -> Table {
        Table {
            name: name.to_string(),
            fields: Vec::new(),
            keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    #[test]
    fn float_normalizes_to_number() {
        assert_eq!(FieldType::Float.normalized(), FieldType::Number);
        assert_eq!(FieldType::Integer.normalized(), FieldType::Integer);
    }

    #[test]
    fn integer_length_is_clamped() {
        let field = Field {
            name: "id".into(),
            field_type: FieldType::Integer,
            length: 40,
            decimals: 0,
            notnull: true,
            default: None,
            sequence: true,
        };
        assert_eq!(field.clamped_length(), 18);
    }

    #[test]
    fn index_sequence_vs_set_equality_differ() {
        let idx = Index {
            name: "idx_a_b".into(),
            unique: false,
            columns: vec!["a".into(), "b".into()],
        };
        assert!(idx.same_sequence(&["a".to_string(), "b".to_string()]));
        assert!(!idx.same_sequence(&["b".to_string(), "a".to_string()]));
        assert!(idx.same_set(&["b".to_string(), "a".to_string()]));
    }

    #[test]
    fn get_schema_filters_by_limit_and_exclude() {
        let structure = Structure::new(
            "1".into(),
            vec![
                sample_table("ab"),
                sample_table("bc"),
                sample_table("xc"),
                sample_table("d"),
            ],
        );
        let limit: HashSet<String> = ["ab", "bc", "xc"].iter().map(|s| s.to_string()).collect();
        let exclude: HashSet<String> = ["bc"].iter().map(|s| s.to_string()).collect();
        let filtered = structure.get_schema(Some(&limit), Some(&exclude));
        let names: Vec<_> = filtered.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["ab", "xc"]);
    }
}
