//! Concrete `DatabaseAdapter` over a `rusqlite::Connection` (§4.B.1).
//!
//! Follows the shape of this codebase's `SqliteStorage`: a thin struct
//! wrapping a connection, `reset_caches` clearing a `RefCell`-memoised
//! column/index cache, and `pragma_table_info`/`PRAGMA index_list` doing
//! the introspection work. Declared column types are rendered by
//! `SqliteGenerator` as `NAME(len[,scale])` strings (SQLite itself has no
//! fixed-width/precision enforcement — it is dynamically typed — so this
//! crate carries precision information in the type string purely for
//! round-tripping through introspection).

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, Row};

use crate::error::{Result, SchemaAlignError};

use super::{DatabaseAdapter, LiveColumn, LiveIndex, MetaType};

static TYPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([A-Z]+)(?:\((\d+)(?:,(\d+))?\))?$").unwrap());

fn parse_declared_type(declared: &str) -> (MetaType, i64, i64) {
    let Some(caps) = TYPE_PATTERN.captures(declared.trim()) else {
        return (MetaType::X, 0, 0);
    };
    let name = caps.get(1).map_or("", |m| m.as_str()).to_ascii_uppercase();
    let first: i64 = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    let second: i64 = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    match name.as_str() {
        "INTEGER" => (MetaType::I, first, 0),
        "NUMERIC" => (MetaType::N, first, second),
        "CHAR" => (MetaType::C, first, 0),
        "TEXT" => (MetaType::X, 0, 0),
        "BLOB" => (MetaType::B, 0, 0),
        "TIMESTAMP" => (MetaType::T, 0, 0),
        "DATETIME" => (MetaType::D, 0, 0),
        _ => (MetaType::X, 0, 0),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite-backed `DatabaseAdapter`.
pub struct SqliteAdapter {
    conn: RefCell<Connection>,
    column_cache: RefCell<Option<std::collections::HashMap<String, IndexMap<String, LiveColumn>>>>,
    index_cache: RefCell<Option<std::collections::HashMap<String, IndexMap<String, LiveIndex>>>>,
}

impl SqliteAdapter {
    /// Open a connection to the database file at `path`, creating it if it
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database, primarily for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: RefCell::new(conn),
            column_cache: RefCell::new(None),
            index_cache: RefCell::new(None),
        }
    }

    fn column_row(row: &Row<'_>) -> rusqlite::Result<(String, String, bool, Option<String>)> {
        Ok((row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }
}

impl DatabaseAdapter for SqliteAdapter {
    fn get_tables(&self) -> Result<HashSet<String>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(names)
    }

    fn get_columns(&self, table: &str) -> Result<IndexMap<String, LiveColumn>> {
        if let Some(cache) = self.column_cache.borrow().as_ref() {
            if let Some(cols) = cache.get(table) {
                return Ok(cols.clone());
            }
        }

        let conn = self.conn.borrow();
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::column_row)?;

        let mut columns = IndexMap::new();
        for row in rows {
            let (name, declared_type, not_null, default_value) = row?;
            let (meta_type, max_length, scale) = parse_declared_type(&declared_type);
            let has_default = default_value.is_some();
            columns.insert(
                name,
                LiveColumn {
                    meta_type,
                    max_length,
                    scale,
                    not_null,
                    has_default,
                    default_value: default_value.map(|v| unquote_sql_literal(&v)),
                },
            );
        }

        self.column_cache
            .borrow_mut()
            .get_or_insert_with(Default::default)
            .insert(table.to_string(), columns.clone());
        Ok(columns)
    }

    fn get_indexes(&self, table: &str, include_primary: bool) -> Result<IndexMap<String, LiveIndex>> {
        let cache_key = format!("{table}:{include_primary}");
        if let Some(cache) = self.index_cache.borrow().as_ref() {
            if let Some(idx) = cache.get(&cache_key) {
                return Ok(idx.clone());
            }
        }

        let conn = self.conn.borrow();
        let list_sql = format!("PRAGMA index_list({})", quote_ident(table));
        let mut list_stmt = conn.prepare(&list_sql)?;
        let index_rows: Vec<(String, bool, String)> = list_stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, bool>(2)?, row.get::<_, String>(3)?))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut indexes = IndexMap::new();
        for (name, unique, origin) in index_rows {
            if origin == "pk" && !include_primary {
                continue;
            }
            let info_sql = format!("PRAGMA index_info({})", quote_ident(&name));
            let mut info_stmt = conn.prepare(&info_sql)?;
            let mut columns: Vec<(i64, String)> = info_stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(2)?)))?
                .collect::<rusqlite::Result<_>>()?;
            columns.sort_by_key(|(seqno, _)| *seqno);
            let columns: Vec<String> = columns.into_iter().map(|(_, name)| name).collect();
            indexes.insert(name, LiveIndex { columns, unique });
        }

        self.index_cache
            .borrow_mut()
            .get_or_insert_with(Default::default)
            .insert(cache_key, indexes.clone());
        Ok(indexes)
    }

    fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        // `PRAGMA index_list`'s `origin = 'pk'` rows miss a single-column
        // `INTEGER PRIMARY KEY` entirely (SQLite creates no index for the
        // rowid alias), so this reads `table_info`'s own `pk` ordinal
        // instead: 0 means not part of the primary key, otherwise its
        // 1-based position within it.
        let conn = self.conn.borrow();
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = conn.prepare(&sql)?;
        let mut columns: Vec<(i64, String)> = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(5)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        columns.retain(|(order, _)| *order > 0);
        columns.sort_by_key(|(order, _)| *order);
        Ok(columns.into_iter().map(|(_, name)| name).collect())
    }

    fn execute_ddl(&self, statements: &[String], affected_tables: &[String]) -> Result<()> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        for statement in statements {
            tx.execute_batch(statement)
                .map_err(|e| SchemaAlignError::ChangeStructure {
                    table: affected_tables.join(","),
                    detail: e.to_string(),
                })?;
        }
        tx.commit().map_err(|e| SchemaAlignError::ChangeStructure {
            table: affected_tables.join(","),
            detail: e.to_string(),
        })?;
        self.reset_caches();
        Ok(())
    }

    fn count_rows(&self, table: &str) -> Result<i64> {
        let conn = self.conn.borrow();
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    fn exists_where(&self, table: &str, predicate: &str, args: &[&str]) -> Result<bool> {
        let conn = self.conn.borrow();
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {predicate})",
            quote_ident(table)
        );
        let params = rusqlite::params_from_iter(args.iter());
        Ok(conn.query_row(&sql, params, |row| row.get(0))?)
    }

    fn iterate(
        &self,
        table: &str,
        columns: &[String],
        visit: &mut dyn FnMut(&[Option<String>]) -> Result<()>,
    ) -> Result<()> {
        let conn = self.conn.borrow();
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {column_list} FROM {}", quote_ident(table));
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(value_ref_to_string(row, i)?);
            }
            visit(&values)?;
        }
        Ok(())
    }

    fn set_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
        predicate: &str,
        args: &[&str],
    ) -> Result<u64> {
        let conn = self.conn.borrow();
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {predicate}",
            quote_ident(table),
            quote_ident(column)
        );
        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&value];
        for a in args {
            params.push(a);
        }
        Ok(conn.execute(&sql, params.as_slice())? as u64)
    }

    fn reset_caches(&self) {
        *self.column_cache.borrow_mut() = None;
        *self.index_cache.borrow_mut() = None;
    }
}

impl SqliteAdapter {
    /// Update a single column of the rows matched by `predicate`/`args` to
    /// `value`. Used by the fixer's `truncate` data fix, which computes a
    /// different replacement value per row (§4.G.3.a).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_row(
        &self,
        table: &str,
        predicate: &str,
        args: &[&str],
        column: &str,
        value: &str,
    ) -> Result<u64> {
        self.set_where(table, column, value, predicate, args)
    }
}

fn value_ref_to_string(row: &rusqlite::Row<'_>, idx: usize) -> Result<Option<String>> {
    use rusqlite::types::ValueRef;
    let value = row.get_ref(idx)?;
    Ok(match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    })
}

fn unquote_sql_literal(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        trimmed[1..trimmed.len() - 1].replace("''", "'")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_declared_types() {
        assert_eq!(parse_declared_type("INTEGER(11)"), (MetaType::I, 11, 0));
        assert_eq!(parse_declared_type("NUMERIC(10,2)"), (MetaType::N, 10, 2));
        assert_eq!(parse_declared_type("CHAR(100)"), (MetaType::C, 100, 0));
        assert_eq!(parse_declared_type("TEXT"), (MetaType::X, 0, 0));
        assert_eq!(parse_declared_type("BLOB"), (MetaType::B, 0, 0));
    }

    #[test]
    fn introspects_tables_and_columns() {
        let adapter = SqliteAdapter::open_memory().unwrap();
        adapter
            .execute_ddl(
                &["CREATE TABLE users (id INTEGER(11) NOT NULL, email CHAR(100) NOT NULL DEFAULT '')"
                    .to_string()],
                &["users".to_string()],
            )
            .unwrap();

        let tables = adapter.get_tables().unwrap();
        assert!(tables.contains("users"));

        let columns = adapter.get_columns("users").unwrap();
        let email = &columns["email"];
        assert_eq!(email.meta_type, MetaType::C);
        assert_eq!(email.max_length, 100);
        assert!(email.has_default);
        assert_eq!(email.default_value.as_deref(), Some(""));
    }

    #[test]
    fn reset_caches_clears_memoised_columns() {
        let adapter = SqliteAdapter::open_memory().unwrap();
        adapter
            .execute_ddl(
                &["CREATE TABLE t (a INTEGER(11))".to_string()],
                &["t".to_string()],
            )
            .unwrap();
        let _ = adapter.get_columns("t").unwrap();
        adapter.reset_caches();
        assert!(adapter.column_cache.borrow().is_none());
    }
}
