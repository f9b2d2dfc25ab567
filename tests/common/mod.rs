#![allow(dead_code)]

use std::sync::Arc;

use schemalign::adapter::{DatabaseAdapter, SqliteAdapter};
use schemalign::dispatch::Dispatcher;
use schemalign::generator::SqliteGenerator;

pub fn init_test_logging() {
    schemalign::logging::init_test_logging();
}

/// A fresh in-memory SQLite database behind a `Dispatcher`, ready for DDL.
pub fn test_dispatcher() -> Dispatcher {
    init_test_logging();
    Dispatcher::new(
        Arc::new(SqliteAdapter::open_memory().expect("open in-memory database")),
        Arc::new(SqliteGenerator),
    )
}

/// Run raw DDL/DML against the live database behind `dispatcher`, bypassing
/// the generator entirely — used to seed a live schema a scenario starts
/// from, independent of whatever this crate would itself generate.
pub fn seed(dispatcher: &Dispatcher, statements: &[&str]) {
    let owned: Vec<String> = statements.iter().map(|s| (*s).to_string()).collect();
    dispatcher
        .adapter()
        .execute_ddl(&owned, &[])
        .expect("seed DDL");
}
