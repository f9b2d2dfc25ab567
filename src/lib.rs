//! `schemalign` - declarative relational schema alignment engine
//!
//! Compares a declared relational schema against a live database, classifies
//! every discrepancy by safety level (`safe`, `dbindex`, `risky`, `unsafe`,
//! `unfixable`), and can repair the live database to match.
//!
//! # Architecture
//!
//! - [`schema`] - the declared schema model (`Structure`/`Table`/`Field`/...)
//!   plus a builder and a small TOML loader
//! - [`adapter`] - live database introspection and DDL/DML execution
//! - [`generator`] - per-dialect SQL statement emission
//! - [`dispatch`] - existence-and-dependency-checked operations bridging the
//!   adapter and generator
//! - [`diff`] - compares declared vs. live, emitting safety-classified
//!   `ErrorRecord`s
//! - [`risk`] - escalates `risky` findings to a concrete safety level by
//!   probing live data
//! - [`fixer`] - the seven ordered repair passes
//! - [`cli`] - command-line interface using clap
//! - [`config`] - database/schema path resolution
//! - [`error`] - error types and handling
//! - [`logging`] - tracing-based logging setup

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod cli;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod fixer;
pub mod generator;
pub mod logging;
pub mod risk;
pub mod schema;

pub use error::{Result, SchemaAlignError};
