//! Command-line driver: flag parsing, table-pattern resolution, and the
//! plain-text report contract (§4.H, §6).
//!
//! stdout carries only the report; every diagnostic goes to stderr via
//! `tracing`, so piping stdout stays safe for scripting.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use clap_complete::Shell;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::adapter::{DatabaseAdapter, SqliteAdapter};
use crate::config::RunConfig;
use crate::diff::{diff_schema, DiffOptions, ErrorRecord, Safety};
use crate::dispatch::Dispatcher;
use crate::error::{Result, SchemaAlignError};
use crate::fixer;
use crate::generator::SqliteGenerator;
use crate::risk::evaluate_risky;
use crate::schema::load_structure_from_toml;

/// Which shape the report is printed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// The §6 plain-text report contract.
    Text,
    /// One JSON array of error records, for scripting.
    Json,
}

/// Compare a declared schema against a live SQLite database, report every
/// discrepancy, and optionally repair it.
#[derive(Debug, Parser)]
#[command(name = "schemalign", version, about)]
pub struct Cli {
    /// Restrict to these tables (comma-separated names/globs).
    #[arg(short = 't', long = "tables", value_delimiter = ',')]
    pub tables: Option<Vec<String>>,

    /// Exclude these tables (comma-separated names/globs).
    #[arg(short = 'e', long = "exclude", value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Probe the live data to resolve `risky` findings before reporting.
    #[arg(short = 'c', long = "check-risky")]
    pub check_risky: bool,

    /// Apply fixes at these safety levels (comma-separated subset of
    /// `safe`, `dbindex`, `unsafe`).
    #[arg(short = 'f', long = "fix", value_delimiter = ',')]
    pub fix: Option<Vec<String>>,

    /// Path to the target SQLite database (env `SCHEMALIGN_DB`).
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Path to the TOML schema description (env `SCHEMALIGN_SCHEMA`).
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Report shape.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// Print a shell completion script for the given shell and exit.
    #[arg(long)]
    pub completions: Option<Shell>,

    /// Increase log verbosity (stackable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all but error-level logging.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// Parse `--tables`/`--exclude` tokens into a concrete name set (§4.H):
/// literal tokens pass through unchanged; tokens containing `*` are
/// anchored-regex-matched against `candidates`.
#[must_use]
pub fn resolve_table_patterns(patterns: &[String], candidates: &HashSet<String>) -> HashSet<String> {
    let mut resolved = HashSet::new();
    for pattern in patterns {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        if pattern.contains('*') {
            if let Some(re) = compile_glob(pattern) {
                resolved.extend(candidates.iter().filter(|c| re.is_match(c)).cloned());
            }
        } else {
            resolved.insert(pattern.to_string());
        }
    }
    resolved
}

fn compile_glob(pattern: &str) -> Option<Regex> {
    static STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\\*").unwrap());
    let escaped = regex::escape(pattern);
    let anchored = format!("^{}$", STAR.replace_all(&escaped, ".*"));
    Regex::new(&anchored).ok()
}

/// Parse `--fix` tokens into a set of safety levels. Rejects `risky`
/// explicitly: it only ever becomes a concrete level via `--check-risky`.
pub fn parse_fix_levels(raw: &[String]) -> Result<HashSet<Safety>> {
    let mut levels = HashSet::new();
    for token in raw {
        let level = match token.trim() {
            "safe" => Safety::Safe,
            "dbindex" => Safety::DbIndex,
            "unsafe" => Safety::Unsafe,
            "risky" => {
                return Err(SchemaAlignError::InvalidArgument(
                    "`--fix` cannot include `risky`; run `--check-risky` first".to_string(),
                ))
            }
            other => {
                return Err(SchemaAlignError::InvalidArgument(format!(
                    "unknown fix level `{other}` (expected safe, dbindex, or unsafe)"
                )))
            }
        };
        levels.insert(level);
    }
    Ok(levels)
}

const fn safety_label(safety: Safety) -> &'static str {
    match safety {
        Safety::Safe => "safe",
        Safety::DbIndex => "dbindex",
        Safety::Risky => "risky",
        Safety::Unsafe => "unsafe",
        Safety::Unfixable => "unfixable",
    }
}

/// Print the plain-text report contract of §6: one rule-separated block per
/// table with open issues, one ` * fix=<safety>   <desc>` line each.
pub fn print_report(errors: &IndexMap<String, Vec<ErrorRecord>>) {
    let mut first = true;
    for (table, records) in errors {
        if records.is_empty() {
            continue;
        }
        if !first {
            println!("{}", "-".repeat(60));
        }
        first = false;
        println!("{table}");
        for record in records {
            println!(" * fix={}   {}", safety_label(record.safety), record.desc);
        }
    }
}

/// Print the same records as one JSON array, for scripting consumers.
///
/// # Errors
///
/// Returns an error only if serialization itself fails, which does not
/// happen for this crate's own record types.
pub fn print_report_json(errors: &IndexMap<String, Vec<ErrorRecord>>) -> Result<()> {
    let flat: Vec<&ErrorRecord> = errors.values().flatten().collect();
    let rendered = serde_json::to_string_pretty(&flat)
        .map_err(|e| SchemaAlignError::InvalidArgument(format!("failed to render JSON report: {e}")))?;
    println!("{rendered}");
    Ok(())
}

fn print_report_for(format: ReportFormat, errors: &IndexMap<String, Vec<ErrorRecord>>) -> Result<()> {
    match format {
        ReportFormat::Text => {
            print_report(errors);
            Ok(())
        }
        ReportFormat::Json => print_report_json(errors),
    }
}

/// Print a completion script for `shell` to stdout.
pub fn print_completions(shell: Shell) {
    let mut cmd = <Cli as clap::CommandFactory>::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}

/// Run one full invocation: load the declared schema, diff it against the
/// live database, optionally probe risky findings and apply fixes, then
/// print the report.
///
/// # Errors
///
/// Returns `SchemaAlignError::NotInitialized` if the database has no
/// tables, or any error surfaced while loading the schema, diffing, or
/// fixing.
pub fn run(cli: &Cli) -> Result<()> {
    let config = RunConfig::resolve(cli.db.as_deref(), cli.schema.as_deref());

    let adapter = std::sync::Arc::new(SqliteAdapter::open(&config.db_path)?);
    let generator = std::sync::Arc::new(SqliteGenerator);
    let dispatcher = Dispatcher::new(adapter.clone(), generator);

    let live_tables = adapter.get_tables()?;
    if live_tables.is_empty() {
        return Err(SchemaAlignError::NotInitialized);
    }

    let structure = load_structure_from_toml(&config.schema_path)?;

    let mut candidates: HashSet<String> = structure.tables().iter().map(|t| t.name.clone()).collect();
    candidates.extend(live_tables);

    let limit = cli
        .tables
        .as_ref()
        .map(|patterns| resolve_table_patterns(patterns, &candidates));
    let exclude = cli
        .exclude
        .as_ref()
        .map(|patterns| resolve_table_patterns(patterns, &candidates));

    let options = DiffOptions {
        limit,
        exclude,
        ..DiffOptions::default()
    };

    let mut errors = diff_schema(&structure, &dispatcher, &options)?;

    if cli.check_risky {
        evaluate_risky(&mut errors, &structure, &dispatcher)?;
    }

    if let Some(raw_levels) = &cli.fix {
        let levels = parse_fix_levels(raw_levels)?;
        let applied = fixer::fix(&mut errors, &structure, &dispatcher, &levels)?;
        print_report_for(cli.format, &errors)?;
        if applied == 0 {
            println!("No schema issues were resolved.");
        } else {
            println!("{applied} schema issues were resolved.");
        }
    } else {
        print_report_for(cli.format, &errors)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns_pass_through_unchanged() {
        let candidates: HashSet<String> = ["users".to_string(), "orders".to_string()].into_iter().collect();
        let resolved = resolve_table_patterns(&["users".to_string(), "ghost".to_string()], &candidates);
        assert_eq!(resolved, ["users".to_string(), "ghost".to_string()].into_iter().collect());
    }

    #[test]
    fn globs_expand_against_candidates() {
        let candidates: HashSet<String> =
            ["user_sessions".to_string(), "user_tokens".to_string(), "orders".to_string()]
                .into_iter()
                .collect();
        let resolved = resolve_table_patterns(&["user_*".to_string()], &candidates);
        assert_eq!(
            resolved,
            ["user_sessions".to_string(), "user_tokens".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn glob_special_characters_are_escaped() {
        let candidates: HashSet<String> = ["a.b".to_string(), "axb".to_string()].into_iter().collect();
        let resolved = resolve_table_patterns(&["a.b*".to_string()], &candidates);
        assert_eq!(resolved, ["a.b".to_string()].into_iter().collect());
    }

    #[test]
    fn fix_levels_reject_risky_and_unknown_tokens() {
        assert!(matches!(
            parse_fix_levels(&["risky".to_string()]).unwrap_err(),
            SchemaAlignError::InvalidArgument(_)
        ));
        assert!(matches!(
            parse_fix_levels(&["bogus".to_string()]).unwrap_err(),
            SchemaAlignError::InvalidArgument(_)
        ));
    }

    #[test]
    fn fix_levels_accept_the_documented_subset() {
        let levels = parse_fix_levels(&["safe".to_string(), "unsafe".to_string()]).unwrap();
        assert_eq!(levels, [Safety::Safe, Safety::Unsafe].into_iter().collect());
    }

    #[test]
    fn json_report_serializes_every_record() {
        use crate::diff::{ErrorType, Status};

        let mut errors: IndexMap<String, Vec<ErrorRecord>> = IndexMap::new();
        errors.insert(
            "users".to_string(),
            vec![ErrorRecord {
                table: "users".to_string(),
                error_type: ErrorType::MissingTables,
                issue: None,
                field: None,
                dbfield: None,
                index: None,
                desc: "table missing".to_string(),
                status: Status::Error,
                safety: Safety::Safe,
                fixes: HashSet::new(),
            }],
        );

        let rendered = serde_json::to_string(&errors.values().flatten().collect::<Vec<_>>()).unwrap();
        assert!(rendered.contains("\"missing_tables\""));
        assert!(rendered.contains("\"safe\""));
    }

    #[test]
    fn cli_parses_format_and_completions_flags() {
        let cli = Cli::parse_from(["schemalign", "--format", "json"]);
        assert_eq!(cli.format, ReportFormat::Json);
        assert!(cli.completions.is_none());

        let cli = Cli::parse_from(["schemalign", "--completions", "bash"]);
        assert_eq!(cli.completions, Some(Shell::Bash));
    }
}
