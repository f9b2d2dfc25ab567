//! Configuration resolution for the schema alignment CLI (§4.H.1).
//!
//! Precedence, highest wins: explicit CLI flag > environment variable >
//! built-in default. Mirrors the layered precedence this codebase's config
//! stack always uses, simplified down to the two paths this crate actually
//! needs.

use std::path::{Path, PathBuf};

const DEFAULT_DB_FILENAME: &str = "schemalign.db";
const DEFAULT_SCHEMA_FILENAME: &str = "schema.toml";
const DB_ENV_VAR: &str = "SCHEMALIGN_DB";
const SCHEMA_ENV_VAR: &str = "SCHEMALIGN_SCHEMA";

/// Resolved paths for one invocation: the target database and the declared
/// schema description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub db_path: PathBuf,
    pub schema_path: PathBuf,
}

impl RunConfig {
    /// Resolve from CLI overrides and the process environment.
    #[must_use]
    pub fn resolve(db_override: Option<&Path>, schema_override: Option<&Path>) -> Self {
        Self::resolve_with_env(
            db_override,
            schema_override,
            std::env::var(DB_ENV_VAR).ok().as_deref(),
            std::env::var(SCHEMA_ENV_VAR).ok().as_deref(),
        )
    }

    /// Same as `resolve`, but with the environment passed explicitly —
    /// keeps the precedence logic testable without mutating real env vars.
    fn resolve_with_env(
        db_override: Option<&Path>,
        schema_override: Option<&Path>,
        db_env: Option<&str>,
        schema_env: Option<&str>,
    ) -> Self {
        let db_path = db_override.map(Path::to_path_buf).unwrap_or_else(|| {
            db_env
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILENAME))
        });
        let schema_path = schema_override.map(Path::to_path_buf).unwrap_or_else(|| {
            schema_env
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_FILENAME))
        });
        Self { db_path, schema_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_override_wins_over_env_and_default() {
        let cfg = RunConfig::resolve_with_env(
            Some(Path::new("explicit.db")),
            None,
            Some("env.db"),
            None,
        );
        assert_eq!(cfg.db_path, PathBuf::from("explicit.db"));
    }

    #[test]
    fn env_wins_over_default() {
        let cfg = RunConfig::resolve_with_env(None, None, Some("env.db"), Some("env.toml"));
        assert_eq!(cfg.db_path, PathBuf::from("env.db"));
        assert_eq!(cfg.schema_path, PathBuf::from("env.toml"));
    }

    #[test]
    fn falls_back_to_defaults() {
        let cfg = RunConfig::resolve_with_env(None, None, None, None);
        assert_eq!(cfg.db_path, PathBuf::from(DEFAULT_DB_FILENAME));
        assert_eq!(cfg.schema_path, PathBuf::from(DEFAULT_SCHEMA_FILENAME));
    }
}
