use std::path::PathBuf;

use anyhow::{Context, Result};

pub const ENV_DB: &str = "EKKLESIA_DB";
pub const ENV_LOG: &str = "EKKLESIA_LOG";
pub const ENV_LOG_JSON: &str = "EKKLESIA_LOG_JSON";
pub const ENV_LOG_DIR: &str = "EKKLESIA_LOG_DIR";

pub const DEFAULT_LOG_FILTER: &str = "ekklesia=info,sqlx=warn";
const APP_DIR: &str = "ekklesia";
const DB_FILE: &str = "ekklesia.sqlite3";

/// Runtime settings: defaults, then environment, then CLI overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_filter: String,
    pub log_json: bool,
    /// Directory for the rolling log file; stderr only when `None`.
    pub log_dir: Option<PathBuf>,
}

fn flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn default_db_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("resolve platform data directory")?;
    Ok(base.join(APP_DIR).join(DB_FILE))
}

impl Config {
    /// Build from an arbitrary variable source so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };
        Ok(Config {
            db_path,
            log_filter: lookup(ENV_LOG)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            log_json: lookup(ENV_LOG_JSON).map(|v| flag(&v)).unwrap_or(false),
            log_dir: lookup(ENV_LOG_DIR)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, db: Option<PathBuf>, log_json: bool) -> Self {
        if let Some(db) = db {
            self.db_path = db;
        }
        if log_json {
            self.log_json = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn environment_values_are_used() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_DB, "/tmp/church.sqlite3"),
            (ENV_LOG, "debug"),
            (ENV_LOG_JSON, "true"),
            (ENV_LOG_DIR, "/tmp/logs"),
        ]))
        .unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/church.sqlite3"));
        assert_eq!(cfg.log_filter, "debug");
        assert!(cfg.log_json);
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/tmp/logs")));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_DB, "/tmp/x.sqlite3"),
            (ENV_LOG, "  "),
            (ENV_LOG_JSON, "no"),
        ]))
        .unwrap();
        assert_eq!(cfg.log_filter, DEFAULT_LOG_FILTER);
        assert!(!cfg.log_json);
        assert!(cfg.log_dir.is_none());
    }

    #[test]
    fn cli_overrides_win() {
        let cfg = Config::from_lookup(lookup(&[(ENV_DB, "/tmp/env.sqlite3")]))
            .unwrap()
            .with_overrides(Some(PathBuf::from("/tmp/cli.sqlite3")), true);
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/cli.sqlite3"));
        assert!(cfg.log_json);
    }
}
