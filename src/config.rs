// ⚙️ Configuration - shared CLI/env settings and logging setup

use crate::db::SqliteStore;
use crate::rules::{RuleSet, ValidationRules};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "record_import=info";

/// Database and rule-table locations, shared by every command
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// SQLite database file (created on first use)
    #[arg(long, env = "RECORD_IMPORT_DB", default_value = "records.db")]
    pub database: PathBuf,

    /// JSON file replacing the built-in validation rules
    #[arg(long, env = "RECORD_IMPORT_RULES")]
    pub rules: Option<PathBuf>,
}

impl StoreArgs {
    pub fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.database)
            .with_context(|| format!("Failed to open database {:?}", self.database))
    }

    pub fn load_rules(&self) -> Result<RuleSet> {
        let rules = match &self.rules {
            Some(path) => {
                info!(path = %path.display(), "loading validation rules");
                ValidationRules::from_file(path)?
            }
            None => ValidationRules::default(),
        };
        RuleSet::compile(&rules).context("Invalid validation rules")
    }
}

/// RUST_LOG wins; otherwise `default_filter`
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        store: StoreArgs,
    }

    #[test]
    fn test_store_args_from_flags() {
        let cli = Cli::parse_from(["test", "--database", "/tmp/x.db"]);
        assert_eq!(cli.store.database, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_rules_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let mut rules = ValidationRules::default();
        rules.blank_sentinel = "choose".to_string();
        std::fs::write(&path, serde_json::to_string(&rules).unwrap()).unwrap();

        let args = StoreArgs {
            database: dir.path().join("records.db"),
            rules: Some(path),
        };
        let compiled = args.load_rules().unwrap();
        assert!(compiled.is_blank_choice(Some("Choose")));
        assert!(!compiled.is_blank_choice(Some("Select")));

        let store = args.open_store().unwrap();
        assert_eq!(store.record_count().unwrap(), 0);
    }
}
