//! Service configuration.
//!
//! Resolution order, highest first: command-line flag, environment variable,
//! TOML config file, compiled default.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::batcher::FieldMap;
use crate::error::{Result, SyncError};

/// Upper bound for `api.max_retries`.
pub const MAX_API_RETRIES: u32 = 10;

/// Command-line arguments.
#[derive(Parser, Debug, Default)]
#[command(name = "catalog-translate-sync")]
#[command(about = "Drains the translation queue into the catalog via a cached batch translator")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "TRANSLATE_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Check interval in seconds
    #[arg(short, long, env = "TRANSLATE_SYNC_INTERVAL")]
    pub interval: Option<u64>,

    /// Queue items processed per cycle
    #[arg(short, long, env = "TRANSLATE_SYNC_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Source field to translate (repeatable, order is kept)
    #[arg(long = "field")]
    pub fields: Vec<String>,

    /// SQLite database holding queue, catalog and cache
    #[arg(long, env = "TRANSLATE_SYNC_DB")]
    pub db: Option<PathBuf>,

    /// Translation API base URL
    #[arg(long, env = "DEEPSEEK_BASE_URL")]
    pub api_base: Option<String>,

    /// Show statistics and exit
    #[arg(long)]
    pub show_stats: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "TRANSLATE_SYNC_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub check_interval_secs: u64,
    pub batch_size: usize,
    /// Ordered source fields eligible for translation.
    pub fields: Vec<String>,
    /// Appended to a source field name to form its target field.
    pub target_suffix: String,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval_secs: 10,
            batch_size: 20,
            fields: vec!["name".into(), "description".into()],
            target_suffix: "CN".into(),
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("catalog.sqlite3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub timeout_secs: u64,
    /// Extra attempts after a 429/5xx/timeout.
    pub max_retries: u32,
    pub source_language: String,
    pub target_language: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".into(),
            model: "deepseek-chat".into(),
            temperature: 1.3,
            timeout_secs: 60,
            max_retries: 2,
            source_language: "Japanese".into(),
            target_language: "Chinese".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries held in the in-memory front of the translation cache.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 1024,
        }
    }
}

impl Config {
    /// Defaults, overlaid with the TOML file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    SyncError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Load the file named by `cli`, apply its overrides and validate.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = Self::load(cli.config.as_deref())?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(interval) = cli.interval {
            self.check_interval_secs = interval;
        }
        if let Some(batch_size) = cli.batch_size {
            self.batch_size = batch_size;
        }
        if !cli.fields.is_empty() {
            self.fields = cli.fields.clone();
        }
        if let Some(db) = &cli.db {
            self.database.path = db.clone();
        }
        if let Some(base) = &cli.api_base {
            self.api.base_url = base.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 {
            return Err(SyncError::Config("check interval must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch size must be > 0".into()));
        }
        if self.fields.is_empty() {
            return Err(SyncError::Config("at least one field to translate is required".into()));
        }
        if self.target_suffix.is_empty() {
            return Err(SyncError::Config("target suffix must not be empty".into()));
        }
        if self.api.timeout_secs == 0 {
            return Err(SyncError::Config("API timeout must be > 0".into()));
        }
        if self.api.max_retries > MAX_API_RETRIES {
            return Err(SyncError::Config(format!(
                "API max retries must be <= {MAX_API_RETRIES}"
            )));
        }
        if self.target_suffix.contains('"') {
            return Err(SyncError::Config("target suffix must not contain '\"'".into()));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.trim().is_empty() {
                return Err(SyncError::Config("field names must not be empty".into()));
            }
            // written back through a quoted JSON path label, which has no escapes
            if field.contains('"') {
                return Err(SyncError::Config(format!(
                    "field name must not contain '\"': {field}"
                )));
            }
            if !seen.insert(field.as_str()) {
                return Err(SyncError::Config(format!("duplicate field: {field}")));
            }
        }
        for field in &self.fields {
            let target = format!("{field}{}", self.target_suffix);
            if seen.contains(target.as_str()) {
                return Err(SyncError::Config(format!(
                    "target field {target} collides with a source field"
                )));
            }
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn field_map(&self) -> FieldMap {
        FieldMap::with_suffix(&self.fields, &self.target_suffix)
    }
}
