//! # Ledger Configuration
//!
//! Settings for the store connection and the stock coordinator.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKLINE_DB_PATH=/var/lib/stockline/ledger.db                     │
//! │     STOCKLINE_LOCK_TIMEOUT_MS=2000                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     passed explicitly to LedgerConfig::load()                          │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     ./stockline.db, 5 s lock timeout, "INV" prefix                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # stockline.toml
//! [database]
//! path = "./stockline.db"
//! max_connections = 5
//! min_connections = 1
//! connect_timeout_secs = 30
//!
//! [engine]
//! lock_timeout_ms = 5000
//! invoice_prefix = "INV"
//! default_low_stock_threshold = 5   # used when an item has none
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use stockline_core::validation::validate_scope_key;
use stockline_core::DEFAULT_INVOICE_PREFIX;

use crate::coordinator::CoordinatorSettings;
use crate::pool::DbConfig;

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

/// Where and how to connect to the SQLite store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite file (`:memory:` for an in-memory store).
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for the initial connection (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("stockline.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Engine Settings
// =============================================================================

/// Coordinator behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Longest an operation waits for its account locks (milliseconds).
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    /// Prefix of invoice numbers and their sequence scopes.
    #[serde(default = "default_invoice_prefix")]
    pub invoice_prefix: String,

    /// Threshold applied to catalog items that do not define their own.
    #[serde(default)]
    pub default_low_stock_threshold: Option<i64>,
}

fn default_lock_timeout() -> u64 {
    5_000
}

fn default_invoice_prefix() -> String {
    DEFAULT_INVOICE_PREFIX.to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            lock_timeout_ms: default_lock_timeout(),
            invoice_prefix: default_invoice_prefix(),
            default_low_stock_threshold: None,
        }
    }
}

// =============================================================================
// Ledger Configuration
// =============================================================================

/// Complete configuration of a ledger deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub engine: EngineSettings,
}

impl LedgerConfig {
    /// Loads configuration from an optional TOML file, then applies
    /// `STOCKLINE_*` environment overrides and validates the result.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match config_path {
            Some(path) if path.exists() => {
                info!(?path, "Loading ledger config from file");
                Self::from_toml_str(&std::fs::read_to_string(path)?)?
            }
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing sections fall back to defaults.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies overrides from a key lookup (the process environment in
    /// [`LedgerConfig::load`]).
    ///
    /// ## Recognised Keys
    /// ```text
    /// STOCKLINE_DB_PATH                    database.path
    /// STOCKLINE_DB_MAX_CONNECTIONS         database.max_connections
    /// STOCKLINE_LOCK_TIMEOUT_MS            engine.lock_timeout_ms
    /// STOCKLINE_INVOICE_PREFIX             engine.invoice_prefix
    /// STOCKLINE_LOW_STOCK_THRESHOLD        engine.default_low_stock_threshold
    /// ```
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("STOCKLINE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("STOCKLINE_DB_MAX_CONNECTIONS") {
            self.database.max_connections = parse_override("STOCKLINE_DB_MAX_CONNECTIONS", &max)?;
        }

        if let Some(timeout) = lookup("STOCKLINE_LOCK_TIMEOUT_MS") {
            self.engine.lock_timeout_ms = parse_override("STOCKLINE_LOCK_TIMEOUT_MS", &timeout)?;
        }

        if let Some(prefix) = lookup("STOCKLINE_INVOICE_PREFIX") {
            self.engine.invoice_prefix = prefix;
        }

        if let Some(threshold) = lookup("STOCKLINE_LOW_STOCK_THRESHOLD") {
            self.engine.default_low_stock_threshold =
                Some(parse_override("STOCKLINE_LOW_STOCK_THRESHOLD", &threshold)?);
        }

        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "database.min_connections must not exceed max_connections".into(),
            ));
        }

        if self.engine.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.lock_timeout_ms must be greater than 0".into(),
            ));
        }

        // Invoice scope keys are "<prefix>-<year>".
        validate_scope_key(&self.engine.invoice_prefix)
            .map_err(|e| ConfigError::Invalid(format!("engine.invoice_prefix: {e}")))?;

        if matches!(self.engine.default_low_stock_threshold, Some(t) if t < 0) {
            return Err(ConfigError::Invalid(
                "engine.default_low_stock_threshold must not be negative".into(),
            ));
        }

        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.lock_timeout_ms)
    }

    /// Pool configuration. SQLite's busy_timeout follows the lock timeout so
    /// a blocked writer gives up at the same time the coordinator would.
    pub fn db_config(&self) -> DbConfig {
        let base = if self.database.path == Path::new(":memory:") {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database.path)
                .max_connections(self.database.max_connections)
                .min_connections(self.database.min_connections)
        };

        base.connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(self.lock_timeout())
    }

    /// Coordinator settings derived from the engine section.
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            lock_timeout: self.lock_timeout(),
            invoice_prefix: self.engine.invoice_prefix.clone(),
            default_low_stock_threshold: self.engine.default_low_stock_threshold,
        }
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}: cannot parse '{value}'")))
}
