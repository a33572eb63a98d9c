//! Configuration management for testbench-db.
//!
//! Handles loading configuration from TOML files and environment variables.
//! The connection section doubles as the credentials provider: it supplies the
//! user, password, and DSN handed to the database client.

use crate::db::DatabaseBackend;
use crate::error::{Result, TestbenchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Environment variable overriding the DSN.
pub const ENV_DSN: &str = "TESTBENCH_DSN";
/// Environment variable overriding the user.
pub const ENV_USER: &str = "TESTBENCH_USER";
/// Environment variable overriding the password.
pub const ENV_PASSWORD: &str = "TESTBENCH_PASSWORD";
/// Environment variable overriding the autocommit-after-write toggle.
pub const ENV_AUTOCOMMIT: &str = "TESTBENCH_AUTOCOMMIT";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database connection and credentials.
    #[serde(default)]
    pub database: ConnectionConfig,

    /// Client behaviour passed into connection construction.
    #[serde(default)]
    pub client: ClientOptions,
}

/// Options that shape how a client executes and decodes statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Commit after every successful write statement.
    #[serde(default = "default_true")]
    pub autocommit_after_write: bool,

    /// Decode text cells holding a JSON object or array into documents.
    #[serde(default = "default_true")]
    pub decode_json_text: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            autocommit_after_write: true,
            decode_json_text: true,
        }
    }
}

impl ClientOptions {
    /// Applies `TESTBENCH_AUTOCOMMIT` using the given variable lookup.
    pub fn apply_env_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_AUTOCOMMIT) {
            match parse_bool(&raw) {
                Some(flag) => self.autocommit_after_write = flag,
                None => tracing::warn!("Ignoring {ENV_AUTOCOMMIT}={raw}: expected a boolean"),
            }
        }
    }

    /// Applies environment overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Data source name, e.g. `postgres://host:5432/bench` or `sqlite://bench.db`.
    pub dsn: Option<String>,

    /// Database user.
    pub user: Option<String>,

    /// Database password (prefer the environment over the config file).
    pub password: Option<String>,
}

impl ConnectionConfig {
    /// Creates a config for the given DSN with no separate credentials.
    pub fn from_dsn(dsn: impl Into<String>) -> Self {
        Self {
            dsn: Some(dsn.into()),
            ..Default::default()
        }
    }

    fn require_dsn(&self) -> Result<&str> {
        self.dsn
            .as_deref()
            .filter(|dsn| !dsn.trim().is_empty())
            .ok_or_else(|| TestbenchError::config("A database DSN is required"))
    }

    /// Determines the backend from the DSN scheme.
    pub fn backend(&self) -> Result<DatabaseBackend> {
        let dsn = self.require_dsn()?;
        let scheme = dsn
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| TestbenchError::config(format!("DSN '{dsn}' has no scheme")))?;

        DatabaseBackend::parse(scheme).ok_or_else(|| {
            TestbenchError::config(format!(
                "Invalid scheme '{scheme}'. Expected 'postgres', 'postgresql' or 'sqlite'"
            ))
        })
    }

    /// Builds the connection string handed to the driver.
    ///
    /// For PostgreSQL the configured user and password replace any credentials
    /// embedded in the DSN. SQLite DSNs are passed through unchanged.
    pub fn to_connection_string(&self) -> Result<String> {
        let dsn = self.require_dsn()?;

        match self.backend()? {
            DatabaseBackend::Sqlite => Ok(dsn.to_string()),
            DatabaseBackend::Postgres => {
                let mut url = Url::parse(dsn)
                    .map_err(|e| TestbenchError::config(format!("Invalid DSN: {e}")))?;

                if let Some(user) = &self.user {
                    url.set_username(user)
                        .map_err(|_| TestbenchError::config("DSN cannot carry a user name"))?;
                }
                if let Some(password) = &self.password {
                    url.set_password(Some(password))
                        .map_err(|_| TestbenchError::config("DSN cannot carry a password"))?;
                }

                Ok(url.to_string())
            }
        }
    }

    /// Merges another config into this one, with the other taking precedence.
    pub fn merge(&mut self, other: &ConnectionConfig) {
        if other.dsn.is_some() {
            self.dsn = other.dsn.clone();
        }
        if other.user.is_some() {
            self.user = other.user.clone();
        }
        if other.password.is_some() {
            self.password = other.password.clone();
        }
    }

    /// Applies `TESTBENCH_DSN`, `TESTBENCH_USER` and `TESTBENCH_PASSWORD` using the given lookup.
    pub fn apply_env_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let env = ConnectionConfig {
            dsn: lookup(ENV_DSN),
            user: lookup(ENV_USER),
            password: lookup(ENV_PASSWORD),
        };
        self.merge(&env);
    }

    /// Applies environment overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Returns a display-safe string (no password) for log output.
    pub fn display_string(&self) -> String {
        let Some(dsn) = self.dsn.as_deref() else {
            return "<no dsn>".to_string();
        };

        let location = match Url::parse(dsn) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(None);
                url.to_string()
            }
            _ => dsn.to_string(),
        };

        match &self.user {
            Some(user) => format!("{location} as {user}"),
            None => location,
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("testbench-db")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| TestbenchError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            TestbenchError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies environment overrides to both sections.
    pub fn apply_env_overrides(&mut self) {
        self.database.apply_env_overrides();
        self.client.apply_env_overrides();
    }
}
