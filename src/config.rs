//! Service configuration file.
//!
//! The file is JSON and carries the database connection parameters:
//!
//! ```json
//! { "database": { "dbname": "notes", "host": "localhost", "port": 3306, "username": "notes", "password": "" } }
//! ```
//!
//! A `backend` key (`"mysql"` or `"postgres"`) may be added to the `database` object; MySQL is assumed otherwise.
//! Which file is read is decided by the environment name: `<config dir>/<env>.json`.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::db::driver::Backend;

pub const DEFAULT_ENV: &str = "local";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {}: {source}", path.display())]
    Parse {
        path:   PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend:  Backend,
    pub dbname:   String,
    pub host:     String,
    pub port:     Option<u16>,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl DatabaseConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.backend.default_port())
    }
}

impl Config {
    /// Path of the config file for environment `env`.
    pub fn env_path(config_dir: &Path, env: &str) -> PathBuf {
        let env = if env.is_empty() { DEFAULT_ENV } else { env };
        config_dir.join(format!("{env}.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("loading config file: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}
