//! Database drivers.
#[cfg(any(feature = "pg", feature = "mysql"))]
pub mod server;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::fmt::Debug;
use std::fmt::Display;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use sea_orm::DbErr;
use serde::Deserialize;
use serde::Serialize;

/// Kind of a network database server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    MySql,
    Postgres,
}

impl Backend {
    pub fn scheme(&self) -> &'static str {
        match self {
            Backend::MySql => "mysql",
            Backend::Postgres => "postgres",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Backend::MySql => 3306,
            Backend::Postgres => 5432,
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

/// A configured connection to one of the supported backends.
#[async_trait]
pub trait DatabaseDriver: Debug + Sync + Send + 'static {
    /// Return driver name.
    fn name(&self) -> &'static str;
    fn connection(&self) -> DatabaseConnection;
    /// Per-backend session setup. Safe to call more than once.
    async fn configure(&self) -> Result<(), DbErr>;
}
