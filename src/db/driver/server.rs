use std::time::Duration;

use async_trait::async_trait;
use fieldx::fxstruct;
use sea_orm::ConnectOptions;
use sea_orm::DatabaseConnection;
use sea_orm::DbErr;
use tracing::error;

use super::Backend;
use super::DatabaseDriver;

/// A database server reached over the network: PostgreSQL or MySQL.
#[derive(Debug)]
#[fxstruct(sync, rc, no_new, builder)]
pub struct Server {
    #[fieldx(get(copy))]
    backend:  Backend,
    host:     String,
    port:     u16,
    user:     String,
    password: String,
    database: String,
    #[fieldx(get(copy), default(16))]
    max_connections: u32,
    #[fieldx(inner_mut, get(off), set, builder(off))]
    connection: DatabaseConnection,
}

impl Server {
    fn url(&self) -> String {
        let url = format!(
            "{}://{}:{}@{}:{}/{}",
            self.backend.scheme(),
            self.user,
            self.password,
            self.host,
            self.port,
            self.database
        );
        match self.backend {
            Backend::MySql => url + "?charset=utf8mb4",
            Backend::Postgres => url,
        }
    }

    pub async fn connect(&self) -> Result<(), DbErr> {
        let mut opts = ConnectOptions::new(self.url());
        opts.max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(20))
            .max_lifetime(Duration::from_secs(60))
            .test_before_acquire(true);

        self.set_connection(sea_orm::Database::connect(opts).await.inspect_err(|e| {
            error!(
                "Error connecting to {} database {} at {}:{}: {e}",
                self.backend, self.database, self.host, self.port
            )
        })?);

        Ok(())
    }
}

#[async_trait]
impl DatabaseDriver for Server {
    fn name(&self) -> &'static str {
        self.backend.scheme()
    }

    fn connection(&self) -> DatabaseConnection {
        self.connection.read().clone()
    }

    async fn configure(&self) -> Result<(), DbErr> {
        self.connection().ping().await
    }
}
