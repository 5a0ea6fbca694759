//! Persistence for topology documents.
//!
//! Two entity kinds (nodes, links) behind a uniform [`Repository`]
//! trait. The SQL implementation supports sqlite and postgres, chosen
//! via `DB_DRIVER`; the memory implementation is the fallback when the
//! database cannot be initialized.

mod memory;
mod sql;

use async_trait::async_trait;
use thiserror::Error;

use crate::topology::{Link, Node};

pub use memory::MemoryRepository;
pub use sql::SqlRepository;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store initialization failed (bad driver, unreachable database).
    #[error("store initialization failed: {0}")]
    Init(String),

    /// A query failed after initialization.
    #[error("store query failed: {0}")]
    Query(String),

    /// Internal lock poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Query(err.to_string())
    }
}

/// SQL backend selected by `DB_DRIVER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
    Postgres,
}

/// Store configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub driver: Driver,
    pub dsn: String,
}

impl StoreConfig {
    /// Reads `DB_DRIVER` (default `sqlite`) and `DB_DSN` (default
    /// `openveth.db`) from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported driver name.
    pub fn from_env() -> Result<Self> {
        let driver = std::env::var("DB_DRIVER").unwrap_or_else(|_| "sqlite".to_string());
        let driver = match driver.as_str() {
            "sqlite" => Driver::Sqlite,
            "postgres" => Driver::Postgres,
            other => {
                return Err(StoreError::Init(format!(
                    "unsupported database driver: {other}"
                )))
            }
        };
        let dsn = std::env::var("DB_DSN").unwrap_or_else(|_| "openveth.db".to_string());
        Ok(Self { driver, dsn })
    }

    /// Renders the connection URL for sqlx.
    #[must_use]
    pub fn url(&self) -> String {
        match self.driver {
            Driver::Sqlite => {
                if self.dsn.starts_with("sqlite:") {
                    self.dsn.clone()
                } else {
                    // ?mode=rwc creates the file on first run.
                    format!("sqlite://{}?mode=rwc", self.dsn)
                }
            }
            Driver::Postgres => self.dsn.clone(),
        }
    }
}

/// Uniform CRUD over the two entity kinds.
///
/// Implementations must serialize mutating operations; `clear_all`
/// removes every row of both kinds atomically.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn save_node(&self, node: &Node) -> Result<()>;
    async fn get_node(&self, id: &str) -> Result<Option<Node>>;
    async fn delete_node(&self, id: &str) -> Result<bool>;
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    async fn save_link(&self, link: &Link) -> Result<()>;
    async fn get_link(&self, id: &str) -> Result<Option<Link>>;
    async fn delete_link(&self, id: &str) -> Result<bool>;
    async fn list_links(&self) -> Result<Vec<Link>>;

    async fn clear_all(&self) -> Result<()>;
}
