//! SQL repository over sqlite or postgres.
//!
//! Uses the sqlx `Any` driver so the backend is selected at startup by
//! `DB_DRIVER`. Placeholder syntax differs between the two engines
//! (`?` vs `$n`), so statements are rendered per driver.

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};

use super::{Driver, Repository, Result, StoreConfig, StoreError};
use crate::topology::{Link, Node, NodeType};

const CREATE_NODES: &str = "CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    node_type TEXT NOT NULL,
    image TEXT NOT NULL,
    cpu_request TEXT NOT NULL,
    ram_limit TEXT NOT NULL,
    x DOUBLE PRECISION NOT NULL,
    y DOUBLE PRECISION NOT NULL,
    container_id TEXT NOT NULL,
    pid BIGINT NOT NULL
)";

const CREATE_LINKS: &str = "CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    source_int TEXT NOT NULL,
    target_int TEXT NOT NULL
)";

/// Repository backed by a relational database.
pub struct SqlRepository {
    pool: AnyPool,
    driver: Driver,
}

impl SqlRepository {
    /// Connects and runs table migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Init`] if the database is unreachable or
    /// migration fails; the caller is expected to fall back to the
    /// memory store.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect(&config.url())
            .await
            .map_err(|e| StoreError::Init(format!("failed to connect to database: {e}")))?;

        let repo = Self {
            pool,
            driver: config.driver,
        };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<()> {
        for ddl in [CREATE_NODES, CREATE_LINKS] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Init(format!("failed to migrate database: {e}")))?;
        }
        Ok(())
    }

    fn ph(&self, i: usize) -> String {
        match self.driver {
            Driver::Sqlite => "?".to_string(),
            Driver::Postgres => format!("${i}"),
        }
    }

    fn placeholders(&self, n: usize) -> String {
        (1..=n).map(|i| self.ph(i)).collect::<Vec<_>>().join(", ")
    }
}

fn node_from_row(row: &AnyRow) -> Result<Node> {
    let node_type: String = row.try_get("node_type")?;
    Ok(Node {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        node_type: NodeType::from_wire(&node_type),
        image: row.try_get("image")?,
        cpu_request: row.try_get("cpu_request")?,
        ram_limit: row.try_get("ram_limit")?,
        x: row.try_get("x")?,
        y: row.try_get("y")?,
        container_id: row.try_get("container_id")?,
        pid: row.try_get("pid")?,
        interfaces: Vec::new(),
    })
}

fn link_from_row(row: &AnyRow) -> Result<Link> {
    Ok(Link {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        target_id: row.try_get("target_id")?,
        source_int: row.try_get("source_int")?,
        target_int: row.try_get("target_int")?,
    })
}

#[async_trait]
impl Repository for SqlRepository {
    async fn save_node(&self, node: &Node) -> Result<()> {
        let sql = format!(
            "INSERT INTO nodes \
             (id, name, node_type, image, cpu_request, ram_limit, x, y, container_id, pid) \
             VALUES ({}) \
             ON CONFLICT (id) DO UPDATE SET \
             name = excluded.name, node_type = excluded.node_type, \
             image = excluded.image, cpu_request = excluded.cpu_request, \
             ram_limit = excluded.ram_limit, x = excluded.x, y = excluded.y, \
             container_id = excluded.container_id, pid = excluded.pid",
            self.placeholders(10)
        );
        sqlx::query(&sql)
            .bind(&node.id)
            .bind(&node.name)
            .bind(node.node_type.as_str())
            .bind(&node.image)
            .bind(&node.cpu_request)
            .bind(&node.ram_limit)
            .bind(node.x)
            .bind(node.y)
            .bind(&node.container_id)
            .bind(node.pid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let sql = format!("SELECT * FROM nodes WHERE id = {}", self.ph(1));
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(node_from_row).transpose()
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM nodes WHERE id = {}", self.ph(1));
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let rows = sqlx::query("SELECT * FROM nodes")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(node_from_row).collect()
    }

    async fn save_link(&self, link: &Link) -> Result<()> {
        let sql = format!(
            "INSERT INTO links (id, source_id, target_id, source_int, target_int) \
             VALUES ({}) \
             ON CONFLICT (id) DO UPDATE SET \
             source_id = excluded.source_id, target_id = excluded.target_id, \
             source_int = excluded.source_int, target_int = excluded.target_int",
            self.placeholders(5)
        );
        sqlx::query(&sql)
            .bind(&link.id)
            .bind(&link.source_id)
            .bind(&link.target_id)
            .bind(&link.source_int)
            .bind(&link.target_int)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_link(&self, id: &str) -> Result<Option<Link>> {
        let sql = format!("SELECT * FROM links WHERE id = {}", self.ph(1));
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(link_from_row).transpose()
    }

    async fn delete_link(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM links WHERE id = {}", self.ph(1));
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_links(&self) -> Result<Vec<Link>> {
        let rows = sqlx::query("SELECT * FROM links")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(link_from_row).collect()
    }

    async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM nodes").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM links").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_repo(dir: &tempfile::TempDir) -> SqlRepository {
        let config = StoreConfig {
            driver: Driver::Sqlite,
            dsn: dir.path().join("openveth.db").display().to_string(),
        };
        SqlRepository::connect(&config).await.unwrap()
    }

    fn node(id: &str, pid: i64) -> Node {
        Node {
            id: id.to_string(),
            name: format!("name-{id}"),
            node_type: NodeType::Router,
            image: "alpine:latest".to_string(),
            pid,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = temp_repo(&dir).await;

        repo.save_node(&node("n1", 0)).await.unwrap();
        let found = repo.get_node("n1").await.unwrap().unwrap();
        assert_eq!(found.node_type, NodeType::Router);
        assert_eq!(found.image, "alpine:latest");
    }

    #[tokio::test]
    async fn sqlite_upsert_updates_runtime_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = temp_repo(&dir).await;

        repo.save_node(&node("n1", 0)).await.unwrap();
        repo.save_node(&node("n1", 123)).await.unwrap();

        assert_eq!(repo.list_nodes().await.unwrap().len(), 1);
        assert_eq!(repo.get_node("n1").await.unwrap().unwrap().pid, 123);
    }

    #[tokio::test]
    async fn sqlite_clear_all_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let repo = temp_repo(&dir).await;

        repo.save_node(&node("n1", 0)).await.unwrap();
        repo.save_link(&Link {
            id: "l1".to_string(),
            source_id: "n1".to_string(),
            target_id: "n2".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        repo.clear_all().await.unwrap();
        assert!(repo.list_nodes().await.unwrap().is_empty());
        assert!(repo.list_links().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = temp_repo(&dir).await;

        repo.save_link(&Link {
            id: "l1".to_string(),
            source_id: "a".to_string(),
            target_id: "b".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        assert!(repo.delete_link("l1").await.unwrap());
        assert!(!repo.delete_link("l1").await.unwrap());
    }
}
