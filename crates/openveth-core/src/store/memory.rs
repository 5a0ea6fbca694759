//! In-memory repository.
//!
//! Fallback store used when the database cannot be initialized. A
//! single readers-writer lock guards both maps, so mutating operations
//! are serialized and `clear_all` is atomic.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{Repository, Result, StoreError};
use crate::topology::{Link, Node};

#[derive(Default)]
struct Tables {
    nodes: HashMap<String, Node>,
    links: HashMap<String, Link>,
}

/// Process-local repository.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn save_node(&self, node: &Node) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        tables.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.nodes.get(id).cloned())
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.nodes.remove(id).is_some())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.nodes.values().cloned().collect())
    }

    async fn save_link(&self, link: &Link) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        tables.links.insert(link.id.clone(), link.clone());
        Ok(())
    }

    async fn get_link(&self, id: &str) -> Result<Option<Link>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.links.get(id).cloned())
    }

    async fn delete_link(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.links.remove(id).is_some())
    }

    async fn list_links(&self) -> Result<Vec<Link>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.links.values().cloned().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        tables.nodes.clear();
        tables.links.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            name: format!("name-{id}"),
            image: "alpine:latest".to_string(),
            ..Default::default()
        }
    }

    fn link(id: &str) -> Link {
        Link {
            id: id.to_string(),
            source_id: "a".to_string(),
            target_id: "b".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn save_and_get_node() {
        let repo = MemoryRepository::new();
        repo.save_node(&node("n1")).await.unwrap();

        let found = repo.get_node("n1").await.unwrap().unwrap();
        assert_eq!(found.name, "name-n1");
        assert!(repo.get_node("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_existing_node() {
        let repo = MemoryRepository::new();
        repo.save_node(&node("n1")).await.unwrap();

        let mut updated = node("n1");
        updated.container_id = "abc123".to_string();
        updated.pid = 4242;
        repo.save_node(&updated).await.unwrap();

        let found = repo.get_node("n1").await.unwrap().unwrap();
        assert_eq!(found.pid, 4242);
        assert_eq!(repo.list_nodes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_node_reports_presence() {
        let repo = MemoryRepository::new();
        repo.save_node(&node("n1")).await.unwrap();

        assert!(repo.delete_node("n1").await.unwrap());
        assert!(!repo.delete_node("n1").await.unwrap());
    }

    #[tokio::test]
    async fn clear_all_empties_both_tables() {
        let repo = MemoryRepository::new();
        repo.save_node(&node("n1")).await.unwrap();
        repo.save_node(&node("n2")).await.unwrap();
        repo.save_link(&link("l1")).await.unwrap();

        repo.clear_all().await.unwrap();

        assert!(repo.list_nodes().await.unwrap().is_empty());
        assert!(repo.list_links().await.unwrap().is_empty());
    }
}
