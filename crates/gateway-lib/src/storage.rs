// ============================
// crates/gateway-lib/src/storage.rs
// ============================
//! Storage abstraction with flat-file implementation.
//!
//! Durable state is small: a registry of known problems and, per room,
//! the list of problem ids currently on its curriculum. Layout under
//! the data root:
//!
//!   problems/{id}.json          one ProblemRecord per known problem
//!   rooms/{room}/problems.json  JSON array of associated problem ids
use std::{
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs as tokio_fs;

use crate::error::GatewayError;

/// A problem known to the gateway.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProblemRecord {
    pub external_id: i64,
    pub title: String,
}

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Look up a problem by its external id.
    async fn find_problem(&self, problem_id: i64) -> Result<Option<ProblemRecord>, GatewayError>;

    /// Persist a problem record, overwriting any previous one.
    async fn create_problem(&self, record: &ProblemRecord) -> Result<(), GatewayError>;

    /// Whether `problem_id` is already on `room`'s curriculum.
    async fn association_exists(&self, room: &str, problem_id: i64) -> Result<bool, GatewayError>;

    /// Add `problem_id` to `room`'s curriculum (idempotent).
    async fn create_association(&self, room: &str, problem_id: i64) -> Result<(), GatewayError>;

    /// Remove `problem_id` from `room`'s curriculum. Returns whether
    /// an association was actually removed.
    async fn delete_association(&self, room: &str, problem_id: i64) -> Result<bool, GatewayError>;

    /// All problem ids on `room`'s curriculum, in insertion order.
    async fn list_associations(&self, room: &str) -> Result<Vec<i64>, GatewayError>;
}

/// Flat-file implementation of the Storage trait
#[derive(Clone)]
pub struct FlatFileStorage {
    root: PathBuf,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("problems"))?;
        fs::create_dir_all(root.join("rooms"))?;
        Ok(Self { root })
    }

    fn problem_path(&self, problem_id: i64) -> PathBuf {
        self.root.join("problems").join(format!("{problem_id}.json"))
    }

    fn associations_path(&self, room: &str) -> PathBuf {
        self.root.join("rooms").join(room).join("problems.json")
    }

    async fn read_associations(&self, room: &str) -> Result<Vec<i64>, GatewayError> {
        let path = self.associations_path(room);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio_fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_associations(&self, room: &str, ids: &[i64]) -> Result<(), GatewayError> {
        let path = self.associations_path(room);
        tokio_fs::create_dir_all(self.root.join("rooms").join(room)).await?;
        let json = serde_json::to_string_pretty(ids)?;
        tokio_fs::write(path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FlatFileStorage {
    async fn find_problem(&self, problem_id: i64) -> Result<Option<ProblemRecord>, GatewayError> {
        let path = self.problem_path(problem_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio_fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn create_problem(&self, record: &ProblemRecord) -> Result<(), GatewayError> {
        let path = self.problem_path(record.external_id);
        let json = serde_json::to_string_pretty(record)?;
        tokio_fs::write(path, json).await?;
        Ok(())
    }

    async fn association_exists(&self, room: &str, problem_id: i64) -> Result<bool, GatewayError> {
        Ok(self.read_associations(room).await?.contains(&problem_id))
    }

    async fn create_association(&self, room: &str, problem_id: i64) -> Result<(), GatewayError> {
        let mut ids = self.read_associations(room).await?;
        if !ids.contains(&problem_id) {
            ids.push(problem_id);
            self.write_associations(room, &ids).await?;
        }
        Ok(())
    }

    async fn delete_association(&self, room: &str, problem_id: i64) -> Result<bool, GatewayError> {
        let mut ids = self.read_associations(room).await?;
        let before = ids.len();
        ids.retain(|id| *id != problem_id);
        if ids.len() == before {
            return Ok(false);
        }
        self.write_associations(room, &ids).await?;
        Ok(true)
    }

    async fn list_associations(&self, room: &str) -> Result<Vec<i64>, GatewayError> {
        self.read_associations(room).await
    }
}
