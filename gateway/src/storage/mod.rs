use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub mod io;
pub mod json_kv;

pub use json_kv::{JsonKvStorage, JsonKvStorageConfig};

/// Key-value record store consumed by services.
#[async_trait]
pub trait KvStorage: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn finalize(&self) -> Result<()>;

    async fn upsert(&self, records: HashMap<String, Value>) -> Result<()>;
    async fn delete(&self, ids: &[String]) -> Result<bool>;

    async fn keys(&self) -> Result<Vec<String>>;
    async fn get_by_id(&self, id: &str) -> Result<Option<Value>>;

    /// Write pending changes to disk, if any.
    async fn sync_if_dirty(&self) -> Result<()>;
}
