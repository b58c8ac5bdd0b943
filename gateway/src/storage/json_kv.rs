use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    KvStorage,
    io::{ensure_parent_dir, load_or_default, write_json_file},
};

#[derive(Clone, Debug)]
pub struct JsonKvStorageConfig {
    pub working_dir: PathBuf,
    pub namespace: String,
    pub workspace: Option<String>,
}

/// A JSON file holding one object per key, kept in memory between flushes.
///
/// Every stored record carries `_id`, `create_time` and `update_time`
/// (unix seconds).
pub struct JsonKvStorage {
    final_namespace: String,
    file_path: PathBuf,
    data: RwLock<HashMap<String, Value>>,
    dirty: AtomicBool,
}

impl JsonKvStorage {
    pub fn new(config: JsonKvStorageConfig) -> Self {
        let JsonKvStorageConfig {
            working_dir,
            namespace,
            workspace,
        } = config;

        let (prefix, dir) = match workspace.as_deref() {
            Some(ws) if !ws.is_empty() => (ws.to_string(), working_dir.join(ws)),
            _ => ("_".to_string(), working_dir),
        };

        Self {
            final_namespace: format!("{prefix}_{namespace}"),
            file_path: dir.join(format!("kv_store_{namespace}.json")),
            data: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn stamp(key: &str, value: Value, previous: Option<&Value>) -> Value {
        let mut record = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };

        let now = Value::Number(Number::from(chrono::Utc::now().timestamp()));
        let created = record
            .get("create_time")
            .or_else(|| previous.and_then(|prev| prev.get("create_time")))
            .cloned()
            .unwrap_or_else(|| now.clone());
        record.insert("create_time".into(), created);
        record.insert("update_time".into(), now);
        record.insert("_id".into(), Value::String(key.to_string()));
        Value::Object(record)
    }
}

#[async_trait]
impl KvStorage for JsonKvStorage {
    async fn initialize(&self) -> Result<()> {
        ensure_parent_dir(&self.file_path).await?;
        let data: HashMap<String, Value> = load_or_default(&self.file_path)
            .await
            .with_context(|| format!("failed to open kv store {}", self.final_namespace))?;
        debug!(namespace = %self.final_namespace, records = data.len(), "kv store opened");
        *self.data.write().await = data;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn finalize(&self) -> Result<()> {
        self.sync_if_dirty().await
    }

    async fn upsert(&self, records: HashMap<String, Value>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut guard = self.data.write().await;
        for (key, value) in records {
            let stamped = Self::stamp(&key, value, guard.get(&key));
            guard.insert(key, stamped);
        }
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<bool> {
        let mut guard = self.data.write().await;
        let mut removed_any = false;
        for id in ids {
            removed_any |= guard.remove(id).is_some();
        }
        if removed_any {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(removed_any)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.data.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.data.read().await.get(id).cloned())
    }

    async fn sync_if_dirty(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let snapshot = self.data.read().await.clone();
        if let Err(err) = write_json_file(&self.file_path, &snapshot).await {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(err)
                .with_context(|| format!("failed to write kv store {}", self.final_namespace));
        }
        Ok(())
    }
}
