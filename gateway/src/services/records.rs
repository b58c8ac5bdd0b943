use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use futures::FutureExt;
use serde_json::{Value, json};
use tracing::info;

use super::{Service, ServiceContext, ServiceFuture, ServiceRequest, ServiceResponse};
use crate::{
    error::GatewayError,
    storage::{JsonKvStorage, JsonKvStorageConfig, KvStorage},
};

/// Case records kept in a JSON key-value file, opened on first use.
pub struct RecordsService {
    storage: Arc<dyn KvStorage>,
}

impl RecordsService {
    pub async fn open(storage: Arc<dyn KvStorage>) -> anyhow::Result<Self> {
        storage
            .initialize()
            .await
            .context("failed to open records store")?;
        Ok(Self { storage })
    }

    pub fn factory(context: ServiceContext) -> ServiceFuture {
        async move {
            let config = &context.env.config;
            let storage = Arc::new(JsonKvStorage::new(JsonKvStorageConfig {
                working_dir: config.working_dir.clone(),
                namespace: context.name.clone(),
                workspace: config.workspace.clone(),
            }));
            info!(path = %storage.file_path().display(), "opening records store");
            let service: Arc<dyn Service> = Arc::new(RecordsService::open(storage).await?);
            Ok(service)
        }
        .boxed()
    }

    async fn list(&self) -> Result<ServiceResponse, GatewayError> {
        let ids = self.storage.keys().await?;
        Ok(ServiceResponse::Frame(json!({ "ids": ids })))
    }

    async fn get(&self, id: &str) -> Result<ServiceResponse, GatewayError> {
        Ok(match self.storage.get_by_id(id).await? {
            Some(record) => ServiceResponse::Frame(record),
            None => ServiceResponse::Status(StatusCode::NOT_FOUND),
        })
    }

    async fn put(&self, id: &str, body: &[u8]) -> Result<ServiceResponse, GatewayError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|err| GatewayError::BadRequest(format!("record is not valid JSON: {err}")))?;

        let mut records = HashMap::new();
        records.insert(id.to_string(), value);
        self.storage.upsert(records).await?;
        self.storage.sync_if_dirty().await?;
        self.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<ServiceResponse, GatewayError> {
        let removed = self.storage.delete(&[id.to_string()]).await?;
        self.storage.sync_if_dirty().await?;
        Ok(ServiceResponse::Status(if removed {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::NOT_FOUND
        }))
    }
}

#[async_trait]
impl Service for RecordsService {
    async fn handle(&self, request: ServiceRequest) -> Result<ServiceResponse, GatewayError> {
        let id = request.path.trim_matches('/');
        let method = &request.method;

        if id.is_empty() {
            return if *method == Method::GET {
                self.list().await
            } else {
                Err(GatewayError::MethodNotAllowed {
                    method: method.to_string(),
                    path: request.path.clone(),
                })
            };
        }

        if id.contains('/') {
            return Err(GatewayError::RouteNotFound(request.path.clone()));
        }

        if *method == Method::GET {
            self.get(id).await
        } else if *method == Method::PUT || *method == Method::POST {
            self.put(id, &request.body).await
        } else if *method == Method::DELETE {
            self.delete(id).await
        } else {
            Err(GatewayError::MethodNotAllowed {
                method: method.to_string(),
                path: request.path.clone(),
            })
        }
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.storage.finalize().await
    }
}
