use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tower_http::cors::CorsLayer;

pub mod config;
pub mod error;
pub mod extraction;
pub mod figures;
pub mod routes;
pub mod services;
pub mod storage;

use config::AppConfig;
use extraction::ExtractionRouter;
use services::{SERVICE_TABLE, ServiceEnvironment, ServiceRegistry, default_catalog};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ServiceRegistry>,
    pub extraction: Arc<ExtractionRouter>,
}

impl AppState {
    /// Builds the registry from the static service table. Nothing is loaded
    /// until [`ServiceRegistry::preload_all`] or the first dispatch.
    pub fn new(config: Arc<AppConfig>) -> Result<Self> {
        let env = ServiceEnvironment::from_config(config.clone());
        let extraction = env.extraction.clone();
        let registry = ServiceRegistry::from_table(SERVICE_TABLE, default_catalog(), env)
            .context("Invalid service table")?;

        Ok(Self {
            config,
            registry: Arc::new(registry),
            extraction,
        })
    }
}

pub fn build_app(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.config.server.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .merge(routes::service_routes())
        .merge(routes::upload_routes())
        .merge(routes::dispatch_routes())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[inline]
async fn health() -> &'static str {
    "ok"
}
