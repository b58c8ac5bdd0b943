use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    config::AppConfig,
    error::GatewayError,
    extraction::{ExtractionRouter, FormatRegistry, Frame},
    figures::{FigureAsset, FigureServer, FigureStore},
};

pub mod extract;
pub mod ping;
pub mod records;
pub mod registry;
pub mod table;

pub use registry::{
    ModuleCatalog, ModuleLoader, PreloadReport, ServiceDescriptor, ServiceFactory,
    ServiceFuture, ServiceModule, ServiceRegistry, ServiceStatus,
};
pub use table::{EXTRACT_SERVICE, SERVICE_TABLE, ServiceEntry, default_catalog};

/// A named request handler managed by the [`ServiceRegistry`].
#[async_trait]
pub trait Service: Send + Sync {
    async fn handle(&self, request: ServiceRequest) -> Result<ServiceResponse, GatewayError>;

    /// Called once when the process stops, only for constructed services.
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Transport-neutral view of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct ServiceRequest {
    pub method: Method,
    /// Remainder of the URL path after the service name, `""` or `/...`.
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ServiceRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

#[derive(Debug)]
pub enum ServiceResponse {
    Frame(Frame),
    Figure(FigureAsset),
    Status(StatusCode),
}

impl IntoResponse for ServiceResponse {
    fn into_response(self) -> Response {
        match self {
            ServiceResponse::Frame(frame) => axum::Json(frame).into_response(),
            ServiceResponse::Status(status) => status.into_response(),
            ServiceResponse::Figure(asset) => figure_response(asset),
        }
    }
}

fn figure_response(asset: FigureAsset) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    if let Ok(etag) = HeaderValue::from_str(&asset.etag()) {
        headers.insert(header::ETAG, etag);
    }
    if let Some(last_modified) = asset
        .last_modified()
        .and_then(|value| HeaderValue::from_str(&value).ok())
    {
        headers.insert(header::LAST_MODIFIED, last_modified);
    }

    let content_type = asset.content_type;
    let mut response = (headers, asset.content).into_response();
    match content_type {
        Some(content_type) => {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        None => {
            response.headers_mut().remove(header::CONTENT_TYPE);
        }
    }
    response
}

/// Process-wide collaborators handed to service factories.
#[derive(Clone)]
pub struct ServiceEnvironment {
    pub config: Arc<AppConfig>,
    pub extraction: Arc<ExtractionRouter>,
}

impl ServiceEnvironment {
    pub fn new(config: Arc<AppConfig>, extraction: Arc<ExtractionRouter>) -> Self {
        Self { config, extraction }
    }

    /// Wires the figure cache and format table described by `config`.
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let store = Arc::new(FigureStore::new(config.figures.max_bytes));
        let figures = Arc::new(FigureServer::new(store, EXTRACT_SERVICE));
        let formats = Arc::new(FormatRegistry::from_config(&config.extractors));
        let extraction = Arc::new(ExtractionRouter::new(formats, figures));
        Self::new(config, extraction)
    }
}

/// What a factory receives when its service is first constructed.
#[derive(Clone)]
pub struct ServiceContext {
    pub name: String,
    pub env: ServiceEnvironment,
}
