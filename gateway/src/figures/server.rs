use std::sync::{Arc, LazyLock};

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::store::{FigureKey, FigureStore};
use crate::error::GatewayError;

static FIGURE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(\d+)/(.+)(\.[^./]+)$").expect("valid figure path regex"));

const FIGURE_CONTENT_TYPES: &[(&str, &str)] = &[
    (".jpeg", "image/jpeg"),
    (".jpg", "image/jpeg"),
    (".gif", "image/gif"),
    (".png", "image/png"),
];

pub fn content_type_for(extension: &str) -> Option<&'static str> {
    FIGURE_CONTENT_TYPES
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, content_type)| *content_type)
}

/// A resolved figure, ready to be written to a response.
#[derive(Debug, Clone)]
pub struct FigureAsset {
    pub content: Bytes,
    pub timestamp: i64,
    pub content_type: Option<&'static str>,
}

impl FigureAsset {
    pub fn etag(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.content);
        format!("\"{:x}\"", hasher.finalize())
    }

    pub fn last_modified(&self) -> Option<String> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0)
            .map(|at| at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    }
}

/// Maps figures to public URLs under `/<namespace>/figure` and back.
pub struct FigureServer {
    store: Arc<FigureStore>,
    namespace: String,
}

impl FigureServer {
    pub fn new(store: Arc<FigureStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn store(&self) -> &Arc<FigureStore> {
        &self.store
    }

    pub fn prefix(&self) -> String {
        format!("/{}/figure", self.namespace)
    }

    /// Each path segment of the key is percent-encoded; `/` separators stay.
    pub fn url_for(&self, key: &FigureKey) -> String {
        let encoded: Vec<_> = key
            .to_string()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.prefix(), encoded.join("/"))
    }

    /// Stores `content` under the current second and returns its URL.
    pub fn publish(&self, filename: &str, content: Bytes) -> String {
        let key = self.store.publish(filename, content);
        self.url_for(&key)
    }

    /// Resolves a `/<timestamp>/<name>.<ext>` path.
    pub fn resolve(&self, path: &str) -> Result<FigureAsset, GatewayError> {
        let captures = FIGURE_PATH
            .captures(path)
            .ok_or_else(|| GatewayError::FigureNotFound(path.to_string()))?;

        let timestamp = captures[1]
            .parse::<i64>()
            .ok()
            .filter(|ts| ts.to_string() == captures[1])
            .ok_or_else(|| GatewayError::FigureNotFound(path.to_string()))?;
        let extension = &captures[3];
        let key = FigureKey::new(timestamp, format!("{}{}", &captures[2], extension));

        let content = self
            .store
            .get(&key)
            .ok_or_else(|| GatewayError::FigureNotFound(path.to_string()))?;

        let content_type = content_type_for(extension);
        debug!(key = %key, content_type = ?content_type, "figure resolved");
        Ok(FigureAsset {
            content,
            timestamp,
            content_type,
        })
    }

    /// Resolves a full, still encoded URL previously handed out by
    /// [`FigureServer::publish`].
    pub fn resolve_url(&self, url: &str) -> Result<FigureAsset, GatewayError> {
        let prefix = self.prefix();
        let path = url
            .strip_prefix(prefix.as_str())
            .and_then(|path| urlencoding::decode(path).ok())
            .ok_or_else(|| GatewayError::FigureNotFound(url.to_string()))?;
        self.resolve(&path)
    }
}
