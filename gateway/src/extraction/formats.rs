use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::body::Bytes;
use tracing::info;

use super::{
    context::ExtractionContext,
    extractors::{CommandExtractor, ImageExtractor, PlainTextExtractor},
};
use crate::{config::ExtractorsConfig, error::GatewayError};

/// Structured extractor output. Its shape belongs to the downstream store.
pub type Frame = serde_json::Value;

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(
        &self,
        document: Bytes,
        context: ExtractionContext,
    ) -> Result<Frame, GatewayError>;
}

/// Extractors keyed by MIME type and by lowercase dotted extension.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Default, Clone)]
pub struct FormatRegistry {
    by_mime: HashMap<String, Arc<dyn DocumentExtractor>>,
    by_extension: HashMap<String, Arc<dyn DocumentExtractor>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ExtractorsConfig) -> Self {
        let mut registry = Self::new();

        if config.text {
            registry.register(
                Arc::new(PlainTextExtractor),
                &["text/plain", "text/markdown", "text/csv", "application/json"],
                &[".txt", ".md", ".csv", ".json"],
            );
        }

        if config.images {
            registry.register(
                Arc::new(ImageExtractor),
                &["image/png", "image/jpeg", "image/gif"],
                &[".png", ".jpg", ".jpeg", ".gif"],
            );
        }

        for command in &config.commands {
            let mimes: Vec<&str> = command.mime_types.iter().map(String::as_str).collect();
            let extensions: Vec<&str> = command.extensions.iter().map(String::as_str).collect();
            registry.register(
                Arc::new(CommandExtractor::from_config(command)),
                &mimes,
                &extensions,
            );
        }

        info!(
            mime_types = registry.by_mime.len(),
            extensions = registry.by_extension.len(),
            "Format registry built"
        );
        registry
    }

    pub fn register(
        &mut self,
        extractor: Arc<dyn DocumentExtractor>,
        mime_types: &[&str],
        extensions: &[&str],
    ) {
        for mime in mime_types {
            self.register_mime(mime, extractor.clone());
        }
        for ext in extensions {
            self.register_extension(ext, extractor.clone());
        }
    }

    pub fn register_mime(&mut self, mime: &str, extractor: Arc<dyn DocumentExtractor>) {
        self.by_mime.insert(mime.trim().to_string(), extractor);
    }

    pub fn register_extension(&mut self, extension: &str, extractor: Arc<dyn DocumentExtractor>) {
        self.by_extension
            .insert(normalize_extension(extension), extractor);
    }

    /// Exact header value first, then its essence without parameters.
    pub fn by_mime(&self, mime: &str) -> Option<Arc<dyn DocumentExtractor>> {
        if let Some(extractor) = self.by_mime.get(mime) {
            return Some(extractor.clone());
        }
        let essence = mime.split(';').next().unwrap_or_default().trim();
        self.by_mime.get(&essence.to_ascii_lowercase()).cloned()
    }

    pub fn by_extension(&self, extension: &str) -> Option<Arc<dyn DocumentExtractor>> {
        self.by_extension
            .get(&normalize_extension(extension))
            .cloned()
    }

    pub fn resolve(
        &self,
        mime: Option<&str>,
        extension: Option<&str>,
    ) -> Option<Arc<dyn DocumentExtractor>> {
        mime.and_then(|mime| self.by_mime(mime))
            .or_else(|| extension.and_then(|ext| self.by_extension(ext)))
    }

    pub fn is_empty(&self) -> bool {
        self.by_mime.is_empty() && self.by_extension.is_empty()
    }
}

/// Lowercases and guarantees exactly one leading dot.
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_ascii_lowercase())
}
