use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use axum::{
    body::Bytes,
    http::{HeaderMap, header},
};
use regex::Regex;
use tracing::{debug, info};

use super::{
    context::{ExtractionContext, FigureSink},
    formats::{FormatRegistry, Frame},
};
use crate::{error::GatewayError, figures::FigureServer};

/// Opaque extractor options, forwarded untouched.
pub const PDF_PARAMS_HEADER: &str = "pdf-params";

static DISPOSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[A-Za-z][A-Za-z0-9_-]*;\s*filename="([^"/\\]+?)(\.[^".\\/]+)"$"#)
        .expect("valid disposition regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    pub filename: String,
    pub extension: String,
}

/// Accepts only `<type>; filename="<name>.<ext>"`. Anything else yields no
/// filename instead of an error.
pub fn parse_content_disposition(value: &str) -> Option<Disposition> {
    let captures = DISPOSITION.captures(value.trim())?;
    let extension = captures[2].to_string();
    Some(Disposition {
        filename: format!("{}{}", &captures[1], extension),
        extension: extension.to_ascii_lowercase(),
    })
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
    pub params: HashMap<String, String>,
}

impl ExtractionRequest {
    pub fn new(headers: HeaderMap, body: Bytes) -> Self {
        Self {
            headers,
            body,
            params: HashMap::new(),
        }
    }

    fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

pub struct ExtractionRouter {
    formats: Arc<FormatRegistry>,
    figures: Arc<FigureServer>,
}

impl ExtractionRouter {
    pub fn new(formats: Arc<FormatRegistry>, figures: Arc<FigureServer>) -> Self {
        Self { formats, figures }
    }

    pub fn figures(&self) -> &Arc<FigureServer> {
        &self.figures
    }

    pub fn add_figure(&self, filename: &str, content: Bytes) -> String {
        self.figures.publish(filename, content)
    }

    pub async fn extract(&self, request: ExtractionRequest) -> Result<Frame, GatewayError> {
        let mime = request.header(header::CONTENT_TYPE).map(str::to_string);
        let disposition = request
            .header(header::CONTENT_DISPOSITION)
            .and_then(|value| {
                let parsed = parse_content_disposition(value);
                if parsed.is_none() {
                    debug!(disposition = value, "ignoring unparseable content disposition");
                }
                parsed
            });
        let extension = disposition.as_ref().map(|d| d.extension.clone());

        let extractor = self
            .formats
            .resolve(mime.as_deref(), extension.as_deref())
            .ok_or_else(|| {
                GatewayError::UnsupportedMediaType(format!(
                    "content type {}, extension {}",
                    mime.as_deref().unwrap_or("<none>"),
                    extension.as_deref().unwrap_or("<none>")
                ))
            })?;

        let mut context = ExtractionContext::new(FigureSink::new(self.figures.clone()));
        context.pdf_params = request.header(PDF_PARAMS_HEADER).map(str::to_string);
        context.mime = mime;
        context.filename = disposition.map(|d| d.filename);
        context.extension = extension;
        context.params = request.params;

        info!(
            extractor = extractor.name(),
            mime = ?context.mime,
            filename = ?context.filename,
            size = request.body.len(),
            "extracting document"
        );
        extractor.extract(request.body, context).await
    }
}
