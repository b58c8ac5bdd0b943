use std::{path::PathBuf, process::Stdio};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use axum::body::Bytes;
use serde_json::json;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, warn};

use super::{
    context::ExtractionContext,
    formats::{DocumentExtractor, Frame},
};
use crate::{config::CommandExtractorConfig, error::GatewayError};

/// UTF-8 documents, returned as a single text frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "text"
    }

    async fn extract(
        &self,
        document: Bytes,
        context: ExtractionContext,
    ) -> Result<Frame, GatewayError> {
        if document.is_empty() {
            return Err(GatewayError::BadRequest("document is empty".into()));
        }

        let text = std::str::from_utf8(&document)
            .map_err(|_| GatewayError::BadRequest("document is not valid UTF-8".into()))?;
        if text.trim().is_empty() {
            return Err(GatewayError::BadRequest(
                "document contains only whitespace".into(),
            ));
        }

        Ok(json!({
            "format": self.name(),
            "filename": context.filename,
            "length": text.chars().count(),
            "text": text,
        }))
    }
}

/// A standalone image is its own only figure.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageExtractor;

impl ImageExtractor {
    fn extension_for(mime: Option<&str>) -> &'static str {
        match mime.map(|m| m.split(';').next().unwrap_or_default().trim()) {
            Some("image/jpeg") => ".jpg",
            Some("image/gif") => ".gif",
            _ => ".png",
        }
    }
}

#[async_trait]
impl DocumentExtractor for ImageExtractor {
    fn name(&self) -> &str {
        "image"
    }

    async fn extract(
        &self,
        document: Bytes,
        context: ExtractionContext,
    ) -> Result<Frame, GatewayError> {
        if document.is_empty() {
            return Err(GatewayError::BadRequest("image is empty".into()));
        }

        let filename = context.filename.clone().unwrap_or_else(|| {
            format!("figure{}", Self::extension_for(context.mime.as_deref()))
        });
        let size = document.len();
        let url = context.add_figure(&filename, document);

        Ok(json!({
            "format": self.name(),
            "figures": [{ "filename": filename, "url": url, "size": size }],
        }))
    }
}

/// Separates the JSON metadata block from the extracted text.
pub const OUTPUT_SEPARATOR: &str = "\n---\n";

/// Runs an external program: document on stdin, metadata + text on stdout.
///
/// The filename, MIME type and the raw `PDF-params` header are exported as
/// `EXTRACT_FILENAME`, `EXTRACT_MIME` and `EXTRACT_PARAMS`.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl CommandExtractor {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &CommandExtractorConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.program.clone(),
            config.args.clone(),
        )
    }

    pub fn parse_output(&self, stdout: &[u8]) -> Result<Frame, GatewayError> {
        let output = std::str::from_utf8(stdout).map_err(|_| {
            GatewayError::MalformedResponse(format!("{}: output is not valid UTF-8", self.name))
        })?;

        let (header, text) = output
            .split_once(OUTPUT_SEPARATOR)
            .or_else(|| output.strip_suffix("\n---").map(|header| (header, "")))
            .ok_or_else(|| {
                GatewayError::MalformedResponse(format!(
                    "{}: missing output separator",
                    self.name
                ))
            })?;

        let metadata: serde_json::Value = serde_json::from_str(header.trim()).map_err(|err| {
            GatewayError::MalformedResponse(format!("{}: invalid metadata: {err}", self.name))
        })?;

        Ok(json!({
            "format": self.name,
            "metadata": metadata,
            "text": text,
        }))
    }
}

#[async_trait]
impl DocumentExtractor for CommandExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        document: Bytes,
        context: ExtractionContext,
    ) -> Result<Frame, GatewayError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("EXTRACT_FILENAME", context.filename.as_deref().unwrap_or_default())
            .env("EXTRACT_MIME", context.mime.as_deref().unwrap_or_default())
            .env("EXTRACT_PARAMS", context.pdf_params.as_deref().unwrap_or_default())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))
            .map_err(GatewayError::Extraction)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GatewayError::Extraction(anyhow!("{} has no stdin", self.name)))?;
        let name = self.name.clone();
        let feeder = tokio::spawn(async move {
            if let Err(err) = stdin.write_all(&document).await {
                // Programs that stop reading early close the pipe.
                debug!(extractor = %name, error = %err, "stdin closed before document was written");
            }
        });

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("failed to wait for {}", self.name))
            .map_err(GatewayError::Extraction)?;
        if let Err(err) = feeder.await {
            warn!(extractor = %self.name, error = %err, "stdin writer task failed");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GatewayError::Extraction(anyhow!(
                "{} exited with {}: {}",
                self.name,
                output.status,
                stderr.trim()
            )));
        }

        self.parse_output(&output.stdout)
    }
}
