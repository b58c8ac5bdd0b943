use std::{collections::HashMap, sync::Arc};

use axum::body::Bytes;

use crate::figures::FigureServer;

/// Publishes figures found during extraction and hands back their URLs.
#[derive(Clone)]
pub struct FigureSink {
    figures: Arc<FigureServer>,
}

impl FigureSink {
    pub fn new(figures: Arc<FigureServer>) -> Self {
        Self { figures }
    }

    pub fn add_figure(&self, filename: &str, content: Bytes) -> String {
        self.figures.publish(filename, content)
    }
}

/// Per-request facts about the uploaded document.
#[derive(Clone)]
pub struct ExtractionContext {
    pub mime: Option<String>,
    pub filename: Option<String>,
    pub extension: Option<String>,
    pub params: HashMap<String, String>,
    pub pdf_params: Option<String>,
    figures: FigureSink,
}

impl ExtractionContext {
    pub fn new(figures: FigureSink) -> Self {
        Self {
            mime: None,
            filename: None,
            extension: None,
            params: HashMap::new(),
            pdf_params: None,
            figures,
        }
    }

    pub fn add_figure(&self, filename: &str, content: Bytes) -> String {
        self.figures.add_figure(filename, content)
    }
}
