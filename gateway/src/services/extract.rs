use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use futures::FutureExt;

use super::{Service, ServiceContext, ServiceFuture, ServiceRequest, ServiceResponse};
use crate::{
    error::GatewayError,
    extraction::{ExtractionRequest, ExtractionRouter},
};

const FIGURE_SEGMENT: &str = "/figure";

/// `POST /extract` runs extraction, `GET /extract/figure/...` serves figures.
pub struct ExtractService {
    extraction: Arc<ExtractionRouter>,
}

impl ExtractService {
    pub fn new(extraction: Arc<ExtractionRouter>) -> Self {
        Self { extraction }
    }

    pub fn factory(context: ServiceContext) -> ServiceFuture {
        async move {
            let service: Arc<dyn Service> = Arc::new(ExtractService::new(context.env.extraction));
            Ok(service)
        }
        .boxed()
    }
}

#[async_trait]
impl Service for ExtractService {
    async fn handle(&self, request: ServiceRequest) -> Result<ServiceResponse, GatewayError> {
        let method = request.method.clone();
        let path = request.path.clone();

        if path.is_empty() || path == "/" {
            if method != Method::POST && method != Method::PUT {
                return Err(GatewayError::MethodNotAllowed {
                    method: method.to_string(),
                    path,
                });
            }
            let frame = self
                .extraction
                .extract(ExtractionRequest {
                    headers: request.headers,
                    body: request.body,
                    params: request.query,
                })
                .await?;
            return Ok(ServiceResponse::Frame(frame));
        }

        if let Some(figure_path) = path.strip_prefix(FIGURE_SEGMENT) {
            if method != Method::GET && method != Method::HEAD {
                return Err(GatewayError::MethodNotAllowed {
                    method: method.to_string(),
                    path: path.clone(),
                });
            }
            let asset = self.extraction.figures().resolve(figure_path)?;
            return Ok(ServiceResponse::Figure(asset));
        }

        Err(GatewayError::RouteNotFound(path))
    }
}
