use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

/// Failures surfaced at the dispatch and extraction boundary.
///
/// Every variant maps onto one HTTP status; nothing below the route layer
/// decides how an error is rendered.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("service already registered: {0}")]
    DuplicateService(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("malformed extractor response: {0}")]
    MalformedResponse(String),

    #[error("failed to initialize service {name}: {cause:#}")]
    InitializationFailure { name: String, cause: anyhow::Error },

    #[error("figure not found: {0}")]
    FigureNotFound(String),

    #[error("no route for {0}")]
    RouteNotFound(String),

    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("extraction failed: {0:#}")]
    Extraction(anyhow::Error),

    #[error(transparent)]
    Service(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::ServiceNotFound(_)
            | GatewayError::FigureNotFound(_)
            | GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::DuplicateService(_)
            | GatewayError::MalformedResponse(_)
            | GatewayError::InitializationFailure { .. }
            | GatewayError::Extraction(_)
            | GatewayError::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn lookup_failures_are_not_found() {
        assert_eq!(
            GatewayError::ServiceNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::FigureNotFound("/1/a.png".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn unsupported_media_type_is_415() {
        let err = GatewayError::UnsupportedMediaType("text/plain".into());
        assert_eq!(err.status_code().as_u16(), 415);
        assert_eq!(err.to_string(), "unsupported media type: text/plain");
    }

    #[test]
    fn initialization_failure_keeps_cause_chain() {
        let cause = anyhow!("key file missing").context("opening session");
        let err = GatewayError::InitializationFailure {
            name: "records".into(),
            cause,
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let rendered = err.to_string();
        assert!(rendered.contains("records"));
        assert!(rendered.contains("key file missing"));
    }
}
