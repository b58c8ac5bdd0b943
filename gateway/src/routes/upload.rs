use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Multipart, Query, State},
    http::{HeaderMap, HeaderValue, header},
    routing::post,
};
use tracing::info;

use crate::{
    AppState,
    error::GatewayError,
    extraction::{ExtractionRequest, Frame, PDF_PARAMS_HEADER},
};

pub fn upload_routes() -> Router<Arc<AppState>> {
    Router::new().route("/upload", post(upload_document))
}

/// Multipart variant of `POST /extract`: the `file` field is the document.
async fn upload_document(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    request_headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Frame>, GatewayError> {
    let mut file_bytes = None;
    let mut original_filename: Option<String> = None;
    let mut content_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| GatewayError::BadRequest(format!("invalid multipart payload: {err}")))?
    {
        if field.name() == Some("file") {
            original_filename = field.file_name().map(str::to_string);
            content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(|err| {
                GatewayError::BadRequest(format!("failed to read upload field: {err}"))
            })?;
            file_bytes = Some(data);
            break;
        }
    }

    let body = file_bytes.ok_or_else(|| {
        GatewayError::BadRequest("missing file field in multipart payload".to_string())
    })?;

    let mut headers = HeaderMap::new();
    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(value) = original_filename
        .as_deref()
        .and_then(|name| HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")).ok())
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Some(value) = request_headers.get(PDF_PARAMS_HEADER) {
        headers.insert(PDF_PARAMS_HEADER, value.clone());
    }

    let size = body.len();
    let frame = state
        .extraction
        .extract(ExtractionRequest {
            headers,
            body,
            params,
        })
        .await?;

    info!(filename = ?original_filename, size, "upload extracted");
    Ok(Json(frame))
}
