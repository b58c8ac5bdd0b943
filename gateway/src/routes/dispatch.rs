use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    routing::any,
};
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

use crate::{
    AppState,
    error::GatewayError,
    services::{ServiceRequest, ServiceResponse},
};

pub fn dispatch_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{service}", any(dispatch_root))
        .route("/{service}/{*rest}", any(dispatch_nested))
}

async fn dispatch_root(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ServiceResponse, GatewayError> {
    let request = ServiceRequest {
        method,
        path: String::new(),
        query,
        headers,
        body,
    };
    forward(&state, &service, request).await
}

async fn dispatch_nested(
    State(state): State<Arc<AppState>>,
    Path((service, rest)): Path<(String, String)>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ServiceResponse, GatewayError> {
    let request = ServiceRequest {
        method,
        path: format!("/{rest}"),
        query,
        headers,
        body,
    };
    forward(&state, &service, request).await
}

async fn forward(
    state: &AppState,
    service: &str,
    request: ServiceRequest,
) -> Result<ServiceResponse, GatewayError> {
    let span = info_span!(
        "dispatch",
        request_id = %Uuid::new_v4(),
        service,
        method = %request.method,
    );
    async move {
        debug!(path = %request.path, size = request.body.len(), "dispatching request");
        state.registry.dispatch(service, request).await
    }
    .instrument(span)
    .await
}
