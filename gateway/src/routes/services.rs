use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};

use crate::{AppState, services::ServiceStatus};

pub fn service_routes() -> Router<Arc<AppState>> {
    Router::new().route("/services", get(list_services))
}

async fn list_services(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceStatus>> {
    Json(state.registry.statuses())
}
