use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::json;

use super::{Service, ServiceContext, ServiceFuture, ServiceRequest, ServiceResponse};
use crate::error::GatewayError;

/// Liveness through the dispatch path.
pub struct PingService {
    name: String,
}

impl PingService {
    pub fn factory(context: ServiceContext) -> ServiceFuture {
        async move {
            let service: Arc<dyn Service> = Arc::new(PingService { name: context.name });
            Ok(service)
        }
        .boxed()
    }
}

#[async_trait]
impl Service for PingService {
    async fn handle(&self, _request: ServiceRequest) -> Result<ServiceResponse, GatewayError> {
        Ok(ServiceResponse::Frame(json!({
            "service": self.name,
            "status": "ok",
        })))
    }
}
