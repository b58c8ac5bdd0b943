pub mod dispatch;
pub mod services;
pub mod upload;

pub use dispatch::dispatch_routes;
pub use services::service_routes;
pub use upload::upload_routes;
