use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::http::Method;
use futures::FutureExt;
use ingest_gateway::{
    config::AppConfig,
    error::GatewayError,
    services::{
        ModuleCatalog, Service, ServiceContext, ServiceEnvironment, ServiceFuture, ServiceModule,
        ServiceRegistry, ServiceRequest, ServiceResponse,
    },
};
use serde_json::json;

fn environment() -> ServiceEnvironment {
    ServiceEnvironment::from_config(Arc::new(AppConfig::default()))
}

/// Answers with the name it was built under and a per-instance serial.
struct EchoService {
    name: String,
    serial: usize,
}

#[async_trait]
impl Service for EchoService {
    async fn handle(&self, request: ServiceRequest) -> Result<ServiceResponse, GatewayError> {
        Ok(ServiceResponse::Frame(json!({
            "service": self.name,
            "serial": self.serial,
            "path": request.path,
        })))
    }
}

fn echo(context: ServiceContext, serial: usize) -> Arc<dyn Service> {
    Arc::new(EchoService {
        name: context.name,
        serial,
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_dispatch_builds_one_instance() -> Result<()> {
    static LOADS: AtomicUsize = AtomicUsize::new(0);
    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    fn load() -> Result<ServiceModule> {
        LOADS.fetch_add(1, Ordering::SeqCst);
        Ok(ServiceModule::new("slow").with_handler("Echo", build))
    }

    fn build(context: ServiceContext) -> ServiceFuture {
        async move {
            let serial = BUILDS.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(25)).await;
            Ok(echo(context, serial))
        }
        .boxed()
    }

    let mut registry =
        ServiceRegistry::new(ModuleCatalog::new().with_module("slow", load), environment());
    registry.register("lazy", "slow", "Echo", true)?;
    let registry = Arc::new(registry);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .dispatch("lazy", ServiceRequest::new(Method::GET, "/"))
                .await
        }));
    }

    for handle in handles {
        let ServiceResponse::Frame(frame) = handle.await?? else {
            panic!("expected a frame");
        };
        assert_eq!(frame["serial"], 0);
    }

    assert_eq!(LOADS.load(Ordering::SeqCst), 1);
    assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    let first = registry.instance("lazy").await?;
    let again = registry.instance("lazy").await?;
    assert!(Arc::ptr_eq(&first, &again));
    Ok(())
}

#[tokio::test]
async fn later_dispatches_reuse_the_instance() -> Result<()> {
    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    fn load() -> Result<ServiceModule> {
        Ok(ServiceModule::new("pkg").with_handler("Echo", build))
    }

    fn build(context: ServiceContext) -> ServiceFuture {
        async move { Ok(echo(context, BUILDS.fetch_add(1, Ordering::SeqCst))) }.boxed()
    }

    let mut registry =
        ServiceRegistry::new(ModuleCatalog::new().with_module("pkg", load), environment());
    registry.register("echo", "pkg", "Echo", true)?;

    for round in 0..3 {
        let response = registry
            .dispatch("echo", ServiceRequest::new(Method::GET, format!("/{round}")))
            .await?;
        let ServiceResponse::Frame(frame) = response else {
            panic!("expected a frame");
        };
        assert_eq!(frame["service"], "echo");
        assert_eq!(frame["serial"], 0);
        assert_eq!(frame["path"], format!("/{round}"));
    }
    assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_service_has_no_side_effects() -> Result<()> {
    static LOADS: AtomicUsize = AtomicUsize::new(0);

    fn load() -> Result<ServiceModule> {
        LOADS.fetch_add(1, Ordering::SeqCst);
        Ok(ServiceModule::new("pkg").with_handler("Echo", build))
    }

    fn build(context: ServiceContext) -> ServiceFuture {
        async move { Ok(echo(context, 0)) }.boxed()
    }

    let mut registry =
        ServiceRegistry::new(ModuleCatalog::new().with_module("pkg", load), environment());
    registry.register("known", "pkg", "Echo", true)?;

    let result = registry
        .dispatch("unknown", ServiceRequest::new(Method::GET, ""))
        .await;
    match result {
        Err(err @ GatewayError::ServiceNotFound(_)) => assert_eq!(err.status_code().as_u16(), 404),
        other => panic!("expected not found, got {other:?}"),
    }

    assert_eq!(LOADS.load(Ordering::SeqCst), 0);
    let known = registry.descriptor("known").unwrap();
    assert!(!known.is_loaded());
    assert!(!known.is_initialized());
    Ok(())
}

#[tokio::test]
async fn failed_construction_is_retried_later() -> Result<()> {
    static KEY_PRESENT: AtomicBool = AtomicBool::new(false);
    static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

    fn load() -> Result<ServiceModule> {
        Ok(ServiceModule::new("remote").with_handler("Session", build))
    }

    fn build(context: ServiceContext) -> ServiceFuture {
        async move {
            ATTEMPTS.fetch_add(1, Ordering::SeqCst);
            if !KEY_PRESENT.load(Ordering::SeqCst) {
                return Err(anyhow!("api key file not found"));
            }
            Ok(echo(context, 0))
        }
        .boxed()
    }

    let mut registry =
        ServiceRegistry::new(ModuleCatalog::new().with_module("remote", load), environment());
    registry.register("session", "remote", "Session", true)?;
    registry.register("other", "remote", "Session", true)?;

    let err = registry
        .dispatch("session", ServiceRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InitializationFailure { .. }));
    assert_eq!(err.status_code().as_u16(), 500);
    assert!(err.to_string().contains("api key file not found"));

    let descriptor = registry.descriptor("session").unwrap();
    assert!(descriptor.is_loaded());
    assert!(!descriptor.is_initialized());
    assert!(!registry.descriptor("other").unwrap().is_loaded());

    KEY_PRESENT.store(true, Ordering::SeqCst);
    registry
        .dispatch("session", ServiceRequest::default())
        .await?;
    assert!(registry.descriptor("session").unwrap().is_initialized());
    assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn unknown_package_or_handler_fails_initialization() -> Result<()> {
    fn load() -> Result<ServiceModule> {
        Ok(ServiceModule::new("pkg"))
    }

    let mut registry =
        ServiceRegistry::new(ModuleCatalog::new().with_module("pkg", load), environment());
    registry.register("no-package", "missing", "Echo", true)?;
    registry.register("no-handler", "pkg", "Missing", true)?;

    let err = registry.instance("no-package").await.err().unwrap();
    assert!(err.to_string().contains("no module named missing"));
    assert!(!registry.descriptor("no-package").unwrap().is_loaded());

    let err = registry.instance("no-handler").await.err().unwrap();
    assert!(err.to_string().contains("does not export Missing"));
    assert!(registry.descriptor("no-handler").unwrap().is_loaded());
    Ok(())
}

#[test]
fn duplicate_names_are_rejected() {
    let mut registry = ServiceRegistry::new(ModuleCatalog::new(), environment());
    registry.register("dup", "a", "A", false).unwrap();
    let err = registry.register("dup", "b", "B", true).unwrap_err();
    assert!(matches!(err, GatewayError::DuplicateService(name) if name == "dup"));

    let statuses = registry.statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].package, "a");
}

#[tokio::test]
async fn preload_starts_eager_services_in_order() -> Result<()> {
    static STARTED: Mutex<Vec<String>> = Mutex::new(Vec::new());

    fn load() -> Result<ServiceModule> {
        Ok(ServiceModule::new("pkg")
            .with_handler("Echo", build)
            .with_handler("Broken", broken))
    }

    fn build(context: ServiceContext) -> ServiceFuture {
        async move {
            STARTED.lock().unwrap().push(context.name.clone());
            Ok(echo(context, 0))
        }
        .boxed()
    }

    fn broken(_context: ServiceContext) -> ServiceFuture {
        async move { Err(anyhow!("cannot start")) }.boxed()
    }

    let mut registry =
        ServiceRegistry::new(ModuleCatalog::new().with_module("pkg", load), environment());
    registry.register("third", "pkg", "Echo", false)?;
    registry.register("lazy", "pkg", "Echo", true)?;
    registry.register("broken", "pkg", "Broken", false)?;
    registry.register("first", "pkg", "Echo", false)?;

    let report = registry.preload_all().await;
    assert_eq!(report.ready, vec!["third", "first"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");
    assert!(!report.is_clean());

    assert_eq!(*STARTED.lock().unwrap(), vec!["third", "first"]);
    let lazy = registry.descriptor("lazy").unwrap();
    assert!(!lazy.is_loaded());
    assert!(!lazy.is_initialized());
    Ok(())
}

#[tokio::test]
async fn shutdown_reaches_only_constructed_services() -> Result<()> {
    static SHUTDOWNS: AtomicUsize = AtomicUsize::new(0);

    struct Closing;

    #[async_trait]
    impl Service for Closing {
        async fn handle(&self, _request: ServiceRequest) -> Result<ServiceResponse, GatewayError> {
            Ok(ServiceResponse::Status(axum::http::StatusCode::NO_CONTENT))
        }

        async fn shutdown(&self) -> Result<()> {
            SHUTDOWNS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn load() -> Result<ServiceModule> {
        Ok(ServiceModule::new("pkg").with_handler("Closing", build))
    }

    fn build(_context: ServiceContext) -> ServiceFuture {
        async move {
            let service: Arc<dyn Service> = Arc::new(Closing);
            Ok(service)
        }
        .boxed()
    }

    let mut registry =
        ServiceRegistry::new(ModuleCatalog::new().with_module("pkg", load), environment());
    registry.register("used", "pkg", "Closing", true)?;
    registry.register("idle", "pkg", "Closing", true)?;

    registry.dispatch("used", ServiceRequest::default()).await?;
    registry.shutdown_all().await;
    assert_eq!(SHUTDOWNS.load(Ordering::SeqCst), 1);
    Ok(())
}
