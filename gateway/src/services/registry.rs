use std::{collections::HashMap, sync::Arc};

use anyhow::{Result, anyhow};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{
    Service, ServiceContext, ServiceEnvironment, ServiceRequest, ServiceResponse,
    table::ServiceEntry,
};
use crate::error::GatewayError;

pub type ServiceFuture = BoxFuture<'static, Result<Arc<dyn Service>>>;

/// Builds one service instance.
pub type ServiceFactory = fn(ServiceContext) -> ServiceFuture;

/// Resolves a package name into the handlers it exports.
pub type ModuleLoader = fn() -> Result<ServiceModule>;

/// The handler factories exported by one package.
pub struct ServiceModule {
    package: String,
    handlers: HashMap<String, ServiceFactory>,
}

impl ServiceModule {
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            handlers: HashMap::new(),
        }
    }

    pub fn with_handler(mut self, handler_type: &str, factory: ServiceFactory) -> Self {
        self.handlers.insert(handler_type.to_string(), factory);
        self
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn handler(&self, handler_type: &str) -> Option<ServiceFactory> {
        self.handlers.get(handler_type).copied()
    }
}

/// Compile-time table of packages that services can be loaded from.
#[derive(Default)]
pub struct ModuleCatalog {
    loaders: HashMap<String, ModuleLoader>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, package: &str, loader: ModuleLoader) -> Self {
        self.loaders.insert(package.to_string(), loader);
        self
    }

    pub fn load(&self, package: &str) -> Result<ServiceModule> {
        let loader = self
            .loaders
            .get(package)
            .ok_or_else(|| anyhow!("no module named {package}"))?;
        loader()
    }
}

/// One registered service and its lazily populated module and instance.
///
/// The module is always set before the instance. Each cell admits a single
/// initializer at a time; a failed initializer leaves the cell empty.
pub struct ServiceDescriptor {
    name: String,
    package: String,
    handler_type: String,
    on_demand: bool,
    module: OnceCell<Arc<ServiceModule>>,
    instance: OnceCell<Arc<dyn Service>>,
}

impl ServiceDescriptor {
    fn new(name: &str, package: &str, handler_type: &str, on_demand: bool) -> Self {
        Self {
            name: name.to_string(),
            package: package.to_string(),
            handler_type: handler_type.to_string(),
            on_demand,
            module: OnceCell::new(),
            instance: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.module.initialized()
    }

    pub fn is_initialized(&self) -> bool {
        self.instance.initialized()
    }

    fn status(&self) -> ServiceStatus {
        ServiceStatus {
            name: self.name.clone(),
            package: self.package.clone(),
            handler_type: self.handler_type.clone(),
            on_demand: self.on_demand,
            loaded: self.is_loaded(),
            initialized: self.is_initialized(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub package: String,
    pub handler_type: String,
    pub on_demand: bool,
    pub loaded: bool,
    pub initialized: bool,
}

#[derive(Debug, Default)]
pub struct PreloadReport {
    pub ready: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl PreloadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Named services, fixed at startup, constructed on first use.
pub struct ServiceRegistry {
    catalog: ModuleCatalog,
    env: ServiceEnvironment,
    descriptors: HashMap<String, Arc<ServiceDescriptor>>,
    order: Vec<Arc<ServiceDescriptor>>,
}

impl ServiceRegistry {
    pub fn new(catalog: ModuleCatalog, env: ServiceEnvironment) -> Self {
        Self {
            catalog,
            env,
            descriptors: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn from_table(
        table: &[ServiceEntry],
        catalog: ModuleCatalog,
        env: ServiceEnvironment,
    ) -> Result<Self, GatewayError> {
        let mut registry = Self::new(catalog, env);
        for entry in table {
            registry.register(entry.name, entry.package, entry.handler_type, entry.on_demand)?;
        }
        Ok(registry)
    }

    pub fn register(
        &mut self,
        name: &str,
        package: &str,
        handler_type: &str,
        on_demand: bool,
    ) -> Result<(), GatewayError> {
        if self.descriptors.contains_key(name) {
            return Err(GatewayError::DuplicateService(name.to_string()));
        }

        let descriptor = Arc::new(ServiceDescriptor::new(
            name,
            package,
            handler_type,
            on_demand,
        ));
        self.descriptors.insert(name.to_string(), descriptor.clone());
        self.order.push(descriptor);
        debug!(service = name, package, handler_type, on_demand, "service registered");
        Ok(())
    }

    pub fn descriptor(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.descriptors.get(name).map(Arc::as_ref)
    }

    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.order.iter().map(|d| d.status()).collect()
    }

    /// Brings up every eager service in registration order. A failing
    /// service is reported and left uninitialized; the rest still start.
    pub async fn preload_all(&self) -> PreloadReport {
        let mut report = PreloadReport::default();
        for descriptor in self.order.iter().filter(|d| !d.on_demand) {
            match self.ensure_ready(descriptor).await {
                Ok(_) => report.ready.push(descriptor.name.clone()),
                Err(err) => {
                    warn!(service = %descriptor.name, error = %err, "eager service failed to start");
                    report.failed.push((descriptor.name.clone(), err.to_string()));
                }
            }
        }
        report
    }

    pub async fn dispatch(
        &self,
        name: &str,
        request: ServiceRequest,
    ) -> Result<ServiceResponse, GatewayError> {
        let service = self.instance(name).await?;
        service.handle(request).await
    }

    /// The constructed instance for `name`, building it if needed.
    pub async fn instance(&self, name: &str) -> Result<Arc<dyn Service>, GatewayError> {
        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| GatewayError::ServiceNotFound(name.to_string()))?;
        self.ensure_ready(descriptor).await
    }

    /// Calls `shutdown` on constructed services, newest first.
    pub async fn shutdown_all(&self) {
        for descriptor in self.order.iter().rev() {
            let Some(service) = descriptor.instance.get() else {
                continue;
            };
            if let Err(err) = service.shutdown().await {
                warn!(service = %descriptor.name, error = %err, "service shutdown failed");
            }
        }
    }

    async fn ensure_ready(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Arc<dyn Service>, GatewayError> {
        let module = descriptor
            .module
            .get_or_try_init(|| async {
                debug!(service = %descriptor.name, package = %descriptor.package, "loading module");
                self.catalog.load(&descriptor.package).map(Arc::new)
            })
            .await
            .map_err(|cause| GatewayError::InitializationFailure {
                name: descriptor.name.clone(),
                cause,
            })?;

        let instance = descriptor
            .instance
            .get_or_try_init(|| async {
                let factory = module.handler(&descriptor.handler_type).ok_or_else(|| {
                    anyhow!(
                        "package {} does not export {}",
                        module.package(),
                        descriptor.handler_type
                    )
                })?;
                let context = ServiceContext {
                    name: descriptor.name.clone(),
                    env: self.env.clone(),
                };
                let instance = factory(context).await?;
                info!(service = %descriptor.name, handler = %descriptor.handler_type, "service initialized");
                Ok::<_, anyhow::Error>(instance)
            })
            .await
            .map_err(|cause| GatewayError::InitializationFailure {
                name: descriptor.name.clone(),
                cause,
            })?;

        Ok(instance.clone())
    }
}
