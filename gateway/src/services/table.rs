use anyhow::Result;

use super::{
    extract::ExtractService, ping::PingService, records::RecordsService,
    registry::{ModuleCatalog, ServiceModule},
};

/// Service that owns document extraction; figure URLs live under its name.
pub const EXTRACT_SERVICE: &str = "extract";

#[derive(Debug, Clone, Copy)]
pub struct ServiceEntry {
    pub name: &'static str,
    pub package: &'static str,
    pub handler_type: &'static str,
    pub on_demand: bool,
}

pub const SERVICE_TABLE: &[ServiceEntry] = &[
    ServiceEntry {
        name: "ping",
        package: "core",
        handler_type: "PingService",
        on_demand: false,
    },
    ServiceEntry {
        name: EXTRACT_SERVICE,
        package: "extraction",
        handler_type: "ExtractService",
        on_demand: false,
    },
    ServiceEntry {
        name: "records",
        package: "records",
        handler_type: "RecordsService",
        on_demand: true,
    },
];

pub fn default_catalog() -> ModuleCatalog {
    ModuleCatalog::new()
        .with_module("core", load_core)
        .with_module("extraction", load_extraction)
        .with_module("records", load_records)
}

fn load_core() -> Result<ServiceModule> {
    Ok(ServiceModule::new("core").with_handler("PingService", PingService::factory))
}

fn load_extraction() -> Result<ServiceModule> {
    Ok(ServiceModule::new("extraction").with_handler("ExtractService", ExtractService::factory))
}

fn load_records() -> Result<ServiceModule> {
    Ok(ServiceModule::new("records").with_handler("RecordsService", RecordsService::factory))
}
