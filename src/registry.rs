//! # Backend Registry
//!
//! Resolves a destination key to an initialized adapter. Adapters are built
//! from a factory table keyed by implementation identifier, validated against
//! the configuration when the registry is created. Each configured service
//! gets one cell: the first caller constructs and initializes the adapter,
//! concurrent first callers wait for that attempt, and a successful result is
//! reused for the life of the registry.

use crate::adapters::{FtsTransfer, S3Storage};
use crate::config::{Config, ParserConfig, ServiceConfig};
use crate::error::{ids, Error, Result};
use crate::models::StorageAuth;
use crate::parsers::{B2ShareParser, EsrfParser, ZenodoParser};
use crate::ports::{ParserService, StorageService, TransferService};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub type TransferFactory = Arc<dyn Fn() -> Box<dyn TransferService> + Send + Sync>;
pub type StorageFactory = Arc<dyn Fn() -> Box<dyn StorageService> + Send + Sync>;
pub type ParserFactory = Arc<dyn Fn(&ParserConfig) -> Box<dyn ParserService> + Send + Sync>;

/// Constructor for a service adapter
#[derive(Clone)]
pub enum AdapterFactory {
    Transfer(TransferFactory),
    Storage(StorageFactory),
}

/// Implementation identifier → constructor tables
#[derive(Clone, Default)]
pub struct AdapterFactories {
    services: HashMap<String, AdapterFactory>,
    parsers: HashMap<String, ParserFactory>,
}

impl fmt::Debug for AdapterFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFactories")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("parsers", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AdapterFactories {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every adapter shipped with the crate
    pub fn builtin() -> Self {
        Self::empty()
            .with_transfer("fts", || Box::new(FtsTransfer::new()))
            .with_storage("s3", || Box::new(S3Storage::new()))
            .with_parser("zenodo", |config| Box::new(ZenodoParser::new(config)))
            .with_parser("b2share", |config| Box::new(B2ShareParser::new(config)))
            .with_parser("esrf", |config| Box::new(EsrfParser::new(config)))
    }

    #[must_use]
    pub fn with_transfer<F>(mut self, implementation: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn TransferService> + Send + Sync + 'static,
    {
        self.services.insert(
            implementation.to_string(),
            AdapterFactory::Transfer(Arc::new(factory)),
        );
        self
    }

    #[must_use]
    pub fn with_storage<F>(mut self, implementation: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn StorageService> + Send + Sync + 'static,
    {
        self.services.insert(
            implementation.to_string(),
            AdapterFactory::Storage(Arc::new(factory)),
        );
        self
    }

    #[must_use]
    pub fn with_parser<F>(mut self, implementation: &str, factory: F) -> Self
    where
        F: Fn(&ParserConfig) -> Box<dyn ParserService> + Send + Sync + 'static,
    {
        self.parsers
            .insert(implementation.to_string(), Arc::new(factory));
        self
    }

    pub fn service(&self, implementation: &str) -> Option<&AdapterFactory> {
        self.services.get(implementation)
    }

    pub fn parser(&self, implementation: &str) -> Option<&ParserFactory> {
        self.parsers.get(implementation)
    }
}

/// A live, initialized adapter bound to one service
#[derive(Clone)]
pub enum Backend {
    Transfer(Arc<dyn TransferService>),
    Storage(Arc<dyn StorageService>),
}

impl Backend {
    pub fn implementation(&self) -> &str {
        match self {
            Self::Transfer(service) => service.implementation(),
            Self::Storage(service) => service.implementation(),
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer(_) => write!(f, "Backend::Transfer({})", self.implementation()),
            Self::Storage(_) => write!(f, "Backend::Storage({})", self.implementation()),
        }
    }
}

/// Destination → adapter resolver with create-once caching
pub struct BackendRegistry {
    config: Arc<Config>,
    factories: AdapterFactories,
    cells: HashMap<String, OnceCell<Backend>>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("services", &self.cells.keys().collect::<Vec<_>>())
            .field("factories", &self.factories)
            .finish_non_exhaustive()
    }
}

impl BackendRegistry {
    /// Create the registry, failing fast on unknown implementation identifiers
    pub fn new(config: Arc<Config>, factories: AdapterFactories) -> Result<Self> {
        config.validate()?;

        for (service_id, service) in &config.services {
            if factories.service(&service.implementation).is_none() {
                return Err(Error::canonical(
                    ids::INVALID_SERVICE_CONFIG,
                    "Unknown service implementation",
                )
                .with_detail("serviceId", service_id)
                .with_detail("implementation", &service.implementation));
            }
        }

        let cells = config
            .services
            .keys()
            .map(|service_id| (service_id.clone(), OnceCell::new()))
            .collect();

        info!(
            "Backend registry ready with {} services for {} destinations",
            config.services.len(),
            config.destinations.len()
        );

        Ok(Self {
            config,
            factories,
            cells,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub const fn factories(&self) -> &AdapterFactories {
        &self.factories
    }

    /// Service id and configuration selected by `destination`
    pub fn service_config(&self, destination: &str) -> Result<(&str, &ServiceConfig)> {
        self.config.service_for(destination).ok_or_else(|| {
            Error::canonical(
                ids::INVALID_SERVICE_CONFIG,
                "No service configured for destination",
            )
            .with_detail("destination", destination)
        })
    }

    /// Whether the adapter of `service_id` has been created
    pub fn is_initialized(&self, service_id: &str) -> bool {
        self.cells
            .get(service_id)
            .is_some_and(OnceCell::initialized)
    }

    /// Initialized adapter for `destination`, creating it on first use
    pub async fn backend(
        &self,
        destination: &str,
        element_uri: Option<&str>,
        storage_auth: Option<&StorageAuth>,
    ) -> Result<Backend> {
        let (service_id, service) = self.service_config(destination)?;
        let cell = self.cells.get(service_id).ok_or_else(|| {
            Error::canonical(ids::INVALID_SERVICE_CONFIG, "Service has no adapter slot")
                .with_detail("destination", destination)
        })?;

        let backend = cell
            .get_or_try_init(|| self.create(service_id, service, element_uri, storage_auth))
            .await
            .map_err(|e| e.with_detail("destination", destination))?;

        Ok(backend.clone())
    }

    /// Transfer adapter for `destination`
    pub async fn transfer_service(&self, destination: &str) -> Result<Arc<dyn TransferService>> {
        match self.backend(destination, None, None).await? {
            Backend::Transfer(service) => Ok(service),
            Backend::Storage(service) => Err(Error::canonical(
                ids::TRANSFER_NOT_SUPPORTED,
                "Destination does not support transfers",
            )
            .with_detail("destination", destination)
            .with_detail("implementation", service.implementation())),
        }
    }

    /// Storage adapter for `destination`, either a storage backend or the
    /// storage view of a transfer backend
    pub async fn storage_service(
        &self,
        destination: &str,
        element_uri: Option<&str>,
        storage_auth: Option<&StorageAuth>,
    ) -> Result<Arc<dyn StorageService>> {
        match self.backend(destination, element_uri, storage_auth).await? {
            Backend::Storage(service) => Ok(service),
            Backend::Transfer(service) => {
                let implementation = service.implementation().to_string();
                service.as_storage().ok_or_else(|| {
                    Error::canonical(
                        ids::STORAGE_NOT_SUPPORTED,
                        "Destination does not manage storage elements",
                    )
                    .with_detail("destination", destination)
                    .with_detail("implementation", implementation)
                })
            }
        }
    }

    async fn create(
        &self,
        service_id: &str,
        service: &ServiceConfig,
        element_uri: Option<&str>,
        storage_auth: Option<&StorageAuth>,
    ) -> Result<Backend> {
        let factory = self.factories.service(&service.implementation).ok_or_else(|| {
            Error::canonical(ids::INVALID_SERVICE_CONFIG, "Unknown service implementation")
                .with_detail("serviceId", service_id)
        })?;

        debug!(
            "Creating {} adapter for service {}",
            service.implementation, service_id
        );

        let initialized = match factory {
            AdapterFactory::Transfer(factory) => {
                let mut adapter = factory();
                if adapter.init(service).await {
                    Some(Backend::Transfer(Arc::from(adapter)))
                } else {
                    None
                }
            }
            AdapterFactory::Storage(factory) => {
                let mut adapter = factory();
                if adapter.init(service, element_uri, storage_auth).await {
                    Some(Backend::Storage(Arc::from(adapter)))
                } else {
                    None
                }
            }
        };

        initialized.map_or_else(
            || {
                warn!(
                    "Failed to initialize {} adapter for service {}",
                    service.implementation, service_id
                );
                Err(Error::canonical(
                    ids::INVALID_SERVICE_CONFIG,
                    "Backend adapter failed to initialize",
                )
                .with_detail("serviceId", service_id))
            },
            |backend| {
                info!(
                    "Initialized {} adapter for service {} ({})",
                    service.implementation, service_id, service.url
                );
                Ok(backend)
            },
        )
    }
}
