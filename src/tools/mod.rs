//! # Facade Tools
//!
//! The uniform API. Every operation follows the same path: resolve the
//! destination through the [`BackendRegistry`], run the backend call inside a
//! [`CallEnvelope`] bounded by the service timeout, and convert any failure
//! exactly once with [`ErrorMapper`], attaching the request context.

pub mod doi;
pub mod storage;
pub mod transfer;

pub use doi::{DoiTool, ResolveDoiInput};
pub use storage::{RenameInput, StorageInput, StorageTool};
pub use transfer::{
    FindTransfersInput, StartTransferInput, TransferFieldInput, TransferInfoInput, TransferTool,
    UserInfoInput,
};

use crate::config::Config;
use crate::error::{CanonicalError, ErrorMapper, Result};
use crate::models::StorageAuth;
use crate::parsers::ParserChain;
use crate::ports::{StorageService, TransferService};
use crate::registry::{AdapterFactories, BackendRegistry};
use crate::resilience::CallEnvelope;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a facade operation
pub type ToolResult<T> = std::result::Result<T, CanonicalError>;

/// Run `call` against the transfer adapter of `destination` under its deadline
async fn invoke_transfer<T, F, Fut>(
    registry: &BackendRegistry,
    operation: &str,
    destination: &str,
    call: F,
) -> Result<T>
where
    F: FnOnce(Arc<dyn TransferService>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let service = registry.transfer_service(destination).await?;
    invoke_transfer_on(registry, service, operation, destination, call).await
}

/// Same as [`invoke_transfer`], for an adapter the caller already resolved
async fn invoke_transfer_on<T, F, Fut>(
    registry: &BackendRegistry,
    service: Arc<dyn TransferService>,
    operation: &str,
    destination: &str,
    call: F,
) -> Result<T>
where
    F: FnOnce(Arc<dyn TransferService>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let (service_id, service_config) = registry.service_config(destination)?;
    let envelope = CallEnvelope::new(operation, service_config.timeout());

    debug!("{} on {} via service {}", operation, destination, service_id);
    envelope.call(call(service)).await
}

/// Run `call` against the storage adapter of `destination` under its deadline
async fn invoke_storage<T, F, Fut>(
    registry: &BackendRegistry,
    operation: &str,
    destination: &str,
    element_uri: &str,
    storage_auth: Option<&StorageAuth>,
    call: F,
) -> Result<T>
where
    F: FnOnce(Arc<dyn StorageService>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let (service_id, service_config) = registry.service_config(destination)?;
    let envelope = CallEnvelope::new(operation, service_config.timeout());
    let service = registry
        .storage_service(destination, Some(element_uri), storage_auth)
        .await?;

    debug!("{} on {} via service {}", operation, destination, service_id);
    envelope.call(call(service)).await
}

/// Convert a failure at the facade boundary
fn fail(error: crate::Error, context: &[(&str, &str)]) -> CanonicalError {
    let mapped = ErrorMapper::map(error, context);
    debug!("Operation failed with {}", mapped);
    mapped
}

/// All facade tools sharing one registry
#[derive(Debug, Clone)]
pub struct Facade {
    pub transfers: TransferTool,
    pub storage: StorageTool,
    pub doi: DoiTool,
}

impl Facade {
    /// Build the facade with the adapters shipped in this crate
    pub fn from_config(config: Config) -> ToolResult<Self> {
        Self::new(Arc::new(config), AdapterFactories::builtin())
    }

    pub fn new(config: Arc<Config>, factories: AdapterFactories) -> ToolResult<Self> {
        let chain = ParserChain::new(&config, &factories).map_err(|e| fail(e, &[]))?;
        let timeout = config.http.resolve_timeout();
        let registry =
            Arc::new(BackendRegistry::new(config, factories).map_err(|e| fail(e, &[]))?);

        info!("Facade ready");
        Ok(Self {
            transfers: TransferTool::new(Arc::clone(&registry)),
            storage: StorageTool::new(registry),
            doi: DoiTool::new(Arc::new(chain), timeout),
        })
    }

    pub fn registry(&self) -> &BackendRegistry {
        self.transfers.registry()
    }
}
