//! # Transfer Service Port

use super::StorageService;
use crate::config::ServiceConfig;
use crate::fields::FieldMap;
use crate::models::{
    AccessToken, StorageAuth, TransferDetails, TransferFilter, TransferHandle, TransferList,
    TransferSpec, UserInfo,
};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Contract for bulk file-transfer backends
///
/// Instances are created once per configured service and initialized before
/// they are shared, so every operation takes `&self`.
#[async_trait]
pub trait TransferService: Send + Sync {
    /// Implementation identifier, as used in the factory table
    fn implementation(&self) -> &str;

    /// Generic → backend field names understood by this backend
    fn field_map(&self) -> &'static FieldMap;

    /// Prepare client state (connection pool, base URL) for `config`.
    ///
    /// Returns `false` when the adapter cannot serve this configuration.
    async fn init(&mut self, config: &ServiceConfig) -> bool;

    /// Identity of the caller as the backend sees it
    async fn user_info(&self, auth: &AccessToken) -> Result<UserInfo>;

    async fn start_transfer(
        &self,
        auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        spec: &TransferSpec,
    ) -> Result<TransferHandle>;

    async fn find_transfers(&self, auth: &AccessToken, filter: &TransferFilter)
        -> Result<TransferList>;

    async fn transfer_info(&self, auth: &AccessToken, job_id: &str) -> Result<TransferDetails>;

    /// Value of one field, named in the backend's own vocabulary
    async fn transfer_field(
        &self,
        auth: &AccessToken,
        job_id: &str,
        backend_field: &str,
    ) -> Result<serde_json::Value>;

    async fn cancel_transfer(&self, auth: &AccessToken, job_id: &str) -> Result<TransferDetails>;

    /// Storage view of this backend, when it also manages storage elements
    fn as_storage(self: Arc<Self>) -> Option<Arc<dyn StorageService>> {
        None
    }
}
