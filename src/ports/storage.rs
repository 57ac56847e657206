//! # Storage Service Port

use crate::config::ServiceConfig;
use crate::models::{AccessToken, Listing, OperationResult, StorageAuth, StorageElement};
use crate::Result;
use async_trait::async_trait;

/// Contract for storage element management
///
/// Storage credentials travel with every call: an adapter instance is shared
/// by all callers of a service and never holds one caller's credentials.
#[async_trait]
pub trait StorageService: Send + Sync {
    fn implementation(&self) -> &str;

    /// Prepare client state for `config`.
    ///
    /// `element_uri` and `storage_auth` are those of the request that caused
    /// the adapter to be created; implementations may use them to validate
    /// the endpoint but must not retain the credentials.
    async fn init(
        &mut self,
        config: &ServiceConfig,
        element_uri: Option<&str>,
        storage_auth: Option<&StorageAuth>,
    ) -> bool;

    async fn list_folder(
        &self,
        auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<Listing>;

    async fn stat_element(
        &self,
        auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<StorageElement>;

    async fn create_folder(
        &self,
        auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<OperationResult>;

    async fn delete_folder(
        &self,
        auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<OperationResult>;

    async fn delete_file(
        &self,
        auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<OperationResult>;

    async fn rename(
        &self,
        auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        old_uri: &str,
        new_uri: &str,
    ) -> Result<OperationResult>;
}
