use super::{fail, invoke_storage, ToolResult};
use crate::models::{AccessToken, Listing, OperationResult, StorageAuth, StorageElement};
use crate::registry::BackendRegistry;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Input addressing one storage element
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageInput {
    /// Destination key selecting the storage backend
    pub destination: String,
    /// Storage element URI, e.g. `s3://bucket/folder/` or `davs://se.example.org/path`
    pub se_url: String,
    #[serde(default)]
    pub storage_auth: Option<StorageAuth>,
}

/// Input for renaming a storage element
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameInput {
    pub destination: String,
    pub se_url: String,
    pub new_se_url: String,
    #[serde(default)]
    pub storage_auth: Option<StorageAuth>,
}

/// Storage operations of the facade
#[derive(Clone)]
pub struct StorageTool {
    registry: Arc<BackendRegistry>,
}

impl std::fmt::Debug for StorageTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageTool")
            .field("registry", &"BackendRegistry")
            .finish()
    }
}

/// Request context attached to storage failures
fn context(input: &StorageInput) -> [(&'static str, &str); 2] {
    [
        ("destination", input.destination.as_str()),
        ("seUrl", input.se_url.as_str()),
    ]
}

impl StorageTool {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    #[instrument(skip(self, auth, input), fields(destination = %input.destination, se_url = %input.se_url))]
    pub async fn list_folder(&self, auth: &AccessToken, input: StorageInput) -> ToolResult<Listing> {
        let (auth, storage_auth, uri) = (
            auth.clone(),
            input.storage_auth.clone(),
            input.se_url.clone(),
        );
        invoke_storage(
            &self.registry,
            "listFolder",
            &input.destination,
            &input.se_url,
            input.storage_auth.as_ref(),
            move |service| async move {
                service
                    .list_folder(&auth, storage_auth.as_ref(), &uri)
                    .await
            },
        )
        .await
        .map_err(|e| fail(e, &context(&input)))
    }

    #[instrument(skip(self, auth, input), fields(destination = %input.destination, se_url = %input.se_url))]
    pub async fn stat_element(
        &self,
        auth: &AccessToken,
        input: StorageInput,
    ) -> ToolResult<StorageElement> {
        let (auth, storage_auth, uri) = (
            auth.clone(),
            input.storage_auth.clone(),
            input.se_url.clone(),
        );
        invoke_storage(
            &self.registry,
            "statElement",
            &input.destination,
            &input.se_url,
            input.storage_auth.as_ref(),
            move |service| async move {
                service
                    .stat_element(&auth, storage_auth.as_ref(), &uri)
                    .await
            },
        )
        .await
        .map_err(|e| fail(e, &context(&input)))
    }

    #[instrument(skip(self, auth, input), fields(destination = %input.destination, se_url = %input.se_url))]
    pub async fn create_folder(
        &self,
        auth: &AccessToken,
        input: StorageInput,
    ) -> ToolResult<OperationResult> {
        let (auth, storage_auth, uri) = (
            auth.clone(),
            input.storage_auth.clone(),
            input.se_url.clone(),
        );
        let result = invoke_storage(
            &self.registry,
            "createFolder",
            &input.destination,
            &input.se_url,
            input.storage_auth.as_ref(),
            move |service| async move {
                service
                    .create_folder(&auth, storage_auth.as_ref(), &uri)
                    .await
            },
        )
        .await
        .map_err(|e| fail(e, &context(&input)))?;

        info!("Created folder {} on {}", input.se_url, input.destination);
        Ok(result)
    }

    #[instrument(skip(self, auth, input), fields(destination = %input.destination, se_url = %input.se_url))]
    pub async fn delete_folder(
        &self,
        auth: &AccessToken,
        input: StorageInput,
    ) -> ToolResult<OperationResult> {
        let (auth, storage_auth, uri) = (
            auth.clone(),
            input.storage_auth.clone(),
            input.se_url.clone(),
        );
        let result = invoke_storage(
            &self.registry,
            "deleteFolder",
            &input.destination,
            &input.se_url,
            input.storage_auth.as_ref(),
            move |service| async move {
                service
                    .delete_folder(&auth, storage_auth.as_ref(), &uri)
                    .await
            },
        )
        .await
        .map_err(|e| fail(e, &context(&input)))?;

        info!("Deleted folder {} on {}", input.se_url, input.destination);
        Ok(result)
    }

    #[instrument(skip(self, auth, input), fields(destination = %input.destination, se_url = %input.se_url))]
    pub async fn delete_file(
        &self,
        auth: &AccessToken,
        input: StorageInput,
    ) -> ToolResult<OperationResult> {
        let (auth, storage_auth, uri) = (
            auth.clone(),
            input.storage_auth.clone(),
            input.se_url.clone(),
        );
        let result = invoke_storage(
            &self.registry,
            "deleteFile",
            &input.destination,
            &input.se_url,
            input.storage_auth.as_ref(),
            move |service| async move {
                service
                    .delete_file(&auth, storage_auth.as_ref(), &uri)
                    .await
            },
        )
        .await
        .map_err(|e| fail(e, &context(&input)))?;

        info!("Deleted file {} on {}", input.se_url, input.destination);
        Ok(result)
    }

    #[instrument(skip(self, auth, input), fields(destination = %input.destination, se_url = %input.se_url, new_se_url = %input.new_se_url))]
    pub async fn rename(&self, auth: &AccessToken, input: RenameInput) -> ToolResult<OperationResult> {
        let (auth, storage_auth) = (auth.clone(), input.storage_auth.clone());
        let (old_uri, new_uri) = (input.se_url.clone(), input.new_se_url.clone());

        let result = invoke_storage(
            &self.registry,
            "rename",
            &input.destination,
            &input.se_url,
            input.storage_auth.as_ref(),
            move |service| async move {
                service
                    .rename(&auth, storage_auth.as_ref(), &old_uri, &new_uri)
                    .await
            },
        )
        .await
        .map_err(|e| {
            fail(
                e,
                &[
                    ("destination", input.destination.as_str()),
                    ("seUrl", input.se_url.as_str()),
                    ("newSeUrl", input.new_se_url.as_str()),
                ],
            )
        })?;

        info!(
            "Renamed {} to {} on {}",
            input.se_url, input.new_se_url, input.destination
        );
        Ok(result)
    }
}
