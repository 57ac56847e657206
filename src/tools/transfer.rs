use super::{fail, invoke_transfer, invoke_transfer_on, ToolResult};
use crate::error::{ids, Error, Result};
use crate::models::{
    AccessToken, FieldValue, StorageAuth, TransferDetails, TransferFilter, TransferHandle,
    TransferList, TransferSpec, UserInfo,
};
use crate::registry::BackendRegistry;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Input for identity lookups
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UserInfoInput {
    /// Destination key selecting the transfer backend
    pub destination: String,
}

/// Input for submitting a transfer
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartTransferInput {
    pub destination: String,
    /// Files and job options
    pub transfer: TransferSpec,
    /// Credentials for the storage elements involved, if they need any
    #[serde(default)]
    pub storage_auth: Option<StorageAuth>,
}

/// Input for listing transfers
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindTransfersInput {
    pub destination: String,
    #[serde(flatten)]
    pub filter: TransferFilter,
}

/// Input addressing one transfer job
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferInfoInput {
    pub destination: String,
    pub job_id: String,
}

/// Input for a single-field query
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferFieldInput {
    pub destination: String,
    pub job_id: String,
    /// Field name in the generic vocabulary, e.g. `jobState`
    pub field_name: String,
}

/// Transfer operations of the facade
#[derive(Clone)]
pub struct TransferTool {
    registry: Arc<BackendRegistry>,
}

impl std::fmt::Debug for TransferTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferTool")
            .field("registry", &"BackendRegistry")
            .finish()
    }
}

impl TransferTool {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Identity of the caller on the destination's transfer backend
    #[instrument(skip(self, auth), fields(destination = %input.destination))]
    pub async fn get_user_info(
        &self,
        auth: &AccessToken,
        input: UserInfoInput,
    ) -> ToolResult<UserInfo> {
        let auth = auth.clone();
        invoke_transfer(
            &self.registry,
            "getUserInfo",
            &input.destination,
            move |service| async move { service.user_info(&auth).await },
        )
        .await
        .map_err(|e| fail(e, &[("destination", input.destination.as_str())]))
    }

    /// Submit a transfer job
    #[instrument(skip(self, auth, input), fields(destination = %input.destination, files = input.transfer.files.len()))]
    pub async fn start_transfer(
        &self,
        auth: &AccessToken,
        input: StartTransferInput,
    ) -> ToolResult<TransferHandle> {
        let destination = input.destination.clone();
        self.submit(auth, input)
            .await
            .map_err(|e| fail(e, &[("destination", destination.as_str())]))
    }

    async fn submit(&self, auth: &AccessToken, input: StartTransferInput) -> Result<TransferHandle> {
        Self::validate_spec(&input.transfer)?;

        let auth = auth.clone();
        let StartTransferInput {
            destination,
            transfer,
            storage_auth,
        } = input;

        let handle = invoke_transfer(
            &self.registry,
            "startTransfer",
            &destination,
            move |service| async move {
                service
                    .start_transfer(&auth, storage_auth.as_ref(), &transfer)
                    .await
            },
        )
        .await?;

        info!("Transfer {} submitted to {}", handle.job_id, destination);
        Ok(handle)
    }

    fn validate_spec(spec: &TransferSpec) -> Result<()> {
        if spec.files.is_empty() {
            return Err(Error::canonical(
                ids::BAD_REQUEST,
                "A transfer needs at least one file",
            ));
        }
        for (index, file) in spec.files.iter().enumerate() {
            if file.sources.is_empty() || file.destinations.is_empty() {
                return Err(Error::canonical(
                    ids::BAD_REQUEST,
                    "Every file needs a source and a destination",
                )
                .with_detail("fileIndex", index.to_string()));
            }
        }
        Ok(())
    }

    /// Transfers matching a filter
    #[instrument(skip(self, auth, input), fields(destination = %input.destination))]
    pub async fn find_transfers(
        &self,
        auth: &AccessToken,
        input: FindTransfersInput,
    ) -> ToolResult<TransferList> {
        let auth = auth.clone();
        let FindTransfersInput {
            destination,
            filter,
        } = input;

        invoke_transfer(&self.registry, "findTransfers", &destination, move |service| {
            async move { service.find_transfers(&auth, &filter).await }
        })
        .await
        .map_err(|e| fail(e, &[("destination", destination.as_str())]))
    }

    /// Full description of one transfer
    #[instrument(skip(self, auth), fields(destination = %input.destination, job_id = %input.job_id))]
    pub async fn get_transfer_info(
        &self,
        auth: &AccessToken,
        input: TransferInfoInput,
    ) -> ToolResult<TransferDetails> {
        let auth = auth.clone();
        let job_id = input.job_id.clone();
        invoke_transfer(
            &self.registry,
            "getTransferInfo",
            &input.destination,
            move |service| async move { service.transfer_info(&auth, &job_id).await },
        )
        .await
        .map_err(|e| {
            fail(
                e,
                &[("destination", input.destination.as_str()), ("jobId", input.job_id.as_str())],
            )
        })
    }

    /// One field of a transfer, named in the generic vocabulary
    #[instrument(skip(self, auth), fields(destination = %input.destination, job_id = %input.job_id, field = %input.field_name))]
    pub async fn get_transfer_field(
        &self,
        auth: &AccessToken,
        input: TransferFieldInput,
    ) -> ToolResult<FieldValue> {
        self.transfer_field(auth, &input).await.map_err(|e| {
            fail(
                e,
                &[
                    ("destination", input.destination.as_str()),
                    ("jobId", input.job_id.as_str()),
                    ("fieldName", input.field_name.as_str()),
                ],
            )
        })
    }

    async fn transfer_field(&self, auth: &AccessToken, input: &TransferFieldInput) -> Result<FieldValue> {
        // Unknown fields are rejected before the backend is contacted
        let service = self.registry.transfer_service(&input.destination).await?;
        let backend_field = service.field_map().translate(&input.field_name).ok_or_else(|| {
            Error::canonical(
                ids::FIELD_NOT_SUPPORTED,
                "Field is not supported by this transfer backend",
            )
            .with_detail("fieldName", input.field_name.as_str())
        })?;

        let auth = auth.clone();
        let job_id = input.job_id.clone();
        let value = invoke_transfer_on(
            &self.registry,
            service,
            "getTransferField",
            &input.destination,
            move |service| async move {
                service.transfer_field(&auth, &job_id, backend_field).await
            },
        )
        .await?;

        Ok(FieldValue {
            field: input.field_name.clone(),
            value,
        })
    }

    /// Cancel a transfer and return its final description
    #[instrument(skip(self, auth), fields(destination = %input.destination, job_id = %input.job_id))]
    pub async fn cancel_transfer(
        &self,
        auth: &AccessToken,
        input: TransferInfoInput,
    ) -> ToolResult<TransferDetails> {
        let auth = auth.clone();
        let job_id = input.job_id.clone();
        let details = invoke_transfer(
            &self.registry,
            "cancelTransfer",
            &input.destination,
            move |service| async move { service.cancel_transfer(&auth, &job_id).await },
        )
        .await
        .map_err(|e| {
            fail(
                e,
                &[("destination", input.destination.as_str()), ("jobId", input.job_id.as_str())],
            )
        })?;

        info!("Transfer {} on {} cancelled", input.job_id, input.destination);
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileTransfer;

    #[test]
    fn test_spec_validation() {
        assert!(TransferTool::validate_spec(&TransferSpec::default()).is_err());

        let mut spec = TransferSpec {
            files: vec![FileTransfer::new("https://a/x", "https://b/x")],
            ..TransferSpec::default()
        };
        assert!(TransferTool::validate_spec(&spec).is_ok());

        spec.files.push(FileTransfer::default());
        let err = TransferTool::validate_spec(&spec).unwrap_err();
        assert_eq!(err.id(), ids::BAD_REQUEST);
    }

    #[test]
    fn test_field_input_shape() {
        let input: TransferFieldInput = serde_json::from_value(serde_json::json!({
            "destination": "dcache",
            "jobId": "j-1",
            "fieldName": "jobState"
        }))
        .unwrap();
        assert_eq!(input.field_name, "jobState");
    }

    #[test]
    fn test_find_input_flattens_filter() {
        let input: FindTransfersInput = serde_json::from_value(serde_json::json!({
            "destination": "dcache",
            "states": ["ACTIVE", "FAILED"],
            "limit": 5
        }))
        .unwrap();
        assert_eq!(input.filter.states.len(), 2);
        assert_eq!(input.filter.limit, Some(5));
    }
}
