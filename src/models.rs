//! Backend-independent request and response types shared by every adapter.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access token forwarded to backends as a bearer credential
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Credentials for a storage element, separate from the transfer token
#[derive(Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct StorageAuth {
    pub access_key: String,
    pub secret_key: String,
}

impl StorageAuth {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for StorageAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAuth")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// Identity of the caller as seen by a transfer backend
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub base_id: Option<String>,
    pub user_dn: Option<String>,
    pub delegation_id: Option<String>,
    #[serde(default)]
    pub vos: Vec<String>,
    #[serde(default)]
    pub vo_ids: Vec<String>,
    pub auth_method: Option<String>,
}

/// One file to copy, with alternative sources and destinations
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileTransfer {
    pub sources: Vec<String>,
    pub destinations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
}

impl FileTransfer {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            sources: vec![source.into()],
            destinations: vec![destination.into()],
            ..Self::default()
        }
    }
}

/// Job-wide transfer options
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    pub verify_checksum: Option<bool>,
    pub overwrite: Option<bool>,
    pub retry: Option<u32>,
    pub retry_delay: Option<u32>,
    pub priority: Option<u8>,
    pub max_time_in_queue: Option<u32>,
    pub copy_pin_lifetime: Option<i64>,
    pub bring_online: Option<i64>,
    pub target_qos: Option<String>,
    pub job_metadata: Option<serde_json::Value>,
}

/// A transfer request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct TransferSpec {
    pub files: Vec<FileTransfer>,
    #[serde(default)]
    pub params: TransferParams,
}

/// Handle returned when a transfer is accepted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferHandle {
    pub job_id: String,
}

/// Lifecycle state of a transfer job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    Staging,
    Submitted,
    Ready,
    Active,
    Finished,
    #[serde(rename = "FINISHEDDIRTY")]
    FinishedDirty,
    Failed,
    Canceled,
    Unknown,
}

impl TransferState {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "STAGING" => Self::Staging,
            "SUBMITTED" => Self::Submitted,
            "READY" => Self::Ready,
            "ACTIVE" => Self::Active,
            "FINISHED" => Self::Finished,
            "FINISHEDDIRTY" | "FINISHED_DIRTY" => Self::FinishedDirty,
            "FAILED" => Self::Failed,
            "CANCELED" | "CANCELLED" => Self::Canceled,
            _ => Self::Unknown,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::FinishedDirty | Self::Failed | Self::Canceled
        )
    }

    /// Backend spelling of the state
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Staging => "STAGING",
            Self::Submitted => "SUBMITTED",
            Self::Ready => "READY",
            Self::Active => "ACTIVE",
            Self::Finished => "FINISHED",
            Self::FinishedDirty => "FINISHEDDIRTY",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Full description of a transfer job, in the generic vocabulary
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferDetails {
    pub job_id: String,
    pub job_state: Option<TransferState>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub verify_checksum: Option<bool>,
    pub overwrite: Option<bool>,
    pub priority: Option<i64>,
    pub retry: Option<i64>,
    pub retry_delay: Option<i64>,
    pub max_time_in_queue: Option<i64>,
    pub copy_pin_lifetime: Option<i64>,
    pub bring_online: Option<i64>,
    pub target_qos: Option<String>,
    pub cancel: Option<bool>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub submitted_to: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub vo: Option<String>,
    #[serde(rename = "userDN")]
    pub user_dn: Option<String>,
    pub job_metadata: Option<serde_json::Value>,
}

/// Filters for listing transfers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferFilter {
    #[serde(default)]
    pub states: Vec<TransferState>,
    pub vo: Option<String>,
    pub user_dn: Option<String>,
    pub delegation_id: Option<String>,
    pub source_se: Option<String>,
    pub destination_se: Option<String>,
    /// Only jobs submitted within this many hours
    pub time_window_hours: Option<u32>,
    pub limit: Option<u32>,
}

/// A page of transfers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransferList {
    pub count: usize,
    pub transfers: Vec<TransferDetails>,
}

impl From<Vec<TransferDetails>> for TransferList {
    fn from(transfers: Vec<TransferDetails>) -> Self {
        Self {
            count: transfers.len(),
            transfers,
        }
    }
}

/// Single field of a transfer, named in the generic vocabulary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldValue {
    pub field: String,
    pub value: serde_json::Value,
}

/// A file or folder in a storage element or dataset record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageElement {
    pub name: String,
    pub path: String,
    pub is_folder: bool,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StorageElement>,
}

impl StorageElement {
    pub fn file(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            ..Self::default()
        }
    }

    pub fn folder(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_folder: true,
            ..Self::default()
        }
    }
}

/// Contents of a folder or of a dataset record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    pub count: usize,
    pub elements: Vec<StorageElement>,
}

impl From<Vec<StorageElement>> for Listing {
    fn from(elements: Vec<StorageElement>) -> Self {
        Self {
            count: elements.len(),
            elements,
        }
    }
}

/// Outcome of a storage mutation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
}

impl OperationResult {
    pub const fn ok() -> Self {
        Self { success: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing() {
        assert_eq!(TransferState::parse("finished"), TransferState::Finished);
        assert_eq!(TransferState::parse("FINISHEDDIRTY"), TransferState::FinishedDirty);
        assert_eq!(TransferState::parse("CANCELLED"), TransferState::Canceled);
        assert_eq!(TransferState::parse("weird"), TransferState::Unknown);
        assert!(TransferState::Failed.is_terminal());
        assert!(!TransferState::Active.is_terminal());
    }

    #[test]
    fn test_secrets_are_redacted() {
        let token = AccessToken::new("secret-token");
        assert!(!format!("{token:?}").contains("secret-token"));

        let auth = StorageAuth::new("AKIA", "very-secret");
        let printed = format!("{auth:?}");
        assert!(printed.contains("AKIA"));
        assert!(!printed.contains("very-secret"));
    }

    #[test]
    fn test_details_use_generic_names() {
        let details = TransferDetails {
            job_id: "j1".to_string(),
            job_state: Some(TransferState::Active),
            user_dn: Some("/DC=org/CN=me".to_string()),
            ..TransferDetails::default()
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["jobState"], "ACTIVE");
        assert_eq!(json["userDN"], "/DC=org/CN=me");
    }
}
