//! # Canonical Error Model
//!
//! Backend adapters and the core raise [`Error`], a closed sum type built once
//! at the boundary where a backend call returns. Callers of the facade never
//! see it directly: every failure is converted exactly once, by
//! [`ErrorMapper::map`], into a [`CanonicalError`] that has the same shape no
//! matter which backend produced it.

use reqwest::StatusCode;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Ordered key/value context attached to an error
pub type Details = BTreeMap<String, String>;

/// Canonical error identifiers
pub mod ids {
    pub const INVALID_SERVICE_CONFIG: &str = "invalidServiceConfig";
    pub const INVALID_PARSER_CONFIG: &str = "invalidParserConfig";
    pub const TRANSFER_NOT_SUPPORTED: &str = "transferNotSupported";
    pub const STORAGE_NOT_SUPPORTED: &str = "storageNotSupported";
    pub const FIELD_NOT_SUPPORTED: &str = "fieldNotSupported";
    pub const FIELD_NOT_FOUND: &str = "fieldNotFound";
    pub const TRANSFER_NOT_FOUND: &str = "transferNotFound";
    pub const STORAGE_ELEMENT_NOT_FOUND: &str = "storageElementNotFound";
    pub const FOLDER_NOT_EMPTY: &str = "folderNotEmpty";
    pub const DOI_NOT_SUPPORTED: &str = "doiNotSupported";
    pub const DOI_INVALID: &str = "doiInvalid";
    pub const URL_INVALID: &str = "urlInvalid";
    pub const NO_FILES_LINK: &str = "noFilesLink";
    pub const NOT_AUTHENTICATED: &str = "notAuthenticated";
    pub const NO_ACCESS: &str = "noAccess";
    pub const BAD_REQUEST: &str = "badRequest";
    pub const NOT_FOUND: &str = "notFound";
    pub const PROCESSING_ERROR: &str = "processingError";
    pub const EXCEPTION: &str = "exception";
}

/// Ids that always surface as a bad request, whatever raised them
const BAD_REQUEST_IDS: &[&str] = &[
    ids::FIELD_NOT_SUPPORTED,
    ids::DOI_NOT_SUPPORTED,
    ids::DOI_INVALID,
    ids::URL_INVALID,
    ids::NO_FILES_LINK,
];

/// Failures raised by the core and by backend adapters
#[derive(Error, Debug)]
pub enum Error {
    /// Raised directly by the core with an id from the canonical taxonomy
    #[error("{id}: {}", description.as_deref().unwrap_or("no description"))]
    Canonical {
        id: String,
        description: Option<String>,
        details: Details,
    },

    /// A backend answered with a non-success HTTP status
    #[error("Backend returned {status}: {}", message.as_deref().unwrap_or(""))]
    Http {
        status: StatusCode,
        id: Option<String>,
        message: Option<String>,
        details: Details,
    },

    /// The backend could not be reached or its response could not be interpreted
    #[error("Processing error: {message}")]
    Processing {
        message: String,
        cause: Option<String>,
    },

    /// Deadline of the call envelope elapsed
    #[error("Operation {operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Anything else
    #[error("Unexpected failure: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Core failure with a canonical id and a description
    pub fn canonical(id: &str, description: impl Into<String>) -> Self {
        Self::Canonical {
            id: id.to_string(),
            description: Some(description.into()),
            details: Details::new(),
        }
    }

    /// Backend HTTP failure without an explicit id
    pub fn http(status: StatusCode, message: Option<String>) -> Self {
        Self::Http {
            status,
            id: None,
            message,
            details: Details::new(),
        }
    }

    /// Transport or decoding failure with its inner cause
    pub fn processing(message: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Processing {
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }

    /// Attach a detail entry. Only canonical and HTTP failures carry details.
    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        if let Self::Canonical { details, .. } | Self::Http { details, .. } = &mut self {
            details.insert(key.to_string(), value.into());
        }
        self
    }

    /// Canonical id this failure will carry, before detail-based refinement
    pub fn id(&self) -> String {
        match self {
            Self::Canonical { id, .. } => id.clone(),
            Self::Http { status, id, .. } => id.clone().unwrap_or_else(|| id_for_status(*status)),
            Self::Processing { .. } => ids::PROCESSING_ERROR.to_string(),
            Self::Timeout { operation, .. } => timeout_id(operation),
            Self::Config(_) => ids::INVALID_SERVICE_CONFIG.to_string(),
            Self::Other(_) => ids::EXCEPTION.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::http(status, Some(err.to_string()));
        }
        let cause = std::error::Error::source(&err).map(ToString::to_string);
        Self::Processing {
            message: err.to_string(),
            cause,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::processing("Failed to parse backend response", err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::canonical(ids::URL_INVALID, format!("Invalid URL: {err}"))
    }
}

/// Unified failure returned to every caller of the facade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalError {
    /// Stable id from the canonical taxonomy, never empty
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: Details,
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
}

fn serialize_status<S: Serializer>(status: &StatusCode, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u16(status.as_u16())
}

impl CanonicalError {
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

impl fmt::Display for CanonicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.status.as_u16())?;
        if let Some(description) = &self.description {
            write!(f, ": {description}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CanonicalError {}

/// Converts raised failures into [`CanonicalError`]s
pub struct ErrorMapper;

impl ErrorMapper {
    /// Map a failure, merging caller-supplied context into its details.
    ///
    /// Context entries with empty values are dropped; details already carried
    /// by the failure win on key collision.
    pub fn map(error: Error, context: &[(&str, &str)]) -> CanonicalError {
        let (id, description, mut details, status, derived_id) = match error {
            Error::Canonical {
                id,
                description,
                details,
            } => {
                let status = status_for_id(&id);
                (id, description, details, status, false)
            }
            Error::Http {
                status,
                id,
                message,
                details,
            } => {
                let derived = id.is_none();
                let id = id.unwrap_or_else(|| id_for_status(status));
                let description = message
                    .filter(|m| !m.is_empty())
                    .or_else(|| status.canonical_reason().map(str::to_string));
                (id, description, details, status, derived)
            }
            Error::Processing { message, cause } => (
                ids::PROCESSING_ERROR.to_string(),
                Some(cause.unwrap_or(message)),
                Details::new(),
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
            ),
            Error::Timeout { operation, timeout } => (
                timeout_id(&operation),
                Some(format!("Operation timed out after {}ms", timeout.as_millis())),
                Details::new(),
                StatusCode::GATEWAY_TIMEOUT,
                false,
            ),
            Error::Config(err) => (
                ids::INVALID_SERVICE_CONFIG.to_string(),
                Some(err.to_string()),
                Details::new(),
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
            ),
            Error::Other(message) => (
                ids::EXCEPTION.to_string(),
                Some(message),
                Details::new(),
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
            ),
        };

        for (key, value) in context {
            if !value.is_empty() {
                details
                    .entry((*key).to_string())
                    .or_insert_with(|| (*value).to_string());
            }
        }

        let id = if derived_id && status == StatusCode::NOT_FOUND {
            refine_not_found(&details).map_or(id, str::to_string)
        } else {
            id
        };

        let status = if BAD_REQUEST_IDS.contains(&id.as_str()) {
            StatusCode::BAD_REQUEST
        } else {
            status
        };

        CanonicalError {
            id: if id.is_empty() { ids::EXCEPTION.to_string() } else { id },
            description,
            details,
            status,
        }
    }
}

fn timeout_id(operation: &str) -> String {
    format!("{operation}Timeout")
}

fn id_for_status(status: StatusCode) -> String {
    match status {
        StatusCode::UNAUTHORIZED => ids::NOT_AUTHENTICATED,
        StatusCode::FORBIDDEN => ids::NO_ACCESS,
        StatusCode::BAD_REQUEST => ids::BAD_REQUEST,
        StatusCode::NOT_FOUND => ids::NOT_FOUND,
        _ => ids::EXCEPTION,
    }
    .to_string()
}

fn refine_not_found(details: &Details) -> Option<&'static str> {
    if details.contains_key("fieldName") {
        Some(ids::FIELD_NOT_FOUND)
    } else if details.contains_key("jobId") {
        Some(ids::TRANSFER_NOT_FOUND)
    } else if details.contains_key("seUrl") || details.contains_key("seUri") {
        Some(ids::STORAGE_ELEMENT_NOT_FOUND)
    } else {
        None
    }
}

/// Status class of an id raised directly by the core
fn status_for_id(id: &str) -> StatusCode {
    match id {
        ids::NOT_AUTHENTICATED => StatusCode::UNAUTHORIZED,
        ids::NO_ACCESS => StatusCode::FORBIDDEN,
        ids::BAD_REQUEST | ids::TRANSFER_NOT_SUPPORTED | ids::STORAGE_NOT_SUPPORTED => {
            StatusCode::BAD_REQUEST
        }
        ids::NOT_FOUND
        | ids::FIELD_NOT_FOUND
        | ids::TRANSFER_NOT_FOUND
        | ids::STORAGE_ELEMENT_NOT_FOUND => StatusCode::NOT_FOUND,
        ids::FOLDER_NOT_EMPTY => StatusCode::CONFLICT,
        id if BAD_REQUEST_IDS.contains(&id) => StatusCode::BAD_REQUEST,
        id if id.ends_with("Timeout") => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_ids() {
        let cases = [
            (StatusCode::UNAUTHORIZED, ids::NOT_AUTHENTICATED),
            (StatusCode::FORBIDDEN, ids::NO_ACCESS),
            (StatusCode::BAD_REQUEST, ids::BAD_REQUEST),
            (StatusCode::NOT_FOUND, ids::NOT_FOUND),
            (StatusCode::BAD_GATEWAY, ids::EXCEPTION),
        ];

        for (status, expected) in cases {
            let mapped = ErrorMapper::map(Error::http(status, None), &[]);
            assert_eq!(mapped.id, expected, "status {status}");
            assert_eq!(mapped.status, status);
        }
    }

    #[test]
    fn test_not_found_refinement() {
        let mapped = ErrorMapper::map(
            Error::http(StatusCode::NOT_FOUND, None),
            &[("destination", "dcache"), ("jobId", "abc")],
        );
        assert_eq!(mapped.id, ids::TRANSFER_NOT_FOUND);

        let mapped = ErrorMapper::map(
            Error::http(StatusCode::NOT_FOUND, None),
            &[("jobId", "abc"), ("fieldName", "jobState")],
        );
        assert_eq!(mapped.id, ids::FIELD_NOT_FOUND);

        let mapped = ErrorMapper::map(
            Error::http(StatusCode::NOT_FOUND, None),
            &[("seUri", "s3://bucket/x")],
        );
        assert_eq!(mapped.id, ids::STORAGE_ELEMENT_NOT_FOUND);
    }

    #[test]
    fn test_explicit_http_id_is_not_refined() {
        let err = Error::Http {
            status: StatusCode::NOT_FOUND,
            id: Some("recordGone".to_string()),
            message: None,
            details: Details::new(),
        };
        let mapped = ErrorMapper::map(err, &[("jobId", "abc")]);
        assert_eq!(mapped.id, "recordGone");
    }

    #[test]
    fn test_description_defaults_to_reason_phrase() {
        let mapped = ErrorMapper::map(Error::http(StatusCode::FORBIDDEN, None), &[]);
        assert_eq!(mapped.description.as_deref(), Some("Forbidden"));

        let mapped = ErrorMapper::map(
            Error::http(StatusCode::FORBIDDEN, Some("VO not allowed".to_string())),
            &[],
        );
        assert_eq!(mapped.description.as_deref(), Some("VO not allowed"));
    }

    #[test]
    fn test_forced_bad_request_ids() {
        for id in BAD_REQUEST_IDS {
            let mapped = ErrorMapper::map(Error::canonical(id, "nope"), &[]);
            assert_eq!(mapped.status, StatusCode::BAD_REQUEST, "id {id}");
            assert_eq!(mapped.id, *id);
        }

        let forced = Error::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            id: Some(ids::NO_FILES_LINK.to_string()),
            message: None,
            details: Details::new(),
        };
        assert_eq!(ErrorMapper::map(forced, &[]).status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_processing_uses_inner_cause() {
        let err = Error::processing("Failed to parse backend response", "expected value at line 1");
        let mapped = ErrorMapper::map(err, &[]);
        assert_eq!(mapped.id, ids::PROCESSING_ERROR);
        assert_eq!(mapped.description.as_deref(), Some("expected value at line 1"));

        let err = Error::Processing {
            message: "connection reset".to_string(),
            cause: None,
        };
        assert_eq!(
            ErrorMapper::map(err, &[]).description.as_deref(),
            Some("connection reset")
        );
    }

    #[test]
    fn test_timeout_id() {
        let err = Error::Timeout {
            operation: "startTransfer".to_string(),
            timeout: Duration::from_millis(250),
        };
        let mapped = ErrorMapper::map(err, &[]);
        assert_eq!(mapped.id, "startTransferTimeout");
        assert_eq!(mapped.status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_unclassified_defaults_to_exception() {
        let mapped = ErrorMapper::map(Error::Other("boom".to_string()), &[]);
        assert_eq!(mapped.id, ids::EXCEPTION);
        assert_eq!(mapped.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_detail_merge_precedence() {
        let err = Error::canonical(ids::FIELD_NOT_SUPPORTED, "unknown field")
            .with_detail("fieldName", "foo");
        let mapped = ErrorMapper::map(
            err,
            &[("fieldName", "bar"), ("destination", "dcache"), ("jobId", "")],
        );

        assert_eq!(mapped.detail("fieldName"), Some("foo"));
        assert_eq!(mapped.detail("destination"), Some("dcache"));
        assert_eq!(mapped.detail("jobId"), None);
    }

    #[test]
    fn test_serialized_shape() {
        let mapped = ErrorMapper::map(
            Error::canonical(ids::DOI_INVALID, "not a DOI"),
            &[("doi", "xyz")],
        );
        let json = serde_json::to_value(&mapped).unwrap();
        assert_eq!(json["id"], "doiInvalid");
        assert_eq!(json["status"], 400);
        assert_eq!(json["details"]["doi"], "xyz");
    }
}
