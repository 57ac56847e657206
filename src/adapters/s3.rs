//! S3-compatible object store adapter.
//!
//! Element URIs are either `s3://bucket/key` (served by the configured
//! endpoint) or path-style `https://host/bucket/key`. Folders are zero-byte
//! objects whose key ends in `/`. Buckets are built per call from the
//! request's credentials, so the shared adapter never holds a caller's keys.

use crate::config::{Credentials as ServiceCredentials, ServiceConfig};
use crate::error::{ids, Error, Result};
use crate::models::{AccessToken, Listing, OperationResult, StorageAuth, StorageElement};
use crate::ports::StorageService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_REGION: &str = "us-east-1";

static S3_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<Message>(.*?)</Message>").expect("valid S3 message pattern")
});

/// Convert a rust-s3 failure, keeping the HTTP status when there is one
fn s3_error(err: S3Error) -> Error {
    match err {
        S3Error::HttpFailWithBody(code, body) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY);
            let message = S3_MESSAGE
                .captures(&body)
                .map(|captures| captures[1].trim().to_string())
                .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()));
            Error::http(status, message)
        }
        other => Error::processing("S3 request failed", other),
    }
}

/// A parsed element URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    /// Base URL of the object store
    pub endpoint: String,
    pub bucket: String,
    /// Object key, without a leading `/`; empty for the bucket root
    pub key: String,
    /// Whether the caller used the `s3://` form
    native: bool,
}

impl S3Location {
    /// Parse `uri`, using `default_endpoint` for `s3://` URIs
    pub fn parse(uri: &str, default_endpoint: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            Error::canonical(ids::URL_INVALID, format!("Invalid storage element URI: {reason}"))
                .with_detail("seUri", uri)
        };

        let url = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
        match url.scheme() {
            "s3" => {
                let bucket = url.host_str().ok_or_else(|| invalid("missing bucket"))?;
                Ok(Self {
                    endpoint: default_endpoint.trim_end_matches('/').to_string(),
                    bucket: bucket.to_string(),
                    key: url.path().trim_start_matches('/').to_string(),
                    native: true,
                })
            }
            "http" | "https" => {
                let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
                let endpoint = match url.port() {
                    Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                    None => format!("{}://{}", url.scheme(), host),
                };
                let path = url.path().trim_start_matches('/');
                let (bucket, key) = path.split_once('/').unwrap_or((path, ""));
                if bucket.is_empty() {
                    return Err(invalid("missing bucket"));
                }
                Ok(Self {
                    endpoint,
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    native: false,
                })
            }
            other => Err(invalid(&format!("unsupported scheme {other}"))),
        }
    }

    /// Same form as the parsed URI, pointing at `key`
    pub fn uri_for(&self, key: &str) -> String {
        if self.native {
            format!("s3://{}/{}", self.bucket, key)
        } else {
            format!("{}/{}/{}", self.endpoint, self.bucket, key)
        }
    }

    /// Key as a folder prefix: empty for the root, otherwise ending in `/`
    pub fn folder_prefix(&self) -> String {
        folder_key(&self.key)
    }

    pub fn is_folder_uri(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }
}

fn folder_key(key: &str) -> String {
    let trimmed = key.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

fn base_name(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key)
}

fn parse_listing_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn parse_header_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// What lives under a folder prefix
struct FolderContents {
    marker: bool,
    elements: Vec<StorageElement>,
}

/// S3 storage adapter
#[derive(Debug, Default)]
pub struct S3Storage {
    endpoint: String,
    credentials: Option<ServiceCredentials>,
}

impl S3Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn locate(&self, uri: &str) -> Result<S3Location> {
        S3Location::parse(uri, &self.endpoint)
    }

    /// Request credentials first, then the service's own, then anonymous access
    fn credentials(&self, storage_auth: Option<&StorageAuth>) -> Result<Credentials> {
        let keys = storage_auth
            .map(|auth| (auth.access_key.as_str(), auth.secret_key.as_str()))
            .or_else(|| {
                self.credentials
                    .as_ref()
                    .map(|c| (c.access_key.as_str(), c.secret_key.as_str()))
            });

        let credentials = match keys {
            Some((access_key, secret_key)) => {
                Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            }
            None => Credentials::anonymous(),
        };
        credentials.map_err(|e| Error::canonical(ids::NOT_AUTHENTICATED, e.to_string()))
    }

    fn bucket(&self, location: &S3Location, storage_auth: Option<&StorageAuth>) -> Result<Box<Bucket>> {
        let region = Region::Custom {
            region: DEFAULT_REGION.to_string(),
            endpoint: location.endpoint.clone(),
        };
        let bucket = Bucket::new(&location.bucket, region, self.credentials(storage_auth)?)
            .map_err(s3_error)?
            .with_path_style();
        // rust-s3 releases differ on whether buckets come boxed
        #[allow(clippy::useless_conversion)]
        let bucket: Box<Bucket> = bucket.into();
        Ok(bucket)
    }

    async fn folder_contents(&self, bucket: &Bucket, location: &S3Location) -> Result<FolderContents> {
        let prefix = location.folder_prefix();
        let pages = bucket
            .list(prefix.clone(), Some("/".to_string()))
            .await
            .map_err(s3_error)?;

        let mut contents = FolderContents {
            marker: false,
            elements: Vec::new(),
        };
        for page in pages {
            for common in page.common_prefixes.unwrap_or_default() {
                contents.elements.push(StorageElement::folder(
                    base_name(&common.prefix),
                    location.uri_for(&common.prefix),
                ));
            }
            for object in page.contents {
                if object.key == prefix {
                    contents.marker = true;
                    continue;
                }
                let mut element = StorageElement::file(
                    base_name(&object.key),
                    location.uri_for(&object.key),
                    object.size,
                );
                element.modified_at = parse_listing_time(&object.last_modified);
                element.checksum = object.e_tag.map(|tag| tag.trim_matches('"').to_string());
                contents.elements.push(element);
            }
        }
        Ok(contents)
    }

    fn not_found(uri: &str) -> Error {
        Error::http(StatusCode::NOT_FOUND, Some("Storage element does not exist".to_string()))
            .with_detail("seUri", uri)
    }
}

#[async_trait]
impl StorageService for S3Storage {
    fn implementation(&self) -> &str {
        "s3"
    }

    async fn init(
        &mut self,
        config: &ServiceConfig,
        element_uri: Option<&str>,
        _storage_auth: Option<&StorageAuth>,
    ) -> bool {
        if let Err(e) = Url::parse(&config.url) {
            warn!("Invalid S3 endpoint {}: {}", config.url, e);
            return false;
        }
        self.endpoint = config.url.trim_end_matches('/').to_string();
        self.credentials.clone_from(&config.credentials);

        if let Some(uri) = element_uri {
            if let Err(e) = self.locate(uri) {
                warn!("First S3 request carried an unusable URI {}: {}", uri, e);
            }
        }
        debug!("S3 adapter bound to {}", self.endpoint);
        true
    }

    async fn list_folder(
        &self,
        _auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<Listing> {
        let location = self.locate(uri)?;
        let bucket = self.bucket(&location, storage_auth)?;
        let contents = self.folder_contents(&bucket, &location).await?;

        if !contents.marker && contents.elements.is_empty() && !location.key.is_empty() {
            return Err(Self::not_found(uri));
        }
        Ok(Listing::from(contents.elements))
    }

    async fn stat_element(
        &self,
        _auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<StorageElement> {
        let location = self.locate(uri)?;
        let bucket = self.bucket(&location, storage_auth)?;
        let name = base_name(&location.key);

        if !location.is_folder_uri() {
            match bucket.head_object(&location.key).await {
                Ok((head, _)) => {
                    let size = head
                        .content_length
                        .and_then(|len| u64::try_from(len).ok())
                        .unwrap_or_default();
                    let mut element = StorageElement::file(name, uri, size);
                    element.modified_at = head.last_modified.as_deref().and_then(parse_header_time);
                    element.media_type = head.content_type;
                    element.checksum = head.e_tag.map(|tag| tag.trim_matches('"').to_string());
                    return Ok(element);
                }
                Err(S3Error::HttpFailWithBody(404, _)) => {
                    debug!("No object at {}, checking for a folder", uri);
                }
                Err(e) => return Err(s3_error(e)),
            }
        }

        let contents = self.folder_contents(&bucket, &location).await?;
        if contents.marker || !contents.elements.is_empty() || location.key.is_empty() {
            return Ok(StorageElement::folder(
                name,
                location.uri_for(&location.folder_prefix()),
            ));
        }
        Err(Self::not_found(uri))
    }

    async fn create_folder(
        &self,
        _auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<OperationResult> {
        let location = self.locate(uri)?;
        let marker = location.folder_prefix();
        if marker.is_empty() {
            return Err(Error::canonical(ids::BAD_REQUEST, "Cannot create the bucket root")
                .with_detail("seUri", uri));
        }

        let bucket = self.bucket(&location, storage_auth)?;
        bucket.put_object(&marker, &[]).await.map_err(s3_error)?;
        info!("Created S3 folder {}", location.uri_for(&marker));
        Ok(OperationResult::ok())
    }

    async fn delete_folder(
        &self,
        _auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<OperationResult> {
        let location = self.locate(uri)?;
        let bucket = self.bucket(&location, storage_auth)?;
        let contents = self.folder_contents(&bucket, &location).await?;

        if !contents.elements.is_empty() {
            return Err(Error::canonical(ids::FOLDER_NOT_EMPTY, "Folder is not empty")
                .with_detail("seUri", uri));
        }
        if !contents.marker {
            return Err(Self::not_found(uri));
        }

        bucket
            .delete_object(location.folder_prefix())
            .await
            .map_err(s3_error)?;
        info!("Deleted S3 folder {}", uri);
        Ok(OperationResult::ok())
    }

    async fn delete_file(
        &self,
        _auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<OperationResult> {
        let location = self.locate(uri)?;
        if location.is_folder_uri() {
            return Err(Error::canonical(ids::BAD_REQUEST, "URI names a folder, not a file")
                .with_detail("seUri", uri));
        }

        let bucket = self.bucket(&location, storage_auth)?;
        // DELETE succeeds on missing keys, so check first
        bucket.head_object(&location.key).await.map_err(s3_error)?;
        bucket.delete_object(&location.key).await.map_err(s3_error)?;
        info!("Deleted S3 object {}", uri);
        Ok(OperationResult::ok())
    }

    async fn rename(
        &self,
        _auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        old_uri: &str,
        new_uri: &str,
    ) -> Result<OperationResult> {
        let from = self.locate(old_uri)?;
        let to = self.locate(new_uri)?;
        if from.endpoint != to.endpoint || from.bucket != to.bucket {
            return Err(
                Error::canonical(ids::BAD_REQUEST, "Rename must stay within one bucket")
                    .with_detail("seUri", old_uri)
                    .with_detail("newSeUri", new_uri),
            );
        }

        let bucket = self.bucket(&from, storage_auth)?;

        if !from.is_folder_uri() {
            bucket
                .copy_object_internal(&from.key, &to.key)
                .await
                .map_err(s3_error)?;
            bucket.delete_object(&from.key).await.map_err(s3_error)?;
            info!("Renamed S3 object {} to {}", old_uri, new_uri);
            return Ok(OperationResult::ok());
        }

        // Folders move object by object
        let source_prefix = from.folder_prefix();
        let target_prefix = folder_key(&to.key);
        let pages = bucket
            .list(source_prefix.clone(), None)
            .await
            .map_err(s3_error)?;
        let keys = pages
            .into_iter()
            .flat_map(|page| page.contents.into_iter().map(|object| object.key))
            .collect::<Vec<_>>();
        if keys.is_empty() {
            return Err(Self::not_found(old_uri));
        }

        for key in &keys {
            let suffix = key.strip_prefix(&source_prefix).unwrap_or(key);
            let target = format!("{target_prefix}{suffix}");
            bucket
                .copy_object_internal(key, &target)
                .await
                .map_err(s3_error)?;
            bucket.delete_object(key).await.map_err(s3_error)?;
        }
        info!("Moved {} objects from {} to {}", keys.len(), old_uri, new_uri);
        Ok(OperationResult::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://s3.example.org";

    #[test]
    fn test_native_uri() {
        let location = S3Location::parse("s3://data/runs/2024/a.csv", ENDPOINT).unwrap();
        assert_eq!(location.endpoint, ENDPOINT);
        assert_eq!(location.bucket, "data");
        assert_eq!(location.key, "runs/2024/a.csv");
        assert!(!location.is_folder_uri());
        assert_eq!(location.uri_for("runs/b.csv"), "s3://data/runs/b.csv");
    }

    #[test]
    fn test_path_style_uri() {
        let location =
            S3Location::parse("http://minio.local:9000/data/runs/", ENDPOINT).unwrap();
        assert_eq!(location.endpoint, "http://minio.local:9000");
        assert_eq!(location.bucket, "data");
        assert_eq!(location.key, "runs/");
        assert!(location.is_folder_uri());
        assert_eq!(location.folder_prefix(), "runs/");
        assert_eq!(location.uri_for("runs/x"), "http://minio.local:9000/data/runs/x");
    }

    #[test]
    fn test_bucket_root() {
        let location = S3Location::parse("s3://data", ENDPOINT).unwrap();
        assert_eq!(location.key, "");
        assert_eq!(location.folder_prefix(), "");
        assert!(location.is_folder_uri());
    }

    #[test]
    fn test_invalid_uris() {
        for uri in ["not a uri", "ftp://host/bucket/key", "https://host/"] {
            let err = S3Location::parse(uri, ENDPOINT).unwrap_err();
            assert_eq!(err.id(), ids::URL_INVALID, "uri {uri}");
        }
    }

    #[test]
    fn test_error_message_extraction() {
        let body = "<?xml version=\"1.0\"?><Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>";
        let err = s3_error(S3Error::HttpFailWithBody(404, body.to_string()));
        match err {
            Error::Http {
                status, message, ..
            } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message.as_deref(), Some("The specified key does not exist."));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_base_names() {
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name("a/b/"), "b");
        assert_eq!(base_name("top"), "top");
    }

    #[test]
    fn test_credentials_precedence() {
        let storage = S3Storage {
            endpoint: ENDPOINT.to_string(),
            credentials: Some(ServiceCredentials {
                access_key: "service".to_string(),
                secret_key: "service-secret".to_string(),
            }),
        };

        let request = StorageAuth::new("caller", "caller-secret");
        let creds = storage.credentials(Some(&request)).unwrap();
        assert_eq!(creds.access_key.as_deref(), Some("caller"));

        let creds = storage.credentials(None).unwrap();
        assert_eq!(creds.access_key.as_deref(), Some("service"));
    }
}
