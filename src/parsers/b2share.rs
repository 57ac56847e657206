//! EUDAT B2Share record parser.

use super::{build_client, config_host, fetch_json, no_files, not_initialized, same_host};
use super::{Identifier, RedirectCache};
use crate::config::{HttpConfig, ParserConfig};
use crate::models::{AccessToken, Listing, StorageElement};
use crate::ports::ParserService;
use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

static B2SHARE_DOI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^10\.23728/b2share\.([0-9a-f]{32})$").expect("valid B2Share DOI pattern")
});

static B2SHARE_RECORD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^/(?:api/)?records/([0-9a-f]{32})/?$")
        .expect("valid B2Share record path pattern")
});

#[derive(Debug, Deserialize)]
struct B2ShareRecord {
    #[serde(default)]
    files: Vec<B2ShareFile>,
    #[serde(default)]
    links: B2ShareRecordLinks,
}

#[derive(Debug, Default, Deserialize)]
struct B2ShareRecordLinks {
    /// Bucket listing of the record
    #[serde(default)]
    files: Option<String>,
}

#[derive(Debug, Deserialize)]
struct B2ShareFile {
    key: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default, rename = "ePIC_PID")]
    pid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct B2ShareBucket {
    #[serde(default)]
    contents: Vec<B2ShareBucketObject>,
}

#[derive(Debug, Deserialize)]
struct B2ShareBucketObject {
    key: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default, rename = "mimetype")]
    media_type: Option<String>,
    #[serde(default)]
    links: B2ShareObjectLinks,
}

#[derive(Debug, Default, Deserialize)]
struct B2ShareObjectLinks {
    #[serde(default, rename = "self")]
    self_link: Option<String>,
}

/// Resolves `10.23728/b2share.<id>` DOIs and B2Share record URLs
#[derive(Debug)]
pub struct B2ShareParser {
    id: String,
    name: String,
    base_url: String,
    host: Option<String>,
    record_id: Option<String>,
    client: Option<Client>,
}

impl B2ShareParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            base_url: config.url.trim_end_matches('/').to_string(),
            host: config_host(config),
            record_id: None,
            client: None,
        }
    }

    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    fn record_from_url(&self, url: &Url) -> Option<String> {
        if !same_host(url, self.host.as_deref()) {
            return None;
        }
        B2SHARE_RECORD_PATH
            .captures(url.path())
            .map(|captures| captures[1].to_ascii_lowercase())
    }

    fn direct_match(&self, identifier: &Identifier) -> Option<String> {
        match identifier {
            Identifier::Doi(doi) => B2SHARE_DOI
                .captures(doi)
                .map(|captures| captures[1].to_ascii_lowercase()),
            Identifier::Url(url) => self.record_from_url(url),
        }
    }

    fn file_element(&self, file: B2ShareFile) -> StorageElement {
        let mut element = StorageElement::file(file.key.clone(), file.key.clone(), file.size);
        element.checksum = file.checksum;
        element.access_url = file
            .bucket
            .map(|bucket| format!("{}/api/files/{}/{}", self.base_url, bucket, file.key))
            .or(file.pid);
        element
    }
}

impl From<B2ShareBucketObject> for StorageElement {
    fn from(object: B2ShareBucketObject) -> Self {
        let mut element = Self::file(object.key.clone(), object.key, object.size);
        element.checksum = object.checksum;
        element.media_type = object.media_type;
        element.access_url = object.links.self_link;
        element
    }
}

#[async_trait]
impl ParserService for B2ShareParser {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self, config: &ParserConfig, http: &HttpConfig) -> bool {
        self.base_url = config.url.trim_end_matches('/').to_string();
        self.client = build_client(config, http);
        self.client.is_some()
    }

    async fn can_resolve(
        &mut self,
        _auth: Option<&AccessToken>,
        identifier: &str,
        redirects: &mut RedirectCache,
    ) -> Result<bool> {
        let parsed = Identifier::parse(identifier)?;
        if let Some(record_id) = self.direct_match(&parsed) {
            debug!("B2Share record {} matched directly", record_id);
            self.record_id = Some(record_id);
            return Ok(true);
        }

        let target = redirects.resolve().await?.clone();
        self.record_id = self.record_from_url(&target);
        Ok(self.record_id.is_some())
    }

    async fn resolve(
        &self,
        auth: Option<&AccessToken>,
        identifier: &str,
        _depth: u32,
    ) -> Result<Listing> {
        let client = self.client.as_ref().ok_or_else(|| not_initialized(&self.id))?;
        let record_id = self.record_id.as_deref().ok_or_else(|| no_files(identifier))?;

        let url = format!("{}/api/records/{}", self.base_url, record_id);
        let record: B2ShareRecord = fetch_json(client, &url, auth).await?;

        if !record.files.is_empty() {
            info!("B2Share record {} lists {} files", record_id, record.files.len());
            let elements = record
                .files
                .into_iter()
                .map(|file| self.file_element(file))
                .collect::<Vec<_>>();
            return Ok(Listing::from(elements));
        }

        // Older records only link to their bucket
        let bucket_url = record
            .links
            .files
            .ok_or_else(|| no_files(identifier).with_detail("recordId", record_id))?;
        debug!("B2Share record {} falls back to bucket {}", record_id, bucket_url);

        let bucket: B2ShareBucket = fetch_json(client, &bucket_url, auth).await?;
        if bucket.contents.is_empty() {
            return Err(no_files(identifier).with_detail("recordId", record_id));
        }

        let elements = bucket
            .contents
            .into_iter()
            .map(StorageElement::from)
            .collect::<Vec<_>>();
        Ok(Listing::from(elements))
    }
}
