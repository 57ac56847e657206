//! Zenodo record parser.

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

static ZENODO_DOI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^10\.5281/zenodo\.(\d+)$").expect("valid Zenodo DOI pattern")
});

static ZENODO_RECORD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:api/)?records?/(\d+)/?$").expect("valid Zenodo record path pattern")
});

#[derive(Debug, Deserialize)]
struct ZenodoRecord {
    #[serde(default)]
    files: Option<Vec<ZenodoFile>>,
}

#[derive(Debug, Deserialize)]
struct ZenodoFile {
    #[serde(alias = "filename")]
    key: String,
    #[serde(default, alias = "filesize")]
    size: u64,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default, rename = "type")]
    file_type: Option<String>,
    #[serde(default)]
    links: ZenodoFileLinks,
}

#[derive(Debug, Default, Deserialize)]
struct ZenodoFileLinks {
    #[serde(default, rename = "self")]
    self_link: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    download: Option<String>,
}

impl From<ZenodoFile> for StorageElement {
    fn from(file: ZenodoFile) -> Self {
        let mut element = Self::file(file.key.clone(), file.key, file.size);
        element.checksum = file.checksum;
        element.media_type = file.file_type;
        element.access_url = file
            .links
            .content
            .or(file.links.download)
            .or(file.links.self_link);
        element
    }
}

/// Resolves `10.5281/zenodo.N` DOIs and zenodo record URLs
#[derive(Debug)]
pub struct ZenodoParser {
    id: String,
    name: String,
    base_url: String,
    host: Option<String>,
    record_id: Option<String>,
    client: Option<Client>,
}

impl ZenodoParser {
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

    /// Record id matched by the last successful `can_resolve`
    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    fn record_from_url(&self, url: &Url) -> Option<String> {
        if !same_host(url, self.host.as_deref()) {
            return None;
        }
        ZENODO_RECORD_PATH
            .captures(url.path())
            .map(|captures| captures[1].to_string())
    }

    fn direct_match(&self, identifier: &Identifier) -> Option<String> {
        match identifier {
            Identifier::Doi(doi) => ZENODO_DOI
                .captures(doi)
                .map(|captures| captures[1].to_string()),
            Identifier::Url(url) => self.record_from_url(url),
        }
    }
}

#[async_trait]
impl ParserService for ZenodoParser {
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
            debug!("Zenodo record {} matched directly", record_id);
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
        let record: ZenodoRecord = fetch_json(client, &url, auth).await?;

        let files = record
            .files
            .filter(|files| !files.is_empty())
            .ok_or_else(|| no_files(identifier).with_detail("recordId", record_id))?;

        info!("Zenodo record {} lists {} files", record_id, files.len());
        let elements = files.into_iter().map(StorageElement::from).collect::<Vec<_>>();
        Ok(Listing::from(elements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ZenodoParser {
        ZenodoParser::new(&ParserConfig {
            id: "zenodo".to_string(),
            name: "Zenodo".to_string(),
            url: "https://zenodo.org".to_string(),
            timeout_ms: 1000,
            implementation: "zenodo".to_string(),
        })
    }

    #[test]
    fn test_direct_doi_match() {
        let parser = parser();
        let parsed = Identifier::parse("10.5281/zenodo.6511035").unwrap();
        assert_eq!(parser.direct_match(&parsed).as_deref(), Some("6511035"));

        let parsed = Identifier::parse("10.5281/other.6511035").unwrap();
        assert!(parser.direct_match(&parsed).is_none());
    }

    #[test]
    fn test_record_url_match() {
        let parser = parser();
        for url in [
            "https://zenodo.org/record/42",
            "https://zenodo.org/records/42",
            "https://ZENODO.org/api/records/42/",
        ] {
            let url = Url::parse(url).unwrap();
            assert_eq!(parser.record_from_url(&url).as_deref(), Some("42"), "{url}");
        }

        let foreign = Url::parse("https://sandbox.zenodo.org/records/42").unwrap();
        assert!(parser.record_from_url(&foreign).is_none());
    }

    #[test]
    fn test_file_mapping_prefers_content_link() {
        let file: ZenodoFile = serde_json::from_value(serde_json::json!({
            "key": "data.csv",
            "size": 1024,
            "checksum": "md5:abc",
            "links": {
                "self": "https://zenodo.org/api/records/1/files/data.csv",
                "content": "https://zenodo.org/api/records/1/files/data.csv/content"
            }
        }))
        .unwrap();

        let element = StorageElement::from(file);
        assert_eq!(element.name, "data.csv");
        assert_eq!(element.size, 1024);
        assert_eq!(element.checksum.as_deref(), Some("md5:abc"));
        assert!(element.access_url.unwrap().ends_with("/content"));
    }

    #[test]
    fn test_legacy_file_fields() {
        let file: ZenodoFile = serde_json::from_value(serde_json::json!({
            "filename": "old.zip",
            "filesize": 7
        }))
        .unwrap();
        assert_eq!(file.key, "old.zip");
        assert_eq!(file.size, 7);
    }
}
