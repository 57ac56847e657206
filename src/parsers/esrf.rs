//! ESRF data portal parser. Files are announced as `Link: <...>; rel="item"`
//! headers on the landing page the DOI redirects to.

use super::{config_host, no_files, same_host, Identifier, Link, RedirectCache};
use crate::config::{HttpConfig, ParserConfig};
use crate::models::{AccessToken, Listing, StorageElement};
use crate::ports::ParserService;
use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

static ESRF_DOI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^10\.15151/ESRF-").expect("valid ESRF DOI pattern"));

#[derive(Debug)]
pub struct EsrfParser {
    id: String,
    name: String,
    host: Option<String>,
    landing: Option<Url>,
    items: Vec<Link>,
}

impl EsrfParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            host: config_host(config),
            landing: None,
            items: Vec::new(),
        }
    }

    pub fn items(&self) -> &[Link] {
        &self.items
    }
}

fn element_for(link: &Link) -> StorageElement {
    let name = Url::parse(&link.target)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .map(|segment| {
            urlencoding::decode(&segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or(segment)
        })
        .unwrap_or_else(|| link.target.clone());

    let mut element = StorageElement::file(name.clone(), name, 0);
    element.access_url = Some(link.target.clone());
    element.media_type.clone_from(&link.media_type);
    element
}

#[async_trait]
impl ParserService for EsrfParser {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self, _config: &ParserConfig, _http: &HttpConfig) -> bool {
        // Everything needed was captured from the redirect probe
        true
    }

    async fn can_resolve(
        &mut self,
        _auth: Option<&AccessToken>,
        identifier: &str,
        redirects: &mut RedirectCache,
    ) -> Result<bool> {
        let parsed = Identifier::parse(identifier)?;
        let esrf_doi = parsed.doi().is_some_and(|doi| ESRF_DOI.is_match(doi));

        let landing = redirects.resolve().await?.clone();
        if !esrf_doi && !same_host(&landing, self.host.as_deref()) {
            return Ok(false);
        }

        self.items = redirects.links("item");
        debug!("ESRF landing page {} announces {} items", landing, self.items.len());
        self.landing = Some(landing);
        Ok(true)
    }

    async fn resolve(
        &self,
        _auth: Option<&AccessToken>,
        identifier: &str,
        _depth: u32,
    ) -> Result<Listing> {
        if self.items.is_empty() {
            let err = no_files(identifier);
            return Err(match &self.landing {
                Some(landing) => err.with_detail("landingUrl", landing.as_str()),
                None => err,
            });
        }

        info!("ESRF dataset {} lists {} files", identifier, self.items.len());
        Ok(Listing::from(
            self.items.iter().map(element_for).collect::<Vec<_>>(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_name_from_target() {
        let link = Link {
            target: "https://data.esrf.fr/files/scan%2001.h5".to_string(),
            rel: vec!["item".to_string()],
            media_type: Some("application/x-hdf5".to_string()),
        };

        let element = element_for(&link);
        assert_eq!(element.name, "scan 01.h5");
        assert_eq!(element.access_url.as_deref(), Some(link.target.as_str()));
        assert_eq!(element.media_type.as_deref(), Some("application/x-hdf5"));
    }

    #[test]
    fn test_element_name_ignores_trailing_slash() {
        let link = Link {
            target: "https://data.esrf.fr/files/dataset/".to_string(),
            rel: vec!["item".to_string()],
            media_type: None,
        };
        assert_eq!(element_for(&link).name, "dataset");
    }

    #[test]
    fn test_esrf_doi_pattern() {
        assert!(ESRF_DOI.is_match("10.15151/ESRF-ES-513835829"));
        assert!(!ESRF_DOI.is_match("10.5281/zenodo.1"));
    }
}
