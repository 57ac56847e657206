//! Identifier normalization and the per-resolution redirect cache.

use crate::config::HttpConfig;
use crate::error::{ids, Error, Result};
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{redirect, Client, RequestBuilder};
use std::sync::LazyLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

static DOI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("valid DOI pattern"));

static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]*)>([^<]*)").expect("valid Link header pattern"));

const DOI_PREFIXES: &[&str] = &[
    "doi:",
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
];

/// An identifier accepted by the parser chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Bare DOI, e.g. `10.5281/zenodo.6511035`
    Doi(String),
    /// Any other http(s) URL
    Url(Url),
}

fn strip_doi_prefix(value: &str) -> &str {
    for prefix in DOI_PREFIXES {
        let matches = value
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            return &value[prefix.len()..];
        }
    }
    value
}

impl Identifier {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::canonical(ids::DOI_INVALID, "DOI cannot be empty"));
        }

        let bare = strip_doi_prefix(trimmed);
        if DOI_PATTERN.is_match(bare) {
            return Ok(Self::Doi(bare.to_string()));
        }

        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
                Ok(Self::Url(url))
            }
            _ => Err(Error::canonical(
                ids::DOI_INVALID,
                "Identifier is neither a DOI nor an http(s) URL",
            )),
        }
    }

    pub fn doi(&self) -> Option<&str> {
        match self {
            Self::Doi(doi) => Some(doi),
            Self::Url(_) => None,
        }
    }

    pub const fn url(&self) -> Option<&Url> {
        match self {
            Self::Doi(_) => None,
            Self::Url(url) => Some(url),
        }
    }

    /// Where redirect following starts: the DOI resolver for bare DOIs.
    ///
    /// DOI suffixes may contain `#`, `?` or `%`, so each `/`-separated part
    /// is appended as an encoded path segment.
    pub fn start_url(&self, doi_resolver: &str) -> Result<Url> {
        match self {
            Self::Doi(doi) => {
                let invalid = |reason: String| {
                    Error::canonical(ids::URL_INVALID, format!("Invalid DOI resolver URL: {reason}"))
                        .with_detail("url", doi_resolver)
                };

                let mut url = Url::parse(doi_resolver).map_err(|e| invalid(e.to_string()))?;
                url.set_query(None);
                url.set_fragment(None);
                url.path_segments_mut()
                    .map_err(|()| invalid("resolver cannot be a base URL".to_string()))?
                    .pop_if_empty()
                    .extend(doi.split('/'));
                Ok(url)
            }
            Self::Url(url) => Ok(url.clone()),
        }
    }
}

/// One entry of an HTTP `Link` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub target: String,
    pub rel: Vec<String>,
    pub media_type: Option<String>,
}

impl Link {
    pub fn has_rel(&self, rel: &str) -> bool {
        self.rel.iter().any(|r| r.eq_ignore_ascii_case(rel))
    }
}

/// Parse a `Link` header value into its entries
pub fn parse_link_header(value: &str) -> Vec<Link> {
    LINK_PATTERN
        .captures_iter(value)
        .map(|captures| {
            let mut link = Link {
                target: captures[1].trim().to_string(),
                rel: Vec::new(),
                media_type: None,
            };

            for param in captures[2].split(';') {
                let param = param.trim().trim_end_matches(',').trim();
                let Some((key, raw)) = param.split_once('=') else {
                    continue;
                };
                let raw = raw.trim().trim_matches('"');
                match key.trim().to_ascii_lowercase().as_str() {
                    "rel" => link
                        .rel
                        .extend(raw.split_whitespace().map(str::to_ascii_lowercase)),
                    "type" => link.media_type = Some(raw.to_string()),
                    _ => {}
                }
            }
            link
        })
        .collect()
}

/// Final address and headers of a redirect probe, or why it failed
type ProbeOutcome = std::result::Result<(Url, HeaderMap), String>;

async fn follow_redirects(request: RequestBuilder, identifier: String) -> ProbeOutcome {
    match request.send().await {
        Ok(response) => {
            info!(
                "Identifier {} resolved to {} ({})",
                identifier,
                response.url(),
                response.status()
            );
            Ok((response.url().clone(), response.headers().clone()))
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Redirect-following state of one identifier resolution.
///
/// The first candidate that needs to know where the identifier leads starts
/// the network probe; every later candidate reads the recorded outcome. The
/// probe runs as its own task, so a candidate whose deadline expires mid-probe
/// leaves it in flight for the next candidate to await. A cache belongs to
/// exactly one resolution call and aborts an unfinished probe when dropped.
#[derive(Debug)]
pub struct RedirectCache {
    identifier: String,
    start: Url,
    client: Client,
    in_flight: Option<JoinHandle<ProbeOutcome>>,
    outcome: Option<std::result::Result<Url, String>>,
    headers: HeaderMap,
    probes: usize,
}

impl RedirectCache {
    pub fn new(identifier: &str, parsed: &Identifier, http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&http.user_agent)
            .redirect(redirect::Policy::limited(http.max_redirects))
            .timeout(http.probe_timeout())
            .build()
            .map_err(|e| Error::processing("Failed to create HTTP client", e))?;

        Ok(Self {
            identifier: identifier.to_string(),
            start: parsed.start_url(&http.doi_resolver)?,
            client,
            in_flight: None,
            outcome: None,
            headers: HeaderMap::new(),
            probes: 0,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub const fn start_url(&self) -> &Url {
        &self.start
    }

    /// Number of network probes started so far (0 or 1)
    pub const fn probes(&self) -> usize {
        self.probes
    }

    /// Final address after following redirects, if already known
    pub fn resolved(&self) -> Option<&Url> {
        self.outcome.as_ref().and_then(|outcome| outcome.as_ref().ok())
    }

    /// Headers of the final response of the probe
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Follow redirects from the start URL, at most once per cache
    pub async fn resolve(&mut self) -> Result<&Url> {
        if self.outcome.is_none() {
            if self.in_flight.is_none() {
                self.probes += 1;
                debug!("Following redirects for {} from {}", self.identifier, self.start);
                let request = self.client.get(self.start.clone());
                self.in_flight = Some(tokio::spawn(follow_redirects(
                    request,
                    self.identifier.clone(),
                )));
            }

            if let Some(probe) = self.in_flight.as_mut() {
                // Cancelling here keeps the probe in `in_flight`
                let outcome = probe
                    .await
                    .unwrap_or_else(|e| Err(format!("Redirect probe aborted: {e}")));
                self.in_flight = None;
                self.outcome = Some(outcome.map(|(url, headers)| {
                    self.headers = headers;
                    url
                }));
            }
        }

        match &self.outcome {
            Some(Ok(url)) => Ok(url),
            Some(Err(message)) => Err(Error::Processing {
                message: format!("Could not follow redirects for {}", self.identifier),
                cause: Some(message.clone()),
            }),
            None => Err(Error::Other("Redirect probe did not run".to_string())),
        }
    }

    /// `Link` header entries of the final response carrying relation `rel`
    pub fn links(&self, rel: &str) -> Vec<Link> {
        self.headers
            .get_all(LINK)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(parse_link_header)
            .filter(|link| link.has_rel(rel))
            .collect()
    }
}

impl Drop for RedirectCache {
    fn drop(&mut self) {
        if let Some(probe) = self.in_flight.take() {
            debug!("Abandoning redirect probe for {}", self.identifier);
            probe.abort();
        }
    }
}
