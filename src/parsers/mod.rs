//! DOI resolution: the parser chain, the shared redirect cache and the
//! repository-specific parsers.

pub mod b2share;
pub mod chain;
pub mod esrf;
pub mod redirect;
pub mod zenodo;

pub use b2share::B2ShareParser;
pub use chain::{ChainState, ParserChain, ResolvedParser};
pub use esrf::EsrfParser;
pub use redirect::{parse_link_header, Identifier, Link, RedirectCache};
pub use zenodo::ZenodoParser;

use crate::config::{HttpConfig, ParserConfig};
use crate::error::{ids, Error, Result};
use crate::models::AccessToken;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder};
use tracing::warn;
use url::Url;

/// Host part of a parser's configured URL
fn config_host(config: &ParserConfig) -> Option<String> {
    Url::parse(&config.url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
}

fn same_host(url: &Url, host: Option<&str>) -> bool {
    match (url.host_str(), host) {
        (Some(actual), Some(expected)) => actual.eq_ignore_ascii_case(expected),
        _ => false,
    }
}

/// HTTP client for record lookups, or `None` after logging why not
fn build_client(config: &ParserConfig, http: &HttpConfig) -> Option<Client> {
    match Client::builder()
        .user_agent(&http.user_agent)
        .timeout(config.timeout())
        .build()
    {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Failed to create HTTP client for parser {}: {}", config.id, e);
            None
        }
    }
}

fn json_request(client: &Client, url: &str, auth: Option<&AccessToken>) -> RequestBuilder {
    let request = client.get(url).header(ACCEPT, "application/json");
    match auth {
        Some(token) => request.bearer_auth(token.as_str()),
        None => request,
    }
}

fn not_initialized(parser_id: &str) -> Error {
    Error::canonical(ids::INVALID_PARSER_CONFIG, "Parser used before initialization")
        .with_detail("parserId", parser_id)
}

fn no_files(identifier: &str) -> Error {
    Error::canonical(ids::NO_FILES_LINK, "Record does not expose any files")
        .with_detail("doi", identifier)
}

/// GET a record document, turning non-success statuses into HTTP failures
async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: &str,
    auth: Option<&AccessToken>,
) -> Result<T> {
    let response = json_request(client, url, auth).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = (!body.trim().is_empty()).then(|| body.trim().to_string());
        return Err(Error::http(status, message).with_detail("recordUrl", url));
    }
    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}
