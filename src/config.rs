//! # Configuration
//!
//! Layered configuration: built-in defaults, then an optional TOML/YAML file,
//! then environment variables prefixed with `TRANSFER` (nested keys separated
//! by `__`, e.g. `TRANSFER__HTTP__USER_AGENT`).
//!
//! Three tables drive backend selection:
//! - `destinations`: destination key → service id
//! - `services`: service id → [`ServiceConfig`]
//! - `parsers`: ordered list of [`ParserConfig`]; declaration order is the
//!   DOI resolution priority

use crate::error::{ids, Error, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_destinations")]
    pub destinations: HashMap<String, String>,
    #[serde(default = "default_services")]
    pub services: HashMap<String, ServiceConfig>,
    #[serde(default = "default_parsers")]
    pub parsers: Vec<ParserConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A transfer or storage backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Key into the adapter factory table
    pub implementation: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// A DOI resolution backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParserConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub implementation: String,
}

/// Static credentials for a backend
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// Outbound HTTP settings shared by parsers and the redirect probe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Base URL bare DOIs are resolved against
    #[serde(default = "default_doi_resolver")]
    pub doi_resolver: String,
    /// Budget for one redirect probe
    #[serde(default = "default_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Deadline for a whole DOI resolution, all candidates included
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            doi_resolver: default_doi_resolver(),
            probe_timeout_ms: default_timeout_ms(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
        }
    }
}

impl HttpConfig {
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub const fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Command-line overrides applied after loading
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub json_logs: Option<bool>,
    pub doi_resolver: Option<String>,
}

const fn default_timeout_ms() -> u64 {
    5000
}

const fn default_resolve_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("data-transfer/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_max_redirects() -> usize {
    10
}

fn default_doi_resolver() -> String {
    "https://doi.org".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_destinations() -> HashMap<String, String> {
    HashMap::from([
        ("dcache".to_string(), "fts".to_string()),
        ("s3".to_string(), "s3".to_string()),
    ])
}

fn default_services() -> HashMap<String, ServiceConfig> {
    HashMap::from([
        (
            "fts".to_string(),
            ServiceConfig {
                name: "EGI FTS".to_string(),
                url: "https://fts3-public.cern.ch:8446".to_string(),
                timeout_ms: default_timeout_ms(),
                implementation: "fts".to_string(),
                credentials: None,
            },
        ),
        (
            "s3".to_string(),
            ServiceConfig {
                name: "S3 object store".to_string(),
                url: "https://s3.amazonaws.com".to_string(),
                timeout_ms: default_timeout_ms(),
                implementation: "s3".to_string(),
                credentials: None,
            },
        ),
    ])
}

fn default_parsers() -> Vec<ParserConfig> {
    vec![
        ParserConfig {
            id: "zenodo".to_string(),
            name: "Zenodo".to_string(),
            url: "https://zenodo.org".to_string(),
            timeout_ms: default_timeout_ms(),
            implementation: "zenodo".to_string(),
        },
        ParserConfig {
            id: "b2share".to_string(),
            name: "EUDAT B2Share".to_string(),
            url: "https://b2share.eudat.eu".to_string(),
            timeout_ms: default_timeout_ms(),
            implementation: "b2share".to_string(),
        },
        ParserConfig {
            id: "esrf".to_string(),
            name: "ESRF Data Portal".to_string(),
            url: "https://doi.esrf.fr".to_string(),
            timeout_ms: 10_000,
            implementation: "esrf".to_string(),
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destinations: default_destinations(),
            services: default_services(),
            parsers: default_parsers(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn invalid(description: impl Into<String>) -> Error {
    Error::canonical(ids::INVALID_SERVICE_CONFIG, description)
}

fn check_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|e| invalid(format!("Invalid URL: {e}")).with_detail("url", url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("URL must use http or https").with_detail("url", url));
    }
    Ok(())
}

impl Config {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("TRANSFER")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!(
            "Loaded {} destinations, {} services, {} parsers",
            config.destinations.len(),
            config.services.len(),
            config.parsers.len()
        );
        Ok(config)
    }

    /// Parse configuration from a TOML document, without environment overrides
    pub fn from_toml(document: &str) -> Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(level) = &overrides.log_level {
            self.logging.level.clone_from(level);
        }
        if let Some(json) = overrides.json_logs {
            self.logging.json = json;
        }
        if let Some(resolver) = &overrides.doi_resolver {
            self.http.doi_resolver.clone_from(resolver);
        }
    }

    /// Check cross-table references and per-entry values
    pub fn validate(&self) -> Result<()> {
        for (destination, service_id) in &self.destinations {
            if !self.services.contains_key(service_id) {
                return Err(invalid("Destination refers to an unknown service")
                    .with_detail("destination", destination)
                    .with_detail("serviceId", service_id));
            }
        }

        for (service_id, service) in &self.services {
            service
                .validate()
                .map_err(|e| e.with_detail("serviceId", service_id))?;
        }

        let mut seen = HashSet::new();
        for parser in &self.parsers {
            parser.validate()?;
            if !seen.insert(parser.id.as_str()) {
                return Err(Error::canonical(
                    ids::INVALID_PARSER_CONFIG,
                    "Parser id declared more than once",
                )
                .with_detail("parserId", &parser.id));
            }
        }

        check_url(&self.http.doi_resolver)?;
        if self.http.probe_timeout_ms == 0 || self.http.resolve_timeout_ms == 0 {
            return Err(invalid("HTTP timeouts must be positive"));
        }
        Ok(())
    }

    /// Service id and configuration a destination resolves to
    pub fn service_for(&self, destination: &str) -> Option<(&str, &ServiceConfig)> {
        let service_id = self.destinations.get(destination)?;
        self.services
            .get(service_id)
            .map(|service| (service_id.as_str(), service))
    }
}

impl ServiceConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        check_url(&self.url)?;
        if self.timeout_ms == 0 {
            return Err(invalid("Service timeout must be positive"));
        }
        if self.implementation.trim().is_empty() {
            return Err(invalid("Service implementation must be set"));
        }
        Ok(())
    }
}

impl ParserConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        let parser_error = |description: &str| {
            Error::canonical(ids::INVALID_PARSER_CONFIG, description)
                .with_detail("parserId", &self.id)
        };

        if self.id.trim().is_empty() {
            return Err(parser_error("Parser id must be set"));
        }
        if Url::parse(&self.url).is_err() {
            return Err(parser_error("Invalid parser URL").with_detail("url", &self.url));
        }
        if self.timeout_ms == 0 {
            return Err(parser_error("Parser timeout must be positive"));
        }
        if self.implementation.trim().is_empty() {
            return Err(parser_error("Parser implementation must be set"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.service_for("dcache").map(|(id, _)| id), Some("fts"));
        assert_eq!(config.parsers[0].id, "zenodo");
        assert_eq!(config.http.doi_resolver, "https://doi.org");
    }

    #[test]
    fn test_dangling_destination() {
        let mut config = Config::default();
        config
            .destinations
            .insert("tape".to_string(), "missing".to_string());

        let err = config.validate().unwrap_err();
        assert_eq!(err.id(), ids::INVALID_SERVICE_CONFIG);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        if let Some(service) = config.services.get_mut("fts") {
            service.timeout_ms = 0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_parser_rejected() {
        let mut config = Config::default();
        let duplicate = config.parsers[0].clone();
        config.parsers.push(duplicate);

        let err = config.validate().unwrap_err();
        assert_eq!(err.id(), ids::INVALID_PARSER_CONFIG);
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(&ConfigOverrides {
            log_level: Some("debug".to_string()),
            json_logs: Some(true),
            doi_resolver: None,
        });
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.http.doi_resolver, "https://doi.org");
    }

    #[test]
    fn test_credentials_redacted() {
        let creds = Credentials {
            access_key: "minio".to_string(),
            secret_key: "minio-secret".to_string(),
        };
        assert!(!format!("{creds:?}").contains("minio-secret"));
    }
}
