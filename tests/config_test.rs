use data_transfer::error::ids;
use data_transfer::{Config, ErrorMapper};
use std::io::Write;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
[destinations]
dcache = "fts-egi"
minio = "minio"

[services.fts-egi]
name = "EGI FTS"
url = "https://fts3.example.org:8446"
timeout_ms = 15000
implementation = "fts"

[services.minio]
name = "Local MinIO"
url = "http://localhost:9000"
implementation = "s3"
credentials = { access_key = "minio", secret_key = "minio-secret" }

[[parsers]]
id = "esrf"
name = "ESRF"
url = "https://doi.esrf.fr"
implementation = "esrf"

[[parsers]]
id = "zenodo"
name = "Zenodo sandbox"
url = "https://sandbox.zenodo.org"
timeout_ms = 2500
implementation = "zenodo"

[http]
max_redirects = 4

[logging]
level = "debug"
"#;

fn write_config(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_toml_file() {
    let file = write_config(CONFIG, ".toml");
    let config = Config::load(Some(file.path())).unwrap();

    let (service_id, fts) = config.service_for("dcache").unwrap();
    assert_eq!(service_id, "fts-egi");
    assert_eq!(fts.timeout_ms, 15000);

    let (_, minio) = config.service_for("minio").unwrap();
    assert_eq!(minio.timeout_ms, 5000);
    assert_eq!(
        minio.credentials.as_ref().map(|c| c.access_key.as_str()),
        Some("minio")
    );

    // Declaration order is resolution priority
    let parser_ids: Vec<_> = config.parsers.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(parser_ids, ["esrf", "zenodo"]);
    assert_eq!(config.parsers[1].timeout_ms, 2500);

    assert_eq!(config.http.max_redirects, 4);
    assert_eq!(config.http.doi_resolver, "https://doi.org");
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_load_yaml_file() {
    let yaml = r"
destinations:
  s3: store
services:
  store:
    name: Object store
    url: https://s3.example.org
    implementation: s3
";
    let file = write_config(yaml, ".yaml");
    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.destinations.len(), 1);
    assert_eq!(config.service_for("s3").map(|(id, _)| id), Some("store"));
    // Parsers fall back to the built-in list
    assert_eq!(config.parsers.len(), 3);
}

#[test]
fn test_dangling_destination_in_file() {
    let toml = r#"
[destinations]
tape = "nowhere"

[services.fts]
name = "FTS"
url = "https://fts3.example.org:8446"
implementation = "fts"
"#;
    let file = write_config(toml, ".toml");
    let err = Config::load(Some(file.path())).unwrap_err();

    let mapped = ErrorMapper::map(err, &[]);
    assert_eq!(mapped.id, ids::INVALID_SERVICE_CONFIG);
    assert_eq!(mapped.detail("serviceId"), Some("nowhere"));
}

#[test]
fn test_missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert_eq!(ErrorMapper::map(err, &[]).id, ids::INVALID_SERVICE_CONFIG);
}

#[test]
fn test_from_toml_rejects_bad_parser_url() {
    let toml = r#"
[[parsers]]
id = "zenodo"
name = "Zenodo"
url = "not a url"
implementation = "zenodo"
"#;
    let err = Config::from_toml(toml).unwrap_err();
    let mapped = ErrorMapper::map(err, &[]);
    assert_eq!(mapped.id, ids::INVALID_PARSER_CONFIG);
    assert_eq!(mapped.detail("parserId"), Some("zenodo"));
}
