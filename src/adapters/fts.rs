//! FTS3 REST adapter. Serves transfers (`/jobs`) and, through the data
//! management endpoints (`/dm/*`), the storage elements FTS can reach.

use crate::config::ServiceConfig;
use crate::error::{ids, Error, Result};
use crate::fields::{FieldMap, FTS_FIELDS};
use crate::models::{
    AccessToken, Listing, OperationResult, StorageAuth, StorageElement, TransferDetails,
    TransferFilter, TransferHandle, TransferList, TransferSpec, TransferState, UserInfo,
};
use crate::ports::{StorageService, TransferService};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;

/// Error document returned by FTS
#[derive(Debug, Deserialize)]
struct FtsErrorBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FtsWhoami {
    #[serde(default)]
    base_id: Option<String>,
    #[serde(default)]
    user_dn: Option<String>,
    #[serde(default)]
    delegation_id: Option<String>,
    #[serde(default)]
    vos: Vec<String>,
    #[serde(default)]
    vos_id: Vec<String>,
    #[serde(default)]
    method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FtsSubmitted {
    job_id: String,
}

/// Job document in FTS spelling
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FtsJob {
    job_id: String,
    job_state: Option<String>,
    source_se: Option<String>,
    dest_se: Option<String>,
    verify_checksum: Option<Value>,
    overwrite_flag: Option<Value>,
    priority: Option<i64>,
    retry: Option<i64>,
    retry_delay: Option<i64>,
    max_time_in_queue: Option<i64>,
    copy_pin_lifetime: Option<i64>,
    bring_online: Option<i64>,
    target_qos: Option<String>,
    cancel_job: Option<Value>,
    submit_time: Option<String>,
    submit_host: Option<String>,
    job_finished: Option<String>,
    reason: Option<String>,
    vo_name: Option<String>,
    user_dn: Option<String>,
    job_metadata: Option<Value>,
}

/// Entry of `/dm/stat` and `/dm/list`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FtsStat {
    mode: u32,
    size: u64,
    mtime: Option<i64>,
    atime: Option<i64>,
    ctime: Option<i64>,
}

/// FTS flags come as booleans, `Y`/`N`, or checksum modes such as `b`/`t`/`s`
fn lenient_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|n| n != 0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "n" | "no" | "false" | "f" | "none" | "0" => Some(false),
            _ => Some(true),
        },
        _ => None,
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn epoch(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s, 0))
}

impl From<FtsJob> for TransferDetails {
    fn from(job: FtsJob) -> Self {
        Self {
            job_id: job.job_id,
            job_state: job.job_state.as_deref().map(TransferState::parse),
            source: job.source_se,
            destination: job.dest_se,
            verify_checksum: job.verify_checksum.as_ref().and_then(lenient_flag),
            overwrite: job.overwrite_flag.as_ref().and_then(lenient_flag),
            priority: job.priority,
            retry: job.retry,
            retry_delay: job.retry_delay,
            max_time_in_queue: job.max_time_in_queue,
            copy_pin_lifetime: job.copy_pin_lifetime,
            bring_online: job.bring_online,
            target_qos: job.target_qos,
            cancel: job.cancel_job.as_ref().and_then(lenient_flag),
            submitted_at: job.submit_time.as_deref().and_then(parse_timestamp),
            submitted_to: job.submit_host,
            finished_at: job.job_finished.as_deref().and_then(parse_timestamp),
            reason: job.reason.filter(|r| !r.is_empty()),
            vo: job.vo_name,
            user_dn: job.user_dn,
            job_metadata: job.job_metadata.filter(|m| !m.is_null()),
        }
    }
}

impl From<FtsWhoami> for UserInfo {
    fn from(whoami: FtsWhoami) -> Self {
        Self {
            base_id: whoami.base_id,
            user_dn: whoami.user_dn,
            delegation_id: whoami.delegation_id,
            vos: whoami.vos,
            vo_ids: whoami.vos_id,
            auth_method: whoami.method,
        }
    }
}

fn element_from_stat(name: &str, path: String, stat: &FtsStat) -> StorageElement {
    let is_folder = stat.mode & S_IFMT == S_IFDIR;
    let mut element = if is_folder {
        StorageElement::folder(name, path)
    } else {
        StorageElement::file(name, path, stat.size)
    };
    element.modified_at = epoch(stat.mtime);
    element.accessed_at = epoch(stat.atime);
    element.created_at = epoch(stat.ctime);
    element
}

fn element_name(uri: &str) -> &str {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(uri)
}

fn join_uri(folder: &str, name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), name.trim_matches('/'))
}

/// Turn an FTS failure response into an [`Error`]
async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<FtsErrorBody>(&body)
        .ok()
        .and_then(|parsed| {
            parsed
                .message
                .or(parsed.status)
                .filter(|m| !m.trim().is_empty())
        })
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()));

    let not_empty = message
        .as_deref()
        .is_some_and(|m| m.to_ascii_lowercase().contains("not empty"));
    if status == StatusCode::CONFLICT || not_empty {
        return Error::canonical(
            ids::FOLDER_NOT_EMPTY,
            message.unwrap_or_else(|| "Folder is not empty".to_string()),
        );
    }

    Error::http(status, message)
}

/// FTS3 transfer and data management adapter
#[derive(Debug, Default)]
pub struct FtsTransfer {
    client: Option<Client>,
    base_url: String,
}

impl FtsTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn configure(&mut self, config: &ServiceConfig) -> bool {
        // The call envelope owns the deadline; this bound only reclaims abandoned requests
        let client = Client::builder()
            .timeout(config.timeout().saturating_mul(2))
            .user_agent(concat!("data-transfer/", env!("CARGO_PKG_VERSION")))
            .build();

        match client {
            Ok(client) => {
                self.client = Some(client);
                self.base_url = config.url.trim_end_matches('/').to_string();
                debug!("FTS adapter bound to {}", self.base_url);
                true
            }
            Err(e) => {
                warn!("Failed to create HTTP client for {}: {}", config.url, e);
                false
            }
        }
    }

    fn request(&self, method: Method, path: &str, auth: &AccessToken) -> Result<RequestBuilder> {
        let client = self.client.as_ref().ok_or_else(|| {
            Error::canonical(ids::INVALID_SERVICE_CONFIG, "FTS adapter used before initialization")
        })?;
        Ok(client
            .request(method, format!("{}{}", self.base_url, path))
            .header(ACCEPT, "application/json")
            .bearer_auth(auth.as_str()))
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let text = Self::send(request).await?.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn dm_stat(&self, auth: &AccessToken, uri: &str) -> Result<FtsStat> {
        let request = self
            .request(Method::GET, "/dm/stat", auth)?
            .query(&[("surl", uri)]);
        Self::send_json(request).await
    }

    async fn dm_post(&self, auth: &AccessToken, path: &str, body: Value) -> Result<OperationResult> {
        let request = self.request(Method::POST, path, auth)?.json(&body);
        Self::send(request).await?;
        Ok(OperationResult::ok())
    }
}

#[async_trait]
impl TransferService for FtsTransfer {
    fn implementation(&self) -> &str {
        "fts"
    }

    fn field_map(&self) -> &'static FieldMap {
        &FTS_FIELDS
    }

    async fn init(&mut self, config: &ServiceConfig) -> bool {
        self.configure(config)
    }

    async fn user_info(&self, auth: &AccessToken) -> Result<UserInfo> {
        let whoami: FtsWhoami = Self::send_json(self.request(Method::GET, "/whoami", auth)?).await?;
        Ok(whoami.into())
    }

    async fn start_transfer(
        &self,
        auth: &AccessToken,
        storage_auth: Option<&StorageAuth>,
        spec: &TransferSpec,
    ) -> Result<TransferHandle> {
        if spec.files.is_empty() {
            return Err(Error::canonical(
                ids::BAD_REQUEST,
                "A transfer needs at least one file",
            ));
        }
        if storage_auth.is_some() {
            // FTS reads storage credentials from its own configuration
            debug!("Ignoring per-request storage credentials for FTS submission");
        }

        let files = spec
            .files
            .iter()
            .map(|file| {
                json!({
                    "sources": file.sources,
                    "destinations": file.destinations,
                    "checksum": file.checksum,
                    "filesize": file.filesize,
                    "metadata": file.metadata,
                    "activity": file.activity,
                })
            })
            .collect::<Vec<_>>();

        let params = &spec.params;
        let body = json!({
            "files": files,
            "params": {
                "verify_checksum": params.verify_checksum,
                "overwrite": params.overwrite,
                "retry": params.retry,
                "retry_delay": params.retry_delay,
                "priority": params.priority,
                "max_time_in_queue": params.max_time_in_queue,
                "copy_pin_lifetime": params.copy_pin_lifetime,
                "bring_online": params.bring_online,
                "target_qos": params.target_qos,
                "job_metadata": params.job_metadata,
            },
        });

        let request = self.request(Method::POST, "/jobs", auth)?.json(&body);
        let submitted: FtsSubmitted = Self::send_json(request).await?;
        info!("FTS accepted job {} with {} files", submitted.job_id, spec.files.len());

        Ok(TransferHandle {
            job_id: submitted.job_id,
        })
    }

    async fn find_transfers(
        &self,
        auth: &AccessToken,
        filter: &TransferFilter,
    ) -> Result<TransferList> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if !filter.states.is_empty() {
            let states = filter
                .states
                .iter()
                .map(|state| state.as_str())
                .collect::<Vec<_>>()
                .join(",");
            query.push(("state_in", states));
        }
        let optional = [
            ("vo_name", &filter.vo),
            ("user_dn", &filter.user_dn),
            ("dlg_id", &filter.delegation_id),
            ("source_se", &filter.source_se),
            ("dest_se", &filter.destination_se),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                query.push((key, value.clone()));
            }
        }
        if let Some(hours) = filter.time_window_hours {
            query.push(("time_window", hours.to_string()));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }

        let request = self.request(Method::GET, "/jobs", auth)?.query(&query);
        let jobs: Vec<FtsJob> = Self::send_json(request).await?;
        debug!("FTS returned {} jobs", jobs.len());

        Ok(jobs
            .into_iter()
            .map(TransferDetails::from)
            .collect::<Vec<_>>()
            .into())
    }

    async fn transfer_info(&self, auth: &AccessToken, job_id: &str) -> Result<TransferDetails> {
        let path = format!("/jobs/{}", urlencoding::encode(job_id));
        let job: FtsJob = Self::send_json(self.request(Method::GET, &path, auth)?).await?;
        Ok(job.into())
    }

    async fn transfer_field(
        &self,
        auth: &AccessToken,
        job_id: &str,
        backend_field: &str,
    ) -> Result<Value> {
        let path = format!(
            "/jobs/{}/{}",
            urlencoding::encode(job_id),
            urlencoding::encode(backend_field)
        );
        Self::send_json(self.request(Method::GET, &path, auth)?).await
    }

    async fn cancel_transfer(&self, auth: &AccessToken, job_id: &str) -> Result<TransferDetails> {
        let path = format!("/jobs/{}", urlencoding::encode(job_id));
        let job: FtsJob = Self::send_json(self.request(Method::DELETE, &path, auth)?).await?;
        info!("FTS job {} is now {:?}", job_id, job.job_state);
        Ok(job.into())
    }

    fn as_storage(self: Arc<Self>) -> Option<Arc<dyn StorageService>> {
        Some(self)
    }
}

#[async_trait]
impl StorageService for FtsTransfer {
    fn implementation(&self) -> &str {
        "fts"
    }

    async fn init(
        &mut self,
        config: &ServiceConfig,
        _element_uri: Option<&str>,
        _storage_auth: Option<&StorageAuth>,
    ) -> bool {
        self.configure(config)
    }

    async fn list_folder(
        &self,
        auth: &AccessToken,
        _storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<Listing> {
        let request = self
            .request(Method::GET, "/dm/list", auth)?
            .query(&[("surl", uri)]);
        let entries: BTreeMap<String, FtsStat> = Self::send_json(request).await?;

        let elements = entries
            .iter()
            .map(|(name, stat)| {
                let name = name.trim_end_matches('/');
                element_from_stat(name, join_uri(uri, name), stat)
            })
            .collect::<Vec<_>>();
        Ok(Listing::from(elements))
    }

    async fn stat_element(
        &self,
        auth: &AccessToken,
        _storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<StorageElement> {
        let stat = self.dm_stat(auth, uri).await?;
        Ok(element_from_stat(element_name(uri), uri.to_string(), &stat))
    }

    async fn create_folder(
        &self,
        auth: &AccessToken,
        _storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<OperationResult> {
        self.dm_post(auth, "/dm/mkdir", json!({ "surl": uri })).await
    }

    async fn delete_folder(
        &self,
        auth: &AccessToken,
        _storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<OperationResult> {
        self.dm_post(auth, "/dm/rmdir", json!({ "surl": uri })).await
    }

    async fn delete_file(
        &self,
        auth: &AccessToken,
        _storage_auth: Option<&StorageAuth>,
        uri: &str,
    ) -> Result<OperationResult> {
        self.dm_post(auth, "/dm/unlink", json!({ "surl": uri })).await
    }

    async fn rename(
        &self,
        auth: &AccessToken,
        _storage_auth: Option<&StorageAuth>,
        old_uri: &str,
        new_uri: &str,
    ) -> Result<OperationResult> {
        self.dm_post(auth, "/dm/rename", json!({ "old": old_uri, "new": new_uri }))
            .await
    }
}
