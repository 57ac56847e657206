use data_transfer::config::ServiceConfig;
use data_transfer::error::ids;
use data_transfer::models::{AccessToken, FileTransfer, TransferFilter, TransferSpec, TransferState};
use data_transfer::tools::{
    FindTransfersInput, StartTransferInput, StorageInput, TransferFieldInput, TransferInfoInput,
    UserInfoInput,
};
use data_transfer::{Config, Facade};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fts_facade(server: &MockServer, timeout_ms: u64) -> Facade {
    let service = ServiceConfig {
        name: "Test FTS".to_string(),
        url: server.uri(),
        timeout_ms,
        implementation: "fts".to_string(),
        credentials: None,
    };
    let config = Config {
        destinations: HashMap::from([("dcache".to_string(), "fts".to_string())]),
        services: HashMap::from([("fts".to_string(), service)]),
        ..Config::default()
    };
    Facade::from_config(config).unwrap()
}

fn token() -> AccessToken {
    AccessToken::new("secret-token")
}

fn info_input(job_id: &str) -> TransferInfoInput {
    TransferInfoInput {
        destination: "dcache".to_string(),
        job_id: job_id.to_string(),
    }
}

#[tokio::test]
async fn test_start_transfer_returns_job_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_partial_json(json!({
            "files": [
                { "sources": ["https://a.example.org/x"], "destinations": ["https://b.example.org/x"] },
                { "sources": ["https://a.example.org/y"], "destinations": ["https://b.example.org/y"] }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "a1b2-c3" })))
        .expect(1)
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 2000);
    let input = StartTransferInput {
        destination: "dcache".to_string(),
        transfer: TransferSpec {
            files: vec![
                FileTransfer::new("https://a.example.org/x", "https://b.example.org/x"),
                FileTransfer::new("https://a.example.org/y", "https://b.example.org/y"),
            ],
            ..TransferSpec::default()
        },
        storage_auth: None,
    };

    let handle = facade.transfers.start_transfer(&token(), input).await.unwrap();
    assert_eq!(handle.job_id, "a1b2-c3");
}

#[tokio::test]
async fn test_empty_transfer_is_rejected_locally() {
    let server = MockServer::start().await;
    let facade = fts_facade(&server, 2000);

    let err = facade
        .transfers
        .start_transfer(
            &token(),
            StartTransferInput {
                destination: "dcache".to_string(),
                transfer: TransferSpec::default(),
                storage_auth: None,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.id, ids::BAD_REQUEST);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_transfer_info_translates_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/a1b2-c3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "a1b2-c3",
            "job_state": "ACTIVE",
            "source_se": "https://a.example.org",
            "dest_se": "https://b.example.org",
            "verify_checksum": "b",
            "overwrite_flag": false,
            "priority": 3,
            "submit_time": "2024-03-01T10:15:00",
            "vo_name": "dteam",
            "user_dn": "/DC=org/CN=tester"
        })))
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 2000);
    let details = facade
        .transfers
        .get_transfer_info(&token(), info_input("a1b2-c3"))
        .await
        .unwrap();

    assert_eq!(details.job_id, "a1b2-c3");
    assert_eq!(details.job_state, Some(TransferState::Active));
    assert_eq!(details.destination.as_deref(), Some("https://b.example.org"));
    assert_eq!(details.priority, Some(3));
    assert_eq!(details.vo.as_deref(), Some("dteam"));
    assert!(details.submitted_at.is_some());
}

#[tokio::test]
async fn test_missing_job_is_transfer_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": "404 Not Found",
            "message": "No job with the id \"missing\" has been found"
        })))
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 2000);
    let err = facade
        .transfers
        .get_transfer_info(&token(), info_input("missing"))
        .await
        .unwrap_err();

    assert_eq!(err.id, ids::TRANSFER_NOT_FOUND);
    assert_eq!(err.status.as_u16(), 404);
    assert_eq!(err.detail("jobId"), Some("missing"));
    assert_eq!(err.detail("destination"), Some("dcache"));
    assert!(err
        .description
        .as_deref()
        .is_some_and(|d| d.contains("has been found")));
}

#[tokio::test]
async fn test_rejected_token_is_not_authenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 2000);
    let err = facade
        .transfers
        .get_user_info(
            &token(),
            UserInfoInput {
                destination: "dcache".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.id, ids::NOT_AUTHENTICATED);
    assert_eq!(err.status.as_u16(), 401);
    assert_eq!(err.description.as_deref(), Some("Unauthorized"));
}

#[tokio::test]
async fn test_field_query_uses_backend_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/a1b2-c3/job_state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("FINISHED")))
        .expect(1)
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 2000);
    let value = facade
        .transfers
        .get_transfer_field(
            &token(),
            TransferFieldInput {
                destination: "dcache".to_string(),
                job_id: "a1b2-c3".to_string(),
                field_name: "jobState".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(value.field, "jobState");
    assert_eq!(value.value, json!("FINISHED"));
}

#[tokio::test]
async fn test_unknown_field_never_reaches_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 2000);
    let err = facade
        .transfers
        .get_transfer_field(
            &token(),
            TransferFieldInput {
                destination: "dcache".to_string(),
                job_id: "a1b2-c3".to_string(),
                field_name: "foo".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.id, ids::FIELD_NOT_SUPPORTED);
    assert_eq!(err.status.as_u16(), 400);
    assert_eq!(err.detail("fieldName"), Some("foo"));
}

#[tokio::test]
async fn test_missing_field_is_field_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/a1b2-c3/target_qos"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 2000);
    let err = facade
        .transfers
        .get_transfer_field(
            &token(),
            TransferFieldInput {
                destination: "dcache".to_string(),
                job_id: "a1b2-c3".to_string(),
                field_name: "targetQos".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.id, ids::FIELD_NOT_FOUND);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "job_id": "slow" }))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 200);
    let started = std::time::Instant::now();
    let err = facade
        .transfers
        .get_transfer_info(&token(), info_input("slow"))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(1000));
    assert_eq!(err.id, "getTransferInfoTimeout");
    assert_eq!(err.status.as_u16(), 504);
}

#[tokio::test]
async fn test_find_transfers_sends_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(query_param("state_in", "ACTIVE,FAILED"))
        .and(query_param("vo_name", "dteam"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "job_id": "j1", "job_state": "ACTIVE" },
            { "job_id": "j2", "job_state": "FAILED", "reason": "checksum mismatch" }
        ])))
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 2000);
    let list = facade
        .transfers
        .find_transfers(
            &token(),
            FindTransfersInput {
                destination: "dcache".to_string(),
                filter: TransferFilter {
                    states: vec![TransferState::Active, TransferState::Failed],
                    vo: Some("dteam".to_string()),
                    limit: Some(2),
                    ..TransferFilter::default()
                },
            },
        )
        .await
        .unwrap();

    assert_eq!(list.count, 2);
    assert_eq!(list.transfers[1].reason.as_deref(), Some("checksum mismatch"));
}

#[tokio::test]
async fn test_cancel_transfer() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/jobs/j1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "job_id": "j1", "job_state": "CANCELED" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 2000);
    let details = facade
        .transfers
        .cancel_transfer(&token(), info_input("j1"))
        .await
        .unwrap();
    assert_eq!(details.job_state, Some(TransferState::Canceled));
}

#[tokio::test]
async fn test_fts_storage_listing_and_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dm/list"))
        .and(query_param("surl", "davs://se.example.org/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "run1/": { "mode": 16877, "size": 0, "mtime": 1_700_000_000 },
            "notes.txt": { "mode": 33188, "size": 42, "mtime": 1_700_000_000 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dm/rmdir"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "400 Bad Request",
            "message": "Directory not empty"
        })))
        .mount(&server)
        .await;

    let facade = fts_facade(&server, 2000);
    let input = StorageInput {
        destination: "dcache".to_string(),
        se_url: "davs://se.example.org/data".to_string(),
        storage_auth: None,
    };

    let listing = facade
        .storage
        .list_folder(&token(), input.clone())
        .await
        .unwrap();
    assert_eq!(listing.count, 2);
    let notes = listing
        .elements
        .iter()
        .find(|e| e.name == "notes.txt")
        .unwrap();
    assert!(!notes.is_folder);
    assert_eq!(notes.size, 42);
    assert!(listing.elements.iter().any(|e| e.is_folder));

    let err = facade
        .storage
        .delete_folder(&token(), input)
        .await
        .unwrap_err();
    assert_eq!(err.id, ids::FOLDER_NOT_EMPTY);
    assert_eq!(err.status.as_u16(), 409);
}
