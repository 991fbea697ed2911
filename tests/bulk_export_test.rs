//! Integration tests for the bulk export kickoff and status polling

use labwatch::adapters::auth::AccessToken;
use labwatch::adapters::fhir::{BulkExportPoller, FhirClient};
use labwatch::config::{FhirConfig, PollConfig};
use labwatch::domain::{BulkExportError, ExportRequest, PollLocation};
use mockito::{Matcher, Server};
use serde_json::json;

fn fhir_config(server: &Server, poll: PollConfig) -> FhirConfig {
    FhirConfig {
        base_url: format!("{}/fhir", server.url()),
        group_id: "lab-cohort".to_string(),
        timeout_seconds: 5,
        poll,
        ..Default::default()
    }
}

fn poller(server: &Server, poll: PollConfig) -> BulkExportPoller {
    let config = fhir_config(server, poll);
    BulkExportPoller::new(FhirClient::new(&config).unwrap(), config.poll)
}

fn request() -> ExportRequest {
    ExportRequest::new("lab-cohort")
        .with_types(["Patient", "Observation"])
        .with_type_filter("Observation?category=laboratory")
}

fn token() -> AccessToken {
    AccessToken::new("test-token")
}

#[tokio::test]
async fn test_kickoff_sends_headers_and_parameters() {
    let mut server = Server::new_async().await;
    let location = format!("{}/fhir/$export-poll-status?_jobId=42", server.url());

    let kickoff = server
        .mock("GET", "/fhir/Group/lab-cohort/$export")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("_type".into(), "Patient,Observation".into()),
            Matcher::UrlEncoded(
                "typeFilter".into(),
                "Observation?category=laboratory".into(),
            ),
        ]))
        .match_header("authorization", "Bearer test-token")
        .match_header("accept", "application/fhir+json")
        .match_header("prefer", "respond-async")
        .with_status(202)
        .with_header("content-location", &location)
        .create_async()
        .await;

    let poll_location = poller(&server, PollConfig::default())
        .start_export(&request(), &token())
        .await
        .unwrap();

    kickoff.assert_async().await;
    assert_eq!(poll_location.as_str(), location);
}

#[tokio::test]
async fn test_kickoff_uses_configured_filter_parameter() {
    let mut server = Server::new_async().await;
    let kickoff = server
        .mock("GET", "/fhir/Group/lab-cohort/$export")
        .match_query(Matcher::UrlEncoded(
            "_typeFilter".into(),
            "Observation?category=laboratory".into(),
        ))
        .with_status(202)
        .with_header("content-location", "bulkstatus/8")
        .create_async()
        .await;

    let request = request().with_type_filter_parameter("_typeFilter");
    poller(&server, PollConfig::default())
        .start_export(&request, &token())
        .await
        .unwrap();

    kickoff.assert_async().await;
}

#[tokio::test]
async fn test_kickoff_resolves_relative_location() {
    let mut server = Server::new_async().await;
    let _kickoff = server
        .mock("GET", "/fhir/Group/lab-cohort/$export")
        .match_query(Matcher::Any)
        .with_status(202)
        .with_header("content-location", "bulkstatus/7")
        .create_async()
        .await;

    let poll_location = poller(&server, PollConfig::default())
        .start_export(&request(), &token())
        .await
        .unwrap();

    assert_eq!(
        poll_location.as_str(),
        format!("{}/fhir/bulkstatus/7", server.url())
    );
}

#[tokio::test]
async fn test_kickoff_without_location_fails() {
    let mut server = Server::new_async().await;
    let _kickoff = server
        .mock("GET", "/fhir/Group/lab-cohort/$export")
        .match_query(Matcher::Any)
        .with_status(202)
        .create_async()
        .await;

    let err = poller(&server, PollConfig::default())
        .start_export(&request(), &token())
        .await
        .unwrap_err();

    assert!(matches!(err, BulkExportError::MissingContentLocation));
}

#[tokio::test]
async fn test_kickoff_rejected() {
    let mut server = Server::new_async().await;
    let _kickoff = server
        .mock("GET", "/fhir/Group/lab-cohort/$export")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_body(r#"{"resourceType":"OperationOutcome"}"#)
        .create_async()
        .await;

    let err = poller(&server, PollConfig::default())
        .start_export(&request(), &token())
        .await
        .unwrap_err();

    match err {
        BulkExportError::KickoffFailed { status, message } => {
            assert_eq!(status, 403);
            assert!(message.contains("OperationOutcome"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_kickoff_connection_refused() {
    let config = FhirConfig {
        base_url: "http://127.0.0.1:1/fhir".to_string(),
        group_id: "lab-cohort".to_string(),
        timeout_seconds: 2,
        ..Default::default()
    };
    let poller = BulkExportPoller::new(FhirClient::new(&config).unwrap(), config.poll);

    let err = poller.start_export(&request(), &token()).await.unwrap_err();
    assert!(matches!(err, BulkExportError::ConnectionFailed(_)));
}

#[tokio::test]
async fn test_completed_manifest_is_returned() {
    let mut server = Server::new_async().await;
    let manifest = json!({
        "transactionTime": "2024-03-01T00:00:00Z",
        "request": format!("{}/fhir/Group/lab-cohort/$export", server.url()),
        "requiresAccessToken": true,
        "output": [
            {"type": "Patient", "url": format!("{}/files/patient.ndjson", server.url())},
            {"type": "Observation", "url": format!("{}/files/obs.ndjson", server.url()), "count": 2}
        ],
        "error": []
    });
    let status = server
        .mock("GET", "/status/1")
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(manifest.to_string())
        .expect(1)
        .create_async()
        .await;

    let location = PollLocation::new(format!("{}/status/1", server.url())).unwrap();
    let manifest = poller(&server, PollConfig::default())
        .await_completion(&location, &token())
        .await
        .unwrap();

    status.assert_async().await;
    assert!(manifest.requires_access_token);
    assert_eq!(manifest.output.len(), 2);
    assert_eq!(manifest.output[1].record_type, "Observation");
    assert_eq!(manifest.output[1].count, Some(2));
}

#[tokio::test]
async fn test_job_failure_status_is_terminal() {
    let mut server = Server::new_async().await;
    let status = server
        .mock("GET", "/status/1")
        .with_status(404)
        .with_body("job deleted")
        .expect(1)
        .create_async()
        .await;

    let location = PollLocation::new(format!("{}/status/1", server.url())).unwrap();
    let err = poller(&server, PollConfig::default())
        .await_completion(&location, &token())
        .await
        .unwrap_err();

    status.assert_async().await;
    assert!(matches!(err, BulkExportError::JobFailed { status: 404, .. }));
}

#[tokio::test]
async fn test_invalid_manifest_is_terminal() {
    let mut server = Server::new_async().await;
    let _status = server
        .mock("GET", "/status/1")
        .with_status(200)
        .with_body("not a manifest")
        .create_async()
        .await;

    let location = PollLocation::new(format!("{}/status/1", server.url())).unwrap();
    let err = poller(&server, PollConfig::default())
        .await_completion(&location, &token())
        .await
        .unwrap_err();

    assert!(matches!(err, BulkExportError::InvalidManifest(_)));
}

#[tokio::test]
async fn test_in_progress_until_attempts_exhausted() {
    let mut server = Server::new_async().await;
    let status = server
        .mock("GET", "/status/1")
        .with_status(202)
        .with_header("x-progress", "50%")
        .expect(1)
        .create_async()
        .await;

    let policy = PollConfig {
        max_attempts: 1,
        ..Default::default()
    };
    let location = PollLocation::new(format!("{}/status/1", server.url())).unwrap();
    let err = poller(&server, policy)
        .await_completion(&location, &token())
        .await
        .unwrap_err();

    status.assert_async().await;
    assert!(matches!(err, BulkExportError::Timeout { attempts: 1 }));
}

#[tokio::test]
async fn test_consecutive_server_errors_give_up() {
    let mut server = Server::new_async().await;
    let status = server
        .mock("GET", "/status/1")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let policy = PollConfig {
        interval_seconds: 1,
        max_interval_seconds: 1,
        max_consecutive_failures: 1,
        ..Default::default()
    };
    let location = PollLocation::new(format!("{}/status/1", server.url())).unwrap();
    let err = poller(&server, policy)
        .await_completion(&location, &token())
        .await
        .unwrap_err();

    status.assert_async().await;
    assert!(matches!(
        err,
        BulkExportError::TooManyFailures { attempts: 2, .. }
    ));
}

#[tokio::test]
async fn test_in_progress_then_completed() {
    let mut server = Server::new_async().await;
    let manifest = json!({
        "transactionTime": "2024-03-01T00:00:00Z",
        "request": format!("{}/fhir/Group/lab-cohort/$export", server.url()),
        "requiresAccessToken": true,
        "output": [
            {"type": "Observation", "url": format!("{}/files/obs.ndjson", server.url())}
        ],
        "error": []
    });
    let in_progress = server
        .mock("GET", "/status/1")
        .with_status(202)
        .with_header("x-progress", "50%")
        .expect(1)
        .create_async()
        .await;
    let completed = server
        .mock("GET", "/status/1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(manifest.to_string())
        .expect(1)
        .create_async()
        .await;

    let policy = PollConfig {
        interval_seconds: 1,
        max_interval_seconds: 1,
        ..Default::default()
    };
    let location = PollLocation::new(format!("{}/status/1", server.url())).unwrap();
    let manifest = poller(&server, policy)
        .await_completion(&location, &token())
        .await
        .unwrap();

    in_progress.assert_async().await;
    completed.assert_async().await;
    assert_eq!(manifest.output.len(), 1);
    assert_eq!(manifest.output[0].record_type, "Observation");
}
