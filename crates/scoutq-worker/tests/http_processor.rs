//! Integration tests for `HttpProcessor` using wiremock HTTP mocks.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use scoutq_core::{Platform, TaskRecord};
use scoutq_ledger::ClaimedTask;
use scoutq_worker::{HttpProcessor, Processor, ProcessorError};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn claimed_task() -> ClaimedTask {
    let mut record = TaskRecord::new_pending(
        "acme",
        "branding",
        "casual",
        vec!["rival".to_string()],
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    );
    record.status = scoutq_core::TaskStatus::Processing;
    ClaimedTask {
        platform: Platform::Instagram,
        subject: "acme".to_string(),
        key: "AccountInfo/instagram/acme/info.json".to_string(),
        record,
        version: "1".to_string(),
    }
}

fn test_processor(server: &MockServer) -> HttpProcessor {
    HttpProcessor::new(&format!("{}/process", server.uri()), Duration::from_secs(5))
        .expect("processor construction should not fail")
}

#[tokio::test]
async fn posts_task_and_decodes_output() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/process"))
        .and(body_partial_json(serde_json::json!({
            "platform": "instagram",
            "subject": "acme",
            "accountInfo": {
                "username": "acme",
                "accountType": "branding",
                "competitors": ["rival"]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "message": "analysed",
            "profile": { "followersCount": 12 },
            "artifacts": [
                { "kind": "recommendation", "body": { "tips": ["post more"] } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let output = test_processor(&server)
        .process(&claimed_task())
        .await
        .expect("should decode output");

    assert!(output.success);
    assert_eq!(output.message, "analysed");
    assert_eq!(output.profile.unwrap()["followersCount"], 12);
    assert_eq!(output.artifacts.len(), 1);
    assert_eq!(output.artifacts[0].kind, "recommendation");
}

#[tokio::test]
async fn missing_optional_fields_default() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false
        })))
        .mount(&server)
        .await;

    let output = test_processor(&server)
        .process(&claimed_task())
        .await
        .expect("should decode output");

    assert!(!output.success);
    assert!(output.message.is_empty());
    assert!(output.profile.is_none());
    assert!(output.artifacts.is_empty());
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = test_processor(&server)
        .process(&claimed_task())
        .await
        .unwrap_err();

    match err {
        ProcessorError::Status { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, "bad gateway");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn garbage_body_is_a_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = test_processor(&server)
        .process(&claimed_task())
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessorError::Decode(_)));
}

#[test]
fn rejects_unparseable_url() {
    let result = HttpProcessor::new("not a url", Duration::from_secs(1));
    assert!(matches!(result, Err(ProcessorError::InvalidUrl { .. })));
}
