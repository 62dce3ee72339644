//! Integration tests for `S3Store` using wiremock HTTP mocks.

use std::time::Duration;

use bytes::Bytes;
use scoutq_core::S3Settings;
use scoutq_store::{ObjectStore, PutOptions, PutOutcome, S3Store, StoreError};
use wiremock::matchers::{body_string, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TASK_PATH: &str = "/tasks/AccountInfo/twitter/acme/info.json";

fn test_store(endpoint: &str) -> S3Store {
    S3Store::new(
        S3Settings {
            endpoint: endpoint.to_string(),
            bucket: "tasks".to_string(),
            region: "auto".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
        },
        Duration::from_secs(5),
    )
    .expect("store construction should not fail")
    .with_retry(2, 0)
}

#[tokio::test]
async fn get_returns_body_etag_and_metadata() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(TASK_PATH))
        .and(header_exists("authorization"))
        .and(header_exists("x-amz-date"))
        .and(header_exists("x-amz-content-sha256"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .insert_header("last-modified", "Wed, 01 Jan 2025 10:00:00 GMT")
                .insert_header("x-amz-meta-expiration-time", "2025-01-02T10:00:00Z")
                .set_body_string(r#"{"username":"acme"}"#),
        )
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    let object = store
        .get("AccountInfo/twitter/acme/info.json")
        .await
        .expect("get should succeed")
        .expect("object should exist");

    assert_eq!(object.data, Bytes::from_static(br#"{"username":"acme"}"#));
    assert_eq!(object.meta.version, "\"v1\"");
    assert!(object.meta.last_modified.is_some());
    assert_eq!(
        object.meta.metadata.get("expiration-time").map(String::as_str),
        Some("2025-01-02T10:00:00Z")
    );
}

#[tokio::test]
async fn get_missing_object_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tasks/nope.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    assert!(store.get("nope.json").await.unwrap().is_none());
}

#[tokio::test]
async fn head_reads_metadata_without_body() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/tasks/recommendation/twitter/acme/recommendation_1.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"e\"")
                .insert_header("x-amz-meta-expiration-time", "2025-01-02T10:00:00Z"),
        )
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    let meta = store
        .head("recommendation/twitter/acme/recommendation_1.json")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, "\"e\"");
    assert!(meta.metadata.contains_key("expiration-time"));
}

#[tokio::test]
async fn create_only_put_sends_if_none_match() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(TASK_PATH))
        .and(header("if-none-match", "*"))
        .and(header("content-type", "application/json"))
        .and(header("x-amz-meta-expiration-time", "2025-01-02T10:00:00Z"))
        .and(body_string("{}"))
        .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"new\""))
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    let outcome = store
        .put(
            "AccountInfo/twitter/acme/info.json",
            Bytes::from_static(b"{}"),
            PutOptions::json()
                .if_absent()
                .with_metadata("expiration-time", "2025-01-02T10:00:00Z"),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PutOutcome::Written {
            version: "\"new\"".to_string()
        }
    );
}

#[tokio::test]
async fn conditional_put_412_is_precondition_failed() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(TASK_PATH))
        .and(header("if-match", "\"stale\""))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    let outcome = store
        .put(
            "AccountInfo/twitter/acme/info.json",
            Bytes::from_static(b"{}"),
            PutOptions::json().if_version("\"stale\""),
        )
        .await
        .unwrap();

    assert_eq!(outcome, PutOutcome::PreconditionFailed);
}

/// First send answers 503 (but lands), the resend answers 412.
async fn mount_lost_answer_put(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path(TASK_PATH))
        .and(header("if-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(412))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn resent_conditional_put_that_already_landed_is_written() {
    let server = MockServer::start().await;
    mount_lost_answer_put(&server).await;
    Mock::given(method("GET"))
        .and(path(TASK_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v2\"")
                .set_body_string(r#"{"status":"processing"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    let outcome = store
        .put(
            "AccountInfo/twitter/acme/info.json",
            Bytes::from_static(br#"{"status":"processing"}"#),
            PutOptions::json().if_version("\"v1\""),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PutOutcome::Written {
            version: "\"v2\"".to_string()
        }
    );
}

#[tokio::test]
async fn resent_conditional_put_beaten_by_another_writer_is_rejected() {
    let server = MockServer::start().await;
    mount_lost_answer_put(&server).await;
    Mock::given(method("GET"))
        .and(path(TASK_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v2\"")
                .set_body_string(r#"{"status":"failed"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    let outcome = store
        .put(
            "AccountInfo/twitter/acme/info.json",
            Bytes::from_static(br#"{"status":"processing"}"#),
            PutOptions::json().if_version("\"v1\""),
        )
        .await
        .unwrap();

    assert_eq!(outcome, PutOutcome::PreconditionFailed);
}

#[tokio::test]
async fn delete_treats_missing_as_success() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/tasks/gone.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    store.delete("gone.json").await.expect("404 delete is Ok");
}

#[tokio::test]
async fn list_follows_continuation_tokens() {
    let server = MockServer::start().await;

    let first_page = r#"<ListBucketResult>
        <IsTruncated>true</IsTruncated>
        <Contents><Key>AccountInfo/twitter/a/info.json</Key><Size>1</Size><ETag>"1"</ETag></Contents>
        <NextContinuationToken>page-2</NextContinuationToken>
    </ListBucketResult>"#;
    let second_page = r#"<ListBucketResult>
        <IsTruncated>false</IsTruncated>
        <Contents><Key>AccountInfo/twitter/b/info.json</Key><Size>1</Size><ETag>"2"</ETag></Contents>
    </ListBucketResult>"#;

    Mock::given(method("GET"))
        .and(path("/tasks"))
        .and(query_param("list-type", "2"))
        .and(query_param("prefix", "AccountInfo/twitter/"))
        .and(query_param("continuation-token", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(second_page))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tasks"))
        .and(query_param("list-type", "2"))
        .and(query_param("prefix", "AccountInfo/twitter/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(first_page))
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    let keys: Vec<String> = store
        .list("AccountInfo/twitter/")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.key)
        .collect();

    assert_eq!(
        keys,
        vec![
            "AccountInfo/twitter/a/info.json",
            "AccountInfo/twitter/b/info.json"
        ]
    );
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tasks/flaky.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tasks/flaky.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    let object = store.get("flaky.json").await.unwrap().unwrap();
    assert_eq!(object.data, Bytes::from_static(b"ok"));
}

#[tokio::test]
async fn forbidden_is_surfaced_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tasks/secret.json"))
        .respond_with(ResponseTemplate::new(403).set_body_string("AccessDenied"))
        .expect(1)
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    let err = store.get("secret.json").await.unwrap_err();
    assert!(
        matches!(err, StoreError::Status { status: 403, .. }),
        "expected 403 Status error, got: {err:?}"
    );
}

#[tokio::test]
async fn persistent_server_errors_give_up() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tasks/down.json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let store = test_store(&server.uri());
    let err = store.get("down.json").await.unwrap_err();
    assert!(err.is_transient_status());
}
