/// LighthouseBackend against a mock upload node.

use chrono::Utc;
use medisave::error::Error;
use medisave::storage::lighthouse::{LighthouseBackend, LighthouseConfig};
use medisave::storage::{FileData, UploadBackend, UploadMethod};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn file() -> FileData {
    let now = Utc::now();
    FileData {
        name: "Budget 2024".into(),
        content: "a%2Cb".into(),
        created: now,
        modified: now,
    }
}

fn backend(server: &MockServer, api_key: &str) -> LighthouseBackend {
    LighthouseBackend::new(LighthouseConfig {
        api_url: server.uri(),
        api_key: api_key.into(),
    })
}

#[tokio::test]
async fn upload_returns_hash_as_content_address() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/add"))
        .and(header("Authorization", "Bearer lh-key"))
        .and(body_string_contains("a%2Cb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Name": "Budget 2024.json",
            "Hash": "bafkbudget",
            "Size": "88"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = backend(&server, "lh-key").upload(&file()).await.unwrap();

    assert_eq!(receipt.address.as_str(), "bafkbudget");
    assert_eq!(
        UploadMethod::Lighthouse.gateway_url(&receipt.address),
        "https://gateway.lighthouse.storage/ipfs/bafkbudget"
    );
}

#[tokio::test]
async fn missing_api_key_fails_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = backend(&server, "").upload(&file()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Upload {
            backend: UploadMethod::Lighthouse,
            ..
        }
    ));
}

#[tokio::test]
async fn rejected_key_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/add"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = backend(&server, "stale").upload(&file()).await.unwrap_err();
    assert!(err.to_string().contains("Lighthouse"));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn malformed_response_is_upload_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/add"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = backend(&server, "lh-key").upload(&file()).await.unwrap_err();
    assert!(matches!(err, Error::Upload { .. }));
}
