//! HTTP client integration tests against a mock video pipeline service

use super::*;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::{
    matchers::{body_string_contains, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const PREFIX: &str = "/api/v1/video-pipeline";

/// Mock video pipeline service for controlled testing scenarios
pub struct MockPipelineServer {
    server: MockServer,
}

impl MockPipelineServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the mock service (what the profiler calls `api_base_url`)
    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub async fn mock_health(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("{}/health/", PREFIX)))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({"status": "ok"})))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_start(&self, status: u16, body: serde_json::Value, delay: Option<Duration>) {
        let mut template = ResponseTemplate::new(status).set_body_json(body);
        if let Some(delay) = delay {
            template = template.set_delay(delay);
        }
        Mock::given(method("POST"))
            .and(path(format!("{}/decode/", PREFIX)))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_stop(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(format!("{}/decode/stop/", PREFIX)))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(serde_json::json!({"detail": "No decode task found for this camera."})),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_status(&self, camera_id: &str, status: &str, frame_count: u64) {
        Mock::given(method("GET"))
            .and(path(format!("{}/decode/status/", PREFIX)))
            .and(query_param("camera_id", camera_id))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "camera_id": camera_id,
                "status": status,
                "frame_count": frame_count,
                "last_error": null,
            })))
            .mount(&self.server)
            .await;
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }
}

fn client_for(server: &MockPipelineServer, timeout: Duration) -> HttpPipelineClient {
    HttpPipelineClient::new(&server.url(), timeout, ServiceLogger::quiet()).unwrap()
}

#[tokio::test]
async fn test_health_ok() {
    let server = MockPipelineServer::new().await;
    server.mock_health(200).await;

    let client = client_for(&server, Duration::from_secs(2));
    assert_ok!(client.health().await);
}

#[tokio::test]
async fn test_health_non_200_is_connectivity_error() {
    let server = MockPipelineServer::new().await;
    server.mock_health(503).await;

    let client = client_for(&server, Duration::from_secs(2));
    let err = client.health().await.unwrap_err();
    assert_eq!(err.category(), "CONNECTIVITY");
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_health_unreachable() {
    // Nothing listens on port 9 of the loopback interface
    let client = HttpPipelineClient::new("http://127.0.0.1:9", Duration::from_secs(2), ServiceLogger::quiet()).unwrap();
    let err = client.health().await.unwrap_err();
    assert!(matches!(err, AppError::Connectivity(_) | AppError::Timeout(_)));
}

#[tokio::test]
async fn test_start_sends_form_fields() {
    let server = MockPipelineServer::new().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/decode/", PREFIX)))
        .and(body_string_contains("camera_id=camera_003"))
        .and(body_string_contains("fps=2"))
        .and(body_string_contains("force_format=v4l2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "started"})))
        .expect(1)
        .mount(server.server())
        .await;

    let client = client_for(&server, Duration::from_secs(2));
    let request = DecodeRequest::new("camera_003", "rtsp://cam/3", 2, HwAccel::V4l2);
    assert_eq!(client.start_decode(&request).await.unwrap(), StartAck::Started);
}

#[tokio::test]
async fn test_start_already_running_is_success() {
    let server = MockPipelineServer::new().await;
    server
        .mock_start(200, serde_json::json!({"message": "Decoding already running", "status": "already_running"}), None)
        .await;

    let client = client_for(&server, Duration::from_secs(2));
    let request = DecodeRequest::new("camera_001", "rtsp://cam/1", 1, HwAccel::Auto);
    assert_eq!(client.start_decode(&request).await.unwrap(), StartAck::AlreadyRunning);
}

#[tokio::test]
async fn test_start_server_error_carries_detail() {
    let server = MockPipelineServer::new().await;
    server
        .mock_start(500, serde_json::json!({"detail": "Failed to start decode: no such stream"}), None)
        .await;

    let client = client_for(&server, Duration::from_secs(2));
    let request = DecodeRequest::new("camera_001", "rtsp://cam/1", 1, HwAccel::Auto);
    let err = client.start_decode(&request).await.unwrap_err();
    assert_eq!(err.category(), "HTTP");
    assert!(err.to_string().contains("HTTP 500: Failed to start decode"));
}

#[tokio::test]
async fn test_start_timeout() {
    let server = MockPipelineServer::new().await;
    server
        .mock_start(200, serde_json::json!({"status": "started"}), Some(Duration::from_secs(5)))
        .await;

    let client = client_for(&server, Duration::from_millis(200));
    let request = DecodeRequest::new("camera_001", "rtsp://cam/1", 1, HwAccel::Auto);
    let err = client.start_decode(&request).await.unwrap_err();
    assert_eq!(err.category(), "TIMEOUT");
}

#[tokio::test]
async fn test_stop_not_found_is_not_running() {
    let server = MockPipelineServer::new().await;
    server.mock_stop(404).await;

    let client = client_for(&server, Duration::from_secs(2));
    assert_eq!(client.stop_decode("camera_009").await.unwrap(), StopAck::NotRunning);
}

#[tokio::test]
async fn test_stop_ok_and_failure() {
    let server = MockPipelineServer::new().await;
    server.mock_stop(200).await;
    let client = client_for(&server, Duration::from_secs(2));
    assert_eq!(client.stop_decode("camera_001").await.unwrap(), StopAck::Stopped);

    let failing = MockPipelineServer::new().await;
    failing.mock_stop(500).await;
    let client = client_for(&failing, Duration::from_secs(2));
    assert_err!(client.stop_decode("camera_001").await);
}

#[tokio::test]
async fn test_decode_status() {
    let server = MockPipelineServer::new().await;
    server.mock_status("camera_001", "running", 42).await;

    let client = client_for(&server, Duration::from_secs(2));
    let status = client.decode_status("camera_001").await.unwrap();
    assert_eq!(status.status, "running");
    assert_eq!(status.frame_count, 42);

    // no mock for this channel: wiremock answers 404
    assert_err!(client.decode_status("camera_002").await);
}
