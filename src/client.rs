//! HTTP client for the video pipeline service

#[cfg(test)]
mod integration_tests;

use crate::{
    error::{AppError, Result},
    logging::ServiceLogger,
    models::TestConfig,
    types::HwAccel,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Operations the profiler needs from the video pipeline service
#[async_trait]
pub trait PipelineClient: Send + Sync {
    /// Liveness check; succeeds only on HTTP 200
    async fn health(&self) -> Result<()>;

    /// Ask the service to start decoding one channel
    async fn start_decode(&self, request: &DecodeRequest) -> Result<StartAck>;

    /// Ask the service to stop decoding one channel
    async fn stop_decode(&self, camera_id: &str) -> Result<StopAck>;

    /// Current decode status of one channel
    async fn decode_status(&self, camera_id: &str) -> Result<DecodeStatus>;
}

/// Form fields of a decode start request
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeRequest {
    pub camera_id: String,
    pub url: String,
    pub fps: u32,
    pub hw_accel: HwAccel,
}

impl DecodeRequest {
    pub fn new(camera_id: &str, url: &str, fps: u32, hw_accel: HwAccel) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            url: url.to_string(),
            fps,
            hw_accel,
        }
    }

    /// Form encoding; `force_format` is omitted for `auto`
    pub fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("camera_id", self.camera_id.clone()),
            ("url", self.url.clone()),
            ("fps", self.fps.to_string()),
        ];
        if let Some(format) = self.hw_accel.force_format() {
            form.push(("force_format", format.to_string()));
        }
        form
    }
}

/// Outcome of an accepted start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAck {
    Started,
    /// The service already had a task for this channel
    AlreadyRunning,
}

/// Outcome of an accepted stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAck {
    Stopped,
    /// The service does not know the channel (HTTP 404)
    NotRunning,
}

/// Body of `GET /decode/status/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeStatus {
    pub camera_id: String,
    pub status: String,
    #[serde(default)]
    pub frame_count: u64,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl DecodeStatus {
    /// The service reports the decode task as faulted
    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("error")
    }
}

#[derive(Debug, Deserialize)]
struct StartBody {
    #[serde(default)]
    status: Option<String>,
}

/// reqwest-backed [`PipelineClient`]
pub struct HttpPipelineClient {
    client: Client,
    api_root: String,
    request_timeout: Duration,
    logger: ServiceLogger,
}

impl HttpPipelineClient {
    /// Create a client for the service at `api_base_url`
    pub fn new(api_base_url: &str, request_timeout: Duration, logger: ServiceLogger) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("vpprof/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_root: format!("{}{}", api_base_url.trim_end_matches('/'), crate::defaults::API_PREFIX),
            request_timeout,
            logger,
        })
    }

    /// Create a client from the run configuration
    pub fn from_config(config: &TestConfig, logger: ServiceLogger) -> Result<Self> {
        Self::new(&config.api_base_url, config.request_timeout(), logger)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    /// Send a request bounded by the request timeout and log it
    async fn send(&self, method: &str, url: &str, request: RequestBuilder) -> Result<reqwest::Response> {
        let started = Instant::now();
        let result = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| {
                AppError::timeout(format!(
                    "{} {} timed out after {:.1}s",
                    method,
                    url,
                    self.request_timeout.as_secs_f64()
                ))
            })
            .and_then(|sent| sent.map_err(AppError::from));

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let status = result.as_ref().ok().map(|r| r.status().as_u16());
        self.logger.log_http_request(method, url, status, elapsed_ms).await;

        result
    }

    async fn unexpected_status(response: reqwest::Response) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or(body);

        if detail.trim().is_empty() {
            AppError::http_request(format!("HTTP {}", status.as_u16()))
        } else {
            AppError::http_request(format!("HTTP {}: {}", status.as_u16(), detail.trim()))
        }
    }
}

#[async_trait]
impl PipelineClient for HttpPipelineClient {
    async fn health(&self) -> Result<()> {
        let url = self.endpoint("/health/");
        let response = self
            .send("GET", &url, self.client.get(&url))
            .await
            .map_err(|e| match e {
                AppError::HttpRequest(msg) => AppError::connectivity(msg),
                other => other,
            })?;

        if response.status() == StatusCode::OK {
            self.logger.log_connection(&self.api_root, true, None).await;
            Ok(())
        } else {
            let msg = format!("health check returned HTTP {}", response.status().as_u16());
            self.logger.log_connection(&self.api_root, false, Some(&msg)).await;
            Err(AppError::connectivity(msg))
        }
    }

    async fn start_decode(&self, request: &DecodeRequest) -> Result<StartAck> {
        let url = self.endpoint("/decode/");
        let response = self
            .send("POST", &url, self.client.post(&url).form(&request.form()))
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::unexpected_status(response).await);
        }

        // A body without a recognizable status still means the start was accepted
        let body = response.text().await.unwrap_or_default();
        let ack = match serde_json::from_str::<StartBody>(&body) {
            Ok(StartBody { status: Some(status) }) if status == "already_running" => StartAck::AlreadyRunning,
            _ => StartAck::Started,
        };
        Ok(ack)
    }

    async fn stop_decode(&self, camera_id: &str) -> Result<StopAck> {
        let url = self.endpoint("/decode/stop/");
        let response = self
            .send("POST", &url, self.client.post(&url).form(&[("camera_id", camera_id)]))
            .await?;

        match response.status() {
            StatusCode::OK => Ok(StopAck::Stopped),
            StatusCode::NOT_FOUND => Ok(StopAck::NotRunning),
            _ => Err(Self::unexpected_status(response).await),
        }
    }

    async fn decode_status(&self, camera_id: &str) -> Result<DecodeStatus> {
        let url = self.endpoint("/decode/status/");
        let response = self
            .send("GET", &url, self.client.get(&url).query(&[("camera_id", camera_id)]))
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::unexpected_status(response).await);
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| AppError::http_request(format!("Malformed status response for {}: {}", camera_id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_form_omits_auto() {
        let request = DecodeRequest::new("camera_001", "rtsp://cam/1", 1, HwAccel::Auto);
        let form = request.form();
        assert_eq!(form.len(), 3);
        assert!(form.iter().all(|(k, _)| *k != "force_format"));

        let request = DecodeRequest::new("camera_001", "rtsp://cam/1", 5, HwAccel::Rkmpp);
        let form = request.form();
        assert!(form.contains(&("force_format", "rkmpp".to_string())));
        assert!(form.contains(&("fps", "5".to_string())));
    }

    #[test]
    fn test_decode_status_parsing() {
        let status: DecodeStatus =
            serde_json::from_str(r#"{"camera_id": "camera_001", "status": "not_started", "frame_count": 0}"#).unwrap();
        assert!(!status.is_error());
        assert_eq!(status.last_error, None);

        let status: DecodeStatus = serde_json::from_str(
            r#"{"camera_id": "camera_002", "status": "error", "frame_count": 17, "last_error": "Process exited with code 1"}"#,
        )
        .unwrap();
        assert!(status.is_error());
        assert_eq!(status.frame_count, 17);
    }

    #[test]
    fn test_endpoint_building() {
        let client =
            HttpPipelineClient::new("http://localhost:8002/", Duration::from_secs(1), ServiceLogger::quiet()).unwrap();
        assert_eq!(
            client.endpoint("/decode/"),
            "http://localhost:8002/api/v1/video-pipeline/decode/"
        );
    }
}
