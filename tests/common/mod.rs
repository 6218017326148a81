//! Shared helpers for integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};
use video_pipeline_profiler::{
    aggregator::{finalize, RunWindow},
    models::{Config, MetricSample, TestConfig, TestResult},
};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

pub const PREFIX: &str = "/api/v1/video-pipeline";

/// Mock video pipeline service
pub struct MockPipeline {
    pub server: MockServer,
}

impl MockPipeline {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub async fn healthy(&self) -> &Self {
        Mock::given(method("GET"))
            .and(path(format!("{}/health/", PREFIX)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .mount(&self.server)
            .await;
        self
    }

    pub async fn accepts_starts(&self) -> &Self {
        Mock::given(method("POST"))
            .and(path(format!("{}/decode/", PREFIX)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "started"})))
            .mount(&self.server)
            .await;
        self
    }

    pub async fn accepts_stops(&self) -> &Self {
        Mock::given(method("POST"))
            .and(path(format!("{}/decode/stop/", PREFIX)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "stopped"})))
            .mount(&self.server)
            .await;
        self
    }

    /// Every listed channel reports `running` with `frames` decoded
    pub async fn reports_frames(&self, camera_ids: &[String], frames: u64) -> &Self {
        for camera_id in camera_ids {
            Mock::given(method("GET"))
                .and(path(format!("{}/decode/status/", PREFIX)))
                .and(query_param("camera_id", camera_id.as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "camera_id": camera_id,
                    "status": "running",
                    "frame_count": frames,
                    "last_error": null,
                })))
                .mount(&self.server)
                .await;
        }
        self
    }
}

/// A short, fast run configuration against `api_base_url`
pub fn run_config(api_base_url: &str, channels: usize, duration: f64, output: &Path) -> Config {
    let mut config = Config::default();
    config.enable_color = false;
    config.test.api_base_url = api_base_url.to_string();
    config.test.channel_count = channels;
    config.test.test_duration = duration;
    config.test.channel_start_delay = 0.1;
    config.test.monitor_interval = 0.1;
    config.test.request_timeout = 2.0;
    config.test.stop_grace_period = 2.0;
    config.test.output_file = output.display().to_string();
    config.test.normalize_sources();
    config
}

/// A synthetic completed run sampled every `cadence` seconds
pub fn synthetic_run(count: usize, cadence: f64, cpu: impl Fn(usize) -> f64) -> TestResult {
    let origin = 1_750_000_000.0;
    let samples: Vec<MetricSample> = (0..count)
        .map(|i| MetricSample {
            timestamp: origin + i as f64 * cadence,
            cpu_percent: cpu(i),
            memory_percent: 40.0 + i as f64 * 0.1,
            memory_mb: 2000.0 + i as f64 * 3.0,
            active_channels: (i + 1).min(4),
            total_frames: 5 * i as u64,
            errors: Vec::new(),
        })
        .collect();

    let mut config = TestConfig {
        channel_count: 4,
        ..TestConfig::default()
    };
    config.normalize_sources();

    let start = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
    let end = start + chrono::Duration::milliseconds((count as f64 * cadence * 1000.0) as i64);
    finalize(&config, samples, Vec::new(), &[], RunWindow::new(start, end))
}

/// Save `result` as `<dir>/<name>.json`
pub fn save_run(dir: &Path, name: &str, result: &TestResult) -> PathBuf {
    let path = dir.join(format!("{}.json", name));
    result.save(&path).unwrap();
    path
}
