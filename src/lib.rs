//! Video Pipeline Profiler
//!
//! Drives a video pipeline service through many concurrent decode channels
//! (simulated camera streams) while sampling host CPU and memory usage, then
//! aggregates the telemetry into a result artifact that can be analyzed and
//! compared across runs.

pub mod aggregator;
pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod output;
pub mod stats;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{Config, MetricSample, Summary, TestConfig, TestResult};
pub use stats::{AnalysisReport, Analyzer, ComparisonReport};
pub use store::TelemetryStore;
pub use types::{ChannelState, HwAccel};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Version line including build metadata from build.rs
pub fn long_version() -> String {
    format!(
        "{} (commit {}, built {}, {})",
        VERSION,
        env!("GIT_COMMIT"),
        env!("BUILD_TIME"),
        env!("TARGET_TRIPLE")
    )
}

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8002";
    pub const API_PREFIX: &str = "/api/v1/video-pipeline";
    pub const DEFAULT_CHANNELS: usize = 5;
    pub const MAX_CHANNELS: usize = 256;
    pub const DEFAULT_TEST_DURATION_SECS: f64 = 60.0;
    pub const DEFAULT_START_DELAY_SECS: f64 = 2.0;
    pub const DEFAULT_FPS: u32 = 1;
    pub const DEFAULT_MONITOR_INTERVAL_SECS: f64 = 1.0;
    pub const MIN_MONITOR_INTERVAL_SECS: f64 = 0.05;
    pub const DEFAULT_OUTPUT_FILE: &str = "profiling_results.json";
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);
    pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_ENABLE_COLOR: bool = true;
    /// Streams cycled through when no explicit sources are configured
    pub const DEFAULT_SAMPLE_STREAMS: &[&str] = &[
        "rtsp://192.168.9.108:8554/stream1",
        "rtsp://192.168.9.108:8554/stream6",
        "rtsp://192.168.9.108:8554/stream3",
        "rtsp://192.168.9.108:8554/stream3",
        "rtsp://192.168.9.108:8554/stream1",
        "rtsp://192.168.9.108:8554/stream7",
        "rtsp://192.168.9.108:8554/stream7",
        "rtsp://192.168.9.108:8554/stream4",
        "rtsp://192.168.9.108:8554/stream1",
        "rtsp://192.168.9.108:8554/stream6",
    ];
}
