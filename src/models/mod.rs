//! Data models for test configuration and collected telemetry

pub mod config;
pub mod metrics;

// Re-export main model types
pub use config::{Config, TestConfig};
pub use metrics::{ChannelReport, ErrorOperation, ErrorRecord, MetricSample, Summary, TestResult};
