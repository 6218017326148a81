//! Telemetry samples and the persisted test result artifact

use crate::models::config::TestConfig;
use crate::types::{AppError, ChannelState, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Service call that produced an error record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOperation {
    Start,
    Stop,
    Status,
}

impl ErrorOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorOperation::Start => "start",
            ErrorOperation::Stop => "stop",
            ErrorOperation::Status => "status",
        }
    }
}

impl fmt::Display for ErrorOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the shared error log
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub channel_id: String,
    pub operation: ErrorOperation,
    pub message: String,
}

impl ErrorRecord {
    pub fn new<S: Into<String>>(channel_id: &str, operation: ErrorOperation, message: S) -> Self {
        Self {
            timestamp: Utc::now(),
            channel_id: channel_id.to_string(),
            operation,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    /// `[<rfc3339>] <operation> <channel>: <message>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.operation,
            self.channel_id,
            self.message
        )
    }
}

/// One monitor tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSample {
    /// Unix timestamp in seconds
    pub timestamp: f64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_mb: f64,
    /// Channels in the Active state at sampling time
    pub active_channels: usize,
    /// Cumulative decoded frames across all channels
    pub total_frames: u64,
    /// Errors recorded since the previous sample
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Aggregated figures of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Summary {
    pub total_metrics: usize,
    #[serde(deserialize_with = "deserialize_run_boundary")]
    pub test_start: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_run_boundary")]
    pub test_end: DateTime<Utc>,
    pub max_channels: usize,
    pub max_cpu_percent: f64,
    pub max_memory_mb: f64,
    pub total_frames: u64,
    pub total_errors: usize,
    #[serde(default)]
    pub avg_cpu_percent: f64,
    #[serde(default)]
    pub avg_memory_mb: f64,
    /// Monitor cycles that could not be sampled on schedule
    #[serde(default)]
    pub missed_ticks: u64,
}

/// RFC 3339, or an ISO 8601 local time without offset which is read as UTC
fn deserialize_run_boundary<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| raw.parse::<NaiveDateTime>().map(|naive| naive.and_utc()))
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
}

impl Summary {
    /// Wall-clock length of the run in seconds
    pub fn duration_secs(&self) -> f64 {
        (self.test_end - self.test_start)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Final state of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelReport {
    pub channel_id: String,
    pub source_url: String,
    pub state: ChannelState,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub frame_count: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// The persisted result of one profiling run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestResult {
    pub test_config: TestConfig,
    pub summary: Summary,
    pub metrics: Vec<MetricSample>,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelReport>,
}

impl TestResult {
    /// Check the artifact invariants
    pub fn validate(&self) -> std::result::Result<(), String> {
        let summary = &self.summary;

        if summary.total_errors != self.errors.len() {
            return Err(format!(
                "summary.total_errors is {} but {} errors are listed",
                summary.total_errors,
                self.errors.len()
            ));
        }

        if summary.total_metrics != self.metrics.len() {
            return Err(format!(
                "summary.total_metrics is {} but {} samples are listed",
                summary.total_metrics,
                self.metrics.len()
            ));
        }

        if summary.max_channels > self.test_config.channel_count {
            return Err(format!(
                "summary.max_channels ({}) exceeds channel_count ({})",
                summary.max_channels, self.test_config.channel_count
            ));
        }

        if summary.test_end < summary.test_start {
            return Err("summary.test_end precedes summary.test_start".to_string());
        }

        let mut previous = f64::NEG_INFINITY;
        for (index, sample) in self.metrics.iter().enumerate() {
            if !sample.timestamp.is_finite() {
                return Err(format!("metrics[{}].timestamp is not a finite number", index));
            }
            if sample.timestamp < previous {
                return Err(format!(
                    "metrics[{}].timestamp {} is earlier than the previous sample {}",
                    index, sample.timestamp, previous
                ));
            }
            if sample.active_channels > self.test_config.channel_count {
                return Err(format!(
                    "metrics[{}].active_channels ({}) exceeds channel_count ({})",
                    index, sample.active_channels, self.test_config.channel_count
                ));
            }
            previous = sample.timestamp;
        }

        Ok(())
    }

    /// Parse and validate an artifact held in memory
    pub fn from_json_str<P: AsRef<Path>>(path: P, content: &str) -> Result<Self> {
        let mut result: TestResult = serde_json::from_str(content)
            .map_err(|e| AppError::artifact(path.as_ref(), e.to_string()))?;
        result.test_config.infer_channel_count();
        result
            .validate()
            .map_err(|reason| AppError::artifact(path.as_ref(), reason))?;
        Ok(result)
    }

    /// Load and validate an artifact from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::artifact(path, format!("cannot read file: {}", e)))?;
        Self::from_json_str(path, &content)
    }

    /// Pretty JSON rendering of the artifact
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Persist the artifact. The file is written next to its destination and
    /// renamed into place, so readers never observe a truncated artifact.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = tmp_path(path);
        std::fs::write(&tmp, json.as_bytes())?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Timestamp of the first sample, if any
    pub fn first_timestamp(&self) -> Option<f64> {
        self.metrics.first().map(|s| s.timestamp)
    }

    /// Median spacing between consecutive samples in seconds
    pub fn sample_cadence(&self) -> Option<f64> {
        let mut gaps: Vec<f64> = self
            .metrics
            .windows(2)
            .map(|w| w[1].timestamp - w[0].timestamp)
            .filter(|gap| *gap > 0.0)
            .collect();
        if gaps.is_empty() {
            return None;
        }
        gaps.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Some(gaps[gaps.len() / 2])
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
