//! Builds the final test result from collected telemetry

use crate::models::{ChannelReport, ErrorRecord, MetricSample, Summary, TestConfig, TestResult};
use crate::store::StoreSnapshot;
use chrono::{DateTime, Utc};

/// Wall-clock boundaries of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RunWindow {
    /// An end before the start (clock step) collapses to the start
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }
}

/// Merge samples, channel reports and errors into one result.
///
/// Empty sample sequences produce zeroed maxima and averages.
pub fn finalize(
    config: &TestConfig,
    mut samples: Vec<MetricSample>,
    channels: Vec<ChannelReport>,
    errors: &[ErrorRecord],
    window: RunWindow,
) -> TestResult {
    samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
    let count = samples.len();

    let max_cpu_percent = samples.iter().map(|s| s.cpu_percent).fold(0.0, f64::max);
    let max_memory_mb = samples.iter().map(|s| s.memory_mb).fold(0.0, f64::max);
    let max_channels = samples
        .iter()
        .map(|s| s.active_channels)
        .max()
        .unwrap_or(0)
        .min(config.channel_count);
    let total_frames = samples.iter().map(|s| s.total_frames).max().unwrap_or(0);

    let (avg_cpu_percent, avg_memory_mb) = if count == 0 {
        (0.0, 0.0)
    } else {
        let n = count as f64;
        (
            samples.iter().map(|s| s.cpu_percent).sum::<f64>() / n,
            samples.iter().map(|s| s.memory_mb).sum::<f64>() / n,
        )
    };

    TestResult {
        test_config: config.clone(),
        summary: Summary {
            total_metrics: count,
            test_start: window.start,
            test_end: window.end,
            max_channels,
            max_cpu_percent,
            max_memory_mb,
            total_frames,
            total_errors: errors.len(),
            avg_cpu_percent,
            avg_memory_mb,
            missed_ticks: 0,
        },
        metrics: samples,
        errors,
        channels,
    }
}

/// [`finalize`] over everything a store collected, including its gap count
pub fn finalize_snapshot(
    config: &TestConfig,
    snapshot: StoreSnapshot,
    channels: Vec<ChannelReport>,
    window: RunWindow,
) -> TestResult {
    let mut result = finalize(config, snapshot.samples, channels, &snapshot.errors, window);
    result.summary.missed_ticks = snapshot.missed_ticks;
    result
}
