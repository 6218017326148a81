//! Shared telemetry store
//!
//! Holds the time-ordered sample log, the error log and the channel view the
//! monitor samples from. Every operation takes the single lock once, so a
//! sample's active count, frame total and new errors are mutually consistent.

use crate::error::{AppError, Result};
use crate::models::{ErrorRecord, MetricSample};
use crate::monitor::HostReading;
use crate::types::ChannelState;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Published state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelView {
    pub state: ChannelState,
    /// Cumulative decoded frames, never decreasing
    pub frames: u64,
}

/// Everything the store collected, for aggregation
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub samples: Vec<MetricSample>,
    pub errors: Vec<ErrorRecord>,
    pub missed_ticks: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    samples: Vec<MetricSample>,
    errors: Vec<ErrorRecord>,
    /// Index of the first error not yet attached to a sample
    error_cursor: usize,
    channels: BTreeMap<String, ChannelView>,
    missed_ticks: u64,
}

impl StoreInner {
    fn active_count(&self) -> usize {
        self.channels.values().filter(|c| c.state.is_active()).count()
    }

    fn total_frames(&self) -> u64 {
        self.channels.values().map(|c| c.frames).sum()
    }
}

/// Append-only telemetry log shared by the monitor and the orchestrator
#[derive(Debug, Default)]
pub struct TelemetryStore {
    inner: RwLock<StoreInner>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error to the shared log
    pub async fn record_error(&self, record: ErrorRecord) {
        self.inner.write().await.errors.push(record);
    }

    /// Publish a channel's state and frame count. Frame counts only move forward.
    pub async fn publish_channel(&self, channel_id: &str, state: ChannelState, frames: u64) {
        let mut inner = self.inner.write().await;
        let view = inner
            .channels
            .entry(channel_id.to_string())
            .or_insert(ChannelView { state, frames: 0 });
        view.state = state;
        view.frames = view.frames.max(frames);
    }

    /// Build and append one sample from a host reading.
    ///
    /// Timestamps are clamped so the log stays non-decreasing even if the
    /// wall clock steps backwards. A non-finite reading appends nothing and
    /// leaves pending errors for the next sample.
    pub async fn record_tick(&self, reading: HostReading, timestamp: f64) -> Result<MetricSample> {
        reading.check_finite()?;
        if !timestamp.is_finite() {
            return Err(AppError::sampling(format!("non-finite timestamp {}", timestamp)));
        }

        let mut inner = self.inner.write().await;

        let timestamp = match inner.samples.last() {
            Some(last) if last.timestamp > timestamp => last.timestamp,
            _ => timestamp,
        };

        let errors = inner.errors[inner.error_cursor..]
            .iter()
            .map(ToString::to_string)
            .collect();
        inner.error_cursor = inner.errors.len();

        let sample = MetricSample {
            timestamp,
            cpu_percent: reading.cpu_percent,
            memory_percent: reading.memory_percent,
            memory_mb: reading.memory_mb,
            active_channels: inner.active_count(),
            total_frames: inner.total_frames(),
            errors,
        };
        inner.samples.push(sample.clone());
        Ok(sample)
    }

    /// Count a monitor cycle that produced no sample; returns the running total
    pub async fn record_gap(&self) -> u64 {
        let mut inner = self.inner.write().await;
        inner.missed_ticks += 1;
        inner.missed_ticks
    }

    pub async fn samples(&self) -> Vec<MetricSample> {
        self.inner.read().await.samples.clone()
    }

    pub async fn errors(&self) -> Vec<ErrorRecord> {
        self.inner.read().await.errors.clone()
    }

    pub async fn active_count(&self) -> usize {
        self.inner.read().await.active_count()
    }

    pub async fn total_frames(&self) -> u64 {
        self.inner.read().await.total_frames()
    }

    pub async fn channel(&self, channel_id: &str) -> Option<ChannelView> {
        self.inner.read().await.channels.get(channel_id).copied()
    }

    pub async fn missed_ticks(&self) -> u64 {
        self.inner.read().await.missed_ticks
    }

    /// Copy of everything collected so far
    pub async fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().await;
        StoreSnapshot {
            samples: inner.samples.clone(),
            errors: inner.errors.clone(),
            missed_ticks: inner.missed_ticks,
        }
    }
}
