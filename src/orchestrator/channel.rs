//! One logical decode channel

use crate::models::{ChannelReport, ErrorRecord};
use crate::types::{ChannelEvent, ChannelState};
use chrono::{DateTime, Utc};

/// Mutable record of one channel, owned by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: String,
    pub source_url: String,
    pub state: ChannelState,
    pub started_at: Option<DateTime<Utc>>,
    /// Highest frame count the service has reported
    pub frame_count: u64,
    pub errors: Vec<String>,
}

impl Channel {
    pub fn new(id: &str, source_url: &str) -> Self {
        Self {
            id: id.to_string(),
            source_url: source_url.to_string(),
            state: ChannelState::Pending,
            started_at: None,
            frame_count: 0,
            errors: Vec::new(),
        }
    }

    /// Apply an event; returns `(from, to)` when the transition is legal
    pub fn apply(&mut self, event: ChannelEvent) -> Option<(ChannelState, ChannelState)> {
        let from = self.state;
        let to = from.next(event)?;
        self.state = to;
        if event == ChannelEvent::Acknowledged {
            self.started_at = Some(Utc::now());
        }
        Some((from, to))
    }

    /// Keep the highest count seen; the service may restart its counter
    pub fn observe_frames(&mut self, frame_count: u64) {
        self.frame_count = self.frame_count.max(frame_count);
    }

    pub fn push_error(&mut self, record: &ErrorRecord) {
        self.errors.push(record.to_string());
    }

    pub fn report(&self) -> ChannelReport {
        ChannelReport {
            channel_id: self.id.clone(),
            source_url: self.source_url.clone(),
            state: self.state,
            started_at: self.started_at,
            frame_count: self.frame_count,
            errors: self.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorOperation;

    #[test]
    fn test_lifecycle_happy_path() {
        let mut channel = Channel::new("camera_001", "rtsp://cam/1");
        assert_eq!(channel.state, ChannelState::Pending);

        assert_eq!(
            channel.apply(ChannelEvent::BeginStart),
            Some((ChannelState::Pending, ChannelState::Starting))
        );
        assert!(channel.started_at.is_none());
        channel.apply(ChannelEvent::Acknowledged);
        assert!(channel.started_at.is_some());
        channel.apply(ChannelEvent::BeginStop);
        channel.apply(ChannelEvent::StopFinished);
        assert_eq!(channel.state, ChannelState::Stopped);
    }

    #[test]
    fn test_illegal_event_is_noop() {
        let mut channel = Channel::new("camera_001", "rtsp://cam/1");
        assert_eq!(channel.apply(ChannelEvent::Acknowledged), None);
        assert_eq!(channel.state, ChannelState::Pending);

        channel.apply(ChannelEvent::Cancel);
        assert_eq!(channel.apply(ChannelEvent::BeginStart), None);
        assert_eq!(channel.state, ChannelState::Stopped);
    }

    #[test]
    fn test_frames_and_report() {
        let mut channel = Channel::new("camera_004", "rtsp://cam/4");
        channel.observe_frames(30);
        channel.observe_frames(12);
        assert_eq!(channel.frame_count, 30);

        let record = ErrorRecord::new("camera_004", ErrorOperation::Stop, "HTTP 500");
        channel.push_error(&record);

        let report = channel.report();
        assert_eq!(report.channel_id, "camera_004");
        assert_eq!(report.frame_count, 30);
        assert_eq!(report.errors, vec![record.to_string()]);
    }
}
