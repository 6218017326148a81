//! Type definitions shared across the profiler

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Hardware acceleration mode requested from the video pipeline service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    /// Let the service pick (no `force_format` is sent)
    #[default]
    Auto,
    /// Rockchip media process platform decoder
    Rkmpp,
    /// Video4Linux2 memory-to-memory decoder
    V4l2,
    /// Rockchip 2D raster graphic acceleration
    Rga,
    /// Software decoding
    None,
}

impl HwAccel {
    /// All supported modes in display order
    pub const ALL: [HwAccel; 5] = [
        HwAccel::Auto,
        HwAccel::Rkmpp,
        HwAccel::V4l2,
        HwAccel::Rga,
        HwAccel::None,
    ];

    /// Wire name of this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            HwAccel::Auto => "auto",
            HwAccel::Rkmpp => "rkmpp",
            HwAccel::V4l2 => "v4l2",
            HwAccel::Rga => "rga",
            HwAccel::None => "none",
        }
    }

    /// Value for the service's `force_format` field; `auto` sends nothing
    pub fn force_format(&self) -> Option<&'static str> {
        match self {
            HwAccel::Auto => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for HwAccel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HwAccel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(HwAccel::Auto),
            "rkmpp" => Ok(HwAccel::Rkmpp),
            "v4l2" => Ok(HwAccel::V4l2),
            "rga" => Ok(HwAccel::Rga),
            "none" => Ok(HwAccel::None),
            other => Err(AppError::parse(format!(
                "Invalid hardware acceleration mode '{}' (expected auto, rkmpp, v4l2, rga or none)",
                other
            ))),
        }
    }
}

/// Older artifacts store `null` when no mode was forced
pub(crate) fn deserialize_hw_accel<'de, D>(deserializer: D) -> std::result::Result<HwAccel, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HwAccel>::deserialize(deserializer)?.unwrap_or_default())
}

/// Lifecycle state of one logical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Waiting for its stagger offset
    Pending,
    /// Start request in flight
    Starting,
    /// Service acknowledged the start
    Active,
    /// Stop request in flight
    Stopping,
    /// Terminal: stopped or never started
    Stopped,
    /// Terminal: start failed or the service reported a fault
    Failed,
}

/// Events that drive [`ChannelState`] transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    BeginStart,
    Acknowledged,
    StartFailed,
    Faulted,
    BeginStop,
    StopFinished,
    Cancel,
}

impl ChannelState {
    /// Transition table. `None` marks an illegal transition, which callers treat as a no-op.
    pub fn next(self, event: ChannelEvent) -> Option<ChannelState> {
        use ChannelEvent::*;
        use ChannelState::*;

        match (self, event) {
            (Pending, BeginStart) => Some(Starting),
            (Pending, Cancel) => Some(Stopped),
            (Starting, Acknowledged) => Some(Active),
            (Starting, StartFailed) => Some(Failed),
            (Starting, BeginStop) => Some(Stopping),
            (Active, BeginStop) => Some(Stopping),
            (Active, Faulted) => Some(Failed),
            (Stopping, StopFinished) => Some(Stopped),
            _ => None,
        }
    }

    /// Stopped and Failed channels never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Stopped | ChannelState::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ChannelState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Pending => "pending",
            ChannelState::Starting => "starting",
            ChannelState::Active => "active",
            ChannelState::Stopping => "stopping",
            ChannelState::Stopped => "stopped",
            ChannelState::Failed => "failed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a profiling run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// The configured duration elapsed
    Completed,
    /// The operator interrupted the run
    Cancelled,
}
