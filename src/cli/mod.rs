//! Command-line interface

use crate::types::HwAccel;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Video Pipeline Profiler - load-tests a video pipeline service with concurrent decode channels
#[derive(Parser, Debug, Clone)]
#[command(name = "vpprof")]
#[command(version = crate::VERSION, long_version = long_version_static(), about, long_about = None)]
pub struct Cli {
    /// Force colored output
    #[arg(long, global = true)]
    pub color: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Enable debug output (JSON logs)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a profiling test against the service and write a result artifact
    Run(RunArgs),
    /// Analyze one result artifact
    Analyze(AnalyzeArgs),
    /// Compare two or more result artifacts
    Compare(CompareArgs),
    /// Check that the service is reachable
    Health(HealthArgs),
}

/// Options for `vpprof run`. Unset options fall back to the environment, then defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Base URL of the video pipeline service
    #[arg(long = "api-url", value_name = "URL")]
    pub api_url: Option<String>,

    /// Number of concurrent channels
    #[arg(short = 'n', long)]
    pub channels: Option<usize>,

    /// Test duration in seconds
    #[arg(short = 'd', long, value_parser = parse_seconds)]
    pub duration: Option<f64>,

    /// Delay between channel starts in seconds
    #[arg(long, value_parser = parse_non_negative_seconds)]
    pub start_delay: Option<f64>,

    /// Decode frame rate requested per channel
    #[arg(long)]
    pub fps: Option<u32>,

    /// Hardware acceleration mode (auto, rkmpp, v4l2, rga, none)
    #[arg(long, value_parser = parse_hw_accel)]
    pub hw_accel: Option<HwAccel>,

    /// Result artifact path
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<String>,

    /// Sampling interval in seconds
    #[arg(long, value_parser = parse_seconds)]
    pub monitor_interval: Option<f64>,

    /// Stream source URL (repeatable; cycled across channels)
    #[arg(long = "rtsp-url", value_name = "URL", action = ArgAction::Append)]
    pub rtsp_urls: Vec<String>,

    /// Timeout for each service request in seconds
    #[arg(long, value_parser = parse_seconds)]
    pub request_timeout: Option<f64>,

    /// Upper bound for stopping all channels in seconds
    #[arg(long, value_parser = parse_seconds)]
    pub stop_grace: Option<f64>,

    /// Skip the service health check before starting
    #[arg(long)]
    pub skip_health_check: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Result artifact to analyze
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Do not write the Markdown report
    #[arg(long)]
    pub no_report: bool,

    /// Markdown report path (defaults to <artifact>_report.md)
    #[arg(long, value_name = "FILE", conflicts_with = "no_report")]
    pub report: Option<PathBuf>,

    /// Also export the analysis as JSON
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Result artifacts to compare
    #[arg(value_name = "FILE", required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Also export the comparison as JSON
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct HealthArgs {
    /// Base URL of the video pipeline service
    #[arg(long = "api-url", value_name = "URL")]
    pub api_url: Option<String>,

    /// Timeout for the health request in seconds
    #[arg(long, value_parser = parse_seconds)]
    pub request_timeout: Option<f64>,
}

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        if let Command::Run(run) = &self.command {
            if run.rtsp_urls.iter().any(|u| u.trim().is_empty()) {
                return Err("--rtsp-url cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }

    /// Short label of the selected subcommand
    pub fn command_name(&self) -> &'static str {
        match self.command {
            Command::Run(_) => "run",
            Command::Analyze(_) => "analyze",
            Command::Compare(_) => "compare",
            Command::Health(_) => "health",
        }
    }
}

fn long_version_static() -> &'static str {
    // clap wants a 'static str; computed once per process
    static LONG_VERSION: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    LONG_VERSION.get_or_init(crate::long_version).as_str()
}

/// Parse a strictly positive number of seconds
fn parse_seconds(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid duration: {}", s))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("Duration must be greater than 0".to_string());
    }
    Ok(secs)
}

fn parse_non_negative_seconds(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid duration: {}", s))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err("Duration cannot be negative".to_string());
    }
    Ok(secs)
}

fn parse_hw_accel(s: &str) -> Result<HwAccel, String> {
    s.parse::<HwAccel>().map_err(|e| e.to_string())
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    cfg!(unix)
}
