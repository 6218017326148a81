//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::types::HwAccel;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file from the current directory if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    /// Load a specific env file if it exists. Variables already set in the
    /// process environment take precedence over the file.
    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;

            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No {} file found, using defaults and CLI arguments", path.display());
        }

        Ok(())
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "API_BASE_URL" => {
                let parsed = url::Url::parse(value)
                    .map_err(|e| AppError::config(format!("Invalid API_BASE_URL '{}': {}", value, e)))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(AppError::config(format!("API_BASE_URL must use http or https: {}", value)));
                }
            }
            "CHANNELS" => {
                let channels: usize = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid CHANNELS value '{}': {}", value, e)))?;
                if channels == 0 || channels > crate::defaults::MAX_CHANNELS {
                    return Err(AppError::config(format!(
                        "CHANNELS must be between 1 and {}, got: {}",
                        crate::defaults::MAX_CHANNELS,
                        channels
                    )));
                }
            }
            "TEST_DURATION" | "MONITOR_INTERVAL" | "REQUEST_TIMEOUT" => {
                let secs: f64 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(AppError::config(format!("{} must be greater than 0, got: {}", key, value)));
                }
            }
            "START_DELAY" => {
                let secs: f64 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid START_DELAY value '{}': {}", value, e)))?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(AppError::config(format!("START_DELAY cannot be negative, got: {}", value)));
                }
            }
            "FPS" => {
                let fps: u32 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid FPS value '{}': {}", value, e)))?;
                if fps == 0 || fps > 60 {
                    return Err(AppError::config(format!("FPS must be between 1 and 60, got: {}", fps)));
                }
            }
            "HW_ACCEL" => {
                value.parse::<HwAccel>()?;
            }
            "RTSP_URLS" => {
                for source in value.split(',') {
                    let source = source.trim();
                    if !source.is_empty() {
                        url::Url::parse(source)
                            .map_err(|e| AppError::config(format!("Invalid RTSP_URLS entry '{}': {}", source, e)))?;
                    }
                }
            }
            "OUTPUT_FILE" => {
                if value.is_empty() {
                    return Err(AppError::config("OUTPUT_FILE cannot be empty"));
                }
            }
            "ENABLE_COLOR" => {
                value
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", value, e)))?;
            }
            _ => {
                // Unknown environment variable, ignore
            }
        }

        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("API_BASE_URL", "Base URL of the video pipeline service", "http://localhost:8002"),
            ("CHANNELS", "Number of concurrent channels (1-256)", "5"),
            ("TEST_DURATION", "Test duration in seconds", "60"),
            ("START_DELAY", "Delay between channel starts in seconds", "2.0"),
            ("FPS", "Decode frame rate per channel (1-60)", "1"),
            ("HW_ACCEL", "Hardware acceleration (auto, rkmpp, v4l2, rga, none)", "auto"),
            ("MONITOR_INTERVAL", "Sampling interval in seconds", "1.0"),
            ("OUTPUT_FILE", "Result artifact path", "profiling_results.json"),
            ("RTSP_URLS", "Comma-separated stream sources, cycled across channels", "rtsp://cam/1,rtsp://cam/2"),
            ("REQUEST_TIMEOUT", "Per-request timeout in seconds", "30"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<18} {}\n", var, description));
            help.push_str(&format!("  {:<18} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Check an env file and return one warning per invalid line, or `None` if it does not exist
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut warnings = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"');
                if let Err(e) = Self::validate_env_var(key.trim(), value) {
                    warnings.push(format!("Line '{}': {}", line, e));
                }
            }
        }

        Ok(Some(warnings))
    }
}
