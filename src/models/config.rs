//! Configuration data model and validation

use crate::defaults;
use crate::types::{deserialize_hw_accel, AppError, HwAccel, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of one profiling run. Persisted verbatim as the artifact's `test_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Base URL of the video pipeline service
    pub api_base_url: String,

    /// Source locator per channel, index-aligned with channel ids
    pub rtsp_urls: Vec<String>,

    /// Number of logical channels. Older artifacts omit it; see
    /// [`TestConfig::infer_channel_count`].
    #[serde(default)]
    pub channel_count: usize,

    /// Run duration in seconds
    pub test_duration: f64,

    /// Stagger between consecutive channel starts, in seconds
    pub channel_start_delay: f64,

    /// Requested decode frame rate
    pub fps: u32,

    /// Hardware acceleration mode passed to the service
    #[serde(default, deserialize_with = "deserialize_hw_accel")]
    pub hardware_accel: HwAccel,

    /// Where the result artifact is written
    pub output_file: String,

    /// Sampling cadence in seconds
    pub monitor_interval: f64,

    /// Upper bound for every call to the service, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    /// Upper bound for stopping all channels, in seconds
    #[serde(default = "default_stop_grace_period")]
    pub stop_grace_period: f64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            api_base_url: defaults::DEFAULT_API_BASE_URL.to_string(),
            rtsp_urls: generate_sources(defaults::DEFAULT_CHANNELS),
            channel_count: defaults::DEFAULT_CHANNELS,
            test_duration: defaults::DEFAULT_TEST_DURATION_SECS,
            channel_start_delay: defaults::DEFAULT_START_DELAY_SECS,
            fps: defaults::DEFAULT_FPS,
            hardware_accel: HwAccel::Auto,
            output_file: defaults::DEFAULT_OUTPUT_FILE.to_string(),
            monitor_interval: defaults::DEFAULT_MONITOR_INTERVAL_SECS,
            request_timeout: default_request_timeout(),
            stop_grace_period: default_stop_grace_period(),
        }
    }
}

impl TestConfig {
    /// Identifier of the channel at `index` (`camera_001` for index 0)
    pub fn channel_id(index: usize) -> String {
        format!("camera_{:03}", index + 1)
    }

    /// All channel ids in start order
    pub fn channel_ids(&self) -> Vec<String> {
        (0..self.channel_count).map(Self::channel_id).collect()
    }

    pub fn duration(&self) -> Duration {
        secs_to_duration(self.test_duration)
    }

    pub fn start_delay(&self) -> Duration {
        secs_to_duration(self.channel_start_delay)
    }

    /// Sampling period, never shorter than the minimum monitor interval
    pub fn monitor_period(&self) -> Duration {
        secs_to_duration(self.monitor_interval.max(defaults::MIN_MONITOR_INTERVAL_SECS))
    }

    pub fn request_timeout(&self) -> Duration {
        secs_to_duration(self.request_timeout)
    }

    pub fn stop_grace_period(&self) -> Duration {
        secs_to_duration(self.stop_grace_period)
    }

    /// Service endpoint root, e.g. `http://localhost:8002/api/v1/video-pipeline`
    pub fn api_root(&self) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), defaults::API_PREFIX)
    }

    /// Fill a missing channel count from the source list, one channel per URL
    pub fn infer_channel_count(&mut self) {
        if self.channel_count == 0 {
            self.channel_count = self.rtsp_urls.len();
        }
    }

    /// Make `rtsp_urls` hold exactly one locator per channel.
    ///
    /// An explicit list is cycled (or truncated) to `channel_count`; an empty
    /// list is filled from the default sample streams.
    pub fn normalize_sources(&mut self) {
        if self.rtsp_urls.is_empty() {
            self.rtsp_urls = generate_sources(self.channel_count);
            return;
        }

        self.rtsp_urls = self
            .rtsp_urls
            .iter()
            .cycle()
            .take(self.channel_count)
            .cloned()
            .collect();
    }

    /// Validate the configuration and return the first hard error
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(AppError::config("API base URL cannot be empty"));
        }

        match url::Url::parse(&self.api_base_url) {
            Ok(parsed) => {
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(AppError::config(format!(
                        "API base URL must use http or https: {}",
                        self.api_base_url
                    )));
                }
            }
            Err(e) => {
                return Err(AppError::config(format!(
                    "Invalid API base URL '{}': {}",
                    self.api_base_url, e
                )));
            }
        }

        if self.channel_count == 0 {
            return Err(AppError::config("Channel count must be greater than 0"));
        }

        if self.channel_count > defaults::MAX_CHANNELS {
            return Err(AppError::config(format!(
                "Channel count cannot exceed {}",
                defaults::MAX_CHANNELS
            )));
        }

        if self.rtsp_urls.len() != self.channel_count {
            return Err(AppError::config(format!(
                "Expected {} source URLs (one per channel), got {}",
                self.channel_count,
                self.rtsp_urls.len()
            )));
        }

        for source in &self.rtsp_urls {
            if source.trim().is_empty() {
                return Err(AppError::config("Source URL cannot be empty"));
            }
        }

        if !self.test_duration.is_finite() || self.test_duration <= 0.0 {
            return Err(AppError::config("Test duration must be greater than 0"));
        }

        if self.test_duration > 86_400.0 {
            return Err(AppError::config("Test duration cannot exceed 24 hours"));
        }

        if !self.channel_start_delay.is_finite() || self.channel_start_delay < 0.0 {
            return Err(AppError::config("Channel start delay cannot be negative"));
        }

        if self.fps == 0 || self.fps > 60 {
            return Err(AppError::config("FPS must be between 1 and 60"));
        }

        if !self.monitor_interval.is_finite()
            || self.monitor_interval < defaults::MIN_MONITOR_INTERVAL_SECS
        {
            return Err(AppError::config(format!(
                "Monitor interval must be at least {} seconds",
                defaults::MIN_MONITOR_INTERVAL_SECS
            )));
        }

        if !self.request_timeout.is_finite() || self.request_timeout <= 0.0 {
            return Err(AppError::config("Request timeout must be greater than 0"));
        }

        if !self.stop_grace_period.is_finite() || self.stop_grace_period <= 0.0 {
            return Err(AppError::config("Stop grace period must be greater than 0"));
        }

        if self.output_file.trim().is_empty() {
            return Err(AppError::config("Output file cannot be empty"));
        }

        Ok(())
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Parameters of the profiling run
    #[serde(default)]
    pub test: TestConfig,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            test: TestConfig::default(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        self.test.validate()
    }

    /// Merge process environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_vars(|key| std::env::var(key).ok())
    }

    /// Merge variables from an arbitrary lookup into this configuration
    pub fn merge_from_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base_url) = lookup("API_BASE_URL") {
            self.test.api_base_url = api_base_url.trim().to_string();
        }

        if let Some(channels) = lookup("CHANNELS") {
            self.test.channel_count = parse_var("CHANNELS", &channels)?;
        }

        if let Some(duration) = lookup("TEST_DURATION") {
            self.test.test_duration = parse_var("TEST_DURATION", &duration)?;
        }

        if let Some(delay) = lookup("START_DELAY") {
            self.test.channel_start_delay = parse_var("START_DELAY", &delay)?;
        }

        if let Some(fps) = lookup("FPS") {
            self.test.fps = parse_var("FPS", &fps)?;
        }

        if let Some(hw_accel) = lookup("HW_ACCEL") {
            self.test.hardware_accel = hw_accel
                .parse()
                .map_err(|e| AppError::config(format!("Invalid HW_ACCEL value '{}': {}", hw_accel, e)))?;
        }

        if let Some(interval) = lookup("MONITOR_INTERVAL") {
            self.test.monitor_interval = parse_var("MONITOR_INTERVAL", &interval)?;
        }

        if let Some(output_file) = lookup("OUTPUT_FILE") {
            self.test.output_file = output_file.trim().to_string();
        }

        if let Some(rtsp_urls) = lookup("RTSP_URLS") {
            self.test.rtsp_urls = split_list(&rtsp_urls);
        }

        if let Some(timeout) = lookup("REQUEST_TIMEOUT") {
            self.test.request_timeout = parse_var("REQUEST_TIMEOUT", &timeout)?;
        }

        if let Some(enable_color) = lookup("ENABLE_COLOR") {
            self.enable_color = parse_var("ENABLE_COLOR", &enable_color)?;
        }

        Ok(())
    }
}

/// Split a comma separated list, dropping blanks
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", name, value, e)))
}

/// Default sample streams cycled to `count` entries
fn generate_sources(count: usize) -> Vec<String> {
    defaults::DEFAULT_SAMPLE_STREAMS
        .iter()
        .cycle()
        .take(count)
        .map(|&s| s.to_string())
        .collect()
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

// Default value functions for serde
fn default_request_timeout() -> f64 {
    defaults::DEFAULT_REQUEST_TIMEOUT.as_secs_f64()
}

fn default_stop_grace_period() -> f64 {
    defaults::DEFAULT_STOP_GRACE_PERIOD.as_secs_f64()
}

fn default_enable_color() -> bool {
    defaults::DEFAULT_ENABLE_COLOR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.test.rtsp_urls.len(), config.test.channel_count);
    }

    #[test]
    fn test_channel_ids_are_zero_padded() {
        let config = TestConfig {
            channel_count: 3,
            rtsp_urls: generate_sources(3),
            ..TestConfig::default()
        };
        assert_eq!(config.channel_ids(), vec!["camera_001", "camera_002", "camera_003"]);
        assert_eq!(TestConfig::channel_id(99), "camera_100");
    }

    #[test]
    fn test_normalize_cycles_explicit_sources() {
        let mut config = TestConfig {
            channel_count: 5,
            rtsp_urls: vec!["rtsp://a/1".to_string(), "rtsp://b/2".to_string()],
            ..TestConfig::default()
        };
        config.normalize_sources();
        assert_eq!(
            config.rtsp_urls,
            vec!["rtsp://a/1", "rtsp://b/2", "rtsp://a/1", "rtsp://b/2", "rtsp://a/1"]
        );
    }

    #[test]
    fn test_normalize_truncates_and_generates() {
        let mut config = TestConfig {
            channel_count: 1,
            rtsp_urls: vec!["rtsp://a/1".to_string(), "rtsp://b/2".to_string()],
            ..TestConfig::default()
        };
        config.normalize_sources();
        assert_eq!(config.rtsp_urls, vec!["rtsp://a/1"]);

        config.channel_count = 12;
        config.rtsp_urls.clear();
        config.normalize_sources();
        assert_eq!(config.rtsp_urls.len(), 12);
        assert_eq!(config.rtsp_urls[10], defaults::DEFAULT_SAMPLE_STREAMS[0]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = TestConfig::default();

        let cases: Vec<fn(&mut TestConfig)> = vec![
            |c: &mut TestConfig| c.api_base_url = "ftp://host".to_string(),
            |c: &mut TestConfig| c.api_base_url = "not a url".to_string(),
            |c: &mut TestConfig| c.channel_count = 0,
            |c: &mut TestConfig| c.channel_count = 300,
            |c: &mut TestConfig| {
                c.rtsp_urls.pop();
            },
            |c: &mut TestConfig| c.test_duration = 0.0,
            |c: &mut TestConfig| c.channel_start_delay = -1.0,
            |c: &mut TestConfig| c.fps = 0,
            |c: &mut TestConfig| c.monitor_interval = 0.01,
            |c: &mut TestConfig| c.request_timeout = 0.0,
            |c: &mut TestConfig| c.output_file = String::new(),
        ];

        for mutate in cases {
            let mut config = base.clone();
            mutate(&mut config);
            assert!(config.validate().is_err(), "accepted {:?}", config);
        }
    }

    #[test]
    fn test_api_root_strips_trailing_slash() {
        let config = TestConfig {
            api_base_url: "http://box:8002/".to_string(),
            ..TestConfig::default()
        };
        assert_eq!(config.api_root(), "http://box:8002/api/v1/video-pipeline");
    }

    #[test]
    fn test_merge_from_vars() {
        let mut config = Config::default();
        config
            .merge_from_vars(lookup(&[
                ("API_BASE_URL", "http://10.0.0.5:9000"),
                ("CHANNELS", "8"),
                ("TEST_DURATION", "120"),
                ("START_DELAY", "0.5"),
                ("FPS", "5"),
                ("HW_ACCEL", "rkmpp"),
                ("RTSP_URLS", "rtsp://x/1, rtsp://x/2,"),
                ("ENABLE_COLOR", "false"),
            ]))
            .unwrap();

        assert_eq!(config.test.api_base_url, "http://10.0.0.5:9000");
        assert_eq!(config.test.channel_count, 8);
        assert_eq!(config.test.test_duration, 120.0);
        assert_eq!(config.test.channel_start_delay, 0.5);
        assert_eq!(config.test.fps, 5);
        assert_eq!(config.test.hardware_accel, HwAccel::Rkmpp);
        assert_eq!(config.test.rtsp_urls, vec!["rtsp://x/1", "rtsp://x/2"]);
        assert!(!config.enable_color);
    }

    #[test]
    fn test_merge_from_vars_rejects_bad_numbers() {
        let mut config = Config::default();
        let err = config
            .merge_from_vars(lookup(&[("CHANNELS", "many")]))
            .unwrap_err();
        assert_eq!(err.category(), "CONFIG");
        assert!(err.to_string().contains("CHANNELS"));
    }

    #[test]
    fn test_null_hardware_accel_loads_as_auto() {
        let json = r#"{
            "api_base_url": "http://localhost:8002",
            "rtsp_urls": ["rtsp://a/1"],
            "channel_count": 1,
            "test_duration": 10,
            "channel_start_delay": 1.0,
            "fps": 1,
            "hardware_accel": null,
            "output_file": "out.json",
            "monitor_interval": 1.0
        }"#;
        let config: TestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.hardware_accel, HwAccel::Auto);
        assert_eq!(config.request_timeout, 30.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_channel_count_follows_sources() {
        let json = r#"{
            "api_base_url": "http://localhost:8002",
            "rtsp_urls": ["rtsp://a/1", "rtsp://a/2", "rtsp://a/3"],
            "test_duration": 60,
            "channel_start_delay": 2.0,
            "fps": 1,
            "hardware_accel": "rkmpp",
            "output_file": "profiling_results.json",
            "monitor_interval": 1.0
        }"#;
        let mut config: TestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.channel_count, 0);

        config.infer_channel_count();
        assert_eq!(config.channel_count, 3);
        assert!(config.validate().is_ok());

        // an explicit count is kept
        let mut explicit = TestConfig::default();
        let expected = explicit.channel_count;
        explicit.infer_channel_count();
        assert_eq!(explicit.channel_count, expected);
    }

    #[test]
    fn test_unknown_config_field_rejected() {
        let mut value = serde_json::to_value(TestConfig::default()).unwrap();
        value["chanel_count"] = serde_json::json!(4);
        let err = serde_json::from_value::<TestConfig>(value).unwrap_err();
        assert!(err.to_string().contains("chanel_count"));
    }
}
