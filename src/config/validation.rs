//! Configuration validation utilities and rules

use crate::{
    defaults,
    error::Result,
    models::{Config, TestConfig},
};
use std::collections::HashSet;

/// Configuration validator with advisory rules on top of the hard checks
pub struct ConfigValidator;

impl ConfigValidator {
    /// Run the hard checks, then collect advisory warnings
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();

        config.validate()?;

        warnings.extend(Self::validate_api_url(&config.test));
        warnings.extend(Self::validate_sources(&config.test));
        warnings.extend(Self::validate_timing(&config.test));
        warnings.extend(Self::validate_load_settings(&config.test));

        Ok(warnings)
    }

    fn validate_api_url(test: &TestConfig) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if let Ok(parsed) = url::Url::parse(&test.api_base_url) {
            if parsed.path() != "/" && !parsed.path().is_empty() {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!(
                        "API base URL '{}' has a path; requests go to {}{}",
                        test.api_base_url,
                        test.api_base_url.trim_end_matches('/'),
                        defaults::API_PREFIX
                    ),
                ));
            }

            match parsed.host() {
                Some(url::Host::Domain("localhost")) => {
                    warnings.push(ValidationWarning::new(
                        ValidationLevel::Info,
                        "Service runs on this host; profiler overhead is included in CPU samples".to_string(),
                    ));
                }
                Some(url::Host::Ipv4(ip)) if ip.is_loopback() => {
                    warnings.push(ValidationWarning::new(
                        ValidationLevel::Info,
                        "Service runs on this host; profiler overhead is included in CPU samples".to_string(),
                    ));
                }
                Some(_) => {
                    warnings.push(ValidationWarning::new(
                        ValidationLevel::Warning,
                        format!(
                            "Service at '{}' is remote; host samples describe this machine, not the service",
                            test.api_base_url
                        ),
                    ));
                }
                None => {}
            }
        }

        warnings
    }

    fn validate_sources(test: &TestConfig) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        for source in &test.rtsp_urls {
            match url::Url::parse(source) {
                Ok(parsed) => {
                    if !matches!(parsed.scheme(), "rtsp" | "rtsps" | "http" | "https" | "file") {
                        warnings.push(ValidationWarning::new(
                            ValidationLevel::Warning,
                            format!("Source '{}' uses unusual scheme '{}'", source, parsed.scheme()),
                        ));
                    }
                }
                Err(e) => {
                    warnings.push(ValidationWarning::new(
                        ValidationLevel::Warning,
                        format!("Source '{}' is not a valid URL: {}", source, e),
                    ));
                }
            }
        }

        let distinct: HashSet<&String> = test.rtsp_urls.iter().collect();
        if distinct.len() < test.rtsp_urls.len() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "{} channels share {} distinct sources",
                    test.rtsp_urls.len(),
                    distinct.len()
                ),
            ));
        }

        warnings
    }

    fn validate_timing(test: &TestConfig) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        let last_start = test.channel_start_delay * (test.channel_count.saturating_sub(1)) as f64;
        if test.channel_count > 1 && last_start >= test.test_duration {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Last channel would start at {:.1}s but the test ends at {:.1}s; some channels will never run",
                    last_start, test.test_duration
                ),
            ));
        }

        if test.monitor_interval > test.test_duration / 2.0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Monitor interval of {}s yields fewer than 3 samples in a {}s test",
                    test.monitor_interval, test.test_duration
                ),
            ));
        }

        if test.request_timeout > test.test_duration {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Request timeout of {}s exceeds the test duration of {}s",
                    test.request_timeout, test.test_duration
                ),
            ));
        }

        warnings
    }

    fn validate_load_settings(test: &TestConfig) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if test.fps > 30 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("{} fps per channel is above typical camera rates", test.fps),
            ));
        }

        if test.channel_count > 16 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("{} channels will put significant load on the service", test.channel_count),
            ));
        }

        warnings
    }
}

/// Validation warning levels
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    /// Get display string for level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    /// Create a new validation warning
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        if use_color {
            use colored::Colorize;
            let label = match self.level {
                ValidationLevel::Info => self.level.as_str().blue(),
                ValidationLevel::Warning => self.level.as_str().yellow(),
                ValidationLevel::Error => self.level.as_str().red(),
            };
            format!("[{}] {}", label.bold(), self.message)
        } else {
            format!("[{}] {}", self.level.as_str(), self.message)
        }
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
