//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::{Cli, Command, HealthArgs, RunArgs},
    config::env::EnvManager,
    error::Result,
    models::Config,
};

/// Configuration parser that layers defaults, `.env`, environment variables and CLI arguments
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration from the process environment
    pub fn parse(&self) -> Result<Config> {
        EnvManager::load_env_file(self.cli.debug)?;
        self.parse_with(|key| std::env::var(key).ok())
    }

    /// Build the configuration using `lookup` in place of the process environment
    pub fn parse_with<F>(&self, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        // Sources are generated for the final channel count unless given explicitly
        config.test.rtsp_urls.clear();

        config.merge_from_vars(lookup)?;
        self.apply_cli_overrides(&mut config);
        config.test.normalize_sources();

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) {
        if self.cli.no_color {
            config.enable_color = false;
        } else if self.cli.color {
            config.enable_color = true;
        } else if config.enable_color {
            config.enable_color = self.cli.use_colors();
        }

        // CLI-only flags
        config.verbose = self.cli.verbose;
        config.debug = self.cli.debug;

        match &self.cli.command {
            Command::Run(args) => apply_run_args(config, args),
            Command::Health(args) => apply_health_args(config, args),
            Command::Analyze(_) | Command::Compare(_) => {}
        }

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
            eprintln!("{}", display_config_summary(config));
        }
    }
}

fn apply_run_args(config: &mut Config, args: &RunArgs) {
    let test = &mut config.test;

    if let Some(ref api_url) = args.api_url {
        test.api_base_url = api_url.clone();
    }
    if let Some(channels) = args.channels {
        test.channel_count = channels;
    }
    if let Some(duration) = args.duration {
        test.test_duration = duration;
    }
    if let Some(delay) = args.start_delay {
        test.channel_start_delay = delay;
    }
    if let Some(fps) = args.fps {
        test.fps = fps;
    }
    if let Some(hw_accel) = args.hw_accel {
        test.hardware_accel = hw_accel;
    }
    if let Some(ref output) = args.output {
        test.output_file = output.clone();
    }
    if let Some(interval) = args.monitor_interval {
        test.monitor_interval = interval;
    }
    if !args.rtsp_urls.is_empty() {
        test.rtsp_urls = args.rtsp_urls.clone();
    }
    if let Some(timeout) = args.request_timeout {
        test.request_timeout = timeout;
    }
    if let Some(grace) = args.stop_grace {
        test.stop_grace_period = grace;
    }
}

fn apply_health_args(config: &mut Config, args: &HealthArgs) {
    if let Some(ref api_url) = args.api_url {
        config.test.api_base_url = api_url.clone();
    }
    if let Some(timeout) = args.request_timeout {
        config.test.request_timeout = timeout;
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let test = &config.test;
    let mut summary = Vec::new();

    summary.push(format!("API Base URL: {}", test.api_base_url));
    summary.push(format!("Channels: {}", test.channel_count));
    summary.push(format!("Test Duration: {}s", test.test_duration));
    summary.push(format!("Start Delay: {}s", test.channel_start_delay));
    summary.push(format!("FPS: {}", test.fps));
    summary.push(format!("Hardware Accel: {}", test.hardware_accel));
    summary.push(format!("Monitor Interval: {}s", test.monitor_interval));
    summary.push(format!("Request Timeout: {}s", test.request_timeout));
    summary.push(format!("Output File: {}", test.output_file));
    summary.push(format!("Sources: {}", test.rtsp_urls.join(", ")));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}
