//! Colored formatter implementation with terminal color support
//!
//! This module provides a rich colored output formatter that uses
//! ANSI colors for enhanced visual presentation.

use super::formatter::{
    correlation_table, fmt_error, progress_text, sparkline_rows, stats_table, summary_rows, FormattingOptions,
    OutputFormatter, PlainFormatter,
};
use crate::{
    error::Result,
    models::{MetricSample, Summary, TestResult},
    stats::{AnalysisReport, ComparisonReport},
    types::ChannelState,
};
use colored::*;
use std::fmt::Write as _;

/// Load classification used to color utilization figures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl LoadLevel {
    /// Classify a utilization percentage
    pub fn from_percent(percent: f64) -> Self {
        if percent < 50.0 {
            Self::Low
        } else if percent < 75.0 {
            Self::Moderate
        } else if percent < 90.0 {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Low => Color::Green,
            Self::Moderate => Color::Cyan,
            Self::High => Color::Yellow,
            Self::Critical => Color::Red,
        }
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
        }
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    plain_formatter: PlainFormatter,
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    /// Create a new colored formatter with options
    pub fn new(options: FormattingOptions) -> Self {
        Self::with_color_scheme(options, ColorScheme::default())
    }

    /// Create a colored formatter with custom color scheme
    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        Self {
            plain_formatter: PlainFormatter::new(options.clone()),
            options,
            color_scheme,
        }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn section(&self, output: &mut String, title: &str) -> Result<()> {
        if self.options.enable_color {
            writeln!(output, "{}", title.bold().color(self.color_scheme.header)).map_err(fmt_error)
        } else {
            writeln!(output, "{}:", title).map_err(fmt_error)
        }
    }

    fn state_color(&self, state: ChannelState) -> Color {
        match state {
            ChannelState::Active | ChannelState::Stopped => self.color_scheme.success,
            ChannelState::Failed => self.color_scheme.error,
            ChannelState::Pending | ChannelState::Starting | ChannelState::Stopping => self.color_scheme.warning,
        }
    }

    fn summary_block(&self, output: &mut String, summary: &Summary, channels: usize) -> Result<()> {
        for (label, value) in summary_rows(summary, channels) {
            let color = match label {
                "Max CPU Usage" => Some(LoadLevel::from_percent(summary.max_cpu_percent).color()),
                "Avg CPU Usage" => Some(LoadLevel::from_percent(summary.avg_cpu_percent).color()),
                "Total Errors" if summary.total_errors > 0 => Some(self.color_scheme.error),
                "Missed Samples" if summary.missed_ticks > 0 => Some(self.color_scheme.warning),
                _ => None,
            };
            let label = format!("{:<22}", format!("{}:", label));
            let value = match color {
                Some(color) => self.colorize(&value, color).to_string(),
                None => value,
            };
            writeln!(output, "  {} {}", self.colorize(&label, self.color_scheme.muted), value).map_err(fmt_error)?;
        }
        Ok(())
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        if !self.options.enable_color {
            return self.plain_formatter.format_header(title);
        }

        let border = "═".repeat(title.chars().count() + 4);
        Ok(format!(
            "{}\n  {}  \n{}",
            border.color(self.color_scheme.header),
            title.bold(),
            border.color(self.color_scheme.header)
        ))
    }

    fn format_progress(&self, sample: &MetricSample, origin: f64) -> String {
        let mut line = progress_text(sample, origin);
        if self.options.enable_color {
            line = line
                .color(LoadLevel::from_percent(sample.cpu_percent).color())
                .to_string();
        }
        if !sample.errors.is_empty() {
            let note = format!(" | {} new error(s)", sample.errors.len());
            line.push_str(&self.colorize(&note, self.color_scheme.error).to_string());
        }
        line
    }

    fn format_run_summary(&self, result: &TestResult) -> Result<String> {
        let mut output = String::new();
        self.section(&mut output, "Test Summary")?;
        self.summary_block(&mut output, &result.summary, result.test_config.channel_count)?;

        if !result.channels.is_empty() {
            writeln!(output).map_err(fmt_error)?;
            self.section(&mut output, "Channels")?;
            for channel in &result.channels {
                let state = format!("{:<9}", channel.state.as_str());
                writeln!(
                    output,
                    "  {}  {}  {:>8} frames  {}",
                    channel.channel_id,
                    self.colorize(&state, self.state_color(channel.state)),
                    channel.frame_count,
                    self.colorize(&channel.source_url, self.color_scheme.muted)
                )
                .map_err(fmt_error)?;
            }
        }

        if !result.errors.is_empty() {
            writeln!(output).map_err(fmt_error)?;
            self.section(&mut output, &format!("Errors ({})", result.errors.len()))?;
            let shown = if self.options.verbose_mode { result.errors.len() } else { 10 };
            for error in result.errors.iter().take(shown) {
                writeln!(output, "  {} {}", self.colorize("✗", self.color_scheme.error), error).map_err(fmt_error)?;
            }
            if result.errors.len() > shown {
                let more = format!("  ... {} more", result.errors.len() - shown);
                writeln!(output, "{}", self.colorize(&more, self.color_scheme.muted)).map_err(fmt_error)?;
            }
        }

        Ok(output)
    }

    fn format_analysis(&self, report: &AnalysisReport) -> Result<String> {
        let mut output = String::new();
        let borders = self.options.table_borders;

        self.section(&mut output, "Test Summary")?;
        self.summary_block(&mut output, &report.summary, report.channel_count)?;
        writeln!(output).map_err(fmt_error)?;

        self.section(&mut output, "Metrics Statistics")?;
        output.push_str(&stats_table(&report.statistics, borders));
        writeln!(output).map_err(fmt_error)?;

        self.section(&mut output, "Correlation Matrix")?;
        output.push_str(&correlation_table(&report.correlation, borders));

        if !report.series.is_empty() {
            writeln!(output).map_err(fmt_error)?;
            self.section(&mut output, "Time Series")?;
            for (line, range) in sparkline_rows(&report.series, self.options.sparkline_width) {
                writeln!(
                    output,
                    "{}  {}",
                    self.colorize(&line, self.color_scheme.info),
                    self.colorize(&range, self.color_scheme.muted)
                )
                .map_err(fmt_error)?;
            }
        }

        Ok(output)
    }

    fn format_comparison(&self, report: &ComparisonReport) -> Result<String> {
        let mut output = self.plain_formatter.format_comparison(report)?;
        if self.options.enable_color && !report.excluded.is_empty() {
            let note = format!("{} run(s) excluded from comparison", report.excluded.len());
            writeln!(output, "{}", self.colorize(&note, self.color_scheme.warning)).map_err(fmt_error)?;
        }
        Ok(output)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✗", self.color_scheme.error), self.colorize(error, self.color_scheme.error)))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("⚠", self.color_scheme.warning), warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✓", self.color_scheme.success), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_levels() {
        assert_eq!(LoadLevel::from_percent(10.0), LoadLevel::Low);
        assert_eq!(LoadLevel::from_percent(60.0), LoadLevel::Moderate);
        assert_eq!(LoadLevel::from_percent(80.0), LoadLevel::High);
        assert_eq!(LoadLevel::from_percent(95.0), LoadLevel::Critical);
    }

    #[test]
    fn test_colorless_mode_falls_back_to_plain_text() {
        let formatter = ColoredFormatter::new(FormattingOptions {
            enable_color: false,
            ..FormattingOptions::default()
        });
        assert_eq!(formatter.format_header("Run").unwrap(), "=======\n  Run  \n=======");
        assert_eq!(formatter.format_success("saved").unwrap(), "✓ saved");
    }
}
