//! Output formatting and display system
//!
//! This module provides a flexible output formatting system for run
//! summaries and analysis reports, supporting both colored and plain text
//! output with table formatting, sparklines and Markdown reports.

mod colored;
mod formatter;
mod report;

pub use colored::{ColorScheme, ColoredFormatter, LoadLevel};
pub use formatter::{Alignment, Column, FormattingOptions, OutputFormatter, PlainFormatter, RowData, TableFormat};
pub use report::{render_markdown, report_path, write_report};

const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
            ..FormattingOptions::default()
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    /// Create a plain text formatter for scripts/logs
    pub fn create_plain_formatter() -> Box<dyn OutputFormatter> {
        Self::create_formatter(false, true)
    }
}

/// One-line bar chart of `values`, averaged into at most `width` buckets.
/// Non-finite values are skipped; a flat series renders at the lowest bar.
pub fn sparkline(values: &[f64], width: usize) -> String {
    let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() || width == 0 {
        return String::new();
    }

    let buckets = values.len().min(width);
    let points: Vec<f64> = (0..buckets)
        .map(|b| {
            let start = b * values.len() / buckets;
            let end = ((b + 1) * values.len() / buckets).max(start + 1);
            let slice = &values[start..end];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect();

    let min = points.iter().copied().fold(f64::INFINITY, f64::min);
    let max = points.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    points
        .iter()
        .map(|v| {
            if range <= 0.0 {
                SPARK_BARS[0]
            } else {
                let level = ((v - min) / range * (SPARK_BARS.len() - 1) as f64).round() as usize;
                SPARK_BARS[level.min(SPARK_BARS.len() - 1)]
            }
        })
        .collect()
}
