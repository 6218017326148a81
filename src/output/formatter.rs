//! Core formatting traits and implementations
//!
//! This module defines the output formatting interface and provides
//! a plain text implementation with table formatting capabilities.

use super::sparkline;
use crate::{
    error::{AppError, Result},
    models::{MetricSample, Summary, TestResult},
    stats::{AnalysisReport, ComparisonReport, CorrelationMatrix, DescriptiveStats, Metric, TimeSeries},
};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Main trait for output formatting
pub trait OutputFormatter: Send + Sync {
    /// Format a header section
    fn format_header(&self, title: &str) -> Result<String>;

    /// One line per monitor tick while a run is in progress
    fn format_progress(&self, sample: &MetricSample, origin: f64) -> String;

    /// Summary of a finished run
    fn format_run_summary(&self, result: &TestResult) -> Result<String>;

    /// Descriptive statistics, correlation and series of one run
    fn format_analysis(&self, report: &AnalysisReport) -> Result<String>;

    /// Side-by-side view of several runs
    fn format_comparison(&self, report: &ComparisonReport) -> Result<String>;

    /// Format error messages
    fn format_error(&self, error: &str) -> Result<String>;

    /// Format warning messages
    fn format_warning(&self, warning: &str) -> Result<String>;

    /// Format success messages
    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    /// Enable colored output
    pub enable_color: bool,
    /// Enable verbose mode with detailed information
    pub verbose_mode: bool,
    /// Show table borders
    pub table_borders: bool,
    /// Characters per sparkline row
    pub sparkline_width: usize,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
            table_borders: true,
            sparkline_width: 60,
        }
    }
}

/// Table formatting configuration
#[derive(Debug, Clone)]
pub struct TableFormat {
    /// Column definitions
    pub columns: Vec<Column>,
    /// Show borders around table
    pub show_borders: bool,
}

/// Column definition for table formatting
#[derive(Debug, Clone)]
pub struct Column {
    /// Column header
    pub header: String,
    /// Column alignment
    pub alignment: Alignment,
    /// Minimum width
    pub min_width: usize,
}

impl Column {
    pub fn left(header: &str) -> Self {
        Self {
            header: header.to_string(),
            alignment: Alignment::Left,
            min_width: 0,
        }
    }

    pub fn right(header: &str) -> Self {
        Self {
            header: header.to_string(),
            alignment: Alignment::Right,
            min_width: 0,
        }
    }
}

/// Text alignment options
#[derive(Debug, Clone)]
pub enum Alignment {
    Left,
    Right,
}

/// Row data for table formatting
pub type RowData = Vec<String>;

pub(super) fn fmt_error(e: std::fmt::Error) -> AppError {
    AppError::internal(format!("Failed to format output: {}", e))
}

/// Render rows under the given columns
pub(super) fn render_table(format: &TableFormat, rows: &[RowData]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let widths = column_widths(format, rows);
    let mut output = String::new();

    if format.show_borders {
        output.push_str(&horizontal_border(&widths));
        output.push('\n');
    }
    let headers: Vec<String> = format.columns.iter().map(|c| c.header.clone()).collect();
    output.push_str(&table_row(&headers, &widths, format));
    output.push('\n');
    output.push_str(&horizontal_border(&widths));
    output.push('\n');

    for row in rows {
        output.push_str(&table_row(row, &widths, format));
        output.push('\n');
    }

    if format.show_borders {
        output.push_str(&horizontal_border(&widths));
        output.push('\n');
    }

    output
}

fn column_widths(format: &TableFormat, rows: &[RowData]) -> Vec<usize> {
    let columns = format.columns.len().max(rows.iter().map(Vec::len).max().unwrap_or(0));

    (0..columns)
        .map(|idx| {
            let header = format
                .columns
                .get(idx)
                .map(|c| c.min_width.max(c.header.chars().count()))
                .unwrap_or(0);
            rows.iter()
                .filter_map(|row| row.get(idx))
                .map(|cell| cell.chars().count())
                .fold(header, usize::max)
        })
        .collect()
}

fn table_row(data: &[String], widths: &[usize], format: &TableFormat) -> String {
    let mut row = String::new();
    if format.show_borders {
        row.push('|');
    }

    for (idx, (cell, &width)) in data.iter().zip(widths).enumerate() {
        let alignment = format
            .columns
            .get(idx)
            .map(|c| &c.alignment)
            .unwrap_or(&Alignment::Left);

        if format.show_borders {
            row.push(' ');
        }
        row.push_str(&align_text(cell, width, alignment));
        if format.show_borders {
            row.push_str(" |");
        } else {
            row.push_str("  ");
        }
    }

    row.trim_end().to_string()
}

fn horizontal_border(widths: &[usize]) -> String {
    let mut border = String::from("+");
    for &width in widths {
        border.push_str(&"-".repeat(width + 2));
        border.push('+');
    }
    border
}

fn align_text(text: &str, width: usize, alignment: &Alignment) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }

    let padding = " ".repeat(width - len);
    match alignment {
        Alignment::Left => format!("{}{}", text, padding),
        Alignment::Right => format!("{}{}", padding, text),
    }
}

/// Human readable duration of a run in seconds
pub(super) fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let minutes = (secs / 60.0) as u64;
        format!("{}m{:.1}s", minutes, secs - minutes as f64 * 60.0)
    }
}

/// Correlation cell; undefined coefficients print as `n/a`
pub(super) fn format_correlation(value: Option<f64>) -> String {
    match value {
        Some(r) => format!("{:+.2}", r),
        None => "n/a".to_string(),
    }
}

pub(super) fn progress_text(sample: &MetricSample, origin: f64) -> String {
    format!(
        "[{:>7.1}s] CPU {:5.1}% | Memory {:.0}MB ({:.1}%) | Channels {} | Frames {}",
        (sample.timestamp - origin).max(0.0),
        sample.cpu_percent,
        sample.memory_mb,
        sample.memory_percent,
        sample.active_channels,
        sample.total_frames
    )
}

pub(super) fn summary_rows(summary: &Summary, channel_count: usize) -> Vec<(&'static str, String)> {
    vec![
        ("Test Start", summary.test_start.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ("Duration", format_duration(summary.duration_secs())),
        ("Samples", summary.total_metrics.to_string()),
        ("Max Active Channels", format!("{} / {}", summary.max_channels, channel_count)),
        ("Max CPU Usage", format!("{:.1}%", summary.max_cpu_percent)),
        ("Avg CPU Usage", format!("{:.1}%", summary.avg_cpu_percent)),
        ("Max Memory Usage", format!("{:.1}MB", summary.max_memory_mb)),
        ("Avg Memory Usage", format!("{:.1}MB", summary.avg_memory_mb)),
        ("Total Frames Decoded", summary.total_frames.to_string()),
        ("Total Errors", summary.total_errors.to_string()),
        ("Missed Samples", summary.missed_ticks.to_string()),
    ]
}

pub(super) fn stats_table(statistics: &BTreeMap<Metric, DescriptiveStats>, borders: bool) -> String {
    let format = TableFormat {
        columns: vec![
            Column::left("Metric"),
            Column::right("Mean"),
            Column::right("Median"),
            Column::right("Min"),
            Column::right("Max"),
            Column::right("Std Dev"),
            Column::right("P90"),
            Column::right("P95"),
            Column::right("P99"),
        ],
        show_borders: borders,
    };

    let rows: Vec<RowData> = Metric::ALL
        .iter()
        .filter_map(|metric| statistics.get(metric).map(|s| (metric, s)))
        .map(|(metric, s)| {
            let mut row = vec![metric.label().to_string()];
            row.extend(
                [s.mean, s.median, s.min, s.max, s.std_dev, s.p90, s.p95, s.p99]
                    .iter()
                    .map(|v| format!("{:.2}", v)),
            );
            row
        })
        .collect();

    render_table(&format, &rows)
}

pub(super) fn correlation_table(matrix: &CorrelationMatrix, borders: bool) -> String {
    let mut columns = vec![Column::left("")];
    columns.extend(matrix.labels.iter().map(|l| Column::right(l)));
    let format = TableFormat {
        columns,
        show_borders: borders,
    };

    let rows: Vec<RowData> = matrix
        .labels
        .iter()
        .zip(&matrix.values)
        .map(|(label, values)| {
            let mut row = vec![label.clone()];
            row.extend(values.iter().map(|v| format_correlation(*v)));
            row
        })
        .collect();

    render_table(&format, &rows)
}

pub(super) fn sparkline_rows(series: &TimeSeries, width: usize) -> Vec<(String, String)> {
    Metric::ALL
        .iter()
        .map(|metric| {
            let values = series.metric(*metric);
            let (min, max) = values
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
            let range = if values.is_empty() {
                String::new()
            } else {
                format!("{:.1} .. {:.1}", min, max)
            };
            (
                format!("{:<16} {}", metric.name(), sparkline(values, width)),
                range,
            )
        })
        .collect()
}

/// Plain text formatter implementation
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    /// Create a new plain formatter with options
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    fn section(&self, output: &mut String, title: &str) -> Result<()> {
        writeln!(output, "{}:", title).map_err(fmt_error)?;
        writeln!(output, "{}", "-".repeat(title.len() + 1)).map_err(fmt_error)
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "=".repeat(title.len() + 4);

        writeln!(output, "{}", border).map_err(fmt_error)?;
        writeln!(output, "  {}  ", title).map_err(fmt_error)?;
        write!(output, "{}", border).map_err(fmt_error)?;

        Ok(output)
    }

    fn format_progress(&self, sample: &MetricSample, origin: f64) -> String {
        let mut line = progress_text(sample, origin);
        if !sample.errors.is_empty() {
            line.push_str(&format!(" | {} new error(s)", sample.errors.len()));
        }
        line
    }

    fn format_run_summary(&self, result: &TestResult) -> Result<String> {
        let mut output = String::new();
        self.section(&mut output, "Test Summary")?;
        for (label, value) in summary_rows(&result.summary, result.test_config.channel_count) {
            writeln!(output, "{:<22} {}", format!("{}:", label), value).map_err(fmt_error)?;
        }

        if !result.channels.is_empty() {
            writeln!(output).map_err(fmt_error)?;
            self.section(&mut output, "Channels")?;
            let format = TableFormat {
                columns: vec![
                    Column::left("Channel"),
                    Column::left("State"),
                    Column::right("Frames"),
                    Column::right("Errors"),
                    Column::left("Source"),
                ],
                show_borders: self.options.table_borders,
            };
            let rows: Vec<RowData> = result
                .channels
                .iter()
                .map(|c| {
                    vec![
                        c.channel_id.clone(),
                        c.state.to_string(),
                        c.frame_count.to_string(),
                        c.errors.len().to_string(),
                        c.source_url.clone(),
                    ]
                })
                .collect();
            output.push_str(&render_table(&format, &rows));
        }

        if !result.errors.is_empty() {
            writeln!(output).map_err(fmt_error)?;
            self.section(&mut output, &format!("Errors ({})", result.errors.len()))?;
            let shown = if self.options.verbose_mode { result.errors.len() } else { 10 };
            for error in result.errors.iter().take(shown) {
                writeln!(output, "  - {}", error).map_err(fmt_error)?;
            }
            if result.errors.len() > shown {
                writeln!(output, "  ... {} more", result.errors.len() - shown).map_err(fmt_error)?;
            }
        }

        Ok(output)
    }

    fn format_analysis(&self, report: &AnalysisReport) -> Result<String> {
        let mut output = String::new();
        let borders = self.options.table_borders;

        self.section(&mut output, "Test Summary")?;
        for (label, value) in summary_rows(&report.summary, report.channel_count) {
            writeln!(output, "{:<22} {}", format!("{}:", label), value).map_err(fmt_error)?;
        }
        writeln!(output).map_err(fmt_error)?;

        self.section(&mut output, "Metrics Statistics")?;
        output.push_str(&stats_table(&report.statistics, borders));
        writeln!(output).map_err(fmt_error)?;

        self.section(&mut output, "Correlation Matrix")?;
        output.push_str(&correlation_table(&report.correlation, borders));
        writeln!(output).map_err(fmt_error)?;

        if !report.series.is_empty() {
            self.section(&mut output, "Time Series")?;
            for (line, range) in sparkline_rows(&report.series, self.options.sparkline_width) {
                writeln!(output, "{}  {}", line, range).map_err(fmt_error)?;
            }
        }

        Ok(output)
    }

    fn format_comparison(&self, report: &ComparisonReport) -> Result<String> {
        let mut output = String::new();
        let borders = self.options.table_borders;

        writeln!(
            output,
            "Common axis: {} points, step {:.3}s, span {:.1}s",
            report.axis.len(),
            report.step_secs,
            report.span_secs
        )
        .map_err(fmt_error)?;
        writeln!(output).map_err(fmt_error)?;

        self.section(&mut output, "Runs")?;
        let format = TableFormat {
            columns: vec![
                Column::left("Run"),
                Column::right("Samples"),
                Column::right("Cadence"),
                Column::right("Max CPU %"),
                Column::right("Max Mem MB"),
                Column::right("Max Channels"),
                Column::right("Frames"),
                Column::right("Errors"),
            ],
            show_borders: borders,
        };
        let rows: Vec<RowData> = report
            .runs
            .iter()
            .map(|run| {
                vec![
                    run.name.clone(),
                    run.sample_count.to_string(),
                    run.cadence_secs.map(|c| format!("{:.2}s", c)).unwrap_or_else(|| "-".to_string()),
                    format!("{:.1}", run.summary.max_cpu_percent),
                    format!("{:.1}", run.summary.max_memory_mb),
                    run.summary.max_channels.to_string(),
                    run.summary.total_frames.to_string(),
                    run.summary.total_errors.to_string(),
                ]
            })
            .collect();
        output.push_str(&render_table(&format, &rows));

        for run in &report.runs {
            writeln!(output).map_err(fmt_error)?;
            self.section(&mut output, &format!("{} (resampled)", run.name))?;
            output.push_str(&stats_table(&run.statistics, borders));
            if self.options.verbose_mode {
                output.push_str(&correlation_table(&run.correlation, borders));
            }
        }

        for metric in Metric::CORRELATED {
            if let Some(matrix) = report.cross_run.get(&metric) {
                writeln!(output).map_err(fmt_error)?;
                self.section(&mut output, &format!("Cross-run correlation: {}", metric.name()))?;
                output.push_str(&correlation_table(matrix, borders));
            }
        }

        if !report.excluded.is_empty() {
            writeln!(output).map_err(fmt_error)?;
            self.section(&mut output, "Excluded")?;
            for excluded in &report.excluded {
                writeln!(output, "  - {}", excluded).map_err(fmt_error)?;
            }
        }

        Ok(output)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("SUCCESS: {}", message))
    }
}
