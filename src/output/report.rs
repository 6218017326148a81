//! Markdown report written next to an analyzed artifact

use super::sparkline;
use super::formatter::{format_correlation, format_duration};
use crate::error::{AppError, Result};
use crate::stats::{AnalysisReport, Metric};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const SPARKLINE_WIDTH: usize = 72;

/// `<dir>/<stem>_report.md` for an artifact at `<dir>/<stem>.json`
pub fn report_path(artifact: &Path) -> PathBuf {
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    artifact.with_file_name(format!("{}_report.md", stem))
}

/// Render the report as Markdown
pub fn render_markdown(report: &AnalysisReport, generated_at: DateTime<Utc>) -> String {
    let mut md = String::new();
    // writes into a String cannot fail
    let _ = write_markdown(&mut md, report, generated_at);
    md
}

fn write_markdown(md: &mut String, report: &AnalysisReport, generated_at: DateTime<Utc>) -> std::fmt::Result {
    let summary = &report.summary;

    writeln!(md, "# Video Pipeline Profiling Report")?;
    writeln!(md)?;
    if let Some(source) = &report.source {
        writeln!(md, "- **Test File:** `{}`", source.display())?;
    }
    writeln!(md, "- **Generated:** {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(md)?;

    writeln!(md, "## Test Summary")?;
    writeln!(md)?;
    writeln!(md, "| Field | Value |")?;
    writeln!(md, "|---|---|")?;
    writeln!(md, "| Total Metrics Collected | {} |", summary.total_metrics)?;
    writeln!(md, "| Test Start | {} |", summary.test_start.to_rfc3339())?;
    writeln!(md, "| Test End | {} |", summary.test_end.to_rfc3339())?;
    writeln!(md, "| Duration | {} |", format_duration(report.duration_secs))?;
    writeln!(md, "| Max Active Channels | {} / {} |", summary.max_channels, report.channel_count)?;
    writeln!(md, "| Max CPU Usage | {:.1}% |", summary.max_cpu_percent)?;
    writeln!(md, "| Max Memory Usage | {:.1}MB |", summary.max_memory_mb)?;
    writeln!(md, "| Total Frames Decoded | {} |", summary.total_frames)?;
    writeln!(md, "| Total Errors | {} |", summary.total_errors)?;
    writeln!(md, "| Missed Samples | {} |", summary.missed_ticks)?;
    writeln!(md)?;

    if report.series.is_empty() {
        writeln!(md, "_No samples were collected._")?;
    } else {
        writeln!(md, "## Metrics Statistics")?;
        writeln!(md)?;
        writeln!(md, "| Metric | Mean | Median | Min | Max | Std Dev | P95 | P99 |")?;
        writeln!(md, "|---|---:|---:|---:|---:|---:|---:|---:|")?;
        for metric in Metric::ALL {
            let s = report.stat(metric);
            writeln!(
                md,
                "| {} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} |",
                metric.label(),
                s.mean,
                s.median,
                s.min,
                s.max,
                s.std_dev,
                s.p95,
                s.p99
            )?;
        }
        writeln!(md)?;

        writeln!(md, "## Correlation Matrix")?;
        writeln!(md)?;
        let matrix = &report.correlation;
        writeln!(md, "| | {} |", matrix.labels.join(" | "))?;
        writeln!(md, "|---|{}", "---:|".repeat(matrix.dimension()))?;
        for (label, row) in matrix.labels.iter().zip(&matrix.values) {
            let cells: Vec<String> = row.iter().map(|v| format_correlation(*v)).collect();
            writeln!(md, "| {} | {} |", label, cells.join(" | "))?;
        }
        writeln!(md)?;

        writeln!(md, "## Time Series")?;
        writeln!(md)?;
        writeln!(md, "```")?;
        for metric in Metric::ALL {
            writeln!(
                md,
                "{:<16} {}",
                metric.name(),
                sparkline(report.series.metric(metric), SPARKLINE_WIDTH)
            )?;
        }
        writeln!(md, "```")?;
        writeln!(md)?;
    }

    if !report.errors.is_empty() {
        writeln!(md, "## Errors ({})", report.errors.len())?;
        writeln!(md)?;
        for error in &report.errors {
            writeln!(md, "- {}", error)?;
        }
    }

    Ok(())
}

/// Write the report for `report`'s artifact; returns the path written
pub fn write_report(report: &AnalysisReport, path: &Path) -> Result<PathBuf> {
    let markdown = render_markdown(report, Utc::now());
    std::fs::write(path, markdown)
        .map_err(|e| AppError::io(format!("Failed to write report {}: {}", path.display(), e)))?;
    Ok(path.to_path_buf())
}
