//! Statistical analysis of profiling runs

pub mod compare;

#[cfg(test)]
mod comprehensive_tests;

pub use compare::{resample, ComparisonReport, ExcludedRun, NamedRun, RunComparison};

use crate::{
    error::{AppError, Result},
    models::{MetricSample, Summary, TestResult},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Per-sample metrics the analyzer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CpuPercent,
    MemoryPercent,
    MemoryMb,
    ActiveChannels,
    TotalFrames,
}

impl Metric {
    /// Every metric with descriptive statistics
    pub const ALL: [Metric; 5] = [
        Metric::CpuPercent,
        Metric::MemoryPercent,
        Metric::MemoryMb,
        Metric::ActiveChannels,
        Metric::TotalFrames,
    ];

    /// Metrics of the correlation matrix
    pub const CORRELATED: [Metric; 4] = [
        Metric::CpuPercent,
        Metric::MemoryMb,
        Metric::ActiveChannels,
        Metric::TotalFrames,
    ];

    /// Field name in the artifact
    pub fn name(&self) -> &'static str {
        match self {
            Metric::CpuPercent => "cpu_percent",
            Metric::MemoryPercent => "memory_percent",
            Metric::MemoryMb => "memory_mb",
            Metric::ActiveChannels => "active_channels",
            Metric::TotalFrames => "total_frames",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::CpuPercent => "CPU Usage (%)",
            Metric::MemoryPercent => "Memory Usage (%)",
            Metric::MemoryMb => "Memory Usage (MB)",
            Metric::ActiveChannels => "Active Channels",
            Metric::TotalFrames => "Total Frames",
        }
    }

    pub fn value(&self, sample: &MetricSample) -> f64 {
        match self {
            Metric::CpuPercent => sample.cpu_percent,
            Metric::MemoryPercent => sample.memory_percent,
            Metric::MemoryMb => sample.memory_mb,
            Metric::ActiveChannels => sample.active_channels as f64,
            Metric::TotalFrames => sample.total_frames as f64,
        }
    }

    /// Column of this metric over a sample sequence
    pub fn column(&self, samples: &[MetricSample]) -> Vec<f64> {
        samples.iter().map(|s| self.value(s)).collect()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Descriptive statistics of one metric. An empty input yields `count == 0`
/// and zeroed figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation (n - 1)
    pub std_dev: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl DescriptiveStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;

        Self {
            count: sorted.len(),
            mean,
            median: percentile(&sorted, 50.0),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            std_dev: standard_deviation(&sorted, mean),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        }
    }
}

/// Percentile of ascending values with linear interpolation between ranks
pub fn percentile(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let index = (percentile.clamp(0.0, 100.0) / 100.0) * (sorted_values.len() as f64 - 1.0);
    let lower_index = index.floor() as usize;
    let upper_index = index.ceil() as usize;

    if lower_index == upper_index {
        sorted_values[lower_index]
    } else {
        let lower_value = sorted_values[lower_index];
        let upper_value = sorted_values[upper_index];
        let weight = index - lower_index as f64;
        lower_value + weight * (upper_value - lower_value)
    }
}

fn standard_deviation(values: &[f64], mean: f64) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }

    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Pearson correlation over the common prefix of two series. `None` when
/// fewer than two points exist or either series has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    if is_constant(xs) || is_constant(ys) {
        return None;
    }

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    let r = sxy / (sxx * syy).sqrt();
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Square matrix of pairwise correlations; undefined entries are `null`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn compute(labels: Vec<String>, series: &[Vec<f64>]) -> Self {
        let values = series
            .iter()
            .map(|a| series.iter().map(|b| pearson(a, b)).collect())
            .collect();
        Self { labels, values }
    }

    /// Matrix over [`Metric::CORRELATED`] for one sample sequence
    pub fn of_metrics(columns: &BTreeMap<Metric, Vec<f64>>) -> Self {
        let labels = Metric::CORRELATED.iter().map(|m| m.name().to_string()).collect();
        let series: Vec<Vec<f64>> = Metric::CORRELATED
            .iter()
            .map(|m| columns.get(m).cloned().unwrap_or_default())
            .collect();
        Self::compute(labels, &series)
    }

    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == row)?;
        let j = self.labels.iter().position(|l| l == column)?;
        self.values.get(i)?.get(j).copied().flatten()
    }

    pub fn dimension(&self) -> usize {
        self.labels.len()
    }
}

/// Metric values against elapsed seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub elapsed: Vec<f64>,
    pub values: BTreeMap<Metric, Vec<f64>>,
}

impl TimeSeries {
    /// Series of a sample sequence relative to its first sample
    pub fn from_samples(samples: &[MetricSample]) -> Self {
        let origin = samples.first().map(|s| s.timestamp).unwrap_or(0.0);
        Self {
            elapsed: samples.iter().map(|s| s.timestamp - origin).collect(),
            values: Metric::ALL.iter().map(|m| (*m, m.column(samples))).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.elapsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elapsed.is_empty()
    }

    pub fn metric(&self, metric: Metric) -> &[f64] {
        self.values.get(&metric).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn statistics(&self) -> BTreeMap<Metric, DescriptiveStats> {
        Metric::ALL
            .iter()
            .map(|m| (*m, DescriptiveStats::from_values(self.metric(*m))))
            .collect()
    }

    pub fn correlation(&self) -> CorrelationMatrix {
        CorrelationMatrix::of_metrics(&self.values)
    }
}

/// Analysis of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Artifact the run was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub summary: Summary,
    pub channel_count: usize,
    pub duration_secs: f64,
    /// Median sample spacing in seconds
    pub cadence_secs: Option<f64>,
    pub statistics: BTreeMap<Metric, DescriptiveStats>,
    pub correlation: CorrelationMatrix,
    pub series: TimeSeries,
    pub errors: Vec<String>,
}

impl AnalysisReport {
    pub fn stat(&self, metric: Metric) -> DescriptiveStats {
        self.statistics.get(&metric).copied().unwrap_or_default()
    }
}

/// Computes analysis and comparison reports
#[derive(Debug, Clone)]
pub struct Analyzer {
    /// Upper bound on points of a resampled comparison axis
    pub max_points: usize,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self { max_points: 100_000 }
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze one run. Pure: the same input always gives the same report.
    pub fn analyze(&self, result: &TestResult) -> AnalysisReport {
        let series = TimeSeries::from_samples(&result.metrics);

        AnalysisReport {
            source: None,
            summary: result.summary.clone(),
            channel_count: result.test_config.channel_count,
            duration_secs: result.summary.duration_secs(),
            cadence_secs: result.sample_cadence(),
            statistics: series.statistics(),
            correlation: series.correlation(),
            series,
            errors: result.errors.clone(),
        }
    }

    /// Load and analyze one artifact
    pub fn analyze_file<P: AsRef<Path>>(&self, path: P) -> Result<AnalysisReport> {
        let path = path.as_ref();
        let result = TestResult::load(path)?;
        let mut report = self.analyze(&result);
        report.source = Some(path.to_path_buf());
        Ok(report)
    }

    /// Load artifacts for comparison. Unreadable or invalid files are
    /// returned as exclusions instead of failing the whole set.
    pub fn load_runs<P: AsRef<Path>>(&self, paths: &[P]) -> (Vec<NamedRun>, Vec<ExcludedRun>) {
        let mut runs: Vec<NamedRun> = Vec::new();
        let mut excluded = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let name = unique_name(run_name(path), &runs);
            match TestResult::load(path) {
                Ok(result) => runs.push(NamedRun { name, result }),
                Err(e) => excluded.push(ExcludedRun {
                    name,
                    reason: e.to_string(),
                }),
            }
        }

        (runs, excluded)
    }

    /// Load every file and compare the usable ones
    pub fn compare_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ComparisonReport> {
        let (runs, excluded) = self.load_runs(paths);
        match self.compare(runs) {
            Ok(mut report) => {
                let mut all = excluded;
                all.append(&mut report.excluded);
                report.excluded = all;
                Ok(report)
            }
            Err(AppError::Statistics(message)) if !excluded.is_empty() => {
                let reasons: Vec<String> = excluded.iter().map(ToString::to_string).collect();
                Err(AppError::statistics(format!("{}; excluded: {}", message, reasons.join("; "))))
            }
            Err(e) => Err(e),
        }
    }

    /// Pretty JSON of any report
    pub fn export_json<T: Serialize>(&self, report: &T) -> Result<String> {
        serde_json::to_string_pretty(report)
            .map_err(|e| AppError::statistics(format!("Failed to serialize report: {}", e)))
    }
}

/// Display name of a run: the artifact's file stem
fn run_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn unique_name(base: String, runs: &[NamedRun]) -> String {
    if !runs.iter().any(|r| r.name == base) {
        return base;
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !runs.iter().any(|r| r.name == candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
