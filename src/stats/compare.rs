//! Multi-run comparison on a common elapsed-time axis

use super::{Analyzer, CorrelationMatrix, DescriptiveStats, Metric, TimeSeries};
use crate::error::{AppError, Result};
use crate::models::{MetricSample, Summary, TestResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A loaded run and the name it is reported under
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRun {
    pub name: String,
    pub result: TestResult,
}

/// A run left out of a comparison, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedRun {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for ExcludedRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

/// One run as seen on the common axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunComparison {
    pub name: String,
    /// Samples in the original run
    pub sample_count: usize,
    pub cadence_secs: Option<f64>,
    /// Elapsed seconds from first to last sample
    pub span_secs: f64,
    pub summary: Summary,
    pub statistics: BTreeMap<Metric, DescriptiveStats>,
    pub correlation: CorrelationMatrix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub step_secs: f64,
    pub span_secs: f64,
    pub axis: Vec<f64>,
    pub runs: Vec<RunComparison>,
    /// Per metric, run-by-run correlation of the resampled series
    pub cross_run: BTreeMap<Metric, CorrelationMatrix>,
    pub excluded: Vec<ExcludedRun>,
}

impl ComparisonReport {
    pub fn run(&self, name: &str) -> Option<&RunComparison> {
        self.runs.iter().find(|r| r.name == name)
    }
}

fn elapsed(samples: &[MetricSample]) -> Vec<f64> {
    let origin = samples.first().map(|s| s.timestamp).unwrap_or(0.0);
    samples.iter().map(|s| s.timestamp - origin).collect()
}

/// Evenly spaced axis from 0 to `span`, at most `max_points` long.
/// Returns the axis and the step actually used.
fn build_axis(step: f64, span: f64, max_points: usize) -> (Vec<f64>, f64) {
    if span <= 0.0 || step <= 0.0 || !span.is_finite() || !step.is_finite() {
        return (vec![0.0], step.max(0.0));
    }

    let max_points = max_points.max(2);
    let mut step = step;
    let mut points = (span / step + 1e-9).floor() as usize + 1;
    if points > max_points {
        step = span / (max_points - 1) as f64;
        points = max_points;
    }
    ((0..points).map(|i| i as f64 * step).collect(), step)
}

/// Linearly interpolate a run onto `axis` (elapsed seconds from its first
/// sample). Points past either end take the nearest sample's value.
pub fn resample(samples: &[MetricSample], axis: &[f64]) -> TimeSeries {
    let times = elapsed(samples);
    let values = Metric::ALL
        .iter()
        .map(|metric| (*metric, interpolate(&times, &metric.column(samples), axis)))
        .collect();

    TimeSeries {
        elapsed: axis.to_vec(),
        values,
    }
}

fn interpolate(times: &[f64], values: &[f64], axis: &[f64]) -> Vec<f64> {
    let n = times.len().min(values.len());
    if n == 0 {
        return Vec::new();
    }

    let mut j = 0;
    axis.iter()
        .map(|&t| {
            while j + 1 < n && times[j + 1] <= t {
                j += 1;
            }
            if j + 1 == n || t <= times[j] {
                return values[j];
            }
            let weight = (t - times[j]) / (times[j + 1] - times[j]);
            values[j] + weight * (values[j + 1] - values[j])
        })
        .collect()
}

impl Analyzer {
    /// Align runs on elapsed time and compare them.
    ///
    /// The axis step is the finest sampling cadence among the inputs and
    /// its span the shortest run. Runs without samples are excluded; at
    /// least two usable runs are required.
    pub fn compare(&self, runs: Vec<NamedRun>) -> Result<ComparisonReport> {
        let (usable, empty): (Vec<NamedRun>, Vec<NamedRun>) =
            runs.into_iter().partition(|r| !r.result.metrics.is_empty());
        let excluded: Vec<ExcludedRun> = empty
            .into_iter()
            .map(|r| ExcludedRun {
                name: r.name,
                reason: "artifact contains no samples".to_string(),
            })
            .collect();

        if usable.len() < 2 {
            return Err(AppError::statistics(format!(
                "comparison needs at least two usable runs, found {}",
                usable.len()
            )));
        }

        let span = usable
            .iter()
            .map(|r| elapsed(&r.result.metrics).last().copied().unwrap_or(0.0))
            .fold(f64::INFINITY, f64::min);
        let step = usable
            .iter()
            .filter_map(|r| r.result.sample_cadence())
            .fold(f64::INFINITY, f64::min);
        let step = if step.is_finite() { step } else { 1.0 };
        let (axis, step) = build_axis(step, span, self.max_points);

        let mut runs = Vec::with_capacity(usable.len());
        let mut series = Vec::with_capacity(usable.len());
        for run in &usable {
            let resampled = resample(&run.result.metrics, &axis);
            let metrics = &run.result.metrics;
            runs.push(RunComparison {
                name: run.name.clone(),
                sample_count: metrics.len(),
                cadence_secs: run.result.sample_cadence(),
                span_secs: elapsed(metrics).last().copied().unwrap_or(0.0),
                summary: run.result.summary.clone(),
                statistics: resampled.statistics(),
                correlation: resampled.correlation(),
            });
            series.push(resampled);
        }

        let names: Vec<String> = runs.iter().map(|r| r.name.clone()).collect();
        let cross_run = Metric::ALL
            .iter()
            .map(|metric| {
                let columns: Vec<Vec<f64>> = series.iter().map(|s| s.metric(*metric).to_vec()).collect();
                (*metric, CorrelationMatrix::compute(names.clone(), &columns))
            })
            .collect();

        Ok(ComparisonReport {
            step_secs: step,
            span_secs: span,
            axis,
            runs,
            cross_run,
            excluded,
        })
    }
}
