//! Comprehensive tests for statistical analysis and calculations
//!
//! This module contains property-based tests and edge case testing
//! for descriptive statistics, correlation and resampling.

use super::{compare::resample, pearson, percentile, Analyzer, DescriptiveStats, Metric};
use crate::aggregator::{finalize, RunWindow};
use crate::models::{MetricSample, TestConfig, TestResult};
use chrono::{TimeZone, Utc};
use proptest::collection::vec;
use proptest::prelude::*;

fn tolerance(values: &[f64]) -> f64 {
    1e-9 * values.iter().fold(1.0f64, |acc, v| acc.max(v.abs()))
}

/// Property-based test generators
mod generators {
    use super::*;

    /// Generate floating point numbers in the range of host readings
    pub fn readings() -> impl Strategy<Value = f64> {
        0.0f64..100_000.0
    }

    /// Generate vectors of readings for statistical calculations
    pub fn number_vectors() -> impl Strategy<Value = Vec<f64>> {
        vec(readings(), 1..500)
    }

    /// Generate sample gaps; zero models two samples in the same instant
    pub fn gaps() -> impl Strategy<Value = Vec<f64>> {
        vec(prop_oneof![Just(0.0), 0.05f64..5.0], 1..120)
    }

    /// Generate a run whose samples follow `gaps`
    pub fn runs() -> impl Strategy<Value = TestResult> {
        (gaps(), vec(0.0f64..100.0, 120), 1usize..8).prop_map(|(gaps, cpu, channels)| {
            let mut timestamp = 1_700_000_000.0;
            let samples: Vec<MetricSample> = gaps
                .iter()
                .enumerate()
                .map(|(i, gap)| {
                    timestamp += gap;
                    MetricSample {
                        timestamp,
                        cpu_percent: cpu[i % cpu.len()],
                        memory_percent: 30.0,
                        memory_mb: 1500.0 + (i % 13) as f64,
                        active_channels: i % (channels + 1),
                        total_frames: 3 * i as u64,
                        errors: Vec::new(),
                    }
                })
                .collect();

            let mut config = TestConfig {
                channel_count: channels,
                ..TestConfig::default()
            };
            config.normalize_sources();
            let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
            finalize(&config, samples, Vec::new(), &[], RunWindow::new(start, start))
        })
    }
}

/// Test mathematical properties of statistical calculations
mod property_tests {
    use super::*;

    proptest! {
        /// Mean and median always lie between min and max
        #[test]
        fn central_values_between_min_max(numbers in generators::number_vectors()) {
            let stats = DescriptiveStats::from_values(&numbers);
            let tol = tolerance(&numbers);

            prop_assert_eq!(stats.count, numbers.len());
            prop_assert!(stats.mean >= stats.min - tol && stats.mean <= stats.max + tol);
            prop_assert!(stats.median >= stats.min && stats.median <= stats.max);
            prop_assert!(stats.std_dev >= 0.0);
        }

        /// Percentiles are ordered
        #[test]
        fn percentiles_are_monotonic(numbers in generators::number_vectors()) {
            let stats = DescriptiveStats::from_values(&numbers);
            let tol = tolerance(&numbers);

            prop_assert!(stats.median <= stats.p90 + tol);
            prop_assert!(stats.p90 <= stats.p95 + tol);
            prop_assert!(stats.p95 <= stats.p99 + tol);
            prop_assert!(stats.p99 <= stats.max + tol);
        }

        /// Order of the input never matters
        #[test]
        fn statistics_ignore_input_order(mut numbers in generators::number_vectors()) {
            let forward = DescriptiveStats::from_values(&numbers);
            numbers.reverse();
            let reversed = DescriptiveStats::from_values(&numbers);

            prop_assert_eq!(forward.median, reversed.median);
            prop_assert_eq!(forward.p99, reversed.p99);
            prop_assert_eq!(forward.min, reversed.min);
            prop_assert_eq!(forward.max, reversed.max);
        }

        /// Correlation is bounded and symmetric
        #[test]
        fn pearson_bounded_and_symmetric(
            xs in vec(generators::readings(), 2..200),
            ys in vec(generators::readings(), 2..200),
        ) {
            let forward = pearson(&xs, &ys);
            let backward = pearson(&ys, &xs);
            prop_assert_eq!(forward.is_some(), backward.is_some());
            if let (Some(f), Some(b)) = (forward, backward) {
                prop_assert!((-1.0..=1.0).contains(&f));
                prop_assert!((f - b).abs() < 1e-9);
            }
        }

        /// A positive affine transform is perfectly correlated
        #[test]
        fn pearson_of_affine_transform(xs in vec(0.0f64..1000.0, 3..100), scale in 0.5f64..20.0) {
            let ys: Vec<f64> = xs.iter().map(|x| scale * x + 7.0).collect();
            if let Some(r) = pearson(&xs, &ys) {
                prop_assert!((r - 1.0).abs() < 1e-6);
            }
        }

        /// Resampled values never leave the range of the source samples
        #[test]
        fn resampling_stays_in_range(run in generators::runs(), points in 1usize..300) {
            let last = run.metrics.last().map(|s| s.timestamp).unwrap_or(0.0);
            let first = run.metrics.first().map(|s| s.timestamp).unwrap_or(0.0);
            let span = last - first;
            let axis: Vec<f64> = (0..points).map(|i| span * i as f64 / points as f64).collect();

            let series = resample(&run.metrics, &axis);
            let source = Metric::CpuPercent.column(&run.metrics);
            let low = source.iter().copied().fold(f64::INFINITY, f64::min);
            let high = source.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            prop_assert_eq!(series.len(), points);
            for value in series.metric(Metric::CpuPercent) {
                prop_assert!(*value >= low - 1e-9 && *value <= high + 1e-9);
            }
        }

        /// Analysis is a pure function of the artifact
        #[test]
        fn analysis_is_deterministic(run in generators::runs()) {
            let analyzer = Analyzer::new();
            let first = analyzer.analyze(&run);
            let second = analyzer.analyze(&run);

            prop_assert_eq!(first.series.len(), run.metrics.len());
            prop_assert_eq!(first.correlation.dimension(), Metric::CORRELATED.len());
            prop_assert_eq!(&first, &second);
        }
    }
}

/// Test edge cases and boundary conditions
mod edge_case_tests {
    use super::*;

    #[test]
    fn test_single_value_statistics() {
        let stats = DescriptiveStats::from_values(&[42.0]);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.mean, 42.0);
        assert_eq!(stats.median, 42.0);
        assert_eq!(stats.p99, 42.0);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_percentile_bounds_are_clamped() {
        let values = [1.0, 2.0, 3.0];
        assert_eq!(percentile(&values, -10.0), 1.0);
        assert_eq!(percentile(&values, 250.0), 3.0);
    }

    #[test]
    fn test_pearson_uses_common_prefix() {
        let r = pearson(&[1.0, 2.0, 3.0, 100.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_large_magnitude_values() {
        let values: Vec<f64> = (0..1000).map(|i| 1e12 + i as f64).collect();
        let stats = DescriptiveStats::from_values(&values);
        assert!((stats.mean - (1e12 + 499.5)).abs() < 1e-3);
        assert!(stats.std_dev.is_finite());
    }

    #[test]
    fn test_resample_empty_run() {
        let series = resample(&[], &[0.0, 1.0]);
        assert!(series.metric(Metric::CpuPercent).is_empty());
    }
}
