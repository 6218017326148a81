//! Artifact persistence, analysis and comparison on files

mod common;

use common::{save_run, synthetic_run};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use video_pipeline_profiler::{
    models::TestResult,
    types::HwAccel,
    output::{render_markdown, report_path, write_report},
    stats::{Analyzer, Metric},
};

#[test]
fn test_artifact_round_trip_is_lossless() {
    let dir = TempDir::new().unwrap();
    let result = synthetic_run(25, 0.5, |i| (i as f64 * 1.7) % 100.0);
    let path = save_run(dir.path(), "roundtrip", &result);

    let loaded = TestResult::load(&path).unwrap();
    assert_eq!(loaded, result);

    // a second save of the loaded artifact is byte-identical
    let again = save_run(dir.path(), "again", &loaded);
    assert_eq!(fs::read_to_string(&path).unwrap(), fs::read_to_string(&again).unwrap());
}

#[test]
fn test_save_leaves_no_temporary_files() {
    let dir = TempDir::new().unwrap();
    save_run(dir.path(), "clean", &synthetic_run(3, 1.0, |_| 1.0));

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["clean.json".to_string()]);
}

#[test]
fn test_invalid_artifact_names_the_violation() {
    let dir = TempDir::new().unwrap();
    let mut value = serde_json::to_value(synthetic_run(3, 1.0, |_| 1.0)).unwrap();
    value["summary"]["total_errors"] = serde_json::json!(7);
    let path = dir.path().join("tampered.json");
    fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

    let err = TestResult::load(&path).unwrap_err();
    assert_eq!(err.category(), "ARTIFACT");
    assert!(err.to_string().contains("tampered.json"));
}

#[test]
fn test_analysis_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = save_run(dir.path(), "steady", &synthetic_run(40, 1.0, |i| 10.0 + (i % 7) as f64));

    let analyzer = Analyzer::new();
    let first = analyzer.analyze_file(&path).unwrap();
    let second = analyzer.analyze_file(&path).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        analyzer.export_json(&first).unwrap(),
        analyzer.export_json(&second).unwrap()
    );

    let cpu = first.stat(Metric::CpuPercent);
    assert_eq!(cpu.count, 40);
    assert_eq!(cpu.min, 10.0);
    assert_eq!(cpu.max, 16.0);
    assert_eq!(first.series.len(), 40);
    assert_eq!(first.series.elapsed[0], 0.0);
    assert_eq!(first.correlation.dimension(), 4);
}

#[test]
fn test_markdown_report_next_to_artifact() {
    let dir = TempDir::new().unwrap();
    let path = save_run(dir.path(), "nightly", &synthetic_run(10, 1.0, |i| i as f64));
    let report = Analyzer::new().analyze_file(&path).unwrap();

    let target = report_path(&path);
    assert_eq!(target, dir.path().join("nightly_report.md"));
    write_report(&report, &target).unwrap();

    let markdown = fs::read_to_string(&target).unwrap();
    assert!(markdown.contains("nightly.json"));
    assert!(markdown.contains("## Metrics Statistics"));
    assert_eq!(markdown.lines().count(), render_markdown(&report, chrono::Utc::now()).lines().count());
}

#[test]
fn test_compare_mixed_cadence_files() {
    let dir = TempDir::new().unwrap();
    let coarse = save_run(dir.path(), "coarse", &synthetic_run(21, 1.0, |i| i as f64));
    let fine = save_run(dir.path(), "fine", &synthetic_run(31, 0.25, |i| 0.5 * i as f64));
    let broken = dir.path().join("broken.json");
    fs::write(&broken, "[]").unwrap();

    let report = Analyzer::new().compare_files(&[&coarse, &fine, &broken]).unwrap();

    assert_eq!(report.step_secs, 0.25);
    assert_eq!(report.span_secs, 7.5);
    assert_eq!(report.axis.len(), 31);
    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.excluded.len(), 1);
    assert_eq!(report.excluded[0].name, "broken");

    let coarse_run = report.run("coarse").unwrap();
    assert_eq!(coarse_run.sample_count, 21);
    assert_eq!(coarse_run.cadence_secs, Some(1.0));
    assert_eq!(coarse_run.correlation.dimension(), report.run("fine").unwrap().correlation.dimension());

    let cpu = &report.cross_run[&Metric::CpuPercent];
    assert!((cpu.get("coarse", "fine").unwrap() - 1.0).abs() < 1e-9);
}

#[test]
fn test_duplicate_stems_get_distinct_names() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    let first = save_run(&a, "run", &synthetic_run(5, 1.0, |i| i as f64));
    let second = save_run(&b, "run", &synthetic_run(5, 1.0, |i| 2.0 * i as f64));

    let report = Analyzer::new().compare_files(&[&first, &second]).unwrap();
    let names: Vec<&str> = report.runs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["run", "run-2"]);
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

#[test]
fn test_legacy_artifact_loads_and_analyzes() {
    let path = fixture("legacy_profiling_results.json");
    let result = TestResult::load(&path).unwrap();

    // no channel_count in this layout: one channel per source URL
    assert_eq!(result.test_config.channel_count, 3);
    assert_eq!(result.test_config.test_duration, 4.0);
    assert_eq!(result.test_config.hardware_accel, HwAccel::Auto);
    // offset-less boundaries are read as UTC
    assert_eq!(result.summary.test_start.to_rfc3339(), "2025-01-01T12:00:00.512345+00:00");
    assert!((result.summary.duration_secs() - 3.001865).abs() < 1e-9);
    assert_eq!(result.summary.total_errors, result.errors.len());

    let report = Analyzer::new().analyze_file(&path).unwrap();
    assert_eq!(report.stat(Metric::CpuPercent).count, 4);
    assert_eq!(report.stat(Metric::CpuPercent).max, 38.2);
    assert_eq!(report.stat(Metric::TotalFrames).max, 9.0);
    assert_eq!(report.series.len(), 4);
}

#[test]
fn test_legacy_artifact_compares_with_current_run() {
    let dir = TempDir::new().unwrap();
    let current = save_run(dir.path(), "current", &synthetic_run(6, 1.0, |i| 10.0 * i as f64));
    let legacy = fixture("legacy_profiling_results.json");

    let report = Analyzer::new().compare_files(&[&legacy, &current]).unwrap();
    assert!(report.excluded.is_empty());
    assert_eq!(report.runs.len(), 2);
    assert!(report.run("legacy_profiling_results").is_some());
}
