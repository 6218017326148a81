//! Main application orchestration and execution

use crate::{
    aggregator::{finalize_snapshot, RunWindow},
    cli::{AnalyzeArgs, Cli, Command, CompareArgs, RunArgs},
    client::{HttpPipelineClient, PipelineClient},
    config::{display_config_summary, load_config, validate_config, EnvManager},
    error::{AppError, Result},
    log_debug, log_info, log_warn,
    logging::LoggerFactory,
    models::{Config, TestConfig, TestResult},
    monitor::{unix_now, HostSampler, MetricsMonitor, SampleCallback, SysinfoSampler},
    orchestrator::{ChannelOrchestrator, StopSummary},
    output::{report_path, write_report, OutputFormatter, OutputFormatterFactory},
    stats::Analyzer,
    store::TelemetryStore,
    types::RunOutcome,
};
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// What a finished profiling run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: TestResult,
    pub outcome: RunOutcome,
    pub stop: StopSummary,
    /// Where the artifact was written
    pub artifact: PathBuf,
}

/// One profiling run: orchestrator and monitor side by side for the test
/// duration, then an orderly stop and a saved artifact.
pub struct ProfilingSession<S: HostSampler> {
    config: Config,
    client: Arc<dyn PipelineClient>,
    sampler: S,
    progress: Option<SampleCallback>,
}

impl<S: HostSampler + 'static> ProfilingSession<S> {
    pub fn new(config: Config, client: Arc<dyn PipelineClient>, sampler: S) -> Self {
        Self {
            config,
            client,
            sampler,
            progress: None,
        }
    }

    /// Called with every sample the monitor appends
    pub fn on_progress(mut self, callback: SampleCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Run until the configured duration elapses or `interrupt` resolves.
    /// An interrupted run still stops every channel and writes its artifact.
    pub async fn run<F>(self, interrupt: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let factory = LoggerFactory::new(self.config.clone());
        let logger = factory.create_logger("RUN").await;
        let service_logger = factory.create_service_logger().await;
        let error_logger = factory.create_error_logger().await;
        let mut perf = factory.create_performance_logger().await;

        let test = Arc::new(self.config.test.clone());
        logger.add_context_field("channels".to_string(), test.channel_count).await;

        perf.start_timing("profiling_run").await;
        let started = Utc::now();

        let store = Arc::new(TelemetryStore::new());
        let orchestrator =
            ChannelOrchestrator::start(test.clone(), self.client, store.clone(), service_logger.clone()).await?;
        log_info!(
            logger,
            "Launching {} channels, {:.1}s apart",
            test.channel_count,
            test.channel_start_delay
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut monitor = MetricsMonitor::new(store.clone(), self.sampler, test.monitor_period(), service_logger);
        if let Some(progress) = self.progress {
            monitor = monitor.on_sample(progress);
        }
        let monitor = monitor.spawn(shutdown_rx);

        let outcome = tokio::select! {
            _ = tokio::time::sleep(test.duration()) => RunOutcome::Completed,
            _ = interrupt => RunOutcome::Cancelled,
        };
        let ended = Utc::now();
        if outcome == RunOutcome::Cancelled {
            log_warn!(logger, "Run interrupted after {:.1}s", (ended - started).num_milliseconds() as f64 / 1000.0);
        }

        let _ = shutdown.send(true);
        if let Err(e) = monitor.await {
            let error = AppError::internal(format!("monitor task ended abnormally: {}", e));
            error_logger.log_error(&error, Some("stopping monitor"), None).await;
        }

        let stop = orchestrator.stop_all().await;
        log_info!(
            logger,
            "Channels stopped: {} stopped, {} cancelled, {} failed",
            stop.stopped,
            stop.cancelled,
            stop.failed
        );

        let channels = orchestrator.reports().await;
        let result = finalize_snapshot(&test, store.snapshot().await, channels, RunWindow::new(started, ended));

        let artifact = PathBuf::from(&test.output_file);
        if let Err(e) = result.save(&artifact) {
            error_logger.log_error(&e, Some("saving result artifact"), None).await;
            return Err(e);
        }
        log_debug!(logger, "Artifact written to {}", artifact.display());

        perf.end_timing("profiling_run").await;
        perf.log_run_summary(&result.summary).await;

        Ok(RunReport {
            result,
            outcome,
            stop,
            artifact,
        })
    }
}

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
}

impl App {
    /// Create a new application instance with CLI configuration
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Dispatch the selected subcommand
    pub async fn run(self) -> Result<()> {
        match self.cli.command.clone() {
            Command::Run(args) => self.run_profile(&args).await,
            Command::Analyze(args) => self.analyze(&args),
            Command::Compare(args) => self.compare(&args),
            Command::Health(_) => self.health().await,
        }
    }

    /// Output settings for commands that never talk to the service
    fn offline_config(&self) -> Config {
        Config {
            enable_color: self.cli.use_colors(),
            verbose: self.cli.verbose,
            debug: self.cli.debug,
            ..Config::default()
        }
    }

    async fn run_profile(&self, args: &RunArgs) -> Result<()> {
        let config = load_config(self.cli.clone())?;
        let warnings = validate_config(&config)?;
        let formatter: Arc<dyn OutputFormatter> =
            Arc::from(OutputFormatterFactory::create_formatter(config.enable_color, config.verbose));

        println!("{}", formatter.format_header(&format!("Video Pipeline Profiler v{}", crate::VERSION))?);
        if config.debug {
            println!("\nConfiguration Summary:");
            println!("{}", display_config_summary(&config));
        }
        if config.verbose || config.debug {
            if let Some(problems) = EnvManager::check_env_file(Path::new(".env"))? {
                for problem in problems {
                    println!("{}", formatter.format_warning(&format!(".env {}", problem))?);
                }
            }
        }
        if !warnings.is_empty() {
            println!("\nConfiguration Warnings:");
            for warning in &warnings {
                println!("  {}", warning.format(config.enable_color));
            }
        }

        let factory = LoggerFactory::new(config.clone());
        let client = HttpPipelineClient::from_config(&config.test, factory.create_service_logger().await)?;
        if !args.skip_health_check {
            check_health(&client, &config.test, &factory).await?;
            println!("{}", formatter.format_success(&format!("Service reachable at {}", config.test.api_base_url))?);
        }

        describe_run(&config.test);

        let origin = unix_now();
        let progress = formatter.clone();
        let session = ProfilingSession::new(config.clone(), Arc::new(client), SysinfoSampler::new())
            .on_progress(Box::new(move |sample| println!("{}", progress.format_progress(sample, origin))));

        let report = session.run(interrupted()).await?;

        println!();
        if report.outcome == RunOutcome::Cancelled {
            println!("{}", formatter.format_warning("Run interrupted; partial results were saved")?);
        }
        println!("{}", formatter.format_run_summary(&report.result)?);
        println!(
            "{}",
            formatter.format_success(&format!("Results saved to {}", report.artifact.display()))?
        );
        println!("Analyze with: vpprof analyze {}", report.artifact.display());

        Ok(())
    }

    fn analyze(&self, args: &AnalyzeArgs) -> Result<()> {
        let config = self.offline_config();
        let formatter = OutputFormatterFactory::create_formatter(config.enable_color, config.verbose);
        let analyzer = Analyzer::new();

        let report = analyzer.analyze_file(&args.file)?;
        println!("{}", formatter.format_header(&format!("Analysis of {}", args.file.display()))?);
        println!("{}", formatter.format_analysis(&report)?);

        if !args.no_report {
            let path = args.report.clone().unwrap_or_else(|| report_path(&args.file));
            let written = write_report(&report, &path)?;
            println!("{}", formatter.format_success(&format!("Report written to {}", written.display()))?);
        }

        if let Some(json_path) = &args.json {
            write_json(json_path, &analyzer.export_json(&report)?)?;
            println!("{}", formatter.format_success(&format!("Analysis exported to {}", json_path.display()))?);
        }

        Ok(())
    }

    fn compare(&self, args: &CompareArgs) -> Result<()> {
        let config = self.offline_config();
        let formatter = OutputFormatterFactory::create_formatter(config.enable_color, config.verbose);
        let analyzer = Analyzer::new();

        let report = analyzer.compare_files(&args.files)?;
        for excluded in &report.excluded {
            eprintln!("{}", formatter.format_warning(&format!("Skipped {}", excluded))?);
        }
        println!("{}", formatter.format_header(&format!("Comparison of {} runs", report.runs.len()))?);
        println!("{}", formatter.format_comparison(&report)?);

        if let Some(json_path) = &args.json {
            write_json(json_path, &analyzer.export_json(&report)?)?;
            println!("{}", formatter.format_success(&format!("Comparison exported to {}", json_path.display()))?);
        }

        Ok(())
    }

    async fn health(&self) -> Result<()> {
        let config = load_config(self.cli.clone())?;
        let formatter = OutputFormatterFactory::create_formatter(config.enable_color, config.verbose);
        let factory = LoggerFactory::new(config.clone());
        let client = HttpPipelineClient::from_config(&config.test, factory.create_service_logger().await)?;

        check_health(&client, &config.test, &factory).await?;
        println!("{}", formatter.format_success(&format!("Service healthy at {}", config.test.api_root()))?);
        Ok(())
    }
}

/// Pre-flight health check; an unreachable service is fatal
async fn check_health(client: &dyn PipelineClient, test: &TestConfig, factory: &LoggerFactory) -> Result<()> {
    match client.health().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let e = match e {
                e @ (AppError::Timeout(_) | AppError::Connectivity(_)) => e,
                other => AppError::connectivity(format!("{} ({})", test.api_base_url, other)),
            };
            factory
                .create_error_logger()
                .await
                .log_error(&e, Some("health check"), None)
                .await;
            Err(e)
        }
    }
}

fn describe_run(test: &TestConfig) {
    println!(
        "\nStarting {} channel(s) for {:.0}s against {} (start delay {:.1}s, {} fps, hw accel {})",
        test.channel_count,
        test.test_duration,
        test.api_base_url,
        test.channel_start_delay,
        test.fps,
        test.hardware_accel
    );
    println!("Press Ctrl-C to stop early; partial results are still saved.\n");
}

/// Resolves on Ctrl-C. Without signal support it never resolves.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn write_json(path: &Path, json: &str) -> Result<()> {
    std::fs::write(path, json).map_err(|e| AppError::io(format!("Failed to write {}: {}", path.display(), e)))
}
