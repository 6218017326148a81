//! Video Pipeline Profiler - Main CLI Application
//!
//! Load-tests a video pipeline service with concurrent decode channels while
//! sampling host resources, and analyzes the resulting artifacts.

use clap::Parser;
use std::process;
use video_pipeline_profiler::{
    app::App,
    cli::Cli,
    config::EnvManager,
    error::{AppError, ErrorReporter},
    PKG_NAME, VERSION,
};

#[tokio::main]
async fn main() {
    // Set up better panic handling
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("This is a bug in {} v{}; please report it with the message above.", PKG_NAME, VERSION);
        process::exit(99);
    }));

    let cli = Cli::parse();
    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose || cli.debug);

    if let Err(message) = cli.validate() {
        let error = AppError::validation(message);
        reporter.report_error(&error);
        process::exit(error.exit_code());
    }

    if cli.debug {
        eprintln!("{} v{} ({})", PKG_NAME, VERSION, cli.command_name());
    }

    if let Err(e) = App::new(cli).run().await {
        reporter.report_error(&e);
        print_error_suggestions(&e);
        process::exit(e.exit_code());
    }
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) | AppError::Validation(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check your .env file format");
            eprintln!("  - API_BASE_URL must start with http:// or https://");
            eprintln!("  - Channel count must be between 1 and {}", video_pipeline_profiler::defaults::MAX_CHANNELS);
            eprintln!();
            eprintln!("{}", EnvManager::display_env_help());
        }
        AppError::Connectivity(_) => {
            eprintln!();
            eprintln!("Service troubleshooting:");
            eprintln!("  - Start the video pipeline service first");
            eprintln!("  - Verify --api-url points at it");
            eprintln!("  - Use --skip-health-check only if the health endpoint is unavailable");
        }
        AppError::Timeout(_) => {
            eprintln!();
            eprintln!("Timeout troubleshooting:");
            eprintln!("  - Increase --request-timeout");
            eprintln!("  - Reduce the channel count or raise --start-delay");
        }
        AppError::Artifact { .. } => {
            eprintln!();
            eprintln!("Artifact help:");
            eprintln!("  - Pass a JSON file written by `vpprof run`");
            eprintln!("  - Re-run the profiling test if the file was edited or truncated");
        }
        _ => {}
    }
}
