//! Route Harvest - command line entry point
//!
//! Reads the configured KML route files concurrently, prints every coordinate
//! as it arrives and finishes with a per-route tally. A failing file is
//! reported but does not stop the tally of the others.

mod logging;
mod metadata;
mod report;
mod settings;

use report::SummaryFormat;
use route_harvest_lib::Pipeline;
use settings::Settings;
use std::io::Write;
use std::process::ExitCode;

fn main() -> ExitCode {
    let _logging: logging::LoggingGuard = logging::setup_logging();
    metadata::log_version_info();

    let settings = Settings::from_cli();
    let config = settings.config();
    tracing::debug!(?config, "configuration");

    let pipeline = match Pipeline::new(config, settings.sources()) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("Invalid route list: {e}");
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {e}");
            return ExitCode::from(2);
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let quiet = settings.quiet;

    let report = {
        profiling::scope!("harvest");
        runtime.block_on(pipeline.run_with(|tagged| {
            if !quiet {
                // A closed stdout is not worth aborting the harvest for
                let _ = writeln!(out, "{}", tagged.coordinate);
            }
        }))
    };

    if let Some(error) = &report.error {
        tracing::error!(source = error.source_key(), "Harvest incomplete: {error}");
    }

    let format = if settings.json {
        SummaryFormat::Json
    } else {
        SummaryFormat::Text
    };
    if let Err(e) = report::write_summary(&mut out, &report, format).and_then(|()| out.flush()) {
        tracing::error!("Failed to write summary: {e}");
        return ExitCode::FAILURE;
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
