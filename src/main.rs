//! treesync CLI - copy, move, sync or mirror a directory tree

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use treesync::config::{load_preset, save_preset, CliArgs, JobOptions, OutputFormat};
use treesync::core::{TransferEngine, TransferJob, TransferReport};
use treesync::progress::ProgressReporter;

fn main() -> ExitCode {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    let job = match build_job(&args) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let report = execute(&args, &job);

    if let Err(e) = print_report(&args, &report) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_logging(args: &CliArgs) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Preset (if any), then flags, then the job itself
fn build_job(args: &CliArgs) -> anyhow::Result<TransferJob> {
    let base = match &args.preset {
        Some(path) => load_preset(path).with_context(|| format!("loading preset {}", path.display()))?,
        None => JobOptions::default(),
    };

    let options = JobOptions::from_cli(args, base).context("invalid command line")?;

    if let Some(path) = &args.save_preset {
        save_preset(path, &options).with_context(|| format!("saving preset {}", path.display()))?;
        tracing::info!("saved preset to {}", path.display());
    }

    TransferJob::with_options(&args.source, &args.destination, options).context("invalid job")
}

fn execute(args: &CliArgs, job: &TransferJob) -> TransferReport {
    let text = args.output_format == OutputFormat::Text;

    if job.dry_run && text && !args.quiet {
        println!("=== Dry Run Mode ===");
        println!("No files will be changed.");
        println!();
    }

    let mut progress = if args.quiet || !job.compute_progress {
        ProgressReporter::disabled()
    } else {
        ProgressReporter::new()
    };

    let engine = TransferEngine::new();
    let report = engine.run(job, &mut |message: &str, percent: Option<f64>| {
        progress.update(message, percent)
    });

    if report.success {
        progress.finish_success(&format!("{} complete", job.mode));
    } else {
        progress.finish_error(&format!("{} finished with errors", job.mode));
    }

    report
}

fn print_report(args: &CliArgs, report: &TransferReport) -> anyhow::Result<()> {
    match args.output_format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).context("serializing report")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            if !args.quiet {
                report.print_summary();
            }
        }
    }
    Ok(())
}
