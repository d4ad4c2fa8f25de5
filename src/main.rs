//! BatchScale CLI - batch image downscaler
//!
//! Scales every PNG/JPEG under a directory tree into a flat directory of
//! JPEGs, sequentially or with a bounded number of concurrent conversions.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use batchscale::config::ProcessingConfig;
use batchscale::parallel::{ProgressTracker, ProgressUpdate};
use batchscale::{
    destination, init_with_config, BatchReport, BatchResizer, BatchScaleError,
    CancellationSignal, ConcurrencyMode, Config, FileDiscovery,
};

/// BatchScale - batch image downscaler
#[derive(Parser)]
#[command(
    name = "batchscale",
    version,
    about = "Scale every PNG/JPEG under a directory into a flat directory of JPEGs",
    long_about = "BatchScale recursively discovers .png, .jpg and .jpeg files, scales each by \
                  a single factor (dimensions are truncated) and writes <name>.jpg into a flat \
                  destination directory. Ctrl-C cancels the running batch."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (.toml, .yaml or .yml)
    #[arg(short, long, global = true, value_name = "FILE", env = "BATCHSCALE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Scale every image under a source directory into a destination directory
    Resize {
        /// Source directory, searched recursively
        #[arg(short, long, value_name = "DIR")]
        input: PathBuf,

        /// Destination directory, created if missing
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Scale factor applied to width and height
        #[arg(short, long, value_name = "FACTOR")]
        scale: f64,

        /// Scheduling strategy (overrides the config file)
        #[arg(short, long, value_enum, value_name = "MODE")]
        mode: Option<CliMode>,

        /// Files converted at once in concurrent mode (default: logical CPUs)
        #[arg(short, long, value_name = "COUNT")]
        jobs: Option<usize>,

        /// Match extensions regardless of case
        #[arg(long)]
        ignore_case: bool,

        /// Remove every file in the destination before starting
        #[arg(long)]
        clean: bool,

        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every file below a directory, creating it when absent
    Clean {
        /// Directory to clean
        dest: PathBuf,
    },
    /// List the images a resize would pick up, in processing order
    Find {
        /// Source directory
        src: PathBuf,

        /// Match extensions regardless of case
        #[arg(long)]
        ignore_case: bool,
    },
    /// Generate example configuration file
    ExampleConfig {
        /// Output file path
        #[arg(short, long, default_value = "batchscale.toml")]
        output: PathBuf,
        /// Use YAML format instead of TOML
        #[arg(long)]
        yaml: bool,
    },
}

/// CLI-compatible concurrency mode
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliMode {
    Sequential,
    Concurrent,
}

impl From<CliMode> for ConcurrencyMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Sequential => ConcurrencyMode::Sequential,
            CliMode::Concurrent => ConcurrencyMode::Concurrent,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        let cancelled = e
            .downcast_ref::<BatchScaleError>()
            .is_some_and(BatchScaleError::is_cancelled);

        if cancelled {
            eprintln!("{}: {}", style("Cancelled").yellow().bold(), e);
            process::exit(130);
        }

        eprintln!("{}: {:#}", style("Error").red().bold(), e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if cli.quiet {
        config.logging.level = "error".to_string();
    } else if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    init_with_config(&config).context("Failed to initialize logging")?;
    if let Some(path) = &cli.config {
        info!("Loaded configuration from: {:?}", path);
    }

    match cli.command {
        Commands::Resize {
            input,
            output,
            scale,
            mode,
            jobs,
            ignore_case,
            clean,
            json,
        } => {
            let mut processing = config.processing.clone();
            if let Some(mode) = mode {
                processing.mode = mode.into();
            }
            if jobs.is_some() {
                processing.max_concurrent = jobs;
            }
            processing.case_insensitive_extensions |= ignore_case;

            let show_progress = !json && !cli.quiet;
            run_resize(&input, &output, scale, &processing, clean, json, show_progress).await
        }
        Commands::Clean { dest } => {
            let removed = destination::clean(&dest)?;
            if !cli.quiet {
                println!(
                    "{}: removed {} files from {}",
                    style("Cleaned").green().bold(),
                    removed,
                    dest.display()
                );
            }
            Ok(())
        }
        Commands::Find { src, ignore_case } => {
            let discovery = FileDiscovery::new()
                .case_insensitive(ignore_case || config.processing.case_insensitive_extensions);
            for path in discovery.find_images(&src)? {
                println!("{}", path.display());
            }
            Ok(())
        }
        Commands::ExampleConfig { output, yaml } => generate_example_config(&output, yaml),
    }
}

async fn run_resize(
    input: &Path,
    output: &Path,
    scale: f64,
    processing: &ProcessingConfig,
    clean: bool,
    json: bool,
    show_progress: bool,
) -> anyhow::Result<()> {
    if processing.max_concurrent == Some(0) {
        bail!("--jobs must be greater than 0");
    }

    if clean {
        let removed = destination::clean(output)?;
        info!("Cleaned {} files from {:?}", removed, output);
    }

    let resizer = BatchResizer::from_config(processing);
    let signal = CancellationSignal::new();

    let ctrl_c = {
        let signal = signal.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling batch");
                signal.cancel();
            }
        })
    };

    let progress = show_progress.then(|| spawn_progress_bar(resizer.progress()));

    let result = resizer.resize_images(input, output, scale, &signal).await;
    ctrl_c.abort();

    if let Some(handle) = progress {
        // The final update was published before resize_images returned
        if tokio::time::timeout(Duration::from_secs(1), handle).await.is_err() {
            debug!("Progress display did not settle");
        }
    }

    match result {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let failure = serde_json::json!({
                    "state": resizer.state(),
                    "progress": resizer.progress().get_state(),
                    "error": e.user_message(),
                });
                println!("{}", serde_json::to_string_pretty(&failure)?);
            }
            Err(e.into())
        }
    }
}

/// Render progress updates until the batch finishes
fn spawn_progress_bar(tracker: &Arc<ProgressTracker>) -> tokio::task::JoinHandle<()> {
    let mut updates = tracker.subscribe();

    tokio::spawn(async move {
        let pb = ProgressBar::new(0);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}, {eta}) {msg}")
        {
            pb.set_style(bar_style.progress_chars("#>-"));
        }

        loop {
            match updates.recv().await {
                Ok(ProgressUpdate::Started { total_files, mode }) => {
                    pb.set_length(total_files as u64);
                    pb.set_message(format!("{} mode", mode));
                }
                Ok(ProgressUpdate::FileStarted { source }) => {
                    let name = source.file_name().unwrap_or_default().to_string_lossy().into_owned();
                    pb.set_message(name);
                }
                Ok(ProgressUpdate::FileCompleted { .. }) => pb.inc(1),
                Ok(ProgressUpdate::FileFailed { source, error }) => {
                    pb.inc(1);
                    if !error.contains("cancelled") {
                        pb.println(format!("{} {}: {}", style("✗").red(), source.display(), error));
                    }
                }
                Ok(ProgressUpdate::Finished { .. }) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => debug!("Progress display skipped {} updates", skipped),
            }
        }

        pb.finish_and_clear();
    })
}

/// Generate example configuration file
fn generate_example_config(output_path: &Path, use_yaml: bool) -> anyhow::Result<()> {
    let path = if use_yaml {
        output_path.with_extension("yaml")
    } else {
        output_path.to_path_buf()
    };

    Config::default().to_file(&path)?;

    let format = if use_yaml { "YAML" } else { "TOML" };
    println!(
        "{}: Generated example {} configuration: {}",
        style("Success").green().bold(),
        format,
        path.display()
    );

    Ok(())
}

/// Print processing summary
fn print_summary(report: &BatchReport) {
    println!();
    println!("{}", style("Batch Summary:").bold());
    println!("  {}: {}", style("Mode").blue(), report.mode);
    println!("  {}: {}", style("Discovered").blue(), report.discovered);
    println!("  {}: {}", style("Converted").green(), report.converted());
    println!("  {}: {}", style("Destination").blue(), report.destination.display());
    println!("  {}: {:.2}s", style("Duration").blue(), report.elapsed.as_secs_f64());

    if report.converted() > 0 {
        println!(
            "  {}: {:.2}MB",
            style("Written").cyan(),
            report.total_bytes_written() as f64 / 1024.0 / 1024.0
        );
        println!("  {}: {:.1} files/sec", style("Speed").cyan(), report.files_per_second());
    }
}
