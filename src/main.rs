use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mediaminer::distributor::run_worker;
use mediaminer::{FileOutcome, Pipeline, PipelineConfig, ProcessLauncher, StageRegistry, WorkDistributor};

#[derive(Parser)]
#[command(name = "mediaminer")]
#[command(about = "Run a configurable detection pipeline over photos and videos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one file or every file under a directory
    Detect {
        /// Input file or directory
        #[arg(value_name = "INPUT")]
        input_path: PathBuf,

        /// Directory receiving the output tree
        #[arg(value_name = "OUTPUT_DIR")]
        output_dir: PathBuf,

        /// Pipeline document (YAML)
        #[arg(value_name = "PIPELINE")]
        pipeline_config: PathBuf,
    },

    /// Serve file paths from stdin for a parent `detect` run
    #[command(hide = true)]
    Worker {
        input_root: PathBuf,
        output_root: PathBuf,
        pipeline_config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // stdout belongs to the worker protocol, so logs always go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Detect {
            input_path,
            output_dir,
            pipeline_config,
        } => detect(&input_path, &output_dir, &pipeline_config),
        Command::Worker {
            input_root,
            output_root,
            pipeline_config,
        } => {
            let config = PipelineConfig::load(&pipeline_config)?;
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            run_worker(
                &config,
                &StageRegistry::builtin(),
                &input_root,
                &output_root,
                stdin.lock(),
                stdout.lock(),
            )
        }
    }
}

fn detect(input_path: &Path, output_dir: &Path, config_path: &Path) -> anyhow::Result<()> {
    let config = PipelineConfig::load(config_path)?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    if input_path.is_file() {
        let input_root = input_path.parent().unwrap_or(Path::new(""));
        let mut pipeline = Pipeline::from_config(&config, &StageRegistry::builtin(), input_root, output_dir)?;
        match pipeline.process_file(input_path)? {
            FileOutcome::Completed(summary) => {
                info!("Processed {} ({} frames)", input_path.display(), summary.frames);
                for (stage, output) in &summary.artifacts {
                    if let Some(file) = &output.file {
                        println!("{}: {}", stage, file.display());
                    }
                }
            }
            FileOutcome::Skipped => warn!("Nothing to do for {}", input_path.display()),
        }
        return Ok(());
    }

    if !input_path.is_dir() {
        bail!("input path {} does not exist", input_path.display());
    }

    // Children resolve paths on their own, so hand them absolute ones
    let input_root = std::path::absolute(input_path)?;
    let output_root = std::path::absolute(output_dir)?;
    let config_path = std::path::absolute(config_path)?;

    let launcher = ProcessLauncher::current_exe(&input_root, &output_root, &config_path)?;
    let summary = WorkDistributor::new(launcher, config.workers).distribute(&input_root)?;

    println!(
        "Processed {} files: {} completed, {} skipped, {} failed",
        summary.total(),
        summary.processed,
        summary.skipped,
        summary.failed
    );
    Ok(())
}
