use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hireloop_common::observability::{init_logging, LogConfig};
use hireloop_config::{HireloopConfig, HireloopConfigLoader};
use hireloop_runtime::HireloopRuntime;
use std::path::PathBuf;
use std::time::Duration;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "hireloop", version, about = "Autonomous job search and application loop")]
struct Cli {
    /// Config file; defaults to the per-user hireloop.yaml when present.
    #[arg(long, short, global = true, env = "HIRELOOP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the loop and stream its status until it ends or Ctrl-C.
    Run(RunArgs),
    /// Store the completion-service credential.
    SetCredential {
        key: String,
    },
    /// Store the applicant profile from a JSON file.
    SetProfile {
        file: PathBuf,
        /// Plain-text resume to attach to the profile.
        #[arg(long)]
        resume: Option<PathBuf>,
    },
    /// Store search preferences from a JSON file.
    SetPreferences {
        file: PathBuf,
    },
    /// Print persisted counters.
    Stats,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Minimum deep-screen confidence required to apply.
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Seconds between applications.
    #[arg(long)]
    pub apply_delay: Option<u64>,
    /// Seconds between loop iterations.
    #[arg(long)]
    pub search_delay: Option<u64>,
    #[arg(long)]
    pub max_applications: Option<u32>,
    /// Submit applications instead of rehearsing them.
    #[arg(long)]
    pub live: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<HireloopConfig> {
    let mut loader = HireloopConfigLoader::new();
    loader = match (path, HireloopConfigLoader::default_path()) {
        (Some(path), _) => loader.with_file(path),
        (None, Some(default)) => loader.with_optional_file(default),
        (None, None) => loader,
    };
    let config = loader.load().context("failed to load configuration")?;
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let log_path = init_logging(LogConfig {
        app_name: "hireloop",
        log_dir: config.logging.dir.clone(),
        emit_stderr: config.logging.stderr,
        format: config.logging.format,
        default_filter: config.logging.filter.clone(),
    })?;
    tracing::info!(log = %log_path.display(), "app.start");

    let runtime = HireloopRuntime::new()?;
    let handle = runtime.handle();

    let result = runtime.block_on(async move {
        match cli.command {
            Command::Run(args) => commands::run(config, args, handle).await,
            Command::SetCredential { key } => commands::set_credential(&config, &key).await,
            Command::SetProfile { file, resume } => {
                commands::set_profile(&config, &file, resume.as_deref()).await
            }
            Command::SetPreferences { file } => commands::set_preferences(&config, &file).await,
            Command::Stats => commands::stats(&config).await,
        }
    });

    runtime.shutdown(Duration::from_secs(5));
    result
}
