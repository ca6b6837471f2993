//! Binary entry point for ripple.
//!
//! This binary provides the CLI interface for cross-repository change triage.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use ripple::cli::{
    self, CheckArgs, cmd_check, cmd_config_show, cmd_history, cmd_ingest, cmd_registry_validate,
    cmd_similar,
};
use ripple::config::RippleConfig;
use ripple::observability::{self, InitOptions};
use ripple::services::TriagePipeline;
use ripple::storage::{JsonFileBackend, KnowledgeStore};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// Ripple - cross-repository change triage.
#[derive(Parser)]
#[command(name = "ripple")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "RIPPLE_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Knowledge base file (overrides the config file).
    #[arg(long, global = true)]
    knowledge_base: Option<PathBuf>,

    /// Relationship registry file (overrides the config file).
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Process one change notification end to end and print a JSON report.
    Ingest {
        /// Notification JSON file, or `-` for stdin.
        input: String,

        /// Replace the stored snapshot of an already recorded commit.
        #[arg(long)]
        reanalyze: bool,
    },

    /// Rank stored repositories by similarity to one repository.
    Similar {
        /// Repository name, e.g. `acme/billing-api`.
        repo: String,
    },

    /// Print a repository's pattern history.
    History {
        /// Repository name.
        repo: String,
    },

    /// Warn when staged changes duplicate patterns stored for other repositories.
    Check {
        /// Diff file, or `-` for stdin. Defaults to `git diff --cached`.
        diff: Option<String>,

        /// Repository being committed to. Defaults to the `origin` remote.
        #[arg(long)]
        repo: Option<String>,

        /// Exit non-zero when there are warnings.
        #[arg(long)]
        strict: bool,

        /// Maximum number of warnings (0 = unlimited).
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Relationship registry tools.
    Registry {
        /// Registry subcommand.
        #[command(subcommand)]
        action: RegistryAction,
    },

    /// Configuration tools.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Registry subcommands.
#[derive(Subcommand)]
enum RegistryAction {
    /// Parse a registry file and print its counts.
    Validate {
        /// Registry file. Defaults to the configured registry.
        path: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets redacted.
    Show,
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init_from_config(
        &config,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: false,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

fn load_config(cli: &Cli) -> ripple::Result<RippleConfig> {
    let mut config = RippleConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.knowledge_base {
        config = config.with_knowledge_base(path);
    }
    if let Some(path) = &cli.registry {
        config = config.with_registry(path);
    }
    Ok(config)
}

fn open_store(config: &RippleConfig) -> ripple::Result<KnowledgeStore> {
    KnowledgeStore::open(JsonFileBackend::new(&config.knowledge_base_path))
}

/// Runs the selected command.
async fn run_command(command: Commands, config: &RippleConfig) -> ripple::Result<ExitCode> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Ingest { input, reanalyze } => {
            let contents = cli::read_input(&input)?;
            let pipeline = TriagePipeline::from_config(config)?;
            cmd_ingest(&pipeline, &contents, reanalyze, &mut out).await?;
        },
        Commands::Similar { repo } => {
            let pipeline = TriagePipeline::from_config(config)?;
            cmd_similar(&pipeline, &repo, &mut out)?;
        },
        Commands::History { repo } => {
            cmd_history(&open_store(config)?, &repo, &mut out)?;
        },
        Commands::Check {
            diff,
            repo,
            strict,
            limit,
        } => {
            let args = CheckArgs { diff, repo, limit };
            let warnings = cmd_check(&open_store(config)?, &args, &mut out)?;
            if strict && warnings > 0 {
                let _ = out.flush();
                return Ok(ExitCode::FAILURE);
            }
        },
        Commands::Registry {
            action: RegistryAction::Validate { path },
        } => {
            let path = path.or_else(|| config.registry_path.clone());
            cmd_registry_validate(path.as_deref(), &mut out)?;
        },
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(config, &mut out)?,
    }

    let _ = out.flush();
    Ok(ExitCode::SUCCESS)
}
