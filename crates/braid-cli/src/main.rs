#![forbid(unsafe_code)]

mod cmd;
mod output;

use braid_core::ErrorCode;
use braid_core::config::resolve_config;
use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "braid: rank fusion over retrieval runs",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Read fusion settings from this file instead of `./braid.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Fuse recorded retrieval runs",
        long_about = "Combine recorded result lists from several retrievers with a union, \
                      intersection or vote, optionally enriching the fused hits from a \
                      document map.",
        after_help = "EXAMPLES:\n    # Union of two runs\n    braid fuse --query rust bm25.json dense.json\n\n\
                      # Documents every run agrees on, top 5\n    braid fuse -s intersection -q rust -k 5 bm25.json dense.json\n\n\
                      # Vote, then attach full documents\n    braid fuse -s vote -q rust --map docs.json bm25.json dense.json\n\n\
                      # Machine-readable output\n    braid fuse -q rust bm25.json dense.json --json"
    )]
    Fuse(cmd::fuse::FuseArgs),

    #[command(
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    braid completions bash\n\n    # Generate zsh completions\n    braid completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("BRAID_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "braid=debug,info"
        } else {
            "braid=info,warn"
        })
    });

    let format = env::var("BRAID_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Fuse(ref args) => {
            let project_root = env::current_dir()?;
            let config = match resolve_config(&project_root, cli.config.as_deref(), cli.json) {
                Ok(config) => config,
                Err(err) => {
                    let mode = if cli.json {
                        OutputMode::Json
                    } else {
                        OutputMode::Text
                    };
                    render_error(mode, &CliError::with_code(&err, ErrorCode::ConfigParseError))?;
                    std::process::exit(1);
                }
            };
            let output = OutputMode::from_resolved(&config.resolved_output);

            if let Err(err) = cmd::fuse::run_fuse(args, &config, output) {
                render_error(output, &CliError::from_error(&err))?;
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
