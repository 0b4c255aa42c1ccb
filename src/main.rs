mod anchor;
mod backup;
mod commands;
mod config;
mod defaults;
mod diagnostics;
mod error;
mod hasher;
mod merger;
mod orchestrator;
mod planner;
mod span;
mod types;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "medpatch", about = "Idempotent field patcher for the medchem drug card")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Log phase decisions at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up and patch the markup, script and data files
    Apply(Target),
    /// Show which files still need patching, without writing anything
    Status(Target),
}

/// Where the project lives and how it is configured.
#[derive(Args)]
struct Target {
    /// Config file (defaults to `<root>/.medpatch.toml` when present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Project root containing `medchem/`.
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Apply(t) => commands::apply(&t.root, t.config.as_deref()),
        Commands::Status(t) => commands::status(&t.root, t.config.as_deref()),
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_markdown(&diagnostics::render_error(&e));
            println!("FAILED: {e}");
            ExitCode::from(2)
        },
    };
}

/// Log to stderr; `RUST_LOG` overrides the level chosen by `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "medpatch=debug" } else { "medpatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
