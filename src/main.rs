mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::board::BoardCommands;
use commands::install::InstallCommands;
use commands::uninstall::UninstallCommands;
use kubestrap::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kubestrap")]
#[command(about = "Bootstrap k3s clusters and Kubernetes tooling, including Raspberry Pi nodes", long_about = None)]
#[command(version)]
struct Cli {
    /// Show debug logs on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    /// Config file (default: ~/.config/kubestrap/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install k3s as master or slave, or any supported cluster tool
    Install {
        #[command(subcommand)]
        command: InstallCommands,
    },
    /// Check whether a tool is installed (k3s, k3d, kubectl, kind, minikube, microk8s)
    Installed {
        tool: String,
    },
    /// Print the join token of this master
    Token,
    /// Raspberry Pi board preparation
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },
    /// Remove an installed cluster runtime
    Uninstall {
        #[command(subcommand)]
        command: UninstallCommands,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let status = commands::handle_command(cli.command, &config)?;
    if !status.is_success() {
        eprintln!("kubestrap: {}", status);
    }
    std::process::exit(status.exit_code(&config));
}
