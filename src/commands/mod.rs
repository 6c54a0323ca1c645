// Command routing
//
// Each subcommand group lives in its own file with a `handle_*` function;
// `handle_command` builds the local host context once and dispatches.

pub mod board;
pub mod install;
pub mod uninstall;

use crate::Commands;
use anyhow::Result;
use kubestrap::exec::LocalExecutor;
use kubestrap::platform::{HostEnv, classify};
use kubestrap::utils::{HttpDownloader, SystemNetwork};
use kubestrap::{ClusterBootstrap, Config, Status};

/// Wire the local host into a bootstrap coordinator and dispatch the command
pub fn handle_command(command: Commands, config: &Config) -> Result<Status> {
    let exec = LocalExecutor;
    let downloader = HttpDownloader::new(config, &exec)?;
    let network = SystemNetwork::new(&exec, config.paths.resolv_conf.clone());
    let host = classify(&HostEnv::detect(&exec), config);
    tracing::debug!(platform = %host.platform(), arch = host.arch.as_str(), "detected host");

    let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, config, host);

    let status = match command {
        Commands::Install { command } => install::handle_install(&bootstrap, command),
        Commands::Installed { tool } => {
            let installed = bootstrap.is_installed(&tool);
            println!("{}: {}", tool, if installed { "installed" } else { "not installed" });
            if installed {
                Status::Success
            } else {
                Status::Failed(kubestrap::FailureKind::Verification)
            }
        }
        Commands::Token => {
            let (token, status) = bootstrap.get_join_token();
            if status.is_success() {
                print!("{}", token);
            }
            status
        }
        Commands::Board { command } => board::handle_board(&bootstrap, command),
        Commands::Uninstall { command } => uninstall::handle_uninstall(&bootstrap, command),
    };

    Ok(status)
}
