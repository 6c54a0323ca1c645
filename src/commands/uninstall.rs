use clap::Subcommand;
use kubestrap::exec::CommandExecutor;
use kubestrap::utils::{Downloader, NetworkProbe};
use kubestrap::{ClusterBootstrap, Status};

#[derive(Subcommand, Clone)]
pub enum UninstallCommands {
    /// Uninstall K3s (server or agent) from this node
    K3s,
}

pub fn handle_uninstall<E, D, N>(bootstrap: &ClusterBootstrap<'_, E, D, N>, command: UninstallCommands) -> Status
where
    E: CommandExecutor,
    D: Downloader,
    N: NetworkProbe,
{
    match command {
        UninstallCommands::K3s => bootstrap.uninstall_k3s(),
    }
}
