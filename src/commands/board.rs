use clap::Subcommand;
use kubestrap::exec::CommandExecutor;
use kubestrap::utils::{Downloader, NetworkProbe};
use kubestrap::{ClusterBootstrap, Status};

#[derive(Subcommand, Clone)]
pub enum BoardCommands {
    /// Enable memory cgroups, pin a static IP and force 64-bit boot
    Prepare,
}

pub fn handle_board<E, D, N>(bootstrap: &ClusterBootstrap<'_, E, D, N>, command: BoardCommands) -> Status
where
    E: CommandExecutor,
    D: Downloader,
    N: NetworkProbe,
{
    match command {
        BoardCommands::Prepare => bootstrap.prepare_board(),
    }
}
