//! Install commands

use clap::Subcommand;
use kubestrap::exec::CommandExecutor;
use kubestrap::utils::{Downloader, NetworkProbe};
use kubestrap::{ClusterBootstrap, Status, Tool};

#[derive(Subcommand, Clone)]
pub enum InstallCommands {
    /// Install k3s as the cluster master and save its join token
    Master {
        /// Run k3s on docker instead of containerd
        #[arg(long)]
        docker: bool,
    },
    /// Install k3s as a slave joining an existing master
    Slave {
        /// Join token printed by `kubestrap token` on the master
        #[arg(long)]
        token: String,
        /// Address of the master (e.g., 192.168.1.10)
        #[arg(long)]
        master_ip: String,
        /// Run k3s on docker instead of containerd
        #[arg(long)]
        docker: bool,
    },
    /// Install a cluster tool (k3s, k3d, kubectl, kind, minikube, microk8s)
    Tool {
        tool: String,
    },
}

pub fn handle_install<E, D, N>(bootstrap: &ClusterBootstrap<'_, E, D, N>, command: InstallCommands) -> Status
where
    E: CommandExecutor,
    D: Downloader,
    N: NetworkProbe,
{
    match command {
        InstallCommands::Master { docker } => bootstrap.install_as_master(docker),
        InstallCommands::Slave {
            token,
            master_ip,
            docker,
        } => bootstrap.install_as_slave(docker, &token, &master_ip),
        InstallCommands::Tool { tool } => match tool.parse::<Tool>() {
            Ok(tool) => bootstrap.install_tool(tool),
            Err(e) => {
                eprintln!("{}", e);
                Status::from(&e)
            }
        },
    }
}
