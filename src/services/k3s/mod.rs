//! Cluster bootstrap: master and slave installs of k3s
//!
//! Entry points return a [`Status`]; errors from the board preparer, the
//! strategy resolver and the token lifecycle stop at this boundary.
//! Nothing here guards against re-entry; call [`ClusterBootstrap::is_installed`]
//! first when that matters. Concurrent runs on one host are unsafe.

pub mod maintenance;
pub mod token;

use crate::board::{BoardPreparer, BoardProfile, memory_cgroup_enabled};
use crate::config::Config;
use crate::error::{BootstrapError, Status};
use crate::exec::CommandExecutor;
use crate::platform::HostInfo;
use crate::services::strategy::{InstallEnv, StrategyResolver, ToolSpec, verify_installed};
use crate::services::tools::{Tool, tool_spec};
use crate::utils::progress;
use crate::utils::string::first_token;
use crate::utils::{Downloader, NetworkProbe};

pub const ENV_KUBECONFIG_MODE: &str = "K3S_KUBECONFIG_MODE";
pub const ENV_FORCE_DOCKER: &str = "K3S_FORCE_INSTALL_DOCKER";
pub const ENV_TOKEN: &str = "K3S_TOKEN";
pub const ENV_URL: &str = "K3S_URL";
pub const ENV_NODE_NAME: &str = "K3S_NODE_NAME";
pub const DOCKER_ARG: &str = "--docker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Master,
    Slave,
}

/// State of the host after board preparation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct NodeState {
    node_name: Option<String>,
    reboot_required: bool,
}

pub struct ClusterBootstrap<'a, E, D, N>
where
    E: CommandExecutor,
    D: Downloader,
    N: NetworkProbe,
{
    exec: &'a E,
    downloader: &'a D,
    network: &'a N,
    config: &'a Config,
    host: HostInfo,
}

impl<'a, E, D, N> ClusterBootstrap<'a, E, D, N>
where
    E: CommandExecutor,
    D: Downloader,
    N: NetworkProbe,
{
    pub fn new(exec: &'a E, downloader: &'a D, network: &'a N, config: &'a Config, host: HostInfo) -> Self {
        Self {
            exec,
            downloader,
            network,
            config,
            host,
        }
    }

    /// Install this node as a cluster master and save its join token
    pub fn install_as_master(&self, force_alt_runtime: bool) -> Status {
        progress::banner("Install k3s (master)");

        let state = match self.prepare_node() {
            Ok(state) => state,
            Err(e) => return failed(e),
        };
        if state.reboot_required {
            return reboot_required();
        }

        let env = self.install_env(NodeRole::Master, force_alt_runtime, state.node_name.as_deref());
        if let Err(e) = self.install_k3s(&env) {
            return failed(e);
        }

        match progress::report("Token status", token::save_join_token(self.exec, self.config)) {
            Ok(_) => Status::Success,
            Err(e) => {
                tracing::warn!(error = %e, "k3s is installed but the join token is unavailable");
                Status::InstalledTokenUnavailable
            }
        }
    }

    /// Install this node as a slave joining the master at `master_ip`
    pub fn install_as_slave(&self, force_alt_runtime: bool, token: &str, master_ip: &str) -> Status {
        let (token, master_ip) = (token.trim(), master_ip.trim());
        if token.is_empty() || master_ip.is_empty() {
            return failed(BootstrapError::Validation(
                "a slave install needs both the master token and the master ip".to_string(),
            ));
        }

        progress::banner("Install k3s (slave)");

        let state = match self.prepare_node() {
            Ok(state) => state,
            Err(e) => return failed(e),
        };
        if state.reboot_required {
            return reboot_required();
        }

        let mut env = self.install_env(NodeRole::Slave, force_alt_runtime, state.node_name.as_deref());
        env.set(ENV_TOKEN, token);
        env.set(ENV_URL, self.config.join_url(master_ip));

        match self.install_k3s(&env) {
            Ok(()) => Status::Success,
            Err(e) => failed(e),
        }
    }

    /// Install any catalogue tool with its own strategy chain
    pub fn install_tool(&self, tool: Tool) -> Status {
        if tool == Tool::K3s {
            return self.install_as_master(false);
        }
        progress::banner(&format!("Install {}", tool));

        let result = self.spec_for(tool).and_then(|spec| {
            self.resolver()
                .resolve(&spec, &InstallEnv::default())
                .map(|_| ())
        });
        match progress::report(&format!("{} status", tool), result) {
            Ok(()) => Status::Success,
            Err(e) => failed(e),
        }
    }

    /// Whether `tool` verifies on this host. Unknown tools and tools with no
    /// install table for this platform are reported as not installed.
    pub fn is_installed(&self, tool: &str) -> bool {
        let Ok(tool) = tool.parse::<Tool>() else {
            tracing::debug!(tool, "unknown tool");
            return false;
        };
        match tool_spec(tool, self.host.platform(), self.config) {
            Some(spec) => verify_installed(self.exec, &spec),
            None => false,
        }
    }

    /// Join token as written by the master, byte for byte
    pub fn join_token(&self) -> Result<String, BootstrapError> {
        token::read_join_token(self.exec, self.config)
    }

    pub fn get_join_token(&self) -> (String, Status) {
        match self.join_token() {
            Ok(token) => (token, Status::Success),
            Err(e) => {
                let status = failed(e);
                (String::new(), status)
            }
        }
    }

    /// Run board preparation on its own
    pub fn prepare_board(&self) -> Status {
        if !self.host.is_raspberry_pi {
            return failed(BootstrapError::UnsupportedPlatform {
                tool: "board preparation".to_string(),
                platform: self.host.platform().to_string(),
            });
        }
        progress::banner("Prepare Raspberry Pi board");
        let profile = BoardProfile::derive(self.config, &self.host);
        Status::from(BoardPreparer::new(self.exec, self.network, self.config).prepare(&profile))
    }

    pub fn uninstall_k3s(&self) -> Status {
        progress::banner("Uninstall K3s");
        match maintenance::uninstall(self.exec) {
            Ok(removed) => {
                if removed {
                    println!();
                    println!("✓ K3s uninstalled successfully!");
                }
                Status::Success
            }
            Err(e) => failed(e),
        }
    }

    /// Board preparation and cgroup check on Pi; node name lookup elsewhere
    fn prepare_node(&self) -> Result<NodeState, BootstrapError> {
        if !self.host.is_raspberry_pi {
            return Ok(NodeState {
                node_name: self.saved_node_name(),
                reboot_required: false,
            });
        }

        let profile = BoardProfile::derive(self.config, &self.host);
        let prepared = BoardPreparer::new(self.exec, self.network, self.config).prepare(&profile)?;

        let cgroups_active = match self.exec.read_file(&self.config.paths.cgroups) {
            Ok(content) => memory_cgroup_enabled(&content),
            Err(e) => {
                tracing::warn!(error = %e, "cannot read cgroup table, assuming memory cgroup is active");
                true
            }
        };
        progress::step("Memory cgroup status", cgroups_active);

        Ok(NodeState {
            node_name: Some(prepared.static_ip.hostname),
            reboot_required: !cgroups_active,
        })
    }

    fn saved_node_name(&self) -> Option<String> {
        let path = &self.config.paths.node_name_file;
        if !self.exec.file_exists(path) {
            return None;
        }
        self.exec
            .read_file(path)
            .ok()
            .and_then(|content| first_token(&content))
    }

    fn install_env(&self, role: NodeRole, force_alt_runtime: bool, node_name: Option<&str>) -> InstallEnv {
        let mut env = InstallEnv::default();
        env.set(ENV_KUBECONFIG_MODE, self.config.kubeconfig_mode.as_str());
        env.set(ENV_FORCE_DOCKER, if force_alt_runtime { "1" } else { "0" });
        if force_alt_runtime {
            env.args.push(DOCKER_ARG.to_string());
        }
        if let Some(name) = node_name {
            env.set(ENV_NODE_NAME, name);
        }
        tracing::debug!(?role, vars = ?env.vars, args = ?env.args, "k3s install environment");
        env
    }

    fn install_k3s(&self, env: &InstallEnv) -> Result<(), BootstrapError> {
        let spec = self.spec_for(Tool::K3s)?;
        let result = self.resolver().resolve(&spec, env).map(|_| ());
        progress::report("K3s status", result)
    }

    fn spec_for(&self, tool: Tool) -> Result<ToolSpec, BootstrapError> {
        tool_spec(tool, self.host.platform(), self.config).ok_or_else(|| BootstrapError::UnsupportedPlatform {
            tool: tool.to_string(),
            platform: self.host.platform().to_string(),
        })
    }

    fn resolver(&self) -> StrategyResolver<'_, E, D> {
        StrategyResolver::new(self.exec, self.downloader, self.config, self.host.arch)
    }
}

fn failed(e: BootstrapError) -> Status {
    tracing::error!(error = %e, "operation failed");
    Status::from(&e)
}

fn reboot_required() -> Status {
    println!();
    println!("Boot directives were updated but the memory cgroup is not active yet.");
    println!("Reboot the board and run the install again.");
    Status::RebootRequired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::platform::{Arch, OsFamily};
    use crate::testing::{MockExecutor, StubDownloader, StubNetwork};

    const TOKEN_FILE: &str = "/var/lib/rancher/k3s/server/node-token";
    const TOKEN_SAVE: &str = "~/your_master_token.txt";
    const TOKEN: &str = "K10f3a9c2d1::server:8b7e6d5c4b3a\n";
    const CGROUPS_ON: &str = "#subsys_name\thierarchy\tnum_cgroups\tenabled\nmemory\t0\t80\t1\n";
    const CGROUPS_OFF: &str = "#subsys_name\thierarchy\tnum_cgroups\tenabled\nmemory\t0\t80\t0\n";

    fn linux() -> HostInfo {
        HostInfo {
            os_family: OsFamily::Linux,
            is_raspberry_pi: false,
            arch: Arch::Amd64,
            node_name: "devbox".to_string(),
        }
    }

    fn pi() -> HostInfo {
        HostInfo {
            os_family: OsFamily::Linux,
            is_raspberry_pi: true,
            arch: Arch::Arm64,
            node_name: "raspberrypi".to_string(),
        }
    }

    /// Host with no package managers where the k3s script installs cleanly
    fn script_host() -> MockExecutor {
        MockExecutor::new()
            .status("chmod", 0)
            .status("/tmp/k3s_install.sh", 0)
            .status("k3s --version", 0)
    }

    fn pi_host(cgroups: &str) -> MockExecutor {
        script_host()
            .file("/boot/cmdline.txt", "console=serial0,115200 root=/dev/mmcblk0p2 rootwait\n")
            .file("/boot/config.txt", "dtparam=audio=on\n")
            .file("/etc/os-release", "ID=ubuntu\nID_LIKE=debian\n")
            .file("/proc/cgroups", cgroups)
            .status("apt-get", 0)
    }

    fn env_of(exec: &MockExecutor, line: &str) -> Vec<(String, String)> {
        exec.find(line).unwrap().env
    }

    fn value<'v>(env: &'v [(String, String)], key: &str) -> Option<&'v str> {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_slave_requires_token_and_master_ip() {
        let exec = script_host();
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, linux());

        let expected = Status::Failed(FailureKind::Validation);
        assert_eq!(bootstrap.install_as_slave(false, "", ""), expected);
        assert_eq!(bootstrap.install_as_slave(false, "K10token", ""), expected);
        assert_eq!(bootstrap.install_as_slave(false, "", "10.0.0.2"), expected);
        assert_eq!(bootstrap.install_as_slave(true, "  ", "10.0.0.2"), expected);

        assert!(exec.lines().is_empty());
        assert!(downloader.urls.borrow().is_empty());
    }

    #[test]
    fn test_master_on_linux_falls_through_to_script_and_saves_token() {
        let exec = script_host().file(TOKEN_FILE, TOKEN);
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, linux());

        assert_eq!(bootstrap.install_as_master(false), Status::Success);

        assert!(exec.ran("yay --version"));
        assert!(exec.ran("brew --version"));
        assert_eq!(*downloader.urls.borrow(), vec!["https://get.k3s.io".to_string()]);

        let env = env_of(&exec, "/tmp/k3s_install.sh");
        assert_eq!(value(&env, ENV_KUBECONFIG_MODE), Some("644"));
        assert_eq!(value(&env, ENV_FORCE_DOCKER), Some("0"));
        assert_eq!(value(&env, ENV_TOKEN), None);

        assert_eq!(exec.content(TOKEN_SAVE).unwrap(), TOKEN);
        assert_eq!(bootstrap.get_join_token(), (TOKEN.to_string(), Status::Success));
    }

    #[test]
    fn test_master_without_token_reports_token_unavailable() {
        let exec = script_host();
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, linux());

        assert_eq!(bootstrap.install_as_master(false), Status::InstalledTokenUnavailable);
        assert!(exec.content(TOKEN_SAVE).is_none());

        let (token, status) = bootstrap.get_join_token();
        assert!(token.is_empty());
        assert_eq!(status, Status::Failed(FailureKind::TokenUnavailable));
    }

    #[test]
    fn test_master_force_docker() {
        let exec = script_host().file(TOKEN_FILE, TOKEN);
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, linux());

        assert_eq!(bootstrap.install_as_master(true), Status::Success);
        let env = env_of(&exec, "/tmp/k3s_install.sh --docker");
        assert_eq!(value(&env, ENV_FORCE_DOCKER), Some("1"));
    }

    #[test]
    fn test_failed_install_is_not_token_unavailable() {
        let exec = MockExecutor::new().file(TOKEN_FILE, TOKEN);
        let downloader = StubDownloader::failing();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, linux());

        assert_eq!(
            bootstrap.install_as_master(false),
            Status::Failed(FailureKind::Install)
        );
        assert!(exec.content(TOKEN_SAVE).is_none());
    }

    #[test]
    fn test_slave_join_directives() {
        let exec = script_host().file("/etc/your_k3s_hostname.txt", "pi-node-7\n");
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, linux());

        assert_eq!(
            bootstrap.install_as_slave(false, "K10secret", "192.168.1.10"),
            Status::Success
        );

        let env = env_of(&exec, "/tmp/k3s_install.sh");
        assert_eq!(value(&env, ENV_TOKEN), Some("K10secret"));
        assert_eq!(value(&env, ENV_URL), Some("https://192.168.1.10:6443"));
        assert_eq!(value(&env, ENV_NODE_NAME), Some("pi-node-7"));
        assert_eq!(value(&env, ENV_KUBECONFIG_MODE), Some("644"));
        assert!(exec.content(TOKEN_SAVE).is_none());
    }

    #[test]
    fn test_pi_master_prepares_board_first() {
        let exec = pi_host(CGROUPS_ON).file(TOKEN_FILE, TOKEN);
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, pi());

        assert_eq!(bootstrap.install_as_master(false), Status::Success);

        // Pi installs skip the package managers entirely
        assert!(!exec.ran("yay --version"));
        let lines = exec.lines();
        let apt = lines.iter().position(|l| l.starts_with("apt-get")).unwrap();
        let script = lines.iter().position(|l| l == "/tmp/k3s_install.sh").unwrap();
        assert!(apt < script);

        let node_name = exec.content("/etc/your_k3s_hostname.txt").unwrap();
        let env = env_of(&exec, "/tmp/k3s_install.sh");
        assert_eq!(value(&env, ENV_NODE_NAME), Some(node_name.trim()));
        assert!(exec.content("/boot/cmdline.txt").unwrap().contains(node_name.trim()));
    }

    #[test]
    fn test_pi_board_failure_aborts_before_install() {
        let exec = pi_host(CGROUPS_ON);
        let downloader = StubDownloader::default();
        let mut network = StubNetwork::lan();
        network.ip = None;
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, pi());

        assert_eq!(
            bootstrap.install_as_slave(false, "K10secret", "192.168.1.10"),
            Status::Failed(FailureKind::FileMutation)
        );
        assert!(downloader.urls.borrow().is_empty());
        assert!(!exec.ran("/tmp/k3s_install.sh"));
    }

    #[test]
    fn test_pi_without_memory_cgroup_needs_reboot() {
        let exec = pi_host(CGROUPS_OFF);
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, pi());

        assert_eq!(bootstrap.install_as_master(false), Status::RebootRequired);
        assert!(exec.content("/boot/cmdline.txt").unwrap().contains("cgroup_enable=memory"));
        assert!(downloader.urls.borrow().is_empty());
    }

    #[test]
    fn test_pi_on_cgroup_v2_kernel_installs() {
        let v2_only = "#subsys_name\thierarchy\tnum_cgroups\tenabled\ncpuset\t0\t1\t1\n";
        let exec = pi_host(v2_only).file(TOKEN_FILE, TOKEN);
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, pi());

        assert_eq!(bootstrap.install_as_master(false), Status::Success);
        assert!(exec.ran("/tmp/k3s_install.sh"));
    }

    #[test]
    fn test_is_installed() {
        let exec = MockExecutor::new().status("k3s --version", 0);
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();

        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, linux());
        assert!(bootstrap.is_installed("k3s"));
        assert!(!bootstrap.is_installed("kind"));
        assert!(!bootstrap.is_installed("docker"));

        let mut other = linux();
        other.os_family = OsFamily::Other;
        let calls_before = exec.lines().len();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, other);
        assert!(!bootstrap.is_installed("k3s"));
        assert_eq!(exec.lines().len(), calls_before);
    }

    #[test]
    fn test_install_tool_on_macos() {
        let exec = MockExecutor::new();
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let mut mac = linux();
        mac.os_family = OsFamily::MacOs;
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, mac);

        // No brew and no manual fallback for microk8s
        assert_eq!(
            bootstrap.install_tool(Tool::Microk8s),
            Status::Failed(FailureKind::Install)
        );
        assert_eq!(
            bootstrap.install_tool(Tool::K3s),
            Status::Failed(FailureKind::UnsupportedPlatform)
        );
    }

    #[test]
    fn test_install_tool_with_brew() {
        let exec = MockExecutor::new()
            .status("brew", 0)
            .status("kind version", 0);
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let mut mac = linux();
        mac.os_family = OsFamily::MacOs;
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, mac);

        assert_eq!(bootstrap.install_tool(Tool::Kind), Status::Success);
        assert!(exec.ran("brew install kind"));
    }

    #[test]
    fn test_prepare_board_requires_pi() {
        let exec = MockExecutor::new();
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, linux());

        assert_eq!(
            bootstrap.prepare_board(),
            Status::Failed(FailureKind::UnsupportedPlatform)
        );
    }

    #[test]
    fn test_uninstall_when_absent() {
        let exec = MockExecutor::new();
        let downloader = StubDownloader::default();
        let network = StubNetwork::lan();
        let config = Config::default();
        let bootstrap = ClusterBootstrap::new(&exec, &downloader, &network, &config, linux());

        assert_eq!(bootstrap.uninstall_k3s(), Status::Success);
    }
}
