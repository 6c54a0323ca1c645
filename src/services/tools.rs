//! Platform-keyed install tables for the cluster tools
use crate::config::Config;
use crate::error::BootstrapError;
use crate::platform::Platform;
use crate::services::strategy::{InstallStrategy, ManualInstall, StrategyKind, ToolSpec};
use std::fmt;
use std::str::FromStr;

const K3D_INSTALLER_URL: &str = "https://raw.githubusercontent.com/rancher/k3d/main/install.sh";
const KUBECTL_STABLE_URL: &str = "https://cdn.dl.k8s.io/release/stable.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    K3s,
    K3d,
    Kubectl,
    Kind,
    Minikube,
    Microk8s,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::K3s,
        Tool::K3d,
        Tool::Kubectl,
        Tool::Kind,
        Tool::Minikube,
        Tool::Microk8s,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::K3s => "k3s",
            Tool::K3d => "k3d",
            Tool::Kubectl => "kubectl",
            Tool::Kind => "kind",
            Tool::Minikube => "minikube",
            Tool::Microk8s => "microk8s",
        }
    }

    fn verifier(&self) -> &'static [&'static str] {
        match self {
            Tool::K3s => &["k3s", "--version"],
            Tool::K3d => &["k3d", "--version"],
            Tool::Kubectl => &["kubectl", "version", "--client"],
            Tool::Kind => &["kind", "version"],
            Tool::Minikube => &["minikube", "version"],
            Tool::Microk8s => &["microk8s", "version"],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tool {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Tool::ALL
            .into_iter()
            .find(|tool| tool.name() == wanted)
            .ok_or_else(|| {
                BootstrapError::Validation(format!(
                    "unknown tool '{}', expected one of: {}",
                    s,
                    Tool::ALL.map(|t| t.name()).join(", ")
                ))
            })
    }
}

fn aur(install: &'static [&'static str]) -> InstallStrategy {
    InstallStrategy::new(StrategyKind::Aur, &["yay", "--version"], install)
}

fn brew(install: &'static [&'static str]) -> InstallStrategy {
    InstallStrategy::new(StrategyKind::Brew, &["brew", "--version"], install)
}

fn snap(install: &'static [&'static str]) -> InstallStrategy {
    InstallStrategy::new(StrategyKind::Snap, &["snap", "--version"], install).privileged()
}

fn choco(install: &'static [&'static str]) -> InstallStrategy {
    InstallStrategy::new(StrategyKind::Choco, &["choco", "--version"], install)
}

fn winget(install: &'static [&'static str]) -> InstallStrategy {
    InstallStrategy::new(StrategyKind::Winget, &["winget", "--version"], install)
}

fn scoop(install: &'static [&'static str]) -> InstallStrategy {
    InstallStrategy::new(StrategyKind::Scoop, &["scoop", "--version"], install)
}

fn release(version_url: Option<&'static str>, url_template: &'static str, binary: &'static str) -> Option<ManualInstall> {
    Some(ManualInstall::ReleaseBinary {
        version_url,
        url_template,
        binary,
    })
}

/// Install table for `tool` on `platform`, or `None` when the pair is unsupported
pub fn tool_spec(tool: Tool, platform: Platform, config: &Config) -> Option<ToolSpec> {
    let (strategies, manual) = match (tool, platform) {
        (Tool::K3s, Platform::RaspberryPi) => (
            vec![],
            Some(ManualInstall::Script {
                url: config.k3s_installer_url.clone(),
                file_name: "k3s_install.sh",
            }),
        ),
        (Tool::K3s, Platform::Linux) => (
            vec![
                aur(&["yay", "-S", "--noconfirm", "rancher-k3s-bin"]),
                brew(&["brew", "install", "k3s"]),
            ],
            Some(ManualInstall::Script {
                url: config.k3s_installer_url.clone(),
                file_name: "k3s_install.sh",
            }),
        ),

        (Tool::K3d, Platform::Linux | Platform::RaspberryPi) => (
            vec![
                aur(&["yay", "-S", "--noconfirm", "rancher-k3d-bin"]),
                brew(&["brew", "install", "k3d"]),
            ],
            Some(ManualInstall::Script {
                url: K3D_INSTALLER_URL.to_string(),
                file_name: "k3d_install.sh",
            }),
        ),
        (Tool::K3d, Platform::MacOs) => (
            vec![brew(&["brew", "install", "k3d"])],
            Some(ManualInstall::Script {
                url: K3D_INSTALLER_URL.to_string(),
                file_name: "k3d_install.sh",
            }),
        ),
        (Tool::K3d, Platform::Windows) => (
            vec![
                choco(&["choco", "install", "k3d", "-y"]),
                scoop(&["scoop", "install", "k3d"]),
            ],
            None,
        ),

        (Tool::Kubectl, Platform::Linux | Platform::RaspberryPi) => (
            vec![
                aur(&["yay", "-S", "--noconfirm", "kubectl"]),
                brew(&["brew", "install", "kubectl"]),
                snap(&["snap", "install", "kubectl", "--classic"]),
            ],
            release(
                Some(KUBECTL_STABLE_URL),
                "https://dl.k8s.io/release/{version}/bin/linux/{arch}/kubectl",
                "kubectl",
            ),
        ),
        (Tool::Kubectl, Platform::MacOs) => (
            vec![brew(&["brew", "install", "kubectl"])],
            release(
                Some(KUBECTL_STABLE_URL),
                "https://dl.k8s.io/release/{version}/bin/darwin/{arch}/kubectl",
                "kubectl",
            ),
        ),
        (Tool::Kubectl, Platform::Windows) => (
            vec![
                choco(&["choco", "install", "kubernetes-cli", "-y"]),
                winget(&["winget", "install", "-e", "--id", "Kubernetes.kubectl"]),
                scoop(&["scoop", "install", "kubectl"]),
            ],
            None,
        ),

        (Tool::Kind, Platform::Linux | Platform::RaspberryPi) => (
            vec![
                aur(&["yay", "-S", "--noconfirm", "kind-bin"]),
                brew(&["brew", "install", "kind"]),
            ],
            release(None, "https://kind.sigs.k8s.io/dl/latest/kind-linux-{arch}", "kind"),
        ),
        (Tool::Kind, Platform::MacOs) => (
            vec![brew(&["brew", "install", "kind"])],
            release(None, "https://kind.sigs.k8s.io/dl/latest/kind-darwin-{arch}", "kind"),
        ),
        (Tool::Kind, Platform::Windows) => (
            vec![
                choco(&["choco", "install", "kind", "-y"]),
                winget(&["winget", "install", "-e", "--id", "Kubernetes.kind"]),
                scoop(&["scoop", "install", "kind"]),
            ],
            None,
        ),

        (Tool::Minikube, Platform::Linux | Platform::RaspberryPi) => (
            vec![
                aur(&["yay", "-S", "--noconfirm", "minikube"]),
                brew(&["brew", "install", "minikube"]),
            ],
            release(
                None,
                "https://storage.googleapis.com/minikube/releases/latest/minikube-linux-{arch}",
                "minikube",
            ),
        ),
        (Tool::Minikube, Platform::MacOs) => (
            vec![brew(&["brew", "install", "minikube"])],
            release(
                None,
                "https://storage.googleapis.com/minikube/releases/latest/minikube-darwin-{arch}",
                "minikube",
            ),
        ),
        (Tool::Minikube, Platform::Windows) => (
            vec![
                choco(&["choco", "install", "minikube", "-y"]),
                winget(&["winget", "install", "-e", "--id", "Kubernetes.minikube"]),
                scoop(&["scoop", "install", "minikube"]),
            ],
            None,
        ),

        (Tool::Microk8s, Platform::Linux | Platform::RaspberryPi) => (
            vec![
                aur(&["yay", "-S", "--noconfirm", "microk8s"]),
                brew(&["brew", "install", "ubuntu/microk8s/microk8s"]),
                snap(&["snap", "install", "microk8s", "--classic"]),
            ],
            None,
        ),
        (Tool::Microk8s, Platform::MacOs) => (
            vec![brew(&["brew", "install", "ubuntu/microk8s/microk8s"])],
            None,
        ),

        _ => return None,
    };

    Some(ToolSpec {
        name: tool.name(),
        verifier: tool.verifier(),
        strategies,
        manual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(spec: &ToolSpec) -> Vec<StrategyKind> {
        spec.strategies.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_tool_from_str() {
        assert_eq!("k3s".parse::<Tool>().unwrap(), Tool::K3s);
        assert_eq!(" MicroK8s ".parse::<Tool>().unwrap(), Tool::Microk8s);
        assert!(matches!(
            "docker".parse::<Tool>(),
            Err(BootstrapError::Validation(_))
        ));
    }

    #[test]
    fn test_k3s_linux_chain() {
        let spec = tool_spec(Tool::K3s, Platform::Linux, &Config::default()).unwrap();
        assert_eq!(kinds(&spec), vec![StrategyKind::Aur, StrategyKind::Brew]);
        assert_eq!(spec.verifier, ["k3s", "--version"]);
        assert_eq!(
            spec.manual,
            Some(ManualInstall::Script {
                url: "https://get.k3s.io".to_string(),
                file_name: "k3s_install.sh",
            })
        );
        assert_eq!(spec.max_attempts(), 3);
    }

    #[test]
    fn test_k3s_on_pi_goes_straight_to_script() {
        let mut config = Config::default();
        config.k3s_installer_url = "https://mirror.local/k3s".to_string();
        let spec = tool_spec(Tool::K3s, Platform::RaspberryPi, &config).unwrap();
        assert!(spec.strategies.is_empty());
        assert!(matches!(
            spec.manual,
            Some(ManualInstall::Script { ref url, .. }) if url == "https://mirror.local/k3s"
        ));
    }

    #[test]
    fn test_linux_order_is_aur_brew_snap() {
        let spec = tool_spec(Tool::Kubectl, Platform::Linux, &Config::default()).unwrap();
        assert_eq!(
            kinds(&spec),
            vec![StrategyKind::Aur, StrategyKind::Brew, StrategyKind::Snap]
        );
        assert!(spec.strategies[2].privileged);
    }

    #[test]
    fn test_windows_has_no_manual_fallback() {
        let spec = tool_spec(Tool::Kind, Platform::Windows, &Config::default()).unwrap();
        assert_eq!(
            kinds(&spec),
            vec![StrategyKind::Choco, StrategyKind::Winget, StrategyKind::Scoop]
        );
        assert!(spec.manual.is_none());
        assert_eq!(spec.max_attempts(), 3);
    }

    #[test]
    fn test_unsupported_pairs() {
        let config = Config::default();
        assert!(tool_spec(Tool::K3s, Platform::MacOs, &config).is_none());
        assert!(tool_spec(Tool::K3s, Platform::Windows, &config).is_none());
        assert!(tool_spec(Tool::Microk8s, Platform::Windows, &config).is_none());
        for tool in Tool::ALL {
            assert!(tool_spec(tool, Platform::Unsupported, &config).is_none());
        }
    }

    #[test]
    fn test_every_tool_installs_on_linux() {
        let config = Config::default();
        for tool in Tool::ALL {
            let spec = tool_spec(tool, Platform::Linux, &config).unwrap();
            assert_eq!(spec.name, tool.name());
            assert_eq!(spec.verifier[0], tool.name());
        }
    }
}
