//! Host platform classification
//!
//! Raspberry Pi detection is a heuristic: the node name reported by
//! `uname -n` is searched for a configurable marker (`raspberrypi` by default).
//! A renamed board is classified as plain Linux, which still works; it only
//! skips board preparation.

use crate::config::Config;
use crate::exec::CommandExecutor;
use crate::utils::string::{contains_ignore_case, first_token};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl OsFamily {
    /// Map a `std::env::consts::OS` value
    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" => OsFamily::Linux,
            "macos" => OsFamily::MacOs,
            "windows" => OsFamily::Windows,
            _ => OsFamily::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Amd64,
    Arm64,
    Arm,
    Unknown,
}

impl Arch {
    /// Map a `uname -m` value to the names used in release URLs
    pub fn from_machine(machine: &str) -> Self {
        match machine.trim() {
            "x86_64" | "amd64" => Arch::Amd64,
            "aarch64" | "arm64" => Arch::Arm64,
            m if m.starts_with("armv7") || m.starts_with("armv6") || m == "armhf" => Arch::Arm,
            _ => Arch::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
            Arch::Arm => "arm",
            Arch::Unknown => "unknown",
        }
    }
}

/// Key for the per-platform tool tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    RaspberryPi,
    MacOs,
    Windows,
    Unsupported,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Linux => "Linux",
            Platform::RaspberryPi => "Raspberry Pi",
            Platform::MacOs => "macOS",
            Platform::Windows => "Windows",
            Platform::Unsupported => "an unsupported system",
        };
        f.write_str(name)
    }
}

/// Raw facts read from the host
#[derive(Debug, Clone, Default)]
pub struct HostEnv {
    pub os: String,
    pub node_name: String,
    pub machine: String,
}

impl HostEnv {
    pub fn detect<E: CommandExecutor>(exec: &E) -> Self {
        let node_name = capture_token(exec, &["-n"])
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_default();
        let machine = capture_token(exec, &["-m"]).unwrap_or_else(|| std::env::consts::ARCH.to_string());

        Self {
            os: std::env::consts::OS.to_string(),
            node_name,
            machine,
        }
    }
}

fn capture_token<E: CommandExecutor>(exec: &E, args: &[&str]) -> Option<String> {
    let output = exec.capture("uname", args).ok()?;
    if !output.success() {
        return None;
    }
    first_token(&output.stdout)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub os_family: OsFamily,
    pub is_raspberry_pi: bool,
    pub arch: Arch,
    pub node_name: String,
}

impl HostInfo {
    pub fn platform(&self) -> Platform {
        match self.os_family {
            OsFamily::Linux if self.is_raspberry_pi => Platform::RaspberryPi,
            OsFamily::Linux => Platform::Linux,
            OsFamily::MacOs => Platform::MacOs,
            OsFamily::Windows => Platform::Windows,
            OsFamily::Other => Platform::Unsupported,
        }
    }
}

pub fn classify(env: &HostEnv, config: &Config) -> HostInfo {
    let os_family = OsFamily::from_os(&env.os);
    let is_raspberry_pi = os_family == OsFamily::Linux
        && !config.pi_hostname_marker.is_empty()
        && contains_ignore_case(&env.node_name, &config.pi_hostname_marker);

    let info = HostInfo {
        os_family,
        is_raspberry_pi,
        arch: Arch::from_machine(&env.machine),
        node_name: env.node_name.clone(),
    };
    tracing::debug!(?info, "classified host");
    info
}
