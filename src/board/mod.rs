//! Raspberry Pi board preparation
//!
//! Runs before any cluster install on Pi hardware. Steps run in order and the
//! first failure aborts the sequence:
//!
//! 1. enable memory cgroups on the kernel command line
//! 2. compile a static IP directive from live network state
//! 3. merge that directive into the kernel command line
//! 4. force 64-bit boot in the board config (optional)
//! 5. install the extra packages of the Debian or Ubuntu base flavor
//!
//! Steps 1 to 3 are idempotent: a second run against the same host state
//! leaves the boot files byte-identical.

pub mod cmdline;
pub mod static_ip;

use crate::config::Config;
use crate::error::BootstrapError;
use crate::exec::CommandExecutor;
use crate::platform::{Arch, HostInfo};
use crate::utils::progress;
use crate::utils::string::contains_ignore_case;
use crate::utils::NetworkProbe;
use cmdline::{BootCmdline, ensure_line};
use static_ip::{IP_KEY, StaticIpDescriptor};
use std::path::{Path, PathBuf};

pub const ARM_64BIT_DIRECTIVE: &str = "arm_64bit=1";

/// Everything board preparation needs to know, derived fresh on every run
#[derive(Debug, Clone)]
pub struct BoardProfile {
    pub arch: Arch,
    pub node_name: String,
    pub cmdline_path: PathBuf,
    pub board_config_path: PathBuf,
    pub os_release_path: PathBuf,
    pub cgroup_directives: Vec<(String, String)>,
    pub netmask: String,
    pub force_64bit: bool,
}

impl BoardProfile {
    pub fn derive(config: &Config, host: &HostInfo) -> Self {
        Self {
            arch: host.arch,
            node_name: host.node_name.clone(),
            cmdline_path: config.paths.cmdline.clone(),
            board_config_path: config.paths.board_config.clone(),
            os_release_path: config.paths.os_release.clone(),
            cgroup_directives: vec![
                ("cgroup_memory".to_string(), "1".to_string()),
                ("cgroup_enable".to_string(), "memory".to_string()),
            ],
            netmask: config.static_netmask.clone(),
            force_64bit: config.force_64bit_boot,
        }
    }
}

/// Base distribution of the board's OS image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFlavor {
    Ubuntu,
    Debian,
}

impl DistroFlavor {
    /// Classify from `/etc/os-release` content; Ubuntu wins since it also mentions Debian
    pub fn detect(os_release: &str) -> Option<Self> {
        if contains_ignore_case(os_release, "ubuntu") {
            Some(DistroFlavor::Ubuntu)
        } else if contains_ignore_case(os_release, "debian") {
            Some(DistroFlavor::Debian)
        } else {
            None
        }
    }

    /// Extra driver and codec packages needed for overlay networking
    pub fn extra_packages(&self) -> &'static [&'static str] {
        match self {
            DistroFlavor::Ubuntu => &["linux-modules-extra-raspi"],
            DistroFlavor::Debian => &[
                "libavcodec-extra",
                "ttf-mscorefonts-installer",
                "unrar",
                "chromium-codecs-ffmpeg-extra",
                "gstreamer1.0-libav",
                "gstreamer1.0-plugins-ugly",
                "gstreamer1.0-vaapi",
            ],
        }
    }
}

/// Result of a completed preparation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedBoard {
    pub static_ip: StaticIpDescriptor,
    pub flavor: Option<DistroFlavor>,
}

pub struct BoardPreparer<'a, E: CommandExecutor, N: NetworkProbe> {
    exec: &'a E,
    network: &'a N,
    config: &'a Config,
}

impl<'a, E: CommandExecutor, N: NetworkProbe> BoardPreparer<'a, E, N> {
    pub fn new(exec: &'a E, network: &'a N, config: &'a Config) -> Self {
        Self {
            exec,
            network,
            config,
        }
    }

    pub fn prepare(&self, profile: &BoardProfile) -> Result<PreparedBoard, BootstrapError> {
        println!();
        println!("Preparing the board for the installation of k3s");

        progress::report("CGroup status", self.enable_cgroups(profile))?;
        let static_ip = progress::report("Static ip compilation status", self.compile_static_ip(profile))?;
        progress::report("Ip status", self.inject_static_ip(profile, &static_ip))?;
        self.save_node_name(&static_ip.hostname);

        if profile.force_64bit {
            progress::report("Force 64 bit boot status", self.force_64bit_boot(profile))?;
        }

        let flavor = self.install_flavor_extras(profile)?;

        progress::step("Prepping status", true);
        Ok(PreparedBoard { static_ip, flavor })
    }

    fn read_cmdline(&self, path: &Path) -> Result<BootCmdline, BootstrapError> {
        let content = self
            .exec
            .read_file(path)
            .map_err(|e| BootstrapError::file(path, format!("{:#}", e)))?;
        Ok(BootCmdline::parse(&content))
    }

    fn write_back(&self, path: &Path, content: &str) -> Result<(), BootstrapError> {
        self.exec
            .write_file_privileged(path, content.as_bytes())
            .map_err(|e| BootstrapError::file(path, format!("{:#}", e)))
    }

    /// Step 1
    pub fn enable_cgroups(&self, profile: &BoardProfile) -> Result<(), BootstrapError> {
        let mut cmdline = self.read_cmdline(&profile.cmdline_path)?;
        let changed = cmdline.merge(
            profile
                .cgroup_directives
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        if changed {
            tracing::info!(path = %profile.cmdline_path.display(), "enabling memory cgroups");
            self.write_back(&profile.cmdline_path, &cmdline.render())?;
        }
        Ok(())
    }

    /// Step 2
    pub fn compile_static_ip(&self, profile: &BoardProfile) -> Result<StaticIpDescriptor, BootstrapError> {
        let cmdline = self.read_cmdline(&profile.cmdline_path)?;
        static_ip::compile(self.network, &cmdline, &profile.netmask, || {
            static_ip::generate_hostname(
                &self.exec.get_username(),
                &profile.node_name,
                chrono::Local::now(),
                &uuid::Uuid::new_v4(),
            )
        })
        .map_err(|missing| BootstrapError::StaticIpUnavailable { missing })
    }

    /// Step 3
    pub fn inject_static_ip(
        &self,
        profile: &BoardProfile,
        descriptor: &StaticIpDescriptor,
    ) -> Result<(), BootstrapError> {
        let mut cmdline = self.read_cmdline(&profile.cmdline_path)?;
        if cmdline.set(IP_KEY, &descriptor.to_string()) {
            tracing::info!(directive = %descriptor, "writing static ip directive");
            self.write_back(&profile.cmdline_path, &cmdline.render())?;
        }
        Ok(())
    }

    /// Step 4
    pub fn force_64bit_boot(&self, profile: &BoardProfile) -> Result<(), BootstrapError> {
        let path = &profile.board_config_path;
        let content = self
            .exec
            .read_file(path)
            .map_err(|e| BootstrapError::file(path, format!("{:#}", e)))?;
        if let Some(updated) = ensure_line(&content, ARM_64BIT_DIRECTIVE) {
            self.write_back(path, &updated)?;
        }
        Ok(())
    }

    /// Step 5. An unrecognized flavor needs no extras and is not a failure.
    pub fn install_flavor_extras(&self, profile: &BoardProfile) -> Result<Option<DistroFlavor>, BootstrapError> {
        let flavor = match self.exec.read_file(&profile.os_release_path) {
            Ok(content) => DistroFlavor::detect(&content),
            Err(e) => {
                tracing::warn!(error = %e, "cannot read release file, skipping extra dependencies");
                None
            }
        };
        progress::step("Raspberry pi base flavor status", flavor.is_some());

        let Some(flavor) = flavor else {
            return Ok(None);
        };

        let mut args = vec!["install", "-y"];
        args.extend_from_slice(flavor.extra_packages());
        let code = self
            .exec
            .run_privileged("apt-get", &args, &[])
            .map_err(|e| BootstrapError::process("apt-get", e))?;
        progress::step("Extra dependencies status", code == 0);
        if code != 0 {
            return Err(BootstrapError::Install {
                strategy: format!("apt ({:?} extras)", flavor),
                code,
            });
        }
        Ok(Some(flavor))
    }

    /// Keep the chosen node name for later k3s installs; failure is not fatal
    fn save_node_name(&self, hostname: &str) {
        let path = &self.config.paths.node_name_file;
        if let Err(e) = self
            .exec
            .write_file_privileged(path, format!("{}\n", hostname).as_bytes())
        {
            tracing::warn!(path = %path.display(), error = %e, "could not save node name");
        }
    }
}

/// Whether the running kernel has the memory cgroup controller enabled,
/// judged from `/proc/cgroups` (`subsys_name hierarchy num_cgroups enabled`).
///
/// Only an explicit `memory ... 0` row counts as disabled. cgroup v2 only
/// kernels leave the controller out of the table entirely.
pub fn memory_cgroup_enabled(proc_cgroups: &str) -> bool {
    proc_cgroups
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| fields.first() == Some(&"memory"))
        .is_none_or(|fields| fields.get(3) != Some(&"0"))
}
