//! Runtime configuration
//!
//! A single [`Config`] value is built at startup and handed by reference to
//! every component. Sources, lowest precedence first: built-in defaults,
//! `~/.config/kubestrap/config.toml`, then `KUBESTRAP_*` environment variables
//! (a `.env` file in the working directory is loaded before they are read).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = "kubestrap";
const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_PREFIX: &str = "KUBESTRAP_";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Exit status reported for a successful operation
    pub success_code: i32,
    /// Exit status reported for any failed operation
    pub error_code: i32,
    pub download_timeout_secs: u64,
    pub k3s_installer_url: String,
    /// Substring of the node name that flags Raspberry Pi hardware
    pub pi_hostname_marker: String,
    pub static_netmask: String,
    pub force_64bit_boot: bool,
    pub master_port: u16,
    pub kubeconfig_mode: String,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub cmdline: PathBuf,
    pub board_config: PathBuf,
    pub os_release: PathBuf,
    pub resolv_conf: PathBuf,
    pub cgroups: PathBuf,
    pub token_file: PathBuf,
    pub token_save_file: PathBuf,
    pub node_name_file: PathBuf,
    pub download_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            success_code: 0,
            error_code: 84,
            download_timeout_secs: 10,
            k3s_installer_url: "https://get.k3s.io".to_string(),
            pi_hostname_marker: "raspberrypi".to_string(),
            static_netmask: "255.255.255.0".to_string(),
            force_64bit_boot: true,
            master_port: 6443,
            kubeconfig_mode: "644".to_string(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cmdline: PathBuf::from("/boot/cmdline.txt"),
            board_config: PathBuf::from("/boot/config.txt"),
            os_release: PathBuf::from("/etc/os-release"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            cgroups: PathBuf::from("/proc/cgroups"),
            token_file: PathBuf::from("/var/lib/rancher/k3s/server/node-token"),
            token_save_file: PathBuf::from("~/your_master_token.txt"),
            node_name_file: PathBuf::from("/etc/your_k3s_hostname.txt"),
            download_dir: PathBuf::from("/tmp"),
        }
    }
}

impl Config {
    /// Load configuration from the default file location plus the environment
    pub fn load() -> Result<Self> {
        let path = get_config_file_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from an explicit file plus the environment.
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        // A missing .env is the common case
        let _ = dotenv::dotenv();

        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.expand_home()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `KUBESTRAP_*` overrides. `lookup` is the environment accessor.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("SUCCESS_CODE") {
            self.success_code = v.parse().context("KUBESTRAP_SUCCESS_CODE must be an integer")?;
        }
        if let Some(v) = var("ERROR_CODE") {
            self.error_code = v.parse().context("KUBESTRAP_ERROR_CODE must be an integer")?;
        }
        if let Some(v) = var("DOWNLOAD_TIMEOUT_SECS") {
            self.download_timeout_secs = v
                .parse()
                .context("KUBESTRAP_DOWNLOAD_TIMEOUT_SECS must be an integer")?;
        }
        if let Some(v) = var("K3S_INSTALLER_URL") {
            self.k3s_installer_url = v;
        }
        if let Some(v) = var("PI_HOSTNAME_MARKER") {
            self.pi_hostname_marker = v;
        }
        if let Some(v) = var("FORCE_64BIT_BOOT") {
            self.force_64bit_boot = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = var("TOKEN_SAVE_FILE") {
            self.paths.token_save_file = PathBuf::from(v);
        }
        if let Some(v) = var("CMDLINE") {
            self.paths.cmdline = PathBuf::from(v);
        }
        if let Some(v) = var("BOARD_CONFIG") {
            self.paths.board_config = PathBuf::from(v);
        }
        if let Some(v) = var("DOWNLOAD_DIR") {
            self.paths.download_dir = PathBuf::from(v);
        }
        Ok(())
    }

    fn expand_home(&mut self) -> Result<()> {
        let paths = &mut self.paths;
        for path in [
            &mut paths.cmdline,
            &mut paths.board_config,
            &mut paths.token_save_file,
            &mut paths.node_name_file,
            &mut paths.download_dir,
        ] {
            if path.starts_with("~") {
                let home = get_home_dir()?;
                *path = expand_tilde(path, &home);
            }
        }
        Ok(())
    }

    /// Join URL a slave uses to reach its master
    pub fn join_url(&self, master_ip: &str) -> String {
        format!("https://{}:{}", master_ip, self.master_port)
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    Ok(get_home_dir()?.join(".config").join(CONFIG_DIR_NAME))
}

pub fn get_config_file_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

pub fn get_home_dir() -> Result<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .with_context(|| "Could not determine home directory")
}

fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}
