//! Ordered install-strategy resolution
//!
//! A [`ToolSpec`] declares a verifier, an ordered list of package-manager
//! strategies and an optional manual fallback. [`StrategyResolver`] walks the
//! chain once: each strategy is probed, installed and then verified, and the
//! first strategy whose verifier passes wins. Every strategy, including the
//! manual fallback, is attempted at most once.

use crate::config::Config;
use crate::error::{BootstrapError, FailureKind};
use crate::exec::CommandExecutor;
use crate::platform::Arch;
use crate::utils::Downloader;
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory release binaries are installed into
pub const INSTALL_DIR: &str = "/usr/local/bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Aur,
    Brew,
    Snap,
    Choco,
    Winget,
    Scoop,
    Manual,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Aur => "aur",
            StrategyKind::Brew => "brew",
            StrategyKind::Snap => "snap",
            StrategyKind::Choco => "choco",
            StrategyKind::Winget => "winget",
            StrategyKind::Scoop => "scoop",
            StrategyKind::Manual => "manual",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One package-manager based way of installing a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStrategy {
    pub kind: StrategyKind,
    /// Availability probe, e.g. `yay --version`
    pub probe: &'static [&'static str],
    pub install: &'static [&'static str],
    pub privileged: bool,
}

impl InstallStrategy {
    pub const fn new(
        kind: StrategyKind,
        probe: &'static [&'static str],
        install: &'static [&'static str],
    ) -> Self {
        Self {
            kind,
            probe,
            install,
            privileged: false,
        }
    }

    pub const fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }
}

/// Last-resort install that bypasses package managers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualInstall {
    /// Download a vendor install script and run it as root
    Script { url: String, file_name: &'static str },
    /// Download a release binary and install it into [`INSTALL_DIR`].
    /// `url_template` may contain `{version}` and `{arch}`.
    ReleaseBinary {
        version_url: Option<&'static str>,
        url_template: &'static str,
        binary: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub verifier: &'static [&'static str],
    pub strategies: Vec<InstallStrategy>,
    pub manual: Option<ManualInstall>,
}

impl ToolSpec {
    /// Upper bound on attempts for one resolution
    pub fn max_attempts(&self) -> usize {
        self.strategies.len() + usize::from(self.manual.is_some())
    }
}

/// Environment directives and extra script arguments for one install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallEnv {
    pub vars: Vec<(String, String)>,
    pub args: Vec<String>,
}

impl InstallEnv {
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.vars.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub kind: StrategyKind,
    /// `None` when the strategy verified
    pub failure: Option<FailureKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub attempts: Vec<Attempt>,
    pub succeeded: Option<StrategyKind>,
}

pub struct StrategyResolver<'a, E: CommandExecutor, D: Downloader> {
    exec: &'a E,
    downloader: &'a D,
    config: &'a Config,
    arch: Arch,
}

impl<'a, E: CommandExecutor, D: Downloader> StrategyResolver<'a, E, D> {
    pub fn new(exec: &'a E, downloader: &'a D, config: &'a Config, arch: Arch) -> Self {
        Self {
            exec,
            downloader,
            config,
            arch,
        }
    }

    /// Install `spec` with the first strategy that verifies
    pub fn resolve(&self, spec: &ToolSpec, env: &InstallEnv) -> Result<StrategyKind, BootstrapError> {
        let report = self.run_chain(spec, env);
        match report.succeeded {
            Some(kind) => Ok(kind),
            None => Err(BootstrapError::Exhausted {
                tool: spec.name.to_string(),
                attempts: report.attempts.len(),
            }),
        }
    }

    /// Walk the chain and record every attempt
    pub fn run_chain(&self, spec: &ToolSpec, env: &InstallEnv) -> ResolveReport {
        let mut report = ResolveReport::default();

        for strategy in &spec.strategies {
            let outcome = self.attempt(spec, strategy, env);
            if self.record(&mut report, spec, strategy.kind, outcome) {
                return report;
            }
        }

        if let Some(manual) = &spec.manual {
            let outcome = self.attempt_manual(spec, manual, env);
            self.record(&mut report, spec, StrategyKind::Manual, outcome);
        }

        report
    }

    fn record(
        &self,
        report: &mut ResolveReport,
        spec: &ToolSpec,
        kind: StrategyKind,
        outcome: Result<(), BootstrapError>,
    ) -> bool {
        match outcome {
            Ok(()) => {
                println!("{} installed via {}", spec.name, kind);
                report.attempts.push(Attempt { kind, failure: None });
                report.succeeded = Some(kind);
                true
            }
            Err(e) => {
                tracing::info!(tool = spec.name, strategy = %kind, error = %e, "install strategy failed");
                report.attempts.push(Attempt {
                    kind,
                    failure: Some(e.kind()),
                });
                false
            }
        }
    }

    fn attempt(&self, spec: &ToolSpec, strategy: &InstallStrategy, env: &InstallEnv) -> Result<(), BootstrapError> {
        if !self.probe(strategy.probe) {
            return Err(BootstrapError::Probe {
                manager: strategy.kind.to_string(),
            });
        }

        println!("Installing {} via {}", spec.name, strategy.kind);
        let (program, args) = split_argv(strategy.install)?;
        let spawned = if strategy.privileged {
            self.exec.run_privileged(program, args, &env.vars)
        } else {
            self.exec.run(program, args, &env.vars)
        };
        let code = spawned.map_err(|e| BootstrapError::process(program, e))?;

        self.verify(spec, strategy.kind.as_str(), code)
    }

    fn attempt_manual(&self, spec: &ToolSpec, manual: &ManualInstall, env: &InstallEnv) -> Result<(), BootstrapError> {
        println!("Installing {} manually", spec.name);
        let code = match manual {
            ManualInstall::Script { url, file_name } => {
                let dest = self.download_dir().join(file_name);
                self.downloader.download(url, &dest)?;
                self.make_executable(&dest)?;

                let dest_str = dest.to_string_lossy();
                let args: Vec<&str> = env.args.iter().map(String::as_str).collect();
                self.exec
                    .run_privileged(dest_str.as_ref(), &args, &env.vars)
                    .map_err(|e| BootstrapError::process(dest_str.as_ref(), e))?
            }
            ManualInstall::ReleaseBinary {
                version_url,
                url_template,
                binary,
            } => {
                if self.arch == Arch::Unknown {
                    return Err(BootstrapError::UnsupportedPlatform {
                        tool: spec.name.to_string(),
                        platform: "an unknown architecture".to_string(),
                    });
                }
                let version = match version_url {
                    Some(url) => {
                        let scratch = self.download_dir().join(format!("{}-version.txt", binary));
                        self.downloader.fetch_text(url, &scratch)?.trim().to_string()
                    }
                    None => String::new(),
                };
                let url = url_template
                    .replace("{version}", &version)
                    .replace("{arch}", self.arch.as_str());

                let dest = self.download_dir().join(binary);
                self.downloader.download(&url, &dest)?;
                self.make_executable(&dest)?;

                let dest_str = dest.to_string_lossy();
                let target = format!("{}/{}", INSTALL_DIR, binary);
                self.exec
                    .run_privileged("install", &["-m", "0755", dest_str.as_ref(), &target], &[])
                    .map_err(|e| BootstrapError::process("install", e))?
            }
        };

        self.verify(spec, StrategyKind::Manual.as_str(), code)
    }

    /// The verifier decides the outcome, whatever the install action reported
    fn verify(&self, spec: &ToolSpec, strategy: &str, install_code: i32) -> Result<(), BootstrapError> {
        let verified = self.probe(spec.verifier);
        match (verified, install_code) {
            (true, 0) => Ok(()),
            (true, code) => {
                tracing::warn!(
                    tool = spec.name,
                    strategy,
                    code,
                    "install reported failure but the tool verifies"
                );
                Ok(())
            }
            (false, 0) => Err(BootstrapError::Verification {
                tool: spec.name.to_string(),
                strategy: strategy.to_string(),
            }),
            (false, code) => Err(BootstrapError::Install {
                strategy: strategy.to_string(),
                code,
            }),
        }
    }

    /// Run a check command; a spawn error counts as a failed check
    fn probe(&self, argv: &[&str]) -> bool {
        let Some((program, args)) = argv.split_first() else {
            return false;
        };
        match self.exec.capture(program, args) {
            Ok(output) => output.success(),
            Err(e) => {
                tracing::debug!(program, error = %e, "probe could not run");
                false
            }
        }
    }

    fn make_executable(&self, path: &Path) -> Result<(), BootstrapError> {
        let path_str = path.to_string_lossy();
        let code = self
            .exec
            .run("chmod", &["+x", path_str.as_ref()], &[])
            .map_err(|e| BootstrapError::process("chmod", e))?;
        if code != 0 {
            return Err(BootstrapError::file(path, "cannot grant execute permission"));
        }
        Ok(())
    }

    fn download_dir(&self) -> PathBuf {
        self.config.paths.download_dir.clone()
    }
}

/// Check whether the tool's verifier passes right now
pub fn verify_installed<E: CommandExecutor>(exec: &E, spec: &ToolSpec) -> bool {
    let Some((program, args)) = spec.verifier.split_first() else {
        return false;
    };
    exec.capture(program, args)
        .map(|output| output.success())
        .unwrap_or(false)
}

fn split_argv<'s>(argv: &'s [&'s str]) -> Result<(&'s str, &'s [&'s str]), BootstrapError> {
    argv.split_first()
        .map(|(program, args)| (*program, args))
        .ok_or_else(|| BootstrapError::Validation("empty install command".to_string()))
}
