//! Failure taxonomy and the uniform status returned by every entry point

use crate::config::Config;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid parameters: {0}")]
    Validation(String),

    #[error("{manager} is not available")]
    Probe { manager: String },

    #[error("install via {strategy} exited with status {code}")]
    Install { strategy: String, code: i32 },

    #[error("{tool} is still not detected after installing via {strategy}")]
    Verification { tool: String, strategy: String },

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("cannot update {}: {reason}", path.display())]
    FileMutation { path: PathBuf, reason: String },

    #[error("{tool} cannot be installed on {platform}")]
    UnsupportedPlatform { tool: String, platform: String },

    #[error("static ip directive incomplete: {missing} could not be resolved")]
    StaticIpUnavailable { missing: &'static str },

    #[error("join token unavailable: {0}")]
    TokenUnavailable(String),

    #[error("failed to run {program}: {source}")]
    Process {
        program: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("every install strategy for {tool} failed ({attempts} attempts)")]
    Exhausted { tool: String, attempts: usize },
}

/// Coarse class of a failure, as surfaced through [`Status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Probe,
    Install,
    Verification,
    Download,
    FileMutation,
    UnsupportedPlatform,
    TokenUnavailable,
    Process,
}

impl BootstrapError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BootstrapError::Validation(_) => FailureKind::Validation,
            BootstrapError::Probe { .. } => FailureKind::Probe,
            BootstrapError::Install { .. } | BootstrapError::Exhausted { .. } => {
                FailureKind::Install
            }
            BootstrapError::Verification { .. } => FailureKind::Verification,
            BootstrapError::Download { .. } => FailureKind::Download,
            BootstrapError::FileMutation { .. } | BootstrapError::StaticIpUnavailable { .. } => {
                FailureKind::FileMutation
            }
            BootstrapError::UnsupportedPlatform { .. } => FailureKind::UnsupportedPlatform,
            BootstrapError::TokenUnavailable(_) => FailureKind::TokenUnavailable,
            BootstrapError::Process { .. } => FailureKind::Process,
        }
    }

    pub(crate) fn file(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        BootstrapError::FileMutation {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn process(program: &str, source: anyhow::Error) -> Self {
        BootstrapError::Process {
            program: program.to_string(),
            source,
        }
    }
}

/// Outcome of a public operation. Internal errors never cross this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// The cluster tool installed but the join token could not be read or saved
    InstalledTokenUnavailable,
    /// Boot directives were written but the running kernel has not picked them up
    RebootRequired,
    Failed(FailureKind),
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }

    pub fn exit_code(&self, config: &Config) -> i32 {
        match self {
            Status::Success => config.success_code,
            _ => config.error_code,
        }
    }
}

impl From<&BootstrapError> for Status {
    fn from(err: &BootstrapError) -> Self {
        Status::Failed(err.kind())
    }
}

impl<T> From<Result<T, BootstrapError>> for Status {
    fn from(result: Result<T, BootstrapError>) -> Self {
        match result {
            Ok(_) => Status::Success,
            Err(err) => Status::from(&err),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::InstalledTokenUnavailable => write!(f, "installed, token unavailable"),
            Status::RebootRequired => write!(f, "reboot required"),
            Status::Failed(kind) => write!(f, "failed ({:?})", kind),
        }
    }
}
