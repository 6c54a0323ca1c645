// kubestrap library
// Platform detection, Raspberry Pi board preparation, install-strategy
// resolution and k3s cluster bootstrap. The CLI in main.rs only wires these up.

pub mod board;
pub mod config;
pub mod error;
pub mod exec;
pub mod platform;
pub mod services;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{BootstrapError, FailureKind, Status};
pub use services::k3s::ClusterBootstrap;
pub use services::tools::Tool;
