//! Join token lifecycle
//!
//! A master install leaves the token in a root-only file; it is copied
//! verbatim to a user-readable save path so it can be handed to slaves.

use crate::config::Config;
use crate::error::BootstrapError;
use crate::exec::CommandExecutor;

/// Read the join token exactly as the master wrote it
pub fn read_join_token<E: CommandExecutor>(exec: &E, config: &Config) -> Result<String, BootstrapError> {
    let path = &config.paths.token_file;
    let token = exec.read_file_privileged(path).map_err(|e| {
        BootstrapError::TokenUnavailable(format!("cannot read {}: {:#}", path.display(), e))
    })?;
    if token.trim().is_empty() {
        return Err(BootstrapError::TokenUnavailable(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(token)
}

/// Copy the join token to the save path and return it
pub fn save_join_token<E: CommandExecutor>(exec: &E, config: &Config) -> Result<String, BootstrapError> {
    let token = read_join_token(exec, config)?;
    let save_path = &config.paths.token_save_file;
    exec.write_file(save_path, token.as_bytes()).map_err(|e| {
        BootstrapError::TokenUnavailable(format!("cannot save to {}: {:#}", save_path.display(), e))
    })?;
    println!("Master token saved to: {}", save_path.display());
    Ok(token)
}
