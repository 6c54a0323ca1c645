//! K3s removal

use crate::error::BootstrapError;
use crate::exec::CommandExecutor;
use std::path::Path;

pub const SERVER_UNINSTALL_SCRIPT: &str = "/usr/local/bin/k3s-uninstall.sh";
pub const AGENT_UNINSTALL_SCRIPT: &str = "/usr/local/bin/k3s-agent-uninstall.sh";

/// Run the uninstall script k3s left behind.
/// Returns `false` when k3s is not installed on this node.
pub fn uninstall<E: CommandExecutor>(exec: &E) -> Result<bool, BootstrapError> {
    // Try server uninstall first, then agent
    let script = [SERVER_UNINSTALL_SCRIPT, AGENT_UNINSTALL_SCRIPT]
        .into_iter()
        .find(|script| exec.file_exists(Path::new(script)));

    let Some(script) = script else {
        println!("K3s is not installed on this node.");
        return Ok(false);
    };

    if script == SERVER_UNINSTALL_SCRIPT {
        println!("Uninstalling K3s server...");
    } else {
        println!("Uninstalling K3s agent...");
    }

    let code = exec
        .run_privileged(script, &[], &[])
        .map_err(|e| BootstrapError::process(script, e))?;
    if code != 0 {
        return Err(BootstrapError::Install {
            strategy: script.to_string(),
            code,
        });
    }
    Ok(true)
}
