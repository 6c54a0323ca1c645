use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

/// Exit status reported when the program to run cannot be found
pub const NOT_FOUND_STATUS: i32 = 127;

/// Environment directives handed to an install command
pub type EnvVars = [(String, String)];

/// Captured result of a non-interactive command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Local command execution helpers
pub mod local {
    use super::*;

    /// Check if a command exists using the which crate
    pub fn check_command_exists(command: &str) -> bool {
        which::which(command).is_ok()
    }

    pub fn read_file(path: impl AsRef<Path>) -> Result<String> {
        let path_ref = path.as_ref();
        std::fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read file: {}", path_ref.display()))
    }

    pub fn is_root() -> bool {
        whoami::username() == "root"
    }

    /// Build the argv for a privileged run: `sudo env K=V ... program args`
    pub fn privileged_argv(program: &str, args: &[&str], env: &EnvVars, as_root: bool) -> Vec<String> {
        let mut argv = Vec::new();
        if !as_root {
            argv.push("sudo".to_string());
        }
        if !env.is_empty() {
            argv.push("env".to_string());
            argv.extend(env.iter().map(|(k, v)| format!("{}={}", k, v)));
        }
        argv.push(program.to_string());
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    pub fn exit_code(status: std::process::ExitStatus) -> i32 {
        status.code().unwrap_or(1)
    }

    /// Feed `content` to the child's stdin, then reap it. The child is
    /// always waited on, even when the write fails.
    pub fn feed_and_wait(
        child: &mut Child,
        content: &[u8],
    ) -> (std::io::Result<ExitStatus>, std::io::Result<()>) {
        let fed = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(content).and_then(|_| stdin.flush()),
            None => Ok(()),
        };
        (child.wait(), fed)
    }
}

/// Process and file access used by every component.
///
/// Exit statuses are returned as plain integers; `0` is success. An `Err` means
/// the command could not be spawned at all, not that it failed.
pub trait CommandExecutor {
    /// Run a command attached to the terminal
    fn run(&self, program: &str, args: &[&str], env: &EnvVars) -> Result<i32>;

    /// Run a command with elevated privileges, attached to the terminal
    fn run_privileged(&self, program: &str, args: &[&str], env: &EnvVars) -> Result<i32>;

    /// Run a command and capture its stdout
    fn capture(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    fn read_file(&self, path: &Path) -> Result<String>;

    /// Read a file only root can read
    fn read_file_privileged(&self, path: &Path) -> Result<String>;

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Write a file only root can write
    fn write_file_privileged(&self, path: &Path, content: &[u8]) -> Result<()>;

    fn file_exists(&self, path: &Path) -> bool;

    /// Get the current username
    fn get_username(&self) -> String;
}

/// Executes everything on the local host
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalExecutor;

impl LocalExecutor {
    fn spawn_interactive(&self, argv: &[String]) -> Result<i32> {
        let (program, args) = argv.split_first().context("empty command line")?;
        if !local::check_command_exists(program) {
            tracing::debug!(program = %program, "command not found");
            return Ok(NOT_FOUND_STATUS);
        }
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Failed to execute command: {}", program))?;
        Ok(local::exit_code(status))
    }
}

impl CommandExecutor for LocalExecutor {
    fn run(&self, program: &str, args: &[&str], env: &EnvVars) -> Result<i32> {
        if !local::check_command_exists(program) {
            tracing::debug!(program = %program, "command not found");
            return Ok(NOT_FOUND_STATUS);
        }
        let status = Command::new(program)
            .args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Failed to execute command: {}", program))?;
        Ok(local::exit_code(status))
    }

    fn run_privileged(&self, program: &str, args: &[&str], env: &EnvVars) -> Result<i32> {
        let argv = local::privileged_argv(program, args, env, local::is_root());
        tracing::debug!(argv = ?argv, "running privileged");
        self.spawn_interactive(&argv)
    }

    fn capture(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        if !local::check_command_exists(program) {
            return Ok(CommandOutput {
                code: NOT_FOUND_STATUS,
                stdout: String::new(),
            });
        }
        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute command: {}", program))?;
        Ok(CommandOutput {
            code: local::exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        })
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        local::read_file(path)
    }

    fn read_file_privileged(&self, path: &Path) -> Result<String> {
        if local::is_root() {
            return local::read_file(path);
        }
        let path_str = path.to_string_lossy();
        let output = Command::new("sudo")
            .args(["cat", path_str.as_ref()])
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .stdin(Stdio::inherit())
            .output()
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        if !output.status.success() {
            anyhow::bail!("Failed to read file: {}", path.display());
        }
        String::from_utf8(output.stdout)
            .with_context(|| format!("Failed to decode file contents: {}", path.display()))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write file: {}", path.display()))
    }

    fn write_file_privileged(&self, path: &Path, content: &[u8]) -> Result<()> {
        if local::is_root() {
            return self.write_file(path, content);
        }
        let path_str = path.to_string_lossy();
        let mut child = Command::new("sudo")
            .args(["tee", path_str.as_ref()])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to spawn sudo for writing {}", path.display()))?;

        let (status, fed) = local::feed_and_wait(&mut child, content);
        let status = status.with_context(|| format!("Failed to write file: {}", path.display()))?;
        fed.with_context(|| format!("Failed to stream contents to {}", path.display()))?;
        if !status.success() {
            anyhow::bail!("Failed to write file: {}", path.display());
        }
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn get_username(&self) -> String {
        whoami::username()
    }
}
