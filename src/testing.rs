//! Recording doubles for the executor, downloader and network probe

use crate::error::BootstrapError;
use crate::exec::{CommandExecutor, CommandOutput, EnvVars, NOT_FOUND_STATUS};
use crate::utils::{Downloader, NetworkProbe};
use anyhow::Result;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub line: String,
    pub env: Vec<(String, String)>,
    pub privileged: bool,
}

/// Executor that answers from canned statuses and an in-memory file table.
///
/// Statuses are keyed by the full command line (`"k3s --version"`) or, failing
/// that, by program name. Unknown commands behave as not installed. A key with
/// several queued statuses yields them in order and then repeats the last.
#[derive(Default)]
pub struct MockExecutor {
    statuses: RefCell<HashMap<String, Vec<i32>>>,
    stdout: HashMap<String, String>,
    files: RefCell<HashMap<PathBuf, String>>,
    read_only: HashSet<PathBuf>,
    pub calls: RefCell<Vec<Call>>,
    pub writes: RefCell<Vec<(PathBuf, String)>>,
    pub username: String,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            username: "pi".to_string(),
            ..Default::default()
        }
    }

    pub fn status(self, key: &str, code: i32) -> Self {
        self.statuses(key, &[code])
    }

    pub fn statuses(self, key: &str, codes: &[i32]) -> Self {
        self.statuses
            .borrow_mut()
            .insert(key.to_string(), codes.to_vec());
        self
    }

    pub fn stdout(mut self, key: &str, out: &str) -> Self {
        self.stdout.insert(key.to_string(), out.to_string());
        self
    }

    pub fn file(self, path: impl AsRef<Path>, content: &str) -> Self {
        self.files
            .borrow_mut()
            .insert(path.as_ref().to_path_buf(), content.to_string());
        self
    }

    pub fn read_only(mut self, path: impl AsRef<Path>) -> Self {
        self.read_only.insert(path.as_ref().to_path_buf());
        self
    }

    pub fn content(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.line.clone()).collect()
    }

    pub fn count(&self, line: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.line == line).count()
    }

    pub fn ran(&self, line: &str) -> bool {
        self.count(line) > 0
    }

    pub fn find(&self, line: &str) -> Option<Call> {
        self.calls.borrow().iter().find(|c| c.line == line).cloned()
    }

    fn next_status(&self, program: &str, line: &str) -> i32 {
        let mut statuses = self.statuses.borrow_mut();
        let queue = match statuses.get_mut(line) {
            Some(q) => q,
            None => match statuses.get_mut(program) {
                Some(q) => q,
                None => return NOT_FOUND_STATUS,
            },
        };
        if queue.len() > 1 {
            queue.remove(0)
        } else {
            queue.first().copied().unwrap_or(NOT_FOUND_STATUS)
        }
    }

    fn record(&self, program: &str, args: &[&str], env: &EnvVars, privileged: bool) -> String {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.borrow_mut().push(Call {
            line: line.clone(),
            env: env.to_vec(),
            privileged,
        });
        line
    }

    fn store(&self, path: &Path, content: &[u8]) -> Result<()> {
        if self.read_only.contains(path) {
            anyhow::bail!("Failed to write file: {}", path.display());
        }
        let text = String::from_utf8_lossy(content).to_string();
        self.writes
            .borrow_mut()
            .push((path.to_path_buf(), text.clone()));
        self.files.borrow_mut().insert(path.to_path_buf(), text);
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<String> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Failed to read file: {}", path.display()))
    }
}

impl CommandExecutor for MockExecutor {
    fn run(&self, program: &str, args: &[&str], env: &EnvVars) -> Result<i32> {
        let line = self.record(program, args, env, false);
        Ok(self.next_status(program, &line))
    }

    fn run_privileged(&self, program: &str, args: &[&str], env: &EnvVars) -> Result<i32> {
        let line = self.record(program, args, env, true);
        Ok(self.next_status(program, &line))
    }

    fn capture(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let line = self.record(program, args, &[], false);
        let code = self.next_status(program, &line);
        let stdout = self.stdout.get(&line).cloned().unwrap_or_default();
        Ok(CommandOutput { code, stdout })
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        self.load(path)
    }

    fn read_file_privileged(&self, path: &Path) -> Result<String> {
        self.load(path)
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        self.store(path, content)
    }

    fn write_file_privileged(&self, path: &Path, content: &[u8]) -> Result<()> {
        self.store(path, content)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn get_username(&self) -> String {
        self.username.clone()
    }
}

/// Downloader that records URLs and either succeeds or fails every fetch
#[derive(Default)]
pub struct StubDownloader {
    pub fail: bool,
    pub text: String,
    pub urls: RefCell<Vec<String>>,
}

impl StubDownloader {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }
}

impl Downloader for StubDownloader {
    fn download(&self, url: &str, _dest: &Path) -> Result<(), BootstrapError> {
        self.urls.borrow_mut().push(url.to_string());
        if self.fail {
            return Err(BootstrapError::Download {
                url: url.to_string(),
                reason: "unreachable".to_string(),
            });
        }
        Ok(())
    }

    fn fetch_text(&self, url: &str, scratch: &Path) -> Result<String, BootstrapError> {
        self.download(url, scratch)?;
        Ok(self.text.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubNetwork {
    pub ip: Option<String>,
    pub dns: Option<String>,
    pub interface: Option<String>,
}

impl StubNetwork {
    pub fn lan() -> Self {
        Self {
            ip: Some("192.168.1.20".to_string()),
            dns: Some("192.168.1.1".to_string()),
            interface: Some("eth0".to_string()),
        }
    }
}

impl NetworkProbe for StubNetwork {
    fn local_ip(&self) -> Option<String> {
        self.ip.clone()
    }

    fn dns_server(&self) -> Option<String> {
        self.dns.clone()
    }

    fn interface_for(&self, _ip: &str) -> Option<String> {
        self.interface.clone()
    }
}
