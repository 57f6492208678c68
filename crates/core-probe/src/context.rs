//! Full system context snapshot
//!
//! A [`SystemContext`] is captured fresh for every full-context entry and is
//! never cached between entries: the working directory, environment and
//! resource usage may all change between two calls.

use crate::identity::Identity;
use crate::probes::{ShellContext, SudoersContext, SystemMetrics};
use crate::UNKNOWN;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variables that change how child tools behave unattended
const RELEVANT_ENV: &[&str] = &[
    "DEBIAN_FRONTEND",
    "NEEDRESTART_MODE",
    "NEEDRESTART_SUSPEND",
    "PIP_NO_INPUT",
    "NPM_CONFIG_YES",
    "GIT_EDITOR",
    "EDITOR",
    "VISUAL",
];

/// Immutable snapshot of process, shell and host state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemContext {
    pub user: String,
    pub host: String,
    pub pid: u32,
    pub shell: ShellContext,
    pub cwd: String,
    /// Relevant and framework-prefixed environment variables
    pub env: BTreeMap<String, String>,
    pub sudoers: SudoersContext,
    pub metrics: SystemMetrics,
}

/// Where the probes look
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Root of the proc filesystem (`/proc`)
    pub proc_root: PathBuf,
    /// Sudoers drop-in whose presence and mode are reported
    pub sudoers_path: PathBuf,
    /// Every variable with this prefix is captured
    pub env_prefix: String,
    /// Individually named variables to capture
    pub relevant_env: Vec<String>,
    /// Path whose disk is measured; `None` measures the working directory
    pub disk_target: Option<PathBuf>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            sudoers_path: PathBuf::from("/etc/sudoers.d/90-dualrail-safe-operations"),
            env_prefix: "DUALRAIL_".to_string(),
            relevant_env: RELEVANT_ENV.iter().map(|s| s.to_string()).collect(),
            disk_target: None,
        }
    }
}

/// Builds [`SystemContext`] snapshots
#[derive(Debug, Clone, Default)]
pub struct ContextCapturer {
    settings: ProbeSettings,
}

impl ContextCapturer {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Capture a snapshot; identity fields come from the caller's memo
    pub fn capture(&self, identity: &Identity) -> SystemContext {
        let cwd = std::env::current_dir().ok();
        let disk_target = self
            .settings
            .disk_target
            .clone()
            .or_else(|| cwd.clone())
            .unwrap_or_default();

        SystemContext {
            user: identity.user.clone(),
            host: identity.host.clone(),
            pid: identity.pid,
            shell: ShellContext::capture(),
            cwd: cwd
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            env: self.capture_env(),
            sudoers: SudoersContext::capture(&self.settings.sudoers_path),
            metrics: SystemMetrics::capture(&self.settings.proc_root, &disk_target),
        }
    }

    fn capture_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        for name in &self.settings.relevant_env {
            if let Ok(value) = std::env::var(name) {
                if !value.is_empty() {
                    env.insert(name.clone(), value);
                }
            }
        }

        if !self.settings.env_prefix.is_empty() {
            for (name, value) in std::env::vars() {
                if name.starts_with(&self.settings.env_prefix) {
                    env.insert(name, value);
                }
            }
        }

        env
    }

    /// Capturer that measures `disk_target` instead of the working directory
    pub fn with_disk_target(mut self, disk_target: impl AsRef<Path>) -> Self {
        self.settings.disk_target = Some(disk_target.as_ref().to_path_buf());
        self
    }
}
