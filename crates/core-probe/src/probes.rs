//! Individual read-only probes
//!
//! Each probe either reads what it needs or falls back to [`UNKNOWN`].
//! Nothing in this module returns an error.

use crate::UNKNOWN;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::IsTerminal;
use std::path::Path;
use sysinfo::{Disks, Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

/// Permissions a sudoers drop-in must carry to be considered valid
const SUDOERS_VALID_MODE: u32 = 0o440;

const KIB_PER_MIB: u64 = 1024;

/// Shell the process was started from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellContext {
    /// Shell program basename (`bash`, `zsh`, ...)
    pub kind: String,
    /// Stdin is a terminal
    pub interactive: bool,
    /// Login shell (`SHLVL` of 1)
    pub login: bool,
}

impl ShellContext {
    pub fn capture() -> Self {
        let kind = std::env::var("SHELL")
            .ok()
            .filter(|shell| !shell.is_empty())
            .and_then(|shell| {
                Path::new(&shell)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| UNKNOWN.to_string());

        let login = std::env::var("SHLVL").map(|lvl| lvl == "1").unwrap_or(false);

        Self {
            kind,
            interactive: std::io::stdin().is_terminal(),
            login,
        }
    }

    /// Parse the `bash (interactive, login)` form written by `Display`
    pub fn parse(text: &str) -> Option<Self> {
        let (kind, modes) = text.split_once(" (")?;
        let modes = modes.strip_suffix(')')?;
        let (interactive, login) = modes.split_once(", ")?;

        let interactive = match interactive {
            "interactive" => true,
            "non-interactive" => false,
            _ => return None,
        };
        let login = match login {
            "login" => true,
            "non-login" => false,
            _ => return None,
        };

        Some(Self {
            kind: kind.to_string(),
            interactive,
            login,
        })
    }
}

impl fmt::Display for ShellContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interactive = if self.interactive {
            "interactive"
        } else {
            "non-interactive"
        };
        let login = if self.login { "login" } else { "non-login" };
        write!(f, "{} ({}, {})", self.kind, interactive, login)
    }
}

/// Elevated-privilege configuration state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SudoersContext {
    /// The sudoers drop-in exists
    pub installed: bool,
    /// The drop-in carries mode 0440
    pub valid: bool,
    /// Octal mode, or `unknown` when the file is absent
    pub permissions: String,
}

impl SudoersContext {
    pub fn capture(path: &Path) -> Self {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("sudoers file {} not readable: {}", path.display(), e);
                return Self {
                    installed: false,
                    valid: false,
                    permissions: UNKNOWN.to_string(),
                };
            }
        };

        match file_mode(&metadata) {
            Some(mode) => Self {
                installed: true,
                valid: mode == SUDOERS_VALID_MODE,
                permissions: format!("{:04o}", mode),
            },
            None => {
                debug!("no permission bits for {}", path.display());
                Self {
                    installed: true,
                    valid: false,
                    permissions: UNKNOWN.to_string(),
                }
            }
        }
    }

    /// Parse the `installed=.. valid=.. permissions=..` form written by `Display`
    pub fn parse(text: &str) -> Option<Self> {
        let mut installed = None;
        let mut valid = None;
        let mut permissions = None;

        for pair in text.split_whitespace() {
            let (key, value) = pair.split_once('=')?;
            match key {
                "installed" => installed = value.parse().ok(),
                "valid" => valid = value.parse().ok(),
                "permissions" => permissions = Some(value.to_string()),
                _ => return None,
            }
        }

        Some(Self {
            installed: installed?,
            valid: valid?,
            permissions: permissions?,
        })
    }
}

impl fmt::Display for SudoersContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "installed={} valid={} permissions={}",
            self.installed, self.valid, self.permissions
        )
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}

/// Host resource usage snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// 1, 5 and 15 minute load averages
    pub load: String,
    /// `usedMB / totalMB`
    pub memory: String,
    /// `used / total (pct%)` for the disk holding the target path
    pub disk: String,
}

impl SystemMetrics {
    /// Probe load and memory under `proc_root`, disk usage for `disk_target`
    pub fn capture(proc_root: &Path, disk_target: &Path) -> Self {
        Self {
            load: or_unknown("load", load_average(proc_root)),
            memory: or_unknown("memory", memory_usage(proc_root)),
            disk: or_unknown("disk", disk_usage(disk_target)),
        }
    }

    /// Every metric reported the sentinel
    pub fn is_unknown(&self) -> bool {
        self.load == UNKNOWN && self.memory == UNKNOWN && self.disk == UNKNOWN
    }
}

fn or_unknown(metric: &str, value: Option<String>) -> String {
    value.unwrap_or_else(|| {
        debug!("{} metric unavailable, reporting {}", metric, UNKNOWN);
        UNKNOWN.to_string()
    })
}

fn load_average(proc_root: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(proc_root.join("loadavg")).ok()?;
    let fields: Vec<&str> = raw.split_whitespace().take(3).collect();
    if fields.len() < 3 {
        return None;
    }
    Some(fields.join(", "))
}

fn memory_usage(proc_root: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(proc_root.join("meminfo")).ok()?;

    let mut total_kib = None;
    let mut available_kib = None;
    for line in raw.lines() {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some("MemTotal:"), Some(value)) => total_kib = value.parse::<u64>().ok(),
            (Some("MemAvailable:"), Some(value)) => available_kib = value.parse::<u64>().ok(),
            _ => {}
        }
        if total_kib.is_some() && available_kib.is_some() {
            break;
        }
    }

    let total = total_kib.filter(|kib| *kib > 0)?;
    let available = available_kib?;
    let used = total.saturating_sub(available);
    Some(format!(
        "{}MB / {}MB",
        used / KIB_PER_MIB,
        total / KIB_PER_MIB
    ))
}

fn disk_usage(target: &Path) -> Option<String> {
    let disks = Disks::new_with_refreshed_list();

    // Longest mount point that contains the target wins.
    let disk = disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())?;

    let total = disk.total_space();
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(disk.available_space());
    let pct = used.saturating_mul(100) / total;
    Some(format!(
        "{} / {} ({}%)",
        human_bytes(used),
        human_bytes(total),
        pct
    ))
}

/// Compact `df -h` style size
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}{}", bytes, UNITS[0])
    } else if value < 10.0 {
        format!("{:.1}{}", value, UNITS[unit])
    } else {
        format!("{:.0}{}", value, UNITS[unit])
    }
}

/// Memory held by the current process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMemory {
    /// Resident set size in bytes
    pub resident: u64,
    /// Virtual memory in bytes
    pub virtual_size: u64,
}

impl ProcessMemory {
    /// Probe the current process, `None` when the platform hides it
    pub fn current() -> Option<Self> {
        let pid = Pid::from_u32(std::process::id());
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        let process = sys.process(pid)?;
        Some(Self {
            resident: process.memory(),
            virtual_size: process.virtual_memory(),
        })
    }
}
