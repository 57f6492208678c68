/*!
 * Configuration for both rails
 *
 * A [`RailConfig`] is built once at startup and passed by reference into
 * [`crate::Logger::new`] and [`crate::Inspector::new`]. It is read from a JSONC
 * file (JSON plus `//` line comments). Loading never fails: a missing or
 * malformed file degrades to built-in defaults, and the [`ConfigTier`] records
 * how much was lost.
 */

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dualrail_core_probe::ProbeSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entry::Level;
use crate::error::{Error, Result};

/// Location of the configuration file under `$HOME`
pub const CONFIG_RELATIVE_PATH: &str = ".dualrail/config/dualrail.jsonc";

/// Default base directory under `$HOME`
pub const BASE_RELATIVE_PATH: &str = ".dualrail/system";

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RailConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub messages: MessagesConfig,

    #[serde(default)]
    pub impacts: ImpactsConfig,

    #[serde(default)]
    pub inspector: InspectorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of `<category>/<component>.log` and `debug/<component>/`
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// Size-based log rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Rotate once the active file has reached this size
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Rotated files kept (`.log.1` ..= `.log.N`)
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: default_max_bytes(),
            retention: default_retention(),
        }
    }
}

/// Component membership of each log category; anything else goes to `system`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_commands")]
    pub commands: Vec<String>,

    #[serde(default = "default_libraries")]
    pub libraries: Vec<String>,

    #[serde(default = "default_scripts")]
    pub scripts: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            commands: default_commands(),
            libraries: default_libraries(),
            scripts: default_scripts(),
        }
    }
}

/// What context is captured and where the probes look
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Per-level override of the full-context policy
    #[serde(default)]
    pub full_context: BTreeMap<Level, bool>,

    #[serde(default = "default_sudoers_path")]
    pub sudoers_path: PathBuf,

    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    #[serde(default = "default_relevant_env")]
    pub relevant_env: Vec<String>,

    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            full_context: BTreeMap::new(),
            sudoers_path: default_sudoers_path(),
            env_prefix: default_env_prefix(),
            relevant_env: default_relevant_env(),
            proc_root: default_proc_root(),
        }
    }
}

/// Event description templates; each `{}` is filled in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_operation_start")]
    pub operation_start: String,

    #[serde(default = "default_check")]
    pub check: String,

    #[serde(default = "default_snapshot")]
    pub snapshot: String,

    #[serde(default = "default_command_completed")]
    pub command_completed: String,

    #[serde(default = "default_command_failed")]
    pub command_failed: String,

    /// Command line built from the program and its joined arguments
    #[serde(default = "default_command_line")]
    pub command_line: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            operation_start: default_operation_start(),
            check: default_check(),
            snapshot: default_snapshot(),
            command_completed: default_command_completed(),
            command_failed: default_command_failed(),
            command_line: default_command_line(),
        }
    }
}

/// Health deltas used by `Logger::log_command`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactsConfig {
    #[serde(default)]
    pub command_operation: i32,

    #[serde(default = "default_command_success")]
    pub command_success: i32,

    #[serde(default = "default_command_failure")]
    pub command_failure: i32,
}

impl Default for ImpactsConfig {
    fn default() -> Self {
        Self {
            command_operation: 0,
            command_success: default_command_success(),
            command_failure: default_command_failure(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectorConfig {
    /// Frames captured by `call_stack` when the caller passes 0
    #[serde(default = "default_stack_depth")]
    pub default_stack_depth: usize,

    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            default_stack_depth: default_stack_depth(),
            file_extension: default_file_extension(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_base_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(BASE_RELATIVE_PATH),
        None => std::env::temp_dir().join("dualrail").join("system"),
    }
}

fn default_max_bytes() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

fn default_retention() -> usize {
    5
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|name| name.to_string()).collect()
}

fn default_commands() -> Vec<String> {
    names(&["validate", "test", "status", "diagnose"])
}

fn default_libraries() -> Vec<String> {
    names(&[
        "operations",
        "sudoers",
        "environment",
        "display",
        "logging",
        "debugging",
    ])
}

fn default_scripts() -> Vec<String> {
    names(&["build"])
}

fn default_sudoers_path() -> PathBuf {
    ProbeSettings::default().sudoers_path
}

fn default_env_prefix() -> String {
    ProbeSettings::default().env_prefix
}

fn default_relevant_env() -> Vec<String> {
    ProbeSettings::default().relevant_env
}

fn default_proc_root() -> PathBuf {
    ProbeSettings::default().proc_root
}

fn default_operation_start() -> String {
    "Starting operation: {}".to_string()
}

fn default_check() -> String {
    "Checking: {}".to_string()
}

fn default_snapshot() -> String {
    "System state snapshot: {}".to_string()
}

fn default_command_completed() -> String {
    "Command completed: {}".to_string()
}

fn default_command_failed() -> String {
    "Command failed: {}".to_string()
}

fn default_command_line() -> String {
    "{} {}".to_string()
}

fn default_command_success() -> i32 {
    10
}

fn default_command_failure() -> i32 {
    -10
}

fn default_stack_depth() -> usize {
    10
}

fn default_file_extension() -> String {
    "debug".to_string()
}

/// How configuration was obtained, from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigTier {
    /// Parsed from the configuration file
    FromFile,
    /// No file; built-in defaults, nothing customised was lost
    MissingFile,
    /// A file existed but could not be used; its customisation is lost
    Malformed,
    /// No home directory; even the base path is a guess under the temp dir
    NoHome,
}

impl ConfigTier {
    /// Health cost of running on this tier
    pub fn health_impact(&self) -> i32 {
        match self {
            ConfigTier::FromFile => 0,
            ConfigTier::MissingFile => -3,
            ConfigTier::Malformed => -17,
            ConfigTier::NoHome => -29,
        }
    }

    pub fn is_degraded(&self) -> bool {
        *self != ConfigTier::FromFile
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigTier::FromFile => "from_file",
            ConfigTier::MissingFile => "missing_file",
            ConfigTier::Malformed => "malformed",
            ConfigTier::NoHome => "no_home",
        }
    }
}

impl fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a non-failing configuration load
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RailConfig,
    pub tier: ConfigTier,
    /// File that was (or would have been) read
    pub source: Option<PathBuf>,
    /// Why the tier is degraded
    pub problem: Option<String>,
}

impl RailConfig {
    /// `$HOME/.dualrail/config/dualrail.jsonc`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_RELATIVE_PATH))
    }

    /// Load from the default location
    pub fn load() -> LoadedConfig {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No home directory; using built-in configuration");
                LoadedConfig {
                    config: RailConfig::default(),
                    tier: ConfigTier::NoHome,
                    source: None,
                    problem: Some("home directory could not be resolved".to_string()),
                }
            }
        }
    }

    /// Load from `path`, degrading to defaults on any problem
    pub fn load_from(path: &Path) -> LoadedConfig {
        let degraded = |tier: ConfigTier, problem: String| LoadedConfig {
            config: RailConfig::default(),
            tier,
            source: Some(path.to_path_buf()),
            problem: Some(problem),
        };

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No configuration at {}; using defaults", path.display());
                return degraded(ConfigTier::MissingFile, format!("{} not found", path.display()));
            }
            Err(e) => {
                warn!("Cannot read configuration {}: {}", path.display(), e);
                return degraded(ConfigTier::Malformed, e.to_string());
            }
        };

        match Self::from_jsonc(&text) {
            Ok(config) => LoadedConfig {
                config,
                tier: ConfigTier::FromFile,
                source: Some(path.to_path_buf()),
                problem: None,
            },
            Err(e) => {
                warn!("Ignoring malformed configuration {}: {}", path.display(), e);
                degraded(ConfigTier::Malformed, e.to_string())
            }
        }
    }

    /// Parse JSONC text
    pub fn from_jsonc(text: &str) -> Result<Self> {
        let json = strip_jsonc_comments(text);
        let config: RailConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.rotation.max_bytes == 0 {
            return Err(Error::Config("rotation.max_bytes must be positive".to_string()));
        }
        if self.inspector.file_extension.is_empty() {
            return Err(Error::Config("inspector.file_extension is empty".to_string()));
        }
        Ok(())
    }

    /// Defaults with every written path under `dir`
    ///
    /// The proc root stays at its default since it is only read.
    pub fn rooted_at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut config = RailConfig::default();
        config.paths.base_dir = dir.to_path_buf();
        config.context.sudoers_path = dir.join("sudoers.d").join("90-dualrail-safe-operations");
        config
    }

    /// Whether `level` captures a full system context
    pub fn is_full_context(&self, level: Level) -> bool {
        self.context
            .full_context
            .get(&level)
            .copied()
            .unwrap_or_else(|| level.default_full_context())
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            proc_root: self.context.proc_root.clone(),
            sudoers_path: self.context.sudoers_path.clone(),
            env_prefix: self.context.env_prefix.clone(),
            relevant_env: self.context.relevant_env.clone(),
            disk_target: None,
        }
    }

    /// Directory holding debug files for `component`
    pub fn debug_dir(&self, component: &str) -> PathBuf {
        self.paths.base_dir.join("debug").join(component)
    }
}

/// Fill each `{}` in `template` with the next argument
///
/// Missing arguments leave the placeholder in place; extra ones are ignored.
pub fn fill(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut args = args.iter();
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// Remove `//` line comments that are not inside string literals
pub fn strip_jsonc_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                // Drop through end of line, keep the newline for line numbers
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RailConfig::default();
        assert!(config.rotation.enabled);
        assert_eq!(config.rotation.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.rotation.retention, 5);
        assert!(config.routing.commands.contains(&"validate".to_string()));
        assert_eq!(config.routing.scripts, vec!["build".to_string()]);
        assert_eq!(config.impacts.command_failure, -10);
        assert_eq!(config.inspector.default_stack_depth, 10);
    }

    #[test]
    fn test_strip_comments_outside_strings() {
        let text = r#"{
            // leading comment
            "url": "http://example.com", // trailing
            "quoted": "a \" // not a comment"
        }"#;
        let stripped = strip_jsonc_comments(text);
        assert!(!stripped.contains("leading comment"));
        assert!(!stripped.contains("trailing"));
        assert!(stripped.contains("http://example.com"));
        assert!(stripped.contains(r#""a \" // not a comment""#));
        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["url"], "http://example.com");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = RailConfig::from_jsonc(
            r#"{
                // Only rotation is customised
                "rotation": { "max_bytes": 2048 },
                "context": { "full_context": { "SUCCESS": true, "DEBUG": false } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.rotation.max_bytes, 2048);
        assert_eq!(config.rotation.retention, 5);
        assert!(config.is_full_context(Level::Success));
        assert!(!config.is_full_context(Level::Debug));
        assert!(config.is_full_context(Level::Operation));
        assert!(!config.is_full_context(Level::Check));
        assert_eq!(config.messages.check, "Checking: {}");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = RailConfig::from_jsonc(r#"{ "rotation": { "max_bytes": 0 } }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = RailConfig::from_jsonc("{ not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_load_tiers() {
        let temp = TempDir::new().unwrap();

        let missing = RailConfig::load_from(&temp.path().join("absent.jsonc"));
        assert_eq!(missing.tier, ConfigTier::MissingFile);
        assert_eq!(missing.config, RailConfig::default());

        let bad = temp.path().join("bad.jsonc");
        std::fs::write(&bad, "{ \"rotation\": ").unwrap();
        let malformed = RailConfig::load_from(&bad);
        assert_eq!(malformed.tier, ConfigTier::Malformed);
        assert!(malformed.problem.is_some());

        let good = temp.path().join("good.jsonc");
        std::fs::write(
            &good,
            "// comment only header\n{ \"inspector\": { \"file_extension\": \"dbg\" } }",
        )
        .unwrap();
        let loaded = RailConfig::load_from(&good);
        assert_eq!(loaded.tier, ConfigTier::FromFile);
        assert_eq!(loaded.config.inspector.file_extension, "dbg");
    }

    #[test]
    fn test_tier_costs_ordered_by_severity() {
        let tiers = [
            ConfigTier::FromFile,
            ConfigTier::MissingFile,
            ConfigTier::Malformed,
            ConfigTier::NoHome,
        ];
        for pair in tiers.windows(2) {
            assert!(pair[0].health_impact() > pair[1].health_impact());
        }
        assert!(!ConfigTier::FromFile.is_degraded());
    }

    #[test]
    fn test_fill_placeholders() {
        assert_eq!(fill("Checking: {}", &["disk"]), "Checking: disk");
        assert_eq!(fill("{} {}", &["ls", "-la /tmp"]), "ls -la /tmp");
        assert_eq!(fill("{} and {}", &["one"]), "one and {}");
        assert_eq!(fill("static", &["ignored"]), "static");
    }

    #[test]
    fn test_rooted_at() {
        let temp = TempDir::new().unwrap();
        let config = RailConfig::rooted_at(temp.path());
        assert_eq!(config.paths.base_dir, temp.path());
        assert!(config.context.sudoers_path.starts_with(temp.path()));
        assert_eq!(
            config.debug_dir("validate"),
            temp.path().join("debug").join("validate")
        );
    }
}
