/*!
 * Log entry model and text rendering
 *
 * A [`LogEntry`] is one fully formed logged moment. Rendering lives here;
 * reading entries back lives in [`crate::parser`].
 */

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use dualrail_core_probe::SystemContext;
use serde::{Deserialize, Serialize};

use crate::text::{format_timestamp, push_field, push_section, push_top, SEPARATOR};

/// Open structured details attached to an entry
pub type Details = BTreeMap<String, String>;

/// Build a [`Details`] map from `key => value` pairs
///
/// ```
/// let details = dualrail::details! { "file" => "config.jsonc", "lines" => 42 };
/// assert_eq!(details["lines"], "42");
/// ```
#[macro_export]
macro_rules! details {
    () => {
        $crate::entry::Details::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::entry::Details::new();
        $( map.insert(($key).to_string(), ($value).to_string()); )+
        map
    }};
}

/// Entry level
///
/// Any level may follow any other; the only session state is health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Operation,
    Success,
    Failure,
    Error,
    Check,
    Context,
    Debug,
}

impl Level {
    pub const ALL: [Level; 7] = [
        Level::Operation,
        Level::Success,
        Level::Failure,
        Level::Error,
        Level::Check,
        Level::Context,
        Level::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Operation => "OPERATION",
            Level::Success => "SUCCESS",
            Level::Failure => "FAILURE",
            Level::Error => "ERROR",
            Level::Check => "CHECK",
            Level::Context => "CONTEXT",
            Level::Debug => "DEBUG",
        }
    }

    /// Built-in policy: SUCCESS and CHECK stay lightweight
    pub fn default_full_context(&self) -> bool {
        !matches!(self, Level::Success | Level::Check)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown level '{}'", s))
    }
}

/// Concurrency, dependency and state-change tracking
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interactions {
    /// Operations running at the same time
    pub concurrent: Vec<String>,
    /// What this step required or provided
    pub dependencies: BTreeMap<String, String>,
    /// `before -> after` descriptions keyed by what changed
    pub state_changes: BTreeMap<String, String>,
}

impl Interactions {
    pub fn is_empty(&self) -> bool {
        self.concurrent.is_empty() && self.dependencies.is_empty() && self.state_changes.is_empty()
    }
}

/// Routing hints for automated remediation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Primary category (`file_validation`, `system_operation`, ...)
    pub operation_type: Option<String>,
    /// Granular category (`syntax_check`, `permission_check`, ...)
    pub operation_subtype: Option<String>,
    /// Error classification (`permission_denied`, `file_not_found`, ...)
    pub error_type: Option<String>,
    pub error_details: Details,
    /// `automated_fix`, `manual_intervention`, ...
    pub recovery_hint: Option<String>,
    /// Specific fix to apply (`fix_file_permissions`, ...)
    pub recovery_strategy: Option<String>,
    pub recovery_params: Details,
    pub expected: Details,
    pub actual: Details,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }

    pub fn operation(kind: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            operation_type: Some(kind.into()),
            operation_subtype: Some(subtype.into()),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error_type: impl Into<String>, details: Details) -> Self {
        self.error_type = Some(error_type.into());
        self.error_details = details;
        self
    }

    pub fn with_recovery(
        mut self,
        hint: impl Into<String>,
        strategy: impl Into<String>,
        params: Details,
    ) -> Self {
        self.recovery_hint = Some(hint.into());
        self.recovery_strategy = Some(strategy.into());
        self.recovery_params = params;
        self
    }

    pub fn with_state(mut self, expected: Details, actual: Details) -> Self {
        self.expected = expected;
        self.actual = actual;
        self
    }
}

/// One logged moment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub component: String,
    /// `user@host:pid`
    pub actor: String,
    pub correlation_id: String,
    /// Present only for full-context levels
    pub context: Option<SystemContext>,
    pub event: String,
    pub details: Details,
    pub interactions: Option<Interactions>,
    pub metadata: Option<Metadata>,
    pub raw_health: i64,
    pub normalized_health: i32,
    pub health_delta: i32,
}

// Section and item names used in the text form
pub(crate) const ID: &str = "ID";
pub(crate) const ACTOR: &str = "ACTOR";
pub(crate) const CONTEXT: &str = "CONTEXT";
pub(crate) const EVENT: &str = "EVENT";
pub(crate) const DETAILS: &str = "DETAILS";
pub(crate) const INTERACTIONS: &str = "INTERACTIONS";
pub(crate) const METADATA: &str = "METADATA";
pub(crate) const HEALTH: &str = "HEALTH";

pub(crate) const ENV_PREFIX: &str = "env.";
pub(crate) const CONCURRENT_KEY: &str = "concurrent";
pub(crate) const DEPENDS_PREFIX: &str = "depends.";
pub(crate) const CHANGED_PREFIX: &str = "changed.";
pub(crate) const ERROR_PREFIX: &str = "error.";
pub(crate) const PARAM_PREFIX: &str = "param.";
pub(crate) const EXPECTED_PREFIX: &str = "expected.";
pub(crate) const ACTUAL_PREFIX: &str = "actual.";

/// Flatten a context snapshot into `key: value` fields, environment last
pub(crate) fn context_fields(ctx: &SystemContext) -> Vec<(String, String)> {
    let mut fields = vec![
        ("user".to_string(), ctx.user.clone()),
        ("host".to_string(), ctx.host.clone()),
        ("pid".to_string(), ctx.pid.to_string()),
        ("shell".to_string(), ctx.shell.to_string()),
        ("cwd".to_string(), ctx.cwd.clone()),
        ("sudoers".to_string(), ctx.sudoers.to_string()),
        ("load".to_string(), ctx.metrics.load.clone()),
        ("memory".to_string(), ctx.metrics.memory.clone()),
        ("disk".to_string(), ctx.metrics.disk.clone()),
    ];
    fields.extend(
        ctx.env
            .iter()
            .map(|(key, value)| (format!("{ENV_PREFIX}{key}"), value.clone())),
    );
    fields
}

impl LogEntry {
    /// Render the entry as a text block, separator included
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "[{}] {} {}\n",
            format_timestamp(&self.timestamp),
            self.level,
            self.component
        );
        push_top(&mut out, ID, &self.correlation_id);
        push_top(&mut out, ACTOR, &self.actor);

        if let Some(ctx) = &self.context {
            push_section(&mut out, CONTEXT);
            for (key, value) in context_fields(ctx) {
                push_field(&mut out, &key, &value);
            }
        }

        push_top(&mut out, EVENT, &self.event);

        if !self.details.is_empty() {
            push_section(&mut out, DETAILS);
            for (key, value) in &self.details {
                push_field(&mut out, key, value);
            }
        }

        if let Some(interactions) = self.interactions.as_ref().filter(|i| !i.is_empty()) {
            push_section(&mut out, INTERACTIONS);
            if !interactions.concurrent.is_empty() {
                push_field(&mut out, CONCURRENT_KEY, &interactions.concurrent.join("\n"));
            }
            for (key, value) in &interactions.dependencies {
                push_field(&mut out, &format!("{DEPENDS_PREFIX}{key}"), value);
            }
            for (key, value) in &interactions.state_changes {
                push_field(&mut out, &format!("{CHANGED_PREFIX}{key}"), value);
            }
        }

        if let Some(meta) = self.metadata.as_ref().filter(|m| !m.is_empty()) {
            push_section(&mut out, METADATA);
            let named = [
                ("operation_type", &meta.operation_type),
                ("operation_subtype", &meta.operation_subtype),
                ("error_type", &meta.error_type),
                ("recovery_hint", &meta.recovery_hint),
                ("recovery_strategy", &meta.recovery_strategy),
            ];
            for (key, value) in named {
                if let Some(value) = value {
                    push_field(&mut out, key, value);
                }
            }
            let maps = [
                (ERROR_PREFIX, &meta.error_details),
                (PARAM_PREFIX, &meta.recovery_params),
                (EXPECTED_PREFIX, &meta.expected),
                (ACTUAL_PREFIX, &meta.actual),
            ];
            for (prefix, map) in maps {
                for (key, value) in map {
                    push_field(&mut out, &format!("{prefix}{key}"), value);
                }
            }
        }

        push_top(
            &mut out,
            HEALTH,
            &format!(
                "raw={} normalized={}% delta={}",
                self.raw_health, self.normalized_health, self.health_delta
            ),
        );
        out.push_str(SEPARATOR);
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualrail_core_probe::{ShellContext, SudoersContext, SystemMetrics};

    fn entry(level: Level) -> LogEntry {
        LogEntry {
            timestamp: crate::text::parse_timestamp("2026-03-04T05:06:07.891011Z").unwrap(),
            level,
            component: "validate".to_string(),
            actor: "ada@forge:4242".to_string(),
            correlation_id: "validate-4242-1".to_string(),
            context: None,
            event: "Checking: config".to_string(),
            details: details! { "result" => true },
            interactions: None,
            metadata: None,
            raw_health: -6,
            normalized_health: -6,
            health_delta: -6,
        }
    }

    #[test]
    fn test_level_parse_and_display() {
        for level in Level::ALL {
            assert_eq!(level.as_str().parse::<Level>().unwrap(), level);
        }
        assert_eq!("check".parse::<Level>().unwrap(), Level::Check);
        assert!("NOTICE".parse::<Level>().is_err());
    }

    #[test]
    fn test_full_context_policy_table() {
        let full: Vec<Level> = Level::ALL
            .into_iter()
            .filter(Level::default_full_context)
            .collect();
        assert_eq!(
            full,
            vec![
                Level::Operation,
                Level::Failure,
                Level::Error,
                Level::Context,
                Level::Debug
            ]
        );
    }

    #[test]
    fn test_lightweight_entry_text() {
        let text = entry(Level::Check).to_text();
        assert_eq!(
            text,
            "[2026-03-04T05:06:07.891011Z] CHECK validate\n\
             \x20 ID: validate-4242-1\n\
             \x20 ACTOR: ada@forge:4242\n\
             \x20 EVENT: Checking: config\n\
             \x20 DETAILS:\n\
             \x20   result: true\n\
             \x20 HEALTH: raw=-6 normalized=-6% delta=-6\n\
             ---\n"
        );
    }

    #[test]
    fn test_full_context_and_sections_rendered() {
        let mut e = entry(Level::Operation);
        e.health_delta = 10;
        e.context = Some(SystemContext {
            user: "ada".to_string(),
            host: "forge".to_string(),
            pid: 4242,
            shell: ShellContext {
                kind: "bash".to_string(),
                interactive: false,
                login: false,
            },
            cwd: "/srv".to_string(),
            env: BTreeMap::from([("EDITOR".to_string(), "vi".to_string())]),
            sudoers: SudoersContext {
                installed: false,
                valid: false,
                permissions: "unknown".to_string(),
            },
            metrics: SystemMetrics {
                load: "0.10, 0.20, 0.30".to_string(),
                memory: "100MB / 200MB".to_string(),
                disk: "unknown".to_string(),
            },
        });
        e.interactions = Some(Interactions {
            concurrent: vec!["backup".to_string()],
            ..Default::default()
        });
        e.metadata = Some(Metadata::operation("file_validation", "syntax_check"));

        let text = e.to_text();
        assert!(text.contains("  CONTEXT:\n    user: ada\n"));
        assert!(text.contains("    shell: bash (non-interactive, non-login)\n"));
        assert!(text.contains("    env.EDITOR: vi\n"));
        assert!(text.contains("  INTERACTIONS:\n    concurrent: backup\n"));
        assert!(text.contains("  METADATA:\n    operation_type: file_validation\n"));
        assert!(text.contains("delta=10\n"));
        assert!(!text.contains("delta=+"));
    }

    #[test]
    fn test_empty_optional_sections_skipped() {
        let mut e = entry(Level::Success);
        e.details.clear();
        e.interactions = Some(Interactions::default());
        e.metadata = Some(Metadata::default());
        let text = e.to_text();
        assert!(!text.contains("DETAILS"));
        assert!(!text.contains("INTERACTIONS"));
        assert!(!text.contains("METADATA"));
    }
}
