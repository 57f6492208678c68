/*!
 * The debugging rail
 *
 * An [`Inspector`] records *state* where a [`crate::Logger`] records *events*.
 * It shares nothing with a logger except the correlation id handed to it at
 * construction; each writes its own file and neither calls the other.
 *
 * A new inspector is disabled. Until [`Inspector::enable`] succeeds every
 * capture method is a no-op, so instrumentation can stay in production code
 * at the cost of a flag check.
 *
 * Debug files live at `<base>/debug/<component>/<timestamp>-<pid>.debug`, one
 * per enable, and use the same block layout as log files:
 *
 * ```text
 * [2026-01-02T03:04:05.123456Z] DIVERGENCE | validate | ada@forge:4242 | validate-4242-17
 *   EVENT: cache size
 *   CALL SITE: src/validate.rs:88
 *   STATE:
 *     expected: 100
 *     actual: 10
 *     match: false
 * ---
 * ```
 */

use std::backtrace::Backtrace;
use std::fmt::{self, Debug};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dualrail_core_probe::{probes::human_bytes, ContextCapturer, Identity, ProcessMemory, UNKNOWN};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RailConfig;
use crate::entry::{context_fields, Details};
use crate::error::{ParseError, Result};
use crate::parser::{read_blocks, ParsedFile};
use crate::text::{
    format_timestamp, now_micros, push_field, push_section, push_top, sanitize_component,
    sanitize_header_field, RawBlock, SEPARATOR,
};

const EVENT: &str = "EVENT";
const CALL_SITE: &str = "CALL SITE";
const STATE: &str = "STATE";
const HEADER_DELIMITER: &str = " | ";
const BOX_WIDTH: usize = 64;

/// Tag carried by every inspection entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionKind {
    Snapshot,
    ExpectedState,
    Divergence,
    Timing,
    SlowTiming,
    Counter,
    CountDivergence,
    Flow,
    UnexpectedFlow,
    Conditional,
    #[serde(rename = "CALLSTACK")]
    CallStack,
    SystemContext,
    Memory,
    Checkpoint,
}

impl InspectionKind {
    pub const ALL: [InspectionKind; 14] = [
        InspectionKind::Snapshot,
        InspectionKind::ExpectedState,
        InspectionKind::Divergence,
        InspectionKind::Timing,
        InspectionKind::SlowTiming,
        InspectionKind::Counter,
        InspectionKind::CountDivergence,
        InspectionKind::Flow,
        InspectionKind::UnexpectedFlow,
        InspectionKind::Conditional,
        InspectionKind::CallStack,
        InspectionKind::SystemContext,
        InspectionKind::Memory,
        InspectionKind::Checkpoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionKind::Snapshot => "SNAPSHOT",
            InspectionKind::ExpectedState => "EXPECTED_STATE",
            InspectionKind::Divergence => "DIVERGENCE",
            InspectionKind::Timing => "TIMING",
            InspectionKind::SlowTiming => "SLOW_TIMING",
            InspectionKind::Counter => "COUNTER",
            InspectionKind::CountDivergence => "COUNT_DIVERGENCE",
            InspectionKind::Flow => "FLOW",
            InspectionKind::UnexpectedFlow => "UNEXPECTED_FLOW",
            InspectionKind::Conditional => "CONDITIONAL",
            InspectionKind::CallStack => "CALLSTACK",
            InspectionKind::SystemContext => "SYSTEM_CONTEXT",
            InspectionKind::Memory => "MEMORY",
            InspectionKind::Checkpoint => "CHECKPOINT",
        }
    }

    /// Reality disagreed with what the caller expected
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            InspectionKind::Divergence
                | InspectionKind::SlowTiming
                | InspectionKind::CountDivergence
                | InspectionKind::UnexpectedFlow
        )
    }
}

impl fmt::Display for InspectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InspectionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        InspectionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown inspection kind '{}'", s))
    }
}

/// One captured state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: InspectionKind,
    pub component: String,
    pub actor: String,
    pub correlation_id: String,
    pub label: String,
    /// `file:line` of the instrumented call
    pub call_site: String,
    pub state: Details,
}

impl InspectionEntry {
    /// Header fields are passed through [`sanitize_header_field`] so a stray
    /// `|` cannot shift the columns.
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "[{}] {}\n",
            format_timestamp(&self.timestamp),
            [
                self.kind.as_str().to_string(),
                sanitize_header_field(&self.component),
                sanitize_header_field(&self.actor),
                sanitize_header_field(&self.correlation_id),
            ]
            .join(HEADER_DELIMITER)
        );
        push_top(&mut out, EVENT, &self.label);
        push_top(&mut out, CALL_SITE, &self.call_site);
        if !self.state.is_empty() {
            push_section(&mut out, STATE);
            for (key, value) in &self.state {
                push_field(&mut out, key, value);
            }
        }
        out.push_str(SEPARATOR);
        out.push('\n');
        out
    }
}

/// State inspector for one component, paired with a logger by correlation id
#[derive(Debug)]
pub struct Inspector {
    component: String,
    correlation_id: String,
    identity: Identity,
    dir: PathBuf,
    extension: String,
    default_stack_depth: usize,
    capturer: ContextCapturer,
    output: Option<PathBuf>,
    enabled: bool,
    written: u64,
    dropped: u64,
}

impl Inspector {
    /// Create a disabled inspector sharing `correlation_id` with its logger
    pub fn new(
        component: impl Into<String>,
        correlation_id: impl Into<String>,
        config: &RailConfig,
    ) -> Self {
        let component = sanitize_component(&component.into());
        Self {
            dir: config.debug_dir(&component),
            component,
            correlation_id: sanitize_header_field(&correlation_id.into()),
            identity: Identity::current(),
            extension: config.inspector.file_extension.clone(),
            default_stack_depth: config.inspector.default_stack_depth,
            capturer: ContextCapturer::new(config.probe_settings()),
            output: None,
            enabled: false,
            written: 0,
            dropped: 0,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Debug file of the current session, once enabled
    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn written_entries(&self) -> u64 {
        self.written
    }

    pub fn dropped_entries(&self) -> u64 {
        self.dropped
    }

    /// Start capturing
    ///
    /// The first call creates the debug file and writes the session header.
    /// Enabling again after [`Inspector::disable`] resumes the same file.
    pub fn enable(&mut self) -> Result<&Path> {
        if self.output.is_none() {
            fs::create_dir_all(&self.dir)?;
            let started = Utc::now();
            let name = format!(
                "{}-{}.{}",
                started.format("%Y%m%dT%H%M%S%.6fZ"),
                self.identity.pid,
                self.extension
            );
            let path = self.dir.join(name);

            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(self.session_header(&started).as_bytes())?;

            debug!("Inspector {} writing to {}", self.component, path.display());
            self.output = Some(path);
        }

        self.enabled = true;
        Ok(self.output.as_deref().unwrap_or(&self.dir))
    }

    /// Stop capturing; the session file is kept for a later `enable`
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// End the session; a later `enable` starts a new file
    pub fn close(&mut self) {
        self.enabled = false;
        self.output = None;
    }

    fn session_header(&self, started: &DateTime<Utc>) -> String {
        let rule = "═".repeat(BOX_WIDTH);
        format!(
            "╔{rule}╗\n\
             ║ DEBUG SESSION: {}\n\
             ║ Correlation: {}\n\
             ║ Process: {}  Started: {}\n\
             ╚{rule}╝\n\n",
            self.component,
            self.correlation_id,
            self.identity.actor(),
            format_timestamp(started),
        )
    }

    fn record(
        &mut self,
        kind: InspectionKind,
        label: &str,
        site: &Location<'_>,
        state: Details,
    ) -> Option<InspectionKind> {
        if !self.enabled {
            return None;
        }
        let path = self.output.as_ref()?;

        let entry = InspectionEntry {
            timestamp: now_micros(),
            kind,
            component: self.component.clone(),
            actor: self.identity.actor(),
            correlation_id: self.correlation_id.clone(),
            label: label.to_string(),
            call_site: format!("{}:{}", site.file(), site.line()),
            state,
        };

        let result = OpenOptions::new()
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(entry.to_text().as_bytes()));

        match result {
            Ok(()) => {
                self.written += 1;
                Some(kind)
            }
            Err(e) => {
                warn!("Dropped inspection entry for {}: {}", path.display(), e);
                self.dropped += 1;
                None
            }
        }
    }

    /// EXPECTED_STATE when `expected == actual`, DIVERGENCE otherwise
    ///
    /// Returns the kind written, or `None` when nothing was written.
    #[track_caller]
    pub fn expected_state<E, A>(
        &mut self,
        label: &str,
        expected: E,
        actual: A,
        details: Details,
    ) -> Option<InspectionKind>
    where
        E: PartialEq<A> + Debug,
        A: Debug,
    {
        let site = Location::caller();
        if !self.enabled {
            return None;
        }

        let matched = expected == actual;
        let mut state = details;
        state.insert("expected".to_string(), format!("{expected:?}"));
        state.insert("actual".to_string(), format!("{actual:?}"));
        state.insert("match".to_string(), matched.to_string());

        let kind = if matched {
            InspectionKind::ExpectedState
        } else {
            InspectionKind::Divergence
        };
        self.record(kind, label, site, state)
    }

    /// TIMING when `actual <= max`, SLOW_TIMING otherwise
    #[track_caller]
    pub fn timing(
        &mut self,
        label: &str,
        actual: Duration,
        max: Duration,
    ) -> Option<InspectionKind> {
        let site = Location::caller();
        if !self.enabled {
            return None;
        }

        let within = actual <= max;
        let actual_ms = actual.as_secs_f64() * 1000.0;
        let max_ms = max.as_secs_f64() * 1000.0;
        let mut state = Details::new();
        state.insert("duration_ms".to_string(), format!("{actual_ms:.3}"));
        state.insert("max_ms".to_string(), format!("{max_ms:.3}"));
        state.insert("variance_ms".to_string(), format!("{:+.3}", actual_ms - max_ms));
        state.insert("within_limit".to_string(), within.to_string());

        let kind = if within {
            InspectionKind::Timing
        } else {
            InspectionKind::SlowTiming
        };
        self.record(kind, label, site, state)
    }

    /// COUNTER on match, COUNT_DIVERGENCE otherwise
    #[track_caller]
    pub fn counter(&mut self, label: &str, expected: i64, actual: i64) -> Option<InspectionKind> {
        let site = Location::caller();
        let mut state = Details::new();
        state.insert("expected".to_string(), expected.to_string());
        state.insert("actual".to_string(), actual.to_string());
        let difference = i128::from(actual) - i128::from(expected);
        state.insert("difference".to_string(), format!("{:+}", difference));

        let kind = if expected == actual {
            InspectionKind::Counter
        } else {
            InspectionKind::CountDivergence
        };
        self.record(kind, label, site, state)
    }

    /// FLOW when the branch taken is the one expected
    #[track_caller]
    pub fn flow(
        &mut self,
        label: &str,
        expected_path: &str,
        actual_path: &str,
    ) -> Option<InspectionKind> {
        let site = Location::caller();
        let mut state = Details::new();
        state.insert("expected_path".to_string(), expected_path.to_string());
        state.insert("actual_path".to_string(), actual_path.to_string());

        let kind = if expected_path == actual_path {
            InspectionKind::Flow
        } else {
            InspectionKind::UnexpectedFlow
        };
        self.record(kind, label, site, state)
    }

    /// Writes only when `condition` holds
    #[track_caller]
    pub fn conditional_snapshot(
        &mut self,
        label: &str,
        condition: bool,
        details: Details,
    ) -> Option<InspectionKind> {
        let site = Location::caller();
        if !condition {
            return None;
        }
        self.record(InspectionKind::Conditional, label, site, details)
    }

    /// Up to `depth` frames of the current stack; 0 uses the configured default
    #[track_caller]
    pub fn call_stack(&mut self, label: &str, depth: usize) -> Option<InspectionKind> {
        let site = Location::caller();
        if !self.enabled {
            return None;
        }

        let depth = if depth == 0 {
            self.default_stack_depth
        } else {
            depth
        };
        let frames = stack_frames(&Backtrace::force_capture().to_string(), depth);

        let mut state = Details::new();
        state.insert("depth".to_string(), frames.len().to_string());
        for (index, frame) in frames.iter().enumerate() {
            state.insert(format!("frame.{index:02}"), frame.clone());
        }
        self.record(InspectionKind::CallStack, label, site, state)
    }

    /// Full host snapshot, plus platform facts
    #[track_caller]
    pub fn system_context(&mut self, label: &str) -> Option<InspectionKind> {
        let site = Location::caller();
        if !self.enabled {
            return None;
        }

        let ctx = self.capturer.capture(&self.identity);
        let mut state: Details = context_fields(&ctx).into_iter().collect();
        state.insert("os".to_string(), std::env::consts::OS.to_string());
        state.insert("arch".to_string(), std::env::consts::ARCH.to_string());
        state.insert(
            "num_cpu".to_string(),
            std::thread::available_parallelism()
                .map(|n| n.get().to_string())
                .unwrap_or_else(|_| UNKNOWN.to_string()),
        );
        self.record(InspectionKind::SystemContext, label, site, state)
    }

    /// Process memory usage; keys in `details` win over measured ones
    #[track_caller]
    pub fn memory(&mut self, label: &str, details: Details) -> Option<InspectionKind> {
        let site = Location::caller();
        if !self.enabled {
            return None;
        }

        let mut state = Details::new();
        match ProcessMemory::current() {
            Some(mem) => {
                state.insert("resident_bytes".to_string(), mem.resident.to_string());
                state.insert("resident".to_string(), human_bytes(mem.resident));
                state.insert("virtual_bytes".to_string(), mem.virtual_size.to_string());
                state.insert("virtual".to_string(), human_bytes(mem.virtual_size));
            }
            None => {
                state.insert("resident".to_string(), UNKNOWN.to_string());
                state.insert("virtual".to_string(), UNKNOWN.to_string());
            }
        }
        state.extend(details);
        self.record(InspectionKind::Memory, label, site, state)
    }

    /// Waypoint marker
    #[track_caller]
    pub fn checkpoint(&mut self, label: &str, details: Details) -> Option<InspectionKind> {
        let site = Location::caller();
        self.record(InspectionKind::Checkpoint, label, site, details)
    }

    /// Plain state capture
    #[track_caller]
    pub fn snapshot(&mut self, label: &str, details: Details) -> Option<InspectionKind> {
        let site = Location::caller();
        self.record(InspectionKind::Snapshot, label, site, details)
    }
}

/// `function (file:line)` for each frame outside the capture machinery
fn stack_frames(rendered: &str, depth: usize) -> Vec<String> {
    let mut frames: Vec<(String, Option<String>)> = Vec::new();

    for line in rendered.lines() {
        let trimmed = line.trim();
        if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                last.1.get_or_insert_with(|| location.to_string());
            }
            continue;
        }
        if let Some((index, function)) = trimmed.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                frames.push((function.to_string(), None));
            }
        }
    }

    frames
        .into_iter()
        .filter(|(function, _)| {
            !function.contains("backtrace") && !function.contains("Inspector::call_stack")
        })
        .take(depth)
        .map(|(function, location)| match location {
            Some(location) => format!("{function} ({location})"),
            None => function,
        })
        .collect()
}

fn is_session_header(line: &str) -> bool {
    line.starts_with(['╔', '║', '╚'])
}

fn decode_inspection(block: &RawBlock) -> std::result::Result<InspectionEntry, ParseError> {
    let (timestamp, rest) = block.split_header()?;
    let parts: Vec<&str> = rest.splitn(4, HEADER_DELIMITER).collect();
    let &[kind, component, actor, correlation_id] = parts.as_slice() else {
        return Err(ParseError::malformed(
            block.header_line,
            "header needs KIND | component | actor | id",
        ));
    };
    let kind: InspectionKind = kind
        .parse()
        .map_err(|e: String| ParseError::malformed(block.header_line, e))?;

    let mut label = None;
    let mut call_site = None;
    let mut state = Details::new();
    for item in &block.items {
        match item.name.as_str() {
            EVENT => label = Some(item.value.clone()),
            CALL_SITE => call_site = Some(item.value.clone()),
            STATE => {
                state = item
                    .fields
                    .iter()
                    .map(|field| (field.key.clone(), field.value.clone()))
                    .collect()
            }
            other => {
                return Err(ParseError::malformed(
                    item.line,
                    format!("unknown section '{other}'"),
                ))
            }
        }
    }

    let missing =
        |name: &str| ParseError::malformed(block.header_line, format!("missing {name} line"));
    Ok(InspectionEntry {
        timestamp,
        kind,
        component: component.to_string(),
        actor: actor.to_string(),
        correlation_id: correlation_id.to_string(),
        label: label.ok_or_else(|| missing(EVENT))?,
        call_site: call_site.ok_or_else(|| missing(CALL_SITE))?,
        state,
    })
}

/// Read every inspection entry of a debug file
pub fn read_debug_file(path: impl AsRef<Path>) -> ParsedFile<InspectionEntry> {
    read_blocks(path.as_ref(), is_session_header, decode_inspection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details;
    use tempfile::TempDir;

    fn enabled(dir: &Path) -> Inspector {
        let mut inspector = Inspector::new("validate", "validate-1-2", &RailConfig::rooted_at(dir));
        inspector.enable().unwrap();
        inspector
    }

    #[test]
    fn test_disabled_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut inspector = Inspector::new("validate", "id", &RailConfig::rooted_at(temp.path()));

        assert!(!inspector.is_enabled());
        assert_eq!(inspector.checkpoint("start", details! {}), None);
        assert_eq!(inspector.expected_state("x", 1, 1, details! {}), None);
        assert!(inspector.output_path().is_none());
        assert!(!temp.path().join("debug").exists());
    }

    #[test]
    fn test_enable_creates_session_file() {
        let temp = TempDir::new().unwrap();
        let inspector = enabled(temp.path());
        let path = inspector.output_path().unwrap();

        assert!(path.starts_with(temp.path().join("debug").join("validate")));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with(&format!("-{}.debug", std::process::id())));
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("DEBUG SESSION: validate"));
        assert!(text.contains("Correlation: validate-1-2"));
    }

    #[test]
    fn test_expected_state_outcomes() {
        let temp = TempDir::new().unwrap();
        let mut inspector = enabled(temp.path());

        assert_eq!(
            inspector.expected_state("answer", 42, 42, details! {}),
            Some(InspectionKind::ExpectedState)
        );
        assert_eq!(
            inspector.expected_state("cache size", 100, 10, details! { "unit" => "MB" }),
            Some(InspectionKind::Divergence)
        );
        assert_eq!(
            inspector.expected_state("name", "abc", String::from("abc"), details! {}),
            Some(InspectionKind::ExpectedState)
        );

        let parsed = read_debug_file(inspector.output_path().unwrap());
        assert!(parsed.is_complete(), "{:?}", parsed.error);
        let divergence = &parsed.entries[1];
        assert_eq!(divergence.state["expected"], "100");
        assert_eq!(divergence.state["actual"], "10");
        assert_eq!(divergence.state["match"], "false");
        assert_eq!(divergence.state["unit"], "MB");
        assert!(divergence.call_site.contains("inspector.rs:"));
    }

    #[test]
    fn test_timing_counter_flow() {
        let temp = TempDir::new().unwrap();
        let mut inspector = enabled(temp.path());
        let ms = Duration::from_millis;

        assert_eq!(inspector.timing("query", ms(5), ms(5)), Some(InspectionKind::Timing));
        assert_eq!(inspector.timing("query", ms(9), ms(5)), Some(InspectionKind::SlowTiming));
        assert_eq!(inspector.counter("retries", 3, 3), Some(InspectionKind::Counter));
        assert_eq!(inspector.counter("retries", 3, 5), Some(InspectionKind::CountDivergence));
        assert_eq!(inspector.flow("branch", "cached", "cached"), Some(InspectionKind::Flow));
        assert_eq!(
            inspector.flow("branch", "cached", "fetch"),
            Some(InspectionKind::UnexpectedFlow)
        );

        let parsed = read_debug_file(inspector.output_path().unwrap());
        assert_eq!(parsed.entries.len(), 6);
        assert_eq!(parsed.entries[1].state["variance_ms"], "+4.000");
        assert_eq!(parsed.entries[3].state["difference"], "+2");
        let divergences = parsed.entries.iter().filter(|e| e.kind.is_divergence()).count();
        assert_eq!(divergences, 3);
    }

    #[test]
    fn test_counter_extremes_do_not_overflow() {
        let temp = TempDir::new().unwrap();
        let mut inspector = enabled(temp.path());

        assert_eq!(
            inspector.counter("wrap", i64::MIN, i64::MAX),
            Some(InspectionKind::CountDivergence)
        );
        assert_eq!(
            inspector.counter("wrap", i64::MAX, i64::MIN),
            Some(InspectionKind::CountDivergence)
        );

        let parsed = read_debug_file(inspector.output_path().unwrap());
        assert!(parsed.is_complete(), "{:?}", parsed.error);
        assert_eq!(parsed.entries[0].state["difference"], "+18446744073709551615");
        assert_eq!(parsed.entries[1].state["difference"], "-18446744073709551615");
    }

    #[test]
    fn test_delimiter_in_header_fields_is_replaced() {
        let temp = TempDir::new().unwrap();
        let config = RailConfig::rooted_at(temp.path());
        let mut inspector = Inspector::new("a | b", "run | 7", &config);
        assert_eq!(inspector.component(), "a___b");
        assert_eq!(inspector.correlation_id(), "run / 7");
        inspector.enable().unwrap();
        inspector.checkpoint("start", details! {});

        let mut entry = read_debug_file(inspector.output_path().unwrap())
            .into_result()
            .unwrap()
            .remove(0);
        assert_eq!(entry.component, "a___b");
        assert_eq!(entry.correlation_id, "run / 7");

        entry.actor = "ada | forge".to_string();
        let text = entry.to_text();
        assert!(text.contains("| ada / forge |"));
        let reread = crate::parser::decode_text(&text, is_session_header, decode_inspection)
            .into_result()
            .unwrap();
        assert_eq!(reread[0].actor, "ada / forge");
        assert_eq!(reread[0].correlation_id, "run / 7");
    }

    #[test]
    fn test_conditional_snapshot_gated() {
        let temp = TempDir::new().unwrap();
        let mut inspector = enabled(temp.path());
        let path = inspector.output_path().unwrap().to_path_buf();
        let before = fs::metadata(&path).unwrap().len();

        assert_eq!(inspector.conditional_snapshot("rare", false, details! { "x" => 1 }), None);
        assert_eq!(fs::metadata(&path).unwrap().len(), before);

        assert_eq!(
            inspector.conditional_snapshot("rare", true, details! { "x" => 1 }),
            Some(InspectionKind::Conditional)
        );
        assert_eq!(read_debug_file(&path).entries.len(), 1);
    }

    #[test]
    fn test_full_state_captures() {
        let temp = TempDir::new().unwrap();
        let mut inspector = enabled(temp.path());

        inspector.call_stack("where", 3);
        inspector.system_context("host");
        inspector.memory("heap", details! { "resident" => "override" });
        inspector.checkpoint("phase 2", details! { "items" => 7 });
        inspector.snapshot("vars", details! { "flag" => true });

        let parsed = read_debug_file(inspector.output_path().unwrap());
        assert!(parsed.is_complete(), "{:?}", parsed.error);
        let kinds: Vec<InspectionKind> = parsed.entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                InspectionKind::CallStack,
                InspectionKind::SystemContext,
                InspectionKind::Memory,
                InspectionKind::Checkpoint,
                InspectionKind::Snapshot
            ]
        );
        let depth: usize = parsed.entries[0].state["depth"].parse().unwrap();
        assert!(depth <= 3);
        assert_eq!(parsed.entries[1].state["os"], std::env::consts::OS);
        assert_eq!(parsed.entries[2].state["resident"], "override");
        assert_eq!(parsed.entries[3].state["items"], "7");
    }

    #[test]
    fn test_disable_and_close() {
        let temp = TempDir::new().unwrap();
        let mut inspector = enabled(temp.path());
        let first = inspector.output_path().unwrap().to_path_buf();

        inspector.disable();
        assert_eq!(inspector.checkpoint("ignored", details! {}), None);
        inspector.enable().unwrap();
        assert_eq!(inspector.output_path().unwrap(), first.as_path());

        inspector.close();
        assert!(!inspector.is_enabled());
        assert!(inspector.output_path().is_none());
        assert_eq!(inspector.written_entries(), 0);
    }

    #[test]
    fn test_stack_frames_parsing() {
        let rendered = "\
   0: std::backtrace::Backtrace::force_capture
             at /rustc/library/std/src/backtrace.rs:312:13
   1: dualrail::inspector::Inspector::call_stack
             at ./src/inspector.rs:400:22
   2: app::run
             at ./src/main.rs:10:5
   3: app::main
";
        assert_eq!(
            stack_frames(rendered, 10),
            vec![
                "app::run (./src/main.rs:10:5)".to_string(),
                "app::main".to_string()
            ]
        );
        assert_eq!(stack_frames(rendered, 1).len(), 1);
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in InspectionKind::ALL {
            assert_eq!(kind.as_str().parse::<InspectionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_truncated_debug_file_keeps_prefix() {
        let temp = TempDir::new().unwrap();
        let mut inspector = enabled(temp.path());
        inspector.checkpoint("one", details! {});
        inspector.checkpoint("two", details! {});
        let path = inspector.output_path().unwrap().to_path_buf();

        let text = fs::read_to_string(&path).unwrap();
        let cut = text.trim_end().strip_suffix(SEPARATOR).unwrap().to_string();
        fs::write(&path, cut).unwrap();

        let parsed = read_debug_file(&path);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].label, "one");
        assert!(parsed.error.is_some());
    }
}
