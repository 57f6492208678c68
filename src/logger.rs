/*!
 * The logging rail
 *
 * A [`Logger`] records one logical unit of work (a command invocation, a
 * script run) for one component. Each call builds an entry, captures a
 * full system context when the level's policy asks for one, applies the
 * caller's health delta, and appends the rendered entry to the component's
 * routed log file.
 *
 * No method returns an error. Writes report a [`Delivery`]; a dropped entry is
 * counted and reported through `tracing`, never raised to the caller.
 *
 * # Single writer
 *
 * Health accumulation is a read-modify-write on plain fields, so every
 * recording method takes `&mut self`. Share a logger between threads only
 * behind a `Mutex`, and never reuse one across unrelated units of work:
 * health accumulates for the lifetime of the instance.
 *
 * ```no_run
 * use dualrail::{details, Logger, RailConfig};
 *
 * let config = RailConfig::load().config;
 * let mut logger = Logger::new("validate", &config);
 * logger.declare_total(100);
 * logger.operation("validate", &["config.jsonc"], 5);
 * logger.check("syntax", true, 20, details! { "file" => "config.jsonc" });
 * logger.success("Validation complete", 75, details! {});
 * assert_eq!(logger.health(), 100);
 * ```
 */

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use chrono::Utc;
use dualrail_core_probe::{ContextCapturer, Identity};
use tracing::{debug, warn};

use crate::config::{fill, ImpactsConfig, LoadedConfig, MessagesConfig, RailConfig};
use crate::entry::{Details, Interactions, Level, LogEntry, Metadata};
use crate::health::HealthScore;
use crate::router::{Delivery, Router};
use crate::text::{now_micros, sanitize_component};

/// `<component>-<pid>-<unix nanos>`
pub fn correlation_id_for(component: &str, pid: u32, unix_nanos: i64) -> String {
    format!("{component}-{pid}-{unix_nanos}")
}

/// One event waiting to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub description: String,
    pub delta: i32,
    pub details: Details,
    pub interactions: Option<Interactions>,
    pub metadata: Option<Metadata>,
}

impl Event {
    pub fn new(level: Level, description: impl Into<String>, delta: i32) -> Self {
        Self {
            level,
            description: description.into(),
            delta,
            details: Details::new(),
            interactions: None,
            metadata: None,
        }
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details.extend(details);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    pub fn with_interactions(mut self, interactions: Interactions) -> Self {
        self.interactions = Some(interactions);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// What `log_command` observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    /// Program and arguments as logged
    pub command: String,
    /// `None` when the child never ran or was killed by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
    /// Set when the program could not be started
    pub spawn_error: Option<String>,
}

impl CommandReport {
    pub fn succeeded(&self) -> bool {
        self.spawn_error.is_none() && self.exit_code == Some(0)
    }
}

/// Health-scored structured logger for one component
#[derive(Debug)]
pub struct Logger {
    component: String,
    correlation_id: String,
    log_path: PathBuf,
    identity: Identity,
    health: HealthScore,
    router: Router,
    capturer: ContextCapturer,
    full_context: BTreeMap<Level, bool>,
    messages: MessagesConfig,
    impacts: ImpactsConfig,
    written: u64,
    dropped: u64,
}

impl Logger {
    /// Create a logger, allocating its correlation id and resolving its path
    ///
    /// Identity (user, host, pid) is computed once here and reused for every
    /// entry. The component name is cleaned with [`sanitize_component`] so it
    /// is always a single header word and a plain file name.
    pub fn new(component: impl Into<String>, config: &RailConfig) -> Self {
        let component = sanitize_component(&component.into());
        let identity = Identity::current();
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let correlation_id = correlation_id_for(&component, identity.pid, nanos);
        let router = Router::new(config);
        let log_path = router.resolve_path(&component);

        let full_context = Level::ALL
            .into_iter()
            .map(|level| (level, config.is_full_context(level)))
            .collect();

        debug!(
            "Logger {} ({}) writing to {}",
            component,
            correlation_id,
            log_path.display()
        );

        Self {
            component,
            correlation_id,
            log_path,
            identity,
            health: HealthScore::new(),
            router,
            capturer: ContextCapturer::new(config.probe_settings()),
            full_context,
            messages: config.messages.clone(),
            impacts: config.impacts,
            written: 0,
            dropped: 0,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Identifier to hand to a paired [`crate::Inspector`]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Normalized health, -100..=100
    pub fn health(&self) -> i32 {
        self.health.normalized()
    }

    pub fn raw_health(&self) -> i64 {
        self.health.raw()
    }

    pub fn health_score(&self) -> &HealthScore {
        &self.health
    }

    /// Declare the normalization denominator; call once before any event
    pub fn declare_total(&mut self, total: i64) {
        self.health.declare_total(total);
    }

    pub fn written_entries(&self) -> u64 {
        self.written
    }

    /// Entries lost to I/O failures
    pub fn dropped_entries(&self) -> u64 {
        self.dropped
    }

    /// Record an event
    pub fn emit(&mut self, event: Event) -> Delivery {
        let full = self
            .full_context
            .get(&event.level)
            .copied()
            .unwrap_or_else(|| event.level.default_full_context());
        let context = full.then(|| self.capturer.capture(&self.identity));

        let normalized = self.health.apply(event.delta);

        let entry = LogEntry {
            timestamp: now_micros(),
            level: event.level,
            component: self.component.clone(),
            actor: self.identity.actor(),
            correlation_id: self.correlation_id.clone(),
            context,
            event: event.description,
            details: event.details,
            interactions: event.interactions.filter(|i| !i.is_empty()),
            metadata: event.metadata.filter(|m| !m.is_empty()),
            raw_health: self.health.raw(),
            normalized_health: normalized,
            health_delta: event.delta,
        };

        let delivery = self.router.append(&self.log_path, &entry.to_text());
        match delivery {
            Delivery::Written => self.written += 1,
            Delivery::Dropped => self.dropped += 1,
        }
        delivery
    }

    /// Start of an operation, with the full command line
    pub fn operation(&mut self, command: &str, args: &[&str], delta: i32) -> Delivery {
        let description = fill(&self.messages.operation_start, &[command]);
        let command_line = self.command_line(command, args);
        self.emit(
            Event::new(Level::Operation, description, delta).with_detail("command", command_line),
        )
    }

    pub fn success(&mut self, event: &str, delta: i32, details: Details) -> Delivery {
        self.emit(Event::new(Level::Success, event, delta).with_details(details))
    }

    pub fn success_with_metadata(
        &mut self,
        event: &str,
        delta: i32,
        details: Details,
        metadata: Metadata,
    ) -> Delivery {
        self.emit(
            Event::new(Level::Success, event, delta)
                .with_details(details)
                .with_metadata(metadata),
        )
    }

    /// Expected failure; `reason` is stored in the details
    pub fn failure(&mut self, event: &str, reason: &str, delta: i32, details: Details) -> Delivery {
        self.emit(
            Event::new(Level::Failure, event, delta)
                .with_details(details)
                .with_detail("reason", reason),
        )
    }

    pub fn failure_with_metadata(
        &mut self,
        event: &str,
        reason: &str,
        delta: i32,
        details: Details,
        metadata: Metadata,
    ) -> Delivery {
        self.emit(
            Event::new(Level::Failure, event, delta)
                .with_details(details)
                .with_detail("reason", reason)
                .with_metadata(metadata),
        )
    }

    /// Unexpected error, with its source chain and a stack trace
    pub fn error(&mut self, event: &str, err: &dyn StdError, delta: i32) -> Delivery {
        let mut record = Event::new(Level::Error, event, delta).with_detail("error", err);

        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        if !causes.is_empty() {
            record = record.with_detail("caused_by", causes.join("\n"));
        }

        let trace = Backtrace::force_capture().to_string();
        self.emit(record.with_detail("stack_trace", trace.trim_end()))
    }

    /// Validation result; `result` is stored in the details
    pub fn check(&mut self, what: &str, result: bool, delta: i32, details: Details) -> Delivery {
        let description = fill(&self.messages.check, &[what]);
        self.emit(
            Event::new(Level::Check, description, delta)
                .with_details(details)
                .with_detail("result", result),
        )
    }

    pub fn check_with_metadata(
        &mut self,
        what: &str,
        result: bool,
        delta: i32,
        details: Details,
        metadata: Metadata,
    ) -> Delivery {
        let description = fill(&self.messages.check, &[what]);
        self.emit(
            Event::new(Level::Check, description, delta)
                .with_details(details)
                .with_detail("result", result)
                .with_metadata(metadata),
        )
    }

    /// CONTEXT entry whose value is the captured system state itself
    pub fn snapshot_state(&mut self, label: &str, delta: i32) -> Delivery {
        let description = fill(&self.messages.snapshot, &[label]);
        self.emit(Event::new(Level::Context, description, delta))
    }

    pub fn debug(&mut self, event: &str, delta: i32, state: Details) -> Delivery {
        self.emit(Event::new(Level::Debug, event, delta).with_details(state))
    }

    /// Log OPERATION, run the program, then log SUCCESS or FAILURE
    ///
    /// Blocks until the child exits.
    pub fn log_command(&mut self, program: &str, args: &[&str]) -> CommandReport {
        let operation_impact = self.impacts.command_operation;
        let _ = self.operation(program, args, operation_impact);

        let command = self.command_line(program, args);
        let start = Instant::now();
        let output = Command::new(program).args(args).output();
        let duration = start.elapsed();

        let report = match output {
            Ok(output) => CommandReport {
                command,
                exit_code: output.status.code(),
                duration,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                spawn_error: None,
            },
            Err(e) => {
                warn!("Cannot start {}: {}", program, e);
                CommandReport {
                    command,
                    exit_code: None,
                    duration,
                    stdout: String::new(),
                    stderr: String::new(),
                    spawn_error: Some(e.to_string()),
                }
            }
        };

        let mut details = Details::new();
        details.insert("command".to_string(), report.command.clone());
        details.insert("duration".to_string(), format!("{}ms", duration.as_millis()));
        if let Some(code) = report.exit_code {
            details.insert("exit_code".to_string(), code.to_string());
        }
        if !report.stdout.is_empty() {
            details.insert("stdout".to_string(), report.stdout.clone());
        }
        if !report.stderr.is_empty() {
            details.insert("stderr".to_string(), report.stderr.clone());
        }

        if report.succeeded() {
            let description = fill(&self.messages.command_completed, &[program]);
            let _ = self.success(&description, self.impacts.command_success, details);
        } else {
            let description = fill(&self.messages.command_failed, &[program]);
            let reason = match (&report.spawn_error, report.exit_code) {
                (Some(e), _) => format!("spawn failed: {e}"),
                (None, Some(code)) => format!("exit code: {code}"),
                (None, None) => "terminated by signal".to_string(),
            };
            let _ = self.failure(&description, &reason, self.impacts.command_failure, details);
        }

        report
    }

    /// Record a FAILURE entry if configuration loading degraded
    pub fn report_config(&mut self, loaded: &LoadedConfig) -> Option<Delivery> {
        if !loaded.tier.is_degraded() {
            return None;
        }

        let mut details = Details::new();
        details.insert("tier".to_string(), loaded.tier.to_string());
        if let Some(source) = &loaded.source {
            details.insert("source".to_string(), source.display().to_string());
        }
        let reason = loaded
            .problem
            .clone()
            .unwrap_or_else(|| "defaults in use".to_string());

        Some(self.failure(
            "Configuration degraded to built-in defaults",
            &reason,
            loaded.tier.health_impact(),
            details,
        ))
    }

    fn command_line(&self, program: &str, args: &[&str]) -> String {
        if args.is_empty() {
            program.to_string()
        } else {
            fill(&self.messages.command_line, &[program, &args.join(" ")])
        }
    }
}
