/*!
 * dualrail CLI
 *
 * Reads both rails back (parse, inspect, correlate, health), shows the
 * effective configuration, and wraps a child command in a logged session.
 */

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dualrail::{
    cli_style::{
        delta_label, health_line, kind_label, level_label, print_error, print_info,
        print_success, print_warning, section_header, summary_table, Icons, Theme,
    },
    correlate::sessions,
    details,
    error::{EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS},
    logging,
    text::format_timestamp,
    InspectionEntry, Inspector, LoadedConfig, LogEntry, Logger, ParsedFile, RailConfig,
    Timeline, TimelineItem,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "dualrail")]
#[command(
    version,
    about = "Health-scored logs and opt-in state inspection, correlated by id",
    long_about = None
)]
struct Cli {
    /// Configuration file (JSONC); defaults to ~/.dualrail/config/dualrail.jsonc
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Show debug diagnostics from dualrail itself
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write dualrail's own diagnostics as JSON to this file
    #[arg(long, value_name = "PATH", global = true)]
    trace_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the entries of a log file
    Parse {
        #[arg(value_name = "LOG")]
        log: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the entries of a debug file
    Inspect {
        #[arg(value_name = "DEBUG")]
        debug: PathBuf,

        /// Only entries where reality disagreed with expectation
        #[arg(long)]
        divergent: bool,

        #[arg(long)]
        json: bool,
    },

    /// Merge a log file and a debug file into one timeline
    Correlate {
        #[arg(value_name = "LOG")]
        log: PathBuf,

        #[arg(value_name = "DEBUG")]
        debug: PathBuf,

        /// Keep only this correlation id
        #[arg(long = "id", value_name = "CORRELATION_ID")]
        id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Health per session of a log file
    Health {
        #[arg(value_name = "LOG")]
        log: PathBuf,

        /// Debug file to count inspections from
        #[arg(long, value_name = "DEBUG")]
        debug: Option<PathBuf>,
    },

    /// Show the effective configuration and where it came from
    Config {
        #[arg(long)]
        json: bool,
    },

    /// Run a command, logging OPERATION then SUCCESS or FAILURE
    Run {
        /// Component name used for routing and correlation
        #[arg(long, default_value = "command")]
        component: String,

        /// Also open an inspector session for the run
        #[arg(long)]
        inspect: bool,

        /// Duration above which the run is recorded as SLOW_TIMING
        #[arg(long, value_name = "MS", requires = "inspect")]
        max_ms: Option<u64>,

        /// Program and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e), None);
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose, cli.trace_file.as_deref()) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let loaded = match &cli.config {
        Some(path) => RailConfig::load_from(path),
        None => RailConfig::load(),
    };

    match cli.command {
        Commands::Parse { log, json } => handle_parse(&log, json),
        Commands::Inspect {
            debug,
            divergent,
            json,
        } => handle_inspect(&debug, divergent, json),
        Commands::Correlate {
            log,
            debug,
            id,
            json,
        } => handle_correlate(&log, &debug, id.as_deref(), json),
        Commands::Health { log, debug } => handle_health(&log, debug.as_deref()),
        Commands::Config { json } => handle_config(&loaded, json),
        Commands::Run {
            component,
            inspect,
            max_ms,
            command,
        } => handle_run(&loaded, &component, inspect, max_ms, &command),
    }
}

/// JSON shape for partially read files
#[derive(Serialize)]
struct JsonFile<'a, T> {
    entries: &'a [T],
    error: Option<String>,
}

fn print_json<T: Serialize>(parsed: &ParsedFile<T>, entries: &[T]) -> Result<()> {
    let out = JsonFile {
        entries,
        error: parsed.error.as_ref().map(|e| e.to_string()),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&out).context("Failed to serialize entries")?
    );
    Ok(())
}

/// Report a stopped read and choose the exit code
fn finish<T>(parsed: &ParsedFile<T>, path: &Path) -> i32 {
    match &parsed.error {
        None => EXIT_SUCCESS,
        Some(e) => {
            print_warning(&format!(
                "Read {} entries from {} before stopping: {}",
                parsed.entries.len(),
                path.display(),
                e
            ));
            EXIT_PARTIAL
        }
    }
}

fn print_log_entry(entry: &LogEntry) {
    println!(
        "{} {:<9} {} {} {}",
        Theme::muted(format_timestamp(&entry.timestamp)),
        level_label(entry.level),
        Theme::primary(&entry.component),
        entry.event,
        Theme::muted(format!(
            "[{} → {}%]",
            delta_label(entry.health_delta),
            entry.normalized_health
        )),
    );
    for (key, value) in &entry.details {
        println!("    {}: {}", Theme::muted(key), value.replace('\n', "\n      "));
    }
}

fn print_inspection(entry: &InspectionEntry) {
    println!(
        "{} {:<16} {} {} {}",
        Theme::muted(format_timestamp(&entry.timestamp)),
        kind_label(entry.kind),
        Theme::primary(&entry.component),
        entry.label,
        Theme::muted(format!("@ {}", entry.call_site)),
    );
    for (key, value) in &entry.state {
        println!("    {}: {}", Theme::muted(key), value.replace('\n', "\n      "));
    }
}

fn handle_parse(path: &Path, json: bool) -> Result<i32> {
    let parsed = dualrail::read_log_file(path);

    if json {
        print_json(&parsed, &parsed.entries)?;
    } else {
        section_header(&format!("{} {}", Icons::LOG, path.display()));
        for entry in &parsed.entries {
            print_log_entry(entry);
        }
    }

    Ok(finish(&parsed, path))
}

fn handle_inspect(path: &Path, divergent: bool, json: bool) -> Result<i32> {
    let parsed = dualrail::read_debug_file(path);
    let selected: Vec<InspectionEntry> = parsed
        .entries
        .iter()
        .filter(|entry| !divergent || entry.kind.is_divergence())
        .cloned()
        .collect();

    if json {
        print_json(&parsed, &selected)?;
    } else {
        section_header(&format!("{} {}", Icons::PROBE, path.display()));
        for entry in &selected {
            print_inspection(entry);
        }
    }

    Ok(finish(&parsed, path))
}

fn handle_correlate(log: &Path, debug: &Path, id: Option<&str>, json: bool) -> Result<i32> {
    let logs = dualrail::read_log_file(log);
    let inspections = dualrail::read_debug_file(debug);
    let code = finish(&logs, log).max(finish(&inspections, debug));

    let timeline = Timeline::merge(logs.entries, inspections.entries, id);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&timeline).context("Failed to serialize timeline")?
        );
        return Ok(code);
    }

    section_header("Timeline");
    if timeline.is_empty() {
        print_info("No entries matched");
    }
    for item in timeline.items() {
        match item {
            TimelineItem::Log(entry) => print_log_entry(entry),
            TimelineItem::Inspection(entry) => print_inspection(entry),
        }
    }

    Ok(code)
}

fn handle_health(log: &Path, debug: Option<&Path>) -> Result<i32> {
    let logs = dualrail::read_log_file(log);
    let mut code = finish(&logs, log);

    let inspections = match debug {
        Some(path) => {
            let parsed = dualrail::read_debug_file(path);
            code = code.max(finish(&parsed, path));
            parsed.entries
        }
        None => Vec::new(),
    };

    for session in sessions(&logs.entries) {
        section_header(&format!("{} {}", session.component, session.correlation_id));
        for entry in &session.entries {
            println!(
                "  {:<9} {:>5} {}",
                level_label(entry.level),
                delta_label(entry.health_delta),
                health_line(entry.normalized_health)
            );
        }
    }

    let summaries = dualrail::summarize(&logs.entries, &inspections);
    if !summaries.is_empty() {
        println!("\n{}", summary_table(&summaries));
    }

    Ok(code)
}

fn handle_config(loaded: &LoadedConfig, json: bool) -> Result<i32> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&loaded.config)
                .context("Failed to serialize configuration")?
        );
        return Ok(EXIT_SUCCESS);
    }

    section_header("Configuration");
    let source = loaded
        .source
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    println!("  {} {}", Theme::muted("source:"), source);
    println!("  {} {}", Theme::muted("tier:"), Theme::value(loaded.tier));
    println!(
        "  {} {}",
        Theme::muted("base dir:"),
        loaded.config.paths.base_dir.display()
    );
    if let Some(problem) = &loaded.problem {
        print_warning(problem);
    }

    Ok(EXIT_SUCCESS)
}

fn handle_run(
    loaded: &LoadedConfig,
    component: &str,
    inspect: bool,
    max_ms: Option<u64>,
    command: &[String],
) -> Result<i32> {
    let (program, args) = command
        .split_first()
        .context("No command given")?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let mut logger = Logger::new(component, &loaded.config);
    let _ = logger.report_config(loaded);

    let mut inspector = Inspector::new(component, logger.correlation_id(), &loaded.config);
    if inspect {
        let path = inspector
            .enable()
            .context("Failed to open inspector session")?
            .to_path_buf();
        print_info(&format!("Inspecting into {}", path.display()));
        inspector.system_context("before run");
        inspector.checkpoint("start", details! { "command" => program });
    }

    let report = logger.log_command(program, &args);

    if inspect {
        if let Some(limit) = max_ms {
            inspector.timing(&report.command, report.duration, Duration::from_millis(limit));
        }
        inspector.expected_state("exit code", Some(0), report.exit_code, details! {});
        inspector.memory("after run", details! {});
        inspector.close();
    }

    print!("{}", report.stdout);
    eprint!("{}", report.stderr);

    if report.succeeded() {
        print_success(&format!(
            "{} ({}ms, health {}%)",
            report.command,
            report.duration.as_millis(),
            logger.health()
        ));
    } else {
        print_error(
            &format!("{} failed (health {}%)", report.command, logger.health()),
            report.spawn_error.as_deref(),
        );
    }
    print_info(&format!(
        "Logged to {} as {}",
        logger.log_path().display(),
        logger.correlation_id()
    ));

    Ok(match (&report.spawn_error, report.exit_code) {
        (None, Some(code)) => code,
        _ => EXIT_FATAL,
    })
}
