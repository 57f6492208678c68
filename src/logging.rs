/*!
 * Tracing initialization for dualrail's own diagnostics
 *
 * The rails write their own files; this subscriber only carries messages
 * about the rails themselves (dropped writes, failed rotations, config
 * fallbacks).
 */

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{Error, Result};

/// Install the global subscriber
///
/// `RUST_LOG` wins when set; otherwise `dualrail=warn`, or `dualrail=debug`
/// when `verbose`. With `trace_file` the output is JSON into that file,
/// otherwise compact text on stderr.
pub fn init_logging(verbose: bool, trace_file: Option<&Path>) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = build_filter(verbose, rust_log.as_deref())?;

    if let Some(path) = trace_file {
        init_file_logging(path, env_filter)?;
    } else {
        init_stderr_logging(env_filter);
    }

    Ok(())
}

/// `rust_log` directives when they parse, the crate default otherwise
fn build_filter(verbose: bool, rust_log: Option<&str>) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return Ok(filter);
        }
    }

    let log_level = if verbose { Level::DEBUG } else { Level::WARN };
    EnvFilter::try_new(format!("dualrail={}", log_level))
        .map_err(|e| Error::Config(format!("Failed to create log filter: {}", e)))
}

fn init_stderr_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn init_file_logging(path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| Error::Config(format!("Failed to create trace file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Route diagnostics to the test harness output
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dualrail=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RailConfig;
    use crate::details;
    use crate::logger::Logger;
    use tempfile::TempDir;

    #[test]
    fn test_dropped_write_is_traced_not_raised() {
        init_test_logging();
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut logger = Logger::new("status", &RailConfig::rooted_at(&blocker));
        let _ = logger.success("lost", 1, details! {});
        assert_eq!(logger.dropped_entries(), 1);
    }

    fn filter_text(verbose: bool, rust_log: Option<&str>) -> String {
        build_filter(verbose, rust_log).unwrap().to_string().to_lowercase()
    }

    #[test]
    fn test_default_filter_follows_verbosity() {
        assert_eq!(filter_text(false, None), "dualrail=warn");
        assert_eq!(filter_text(true, None), "dualrail=debug");
        assert_eq!(filter_text(true, Some("  ")), "dualrail=debug");
    }

    #[test]
    fn test_rust_log_directives_win() {
        assert_eq!(filter_text(true, Some("trace")), "trace");
        assert_eq!(filter_text(false, Some("dualrail=info")), "dualrail=info");
    }

    #[test]
    fn test_bad_rust_log_falls_back_to_default() {
        assert_eq!(filter_text(false, Some("dualrail=loud")), "dualrail=warn");
        assert_eq!(filter_text(true, Some("dualrail=loud")), "dualrail=debug");
    }
}
