/*!
 * Integration tests for the two rails
 *
 * Each test writes real files under a temporary base directory and reads
 * them back through the public parsers.
 */

use std::fs;
use std::io;

use dualrail::{
    config::ConfigTier, details, parse_log_text, read_debug_file, read_log_file,
    router::rotated_path, summarize, Delivery, InspectionKind, Inspector, Level, Logger,
    RailConfig, Timeline, TimelineItem,
};
use tempfile::TempDir;

#[test]
fn test_logger_round_trip_every_level() {
    let temp = TempDir::new().unwrap();
    let config = RailConfig::rooted_at(temp.path());
    let mut logger = Logger::new("installer", &config);

    assert_eq!(logger.operation("apt-get", &["install", "-y", "curl"], 0), Delivery::Written);
    logger.success("Package installed", 15, details! { "package" => "curl" });
    logger.check("disk space", true, 5, details! { "free" => "12 GiB" });
    logger.failure("Mirror unreachable", "timeout after 30s", -20, details! {});
    let err = io::Error::new(io::ErrorKind::PermissionDenied, "cannot write /etc/hosts");
    logger.error("Hosts update failed", &err, -30);
    logger.snapshot_state("after install", 0);
    logger.debug("cache state", 0, details! { "entries" => 3 });

    let parsed = read_log_file(logger.log_path());
    assert!(parsed.is_complete(), "unexpected error: {:?}", parsed.error);
    let entries = parsed.entries;
    assert_eq!(entries.len(), 7);

    let levels: Vec<Level> = entries.iter().map(|e| e.level).collect();
    assert_eq!(
        levels,
        vec![
            Level::Operation,
            Level::Success,
            Level::Check,
            Level::Failure,
            Level::Error,
            Level::Context,
            Level::Debug,
        ]
    );

    assert!(entries
        .iter()
        .all(|e| e.correlation_id == logger.correlation_id()));
    assert_eq!(entries[1].details["package"], "curl");
    assert_eq!(entries[3].details["reason"], "timeout after 30s");
    assert!(entries[4].details["error"].contains("cannot write /etc/hosts"));
    assert!(entries[4].details.contains_key("stack_trace"));

    // Raw health is the running sum of deltas
    let sum: i64 = entries.iter().map(|e| i64::from(e.health_delta)).sum();
    assert_eq!(sum, -30);
    assert_eq!(entries.last().unwrap().raw_health, logger.raw_health());
    assert_eq!(entries.last().unwrap().normalized_health, logger.health());

    // Lightweight levels carry no context; OPERATION does
    assert!(entries[0].context.is_some());
    assert!(entries[1].context.is_none());
    assert!(entries[2].context.is_none());
}

#[test]
fn test_carriage_returns_round_trip() {
    let temp = TempDir::new().unwrap();
    let mut logger = Logger::new("capture", &RailConfig::rooted_at(temp.path()));
    logger.success("done\r", 1, details! { "out" => "line1\r\nline2\r\n" });
    logger.success("next", 1, details! {});

    let entries = read_log_file(logger.log_path()).into_result().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].event, "done\r");
    assert_eq!(entries[0].details["out"], "line1\r\nline2\r\n");
    assert_eq!(entries[1].event, "next");
}

#[test]
fn test_empty_component_still_correlates() {
    let temp = TempDir::new().unwrap();
    let config = RailConfig::rooted_at(temp.path());
    let mut logger = Logger::new("", &config);
    let mut inspector = Inspector::new("", logger.correlation_id(), &config);
    let debug_path = inspector.enable().unwrap().to_path_buf();

    logger.success("first", 1, details! {});
    logger.success("second", 1, details! {});
    inspector.checkpoint("between", details! {});

    let logs = read_log_file(logger.log_path()).into_result().unwrap();
    let inspections = read_debug_file(&debug_path).into_result().unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|e| e.component == "unnamed"));
    assert_eq!(inspections[0].component, "unnamed");

    let timeline = Timeline::merge(logs, inspections, Some(logger.correlation_id()));
    assert_eq!(timeline.len(), 3);
}

#[test]
fn test_truncated_final_entry_keeps_earlier_entries() {
    let temp = TempDir::new().unwrap();
    let mut logger = Logger::new("backup", &RailConfig::rooted_at(temp.path()));
    for step in 0..4 {
        logger.success(&format!("step {step}"), 1, details! { "step" => step });
    }

    let text = fs::read_to_string(logger.log_path()).unwrap();
    let health_at = text.rfind("  HEALTH:").unwrap();
    let truncated = &text[..health_at];

    let parsed = parse_log_text(truncated);
    assert_eq!(parsed.entries.len(), 3);
    assert_eq!(parsed.entries[2].event, "step 2");
    let err = parsed.error.expect("truncated entry must be reported");
    assert!(err.line().is_some());
}

#[test]
fn test_garbage_after_entries_is_reported_with_line() {
    let temp = TempDir::new().unwrap();
    let mut logger = Logger::new("backup", &RailConfig::rooted_at(temp.path()));
    logger.success("first", 1, details! {});
    logger.success("second", 1, details! {});

    let mut text = fs::read_to_string(logger.log_path()).unwrap();
    let garbage_line = text.lines().count() + 1;
    text.push_str("this is not an entry header\n---\n");

    let parsed = parse_log_text(&text);
    assert_eq!(parsed.entries.len(), 2);
    assert_eq!(parsed.error.unwrap().line(), Some(garbage_line));
}

#[test]
fn test_rotation_respects_threshold_and_retention() {
    let temp = TempDir::new().unwrap();
    let mut config = RailConfig::rooted_at(temp.path());
    config.rotation.max_bytes = 1024;
    config.rotation.retention = 2;

    let mut logger = Logger::new("rotating", &config);
    for n in 0..60 {
        logger.success(&format!("entry {n}"), 1, details! { "n" => n });
    }
    assert_eq!(logger.written_entries(), 60);

    let path = logger.log_path().to_path_buf();
    assert!(path.exists());
    assert!(rotated_path(&path, 1).exists());
    assert!(rotated_path(&path, 2).exists());
    assert!(!rotated_path(&path, 3).exists());

    for index in 1..=2 {
        let rotated = rotated_path(&path, index);
        assert!(fs::metadata(&rotated).unwrap().len() >= 1024);
        let parsed = read_log_file(&rotated);
        assert!(parsed.is_complete());
        assert!(!parsed.entries.is_empty());
    }
    assert!(fs::metadata(&path).unwrap().len() < 1024 + 1024);

    // The newest entry is always in the active file
    let active = read_log_file(&path).into_result().unwrap();
    assert_eq!(active.last().unwrap().event, "entry 59");
}

#[test]
fn test_rails_share_correlation_id_verbatim() {
    let temp = TempDir::new().unwrap();
    let config = RailConfig::rooted_at(temp.path());
    let mut logger = Logger::new("sync", &config);
    let mut inspector = Inspector::new("sync", logger.correlation_id(), &config);
    let debug_path = inspector.enable().unwrap().to_path_buf();

    logger.operation("rsync", &["-a", "src/", "dst/"], 0);
    inspector.checkpoint("copy started", details! { "files" => 12 });
    inspector.counter("files copied", 12, 12);
    logger.success("Copy complete", 10, details! {});
    inspector.expected_state("exit status", 0, 0, details! {});
    inspector.close();

    let id = logger.correlation_id().to_string();
    let log_text = fs::read_to_string(logger.log_path()).unwrap();
    let debug_text = fs::read_to_string(&debug_path).unwrap();
    assert!(log_text.contains(&format!("ID: {id}")));
    assert!(debug_text.contains(&id));

    let logs = read_log_file(logger.log_path()).into_result().unwrap();
    let inspections = read_debug_file(&debug_path).into_result().unwrap();
    assert_eq!(inspections.len(), 3);

    let timeline = Timeline::merge(logs.clone(), inspections.clone(), Some(&id));
    assert_eq!(timeline.len(), 5);
    assert!(matches!(timeline.items()[0], TimelineItem::Log(_)));
    assert!(timeline
        .items()
        .windows(2)
        .all(|pair| pair[0].timestamp() <= pair[1].timestamp()));

    let summary = &summarize(&logs, &inspections)[0];
    assert_eq!(summary.correlation_id, id);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.inspections, 3);
    assert_eq!(summary.divergences, 0);
}

#[test]
fn test_expected_state_match_and_divergence() {
    let temp = TempDir::new().unwrap();
    let config = RailConfig::rooted_at(temp.path());
    let mut inspector = Inspector::new("calc", "calc-1-1", &config);
    let path = inspector.enable().unwrap().to_path_buf();

    assert_eq!(
        inspector.expected_state("answer", 42, 42, details! {}),
        Some(InspectionKind::ExpectedState)
    );
    assert_eq!(
        inspector.expected_state("balance", 100, 10, details! { "account" => "A-7" }),
        Some(InspectionKind::Divergence)
    );

    let entries = read_debug_file(&path).into_result().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].state["match"], "true");
    assert_eq!(entries[1].kind, InspectionKind::Divergence);
    assert_eq!(entries[1].state["expected"], "100");
    assert_eq!(entries[1].state["actual"], "10");
    assert_eq!(entries[1].state["account"], "A-7");
    assert!(entries[1].call_site.contains("rails_integration_test.rs"));
}

#[test]
fn test_false_condition_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let config = RailConfig::rooted_at(temp.path());
    let mut inspector = Inspector::new("watch", "watch-1-1", &config);
    let path = inspector.enable().unwrap().to_path_buf();
    let before = fs::metadata(&path).unwrap().len();

    assert_eq!(
        inspector.conditional_snapshot("never", false, details! { "x" => 1 }),
        None
    );
    assert_eq!(fs::metadata(&path).unwrap().len(), before);

    assert_eq!(
        inspector.conditional_snapshot("always", true, details! { "x" => 1 }),
        Some(InspectionKind::Conditional)
    );
    assert!(fs::metadata(&path).unwrap().len() > before);
}

#[test]
fn test_disabled_inspector_touches_no_file() {
    let temp = TempDir::new().unwrap();
    let config = RailConfig::rooted_at(temp.path());
    let mut inspector = Inspector::new("quiet", "quiet-1-1", &config);

    assert_eq!(inspector.checkpoint("ignored", details! {}), None);
    assert_eq!(inspector.counter("ignored", 1, 2), None);
    assert!(inspector.output_path().is_none());
    assert!(!config.debug_dir("quiet").exists());
}

#[test]
fn test_degraded_config_is_logged_as_failure() {
    let temp = TempDir::new().unwrap();

    let missing = RailConfig::load_from(&temp.path().join("absent.jsonc"));
    assert_eq!(missing.tier, ConfigTier::MissingFile);

    let bad_path = temp.path().join("bad.jsonc");
    fs::write(&bad_path, "{ \"rotation\": { \"max_bytes\": \"lots\" } }").unwrap();
    let mut malformed = RailConfig::load_from(&bad_path);
    assert_eq!(malformed.tier, ConfigTier::Malformed);
    assert!(malformed.problem.is_some());

    malformed.config.paths.base_dir = temp.path().join("logs");
    let mut logger = Logger::new("boot", &malformed.config);
    assert_eq!(logger.report_config(&malformed), Some(Delivery::Written));

    let entries = read_log_file(logger.log_path()).into_result().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, Level::Failure);
    assert_eq!(entries[0].health_delta, ConfigTier::Malformed.health_impact());
    assert_eq!(entries[0].details["tier"], ConfigTier::Malformed.to_string());

    let good_path = temp.path().join("good.jsonc");
    fs::write(
        &good_path,
        "{\n  // keep two rotated files\n  \"rotation\": { \"retention\": 2 }\n}\n",
    )
    .unwrap();
    let good = RailConfig::load_from(&good_path);
    assert_eq!(good.tier, ConfigTier::FromFile);
    assert_eq!(good.config.rotation.retention, 2);
    assert_eq!(logger.report_config(&good), None);
}
