/*!
 * Terminal styling for the dualrail CLI
 *
 * Colors follow health: green for gains, red for losses, yellow for the
 * warning band. Tables are used for per-session summaries.
 */

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};

use crate::correlate::ComponentSummary;
use crate::entry::Level;
use crate::health::{health_bar, indicator};
use crate::inspector::InspectionKind;

/// Text styles used across commands
pub struct Theme;

impl Theme {
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }

    pub fn header<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan().bold()
    }

    pub fn value<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).white().bold()
    }
}

pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const INFO: &'static str = "ℹ";
    pub const LOG: &'static str = "≡";
    pub const PROBE: &'static str = "◎";
    pub const ARROW_RIGHT: &'static str = "→";
}

/// Section title followed by a rule
pub fn section_header(title: &str) {
    let line_len = 50 - title.chars().count().min(40);
    println!(
        "\n{} {}",
        Theme::header(title),
        Theme::muted("─".repeat(line_len))
    );
}

/// Level name colored by what it usually means for health
pub fn level_label(level: Level) -> StyledObject<&'static str> {
    let name = level.as_str();
    match level {
        Level::Success => Theme::success(name),
        Level::Failure | Level::Error => Theme::error(name),
        Level::Check => Theme::warning(name),
        Level::Operation => Theme::primary(name),
        Level::Context | Level::Debug => Theme::muted(name),
    }
}

pub fn kind_label(kind: InspectionKind) -> StyledObject<&'static str> {
    if kind.is_divergence() {
        Theme::error(kind.as_str())
    } else {
        Theme::muted(kind.as_str())
    }
}

/// Signed delta, colored by sign
pub fn delta_label(delta: i32) -> StyledObject<String> {
    let text = format!("{:+}", delta);
    match delta.signum() {
        1 => Theme::success(text),
        -1 => Theme::error(text),
        _ => Theme::muted(text),
    }
}

/// `symbol description bar` for a normalized score
pub fn health_line(normalized: i32) -> String {
    let bar = health_bar(normalized);
    let bar = if normalized >= 50 {
        Theme::success(bar)
    } else if normalized >= 0 {
        Theme::warning(bar)
    } else {
        Theme::error(bar)
    };
    format!("{} {}", indicator(normalized), bar)
}

/// One row per session
pub fn summary_table(summaries: &[ComponentSummary]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Component").add_attribute(Attribute::Bold),
            Cell::new("Correlation ID").add_attribute(Attribute::Bold),
            Cell::new("Entries").add_attribute(Attribute::Bold),
            Cell::new("Success").add_attribute(Attribute::Bold),
            Cell::new("Failure").add_attribute(Attribute::Bold),
            Cell::new("Inspections").add_attribute(Attribute::Bold),
            Cell::new("Health").add_attribute(Attribute::Bold),
        ]);

    for summary in summaries {
        let health_color = if summary.failure_dominated() {
            Color::Red
        } else if summary.final_health >= 50 {
            Color::Green
        } else {
            Color::Yellow
        };

        table.add_row(vec![
            Cell::new(&summary.component).fg(Color::Cyan),
            Cell::new(&summary.correlation_id),
            Cell::new(summary.entries()),
            Cell::new(summary.successes).fg(Color::Green),
            Cell::new(summary.failures).fg(Color::Red),
            Cell::new(format!("{} ({} divergent)", summary.inspections, summary.divergences)),
            Cell::new(format!("{}%", summary.final_health))
                .fg(health_color)
                .add_attribute(Attribute::Bold),
        ]);
    }

    table
}

/// Print a styled error message with optional suggestion
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "\n{} {}",
        Theme::error(format!("{} Error:", Icons::ERROR)),
        message
    );

    if let Some(hint) = suggestion {
        eprintln!(
            "  {} {}",
            Theme::muted(Icons::ARROW_RIGHT),
            Theme::muted(hint)
        );
    }
    eprintln!();
}

pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

pub fn print_info(message: &str) {
    println!("{} {}", Theme::primary(Icons::INFO.to_string()), message);
}
