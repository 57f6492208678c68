/*!
 * dualrail - two-rail observability for shell-facing tooling
 *
 * Two independent record streams share nothing but a correlation id:
 * - The Logger rail writes structured, health-scored entries per component
 * - The Inspector rail writes opt-in forensic captures to a per-session file
 * - Context capture, routing and rotation back the Logger
 * - The parsers read both rails back, keeping whatever parsed before an error
 * - Correlation merges the rails into one timeline after the fact
 */

pub mod cli_style;
pub mod config;
pub mod correlate;
pub mod entry;
pub mod error;
pub mod health;
pub mod inspector;
pub mod logger;
pub mod logging;
pub mod parser;
pub mod router;
pub mod text;

// Re-export commonly used types
pub use config::{ConfigTier, LoadedConfig, RailConfig};
pub use correlate::{summarize, ComponentSummary, Timeline, TimelineItem};
pub use entry::{Details, Interactions, Level, LogEntry, Metadata};
pub use error::{Error, ParseError, Result};
pub use health::HealthScore;
pub use inspector::{read_debug_file, InspectionEntry, InspectionKind, Inspector};
pub use logger::{CommandReport, Event, Logger};
pub use parser::{parse_log_text, read_log_file, ParsedFile};
pub use router::{Category, Delivery, Router};

pub use dualrail_core_probe as probe;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
