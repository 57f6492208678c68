/*!
 * Aligning the two rails after the fact
 *
 * The rails never talk to each other, so alignment is pure string matching:
 * entries that carry the same correlation id belong to the same unit of work,
 * and their timestamps order them.
 */

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entry::{Level, LogEntry};
use crate::inspector::InspectionEntry;

/// One item of a merged timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rail", rename_all = "lowercase")]
pub enum TimelineItem {
    Log(LogEntry),
    Inspection(InspectionEntry),
}

impl TimelineItem {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TimelineItem::Log(entry) => entry.timestamp,
            TimelineItem::Inspection(entry) => entry.timestamp,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            TimelineItem::Log(entry) => &entry.correlation_id,
            TimelineItem::Inspection(entry) => &entry.correlation_id,
        }
    }

    pub fn component(&self) -> &str {
        match self {
            TimelineItem::Log(entry) => &entry.component,
            TimelineItem::Inspection(entry) => &entry.component,
        }
    }

    fn rail_rank(&self) -> u8 {
        match self {
            TimelineItem::Log(_) => 0,
            TimelineItem::Inspection(_) => 1,
        }
    }
}

/// Log and inspection entries in timestamp order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Timeline {
    items: Vec<TimelineItem>,
}

impl Timeline {
    /// Merge both rails, keeping only `correlation_id` when given
    ///
    /// Ties on timestamp put log entries first and otherwise keep file order.
    pub fn merge(
        logs: Vec<LogEntry>,
        inspections: Vec<InspectionEntry>,
        correlation_id: Option<&str>,
    ) -> Self {
        let keep = |id: &str| correlation_id.map_or(true, |wanted| wanted == id);

        let mut items: Vec<TimelineItem> = logs
            .into_iter()
            .filter(|entry| keep(&entry.correlation_id))
            .map(TimelineItem::Log)
            .chain(
                inspections
                    .into_iter()
                    .filter(|entry| keep(&entry.correlation_id))
                    .map(TimelineItem::Inspection),
            )
            .collect();

        items.sort_by_key(|item| (item.timestamp(), item.rail_rank()));
        Self { items }
    }

    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Log entries of one unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session<'a> {
    pub correlation_id: &'a str,
    pub component: &'a str,
    pub entries: Vec<&'a LogEntry>,
}

/// Group log entries by correlation id, in order of first appearance
pub fn sessions(entries: &[LogEntry]) -> Vec<Session<'_>> {
    let mut order: Vec<Session<'_>> = Vec::new();
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();

    for entry in entries {
        let slot = *index
            .entry(entry.correlation_id.as_str())
            .or_insert_with(|| {
                order.push(Session {
                    correlation_id: &entry.correlation_id,
                    component: &entry.component,
                    entries: Vec::new(),
                });
                order.len() - 1
            });
        order[slot].entries.push(entry);
    }

    order
}

/// Per-session counts across both rails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSummary {
    pub component: String,
    pub correlation_id: String,
    pub per_level: BTreeMap<Level, usize>,
    /// Normalized health after the last entry
    pub final_health: i32,
    pub raw_health: i64,
    /// SUCCESS entries and CHECKs that raised health
    pub successes: usize,
    /// FAILURE and ERROR entries and CHECKs that lowered health
    pub failures: usize,
    pub inspections: usize,
    /// Inspection entries where reality disagreed with expectation
    pub divergences: usize,
}

impl ComponentSummary {
    pub fn entries(&self) -> usize {
        self.per_level.values().sum()
    }

    pub fn failure_dominated(&self) -> bool {
        self.failures > 0 && self.failures > self.successes
    }
}

/// Summaries for every session found in `logs`
pub fn summarize(logs: &[LogEntry], inspections: &[InspectionEntry]) -> Vec<ComponentSummary> {
    sessions(logs)
        .into_iter()
        .map(|session| {
            let mut per_level = BTreeMap::new();
            let mut successes = 0;
            let mut failures = 0;
            for entry in &session.entries {
                *per_level.entry(entry.level).or_insert(0) += 1;
                match entry.level {
                    Level::Success => successes += 1,
                    Level::Failure | Level::Error => failures += 1,
                    Level::Check if entry.health_delta > 0 => successes += 1,
                    Level::Check if entry.health_delta < 0 => failures += 1,
                    _ => {}
                }
            }

            let related: Vec<&InspectionEntry> = inspections
                .iter()
                .filter(|entry| entry.correlation_id == session.correlation_id)
                .collect();
            let last = session.entries.last();

            ComponentSummary {
                component: session.component.to_string(),
                correlation_id: session.correlation_id.to_string(),
                per_level,
                final_health: last.map(|entry| entry.normalized_health).unwrap_or(0),
                raw_health: last.map(|entry| entry.raw_health).unwrap_or(0),
                successes,
                failures,
                inspections: related.len(),
                divergences: related.iter().filter(|entry| entry.kind.is_divergence()).count(),
            }
        })
        .collect()
}
