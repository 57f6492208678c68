/*!
 * Reading log files back
 *
 * Parsing never throws away what it already understood. Every reader returns
 * a [`ParsedFile`]: the entries decoded in file order up to the first problem,
 * plus that problem if there was one.
 */

use std::collections::BTreeMap;
use std::path::Path;

use dualrail_core_probe::{ShellContext, SudoersContext, SystemContext, SystemMetrics};

use crate::entry::{
    Details, Interactions, Level, LogEntry, Metadata, ACTOR, ACTUAL_PREFIX, CHANGED_PREFIX,
    CONCURRENT_KEY, CONTEXT, DEPENDS_PREFIX, DETAILS, ENV_PREFIX, ERROR_PREFIX, EVENT,
    EXPECTED_PREFIX, HEALTH, ID, INTERACTIONS, METADATA, PARAM_PREFIX,
};
use crate::error::ParseError;
use crate::text::{parse_blocks, Field, Item, RawBlock};

/// Entries read from a file, plus why reading stopped early
#[derive(Debug)]
pub struct ParsedFile<T> {
    pub entries: Vec<T>,
    pub error: Option<ParseError>,
}

impl<T> ParsedFile<T> {
    /// Every entry in the file was read
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Strict view: the entries only if nothing went wrong
    pub fn into_result(self) -> Result<Vec<T>, ParseError> {
        match self.error {
            None => Ok(self.entries),
            Some(e) => Err(e),
        }
    }
}

/// Read and decode a whole file
pub(crate) fn read_blocks<T>(
    path: &Path,
    is_preamble: impl Fn(&str) -> bool,
    decode: impl Fn(&RawBlock) -> Result<T, ParseError>,
) -> ParsedFile<T> {
    match std::fs::read(path) {
        Ok(bytes) => decode_text(&String::from_utf8_lossy(&bytes), is_preamble, decode),
        Err(source) => ParsedFile {
            entries: Vec::new(),
            error: Some(ParseError::Io {
                path: path.to_path_buf(),
                source,
            }),
        },
    }
}

pub(crate) fn decode_text<T>(
    text: &str,
    is_preamble: impl Fn(&str) -> bool,
    decode: impl Fn(&RawBlock) -> Result<T, ParseError>,
) -> ParsedFile<T> {
    let (blocks, scan_error) = parse_blocks(text, is_preamble);
    let mut entries = Vec::with_capacity(blocks.len());

    for block in &blocks {
        match decode(block) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                return ParsedFile {
                    entries,
                    error: Some(e),
                }
            }
        }
    }

    ParsedFile {
        entries,
        error: scan_error,
    }
}

/// Read every entry of a log file
pub fn read_log_file(path: impl AsRef<Path>) -> ParsedFile<LogEntry> {
    read_blocks(path.as_ref(), |_| false, decode_log_entry)
}

/// Decode log entries from text already in memory
pub fn parse_log_text(text: &str) -> ParsedFile<LogEntry> {
    decode_text(text, |_| false, decode_log_entry)
}

fn decode_log_entry(block: &RawBlock) -> Result<LogEntry, ParseError> {
    let (timestamp, rest) = block.split_header()?;
    let (level, component) = rest
        .split_once(' ')
        .ok_or_else(|| ParseError::malformed(block.header_line, "header lacks a component"))?;
    let level: Level = level
        .parse()
        .map_err(|e: String| ParseError::malformed(block.header_line, e))?;

    let mut correlation_id = None;
    let mut actor = None;
    let mut event = None;
    let mut health = None;
    let mut context = None;
    let mut details = Details::new();
    let mut interactions = None;
    let mut metadata = None;

    for item in &block.items {
        match item.name.as_str() {
            ID => correlation_id = Some(item.value.clone()),
            ACTOR => actor = Some(item.value.clone()),
            EVENT => event = Some(item.value.clone()),
            HEALTH => health = Some(decode_health(item)?),
            CONTEXT => context = Some(decode_context(item)?),
            DETAILS => details = fields_to_map(&item.fields),
            INTERACTIONS => interactions = Some(decode_interactions(item)?),
            METADATA => metadata = Some(decode_metadata(item)?),
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
    let (raw_health, normalized_health, health_delta) = health.ok_or_else(|| missing(HEALTH))?;

    Ok(LogEntry {
        timestamp,
        level,
        component: component.trim().to_string(),
        actor: actor.ok_or_else(|| missing(ACTOR))?,
        correlation_id: correlation_id.ok_or_else(|| missing(ID))?,
        context,
        event: event.ok_or_else(|| missing(EVENT))?,
        details,
        interactions,
        metadata,
        raw_health,
        normalized_health,
        health_delta,
    })
}

fn fields_to_map(fields: &[Field]) -> Details {
    fields
        .iter()
        .map(|field| (field.key.clone(), field.value.clone()))
        .collect()
}

/// `raw=<i64> normalized=<i32>% delta=<i32>`
fn decode_health(item: &Item) -> Result<(i64, i32, i32), ParseError> {
    let bad = || ParseError::malformed(item.line, format!("bad HEALTH value '{}'", item.value));

    let mut raw = None;
    let mut normalized = None;
    let mut delta = None;
    for part in item.value.split_whitespace() {
        let (key, value) = part.split_once('=').ok_or_else(bad)?;
        match key {
            "raw" => raw = value.parse::<i64>().ok(),
            "normalized" => {
                normalized = value
                    .strip_suffix('%')
                    .and_then(|n| n.parse::<i32>().ok())
            }
            "delta" => delta = value.parse::<i32>().ok(),
            _ => return Err(bad()),
        }
    }

    match (raw, normalized, delta) {
        (Some(raw), Some(normalized), Some(delta)) => Ok((raw, normalized, delta)),
        _ => Err(bad()),
    }
}

fn decode_context(item: &Item) -> Result<SystemContext, ParseError> {
    let mut values: BTreeMap<&str, &Field> = BTreeMap::new();
    let mut env = BTreeMap::new();
    for field in &item.fields {
        match field.key.strip_prefix(ENV_PREFIX) {
            Some(name) => {
                env.insert(name.to_string(), field.value.clone());
            }
            None => {
                values.insert(field.key.as_str(), field);
            }
        }
    }

    let get = |key: &str| {
        values
            .get(key)
            .map(|field| field.value.clone())
            .ok_or_else(|| ParseError::malformed(item.line, format!("CONTEXT lacks '{key}'")))
    };
    let invalid = |key: &str| {
        let line = values.get(key).map(|field| field.line).unwrap_or(item.line);
        ParseError::malformed(line, format!("invalid CONTEXT '{key}'"))
    };

    Ok(SystemContext {
        user: get("user")?,
        host: get("host")?,
        pid: get("pid")?.parse().map_err(|_| invalid("pid"))?,
        shell: ShellContext::parse(&get("shell")?).ok_or_else(|| invalid("shell"))?,
        cwd: get("cwd")?,
        env,
        sudoers: SudoersContext::parse(&get("sudoers")?).ok_or_else(|| invalid("sudoers"))?,
        metrics: SystemMetrics {
            load: get("load")?,
            memory: get("memory")?,
            disk: get("disk")?,
        },
    })
}

fn decode_interactions(item: &Item) -> Result<Interactions, ParseError> {
    let mut interactions = Interactions::default();
    for field in &item.fields {
        if field.key == CONCURRENT_KEY {
            interactions.concurrent = field.value.split('\n').map(str::to_string).collect();
        } else if let Some(key) = field.key.strip_prefix(DEPENDS_PREFIX) {
            interactions
                .dependencies
                .insert(key.to_string(), field.value.clone());
        } else if let Some(key) = field.key.strip_prefix(CHANGED_PREFIX) {
            interactions
                .state_changes
                .insert(key.to_string(), field.value.clone());
        } else {
            return Err(ParseError::malformed(
                field.line,
                format!("unknown INTERACTIONS key '{}'", field.key),
            ));
        }
    }
    Ok(interactions)
}

fn decode_metadata(item: &Item) -> Result<Metadata, ParseError> {
    let mut meta = Metadata::default();
    for field in &item.fields {
        let value = field.value.clone();
        let key = field.key.as_str();
        match key {
            "operation_type" => meta.operation_type = Some(value),
            "operation_subtype" => meta.operation_subtype = Some(value),
            "error_type" => meta.error_type = Some(value),
            "recovery_hint" => meta.recovery_hint = Some(value),
            "recovery_strategy" => meta.recovery_strategy = Some(value),
            _ => {
                let maps = [
                    (ERROR_PREFIX, &mut meta.error_details),
                    (PARAM_PREFIX, &mut meta.recovery_params),
                    (EXPECTED_PREFIX, &mut meta.expected),
                    (ACTUAL_PREFIX, &mut meta.actual),
                ];
                let slot = maps
                    .into_iter()
                    .find_map(|(prefix, map)| key.strip_prefix(prefix).map(|name| (name, map)));
                match slot {
                    Some((name, map)) => {
                        map.insert(name.to_string(), value);
                    }
                    None => {
                        return Err(ParseError::malformed(
                            field.line,
                            format!("unknown METADATA key '{key}'"),
                        ))
                    }
                }
            }
        }
    }
    Ok(meta)
}
