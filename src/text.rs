/*!
 * Block text format shared by log and debug files
 *
 * Both rails write human-readable blocks of the same shape:
 *
 * ```text
 * [2026-01-02T03:04:05.123456Z] HEADER WORDS
 *   NAME: value
 *   SECTION:
 *     key: value
 *     multi: |
 *       first line
 *       second line
 * ---
 * ```
 *
 * Top-level items sit at two spaces, section fields at four. A value that
 * spans several lines (or is literally `|`) is written as `|` followed by its
 * lines indented two further spaces. Keys never contain `:` or newlines.
 */

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::error::ParseError;

/// Closes every entry
pub const SEPARATOR: &str = "---";

const TOP_INDENT: usize = 2;
const FIELD_INDENT: usize = 4;
const BLOCK_MARKER: &str = "|";
const UNNAMED: &str = "unnamed";
const EMPTY_FIELD: &str = "-";

/// Current time at the precision the files store (microseconds)
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Strip characters that would break the `key: value` layout
pub fn sanitize_key(key: &str) -> String {
    key.replace(':', "_").replace(['\n', '\r'], " ")
}

/// Component name safe to use in a header and as a file name
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`; an empty name becomes
/// `unnamed`.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        UNNAMED.to_string()
    } else {
        cleaned
    }
}

/// Header field that cannot be mistaken for a `|` delimiter or a line break
pub fn sanitize_header_field(field: &str) -> String {
    let cleaned = field.trim().replace('|', "/").replace(['\n', '\r'], " ");
    if cleaned.is_empty() {
        EMPTY_FIELD.to_string()
    } else {
        cleaned
    }
}

/// `  NAME: value`
pub fn push_top(out: &mut String, name: &str, value: &str) {
    push_value(out, TOP_INDENT, name, value);
}

/// `  NAME:` opening a section of fields
pub fn push_section(out: &mut String, name: &str) {
    out.push_str(&" ".repeat(TOP_INDENT));
    out.push_str(name);
    out.push_str(":\n");
}

/// `    key: value` inside the current section
pub fn push_field(out: &mut String, key: &str, value: &str) {
    push_value(out, FIELD_INDENT, &sanitize_key(key), value);
}

fn push_value(out: &mut String, indent: usize, key: &str, value: &str) {
    let pad = " ".repeat(indent);
    if value.contains('\n') || value == BLOCK_MARKER {
        out.push_str(&format!("{pad}{key}: {BLOCK_MARKER}\n"));
        for line in value.split('\n') {
            out.push_str(&format!("{pad}  {line}\n"));
        }
    } else {
        out.push_str(&format!("{pad}{key}: {value}\n"));
    }
}

/// One `key: value` line inside a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: String,
    pub value: String,
    pub line: usize,
}

/// One top-level item: a `NAME: value` line or a `NAME:` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub value: String,
    pub line: usize,
    pub fields: Vec<Field>,
}

/// A complete entry before it is decoded into a typed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// Header line without surrounding whitespace
    pub header: String,
    pub header_line: usize,
    pub items: Vec<Item>,
}

impl RawBlock {
    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.name == name)
    }

    /// Split `[timestamp] rest` into its two halves
    pub fn split_header(&self) -> Result<(DateTime<Utc>, &str), ParseError> {
        let rest = self
            .header
            .strip_prefix('[')
            .ok_or_else(|| ParseError::malformed(self.header_line, "header must start with '['"))?;
        let (stamp, rest) = rest
            .split_once(']')
            .ok_or_else(|| ParseError::malformed(self.header_line, "unterminated timestamp"))?;
        let ts = parse_timestamp(stamp).ok_or_else(|| {
            ParseError::malformed(self.header_line, format!("bad timestamp '{stamp}'"))
        })?;
        Ok((ts, rest.trim()))
    }
}

/// Where a multi-line value is being collected
enum Pending {
    Top,
    Field,
}

struct Block {
    pending: Option<(Pending, Vec<String>)>,
    raw: RawBlock,
}

impl Block {
    fn finish_pending(&mut self) {
        let Some((target, lines)) = self.pending.take() else {
            return;
        };
        let value = lines.join("\n");
        let Some(item) = self.raw.items.last_mut() else {
            return;
        };
        match target {
            Pending::Top => item.value = value,
            Pending::Field => {
                if let Some(field) = item.fields.last_mut() {
                    field.value = value;
                }
            }
        }
    }
}

fn split_key_value(text: &str) -> Option<(&str, &str)> {
    text.split_once(": ")
        .or_else(|| text.strip_suffix(':').map(|key| (key, "")))
}

/// Split `text` into raw blocks
///
/// Returns every block closed by a separator, plus the error that stopped the
/// scan if the text is not well formed. Lines for which `is_preamble` is true
/// are skipped between entries.
pub fn parse_blocks(
    text: &str,
    is_preamble: impl Fn(&str) -> bool,
) -> (Vec<RawBlock>, Option<ParseError>) {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;
    let top_pad = " ".repeat(TOP_INDENT);
    let field_pad = " ".repeat(FIELD_INDENT);

    // Only `\n` ends a line; a `\r` before it belongs to the value.
    for (index, line) in text.split_inclusive('\n').enumerate() {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line_no = index + 1;

        let Some(block) = current.as_mut() else {
            if line.trim().is_empty() || is_preamble(line) {
                continue;
            }
            if line.starts_with('[') {
                current = Some(Block {
                    pending: None,
                    raw: RawBlock {
                        header: line.trim().to_string(),
                        header_line: line_no,
                        items: Vec::new(),
                    },
                });
                continue;
            }
            return (
                blocks,
                Some(ParseError::malformed(line_no, "text outside of an entry")),
            );
        };

        if let Some((target, lines)) = block.pending.as_mut() {
            let indent = match target {
                Pending::Top => TOP_INDENT + 2,
                Pending::Field => FIELD_INDENT + 2,
            };
            let block_pad = " ".repeat(indent);
            if let Some(rest) = line.strip_prefix(block_pad.as_str()) {
                lines.push(rest.to_string());
                continue;
            }
            if line.trim().is_empty() {
                lines.push(String::new());
                continue;
            }
            block.finish_pending();
        }

        if line.strip_suffix('\r').unwrap_or(line) == SEPARATOR {
            if let Some(block) = current.take() {
                blocks.push(block.raw);
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix(field_pad.as_str()) {
            let Some(item) = block.raw.items.last_mut() else {
                return (
                    blocks,
                    Some(ParseError::malformed(line_no, "field outside of a section")),
                );
            };
            let Some((key, value)) = split_key_value(rest) else {
                return (
                    blocks,
                    Some(ParseError::malformed(line_no, "field without ':'")),
                );
            };
            item.fields.push(Field {
                key: key.to_string(),
                value: value.to_string(),
                line: line_no,
            });
            if value == BLOCK_MARKER {
                block.pending = Some((Pending::Field, Vec::new()));
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix(top_pad.as_str()) {
            let Some((name, value)) = split_key_value(rest) else {
                return (
                    blocks,
                    Some(ParseError::malformed(line_no, "item without ':'")),
                );
            };
            block.raw.items.push(Item {
                name: name.to_string(),
                value: value.to_string(),
                line: line_no,
                fields: Vec::new(),
            });
            if value == BLOCK_MARKER {
                block.pending = Some((Pending::Top, Vec::new()));
            }
            continue;
        }

        let reason = if line.starts_with('[') {
            "new entry started before separator"
        } else {
            "unexpected line inside entry"
        };
        return (blocks, Some(ParseError::malformed(line_no, reason)));
    }

    let error = current.map(|block| {
        ParseError::malformed(
            block.raw.header_line,
            "entry is not terminated by a separator",
        )
    });
    (blocks, error)
}
