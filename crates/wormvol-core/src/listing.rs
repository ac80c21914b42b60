//! Splits `llist` console output into raw attribute records.
//!
//! `bconsole` prints one `Key: Value` line per attribute and separates
//! entities with a blank line. Key casing differs between director versions
//! (`MediaId` vs `mediaid`), so keys are lowercased. Everything before the
//! first `MediaId` line (connection banner, echoed command, catalog selection)
//! is noise and is discarded.
//!
//! Any `: ERR=` line means the director refused the command; the whole
//! response is rejected in that case since partial output cannot be trusted.

use std::collections::BTreeMap;

use crate::error::ParseError;

/// Attributes of one media entity, keyed by lowercase attribute name.
pub type RawRecord = BTreeMap<String, String>;

/// Key that opens a new media entity.
pub const MEDIA_DESIGNATOR: &str = "mediaid";

/// Marker the director embeds in a line when a command fails.
pub const ERROR_MARKER: &str = ": ERR=";

const SEPARATOR: &str = ": ";

/// Parse a full console response into records, in input order.
pub fn parse_listing(text: &str) -> Result<Vec<RawRecord>, ParseError> {
    if let Some(line) = text.lines().find(|line| line.contains(ERROR_MARKER)) {
        return Err(ParseError::CommandError {
            line: line.trim().to_string(),
        });
    }

    let mut records = Vec::new();
    let mut current: Option<RawRecord> = None;

    for line in text.lines() {
        let content = line.trim_start();
        if content.trim_end().is_empty() {
            records.extend(current.take());
            continue;
        }

        let Some((key, value)) = content.split_once(SEPARATOR) else {
            if current.is_some() {
                return Err(ParseError::MalformedLine {
                    line: content.trim_end().to_string(),
                });
            }
            continue;
        };

        let key = key.trim();
        if key.eq_ignore_ascii_case(MEDIA_DESIGNATOR) {
            records.extend(current.take());
            current = Some(RawRecord::new());
        }

        if let Some(record) = current.as_mut() {
            record.insert(key.to_ascii_lowercase(), value.trim().to_string());
        }
    }
    records.extend(current);

    Ok(records)
}
