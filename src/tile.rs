//! Tile file parsing and intra-tile deduplication.

use crate::error::Error;
use crate::types::RawRecord;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use tracing::warn;

/// How a tile body containing malformed lines is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// The first malformed line fails the whole tile.
    #[default]
    Strict,
    /// Malformed lines are logged and skipped; the rest of the tile survives.
    Lenient,
}

/// Parses a newline-delimited tile body. Blank lines are ignored.
pub fn parse_tile(body: &str, mode: ParseMode) -> Result<Vec<RawRecord>, Error> {
    let mut records = Vec::new();
    for (idx, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRecord>(line) {
            Ok(record) => records.push(record),
            Err(source) if mode == ParseMode::Lenient => {
                warn!(line = idx + 1, %source, "skipping malformed record");
            }
            Err(source) => {
                return Err(Error::Json {
                    line: idx + 1,
                    source,
                })
            }
        }
    }
    Ok(records)
}

/// Collapses records sharing an [address key](RawRecord::address_key).
///
/// The last record in file order wins; output keeps the order in which each
/// key was first seen.
pub fn dedup_records(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let mut slots: FxHashMap<String, usize> = FxHashMap::default();
    let mut deduped: Vec<RawRecord> = Vec::with_capacity(records.len());
    for record in records {
        match slots.entry(record.address_key()) {
            Entry::Occupied(slot) => deduped[*slot.get()] = record,
            Entry::Vacant(slot) => {
                slot.insert(deduped.len());
                deduped.push(record);
            }
        }
    }
    deduped
}
