//! # Boundary Reconstruction
//!
//! Turns the ordered boundary records the native decoder reports for one file
//! into one [`Segment`] per maximal run of constant non-zero count.
//!
//! ## Transition table
//!
//! | open count | record count          | action                                   |
//! |------------|-----------------------|------------------------------------------|
//! | 0          | non-zero              | open a region at the record              |
//! | non-zero   | 0                     | close the region at the record, emit it  |
//! | non-zero   | non-zero, different   | close just before the record, emit, open |
//! | any        | same / both zero      | nothing                                  |
//!
//! A count change without a zero gap ends the open region one column before
//! the new record. At column 0 it ends on the previous line, column unchanged.
//! A region still open after the last record is dropped: well-formed record
//! lists always end with a zero-count record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Location, Segment};

/// One boundary record as produced by the native decoder
///
/// Only `line`, `column` and `count` drive reconstruction. The flags are kept
/// for callers that want to inspect raw records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryRecord
{
    pub line: u32,
    pub column: u32,
    pub count: u64,
    pub has_count: bool,
    pub is_region_entry: bool,
    pub is_gap_region: bool,
}

impl BoundaryRecord
{
    /// Record with a count and the region-entry flag set.
    pub const fn entry(line: u32, column: u32, count: u64) -> Self
    {
        BoundaryRecord {
            line,
            column,
            count,
            has_count: true,
            is_region_entry: true,
            is_gap_region: false,
        }
    }

    /// Zero-count record without a count, as emitted at the end of a file.
    pub const fn end(line: u32, column: u32) -> Self
    {
        BoundaryRecord {
            line,
            column,
            count: 0,
            has_count: false,
            is_region_entry: false,
            is_gap_region: false,
        }
    }
}

/// Rebuild the segment map of one file from its boundary records.
pub fn reconstruct(records: &[BoundaryRecord]) -> BTreeMap<Location, Segment>
{
    let mut segments = BTreeMap::new();
    let mut current = Location::ZERO;
    let mut current_count = 0u64;

    for record in records {
        match (current_count, record.count) {
            (0, count) if count != 0 => {
                current.start_line = record.line;
                current.start_column = record.column;
                current_count = count;
            }
            (open, 0) if open != 0 => {
                current.end_line = record.line;
                current.end_column = record.column;
                segments.insert(current, Segment::new(current, open));
                current = Location::ZERO;
                current_count = 0;
            }
            (open, count) if open != 0 && count != 0 && open != count => {
                if record.column > 0 {
                    current.end_line = record.line;
                    current.end_column = record.column - 1;
                } else {
                    current.end_line = record.line.saturating_sub(1);
                    current.end_column = record.column;
                }
                segments.insert(current, Segment::new(current, open));
                current = Location::new(record.line, record.column, 0, 0);
                current_count = count;
            }
            _ => {}
        }
    }

    segments
}
