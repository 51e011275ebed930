//! Source range type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A source range covered by one region
///
/// Lines and columns are 1-based as reported by the coverage mapping. The
/// range is half-open by convention: `end` points at the first position after
/// the region. Equality and ordering use all four fields, so a `Location` is
/// usable as a map key.
///
/// ## Example
///
/// ```rust
/// use livecov_core::types::Location;
///
/// let loc = Location::new(3, 1, 5, 2);
/// assert_eq!(loc.to_string(), "3:1 => 5:2");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location
{
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Location
{
    /// The zeroed location used before a region opens.
    pub const ZERO: Self = Location {
        start_line: 0,
        start_column: 0,
        end_line: 0,
        end_column: 0,
    };

    pub const fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self
    {
        Location {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Check whether `(line, column)` falls inside this range.
    #[must_use]
    pub fn contains(&self, line: u32, column: u32) -> bool
    {
        let pos = (line, column);
        pos >= (self.start_line, self.start_column) && pos < (self.end_line, self.end_column)
    }
}

impl fmt::Display for Location
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "{}:{} => {}:{}",
            self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}
