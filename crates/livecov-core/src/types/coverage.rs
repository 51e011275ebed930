//! # Coverage Snapshots
//!
//! Decoded coverage data and the merge algebra over it.
//!
//! A [`CoverageInfo`] is plain value data: it owns no native resources and can
//! be cloned, compared, serialized and merged freely. Merging is associative
//! and commutative with the empty snapshot as identity, because it is a union
//! of maps where colliding segments have their counts summed.
//!
//! ## Example
//!
//! ```rust
//! use livecov_core::types::{CoverageInfo, FileCoverage, Location, Segment};
//!
//! let loc = Location::new(1, 1, 3, 2);
//! let a = CoverageInfo::from_iter([FileCoverage::from_segments("lib.rs", [Segment::new(loc, 2)])]);
//! let b = CoverageInfo::from_iter([FileCoverage::from_segments("lib.rs", [Segment::new(loc, 3)])]);
//!
//! let merged = a.merge(&b);
//! assert_eq!(merged.file("lib.rs").unwrap().segment(&loc).unwrap().count, 5);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::location::Location;

/// One covered region and its execution count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment
{
    pub location: Location,
    pub count: u64,
}

impl Segment
{
    pub const fn new(location: Location, count: u64) -> Self
    {
        Segment { location, count }
    }
}

impl fmt::Display for Segment
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} | {}", self.location, self.count)
    }
}

/// Per-source-file region map
///
/// Keys are unique by [`Location`]. Serialized as a list of segments since
/// JSON object keys must be strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileCoverage
{
    pub name: String,
    #[serde(with = "segment_list")]
    pub segments: BTreeMap<Location, Segment>,
}

impl FileCoverage
{
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self
    {
        Self {
            name: name.into(),
            segments: BTreeMap::new(),
        }
    }

    /// Build a file from segments. Segments sharing a location are summed.
    pub fn from_segments(name: impl Into<String>, segments: impl IntoIterator<Item = Segment>) -> Self
    {
        let mut file = Self::new(name);
        for segment in segments {
            file.add_segment(segment);
        }
        file
    }

    /// Insert a segment, summing counts when the location is already present.
    pub fn add_segment(&mut self, segment: Segment)
    {
        self.segments
            .entry(segment.location)
            .and_modify(|existing| existing.count = existing.count.saturating_add(segment.count))
            .or_insert(segment);
    }

    pub fn segment(&self, location: &Location) -> Option<&Segment>
    {
        self.segments.get(location)
    }

    /// Union of both region maps with counts summed on shared locations.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self
    {
        let mut merged = self.clone();
        for segment in other.segments.values() {
            merged.add_segment(*segment);
        }
        merged
    }

    /// Number of segments that executed at least once.
    pub fn covered_segments(&self) -> usize
    {
        self.segments.values().filter(|segment| segment.count > 0).count()
    }
}

impl fmt::Display for FileCoverage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.name)?;
        for segment in self.segments.values() {
            write!(f, "\n\t{segment}")?;
        }
        Ok(())
    }
}

/// A full decoded snapshot, keyed by source file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoverageInfo
{
    #[serde(with = "file_list")]
    pub files: BTreeMap<String, FileCoverage>,
}

/// Counts reported by [`CoverageInfo::summary`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageSummary
{
    pub files: usize,
    pub segments: usize,
    pub covered_segments: usize,
}

impl CoverageInfo
{
    /// The empty snapshot, identity element of [`CoverageInfo::merge`].
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn is_empty(&self) -> bool
    {
        self.files.is_empty()
    }

    pub fn file(&self, name: &str) -> Option<&FileCoverage>
    {
        self.files.get(name)
    }

    /// Add a file, merging it into an existing entry of the same name.
    pub fn add_file(&mut self, file: FileCoverage)
    {
        match self.files.get_mut(&file.name) {
            Some(existing) => {
                for segment in file.segments.into_values() {
                    existing.add_segment(segment);
                }
            }
            None => {
                self.files.insert(file.name.clone(), file);
            }
        }
    }

    /// Combine two snapshots
    ///
    /// The file sets are unioned by name. For files present on both sides the
    /// location sets are unioned, and segments at the same location have their
    /// counts summed. Nothing is ever discarded.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self
    {
        let mut merged = self.clone();
        merged.extend(other.files.values().cloned());
        merged
    }

    /// Consuming variant of [`CoverageInfo::merge`].
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self
    {
        self.extend(other.files.into_values());
        self
    }

    pub fn summary(&self) -> CoverageSummary
    {
        self.files.values().fold(
            CoverageSummary {
                files: self.files.len(),
                ..CoverageSummary::default()
            },
            |mut acc, file| {
                acc.segments += file.segments.len();
                acc.covered_segments += file.covered_segments();
                acc
            },
        )
    }
}

impl Extend<FileCoverage> for CoverageInfo
{
    fn extend<I: IntoIterator<Item = FileCoverage>>(&mut self, iter: I)
    {
        for file in iter {
            self.add_file(file);
        }
    }
}

impl FromIterator<FileCoverage> for CoverageInfo
{
    fn from_iter<I: IntoIterator<Item = FileCoverage>>(iter: I) -> Self
    {
        let mut info = CoverageInfo::new();
        info.extend(iter);
        info
    }
}

impl fmt::Display for CoverageInfo
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "CoverageInfo:\n===========")?;
        for file in self.files.values() {
            write!(f, "\n{file}")?;
        }
        Ok(())
    }
}

mod segment_list
{
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Location, Segment};

    pub fn serialize<S>(segments: &BTreeMap<Location, Segment>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(segments.values())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<Location, Segment>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<Segment>::deserialize(deserializer)?;
        let mut segments = BTreeMap::new();
        for segment in list {
            segments
                .entry(segment.location)
                .and_modify(|existing: &mut Segment| existing.count = existing.count.saturating_add(segment.count))
                .or_insert(segment);
        }
        Ok(segments)
    }
}

mod file_list
{
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{CoverageInfo, FileCoverage};

    pub fn serialize<S>(files: &BTreeMap<String, FileCoverage>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(files.values())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, FileCoverage>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<FileCoverage>::deserialize(deserializer)?;
        Ok(list.into_iter().collect::<CoverageInfo>().files)
    }
}
