//! Core data types shared by the dispatcher and the bucket service
//!
//! # Key Types
//!
//! - **`Id`**: 64-bit organization or bucket identifier, rendered as 16 hex digits
//! - **`TimeRange`**: nanosecond window `[start, end]` with zero-bound normalization
//! - **`Tags`**: sorted tag set of a series, with the reserved measurement and
//!   field keys used by the storage engine
//!
//! # Example
//!
//! ```rust
//! use gorilla_readservice::types::{TimeRange, MAX_NANO_TIME, MIN_NANO_TIME};
//!
//! // A zero bound means "not supplied" and opens the range on that side
//! let range = TimeRange::new(0, 0).normalized();
//! assert_eq!(range.start, MIN_NANO_TIME);
//! assert_eq!(range.end, MAX_NANO_TIME);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smallest timestamp the storage engine can represent
///
/// Two values above `i64::MIN`; the engine reserves the lowest values as
/// sentinels.
pub const MIN_NANO_TIME: i64 = i64::MIN + 2;

/// Largest timestamp the storage engine can represent
pub const MAX_NANO_TIME: i64 = i64::MAX - 1;

/// Storage-side tag key carrying the measurement name
pub const MEASUREMENT_TAG_KEY: &str = "\x00";

/// Storage-side tag key carrying the field name
pub const FIELD_TAG_KEY: &str = "\u{ff}";

/// Caller-facing name of the measurement tag
pub const MEASUREMENT_KEY: &str = "_measurement";

/// Caller-facing name of the field tag
pub const FIELD_KEY: &str = "_field";

/// Organization or bucket identifier
///
/// Zero is never a valid identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(pub u64);

impl Id {
    /// Whether this identifier may refer to a real entity
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for Id {
    fn from(v: u64) -> Self {
        Id(v)
    }
}

/// Error returned when parsing an [`Id`] from its hex form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError(String);

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid id {:?}: expected 16 hex digits, non-zero", self.0)
    }
}

impl std::error::Error for ParseIdError {}

impl FromStr for Id {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(ParseIdError(s.to_string()));
        }
        let v = u64::from_str_radix(s, 16).map_err(|_| ParseIdError(s.to_string()))?;
        let id = Id(v);
        if !id.is_valid() {
            return Err(ParseIdError(s.to_string()));
        }
        Ok(id)
    }
}

/// Time range for read requests, in nanoseconds since the epoch
///
/// Inclusive semantics are defined by the storage engine. A zero bound means
/// the caller left that side open; see [`TimeRange::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp in nanoseconds
    pub start: i64,

    /// End timestamp in nanoseconds
    pub end: i64,
}

impl TimeRange {
    /// Create a time range
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// The widest range the engine can represent
    pub fn unbounded() -> Self {
        Self {
            start: MIN_NANO_TIME,
            end: MAX_NANO_TIME,
        }
    }

    /// Replace a zero start with [`MIN_NANO_TIME`] and a zero end with
    /// [`MAX_NANO_TIME`]
    pub fn normalized(self) -> Self {
        Self {
            start: if self.start == 0 { MIN_NANO_TIME } else { self.start },
            end: if self.end == 0 { MAX_NANO_TIME } else { self.end },
        }
    }

    /// Check if a timestamp falls within this range (inclusive)
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// A single tag key/value pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

impl Tag {
    /// Create a tag
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Tag set of one series, kept sorted by key
///
/// Ordering compares tags pairwise in key order, which is series key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tags(Vec<Tag>);

impl Tags {
    /// Build a tag set, sorting by key; a later duplicate key replaces an earlier one
    pub fn new(mut tags: Vec<Tag>) -> Self {
        tags.reverse();
        tags.sort_by(|a, b| a.key.cmp(&b.key));
        tags.dedup_by(|a, b| a.key == b.key);
        Self(tags)
    }

    /// Build a tag set from key/value pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(pairs.into_iter().map(|(k, v)| Tag::new(k, v)).collect())
    }

    /// Value of a tag, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .binary_search_by(|t| t.key.as_str().cmp(key))
            .ok()
            .map(|i| self.0[i].value.as_str())
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no tags
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate tags in key order
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// Tag keys in key order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|t| t.key.as_str())
    }

    /// Rename the storage-side measurement and field keys to their
    /// caller-facing names
    pub fn normalized(&self) -> Self {
        Self::new(
            self.0
                .iter()
                .map(|t| Tag::new(normalize_tag_key(&t.key), t.value.clone()))
                .collect(),
        )
    }
}

/// Caller-facing name of a storage-side tag key
pub fn normalize_tag_key(key: &str) -> &str {
    match key {
        MEASUREMENT_TAG_KEY => MEASUREMENT_KEY,
        FIELD_TAG_KEY => FIELD_KEY,
        other => other,
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_normalization() {
        let range = TimeRange::new(0, 0).normalized();
        assert_eq!(range, TimeRange::unbounded());

        // Explicit bounds, including ones at the epoch's neighbours, are kept
        let range = TimeRange::new(-1, 1).normalized();
        assert_eq!(range, TimeRange::new(-1, 1));

        let range = TimeRange::new(100, 0).normalized();
        assert_eq!(range.start, 100);
        assert_eq!(range.end, MAX_NANO_TIME);
    }

    #[test]
    fn test_id_display_and_parse() {
        let id = Id(0x2222222222222222);
        assert_eq!(id.to_string(), "2222222222222222");
        assert_eq!("2222222222222222".parse::<Id>().unwrap(), id);
        assert!("0000000000000000".parse::<Id>().is_err());
        assert!("abc".parse::<Id>().is_err());
        assert!("zzzzzzzzzzzzzzzz".parse::<Id>().is_err());
    }

    #[test]
    fn test_tags_sorted_and_lookup() {
        let tags = Tags::from_pairs([("host", "a"), ("dc", "east"), ("host", "b")]);
        assert_eq!(tags.keys().collect::<Vec<_>>(), vec!["dc", "host"]);
        assert_eq!(tags.get("host"), Some("b"));
        assert_eq!(tags.get("missing"), None);
    }

    #[test]
    fn test_tags_normalized() {
        let tags = Tags::from_pairs([
            (MEASUREMENT_TAG_KEY, "cpu"),
            ("host", "a"),
            (FIELD_TAG_KEY, "usage"),
        ]);
        let normalized = tags.normalized();
        assert_eq!(normalized.get(MEASUREMENT_KEY), Some("cpu"));
        assert_eq!(normalized.get(FIELD_KEY), Some("usage"));
        assert_eq!(normalized.get("host"), Some("a"));
        assert_eq!(normalized.get(MEASUREMENT_TAG_KEY), None);
    }
}
