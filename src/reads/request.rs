//! Read request types
//!
//! These are the decoded forms of the four request kinds the protocol layer
//! hands to the [`Store`](super::Store). Wire encoding is the protocol
//! layer's concern; the source handle stays opaque until the store
//! resolves it.

use crate::predicate::Predicate;
use crate::source::SourceAny;
use crate::types::TimeRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Common view of a request used by the validation pipeline
pub trait ReadRequest {
    /// Operation name used in spans and metric labels
    const OPERATION: &'static str;

    /// Source handle, if the caller supplied one
    fn source(&self) -> Option<&SourceAny>;

    /// Requested time range, before normalization
    fn range(&self) -> TimeRange;

    /// Filter predicate, if any
    fn predicate(&self) -> Option<&Predicate>;

    /// Requested tag key, for tag-value enumeration
    fn tag_key(&self) -> Option<&str> {
        None
    }
}

/// Read every matching series, one frame per series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadFilterRequest {
    /// Encoded source handle
    pub read_source: Option<SourceAny>,
    /// Time window
    pub range: TimeRange,
    /// Series filter
    pub predicate: Option<Predicate>,
}

/// Read matching series partitioned into groups
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadGroupRequest {
    /// Encoded source handle
    pub read_source: Option<SourceAny>,
    /// Time window
    pub range: TimeRange,
    /// Series filter
    pub predicate: Option<Predicate>,
    /// Grouping mode
    pub group: Group,
    /// Aggregate each series' values, if set
    pub aggregate: Option<Aggregate>,
}

/// Enumerate tag keys of matching series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagKeysRequest {
    /// Encoded source handle
    pub tags_source: Option<SourceAny>,
    /// Time window; zero bounds are open
    pub range: TimeRange,
    /// Tag-only filter
    pub predicate: Option<Predicate>,
}

/// Enumerate values of one tag key across matching series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagValuesRequest {
    /// Encoded source handle
    pub tags_source: Option<SourceAny>,
    /// Time window; zero bounds are open
    pub range: TimeRange,
    /// Tag-only filter
    pub predicate: Option<Predicate>,
    /// Tag key to enumerate; must not be empty
    pub tag_key: String,
}

/// How a group read partitions series
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    /// A single group holding every series
    #[default]
    None,
    /// One group per distinct combination of these tag values
    By(Vec<String>),
}

impl Group {
    /// Tag keys the groups are partitioned by
    pub fn keys(&self) -> &[String] {
        match self {
            Group::None => &[],
            Group::By(keys) => keys,
        }
    }
}

/// Aggregate the storage engine applies per series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Number of points
    Count,
    /// Sum of values
    Sum,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Arithmetic mean
    Mean,
    /// Earliest point
    First,
    /// Latest point
    Last,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregate::Count => "count",
            Aggregate::Sum => "sum",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Mean => "mean",
            Aggregate::First => "first",
            Aggregate::Last => "last",
        };
        f.write_str(name)
    }
}

impl ReadRequest for ReadFilterRequest {
    const OPERATION: &'static str = "read_filter";

    fn source(&self) -> Option<&SourceAny> {
        self.read_source.as_ref()
    }

    fn range(&self) -> TimeRange {
        self.range
    }

    fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }
}

impl ReadRequest for ReadGroupRequest {
    const OPERATION: &'static str = "read_group";

    fn source(&self) -> Option<&SourceAny> {
        self.read_source.as_ref()
    }

    fn range(&self) -> TimeRange {
        self.range
    }

    fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }
}

impl ReadRequest for TagKeysRequest {
    const OPERATION: &'static str = "tag_keys";

    fn source(&self) -> Option<&SourceAny> {
        self.tags_source.as_ref()
    }

    fn range(&self) -> TimeRange {
        self.range
    }

    fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }
}

impl ReadRequest for TagValuesRequest {
    const OPERATION: &'static str = "tag_values";

    fn source(&self) -> Option<&SourceAny> {
        self.tags_source.as_ref()
    }

    fn range(&self) -> TimeRange {
        self.range
    }

    fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    fn tag_key(&self) -> Option<&str> {
        Some(&self.tag_key)
    }
}
