//! Capability traits consumed by the read service
//!
//! The dispatcher never touches storage directly. It talks to a [`Viewer`]
//! for series and tag enumeration, and the bucket service talks to a
//! [`BucketFinder`] and an optional [`BucketDeleter`]. Implementations are
//! shared across requests and must tolerate unlimited concurrent calls.
//!
//! Cursors release their resources when dropped.

use crate::context::RequestContext;
use crate::error::{MetadataError, StorageError};
use crate::predicate::Expr;
use crate::reads::request::Aggregate;
use crate::types::{Id, Tags, TimeRange};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Lazy sequence of strings produced by tag enumeration
pub type StringStream = Pin<Box<dyn Stream<Item = Result<String, StorageError>> + Send>>;

// =============================================================================
// Viewer Trait
// =============================================================================

/// Read capabilities of the storage engine
#[async_trait]
pub trait Viewer: Send + Sync + 'static {
    /// Open the iterator that yields one value cursor per series
    ///
    /// `None` means the engine has nothing to read.
    async fn create_cursor_iterator(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Arc<dyn CursorIterator>>, StorageError>;

    /// Open a cursor over the series of one bucket matching `cond`
    async fn create_series_cursor(
        &self,
        ctx: &RequestContext,
        req: SeriesCursorRequest,
        cond: Option<&Expr>,
    ) -> Result<Box<dyn SeriesCursor>, StorageError>;

    /// Enumerate tag keys of matching series within a time range
    async fn tag_keys(
        &self,
        ctx: &RequestContext,
        org_id: Id,
        bucket_id: Id,
        start: i64,
        end: i64,
        predicate: Option<&Expr>,
    ) -> Result<StringStream, StorageError>;

    /// Enumerate values of one tag key within a time range
    #[allow(clippy::too_many_arguments)]
    async fn tag_values(
        &self,
        ctx: &RequestContext,
        org_id: Id,
        bucket_id: Id,
        tag_key: &str,
        start: i64,
        end: i64,
        predicate: Option<&Expr>,
    ) -> Result<StringStream, StorageError>;
}

/// Scope of a series cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesCursorRequest {
    /// Owning organization
    pub org_id: Id,
    /// Bucket to scan
    pub bucket_id: Id,
}

/// Pull-based cursor over series keys, in engine order
#[async_trait]
pub trait SeriesCursor: Send {
    /// Next series, or `None` at the end
    async fn next(&mut self) -> Result<Option<SeriesCursorRow>, StorageError>;
}

/// One series as the engine reports it
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesCursorRow {
    /// Owning organization
    pub org_id: Id,
    /// Owning bucket
    pub bucket_id: Id,
    /// Series key tags, including the storage-side measurement and field keys
    pub tags: Tags,
}

/// Produces value cursors for individual series
#[async_trait]
pub trait CursorIterator: Send + Sync {
    /// Value cursor for one series, or `None` when it has no data in range
    async fn next(
        &self,
        ctx: &RequestContext,
        req: &CursorRequest,
    ) -> Result<Option<Box<dyn ValueCursor>>, StorageError>;
}

/// Request for a single series' values
#[derive(Debug, Clone, PartialEq)]
pub struct CursorRequest {
    /// Owning organization
    pub org_id: Id,
    /// Owning bucket
    pub bucket_id: Id,
    /// Series key tags as reported by the series cursor
    pub series_tags: Tags,
    /// Field name
    pub field: String,
    /// Time window
    pub range: TimeRange,
    /// Ascending time order
    pub ascending: bool,
    /// Advisory maximum points per batch
    pub batch_size: usize,
    /// Aggregate the engine should apply, if any
    pub aggregate: Option<Aggregate>,
}

/// Pull-based cursor over one series' points
#[async_trait]
pub trait ValueCursor: Send {
    /// Next batch of points, or `None` at the end
    async fn next(&mut self) -> Result<Option<ValueBatch>, StorageError>;
}

/// Batch of points in columnar layout
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueBatch {
    /// Timestamps in nanoseconds
    pub timestamps: Vec<i64>,
    /// Values
    pub values: Vec<f64>,
}

impl ValueBatch {
    /// Create a batch from parallel vectors
    pub fn new(timestamps: Vec<i64>, values: Vec<f64>) -> Self {
        debug_assert_eq!(timestamps.len(), values.len());
        Self { timestamps, values }
    }

    /// Create an empty batch with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Add a point
    pub fn push(&mut self, timestamp: i64, value: f64) {
        self.timestamps.push(timestamp);
        self.values.push(value);
    }

    /// Number of points
    #[inline]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if batch is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

// =============================================================================
// Bucket Metadata
// =============================================================================

/// Bucket metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Bucket identifier
    pub id: Id,
    /// Owning organization
    pub org_id: Id,
    /// Human-readable name
    pub name: String,
    /// Retention period (None = forever)
    pub retention_period: Option<Duration>,
}

/// Metadata store lookup capability
#[async_trait]
pub trait BucketFinder: Send + Sync + 'static {
    /// Fetch a bucket record by ID
    async fn find_bucket_by_id(
        &self,
        ctx: &RequestContext,
        id: Id,
    ) -> Result<Bucket, MetadataError>;
}

/// Removes a bucket's time-series data from the storage engine
#[async_trait]
pub trait BucketDeleter: Send + Sync + 'static {
    /// Delete all data stored for the organization's bucket
    async fn delete_bucket(
        &self,
        ctx: &RequestContext,
        org_id: Id,
        bucket_id: Id,
    ) -> Result<(), StorageError>;
}
