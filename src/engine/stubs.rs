//! In-memory implementations of the engine capabilities
//!
//! These implementations are intended for:
//! - **Unit testing** the dispatcher and bucket service without a storage engine
//! - **Integration testing** against the public API
//! - **Development and prototyping** of protocol front ends
//!
//! # Available Stubs
//!
//! ## In-Memory Viewer ([`InMemoryViewer`])
//!
//! Holds a table of series per organization and bucket. Series keys carry the
//! storage-side measurement and field tags, exactly as a real engine reports
//! them. The viewer counts open cursors so tests can assert nothing leaks,
//! and deletes bucket data when used as a [`BucketDeleter`].
//!
//! ## In-Memory Bucket Store ([`InMemoryBucketStore`])
//!
//! A metadata store holding bucket records in a map.
//!
//! ## Recording Deleter ([`RecordingDeleter`])
//!
//! Records every data deletion call, optionally failing them.
//!
//! # Warning
//!
//! **These stubs are NOT suitable for production use.** All data lives in
//! memory and is lost on drop.
//!
//! # Example
//!
//! ```rust
//! use gorilla_readservice::engine::stubs::InMemoryViewer;
//! use gorilla_readservice::types::Id;
//!
//! let viewer = InMemoryViewer::new();
//! viewer.add_series(Id(1), Id(2), "cpu", "usage", &[("host", "a")], vec![(10, 0.5)]);
//! assert_eq!(viewer.series_count(), 1);
//! assert_eq!(viewer.open_cursors(), 0);
//! ```

use crate::context::RequestContext;
use crate::engine::traits::{
    Bucket, BucketDeleter, BucketFinder, CursorIterator, CursorRequest, SeriesCursor,
    SeriesCursorRequest, SeriesCursorRow, StringStream, ValueBatch, ValueCursor, Viewer,
};
use crate::error::{MetadataError, StorageError};
use crate::predicate::{is_true_literal, reduce, Expr, Valuer};
use crate::reads::request::Aggregate;
use crate::types::{Id, Tag, Tags, TimeRange, FIELD_TAG_KEY, MEASUREMENT_TAG_KEY};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Open Cursor Accounting
// =============================================================================

/// Counts a live cursor until dropped
#[derive(Debug)]
struct OpenGuard(Arc<AtomicUsize>);

impl OpenGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// In-Memory Viewer
// =============================================================================

type SeriesTable = BTreeMap<Tags, Vec<(i64, f64)>>;

/// Arguments of the most recent tag enumeration call
#[derive(Debug, Clone, PartialEq)]
pub struct TagCall {
    /// Organization queried
    pub org_id: Id,
    /// Bucket queried
    pub bucket_id: Id,
    /// Tag key, for value enumeration
    pub tag_key: Option<String>,
    /// Range start as received
    pub start: i64,
    /// Range end as received
    pub end: i64,
    /// Predicate as received, rendered
    pub predicate: Option<String>,
}

#[derive(Default)]
struct ViewerState {
    series: RwLock<HashMap<(Id, Id), SeriesTable>>,
    open_series_cursors: Arc<AtomicUsize>,
    open_value_cursors: Arc<AtomicUsize>,
    series_cursors_created: AtomicUsize,
    tag_calls: AtomicUsize,
    last_tag_call: Mutex<Option<TagCall>>,
    failure: Mutex<Option<String>>,
    pull_delay: Mutex<Option<Duration>>,
}

impl ViewerState {
    fn check_failure(&self) -> Result<(), StorageError> {
        match self.failure.lock().as_ref() {
            Some(msg) => Err(StorageError::Unavailable(msg.clone())),
            None => Ok(()),
        }
    }
}

/// In-memory storage engine view
///
/// Cloning is cheap; clones share the same data and counters.
#[derive(Clone, Default)]
pub struct InMemoryViewer {
    state: Arc<ViewerState>,
}

impl InMemoryViewer {
    /// Create an empty viewer
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a series with the given measurement, field and tags
    ///
    /// Points are stored in timestamp order. Adding an existing series
    /// appends its points.
    pub fn add_series(
        &self,
        org_id: Id,
        bucket_id: Id,
        measurement: &str,
        field: &str,
        tags: &[(&str, &str)],
        points: Vec<(i64, f64)>,
    ) {
        let mut all: Vec<Tag> = tags.iter().map(|(k, v)| Tag::new(*k, *v)).collect();
        all.push(Tag::new(MEASUREMENT_TAG_KEY, measurement));
        all.push(Tag::new(FIELD_TAG_KEY, field));
        self.add_raw_series(org_id, bucket_id, Tags::new(all), points);
    }

    /// Add a series keyed by raw storage-side tags
    pub fn add_raw_series(&self, org_id: Id, bucket_id: Id, tags: Tags, points: Vec<(i64, f64)>) {
        let mut series = self.state.series.write();
        let stored = series
            .entry((org_id, bucket_id))
            .or_default()
            .entry(tags)
            .or_default();
        stored.extend(points);
        stored.sort_by_key(|(ts, _)| *ts);
    }

    /// Remove all series of a bucket
    pub fn drop_bucket(&self, org_id: Id, bucket_id: Id) -> bool {
        self.state.series.write().remove(&(org_id, bucket_id)).is_some()
    }

    /// Total series across all buckets
    pub fn series_count(&self) -> usize {
        self.state.series.read().values().map(BTreeMap::len).sum()
    }

    /// Series and value cursors currently open
    pub fn open_cursors(&self) -> usize {
        self.open_series_cursors() + self.open_value_cursors()
    }

    /// Series cursors currently open
    pub fn open_series_cursors(&self) -> usize {
        self.state.open_series_cursors.load(Ordering::SeqCst)
    }

    /// Value cursors currently open
    pub fn open_value_cursors(&self) -> usize {
        self.state.open_value_cursors.load(Ordering::SeqCst)
    }

    /// Series cursors created since construction
    pub fn series_cursors_created(&self) -> usize {
        self.state.series_cursors_created.load(Ordering::SeqCst)
    }

    /// Tag key and tag value enumeration calls since construction
    pub fn tag_calls(&self) -> usize {
        self.state.tag_calls.load(Ordering::SeqCst)
    }

    /// Arguments of the most recent tag enumeration call
    pub fn last_tag_call(&self) -> Option<TagCall> {
        self.state.last_tag_call.lock().clone()
    }

    /// Make every capability call fail with [`StorageError::Unavailable`]
    pub fn set_failure(&self, message: Option<&str>) {
        *self.state.failure.lock() = message.map(str::to_string);
    }

    /// Delay every value batch pull, simulating engine I/O
    pub fn set_pull_delay(&self, delay: Option<Duration>) {
        *self.state.pull_delay.lock() = delay;
    }

    fn record_tag_call(&self, call: TagCall) {
        self.state.tag_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.last_tag_call.lock() = Some(call);
    }

    /// Normalized tags of bucket series with a point inside `[start, end]`
    /// that match `predicate`
    fn matching_tags(
        &self,
        org_id: Id,
        bucket_id: Id,
        start: i64,
        end: i64,
        predicate: Option<&Expr>,
    ) -> Vec<Tags> {
        let range = TimeRange::new(start, end);
        let series = self.state.series.read();
        let Some(table) = series.get(&(org_id, bucket_id)) else {
            return Vec::new();
        };
        table
            .iter()
            .filter(|(_, points)| points.iter().any(|(ts, _)| range.contains(*ts)))
            .map(|(tags, _)| tags.normalized())
            .filter(|tags| matches(predicate, tags))
            .collect()
    }
}

/// Whether the tags satisfy the condition; no condition matches everything
fn matches(cond: Option<&Expr>, tags: &Tags) -> bool {
    match cond {
        None => true,
        Some(expr) => is_true_literal(&reduce(expr.clone(), Some(tags as &dyn Valuer))),
    }
}

fn string_stream(values: BTreeSet<String>) -> StringStream {
    Box::pin(futures::stream::iter(values.into_iter().map(Ok)))
}

#[async_trait]
impl Viewer for InMemoryViewer {
    async fn create_cursor_iterator(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Option<Arc<dyn CursorIterator>>, StorageError> {
        self.state.check_failure()?;
        if self.series_count() == 0 {
            return Ok(None);
        }
        Ok(Some(Arc::new(InMemoryCursorIterator {
            state: Arc::clone(&self.state),
        })))
    }

    async fn create_series_cursor(
        &self,
        _ctx: &RequestContext,
        req: SeriesCursorRequest,
        cond: Option<&Expr>,
    ) -> Result<Box<dyn SeriesCursor>, StorageError> {
        self.state.check_failure()?;
        let rows: Vec<Tags> = self
            .state
            .series
            .read()
            .get(&(req.org_id, req.bucket_id))
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();

        self.state
            .series_cursors_created
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemorySeriesCursor {
            req,
            rows: rows.into_iter(),
            cond: cond.cloned(),
            _open: OpenGuard::new(&self.state.open_series_cursors),
        }))
    }

    async fn tag_keys(
        &self,
        _ctx: &RequestContext,
        org_id: Id,
        bucket_id: Id,
        start: i64,
        end: i64,
        predicate: Option<&Expr>,
    ) -> Result<StringStream, StorageError> {
        self.record_tag_call(TagCall {
            org_id,
            bucket_id,
            tag_key: None,
            start,
            end,
            predicate: predicate.map(ToString::to_string),
        });
        self.state.check_failure()?;

        let keys = self
            .matching_tags(org_id, bucket_id, start, end, predicate)
            .iter()
            .flat_map(|tags| tags.keys().map(str::to_string).collect::<Vec<_>>())
            .collect();
        Ok(string_stream(keys))
    }

    async fn tag_values(
        &self,
        _ctx: &RequestContext,
        org_id: Id,
        bucket_id: Id,
        tag_key: &str,
        start: i64,
        end: i64,
        predicate: Option<&Expr>,
    ) -> Result<StringStream, StorageError> {
        self.record_tag_call(TagCall {
            org_id,
            bucket_id,
            tag_key: Some(tag_key.to_string()),
            start,
            end,
            predicate: predicate.map(ToString::to_string),
        });
        self.state.check_failure()?;

        let values = self
            .matching_tags(org_id, bucket_id, start, end, predicate)
            .iter()
            .filter_map(|tags| tags.get(tag_key).map(str::to_string))
            .collect();
        Ok(string_stream(values))
    }
}

/// The viewer doubles as the engine's data deleter
#[async_trait]
impl BucketDeleter for InMemoryViewer {
    async fn delete_bucket(
        &self,
        _ctx: &RequestContext,
        org_id: Id,
        bucket_id: Id,
    ) -> Result<(), StorageError> {
        self.state.check_failure()?;
        self.drop_bucket(org_id, bucket_id);
        Ok(())
    }
}

struct InMemorySeriesCursor {
    req: SeriesCursorRequest,
    rows: std::vec::IntoIter<Tags>,
    cond: Option<Expr>,
    _open: OpenGuard,
}

#[async_trait]
impl SeriesCursor for InMemorySeriesCursor {
    async fn next(&mut self) -> Result<Option<SeriesCursorRow>, StorageError> {
        for tags in self.rows.by_ref() {
            if matches(self.cond.as_ref(), &tags) {
                return Ok(Some(SeriesCursorRow {
                    org_id: self.req.org_id,
                    bucket_id: self.req.bucket_id,
                    tags,
                }));
            }
        }
        Ok(None)
    }
}

struct InMemoryCursorIterator {
    state: Arc<ViewerState>,
}

#[async_trait]
impl CursorIterator for InMemoryCursorIterator {
    async fn next(
        &self,
        _ctx: &RequestContext,
        req: &CursorRequest,
    ) -> Result<Option<Box<dyn ValueCursor>>, StorageError> {
        self.state.check_failure()?;
        let mut points: Vec<(i64, f64)> = {
            let series = self.state.series.read();
            let Some(stored) = series
                .get(&(req.org_id, req.bucket_id))
                .and_then(|table| table.get(&req.series_tags))
            else {
                return Ok(None);
            };
            stored
                .iter()
                .copied()
                .filter(|(ts, _)| req.range.contains(*ts))
                .collect()
        };

        if points.is_empty() {
            return Ok(None);
        }
        if let Some(agg) = req.aggregate {
            points = vec![aggregate(agg, &points)];
        }
        if !req.ascending {
            points.reverse();
        }

        Ok(Some(Box::new(InMemoryValueCursor {
            points: points.into_iter(),
            batch_size: req.batch_size.max(1),
            delay: *self.state.pull_delay.lock(),
            _open: OpenGuard::new(&self.state.open_value_cursors),
        })))
    }
}

/// Reduce ascending points to one point
///
/// Selectors keep the selected point's timestamp; the others report the
/// timestamp of the last point.
fn aggregate(agg: Aggregate, points: &[(i64, f64)]) -> (i64, f64) {
    let last_ts = points[points.len() - 1].0;
    let values = points.iter().map(|(_, v)| *v);
    match agg {
        Aggregate::Count => (last_ts, points.len() as f64),
        Aggregate::Sum => (last_ts, values.sum()),
        Aggregate::Mean => (last_ts, values.sum::<f64>() / points.len() as f64),
        Aggregate::Min => points
            .iter()
            .copied()
            .fold(points[0], |acc, p| if p.1 < acc.1 { p } else { acc }),
        Aggregate::Max => points
            .iter()
            .copied()
            .fold(points[0], |acc, p| if p.1 > acc.1 { p } else { acc }),
        Aggregate::First => points[0],
        Aggregate::Last => points[points.len() - 1],
    }
}

struct InMemoryValueCursor {
    points: std::vec::IntoIter<(i64, f64)>,
    batch_size: usize,
    delay: Option<Duration>,
    _open: OpenGuard,
}

#[async_trait]
impl ValueCursor for InMemoryValueCursor {
    async fn next(&mut self) -> Result<Option<ValueBatch>, StorageError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut batch = ValueBatch::with_capacity(self.batch_size);
        for (ts, v) in self.points.by_ref().take(self.batch_size) {
            batch.push(ts, v);
        }
        if batch.is_empty() {
            return Ok(None);
        }
        Ok(Some(batch))
    }
}

// =============================================================================
// In-Memory Bucket Store
// =============================================================================

/// In-memory metadata store for bucket records
pub struct InMemoryBucketStore {
    buckets: RwLock<HashMap<Id, Bucket>>,
    next_id: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl InMemoryBucketStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0x0a00_0000_0000_0001),
            failure: Mutex::new(None),
        }
    }

    /// Create a bucket with a fresh ID
    pub fn create_bucket(&self, org_id: Id, name: &str) -> Bucket {
        let id = Id(self.next_id.fetch_add(1, Ordering::SeqCst));
        let bucket = Bucket {
            id,
            org_id,
            name: name.to_string(),
            retention_period: None,
        };
        self.buckets.write().insert(id, bucket.clone());
        bucket
    }

    /// Insert or replace a bucket record
    pub fn insert(&self, bucket: Bucket) {
        self.buckets.write().insert(bucket.id, bucket);
    }

    /// Remove a bucket record
    pub fn remove_bucket(&self, id: Id) -> Result<Bucket, MetadataError> {
        self.buckets
            .write()
            .remove(&id)
            .ok_or(MetadataError::NotFound(id))
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    /// Check if the store holds no buckets
    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }

    /// Make lookups fail with [`MetadataError::Unavailable`]
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock() = message.map(str::to_string);
    }
}

impl Default for InMemoryBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BucketFinder for InMemoryBucketStore {
    async fn find_bucket_by_id(
        &self,
        _ctx: &RequestContext,
        id: Id,
    ) -> Result<Bucket, MetadataError> {
        if let Some(msg) = self.failure.lock().as_ref() {
            return Err(MetadataError::Unavailable(msg.clone()));
        }
        self.buckets
            .read()
            .get(&id)
            .cloned()
            .ok_or(MetadataError::NotFound(id))
    }
}

// =============================================================================
// Recording Deleter
// =============================================================================

/// Data deleter that records its calls
#[derive(Default)]
pub struct RecordingDeleter {
    calls: Mutex<Vec<(Id, Id)>>,
    failure: Option<String>,
}

impl RecordingDeleter {
    /// Create a deleter whose calls succeed
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a deleter whose calls fail with [`StorageError::Internal`]
    ///
    /// Failed calls are still recorded.
    pub fn failing(message: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    /// Every `(org_id, bucket_id)` pair received, in call order
    pub fn calls(&self) -> Vec<(Id, Id)> {
        self.calls.lock().clone()
    }

    /// The most recent `(org_id, bucket_id)` pair received
    pub fn last_call(&self) -> Option<(Id, Id)> {
        self.calls.lock().last().copied()
    }
}

#[async_trait]
impl BucketDeleter for RecordingDeleter {
    async fn delete_bucket(
        &self,
        _ctx: &RequestContext,
        org_id: Id,
        bucket_id: Id,
    ) -> Result<(), StorageError> {
        self.calls.lock().push((org_id, bucket_id));
        match &self.failure {
            Some(msg) => Err(StorageError::Internal(msg.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::BinaryOp;
    use crate::types::MAX_NANO_TIME;
    use futures::StreamExt;

    const ORG: Id = Id(1);
    const BUCKET: Id = Id(2);

    fn viewer() -> InMemoryViewer {
        let viewer = InMemoryViewer::new();
        let points = vec![(10, 1.0), (20, 3.0)];
        viewer.add_series(ORG, BUCKET, "cpu", "usage", &[("host", "a")], points);
        viewer.add_series(ORG, BUCKET, "cpu", "usage", &[("host", "b")], vec![(30, 5.0)]);
        viewer.add_series(ORG, BUCKET, "mem", "free", &[("host", "a")], vec![(15, 2.0)]);
        viewer
    }

    fn request(tags: Tags, aggregate: Option<Aggregate>) -> CursorRequest {
        CursorRequest {
            org_id: ORG,
            bucket_id: BUCKET,
            series_tags: tags,
            field: "usage".into(),
            range: TimeRange::unbounded(),
            ascending: true,
            batch_size: 1,
            aggregate,
        }
    }

    #[tokio::test]
    async fn test_series_cursor_filters_and_counts() {
        let viewer = viewer();
        let ctx = RequestContext::new();
        let cond = Expr::binary(BinaryOp::Eq, Expr::tag("host"), Expr::String("a".into()));

        let mut cursor = viewer
            .create_series_cursor(
                &ctx,
                SeriesCursorRequest {
                    org_id: ORG,
                    bucket_id: BUCKET,
                },
                Some(&cond),
            )
            .await
            .unwrap();
        assert_eq!(viewer.open_series_cursors(), 1);

        let mut hosts = Vec::new();
        while let Some(row) = cursor.next().await.unwrap() {
            hosts.push(row.tags.get("host").unwrap().to_string());
        }
        assert_eq!(hosts, vec!["a", "a"]);

        drop(cursor);
        assert_eq!(viewer.open_series_cursors(), 0);
        assert_eq!(viewer.series_cursors_created(), 1);
    }

    #[tokio::test]
    async fn test_value_cursor_batches_and_aggregates() {
        let viewer = viewer();
        let ctx = RequestContext::new();
        let iter = viewer.create_cursor_iterator(&ctx).await.unwrap().unwrap();
        let tags = Tags::from_pairs([
            (MEASUREMENT_TAG_KEY, "cpu"),
            (FIELD_TAG_KEY, "usage"),
            ("host", "a"),
        ]);

        let mut cursor = iter.next(&ctx, &request(tags.clone(), None)).await.unwrap().unwrap();
        assert_eq!(viewer.open_value_cursors(), 1);
        assert_eq!(cursor.next().await.unwrap().unwrap().timestamps, vec![10]);
        assert_eq!(cursor.next().await.unwrap().unwrap().timestamps, vec![20]);
        assert!(cursor.next().await.unwrap().is_none());
        drop(cursor);
        assert_eq!(viewer.open_value_cursors(), 0);

        let mut mean = iter
            .next(&ctx, &request(tags, Some(Aggregate::Mean)))
            .await
            .unwrap()
            .unwrap();
        let batch = mean.next().await.unwrap().unwrap();
        assert_eq!(batch, ValueBatch::new(vec![20], vec![2.0]));
    }

    #[tokio::test]
    async fn test_empty_viewer_has_no_cursor_iterator() {
        let viewer = InMemoryViewer::new();
        let ctx = RequestContext::new();
        assert!(viewer.create_cursor_iterator(&ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tag_enumeration_uses_range_and_normalized_keys() {
        let viewer = viewer();
        let ctx = RequestContext::new();

        let keys: Vec<String> = viewer
            .tag_keys(&ctx, ORG, BUCKET, 0, MAX_NANO_TIME, None)
            .await
            .unwrap()
            .map(|k| k.unwrap())
            .collect()
            .await;
        assert_eq!(keys, vec!["_field", "_measurement", "host"]);

        let hosts: Vec<String> = viewer
            .tag_values(&ctx, ORG, BUCKET, "host", 25, 40, None)
            .await
            .unwrap()
            .map(|k| k.unwrap())
            .collect()
            .await;
        assert_eq!(hosts, vec!["b"]);

        let call = viewer.last_tag_call().unwrap();
        assert_eq!(call.tag_key.as_deref(), Some("host"));
        assert_eq!((call.start, call.end), (25, 40));
        assert_eq!(viewer.tag_calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let viewer = viewer();
        viewer.set_failure(Some("disk offline"));
        let ctx = RequestContext::new();
        let err = viewer.create_cursor_iterator(&ctx).await.err().unwrap();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_bucket_store_and_deleter() {
        let store = InMemoryBucketStore::new();
        let ctx = RequestContext::new();
        let bucket = store.create_bucket(ORG, "metrics");
        assert_eq!(store.find_bucket_by_id(&ctx, bucket.id).await.unwrap(), bucket);

        store.remove_bucket(bucket.id).unwrap();
        assert!(matches!(
            store.find_bucket_by_id(&ctx, bucket.id).await,
            Err(MetadataError::NotFound(id)) if id == bucket.id
        ));

        let deleter = RecordingDeleter::failing("boom");
        assert!(deleter.delete_bucket(&ctx, ORG, BUCKET).await.is_err());
        assert_eq!(deleter.calls(), vec![(ORG, BUCKET)]);
    }
}
