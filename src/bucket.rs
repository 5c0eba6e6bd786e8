//! Bucket deletion coordinator
//!
//! Deleting a bucket's time-series data needs the owning organization, and
//! the only trusted source of that is the bucket's metadata record. The
//! [`BucketService`] looks the record up first and only then asks the data
//! deleter to drop `(record.org_id, bucket_id)`.
//!
//! The two calls are not transactional. When the lookup succeeds and the
//! deletion fails, the data stays in place and the error is returned; the
//! record is untouched, so the whole call can simply be repeated. Removing
//! the metadata record itself is left to the caller.

use crate::config::DeletionConfig;
use crate::context::RequestContext;
use crate::engine::traits::{Bucket, BucketDeleter, BucketFinder};
use crate::error::{Error, Result};
use crate::metrics;
use crate::types::Id;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Coordinates bucket lookup with data deletion
#[derive(Clone)]
pub struct BucketService {
    finder: Option<Arc<dyn BucketFinder>>,
    deleter: Option<Arc<dyn BucketDeleter>>,
}

impl BucketService {
    /// Create a service
    ///
    /// Without a metadata store every call fails. Without a deleter the
    /// lookup still happens but no data is deleted.
    pub fn new(
        finder: Option<Arc<dyn BucketFinder>>,
        deleter: Option<Arc<dyn BucketDeleter>>,
    ) -> Self {
        Self { finder, deleter }
    }

    /// Create a service, dropping the deleter when configuration disables
    /// data deletion
    pub fn from_config(
        finder: Option<Arc<dyn BucketFinder>>,
        deleter: Option<Arc<dyn BucketDeleter>>,
        config: &DeletionConfig,
    ) -> Self {
        let deleter = if config.delete_data { deleter } else { None };
        Self::new(finder, deleter)
    }

    /// Whether data deletion is wired up
    pub fn deletes_data(&self) -> bool {
        self.deleter.is_some()
    }

    /// Look up a bucket's metadata record
    pub async fn find_bucket_by_id(&self, ctx: &RequestContext, id: Id) -> Result<Bucket> {
        let finder = self
            .finder
            .as_ref()
            .ok_or_else(|| Error::Configuration("no bucket metadata store configured".into()))?;
        ctx.guard(finder.find_bucket_by_id(ctx, id)).await
    }

    /// Delete a bucket's time-series data
    ///
    /// The organization is taken from the bucket's metadata record. A bucket
    /// that does not exist, including one already deleted by the caller,
    /// fails with [`Error::NotFound`] and nothing is deleted.
    pub async fn delete_bucket(&self, ctx: &RequestContext, bucket_id: Id) -> Result<()> {
        let span = info_span!(parent: ctx.span(), "delete_bucket", %bucket_id);
        let result = self.delete_bucket_inner(ctx, bucket_id).instrument(span).await;
        metrics::record_bucket_delete(result.as_ref().err());
        result
    }

    async fn delete_bucket_inner(&self, ctx: &RequestContext, bucket_id: Id) -> Result<()> {
        let bucket = match self.find_bucket_by_id(ctx, bucket_id).await {
            Ok(bucket) => bucket,
            Err(e) => {
                debug!(error = %e, "bucket lookup failed");
                return Err(e);
            }
        };

        let Some(deleter) = &self.deleter else {
            debug!(org_id = %bucket.org_id, "no data deleter configured");
            return Ok(());
        };

        match ctx
            .guard(deleter.delete_bucket(ctx, bucket.org_id, bucket.id))
            .await
        {
            Ok(()) => {
                info!(org_id = %bucket.org_id, "deleted bucket data");
                Ok(())
            }
            Err(e) => {
                warn!(org_id = %bucket.org_id, error = %e, "bucket data deletion failed");
                Err(e)
            }
        }
    }
}
