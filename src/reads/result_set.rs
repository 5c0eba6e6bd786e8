//! Lazy filtered result set
//!
//! A [`FilteredResultSet`] yields one [`SeriesFrame`] per series, in the
//! order the engine delivers them. Nothing is read ahead: a series is pulled
//! from the engine when the caller asks for the next frame, and a batch of
//! points when the caller asks the frame for its next batch.
//!
//! The result set owns its series cursor. Dropping the set, calling
//! [`close`](FilteredResultSet::close), reaching the end, or observing
//! cancellation all release it.

use crate::context::RequestContext;
use crate::engine::traits::{ValueBatch, ValueCursor};
use crate::error::{Error, Result};
use crate::predicate::{is_true_literal, reduce, Expr, PointValuer, Valuer};
use crate::reads::series_cursor::{IndexSeriesCursor, SeriesRow, ValueReader};
use crate::types::{Tags, TimeRange};
use futures::stream::BoxStream;
use futures::StreamExt;

/// Lazy sequence of series frames for a filter read
pub struct FilteredResultSet {
    ctx: RequestContext,
    cursor: IndexSeriesCursor,
    reader: ValueReader,
    range: TimeRange,
    batch_size: usize,
}

impl FilteredResultSet {
    /// Wrap a series cursor
    pub fn new(
        ctx: RequestContext,
        cursor: IndexSeriesCursor,
        range: TimeRange,
        batch_size: usize,
    ) -> Self {
        let reader = cursor.reader();
        Self {
            ctx,
            cursor,
            reader,
            range,
            batch_size,
        }
    }

    /// Next series frame, or `None` when every series has been read
    ///
    /// Series without data in range are skipped.
    pub async fn next(&mut self) -> Result<Option<SeriesFrame>> {
        loop {
            if let Err(e) = self.ctx.check() {
                self.close();
                return Err(e);
            }
            let Some(row) = self.cursor.next().await? else {
                return Ok(None);
            };
            match self.reader.open(&row, self.range, self.batch_size, None).await {
                Ok(Some(values)) => {
                    return Ok(Some(SeriesFrame::new(self.ctx.clone(), row, values)))
                }
                Ok(None) => continue,
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
    }

    /// Release the series cursor; later calls to [`next`](Self::next) return `None`
    pub fn close(&mut self) {
        self.cursor.close();
    }

    /// Adapt into a stream of frames
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> BoxStream<'static, Result<SeriesFrame>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut rs = state?;
            match rs.next().await {
                Ok(Some(frame)) => Some((Ok(frame), Some(rs))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
        .boxed()
    }
}

/// Points of one series, pulled in batches
pub struct SeriesFrame {
    ctx: RequestContext,
    row: SeriesRow,
    values: Option<Box<dyn ValueCursor>>,
}

impl SeriesFrame {
    pub(crate) fn new(ctx: RequestContext, row: SeriesRow, values: Box<dyn ValueCursor>) -> Self {
        Self {
            ctx,
            row,
            values: Some(values),
        }
    }

    /// Series this frame reads
    pub fn row(&self) -> &SeriesRow {
        &self.row
    }

    /// Caller-facing series tags
    pub fn tags(&self) -> &Tags {
        &self.row.tags
    }

    /// Measurement name
    pub fn measurement(&self) -> &str {
        &self.row.measurement
    }

    /// Field name
    pub fn field(&self) -> &str {
        &self.row.field
    }

    /// Next non-empty batch of points, or `None` at the end
    ///
    /// Points failing the series' value condition are dropped. On
    /// cancellation or any error the value cursor is released before the
    /// error is returned.
    pub async fn next_batch(&mut self) -> Result<Option<ValueBatch>> {
        loop {
            let Some(values) = self.values.as_mut() else {
                return Ok(None);
            };
            let next = self.ctx.guard(values.next()).await;
            let batch = match next {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    self.values = None;
                    return Ok(None);
                }
                Err(e) => {
                    self.values = None;
                    return Err(e);
                }
            };

            let batch = match &self.row.value_cond {
                Some(cond) => filter_batch(cond, batch),
                None => batch,
            };
            if !batch.is_empty() {
                return Ok(Some(batch));
            }
        }
    }

    /// Read every remaining point into one batch
    pub async fn read_all(mut self) -> Result<ValueBatch> {
        let mut all = ValueBatch::default();
        while let Some(batch) = self.next_batch().await? {
            all.timestamps.extend(batch.timestamps);
            all.values.extend(batch.values);
        }
        Ok(all)
    }
}

impl std::fmt::Debug for SeriesFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesFrame")
            .field("row", &self.row)
            .field("open", &self.values.is_some())
            .finish()
    }
}

fn filter_batch(cond: &Expr, batch: ValueBatch) -> ValueBatch {
    let mut out = ValueBatch::with_capacity(batch.len());
    for (ts, v) in batch.timestamps.into_iter().zip(batch.values) {
        let valuer = PointValuer(v);
        if is_true_literal(&reduce(cond.clone(), Some(&valuer as &dyn Valuer))) {
            out.push(ts, v);
        }
    }
    out
}

/// Error a consumer sees after cancelling mid-stream
pub fn is_cancellation(err: &Error) -> bool {
    matches!(err, Error::Cancelled | Error::DeadlineExceeded)
}
