//! Index-backed series cursor
//!
//! Wraps the engine's series cursor for one bucket and turns each engine row
//! into a [`SeriesRow`]: caller-facing tags, measurement and field names, and
//! the value condition points of that series must satisfy.
//!
//! Predicates on this path may reference field values. The engine only
//! filters on tags, so it receives the predicate with every field-value
//! comparison replaced by `true`; the field-value part is reduced per series
//! into [`SeriesRow::value_cond`] and applied to points as they are read.

use crate::context::RequestContext;
use crate::engine::traits::{
    CursorIterator, CursorRequest, SeriesCursor, SeriesCursorRequest, Viewer, ValueCursor,
};
use crate::error::Result;
use crate::predicate::{
    has_field_value_key, is_false_literal, is_true_literal, measurement_remap, node_to_expr,
    reduce, rewrite_remove_field_value, Expr, Predicate, Valuer,
};
use crate::reads::request::Aggregate;
use crate::source::ResolvedSource;
use crate::types::{Id, Tags, TimeRange, FIELD_KEY, MEASUREMENT_KEY};
use std::sync::Arc;
use tracing::debug;

/// One series as handed to result sets
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    /// Owning organization
    pub org_id: Id,
    /// Owning bucket
    pub bucket_id: Id,
    /// Series key tags as the engine reported them
    pub series_tags: Tags,
    /// Series key tags with caller-facing measurement and field keys
    pub tags: Tags,
    /// Measurement name
    pub measurement: String,
    /// Field name
    pub field: String,
    /// Condition on point values, if the predicate constrains them
    pub value_cond: Option<Expr>,
}

/// Ordered cursor over the series of one bucket matching a predicate
pub struct IndexSeriesCursor {
    ctx: RequestContext,
    source: ResolvedSource,
    series: Option<Box<dyn SeriesCursor>>,
    reader: ValueReader,
    value_expr: Option<Expr>,
}

impl IndexSeriesCursor {
    /// Open a cursor for the source's bucket
    ///
    /// Returns `Ok(None)` when the engine has nothing to read.
    pub async fn open(
        ctx: &RequestContext,
        source: ResolvedSource,
        predicate: Option<&Predicate>,
        viewer: &dyn Viewer,
    ) -> Result<Option<Self>> {
        let Some(iterator) = ctx.guard(viewer.create_cursor_iterator(ctx)).await? else {
            debug!("engine returned no cursor iterator");
            return Ok(None);
        };

        let mut series_cond = None;
        let mut value_expr = None;
        if let Some(root) = predicate.and_then(Predicate::root) {
            let remap = measurement_remap();
            let expr = reduce(node_to_expr(root, Some(&remap))?, None);
            if !is_true_literal(&expr) {
                if has_field_value_key(&expr) {
                    let rewritten = reduce(rewrite_remove_field_value(expr.clone()), None);
                    series_cond = (!is_true_literal(&rewritten)).then_some(rewritten);
                    value_expr = Some(expr);
                } else {
                    series_cond = Some(expr);
                }
            }
        }

        let req = SeriesCursorRequest {
            org_id: source.org_id,
            bucket_id: source.bucket_id,
        };
        let series = ctx
            .guard(viewer.create_series_cursor(ctx, req, series_cond.as_ref()))
            .await?;

        Ok(Some(Self {
            ctx: ctx.clone(),
            source,
            series: Some(series),
            reader: ValueReader {
                ctx: ctx.clone(),
                iterator,
            },
            value_expr,
        }))
    }

    /// Source this cursor reads from
    pub fn source(&self) -> ResolvedSource {
        self.source
    }

    /// Next series, or `None` at the end
    ///
    /// On cancellation or any error the cursor is closed before the error
    /// is returned.
    pub async fn next(&mut self) -> Result<Option<SeriesRow>> {
        loop {
            let Some(series) = self.series.as_mut() else {
                return Ok(None);
            };
            let next = self.ctx.guard(series.next()).await;
            let row = match next {
                Ok(Some(row)) => row,
                Ok(None) => {
                    self.close();
                    return Ok(None);
                }
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            };

            // Measurement and field tags are both required
            if row.tags.len() < 2 {
                continue;
            }

            let value_cond = match &self.value_expr {
                Some(expr) => {
                    let reduced = reduce(expr.clone(), Some(&row.tags as &dyn Valuer));
                    if is_false_literal(&reduced) {
                        continue;
                    }
                    (!is_true_literal(&reduced)).then_some(reduced)
                }
                None => None,
            };

            let tags = row.tags.normalized();
            let measurement = tags.get(MEASUREMENT_KEY).unwrap_or_default().to_string();
            let field = tags.get(FIELD_KEY).unwrap_or_default().to_string();
            return Ok(Some(SeriesRow {
                org_id: row.org_id,
                bucket_id: row.bucket_id,
                series_tags: row.tags,
                tags,
                measurement,
                field,
                value_cond,
            }));
        }
    }

    /// Handle for opening value cursors of this cursor's series
    ///
    /// Stays usable after the cursor is closed.
    pub fn reader(&self) -> ValueReader {
        self.reader.clone()
    }

    /// Release the engine cursor; later calls to [`next`](Self::next) return `None`
    pub fn close(&mut self) {
        self.series = None;
    }

    /// Whether the cursor has been closed
    pub fn is_closed(&self) -> bool {
        self.series.is_none()
    }
}

/// Opens value cursors for rows produced by an [`IndexSeriesCursor`]
#[derive(Clone)]
pub struct ValueReader {
    ctx: RequestContext,
    iterator: Arc<dyn CursorIterator>,
}

impl ValueReader {
    /// Open the value cursor for a series
    ///
    /// Returns `Ok(None)` when the series has no data in range.
    pub async fn open(
        &self,
        row: &SeriesRow,
        range: TimeRange,
        batch_size: usize,
        aggregate: Option<Aggregate>,
    ) -> Result<Option<Box<dyn ValueCursor>>> {
        let req = CursorRequest {
            org_id: row.org_id,
            bucket_id: row.bucket_id,
            series_tags: row.series_tags.clone(),
            field: row.field.clone(),
            range,
            ascending: true,
            batch_size,
            aggregate,
        };
        self.ctx.guard(self.iterator.next(&self.ctx, &req)).await
    }
}
