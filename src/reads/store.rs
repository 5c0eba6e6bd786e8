//! Read dispatcher
//!
//! [`Store`] is the entry point the protocol layer calls. Every operation is a
//! one-shot pipeline:
//!
//! ```text
//! validate ──▶ resolve source ──▶ translate predicate ──▶ delegate ──▶ wrap
//! ```
//!
//! The store holds no per-request state and is shared freely across
//! concurrent requests.

use crate::context::RequestContext;
use crate::config::ReadsConfig;
use crate::engine::traits::{StringStream, Viewer};
use crate::error::{Error, Result};
use crate::metrics;
use crate::predicate::{translate, Expr};
use crate::reads::group::{CursorFactory, GroupOptions, GroupResultSet};
use crate::reads::request::{
    ReadFilterRequest, ReadGroupRequest, ReadRequest, TagKeysRequest, TagValuesRequest,
};
use crate::reads::result_set::FilteredResultSet;
use crate::reads::series_cursor::IndexSeriesCursor;
use crate::source::{encode_source, resolve, ResolvedSource, SourceAny};
use crate::types::{Id, TimeRange};
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, field, info_span, warn, Instrument, Span};

/// Tag keys or tag values of a bucket, bound to the request context
///
/// The stream yields [`Error::Cancelled`] or [`Error::DeadlineExceeded`]
/// once the context ends, releases the engine stream and then ends.
pub type TagStream = BoxStream<'static, Result<String>>;

/// Validation steps, run in order before a request is delegated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Fail with `MissingSource` when no source handle was supplied
    RequireSource,
    /// Open zero range bounds
    NormalizeRange,
    /// Fail with `MissingTagKey` when the tag key is empty
    RequireTagKey,
    /// Translate the tag-only predicate
    TranslatePredicate,
}

const READ_STAGES: &[Stage] = &[Stage::RequireSource, Stage::NormalizeRange];

const TAG_KEYS_STAGES: &[Stage] = &[
    Stage::RequireSource,
    Stage::NormalizeRange,
    Stage::TranslatePredicate,
];

const TAG_VALUES_STAGES: &[Stage] = &[
    Stage::RequireSource,
    Stage::NormalizeRange,
    Stage::RequireTagKey,
    Stage::TranslatePredicate,
];

/// A request that passed validation
#[derive(Debug)]
struct Validated {
    source: ResolvedSource,
    range: TimeRange,
    cond: Option<Expr>,
}

/// Run `stages` over the request, then resolve its source
fn validate<R: ReadRequest>(req: &R, stages: &[Stage]) -> Result<Validated> {
    let mut range = req.range();
    let mut cond = None;

    for stage in stages {
        match stage {
            Stage::RequireSource => {
                if req.source().is_none() {
                    return Err(Error::MissingSource);
                }
            }
            Stage::NormalizeRange => range = range.normalized(),
            Stage::RequireTagKey => {
                if req.tag_key().map_or(true, str::is_empty) {
                    return Err(Error::MissingTagKey);
                }
            }
            Stage::TranslatePredicate => cond = translate(req.predicate())?,
        }
    }

    let any = req.source().ok_or(Error::MissingSource)?;
    let source = resolve(any)?;
    Ok(Validated {
        source,
        range,
        cond,
    })
}

/// Read dispatcher bound to one storage engine view
pub struct Store {
    viewer: Arc<dyn Viewer>,
    config: ReadsConfig,
}

impl Store {
    /// Create a store with default settings
    pub fn new(viewer: Arc<dyn Viewer>) -> Self {
        Self {
            viewer,
            config: ReadsConfig::default(),
        }
    }

    /// Create a store with explicit settings
    ///
    /// Fails with [`Error::Configuration`] when the settings do not validate.
    pub fn with_config(viewer: Arc<dyn Viewer>, config: ReadsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { viewer, config })
    }

    /// Settings in effect
    pub fn config(&self) -> &ReadsConfig {
        &self.config
    }

    /// Build the source handle for an organization's bucket
    pub fn source(&self, org_id: Id, bucket_id: Id) -> SourceAny {
        encode_source(org_id, bucket_id)
    }

    /// Read every matching series
    ///
    /// `Ok(None)` means the engine has nothing to read; it is not an error.
    pub async fn read_filter(
        &self,
        ctx: &RequestContext,
        req: &ReadFilterRequest,
    ) -> Result<Option<FilteredResultSet>> {
        let ctx = self.scoped(ctx);
        let span = request_span(&ctx, ReadFilterRequest::OPERATION);
        let fut = async {
            let v = validate(req, READ_STAGES)?;
            record_source(&v.source);

            let predicate = req.predicate.as_ref();
            let cursor =
                IndexSeriesCursor::open(&ctx, v.source, predicate, self.viewer.as_ref()).await?;
            let Some(cursor) = cursor else {
                debug!("no matching series");
                return Ok(None);
            };
            Ok(Some(FilteredResultSet::new(
                ctx.clone(),
                cursor,
                v.range,
                self.config.batch_size,
            )))
        };
        observe(ReadFilterRequest::OPERATION, fut.instrument(span)).await
    }

    /// Read matching series partitioned into groups
    ///
    /// No series cursor is opened until the first group is requested.
    pub async fn read_group(
        &self,
        ctx: &RequestContext,
        req: &ReadGroupRequest,
    ) -> Result<GroupResultSet> {
        let ctx = self.scoped(ctx);
        let span = request_span(&ctx, ReadGroupRequest::OPERATION);
        let fut = async {
            let v = validate(req, READ_STAGES)?;
            record_source(&v.source);

            let keys = req.group.keys().len();
            if keys > self.config.max_group_keys {
                return Err(Error::InvalidRequest(format!(
                    "{} group keys exceeds limit of {}",
                    keys, self.config.max_group_keys
                )));
            }

            let options = GroupOptions {
                group: req.group.clone(),
                aggregate: req.aggregate,
                range: v.range,
                batch_size: self.config.batch_size,
            };
            Ok(GroupResultSet::new(
                ctx.clone(),
                self.cursor_factory(&ctx, v.source, req),
                options,
            ))
        };
        observe(ReadGroupRequest::OPERATION, fut.instrument(span)).await
    }

    fn cursor_factory(
        &self,
        ctx: &RequestContext,
        source: ResolvedSource,
        req: &ReadGroupRequest,
    ) -> CursorFactory {
        let viewer = Arc::clone(&self.viewer);
        let predicate = req.predicate.clone();
        let ctx = ctx.clone();
        Box::new(move || {
            let viewer = Arc::clone(&viewer);
            let predicate = predicate.clone();
            let ctx = ctx.clone();
            async move {
                IndexSeriesCursor::open(&ctx, source, predicate.as_ref(), viewer.as_ref()).await
            }
            .boxed()
        })
    }

    /// Enumerate tag keys of matching series
    pub async fn tag_keys(
        &self,
        ctx: &RequestContext,
        req: &TagKeysRequest,
    ) -> Result<TagStream> {
        let ctx = self.scoped(ctx);
        let span = request_span(&ctx, TagKeysRequest::OPERATION);
        let fut = async {
            let v = validate(req, TAG_KEYS_STAGES)?;
            record_source(&v.source);
            ctx.guard(self.viewer.tag_keys(
                &ctx,
                v.source.org_id,
                v.source.bucket_id,
                v.range.start,
                v.range.end,
                v.cond.as_ref(),
            ))
            .await
            .map(|stream| bind_to_context(ctx.clone(), stream))
        };
        observe(TagKeysRequest::OPERATION, fut.instrument(span)).await
    }

    /// Enumerate values of one tag key across matching series
    pub async fn tag_values(
        &self,
        ctx: &RequestContext,
        req: &TagValuesRequest,
    ) -> Result<TagStream> {
        let ctx = self.scoped(ctx);
        let span = request_span(&ctx, TagValuesRequest::OPERATION);
        let fut = async {
            let v = validate(req, TAG_VALUES_STAGES)?;
            record_source(&v.source);
            ctx.guard(self.viewer.tag_values(
                &ctx,
                v.source.org_id,
                v.source.bucket_id,
                &req.tag_key,
                v.range.start,
                v.range.end,
                v.cond.as_ref(),
            ))
            .await
            .map(|stream| bind_to_context(ctx.clone(), stream))
        };
        observe(TagValuesRequest::OPERATION, fut.instrument(span)).await
    }

    /// Context for one request, with the configured deadline when the
    /// caller set none
    fn scoped(&self, ctx: &RequestContext) -> RequestContext {
        match self.config.request_timeout() {
            Some(timeout) if ctx.deadline().is_none() => ctx.clone().with_timeout(timeout),
            _ => ctx.clone(),
        }
    }
}

/// Stop an engine string stream when the request context ends
fn bind_to_context(ctx: RequestContext, stream: StringStream) -> TagStream {
    futures::stream::unfold(Some((ctx, stream)), |state| async move {
        let (ctx, mut stream) = state?;
        let next = ctx.guard(stream.next().map(Ok::<_, Error>)).await;
        match next {
            Ok(Some(Ok(value))) => Some((Ok(value), Some((ctx, stream)))),
            Ok(Some(Err(e))) => Some((Err(e.into()), None)),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "tag enumeration interrupted");
                Some((Err(e), None))
            }
        }
    })
    .boxed()
}

fn request_span(ctx: &RequestContext, operation: &'static str) -> Span {
    info_span!(
        parent: ctx.span(),
        "read_request",
        operation,
        org_id = field::Empty,
        bucket_id = field::Empty
    )
}

fn record_source(source: &ResolvedSource) {
    let span = Span::current();
    span.record("org_id", field::display(source.org_id));
    span.record("bucket_id", field::display(source.bucket_id));
}

/// Await a request, recording its outcome
async fn observe<T, F>(operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    let elapsed = start.elapsed().as_secs_f64();
    metrics::record_request(operation, elapsed, result.as_ref().err());

    if let Err(e) = &result {
        if e.is_client_error() {
            debug!(operation, error = %e, "request rejected");
        } else {
            warn!(operation, error = %e, kind = %e.kind(), "request failed");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::predicate::{ComparisonOp, Literal, Node, Predicate};
    use crate::types::{MAX_NANO_TIME, MIN_NANO_TIME};
    use bytes::Bytes;

    fn tag_values(source: Option<SourceAny>, tag_key: &str) -> TagValuesRequest {
        TagValuesRequest {
            tags_source: source,
            range: TimeRange::default(),
            predicate: None,
            tag_key: tag_key.to_string(),
        }
    }

    #[test]
    fn test_validate_missing_source_comes_first() {
        let err = validate(&tag_values(None, ""), TAG_VALUES_STAGES).unwrap_err();
        assert!(matches!(err, Error::MissingSource));
    }

    #[test]
    fn test_validate_missing_tag_key() {
        let source = encode_source(Id(1), Id(2));
        let err = validate(&tag_values(Some(source), ""), TAG_VALUES_STAGES).unwrap_err();
        assert!(matches!(err, Error::MissingTagKey));
    }

    #[test]
    fn test_validate_normalizes_and_resolves() {
        let source = encode_source(Id(1), Id(2));
        let v = validate(&tag_values(Some(source), "host"), TAG_VALUES_STAGES).unwrap();
        assert_eq!(v.source.org_id, Id(1));
        assert_eq!(v.source.bucket_id, Id(2));
        assert_eq!(v.range, TimeRange::new(MIN_NANO_TIME, MAX_NANO_TIME));
        assert!(v.cond.is_none());
    }

    #[test]
    fn test_validate_maps_field_values_unsupported() {
        let req = TagKeysRequest {
            tags_source: Some(encode_source(Id(1), Id(2))),
            range: TimeRange::new(1, 2),
            predicate: Some(Predicate::new(Node::compare(
                ComparisonOp::Lt,
                Node::FieldRef("usage".into()),
                Node::Literal(Literal::Integer(3)),
            ))),
        };
        let err = validate(&req, TAG_KEYS_STAGES).unwrap_err();
        assert!(matches!(err, Error::FieldValuesUnsupported));
    }

    #[test]
    fn test_validate_resolver_error_is_kept() {
        let bogus = SourceAny {
            type_url: "type.googleapis.com/somethingElse".into(),
            value: Bytes::new(),
        };
        let req = ReadFilterRequest {
            read_source: Some(bogus),
            ..Default::default()
        };
        let err = validate(&req, READ_STAGES).unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::UnknownType(_))));
    }

    #[test]
    fn test_read_stages_do_not_translate() {
        // Field-value predicates are allowed on the filter path
        let req = ReadFilterRequest {
            read_source: Some(encode_source(Id(1), Id(2))),
            range: TimeRange::new(5, 0),
            predicate: Some(Predicate::new(Node::compare(
                ComparisonOp::Gt,
                Node::FieldRef("usage".into()),
                Node::Literal(Literal::Float(1.0)),
            ))),
        };
        let v = validate(&req, READ_STAGES).unwrap();
        assert_eq!(v.range, TimeRange::new(5, MAX_NANO_TIME));
        assert!(v.cond.is_none());
    }
}
