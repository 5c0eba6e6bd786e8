//! Lazy grouped result set
//!
//! A [`GroupResultSet`] never opens a series cursor itself. It is handed a
//! [`CursorFactory`] and calls it when the caller first asks for a group,
//! so a result set that is never read costs no engine I/O.
//!
//! ```text
//! Group::None      one group, series streamed straight from the cursor
//! Group::By(keys)  cursor scanned once, series partitioned by tag values,
//!                  groups emitted in ascending key order
//! ```

use crate::context::RequestContext;
use crate::error::Result;
use crate::reads::request::{Aggregate, Group};
use crate::reads::result_set::SeriesFrame;
use crate::reads::series_cursor::{IndexSeriesCursor, SeriesRow, ValueReader};
use crate::types::{Tag, TimeRange};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::BTreeMap;
use tracing::debug;

/// Deferred series cursor construction
///
/// Each call opens a fresh cursor; `Ok(None)` means nothing to read.
pub type CursorFactory =
    Box<dyn Fn() -> BoxFuture<'static, Result<Option<IndexSeriesCursor>>> + Send + Sync>;

/// Options shared by every group of a result set
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOptions {
    /// Grouping mode
    pub group: Group,
    /// Aggregate applied per series
    pub aggregate: Option<Aggregate>,
    /// Time window
    pub range: TimeRange,
    /// Advisory batch size
    pub batch_size: usize,
}

enum State {
    Unopened,
    Partitioned {
        groups: std::collections::btree_map::IntoIter<Vec<String>, Vec<SeriesRow>>,
        reader: ValueReader,
    },
    Done,
}

/// Lazy sequence of groups for a group read
pub struct GroupResultSet {
    ctx: RequestContext,
    factory: CursorFactory,
    options: GroupOptions,
    state: State,
}

impl GroupResultSet {
    /// Create a result set; `factory` is not called until [`next`](Self::next)
    pub fn new(ctx: RequestContext, factory: CursorFactory, options: GroupOptions) -> Self {
        Self {
            ctx,
            factory,
            options,
            state: State::Unopened,
        }
    }

    /// Next group, or `None` when every group has been read
    pub async fn next(&mut self) -> Result<Option<GroupCursor>> {
        if let Err(e) = self.ctx.check() {
            self.close();
            return Err(e);
        }

        if matches!(self.state, State::Unopened) {
            let opened = match self.ctx.guard((self.factory)()).await {
                Ok(opened) => opened,
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            };
            let Some(cursor) = opened else {
                self.close();
                return Ok(None);
            };

            match self.options.group.clone() {
                Group::None => {
                    self.close();
                    return self.single_group(cursor).await;
                }
                Group::By(keys) => {
                    if let Err(e) = self.partition(cursor, &keys).await {
                        self.close();
                        return Err(e);
                    }
                }
            }
        }

        let State::Partitioned { groups, reader } = &mut self.state else {
            return Ok(None);
        };
        let keys = self.options.group.keys();
        match groups.next() {
            Some((values, rows)) => {
                let key = keys
                    .iter()
                    .zip(values)
                    .map(|(k, v)| Tag::new(k.clone(), v))
                    .collect();
                let series = GroupSeries::Rows(rows.into_iter());
                let reader = reader.clone();
                Ok(Some(self.group_cursor(key, series, reader)))
            }
            None => {
                self.close();
                Ok(None)
            }
        }
    }

    async fn single_group(&self, mut cursor: IndexSeriesCursor) -> Result<Option<GroupCursor>> {
        let Some(first) = cursor.next().await? else {
            return Ok(None);
        };
        let reader = cursor.reader();
        let series = GroupSeries::Cursor {
            cursor,
            first: Some(first),
        };
        Ok(Some(self.group_cursor(Vec::new(), series, reader)))
    }

    async fn partition(&mut self, mut cursor: IndexSeriesCursor, keys: &[String]) -> Result<()> {
        let mut groups: BTreeMap<Vec<String>, Vec<SeriesRow>> = BTreeMap::new();
        while let Some(row) = cursor.next().await? {
            let values = keys
                .iter()
                .map(|k| row.tags.get(k).unwrap_or_default().to_string())
                .collect();
            groups.entry(values).or_default().push(row);
        }
        debug!(groups = groups.len(), "partitioned series");

        self.state = State::Partitioned {
            groups: groups.into_iter(),
            reader: cursor.reader(),
        };
        Ok(())
    }

    fn group_cursor(&self, key: Vec<Tag>, series: GroupSeries, reader: ValueReader) -> GroupCursor {
        GroupCursor {
            ctx: self.ctx.clone(),
            key,
            series,
            reader,
            range: self.options.range,
            batch_size: self.options.batch_size,
            aggregate: self.options.aggregate,
        }
    }

    /// Release everything held; later calls to [`next`](Self::next) return `None`
    pub fn close(&mut self) {
        self.state = State::Done;
    }

    /// Adapt into a stream of groups
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> BoxStream<'static, Result<GroupCursor>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut rs = state?;
            match rs.next().await {
                Ok(Some(group)) => Some((Ok(group), Some(rs))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
        .boxed()
    }
}

enum GroupSeries {
    Cursor {
        cursor: IndexSeriesCursor,
        first: Option<SeriesRow>,
    },
    Rows(std::vec::IntoIter<SeriesRow>),
}

/// One group: its key and a lazy sequence of series frames
pub struct GroupCursor {
    ctx: RequestContext,
    key: Vec<Tag>,
    series: GroupSeries,
    reader: ValueReader,
    range: TimeRange,
    batch_size: usize,
    aggregate: Option<Aggregate>,
}

impl GroupCursor {
    /// Group key as tag key/value pairs, in request order
    ///
    /// Empty for [`Group::None`].
    pub fn key(&self) -> &[Tag] {
        &self.key
    }

    /// Next series frame of this group, or `None` at the end
    pub async fn next(&mut self) -> Result<Option<SeriesFrame>> {
        loop {
            if let Err(e) = self.ctx.check() {
                self.close();
                return Err(e);
            }
            let row = match &mut self.series {
                GroupSeries::Cursor { cursor, first } => match first.take() {
                    Some(row) => Some(row),
                    None => cursor.next().await?,
                },
                GroupSeries::Rows(rows) => rows.next(),
            };
            let Some(row) = row else {
                return Ok(None);
            };

            let opened = self
                .reader
                .open(&row, self.range, self.batch_size, self.aggregate)
                .await;
            match opened {
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

    /// Release the series cursor, if this group streams from one
    pub fn close(&mut self) {
        match &mut self.series {
            GroupSeries::Cursor { cursor, first } => {
                first.take();
                cursor.close();
            }
            GroupSeries::Rows(_) => self.series = GroupSeries::Rows(Vec::new().into_iter()),
        }
    }
}

impl std::fmt::Debug for GroupCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCursor").field("key", &self.key).finish()
    }
}
