//! Read request dispatch
//!
//! The [`Store`] validates a request, resolves its source handle, translates
//! its predicate and delegates to the storage engine, handing back a lazy
//! result:
//!
//! | Operation     | Result                                  |
//! |---------------|-----------------------------------------|
//! | `read_filter` | [`FilteredResultSet`] of series frames  |
//! | `read_group`  | [`GroupResultSet`] of groups of frames  |
//! | `tag_keys`    | [`TagStream`] of key names              |
//! | `tag_values`  | [`TagStream`] of tag values             |

pub mod group;
pub mod request;
pub mod result_set;
pub mod series_cursor;
pub mod store;

pub use group::{CursorFactory, GroupCursor, GroupOptions, GroupResultSet};
pub use request::{
    Aggregate, Group, ReadFilterRequest, ReadGroupRequest, ReadRequest, TagKeysRequest,
    TagValuesRequest,
};
pub use result_set::{is_cancellation, FilteredResultSet, SeriesFrame};
pub use series_cursor::{IndexSeriesCursor, SeriesRow, ValueReader};
pub use store::{Store, TagStream};
