//! Storage engine capabilities consumed by the read service

pub mod stubs;
pub mod traits;

pub use traits::{
    Bucket, BucketDeleter, BucketFinder, CursorIterator, CursorRequest, SeriesCursor,
    SeriesCursorRequest, SeriesCursorRow, StringStream, ValueBatch, ValueCursor, Viewer,
};
