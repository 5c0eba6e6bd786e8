//! Gorilla read service - read-request translation and dispatch for the
//! Gorilla time-series storage engine
//!
//! This library sits between a query protocol and the storage engine:
//! - Resolves opaque source handles into organization and bucket IDs
//! - Translates protocol-neutral predicates into engine expressions
//! - Dispatches filter, group, tag-key and tag-value reads as lazy results
//! - Coordinates bucket data deletion with the bucket's metadata record
//!
//! # Example
//!
//! ```rust
//! use gorilla_readservice::engine::stubs::InMemoryViewer;
//! use gorilla_readservice::reads::{ReadFilterRequest, Store};
//! use gorilla_readservice::types::Id;
//! use gorilla_readservice::RequestContext;
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let viewer = InMemoryViewer::new();
//! viewer.add_series(Id(1), Id(2), "cpu", "usage", &[("host", "a")], vec![(10, 0.5)]);
//!
//! let store = Store::new(Arc::new(viewer));
//! let req = ReadFilterRequest {
//!     read_source: Some(store.source(Id(1), Id(2))),
//!     ..Default::default()
//! };
//! let mut rs = store.read_filter(&RequestContext::new(), &req).await?.unwrap();
//! while let Some(frame) = rs.next().await? {
//!     assert_eq!(frame.measurement(), "cpu");
//! }
//! # Ok::<(), gorilla_readservice::Error>(())
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod engine;
pub mod error;
pub mod predicate;
pub mod source;
pub mod types;

/// Read request dispatch: validation, series cursors and lazy result sets
pub mod reads;

/// Bucket deletion coordination
pub mod bucket;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

// Re-export main types
pub use bucket::BucketService;
pub use context::RequestContext;
pub use error::{Error, ErrorKind, Result};
pub use reads::Store;
pub use types::{Id, TimeRange};
