//! Breakpoint grouping of URL Metrics
//!
//! # Architecture
//!
//! - [`UrlMetricGroup`]: URL Metrics for one viewport range, with sample-size
//!   eviction, completeness and the majority LCP element.
//! - [`UrlMetricGroupCollection`]: every group for one page plus the
//!   aggregate queries built on top of them.
//!
//! Aggregates are memoized per owner and invalidated by bumping a generation
//! counter on every mutation.

mod cache;
pub mod collection;
#[allow(clippy::module_inception)]
pub mod group;

pub use collection::UrlMetricGroupCollection;
pub use group::UrlMetricGroup;
