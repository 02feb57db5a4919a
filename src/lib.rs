// ============================================================================
// URL Metrics Library
// ============================================================================

//! Aggregation of client-side page-load observations ("URL Metrics").
//!
//! URL Metrics are grouped by viewport-width breakpoints, capped per group
//! and checked for freshness, and then queried for aggregate facts such as
//! the LCP element shared by every viewport or the largest intersection
//! ratio seen for each element.
//!
//! # Examples
//!
//! ```
//! use url_metrics::{DetectiveConfig, UrlMetric};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let etag = "d41d8cd98f00b204e9800998ecf8427e";
//! let mut collection = DetectiveConfig::default().build_collection(vec![], etag)?;
//!
//! for width in [400, 1000] {
//!     collection.add_url_metric(UrlMetric::from_value(json!({
//!         "url": "https://example.com/",
//!         "viewport": {"width": width, "height": 800},
//!         "timestamp": url_metrics::current_timestamp(),
//!         "etag": etag,
//!         "elements": [
//!             {"xpath": "/HTML/BODY/DIV/*[1][self::IMG]", "isLCP": true, "isLCPCandidate": true, "intersectionRatio": 1.0}
//!         ]
//!     }))?);
//! }
//!
//! let lcp = collection.get_common_lcp_element().expect("shared LCP element");
//! assert_eq!(lcp.xpath(), "/HTML/BODY/DIV/*[1][self::IMG]");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod etag;
pub mod group;
pub mod metric;
pub mod request;
pub mod schema;
pub mod storage;
pub mod visitor;

// Re-export main types for convenience
pub use crate::core::{
    DomRect, MAX_VIEWPORT_WIDTH, MetricsError, Result, Timestamp, Viewport, current_timestamp,
    is_valid_etag,
};
pub use config::DetectiveConfig;
pub use etag::{ActiveTheme, EtagData, ThemeInfo, compute_current_etag};
pub use group::{UrlMetricGroup, UrlMetricGroupCollection};
pub use metric::{Element, ElementData, UrlMetric, normalize_xpath};
pub use request::{
    StorageValidityRule, StoreError, StoreRequest, StoreRequestHandler, StoreResponse,
    UrlMetricStoredContext, UrlMetricStoredListener, ViewportAspectRatioRule,
};
pub use schema::{PropertyType, UrlMetricSchema, ValidationMode};
pub use storage::{
    FileUrlMetricStore, InMemoryUrlMetricStore, StoredUrlMetrics, UrlMetricStore,
    normalize_query_vars, url_metrics_slug,
};
pub use visitor::{
    DebugTagVisitor, LinkCollection, TagVisitor, TagVisitorContext, TagVisitorRegistry,
    generate_media_query,
};
