//! URL Metric storage
//!
//! # Architecture
//!
//! - [`UrlMetricStore`]: the storage collaborator. Each slug (one page
//!   variant) maps to a flat list of URL Metrics.
//! - [`InMemoryUrlMetricStore`]: mutex-guarded map, for tests and embedding.
//! - [`FileUrlMetricStore`]: one JSON file per slug, replaced atomically.
//! - [`slug`]: storage keys derived from query variables.
//!
//! Writes rebuild the Group Collection for the slug so that sample-size
//! eviction applies, then persist its flattened URL Metrics.

pub mod memory;
pub mod persistence;
pub mod slug;

pub use memory::InMemoryUrlMetricStore;
pub use persistence::FileUrlMetricStore;
pub use slug::{is_valid_slug, normalize_query_vars, url_metrics_slug};

use crate::config::DetectiveConfig;
use crate::core::{MetricsError, Result};
use crate::metric::UrlMetric;
use crate::schema::{UrlMetricSchema, ValidationMode};
use log::warn;
use serde::Serialize;
use serde_json::Value as JsonValue;

pub trait UrlMetricStore: Send + Sync {
    /// Grouping settings applied when merging writes.
    fn config(&self) -> &DetectiveConfig;

    /// URL Metrics stored for `slug`; empty when nothing was stored yet.
    fn get_url_metrics(&self, slug: &str) -> Result<Vec<UrlMetric>>;

    /// Add `url_metric` to the history of `slug`.
    fn store_url_metric(&self, slug: &str, url_metric: UrlMetric) -> Result<StoredUrlMetrics>;

    /// Like [`UrlMetricStore::store_url_metric`], but fails with
    /// [`MetricsError::GroupComplete`] when the receiving group is already
    /// complete under the new URL Metric's ETag. The check holds the same
    /// lock as the write.
    fn store_url_metric_if_incomplete(
        &self,
        slug: &str,
        url_metric: UrlMetric,
    ) -> Result<StoredUrlMetrics>;
}

/// Whether a merge may add to a group that is already complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeMode {
    Always,
    IfIncomplete,
}

/// Outcome of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredUrlMetrics {
    pub slug: String,
    /// URL Metrics now stored for the slug, across all groups
    pub url_metric_count: usize,
    pub minimum_viewport_width: i64,
    pub maximum_viewport_width: i64,
    /// Whether the receiving group is now complete
    pub group_complete: bool,
}

pub(crate) fn check_slug(slug: &str) -> Result<()> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(MetricsError::InvalidArgument(format!(
            "Slug must be 32 lowercase hex characters, got {:?}",
            slug
        )))
    }
}

/// Validate stored payloads leniently, skipping the ones that fail.
pub(crate) fn decode_url_metrics(
    slug: &str,
    values: &[JsonValue],
    schema: &UrlMetricSchema,
) -> Vec<UrlMetric> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, value)| {
            match UrlMetric::from_value_with_schema(value.clone(), schema, ValidationMode::Lenient) {
                Ok(url_metric) => Some(url_metric),
                Err(e) => {
                    warn!("Skipping stored URL Metric {} for slug {}: {}", i, slug, e);
                    None
                }
            }
        })
        .collect()
}

/// Merge `url_metric` into `stored` and return the payloads to persist.
///
/// The collection is built with the new URL Metric's ETag as current.
pub(crate) fn merge_url_metric(
    slug: &str,
    config: &DetectiveConfig,
    stored: Vec<UrlMetric>,
    url_metric: UrlMetric,
    mode: MergeMode,
) -> Result<(Vec<JsonValue>, StoredUrlMetrics)> {
    let current_etag = url_metric.etag().to_string();
    let viewport_width = i64::from(url_metric.viewport_width());

    let mut collection = config.build_collection(stored, &current_etag)?;
    if mode == MergeMode::IfIncomplete {
        let group = collection.get_group_for_viewport_width(viewport_width)?;
        if group.is_complete() {
            return Err(MetricsError::GroupComplete {
                minimum_viewport_width: group.minimum_viewport_width(),
                maximum_viewport_width: group.maximum_viewport_width(),
            });
        }
    }
    collection.add_url_metric(url_metric);

    let group = collection.get_group_for_viewport_width(viewport_width)?;
    let values: Vec<JsonValue> = collection
        .get_flattened_url_metrics()
        .into_iter()
        .map(UrlMetric::to_value)
        .collect();

    let stored = StoredUrlMetrics {
        slug: slug.to_string(),
        url_metric_count: values.len(),
        minimum_viewport_width: group.minimum_viewport_width(),
        maximum_viewport_width: group.maximum_viewport_width(),
        group_complete: group.is_complete(),
    };
    Ok((values, stored))
}
