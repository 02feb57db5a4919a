use super::{
    MergeMode, StoredUrlMetrics, UrlMetricStore, check_slug, decode_url_metrics, merge_url_metric,
};
use crate::config::DetectiveConfig;
use crate::core::Result;
use crate::metric::UrlMetric;
use crate::schema::UrlMetricSchema;
use log::debug;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;

/// Store keeping raw payloads per slug in memory.
///
/// Payloads are kept as JSON, as a persistent store would keep them, so
/// reads go through the same lenient validation.
#[derive(Debug)]
pub struct InMemoryUrlMetricStore {
    config: DetectiveConfig,
    schema: UrlMetricSchema,
    slugs: Mutex<HashMap<String, Vec<JsonValue>>>,
}

impl InMemoryUrlMetricStore {
    pub fn new(config: DetectiveConfig) -> Self {
        Self::with_schema(config, UrlMetricSchema::default())
    }

    pub fn with_schema(config: DetectiveConfig, schema: UrlMetricSchema) -> Self {
        Self {
            config,
            schema,
            slugs: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the raw payloads stored for `slug`, bypassing validation.
    pub fn insert_raw(&self, slug: &str, values: Vec<JsonValue>) -> Result<()> {
        check_slug(slug)?;
        self.slugs.lock()?.insert(slug.to_string(), values);
        Ok(())
    }

    pub fn remove(&self, slug: &str) -> Result<bool> {
        Ok(self.slugs.lock()?.remove(slug).is_some())
    }
}

impl UrlMetricStore for InMemoryUrlMetricStore {
    fn config(&self) -> &DetectiveConfig {
        &self.config
    }

    fn get_url_metrics(&self, slug: &str) -> Result<Vec<UrlMetric>> {
        check_slug(slug)?;
        let slugs = self.slugs.lock()?;
        Ok(slugs
            .get(slug)
            .map(|values| decode_url_metrics(slug, values, &self.schema))
            .unwrap_or_default())
    }

    fn store_url_metric(&self, slug: &str, url_metric: UrlMetric) -> Result<StoredUrlMetrics> {
        self.write(slug, url_metric, MergeMode::Always)
    }

    fn store_url_metric_if_incomplete(
        &self,
        slug: &str,
        url_metric: UrlMetric,
    ) -> Result<StoredUrlMetrics> {
        self.write(slug, url_metric, MergeMode::IfIncomplete)
    }
}

impl InMemoryUrlMetricStore {
    fn write(
        &self,
        slug: &str,
        url_metric: UrlMetric,
        mode: MergeMode,
    ) -> Result<StoredUrlMetrics> {
        check_slug(slug)?;
        let mut slugs = self.slugs.lock()?;

        let existing = slugs
            .get(slug)
            .map(|values| decode_url_metrics(slug, values, &self.schema))
            .unwrap_or_default();
        let (values, stored) = merge_url_metric(slug, &self.config, existing, url_metric, mode)?;
        slugs.insert(slug.to_string(), values);

        debug!(
            "Stored URL Metric for slug {} ({} total)",
            slug, stored.url_metric_count
        );
        Ok(stored)
    }
}
