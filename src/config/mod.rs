//! Grouping configuration

use crate::core::{MAX_VIEWPORT_WIDTH, MetricsError, Result};
use crate::group::UrlMetricGroupCollection;
use crate::metric::UrlMetric;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Breakpoints, sample size and freshness TTL used to build Group Collections
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use url_metrics::DetectiveConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DetectiveConfig::from_json_str(r#"{"sample_size": 5}"#)?;
/// assert_eq!(config.breakpoints, vec![480, 600, 782]);
/// assert_eq!(config.sample_size, 5);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectiveConfig {
    /// Maximum viewport width of every group but the last
    pub breakpoints: Vec<i64>,

    /// URL Metrics kept per group
    pub sample_size: i64,

    /// Seconds a URL Metric stays fresh
    pub freshness_ttl: i64,
}

impl DetectiveConfig {
    pub const DEFAULT_BREAKPOINTS: [i64; 3] = [480, 600, 782];
    pub const DEFAULT_SAMPLE_SIZE: i64 = 3;
    /// One day
    pub const DEFAULT_FRESHNESS_TTL: i64 = 86_400;

    pub fn new() -> Self {
        Self {
            breakpoints: Self::DEFAULT_BREAKPOINTS.to_vec(),
            sample_size: Self::DEFAULT_SAMPLE_SIZE,
            freshness_ttl: Self::DEFAULT_FRESHNESS_TTL,
        }
    }

    pub fn breakpoints(mut self, breakpoints: &[i64]) -> Self {
        self.breakpoints = breakpoints.to_vec();
        self
    }

    pub fn sample_size(mut self, sample_size: i64) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn freshness_ttl(mut self, freshness_ttl: i64) -> Self {
        self.freshness_ttl = freshness_ttl;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the values a Group Collection would reject.
    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self
            .breakpoints
            .iter()
            .find(|&&breakpoint| breakpoint <= 0 || breakpoint >= MAX_VIEWPORT_WIDTH)
        {
            return Err(MetricsError::InvalidArgument(format!(
                "Each breakpoint must be greater than zero and less than {}, got {}",
                MAX_VIEWPORT_WIDTH, bad
            )));
        }
        if self.sample_size <= 0 {
            return Err(MetricsError::InvalidArgument(format!(
                "Sample size must be greater than zero, got {}",
                self.sample_size
            )));
        }
        if self.freshness_ttl < 0 {
            return Err(MetricsError::InvalidArgument(format!(
                "Freshness TTL must be at least zero, got {}",
                self.freshness_ttl
            )));
        }
        Ok(())
    }

    pub fn build_collection(
        &self,
        url_metrics: Vec<UrlMetric>,
        current_etag: &str,
    ) -> Result<UrlMetricGroupCollection> {
        UrlMetricGroupCollection::new(
            url_metrics,
            current_etag,
            &self.breakpoints,
            self.sample_size,
            self.freshness_ttl,
        )
    }
}

impl Default for DetectiveConfig {
    fn default() -> Self {
        Self::new()
    }
}
