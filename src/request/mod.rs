//! Handling of URL Metric write requests
//!
//! # Flow
//!
//! 1. Check the slug and current ETag parameters.
//! 2. Require a JSON object body.
//! 3. Refuse the write when the group for the body's viewport width is
//!    already complete under the current ETag.
//! 4. Inject the server-side `timestamp`, `uuid` and `etag`, then validate
//!    the result strictly.
//! 5. Run every [`StorageValidityRule`] in order.
//! 6. Persist through the [`UrlMetricStore`], which repeats the completeness
//!    check under its write lock.
//! 7. Notify every [`UrlMetricStoredListener`] in order.
//!
//! Grouping settings always come from the store, so the completeness check
//! and the eviction on write agree.

use crate::config::DetectiveConfig;
use crate::core::{MetricsError, current_timestamp, is_valid_etag};
use crate::group::{UrlMetricGroup, UrlMetricGroupCollection};
use crate::metric::UrlMetric;
use crate::schema::{UrlMetricSchema, ValidationMode};
use crate::storage::{StoredUrlMetrics, UrlMetricStore, is_valid_slug};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{Level, event, info_span};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid parameter '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("The request body is not a JSON object")]
    InvalidBody,

    #[error("The URL Metric group for viewport widths {minimum_viewport_width}..={maximum_viewport_width} is already complete")]
    GroupComplete {
        minimum_viewport_width: i64,
        maximum_viewport_width: i64,
    },

    #[error("Failed to validate URL Metric: {0}")]
    InvalidUrlMetric(MetricsError),

    #[error("Validity of URL Metric was rejected: {0}")]
    Rejected(String),

    #[error("Failed to store URL Metric: {0}")]
    Storage(MetricsError),
}

impl StoreError {
    /// HTTP status equivalent.
    pub fn status(&self) -> u16 {
        match self {
            Self::GroupComplete { .. } => 403,
            Self::Storage(_) => 500,
            Self::InvalidParameter { .. }
            | Self::InvalidBody
            | Self::InvalidUrlMetric(_)
            | Self::Rejected(_) => 400,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "rest_invalid_param",
            Self::InvalidBody => "missing_object_json_body",
            Self::GroupComplete { .. } => "url_metric_group_complete",
            Self::InvalidUrlMetric(_) => "invalid_url_metric",
            Self::Rejected(_) => "url_metric_rejected",
            Self::Storage(_) => "url_metric_storage_failure",
        }
    }

    fn invalid_parameter(param: &str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.to_string(),
            message: message.into(),
        }
    }

    fn from_storage(err: MetricsError) -> Self {
        match err {
            MetricsError::GroupComplete {
                minimum_viewport_width,
                maximum_viewport_width,
            } => Self::GroupComplete {
                minimum_viewport_width,
                maximum_viewport_width,
            },
            err => Self::Storage(err),
        }
    }
}

// ============================================================================
// Storage validity rules
// ============================================================================

/// Last check before a validated URL Metric is stored
pub trait StorageValidityRule: Send + Sync {
    fn validate(&self, url_metric: &UrlMetric) -> std::result::Result<(), String>;
}

impl<F> StorageValidityRule for F
where
    F: Fn(&UrlMetric) -> std::result::Result<(), String> + Send + Sync,
{
    fn validate(&self, url_metric: &UrlMetric) -> std::result::Result<(), String> {
        self(url_metric)
    }
}

/// Rejects viewports with an implausible width-to-height ratio, such as
/// those reported by headless crawlers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportAspectRatioRule {
    pub minimum: f64,
    pub maximum: f64,
}

impl Default for ViewportAspectRatioRule {
    fn default() -> Self {
        Self {
            minimum: 0.4,
            maximum: 2.5,
        }
    }
}

impl StorageValidityRule for ViewportAspectRatioRule {
    fn validate(&self, url_metric: &UrlMetric) -> std::result::Result<(), String> {
        let viewport = url_metric.viewport();
        let ratio = f64::from(viewport.width) / f64::from(viewport.height);
        if ratio.is_finite() && ratio >= self.minimum && ratio <= self.maximum {
            Ok(())
        } else {
            Err(format!(
                "Viewport aspect ratio ({}x{}) is not within {}..={}",
                viewport.width, viewport.height, self.minimum, self.maximum
            ))
        }
    }
}

// ============================================================================
// Stored listeners
// ============================================================================

/// What a listener learns about a successful write
#[derive(Debug)]
pub struct UrlMetricStoredContext<'a> {
    pub slug: &'a str,
    pub url_metric: &'a UrlMetric,
    pub stored: &'a StoredUrlMetrics,
    /// Collection the write was checked against, with the new URL Metric added
    pub collection: &'a UrlMetricGroupCollection,
    /// Group that received the URL Metric
    pub group: &'a UrlMetricGroup,
}

/// Called after a URL Metric was stored, e.g. to invalidate page caches
pub trait UrlMetricStoredListener: Send + Sync {
    fn url_metric_stored(&self, context: &UrlMetricStoredContext<'_>);
}

impl<F> UrlMetricStoredListener for F
where
    F: Fn(&UrlMetricStoredContext<'_>) + Send + Sync,
{
    fn url_metric_stored(&self, context: &UrlMetricStoredContext<'_>) {
        self(context)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// One write request as received from a client
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub slug: String,
    pub current_etag: String,
    pub body: JsonValue,
}

impl StoreRequest {
    pub fn new(slug: impl Into<String>, current_etag: impl Into<String>, body: JsonValue) -> Self {
        Self {
            slug: slug.into(),
            current_etag: current_etag.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreResponse {
    pub success: bool,
    pub uuid: String,
    pub stored: StoredUrlMetrics,
}

/// Validates write requests and persists the accepted URL Metrics
pub struct StoreRequestHandler<S: UrlMetricStore> {
    store: S,
    schema: UrlMetricSchema,
    rules: Vec<Box<dyn StorageValidityRule>>,
    listeners: Vec<Box<dyn UrlMetricStoredListener>>,
}

impl<S: UrlMetricStore> StoreRequestHandler<S> {
    /// Handler with the default [`ViewportAspectRatioRule`].
    pub fn new(store: S) -> Self {
        Self::with_rules(store, vec![Box::new(ViewportAspectRatioRule::default())])
    }

    pub fn with_rules(store: S, rules: Vec<Box<dyn StorageValidityRule>>) -> Self {
        Self {
            store,
            schema: UrlMetricSchema::default(),
            rules,
            listeners: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: UrlMetricSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn add_rule(&mut self, rule: impl StorageValidityRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn add_listener(&mut self, listener: impl UrlMetricStoredListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Grouping settings of the underlying store.
    pub fn config(&self) -> &DetectiveConfig {
        self.store.config()
    }

    pub fn handle(&self, request: StoreRequest) -> std::result::Result<StoreResponse, StoreError> {
        let span = info_span!("store_url_metric", slug = %request.slug);
        let _enter = span.enter();

        let result = self.process(request);
        match &result {
            Ok(response) => event!(
                Level::INFO,
                uuid = %response.uuid,
                count = response.stored.url_metric_count,
                "URL Metric stored"
            ),
            Err(err @ StoreError::Storage(_)) => {
                event!(Level::ERROR, error = %err, "URL Metric storage failed")
            }
            Err(err) => event!(
                Level::WARN,
                error = %err,
                code = err.code(),
                "URL Metric rejected"
            ),
        }
        result
    }

    fn process(&self, request: StoreRequest) -> std::result::Result<StoreResponse, StoreError> {
        let StoreRequest {
            slug,
            current_etag,
            body,
        } = request;

        if !is_valid_slug(&slug) {
            return Err(StoreError::invalid_parameter(
                "slug",
                "must be 32 lowercase hex characters",
            ));
        }
        if !is_valid_etag(&current_etag) {
            return Err(StoreError::invalid_parameter(
                "current_etag",
                "must be 32 lowercase hex characters",
            ));
        }
        let JsonValue::Object(mut data) = body else {
            return Err(StoreError::InvalidBody);
        };

        let viewport_width = data
            .get("viewport")
            .and_then(|viewport| viewport.get("width"))
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| {
                StoreError::InvalidUrlMetric(MetricsError::validation(
                    "viewport.width",
                    "expected integer",
                ))
            })?;

        let stored = self
            .store
            .get_url_metrics(&slug)
            .map_err(StoreError::Storage)?;
        let mut collection = self
            .config()
            .build_collection(stored, &current_etag)
            .map_err(StoreError::Storage)?;
        let group = collection
            .get_group_for_viewport_width(viewport_width)
            .map_err(|e| StoreError::invalid_parameter("viewport", e.to_string()))?;
        if group.is_complete() {
            return Err(StoreError::GroupComplete {
                minimum_viewport_width: group.minimum_viewport_width(),
                maximum_viewport_width: group.maximum_viewport_width(),
            });
        }

        let uuid = uuid::Uuid::new_v4().to_string();
        data.insert("timestamp".to_string(), JsonValue::from(current_timestamp()));
        data.insert("uuid".to_string(), JsonValue::String(uuid.clone()));
        data.insert("etag".to_string(), JsonValue::String(current_etag));

        let url_metric = UrlMetric::from_value_with_schema(
            JsonValue::Object(data),
            &self.schema,
            ValidationMode::Strict,
        )
        .map_err(StoreError::InvalidUrlMetric)?;

        for rule in &self.rules {
            rule.validate(&url_metric).map_err(StoreError::Rejected)?;
        }
        event!(Level::DEBUG, "URL Metric passed validity rules");

        let stored = self
            .store
            .store_url_metric_if_incomplete(&slug, url_metric.clone())
            .map_err(StoreError::from_storage)?;

        if !self.listeners.is_empty() {
            collection.add_url_metric(url_metric.clone());
            let group = collection
                .get_group_for_viewport_width(viewport_width)
                .map_err(StoreError::Storage)?;
            let context = UrlMetricStoredContext {
                slug: &slug,
                url_metric: &url_metric,
                stored: &stored,
                collection: &collection,
                group,
            };
            for listener in &self.listeners {
                listener.url_metric_stored(&context);
            }
            event!(
                Level::DEBUG,
                listeners = self.listeners.len(),
                "Notified URL Metric stored listeners"
            );
        }

        Ok(StoreResponse {
            success: true,
            uuid,
            stored,
        })
    }
}
