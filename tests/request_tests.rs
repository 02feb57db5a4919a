/// Integration tests for the URL Metric write path
///
/// Run with: cargo test --test request_tests

mod common;

use common::{ETAG, IMG_1, OTHER_ETAG, SLUG, element, merge, url_metric};
use serde_json::{Value as JsonValue, json};
use std::sync::{Arc, Mutex};
use url_metrics::{
    DetectiveConfig, InMemoryUrlMetricStore, MetricsError, PropertyType, StorageValidityRule,
    StoreError, StoreRequest, StoreRequestHandler, StoredUrlMetrics, UrlMetric, UrlMetricSchema,
    UrlMetricStore, UrlMetricStoredContext, ViewportAspectRatioRule, current_timestamp,
};

fn config() -> DetectiveConfig {
    DetectiveConfig::new()
        .breakpoints(&[480])
        .sample_size(2)
        .freshness_ttl(3600)
}

fn handler() -> StoreRequestHandler<InMemoryUrlMetricStore> {
    StoreRequestHandler::new(InMemoryUrlMetricStore::new(config()))
}

/// Client payload: everything except the server-injected keys.
fn body(width: u32) -> JsonValue {
    let mut value = url_metric(width).lcp(IMG_1).to_value();
    let object = value.as_object_mut().unwrap();
    object.remove("timestamp");
    object.remove("etag");
    value
}

fn request(body: JsonValue) -> StoreRequest {
    StoreRequest::new(SLUG, ETAG, body)
}

struct FailingStore(DetectiveConfig);

impl UrlMetricStore for FailingStore {
    fn config(&self) -> &DetectiveConfig {
        &self.0
    }

    fn get_url_metrics(&self, _slug: &str) -> url_metrics::Result<Vec<UrlMetric>> {
        Ok(Vec::new())
    }

    fn store_url_metric(
        &self,
        _slug: &str,
        _url_metric: UrlMetric,
    ) -> url_metrics::Result<StoredUrlMetrics> {
        Err(MetricsError::Storage("disk full".to_string()))
    }

    fn store_url_metric_if_incomplete(
        &self,
        slug: &str,
        url_metric: UrlMetric,
    ) -> url_metrics::Result<StoredUrlMetrics> {
        self.store_url_metric(slug, url_metric)
    }
}

/// Reads nothing back, as if another request had not finished writing yet.
struct LaggingReadStore(InMemoryUrlMetricStore);

impl UrlMetricStore for LaggingReadStore {
    fn config(&self) -> &DetectiveConfig {
        self.0.config()
    }

    fn get_url_metrics(&self, _slug: &str) -> url_metrics::Result<Vec<UrlMetric>> {
        Ok(Vec::new())
    }

    fn store_url_metric(
        &self,
        slug: &str,
        url_metric: UrlMetric,
    ) -> url_metrics::Result<StoredUrlMetrics> {
        self.0.store_url_metric(slug, url_metric)
    }

    fn store_url_metric_if_incomplete(
        &self,
        slug: &str,
        url_metric: UrlMetric,
    ) -> url_metrics::Result<StoredUrlMetrics> {
        self.0.store_url_metric_if_incomplete(slug, url_metric)
    }
}

// ============================================================================
// Accepted writes
// ============================================================================

#[test]
fn test_store_injects_server_fields() {
    let handler = handler();
    let before = current_timestamp();
    let response = handler.handle(request(body(400))).unwrap();

    assert!(response.success);
    assert!(uuid::Uuid::parse_str(&response.uuid).is_ok());
    assert_eq!(response.stored.slug, SLUG);
    assert_eq!(response.stored.url_metric_count, 1);
    assert_eq!(response.stored.minimum_viewport_width, 0);
    assert_eq!(response.stored.maximum_viewport_width, 480);
    assert!(!response.stored.group_complete);

    let stored = handler.store().get_url_metrics(SLUG).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].uuid(), Some(response.uuid.as_str()));
    assert_eq!(stored[0].etag(), ETAG);
    assert!(stored[0].timestamp() >= before);
    assert!(stored[0].timestamp() <= current_timestamp());
}

#[test]
fn test_client_supplied_server_fields_are_overwritten() {
    let handler = handler();
    let payload = merge(
        body(400),
        json!({
            "timestamp": 1.0,
            "etag": OTHER_ETAG,
            "uuid": "00000000-0000-0000-0000-000000000000"
        }),
    );
    let response = handler.handle(request(payload)).unwrap();

    let stored = &handler.store().get_url_metrics(SLUG).unwrap()[0];
    assert_eq!(stored.etag(), ETAG);
    assert_eq!(stored.uuid(), Some(response.uuid.as_str()));
    assert!(stored.timestamp() > 1.0);
}

#[test]
fn test_response_serialization() {
    let response = handler().handle(request(body(800))).unwrap();
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["success"], json!(true));
    assert_eq!(value["uuid"], json!(response.uuid));
    assert_eq!(value["stored"]["minimum_viewport_width"], json!(481));
    assert_eq!(value["stored"]["url_metric_count"], json!(1));
}

// ============================================================================
// Refused writes
// ============================================================================

#[test]
fn test_complete_group_refuses_writes() {
    let handler = handler();
    handler.handle(request(body(400))).unwrap();
    let response = handler.handle(request(body(300))).unwrap();
    assert!(response.stored.group_complete);

    let err = handler.handle(request(body(450))).unwrap_err();
    assert_eq!(err.status(), 403);
    assert_eq!(err.code(), "url_metric_group_complete");
    assert!(matches!(
        err,
        StoreError::GroupComplete {
            minimum_viewport_width: 0,
            maximum_viewport_width: 480
        }
    ));

    // Other groups still accept writes.
    handler.handle(request(body(800))).unwrap();

    // A new ETag makes the stored URL Metrics stale.
    let response = handler
        .handle(StoreRequest::new(SLUG, OTHER_ETAG, body(450)))
        .unwrap();
    assert_eq!(response.stored.url_metric_count, 3);
    assert_eq!(handler.store().get_url_metrics(SLUG).unwrap().len(), 3);
}

#[test]
fn test_completeness_follows_store_config() {
    let store = InMemoryUrlMetricStore::new(config().sample_size(1));
    let handler = StoreRequestHandler::new(store);
    assert_eq!(handler.config().sample_size, 1);

    let response = handler.handle(request(body(400))).unwrap();
    assert!(response.stored.group_complete);

    let mut refused = 0;
    for _ in 0..9 {
        match handler.handle(request(body(400))) {
            Err(StoreError::GroupComplete { .. }) => refused += 1,
            other => panic!("unexpected result: {:?}", other),
        }
    }
    assert_eq!(refused, 9);

    let stored = handler.store().get_url_metrics(SLUG).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].uuid(), Some(response.uuid.as_str()));
}

#[test]
fn test_completeness_is_rechecked_when_writing() {
    let handler =
        StoreRequestHandler::new(LaggingReadStore(InMemoryUrlMetricStore::new(config())));
    let first = handler.handle(request(body(400))).unwrap();
    handler.handle(request(body(300))).unwrap();

    // The read sees an empty group, so only the write-time check refuses.
    let err = handler.handle(request(body(450))).unwrap_err();
    assert_eq!(err.status(), 403);
    assert!(matches!(
        err,
        StoreError::GroupComplete {
            minimum_viewport_width: 0,
            maximum_viewport_width: 480
        }
    ));

    let stored = handler.store().0.get_url_metrics(SLUG).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].uuid(), Some(first.uuid.as_str()));
}

#[test]
fn test_invalid_parameters() {
    let handler = handler();

    let err = handler
        .handle(StoreRequest::new("not-a-slug", ETAG, body(400)))
        .unwrap_err();
    assert_eq!(err.status(), 400);
    assert_eq!(err.code(), "rest_invalid_param");
    assert!(matches!(err, StoreError::InvalidParameter { ref param, .. } if param == "slug"));

    let err = handler
        .handle(StoreRequest::new(SLUG, "ABCDEF", body(400)))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidParameter { ref param, .. } if param == "current_etag"));

    let err = handler
        .handle(request(merge(body(400), json!({"viewport": {"width": -5, "height": 10}}))))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidParameter { ref param, .. } if param == "viewport"));
}

#[test]
fn test_body_must_be_an_object() {
    let handler = handler();
    for body in [json!(null), json!([1, 2]), json!("url-metric"), json!(42)] {
        let err = handler.handle(request(body)).unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.code(), "missing_object_json_body");
    }
}

#[test]
fn test_invalid_url_metrics() {
    let handler = handler();

    let mut missing_width = body(400);
    missing_width["viewport"].as_object_mut().unwrap().remove("width");

    let cases = vec![
        (missing_width, "viewport.width"),
        (merge(body(400), json!({"url": ""})), "url"),
        (merge(body(400), json!({"unknownKey": true})), "unknownKey"),
        (
            merge(
                body(400),
                json!({"elements": [merge(element(IMG_1, true), json!({"intersectionRatio": 2.0}))]}),
            ),
            "elements[0].intersectionRatio",
        ),
    ];

    for (payload, field) in cases {
        let err = handler.handle(request(payload)).unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.code(), "invalid_url_metric");
        match err {
            StoreError::InvalidUrlMetric(source) => assert_eq!(source.field(), Some(field)),
            other => panic!("unexpected error: {:?}", other),
        }
    }
    assert!(handler.store().get_url_metrics(SLUG).unwrap().is_empty());
}

#[test]
fn test_registered_extensions_are_accepted() {
    let schema = UrlMetricSchema::new()
        .with_root_property("colorScheme", PropertyType::String)
        .unwrap();
    let handler =
        StoreRequestHandler::new(InMemoryUrlMetricStore::with_schema(config(), schema.clone()))
            .with_schema(schema);

    handler
        .handle(request(merge(body(400), json!({"colorScheme": "dark"}))))
        .unwrap();
    let stored = handler.store().get_url_metrics(SLUG).unwrap();
    assert_eq!(stored[0]["colorScheme"], json!("dark"));
}

// ============================================================================
// Validity rules
// ============================================================================

#[test]
fn test_default_aspect_ratio_rule() {
    let handler = handler();
    let payload = merge(body(400), json!({"viewport": {"width": 400, "height": 100}}));
    let err = handler.handle(request(payload)).unwrap_err();
    assert_eq!(err.status(), 400);
    assert_eq!(err.code(), "url_metric_rejected");
    assert!(handler.store().get_url_metrics(SLUG).unwrap().is_empty());

    let rule = ViewportAspectRatioRule::default();
    let portrait = url_metric(400).height(900).build();
    assert!(rule.validate(&portrait).is_ok());
    let too_tall = url_metric(400).height(1001).build();
    assert!(rule.validate(&too_tall).is_err());
    let zero_height = url_metric(400).height(0).build();
    assert!(rule.validate(&zero_height).is_err());
}

#[test]
fn test_custom_rules_run_in_order() {
    let mut handler =
        StoreRequestHandler::with_rules(InMemoryUrlMetricStore::new(config()), Vec::new());
    handler.add_rule(|url_metric: &UrlMetric| -> Result<(), String> {
        if !url_metric.element_data().is_empty() {
            Ok(())
        } else {
            Err("no elements".to_string())
        }
    });
    handler.add_rule(|_: &UrlMetric| -> Result<(), String> { Err("second".to_string()) });

    let empty = merge(body(400), json!({"elements": []}));
    match handler.handle(request(empty)).unwrap_err() {
        StoreError::Rejected(message) => assert_eq!(message, "no elements"),
        other => panic!("unexpected error: {:?}", other),
    }

    match handler.handle(request(body(400))).unwrap_err() {
        StoreError::Rejected(message) => assert_eq!(message, "second"),
        other => panic!("unexpected error: {:?}", other),
    }

    // Without rules, even extreme aspect ratios are stored.
    let handler =
        StoreRequestHandler::with_rules(InMemoryUrlMetricStore::new(config()), Vec::new());
    let payload = merge(body(400), json!({"viewport": {"width": 400, "height": 10}}));
    assert!(handler.handle(request(payload)).is_ok());
}

// ============================================================================
// Stored listeners
// ============================================================================

#[test]
fn test_stored_listeners_run_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut handler = handler();

    let first = Arc::clone(&log);
    handler.add_listener(move |context: &UrlMetricStoredContext<'_>| {
        first.lock().unwrap().push(format!(
            "first {} {} {}",
            context.slug,
            context.url_metric.uuid().unwrap_or_default(),
            context.stored.url_metric_count
        ));
    });
    let second = Arc::clone(&log);
    handler.add_listener(move |context: &UrlMetricStoredContext<'_>| {
        assert_eq!(context.collection.get_flattened_url_metrics().len(), 1);
        assert_eq!(context.collection.current_etag(), ETAG);
        assert_eq!(context.group.maximum_viewport_width(), 480);
        assert_eq!(context.group.len(), 1);
        second.lock().unwrap().push("second".to_string());
    });

    let response = handler.handle(request(body(400))).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec![format!("first {} {} 1", SLUG, response.uuid), "second".to_string()]
    );
}

#[test]
fn test_stored_listeners_skip_refused_writes() {
    let calls = Arc::new(Mutex::new(0));
    let mut handler = handler();
    let counter = Arc::clone(&calls);
    handler.add_listener(move |_: &UrlMetricStoredContext<'_>| {
        *counter.lock().unwrap() += 1;
    });

    handler.handle(request(body(400))).unwrap();
    handler.handle(request(body(300))).unwrap();
    assert_eq!(*calls.lock().unwrap(), 2);

    // Complete group, rejected aspect ratio and invalid body.
    assert!(handler.handle(request(body(450))).is_err());
    let wide = merge(body(800), json!({"viewport": {"width": 800, "height": 10}}));
    assert!(handler.handle(request(wide)).is_err());
    assert!(handler.handle(request(json!([]))).is_err());
    assert_eq!(*calls.lock().unwrap(), 2);

    let mut failing = StoreRequestHandler::new(FailingStore(config()));
    let counter = Arc::clone(&calls);
    failing.add_listener(move |_: &UrlMetricStoredContext<'_>| {
        *counter.lock().unwrap() += 1;
    });
    assert!(failing.handle(request(body(400))).is_err());
    assert_eq!(*calls.lock().unwrap(), 2);
}

// ============================================================================
// Storage failures
// ============================================================================

#[test]
fn test_storage_failure_is_a_server_error() {
    let handler = StoreRequestHandler::new(FailingStore(config()));
    let err = handler.handle(request(body(400))).unwrap_err();
    assert_eq!(err.status(), 500);
    assert_eq!(err.code(), "url_metric_storage_failure");
    assert!(err.to_string().contains("disk full"));
}
