//! Shared fixtures for integration tests
#![allow(dead_code)]

use serde_json::{Value as JsonValue, json};
use url_metrics::{UrlMetric, current_timestamp};

/// MD5 of the empty string; any 32-hex string is a valid ETag.
pub const ETAG: &str = "d41d8cd98f00b204e9800998ecf8427e";
pub const OTHER_ETAG: &str = "0123456789abcdef0123456789abcdef";
pub const SLUG: &str = "c4ca4238a0b923820dcc509a6f75849b";

pub const IMG_1: &str = "/HTML/BODY/DIV/*[1][self::IMG]";
pub const IMG_2: &str = "/HTML/BODY/DIV/*[2][self::IMG]";
pub const IMG_3: &str = "/HTML/BODY/DIV/*[3][self::IMG]";
pub const H1_1: &str = "/HTML/BODY/DIV/*[1][self::H1]";

pub fn sample_dom_rect() -> JsonValue {
    json!({
        "width": 500.1,
        "height": 500.2,
        "x": 100.3,
        "y": 100.4,
        "top": 0.1,
        "right": 0.2,
        "bottom": 0.3,
        "left": 0.4
    })
}

/// Shallow-merge the keys of `overrides` into `base`.
pub fn merge(mut base: JsonValue, overrides: JsonValue) -> JsonValue {
    if let (Some(base), JsonValue::Object(overrides)) = (base.as_object_mut(), overrides) {
        for (key, value) in overrides {
            base.insert(key, value);
        }
    }
    base
}

/// Fully visible element with both rects.
pub fn element(xpath: &str, is_lcp: bool) -> JsonValue {
    json!({
        "xpath": xpath,
        "isLCP": is_lcp,
        "isLCPCandidate": is_lcp,
        "intersectionRatio": 1.0,
        "intersectionRect": sample_dom_rect(),
        "boundingClientRect": sample_dom_rect()
    })
}

pub struct UrlMetricBuilder {
    width: u32,
    height: Option<u32>,
    etag: String,
    timestamp: Option<f64>,
    elements: Option<Vec<JsonValue>>,
}

/// URL Metric captured now, with one non-LCP image, at `width`.
pub fn url_metric(width: u32) -> UrlMetricBuilder {
    UrlMetricBuilder {
        width,
        height: None,
        etag: ETAG.to_string(),
        timestamp: None,
        elements: None,
    }
}

impl UrlMetricBuilder {
    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn etag(mut self, etag: &str) -> Self {
        self.etag = etag.to_string();
        self
    }

    pub fn timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn element(mut self, element: JsonValue) -> Self {
        self.elements.get_or_insert_with(Vec::new).push(element);
        self
    }

    pub fn lcp(self, xpath: &str) -> Self {
        self.element(element(xpath, true))
    }

    pub fn no_elements(mut self) -> Self {
        self.elements = Some(Vec::new());
        self
    }

    pub fn to_value(&self) -> JsonValue {
        let elements = self
            .elements
            .clone()
            .unwrap_or_else(|| vec![element(IMG_1, false)]);
        json!({
            "url": "https://example.com/",
            "viewport": {
                "width": self.width,
                "height": self.height.unwrap_or(self.width.div_ceil(2))
            },
            "timestamp": self.timestamp.unwrap_or_else(current_timestamp),
            "etag": self.etag,
            "elements": elements
        })
    }

    pub fn build(self) -> UrlMetric {
        UrlMetric::from_value(self.to_value()).expect("fixture URL Metric is valid")
    }
}
