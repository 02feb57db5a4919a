use super::UrlMetric;
use super::xpath::normalize_xpath;
use crate::core::{DomRect, Result};
use crate::group::UrlMetricGroup;
use crate::schema::validator::{
    self, JsonObject, PropertyScope, number_in_range, parse_dom_rect, require_bool,
    require_non_empty_string, require_object,
};
use crate::schema::{ELEMENT_CORE_FIELDS, UrlMetricSchema, ValidationMode};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::ops::Index;

static NULL: JsonValue = JsonValue::Null;

/// One validated element entry of a URL Metric.
///
/// The supplied payload is kept as-is (including the original xpath syntax)
/// for serialization; typed accessors read the validated copies.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    data: JsonObject,
    xpath: JsonValue,
    is_lcp: bool,
    is_lcp_candidate: bool,
    intersection_ratio: f64,
    intersection_rect: Option<DomRect>,
    bounding_client_rect: Option<DomRect>,
}

impl ElementData {
    pub(crate) fn from_value(
        value: &JsonValue,
        field: &str,
        schema: &UrlMetricSchema,
        mode: ValidationMode,
    ) -> Result<Self> {
        let object = require_object(value, field)?;
        let mut data = object.clone();

        let raw_xpath = require_non_empty_string(object, "xpath", &format!("{}.xpath", field))?;
        let is_lcp = require_bool(object, "isLCP", &format!("{}.isLCP", field))?;
        let is_lcp_candidate =
            require_bool(object, "isLCPCandidate", &format!("{}.isLCPCandidate", field))?;

        let intersection_ratio = match object.get("intersectionRatio") {
            Some(ratio) => number_in_range(
                ratio,
                &format!("{}.intersectionRatio", field),
                Some(0.0),
                Some(1.0),
            )?,
            None => {
                data.insert("intersectionRatio".to_string(), JsonValue::from(0.0));
                0.0
            }
        };

        let intersection_rect = object
            .get("intersectionRect")
            .map(|rect| parse_dom_rect(rect, &format!("{}.intersectionRect", field)))
            .transpose()?;
        let bounding_client_rect = object
            .get("boundingClientRect")
            .map(|rect| parse_dom_rect(rect, &format!("{}.boundingClientRect", field)))
            .transpose()?;

        validator::check_extension_keys(
            object,
            &ELEMENT_CORE_FIELDS,
            PropertyScope::Element,
            schema,
            mode,
            field,
        )?;

        Ok(Self {
            xpath: JsonValue::String(normalize_xpath(raw_xpath)),
            data,
            is_lcp,
            is_lcp_candidate,
            intersection_ratio,
            intersection_rect,
            bounding_client_rect,
        })
    }

    /// Element path in the normalized transitional syntax.
    pub fn xpath(&self) -> &str {
        self.xpath.as_str().unwrap_or_default()
    }

    /// Element path exactly as it was captured.
    pub fn raw_xpath(&self) -> &str {
        self.data
            .get("xpath")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    pub fn is_lcp(&self) -> bool {
        self.is_lcp
    }

    pub fn is_lcp_candidate(&self) -> bool {
        self.is_lcp_candidate
    }

    pub fn intersection_ratio(&self) -> f64 {
        self.intersection_ratio
    }

    pub fn intersection_rect(&self) -> Option<&DomRect> {
        self.intersection_rect.as_ref()
    }

    pub fn bounding_client_rect(&self) -> Option<&DomRect> {
        self.bounding_client_rect.as_ref()
    }

    /// Look up a core or extension property. `xpath` yields the normalized path.
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        if field == "xpath" {
            return Some(&self.xpath);
        }
        self.data.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn to_value(&self) -> JsonValue {
        JsonValue::Object(self.data.clone())
    }
}

impl Index<&str> for ElementData {
    type Output = JsonValue;

    fn index(&self, field: &str) -> &JsonValue {
        self.get(field).unwrap_or(&NULL)
    }
}

impl Serialize for ElementData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}

/// Read-only view of an element together with the records that own it.
///
/// The owning group is only known when the element was reached through a
/// [`UrlMetricGroup`] or its collection.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    data: &'a ElementData,
    url_metric: &'a UrlMetric,
    group: Option<&'a UrlMetricGroup>,
}

impl<'a> Element<'a> {
    pub(crate) fn new(
        data: &'a ElementData,
        url_metric: &'a UrlMetric,
        group: Option<&'a UrlMetricGroup>,
    ) -> Self {
        Self { data, url_metric, group }
    }

    pub fn data(&self) -> &'a ElementData {
        self.data
    }

    pub fn xpath(&self) -> &'a str {
        self.data.xpath()
    }

    pub fn is_lcp(&self) -> bool {
        self.data.is_lcp()
    }

    pub fn is_lcp_candidate(&self) -> bool {
        self.data.is_lcp_candidate()
    }

    pub fn intersection_ratio(&self) -> f64 {
        self.data.intersection_ratio()
    }

    pub fn intersection_rect(&self) -> Option<&'a DomRect> {
        self.data.intersection_rect()
    }

    pub fn bounding_client_rect(&self) -> Option<&'a DomRect> {
        self.data.bounding_client_rect()
    }

    pub fn get(&self, field: &str) -> Option<&'a JsonValue> {
        self.data.get(field)
    }

    pub fn url_metric(&self) -> &'a UrlMetric {
        self.url_metric
    }

    pub fn group(&self) -> Option<&'a UrlMetricGroup> {
        self.group
    }

    /// Whether this occurrence was visible, or positioned above the fold,
    /// when its URL Metric was captured.
    pub fn is_positioned_in_initial_viewport(&self) -> bool {
        if self.intersection_ratio() > f64::EPSILON {
            return true;
        }
        match self.bounding_client_rect() {
            Some(rect) => rect.top < f64::from(self.url_metric.viewport_height()),
            None => false,
        }
    }
}

impl Index<&str> for Element<'_> {
    type Output = JsonValue;

    fn index(&self, field: &str) -> &JsonValue {
        &self.data[field]
    }
}

impl Serialize for Element<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}

pub(crate) fn element_field(index: usize) -> String {
    format!("elements[{}]", index)
}
