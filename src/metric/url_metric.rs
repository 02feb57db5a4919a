use super::element::{Element, ElementData, element_field};
use crate::core::{MetricsError, Result, Timestamp, Viewport, is_valid_etag};
use crate::schema::validator::{
    self, JsonObject, PropertyScope, number_in_range, parse_viewport, require_array, require_key,
    require_non_empty_string, require_object,
};
use crate::schema::{ROOT_CORE_FIELDS, UrlMetricSchema, ValidationMode};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::ops::Index;

static NULL: JsonValue = JsonValue::Null;

/// A single client-side observation of a page load at one viewport size.
///
/// Instances are validated on construction and immutable afterwards: there
/// is no mutating API, and bracket access (`url_metric["etag"]`) is read-only.
///
/// # Examples
///
/// ```
/// use url_metrics::UrlMetric;
/// use serde_json::json;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let url_metric = UrlMetric::from_value(json!({
///     "url": "https://example.com/",
///     "viewport": {"width": 360, "height": 640},
///     "timestamp": 1700000000.5,
///     "etag": "d41d8cd98f00b204e9800998ecf8427e",
///     "elements": [
///         {"xpath": "/HTML/BODY/DIV/*[1][self::IMG]", "isLCP": true, "isLCPCandidate": true, "intersectionRatio": 1.0}
///     ]
/// }))?;
///
/// assert_eq!(url_metric.viewport_width(), 360);
/// assert!(url_metric.elements().next().unwrap().is_lcp());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct UrlMetric {
    data: JsonObject,
    url: String,
    viewport: Viewport,
    timestamp: Timestamp,
    etag: String,
    uuid: Option<String>,
    elements: Vec<ElementData>,
}

impl UrlMetric {
    /// Validate `value` strictly against the core schema without extensions.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        Self::from_value_with_schema(value, &UrlMetricSchema::default(), ValidationMode::Strict)
    }

    pub fn from_value_with_schema(
        value: JsonValue,
        schema: &UrlMetricSchema,
        mode: ValidationMode,
    ) -> Result<Self> {
        let object = require_object(&value, "")?;

        let url = require_non_empty_string(object, "url", "url")?.to_string();
        let viewport = parse_viewport(require_key(object, "viewport", "viewport")?, "viewport")?;
        let timestamp = number_in_range(
            require_key(object, "timestamp", "timestamp")?,
            "timestamp",
            Some(0.0),
            None,
        )?;

        let etag = require_non_empty_string(object, "etag", "etag")?.to_string();
        if !is_valid_etag(&etag) {
            return Err(MetricsError::validation(
                "etag",
                "must be 32 lowercase hex characters",
            ));
        }

        let uuid = match object.get("uuid") {
            Some(JsonValue::String(uuid)) => {
                uuid::Uuid::parse_str(uuid)
                    .map_err(|e| MetricsError::validation("uuid", e.to_string()))?;
                Some(uuid.clone())
            }
            Some(_) => return Err(MetricsError::validation("uuid", "expected string")),
            None => None,
        };

        let raw_elements = require_array(require_key(object, "elements", "elements")?, "elements")?;
        let elements = raw_elements
            .iter()
            .enumerate()
            .map(|(i, element)| ElementData::from_value(element, &element_field(i), schema, mode))
            .collect::<Result<Vec<_>>>()?;

        validator::check_extension_keys(
            object,
            &ROOT_CORE_FIELDS,
            PropertyScope::Root,
            schema,
            mode,
            "",
        )?;

        let mut data = object.clone();
        data.insert(
            "elements".to_string(),
            JsonValue::Array(elements.iter().map(ElementData::to_value).collect()),
        );

        Ok(Self {
            data,
            url,
            viewport,
            timestamp,
            etag,
            uuid,
            elements,
        })
    }

    pub fn from_json_str(
        json: &str,
        schema: &UrlMetricSchema,
        mode: ValidationMode,
    ) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_value_with_schema(value, schema, mode)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn viewport_width(&self) -> u32 {
        self.viewport.width
    }

    pub fn viewport_height(&self) -> u32 {
        self.viewport.height
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    /// Elements of this URL Metric, without an owning group.
    pub fn elements(&self) -> impl ExactSizeIterator<Item = Element<'_>> + '_ {
        self.elements
            .iter()
            .map(move |data| Element::new(data, self, None))
    }

    pub fn element_data(&self) -> &[ElementData] {
        &self.elements
    }

    /// Look up a core or extension property of the root object.
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.data.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn to_value(&self) -> JsonValue {
        JsonValue::Object(self.data.clone())
    }
}

impl Index<&str> for UrlMetric {
    type Output = JsonValue;

    fn index(&self, field: &str) -> &JsonValue {
        self.get(field).unwrap_or(&NULL)
    }
}

impl Serialize for UrlMetric {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}
