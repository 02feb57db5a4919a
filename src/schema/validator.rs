//! Field-level payload checks
//!
//! Small helpers used by the URL Metric and element constructors. Every
//! failure names the offending field path so callers can report it back.

use super::{PropertyType, UrlMetricSchema, ValidationMode};
use crate::core::{DomRect, MetricsError, Result, Viewport};
use serde_json::{Map, Value as JsonValue};

pub(crate) type JsonObject = Map<String, JsonValue>;

pub(crate) fn require_object<'a>(value: &'a JsonValue, field: &str) -> Result<&'a JsonObject> {
    value
        .as_object()
        .ok_or_else(|| MetricsError::validation(field, "expected object"))
}

pub(crate) fn require_array<'a>(value: &'a JsonValue, field: &str) -> Result<&'a Vec<JsonValue>> {
    value
        .as_array()
        .ok_or_else(|| MetricsError::validation(field, "expected array"))
}

pub(crate) fn require_key<'a>(
    object: &'a JsonObject,
    key: &str,
    field: &str,
) -> Result<&'a JsonValue> {
    object
        .get(key)
        .ok_or_else(|| MetricsError::validation(field, "missing required property"))
}

pub(crate) fn require_bool(object: &JsonObject, key: &str, field: &str) -> Result<bool> {
    require_key(object, key, field)?
        .as_bool()
        .ok_or_else(|| MetricsError::validation(field, "expected boolean"))
}

pub(crate) fn require_non_empty_string<'a>(
    object: &'a JsonObject,
    key: &str,
    field: &str,
) -> Result<&'a str> {
    let value = require_key(object, key, field)?
        .as_str()
        .ok_or_else(|| MetricsError::validation(field, "expected string"))?;
    if value.is_empty() {
        return Err(MetricsError::validation(field, "must not be empty"));
    }
    Ok(value)
}

pub(crate) fn number_in_range(
    value: &JsonValue,
    field: &str,
    minimum: Option<f64>,
    maximum: Option<f64>,
) -> Result<f64> {
    PropertyType::Number { minimum, maximum }.check(field, value)?;
    value
        .as_f64()
        .ok_or_else(|| MetricsError::validation(field, "expected number"))
}

fn non_negative_u32(value: &JsonValue, field: &str) -> Result<u32> {
    let n = value
        .as_i64()
        .ok_or_else(|| MetricsError::validation(field, "expected integer"))?;
    if n < 0 {
        return Err(MetricsError::validation(field, "must be at least 0"));
    }
    u32::try_from(n).map_err(|_| MetricsError::validation(field, "is too large"))
}

pub(crate) fn parse_viewport(value: &JsonValue, field: &str) -> Result<Viewport> {
    let object = require_object(value, field)?;
    reject_extra_keys(object, &["width", "height"], field)?;

    let width_field = format!("{}.width", field);
    let height_field = format!("{}.height", field);
    let width = non_negative_u32(require_key(object, "width", &width_field)?, &width_field)?;
    let height = non_negative_u32(require_key(object, "height", &height_field)?, &height_field)?;

    Ok(Viewport::new(width, height))
}

pub(crate) fn parse_dom_rect(value: &JsonValue, field: &str) -> Result<DomRect> {
    let object = require_object(value, field)?;
    reject_extra_keys(object, &DomRect::KEYS, field)?;

    let mut values = [0.0_f64; 8];
    for (slot, key) in values.iter_mut().zip(DomRect::KEYS) {
        let key_field = format!("{}.{}", field, key);
        *slot = number_in_range(require_key(object, key, &key_field)?, &key_field, None, None)?;
    }
    let [width, height, x, y, top, right, bottom, left] = values;

    Ok(DomRect { width, height, x, y, top, right, bottom, left })
}

fn reject_extra_keys(object: &JsonObject, allowed: &[&str], field: &str) -> Result<()> {
    match object.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(MetricsError::validation(
            format!("{}.{}", field, key),
            "unknown property",
        )),
        None => Ok(()),
    }
}

/// Where a set of extension properties lives in the payload
#[derive(Debug, Clone, Copy)]
pub(crate) enum PropertyScope {
    Root,
    Element,
}

/// Validate every non-core key of `object` against the registered
/// extension properties for `scope`.
pub(crate) fn check_extension_keys(
    object: &JsonObject,
    core_fields: &[&str],
    scope: PropertyScope,
    schema: &UrlMetricSchema,
    mode: ValidationMode,
    field_prefix: &str,
) -> Result<()> {
    for (key, value) in object {
        if core_fields.contains(&key.as_str()) {
            continue;
        }

        let field = if field_prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", field_prefix, key)
        };

        let registered = match scope {
            PropertyScope::Root => schema.root_property(key),
            PropertyScope::Element => schema.element_property(key),
        };

        match (registered, mode) {
            (Some(property_type), _) => property_type.check(&field, value)?,
            (None, ValidationMode::Lenient) => {}
            (None, ValidationMode::Strict) => {
                return Err(MetricsError::validation(field, "unknown property"));
            }
        }
    }
    Ok(())
}
