//! URL Metric Schema Module
//!
//! Describes which keys a URL Metric payload may carry. The core fields are
//! fixed; extensions register additional optional properties for the root
//! object or for element objects before any payload is parsed.
//!
//! # Architecture
//!
//! - `mod.rs` - Registry of extension properties (`UrlMetricSchema`)
//! - `validator.rs` - Field-level checks shared by the metric constructors

pub(crate) mod validator;

use crate::core::{MetricsError, Result};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Keys owned by the URL Metric itself.
pub const ROOT_CORE_FIELDS: [&str; 6] = ["url", "viewport", "timestamp", "etag", "elements", "uuid"];

/// Keys owned by an element entry.
pub const ELEMENT_CORE_FIELDS: [&str; 6] = [
    "xpath",
    "isLCP",
    "isLCPCandidate",
    "intersectionRatio",
    "intersectionRect",
    "boundingClientRect",
];

/// How unregistered keys are treated during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Unregistered keys are rejected. Used for fresh submissions.
    #[default]
    Strict,
    /// Unregistered keys are kept verbatim without validation. Used when
    /// reading records back from storage, since an extension that was
    /// active at capture time may have been removed since.
    Lenient,
}

/// Type constraint for an extension property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyType {
    String,
    Boolean,
    Integer { minimum: Option<i64> },
    Number { minimum: Option<f64>, maximum: Option<f64> },
    Object,
    Array,
    Any,
}

impl PropertyType {
    pub fn number() -> Self {
        Self::Number { minimum: None, maximum: None }
    }

    pub fn integer() -> Self {
        Self::Integer { minimum: None }
    }

    /// Check `value` against this type, reporting failures at `field`.
    pub fn check(&self, field: &str, value: &JsonValue) -> Result<()> {
        let ok = match self {
            PropertyType::String => value.is_string(),
            PropertyType::Boolean => value.is_boolean(),
            PropertyType::Object => value.is_object(),
            PropertyType::Array => value.is_array(),
            PropertyType::Any => true,
            PropertyType::Integer { minimum } => match value.as_i64() {
                Some(n) => {
                    if let Some(min) = minimum
                        && n < *min
                    {
                        return Err(MetricsError::validation(
                            field,
                            format!("must be at least {}", min),
                        ));
                    }
                    true
                }
                None => false,
            },
            PropertyType::Number { minimum, maximum } => match value.as_f64() {
                Some(n) => {
                    if let Some(min) = minimum
                        && n < *min
                    {
                        return Err(MetricsError::validation(
                            field,
                            format!("must be at least {}", min),
                        ));
                    }
                    if let Some(max) = maximum
                        && n > *max
                    {
                        return Err(MetricsError::validation(
                            field,
                            format!("must be at most {}", max),
                        ));
                    }
                    true
                }
                None => false,
            },
        };

        if ok {
            Ok(())
        } else {
            Err(MetricsError::validation(
                field,
                format!("expected {}, got {}", self.type_name(), json_type_name(value)),
            ))
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Boolean => "boolean",
            PropertyType::Integer { .. } => "integer",
            PropertyType::Number { .. } => "number",
            PropertyType::Object => "object",
            PropertyType::Array => "array",
            PropertyType::Any => "any",
        }
    }
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Registry of extension properties for URL Metric payloads
///
/// Extensions are additive only: a core field can never be redefined and a
/// property can only be registered once.
///
/// # Examples
///
/// ```
/// use url_metrics::schema::{PropertyType, UrlMetricSchema};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let schema = UrlMetricSchema::new()
///     .with_element_property("resizedBoundingClientRect", PropertyType::Object)?
///     .with_root_property("lcpElementExternalBackgroundImage", PropertyType::Object)?;
/// assert!(schema.element_property("resizedBoundingClientRect").is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct UrlMetricSchema {
    root_properties: BTreeMap<String, PropertyType>,
    element_properties: BTreeMap<String, PropertyType>,
}

impl UrlMetricSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an optional property on the URL Metric root object
    pub fn register_root_property(
        &mut self,
        name: impl Into<String>,
        property_type: PropertyType,
    ) -> Result<()> {
        let name = name.into();
        Self::register(&mut self.root_properties, &ROOT_CORE_FIELDS, "root", name, property_type)
    }

    /// Register an optional property on every element object
    pub fn register_element_property(
        &mut self,
        name: impl Into<String>,
        property_type: PropertyType,
    ) -> Result<()> {
        let name = name.into();
        Self::register(
            &mut self.element_properties,
            &ELEMENT_CORE_FIELDS,
            "element",
            name,
            property_type,
        )
    }

    pub fn with_root_property(
        mut self,
        name: impl Into<String>,
        property_type: PropertyType,
    ) -> Result<Self> {
        self.register_root_property(name, property_type)?;
        Ok(self)
    }

    pub fn with_element_property(
        mut self,
        name: impl Into<String>,
        property_type: PropertyType,
    ) -> Result<Self> {
        self.register_element_property(name, property_type)?;
        Ok(self)
    }

    pub fn root_property(&self, name: &str) -> Option<&PropertyType> {
        self.root_properties.get(name)
    }

    pub fn element_property(&self, name: &str) -> Option<&PropertyType> {
        self.element_properties.get(name)
    }

    pub fn root_properties(&self) -> impl Iterator<Item = (&str, &PropertyType)> {
        self.root_properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn element_properties(&self) -> impl Iterator<Item = (&str, &PropertyType)> {
        self.element_properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn register(
        properties: &mut BTreeMap<String, PropertyType>,
        core_fields: &[&str],
        location: &str,
        name: String,
        property_type: PropertyType,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(MetricsError::Schema(
                "Property name cannot be empty".to_string(),
            ));
        }
        if core_fields.contains(&name.as_str()) {
            return Err(MetricsError::Schema(format!(
                "Cannot redefine core {} property '{}'",
                location, name
            )));
        }
        if properties.contains_key(&name) {
            return Err(MetricsError::Schema(format!(
                "The {} property '{}' is already registered",
                location, name
            )));
        }
        log::debug!("Registered {} extension property '{}'", location, name);
        properties.insert(name, property_type);
        Ok(())
    }
}
