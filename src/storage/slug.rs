//! Storage keys derived from a request's query variables

use crate::core::{is_valid_etag, short_digest};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Query variables that identify a page, with empty values removed.
///
/// Logged-in visitors see different markup (admin bar and the like), so
/// they get their own `user_logged_in` entry and therefore their own slug.
pub fn normalize_query_vars(
    query_vars: &BTreeMap<String, JsonValue>,
    user_logged_in: bool,
) -> BTreeMap<String, JsonValue> {
    let mut normalized: BTreeMap<String, JsonValue> = query_vars
        .iter()
        .filter(|(_, value)| !is_empty_query_var(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if user_logged_in {
        normalized.insert("user_logged_in".to_string(), JsonValue::Bool(true));
    }
    normalized
}

fn is_empty_query_var(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::Bool(_) | JsonValue::Number(_) => false,
    }
}

/// Storage slug for normalized query variables.
///
/// The variables are serialized with sorted keys, so the slug does not
/// depend on insertion order.
///
/// ```
/// use std::collections::BTreeMap;
/// use url_metrics::{normalize_query_vars, url_metrics_slug};
///
/// let mut vars = BTreeMap::new();
/// vars.insert("p".to_string(), serde_json::json!("1"));
/// vars.insert("s".to_string(), serde_json::json!(""));
/// let slug = url_metrics_slug(&normalize_query_vars(&vars, false));
/// assert_eq!(slug.len(), 32);
/// ```
pub fn url_metrics_slug(query_vars: &BTreeMap<String, JsonValue>) -> String {
    // A BTreeMap of JSON values always serializes.
    let json = serde_json::to_string(query_vars).unwrap_or_default();
    short_digest(json.as_bytes())
}

/// Whether `slug` has the shape produced by [`url_metrics_slug`].
pub fn is_valid_slug(slug: &str) -> bool {
    is_valid_etag(slug)
}
