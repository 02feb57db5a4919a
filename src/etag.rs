//! Fingerprint of the environment a page was rendered in
//!
//! URL Metrics captured under one ETag stop counting towards completeness
//! once the ETag changes, e.g. after a theme switch or when a tag visitor is
//! added or removed.

use crate::core::short_digest;
use crate::visitor::TagVisitorRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeInfo {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTheme {
    /// Parent theme providing the templates
    pub template: ThemeInfo,
    /// Child theme providing the stylesheet, if any
    pub stylesheet: ThemeInfo,
}

/// Everything the current ETag is derived from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EtagData {
    pub tag_visitors: Vec<String>,
    pub queried_object: JsonValue,
    pub active_theme: ActiveTheme,
    pub current_template: Option<String>,
}

impl EtagData {
    pub fn etag(&self) -> String {
        // Serializing plain data with string keys cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        short_digest(json.as_bytes())
    }
}

/// ETag for the registered visitors and the rendering environment.
pub fn compute_current_etag(
    registry: &TagVisitorRegistry,
    queried_object: JsonValue,
    active_theme: ActiveTheme,
    current_template: Option<String>,
) -> String {
    EtagData {
        tag_visitors: registry.ids().map(str::to_string).collect(),
        queried_object,
        active_theme,
        current_template,
    }
    .etag()
}
