//! Tag visitors
//!
//! Visitors are invoked once per tag of a document being optimized. Each one
//! inspects the tag against the page's Group Collection, may queue links or
//! meta attributes, and reports whether the tag should be tracked so that
//! future URL Metrics capture it.

pub mod debug;
pub mod links;

pub use debug::DebugTagVisitor;
pub use links::{Link, LinkCollection, generate_media_query};

use crate::group::UrlMetricGroupCollection;
use crate::metric::normalize_xpath;
use log::debug;
use std::collections::BTreeMap;

/// Everything a visitor can see and change for one tag
pub struct TagVisitorContext<'a> {
    xpath: String,
    tag_name: String,
    pub url_metric_group_collection: &'a UrlMetricGroupCollection,
    pub link_collection: &'a mut LinkCollection,
    meta_attributes: BTreeMap<String, String>,
}

impl<'a> TagVisitorContext<'a> {
    pub fn new(
        xpath: &str,
        tag_name: &str,
        url_metric_group_collection: &'a UrlMetricGroupCollection,
        link_collection: &'a mut LinkCollection,
    ) -> Self {
        Self {
            xpath: normalize_xpath(xpath),
            tag_name: tag_name.to_ascii_uppercase(),
            url_metric_group_collection,
            link_collection,
            meta_attributes: BTreeMap::new(),
        }
    }

    pub fn xpath(&self) -> &str {
        &self.xpath
    }

    /// Upper-cased tag name.
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    /// Record a `data-od-*` style annotation for the current tag.
    pub fn set_meta_attribute(&mut self, name: &str, value: impl ToString) {
        self.meta_attributes.insert(name.to_string(), value.to_string());
    }

    pub fn meta_attribute(&self, name: &str) -> Option<&str> {
        self.meta_attributes.get(name).map(String::as_str)
    }

    pub fn meta_attributes(&self) -> &BTreeMap<String, String> {
        &self.meta_attributes
    }
}

/// A tag visitor; returns `true` when the tag should be tracked.
pub trait TagVisitor: Send + Sync {
    fn visit(&self, context: &mut TagVisitorContext<'_>) -> bool;
}

impl<F> TagVisitor for F
where
    F: Fn(&mut TagVisitorContext<'_>) -> bool + Send + Sync,
{
    fn visit(&self, context: &mut TagVisitorContext<'_>) -> bool {
        self(context)
    }
}

/// Visitors keyed by id, invoked in registration order
#[derive(Default)]
pub struct TagVisitorRegistry {
    visitors: Vec<(String, Box<dyn TagVisitor>)>,
}

impl TagVisitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a visitor. Re-registering an id replaces the visitor but
    /// keeps its original position.
    pub fn register(&mut self, id: &str, visitor: impl TagVisitor + 'static) {
        let visitor: Box<dyn TagVisitor> = Box::new(visitor);
        match self.visitors.iter_mut().find(|(existing, _)| existing == id) {
            Some(slot) => {
                debug!("Replaced tag visitor: {}", id);
                slot.1 = visitor;
            }
            None => {
                debug!("Registered tag visitor: {}", id);
                self.visitors.push((id.to_string(), visitor));
            }
        }
    }

    /// Remove a visitor; returns whether it was registered.
    pub fn unregister(&mut self, id: &str) -> bool {
        let before = self.visitors.len();
        self.visitors.retain(|(existing, _)| existing != id);
        before != self.visitors.len()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.visitors.iter().any(|(existing, _)| existing == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.visitors.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }

    /// Run every visitor on the tag; `true` if any asked for tracking.
    pub fn visit(&self, context: &mut TagVisitorContext<'_>) -> bool {
        let mut tracked = false;
        for (_, visitor) in &self.visitors {
            tracked |= visitor.visit(context);
        }
        tracked
    }
}

impl std::fmt::Debug for TagVisitorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
