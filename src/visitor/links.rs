//! Links added to the document head for specific viewport ranges

use crate::core::{MAX_VIEWPORT_WIDTH, MetricsError, Result};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Build a CSS media query for an inclusive viewport width range.
///
/// A zero (or absent) minimum and an unbounded (or absent) maximum are left
/// out. Returns `None` when nothing constrains the range or when the
/// minimum exceeds the maximum.
///
/// ```
/// use url_metrics::generate_media_query;
///
/// assert_eq!(generate_media_query(Some(0), Some(480)).as_deref(), Some("(max-width: 480px)"));
/// assert_eq!(
///     generate_media_query(Some(481), Some(600)).as_deref(),
///     Some("(min-width: 481px) and (max-width: 600px)")
/// );
/// assert_eq!(generate_media_query(None, None), None);
/// ```
pub fn generate_media_query(
    minimum_viewport_width: Option<i64>,
    maximum_viewport_width: Option<i64>,
) -> Option<String> {
    if let (Some(minimum), Some(maximum)) = (minimum_viewport_width, maximum_viewport_width)
        && minimum > maximum
    {
        log::warn!(
            "Minimum viewport width {} is greater than maximum {}",
            minimum,
            maximum
        );
        return None;
    }

    let mut features = Vec::with_capacity(2);
    if let Some(minimum) = minimum_viewport_width.filter(|&width| width > 0) {
        features.push(format!("(min-width: {}px)", minimum));
    }
    if let Some(maximum) = maximum_viewport_width.filter(|&width| width != MAX_VIEWPORT_WIDTH) {
        features.push(format!("(max-width: {}px)", maximum));
    }

    if features.is_empty() {
        None
    } else {
        Some(features.join(" and "))
    }
}

/// A `<link>` restricted to an inclusive viewport width range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub attributes: BTreeMap<String, String>,
    pub minimum_viewport_width: Option<i64>,
    pub maximum_viewport_width: Option<i64>,
}

impl Link {
    pub fn media_query(&self) -> Option<String> {
        generate_media_query(self.minimum_viewport_width, self.maximum_viewport_width)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinkCollection {
    links: Vec<Link>,
}

impl LinkCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a link for the given viewport range.
    ///
    /// `rel` is required, and so is either `href` or `imagesrcset`.
    pub fn add_link(
        &mut self,
        attributes: BTreeMap<String, String>,
        minimum_viewport_width: Option<i64>,
        maximum_viewport_width: Option<i64>,
    ) -> Result<()> {
        if attributes.get("rel").is_none_or(String::is_empty) {
            return Err(MetricsError::InvalidArgument(
                "Link is missing the rel attribute".to_string(),
            ));
        }
        let has_source = ["href", "imagesrcset"]
            .iter()
            .any(|name| attributes.get(*name).is_some_and(|value| !value.is_empty()));
        if !has_source {
            return Err(MetricsError::InvalidArgument(
                "Link needs an href or imagesrcset attribute".to_string(),
            ));
        }
        if let Some(minimum) = minimum_viewport_width
            && minimum < 0
        {
            return Err(MetricsError::InvalidArgument(format!(
                "Minimum viewport width must be at least zero, got {}",
                minimum
            )));
        }
        if let (Some(minimum), Some(maximum)) = (minimum_viewport_width, maximum_viewport_width)
            && minimum > maximum
        {
            return Err(MetricsError::InvalidArgument(format!(
                "Minimum viewport width {} exceeds maximum {}",
                minimum, maximum
            )));
        }

        self.links.push(Link {
            attributes,
            minimum_viewport_width,
            maximum_viewport_width,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Links with identical attributes over adjacent viewport ranges
    /// merged into one.
    pub fn prepared_links(&self) -> Vec<Link> {
        let mut by_attributes: Vec<(&BTreeMap<String, String>, Vec<&Link>)> = Vec::new();
        for link in &self.links {
            match by_attributes
                .iter_mut()
                .find(|(attributes, _)| **attributes == link.attributes)
            {
                Some((_, links)) => links.push(link),
                None => by_attributes.push((&link.attributes, vec![link])),
            }
        }

        let mut prepared = Vec::with_capacity(self.links.len());
        for (_, mut links) in by_attributes {
            links.sort_by_key(|link| link.minimum_viewport_width.unwrap_or(0));

            let mut merged: Vec<Link> = Vec::with_capacity(links.len());
            for link in links {
                if let Some(previous) = merged.last_mut()
                    && is_adjacent(previous, link)
                {
                    previous.maximum_viewport_width = link.maximum_viewport_width;
                    continue;
                }
                merged.push(link.clone());
            }
            prepared.extend(merged);
        }
        prepared
    }

    /// Render the prepared links as HTML, one tag per line.
    pub fn get_html(&self) -> String {
        let mut html = String::new();
        for link in self.prepared_links() {
            html.push_str("<link data-od-added-tag");
            for (name, value) in &link.attributes {
                let _ = write!(html, " {}=\"{}\"", name, escape_attribute(value));
            }
            if let Some(media) = link.media_query() {
                let _ = write!(html, " media=\"{}\"", escape_attribute(&media));
            }
            html.push_str(">\n");
        }
        html
    }
}

fn is_adjacent(previous: &Link, next: &Link) -> bool {
    match previous.maximum_viewport_width {
        None => false,
        Some(maximum) if maximum == MAX_VIEWPORT_WIDTH => false,
        Some(maximum) => next.minimum_viewport_width.unwrap_or(0) == maximum + 1,
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
