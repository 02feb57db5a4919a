//! URL Metrics and their element entries

pub mod element;
pub mod url_metric;
pub mod xpath;

pub use element::{Element, ElementData};
pub use url_metric::UrlMetric;
pub use xpath::normalize_xpath;
