use super::{MetricsError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Upper bound of the last breakpoint group; stands in for an unbounded width.
pub const MAX_VIEWPORT_WIDTH: i64 = i64::MAX;

/// Capture time in seconds since the Unix epoch, with sub-second precision.
pub type Timestamp = f64;

lazy_static! {
    static ref ETAG_PATTERN: Regex = Regex::new(r"^[0-9a-f]{32}$").unwrap();
}

/// Current wall-clock time as a [`Timestamp`].
pub fn current_timestamp() -> Timestamp {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Whether `etag` is exactly 32 lowercase hex characters.
pub fn is_valid_etag(etag: &str) -> bool {
    ETAG_PATTERN.is_match(etag)
}

pub fn validate_etag(etag: &str) -> Result<()> {
    if is_valid_etag(etag) {
        Ok(())
    } else {
        Err(MetricsError::InvalidArgument(format!(
            "ETag must be 32 lowercase hex characters, got {:?}",
            etag
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Client rectangle as reported by `getBoundingClientRect()` or an
/// `IntersectionObserverEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DomRect {
    pub width: f64,
    pub height: f64,
    pub x: f64,
    pub y: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl DomRect {
    pub const KEYS: [&'static str; 8] = [
        "width", "height", "x", "y", "top", "right", "bottom", "left",
    ];
}
