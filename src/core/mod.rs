pub mod digest;
pub mod error;
pub mod types;

pub use digest::short_digest;
pub use error::{MetricsError, Result};
pub use types::{
    DomRect, MAX_VIEWPORT_WIDTH, Timestamp, Viewport, current_timestamp, is_valid_etag,
    validate_etag,
};
