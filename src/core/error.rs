use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Data validation error at '{field}': {message}")]
    DataValidation { field: String, message: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("URL Metric group {minimum_viewport_width}..={maximum_viewport_width} is already complete")]
    GroupComplete {
        minimum_viewport_width: i64,
        maximum_viewport_width: i64,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

impl MetricsError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Path of the offending payload field for data validation errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::DataValidation { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for MetricsError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for MetricsError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for MetricsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
