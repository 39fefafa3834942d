//! Error types for the spancost domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all spancost operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Sink errors ---
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    // --- Price catalog errors ---
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures raised by a [`TokenLogSink`](crate::sink::TokenLogSink) while
/// delivering a record.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("Delivery to {sink} failed: {reason}")]
    DeliveryFailed { sink: String, reason: String },

    #[error("{sink} rejected the record (status: {status_code})")]
    Rejected { sink: String, status_code: u16 },

    #[error("Record could not be encoded: {0}")]
    Encoding(String),

    #[error("Sink closed: {0}")]
    Closed(String),
}

/// Failures raised while building a price catalog.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Price catalog is not valid JSON: {0}")]
    Parse(String),

    #[error("Invalid price entry {key}: {reason}")]
    InvalidEntry { key: String, reason: String },
}
