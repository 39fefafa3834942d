//! Token usage and cost accounting for AI SDK tracing spans.
//!
//! Turns ended spans from instrumented LLM calls into normalized,
//! cost-annotated [`TokenLog`](spancost_core::TokenLog) records: provider
//! cache accounting is corrected so no token is billed twice, prices come
//! from an immutable [`PriceCatalog`], and every record is attributed to a
//! user and workspace before it reaches a sink.

pub mod attributes;
pub mod classify;
pub mod context;
pub mod exporter;
pub mod metadata;
pub mod model;
pub mod pricing;
pub mod providers;
pub mod sinks;

pub use classify::{BillableOperation, CallSpan, SkipReason};
pub use context::{AmbientContext, ContextCallback, Identity, IdentityKeys};
pub use exporter::{
    ExportReport, ExportResult, ExporterOptions, ModelMapping, SpanOutcome, TokenExporter,
};
pub use metadata::TelemetryMetadata;
pub use model::{Attributes, CanonicalUsage, Span};
pub use pricing::{compute_cost_cents, PriceCatalog, PriceEntry};
pub use providers::{normalize_usage, ProviderFamily};
pub use sinks::{CallbackSink, ConsoleSink, WebhookSink};

use spancost_config::ConfigError;
use spancost_core::CatalogError;

/// Errors from the telemetry subsystem.
///
/// Per-span problems never surface here; they are reported in the
/// [`ExportReport`]. These errors come from setting the exporter up.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("price catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("invalid telemetry metadata field {field}: {reason}")]
    InvalidMetadata { field: &'static str, reason: String },

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl From<TelemetryError> for spancost_core::Error {
    fn from(err: TelemetryError) -> Self {
        match err {
            TelemetryError::Catalog(e) => Self::Catalog(e),
            TelemetryError::SerdeError(e) => Self::Serialization(e),
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}
