//! The normalized, cost-annotated usage record emitted once per billable span.

use serde::{Deserialize, Serialize};

/// One provider call, after usage correction and pricing.
///
/// Field names follow the wire format consumed by billing pipelines, so the
/// trace identifiers keep their camelCase spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLog {
    /// ISO-8601 timestamp of the span's end, e.g. `2025-01-01T00:00:01.000Z`.
    pub time: String,

    /// Provider system string as reported on the span.
    pub provider: Option<String>,

    /// Model id after override resolution and mapping.
    pub model: String,

    /// New (uncached) input tokens.
    pub input: u64,

    /// Generated tokens, reasoning included.
    pub output: u64,

    /// Prompt tokens served from the provider cache.
    pub cache_read: u64,

    /// Prompt tokens written into the provider cache.
    pub cache_write: u64,

    /// Cost in US cents. `None` when no price entry matched.
    pub cost_cents: Option<f64>,

    pub finish_reason: Option<String>,

    pub user_id: Option<String>,

    pub workspace_id: Option<String>,

    #[serde(rename = "traceId", default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    #[serde(rename = "spanId", default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,

    /// Raw span attributes, only present when the exporter is configured to
    /// include them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Map<String, serde_json::Value>>,
}
