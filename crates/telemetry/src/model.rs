//! Data model for ended spans and canonical token usage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Flat span attribute bag. Values may be scalars, arrays, nested objects,
/// or JSON documents encoded as strings.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

// ── Span ──────────────────────────────────────────────────────────────────

/// An ended unit of tracing work, as handed over by the tracing pipeline.
///
/// The exporter only ever reads spans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Operation name (e.g. `ai.streamText.doStream`).
    pub name: String,
    /// Span attributes.
    #[serde(default)]
    pub attributes: Attributes,
    /// When the span started.
    pub start_time: DateTime<Utc>,
    /// When the span ended.
    pub end_time: DateTime<Utc>,
    /// Hex trace id.
    #[serde(default)]
    pub trace_id: String,
    /// Hex span id.
    #[serde(default)]
    pub span_id: String,
}

impl Span {
    /// Create an ended span with the given name, stamped now.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            attributes: Attributes::new(),
            start_time: now,
            end_time: now,
            trace_id: String::new(),
            span_id: String::new(),
        }
    }

    /// Replace the attribute bag.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set a single attribute.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the trace and span identifiers.
    pub fn with_ids(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self.span_id = span_id.into();
        self
    }

    /// Set the start and end instants.
    pub fn with_times(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }
}

// ── Usage ─────────────────────────────────────────────────────────────────

/// Provider-agnostic token breakdown used for pricing.
///
/// `input` holds only new prompt tokens; anything served from the provider
/// cache is counted once, under `cache_read`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalUsage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
}

impl CanonicalUsage {
    /// Usage with no cache activity.
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            cache_read: 0,
            cache_write: 0,
        }
    }

    pub fn with_cache_read(mut self, cache_read: u64) -> Self {
        self.cache_read = cache_read;
        self
    }

    pub fn with_cache_write(mut self, cache_write: u64) -> Self {
        self.cache_write = cache_write;
        self
    }

    /// Move `reported` cached tokens out of `input` for providers whose
    /// prompt count already includes them.
    ///
    /// The cached amount is clamped to the reported input, so `input` never
    /// goes negative and `cache_read` never exceeds what was sent.
    pub fn split_cached_input(self, reported: u64) -> Self {
        let cached = reported.min(self.input);
        Self {
            input: self.input - cached,
            output: self.output,
            cache_read: cached,
            cache_write: 0,
        }
    }
}
