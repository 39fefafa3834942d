//! The span → [`TokenLog`] pipeline.
//!
//! For every span in a batch: classify, resolve the model, normalize usage,
//! price it, attribute it, and hand the record to the sink. A span that
//! fails at any step is reported in the [`ExportReport`] and never stops
//! the rest of the batch.

use chrono::SecondsFormat;
use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use spancost_config::ExporterConfig;
use spancost_core::{TokenLog, TokenLogSink};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::attributes::{as_text, first_text, get_attr};
use crate::classify::{classify, SkipReason};
use crate::context::{resolve_context, AmbientContext, ContextCallback, Identity, IdentityKeys};
use crate::model::{Attributes, Span};
use crate::pricing::{compute_cost_cents, PriceCatalog};
use crate::providers::{normalize_usage, sdk_usage};
use crate::TelemetryError;

/// Per-call model override set through telemetry metadata.
pub const MODEL_OVERRIDE_KEYS: &[&str] = &[
    "ai.telemetry.metadata.modelName",
    "ai.telemetry.metadata.model_name",
];
/// Model the provider says actually served the call.
pub const RESPONSE_MODEL_KEYS: &[&str] = &["ai.response.model", "gen_ai.response.model"];
pub const BASE_MODEL_KEYS: &[&str] = &["ai.model.id"];
pub const REQUEST_MODEL_KEYS: &[&str] = &["gen_ai.request.model"];
pub const PROVIDER_KEYS: &[&str] = &["gen_ai.system", "ai.model.provider"];
pub const FINISH_REASON_KEYS: &[&str] = &[
    "ai.response.finishReason",
    "gen_ai.response.finish_reasons",
];

const UNKNOWN_MODEL: &str = "unknown";

// ── Model mapping ─────────────────────────────────────────────────────────

/// Deployment or proxy model names → catalog model ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelMapping {
    entries: BTreeMap<String, String>,
}

impl ModelMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.entries.insert(from.into(), to.into());
    }

    /// Map `model`: exact key first, then a case-insensitive match.
    /// Unmapped names pass through.
    pub fn apply(&self, model: &str) -> String {
        if let Some(mapped) = self.entries.get(model) {
            return mapped.clone();
        }
        self.entries
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(model))
            .map(|(_, to)| to.clone())
            .unwrap_or_else(|| model.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ModelMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

// ── Options ───────────────────────────────────────────────────────────────

/// Exporter behaviour. Immutable once the exporter is built.
#[derive(Clone, Default)]
pub struct ExporterOptions {
    pub identity_keys: IdentityKeys,
    pub context_callback: Option<ContextCallback>,
    pub model_mapping: ModelMapping,
    /// Copy raw span attributes onto every record.
    pub include_attributes: bool,
}

impl std::fmt::Debug for ExporterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterOptions")
            .field("identity_keys", &self.identity_keys)
            .field("context_callback", &self.context_callback.is_some())
            .field("model_mapping", &self.model_mapping)
            .field("include_attributes", &self.include_attributes)
            .finish()
    }
}

impl ExporterOptions {
    /// Options from a loaded config file. Callbacks are code-only and start
    /// unset.
    pub fn from_config(config: &ExporterConfig) -> Self {
        Self {
            identity_keys: IdentityKeys {
                user_id: config.user_id_attributes.clone(),
                workspace_id: config.workspace_id_attributes.clone(),
            },
            context_callback: None,
            model_mapping: config.model_mapping.iter().collect(),
            include_attributes: config.include_attributes,
        }
    }

    pub fn with_context_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Span, &Attributes) -> Option<Identity> + Send + Sync + 'static,
    {
        self.context_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_model_mapping(mut self, mapping: ModelMapping) -> Self {
        self.model_mapping = mapping;
        self
    }

    pub fn with_identity_keys(mut self, keys: IdentityKeys) -> Self {
        self.identity_keys = keys;
        self
    }

    pub fn include_attributes(mut self, include: bool) -> Self {
        self.include_attributes = include;
        self
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────────

/// What happened to one span of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum SpanOutcome {
    /// A record was built and the sink accepted it.
    Logged,
    /// Not a billable provider call, or missing required attributes.
    Skipped(SkipReason),
    /// Processing or delivery failed; the record was dropped.
    Failed(String),
}

/// Batch-level result handed back to the tracing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExportResult {
    Success,
}

/// Result of exporting one batch. `outcomes` is in batch order.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub result: ExportResult,
    pub outcomes: Vec<SpanOutcome>,
}

impl ExportReport {
    pub fn logged(&self) -> usize {
        self.count(|o| matches!(o, SpanOutcome::Logged))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SpanOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SpanOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&SpanOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

// ── Exporter ──────────────────────────────────────────────────────────────

/// Converts ended spans into cost-annotated token logs and delivers them.
pub struct TokenExporter {
    sink: Arc<dyn TokenLogSink>,
    options: ExporterOptions,
    prices: Arc<PriceCatalog>,
}

impl TokenExporter {
    /// Exporter with default options.
    pub fn new(sink: Arc<dyn TokenLogSink>, prices: Arc<PriceCatalog>) -> Self {
        Self {
            sink,
            options: ExporterOptions::default(),
            prices,
        }
    }

    pub fn with_options(mut self, options: ExporterOptions) -> Self {
        self.options = options;
        self
    }

    /// Build from a loaded config. Uses the configured catalog file when
    /// set, otherwise the built-in prices.
    pub fn from_config(
        sink: Arc<dyn TokenLogSink>,
        config: &ExporterConfig,
    ) -> Result<Self, TelemetryError> {
        let prices = match config.read_price_catalog()? {
            Some(raw) => PriceCatalog::from_json_str(&raw)?,
            None => PriceCatalog::with_defaults(),
        };
        Ok(Self::new(sink, Arc::new(prices)).with_options(ExporterOptions::from_config(config)))
    }

    pub fn options(&self) -> &ExporterOptions {
        &self.options
    }

    pub fn prices(&self) -> &PriceCatalog {
        &self.prices
    }

    /// Build the record for one span without delivering it.
    pub fn span_to_log(
        &self,
        span: &Span,
        ambient: &AmbientContext,
    ) -> Result<TokenLog, SkipReason> {
        let call = classify(span)?;
        let attrs = call.attributes();

        let model = self.options.model_mapping.apply(&resolve_model(attrs));
        let provider = first_text(attrs, PROVIDER_KEYS);

        let usage = normalize_usage(provider.as_deref(), attrs, sdk_usage(&call));
        let price = self.prices.resolve(provider.as_deref(), &model);
        if price.is_none() {
            debug!(model = %model, provider = ?provider, "No price for model");
        }
        let cost_cents = compute_cost_cents(&usage, price);

        let identity = resolve_context(
            span,
            &self.options.identity_keys,
            self.options.context_callback.as_ref(),
            ambient,
        );

        Ok(TokenLog {
            time: span.end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            provider,
            model,
            input: usage.input,
            output: usage.output,
            cache_read: usage.cache_read,
            cache_write: usage.cache_write,
            cost_cents,
            finish_reason: finish_reason(attrs),
            user_id: identity.user_id,
            workspace_id: identity.workspace_id,
            trace_id: non_empty(&span.trace_id),
            span_id: non_empty(&span.span_id),
            attributes: self.options.include_attributes.then(|| attrs.clone()),
        })
    }

    /// Export a batch of ended spans.
    ///
    /// Records are built in batch order; deliveries run concurrently. Sink
    /// errors and panics are caught per span. The batch result is always
    /// [`ExportResult::Success`].
    pub async fn export(&self, spans: &[Span], ambient: &AmbientContext) -> ExportReport {
        let mut outcomes = Vec::with_capacity(spans.len());
        let mut pending = Vec::new();

        for (index, span) in spans.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| self.span_to_log(span, ambient))) {
                Ok(Ok(log)) => {
                    outcomes.push(SpanOutcome::Logged);
                    pending.push((index, log));
                }
                Ok(Err(reason)) => {
                    debug!(span = %span.name, %reason, "Skipping span");
                    outcomes.push(SpanOutcome::Skipped(reason));
                }
                Err(panic) => {
                    let reason = format!("processing panicked: {}", panic_message(&*panic));
                    warn!(span = %span.name, %reason, "Dropping span");
                    outcomes.push(SpanOutcome::Failed(reason));
                }
            }
        }

        let deliveries = pending.iter().map(|(index, log)| async move {
            let result = AssertUnwindSafe(self.sink.handle(log)).catch_unwind().await;
            (*index, log, result)
        });

        for (index, log, result) in join_all(deliveries).await {
            let reason = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("sink panicked: {}", panic_message(&*panic)),
            };
            warn!(
                sink = self.sink.name(),
                model = %log.model,
                span_id = ?log.span_id,
                %reason,
                "Failed to deliver token log"
            );
            outcomes[index] = SpanOutcome::Failed(reason);
        }

        let report = ExportReport {
            result: ExportResult::Success,
            outcomes,
        };
        debug!(
            spans = spans.len(),
            logged = report.logged(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Exported span batch"
        );
        report
    }
}

/// Pick the model by priority: per-call override, response model, base
/// model id, requested model. Blank values are ignored.
pub fn resolve_model(attrs: &Attributes) -> String {
    [
        MODEL_OVERRIDE_KEYS,
        RESPONSE_MODEL_KEYS,
        BASE_MODEL_KEYS,
        REQUEST_MODEL_KEYS,
    ]
    .into_iter()
    .find_map(|keys| first_text(attrs, keys))
    .unwrap_or_else(|| UNKNOWN_MODEL.to_string())
}

fn finish_reason(attrs: &Attributes) -> Option<String> {
    FINISH_REASON_KEYS.iter().find_map(|key| {
        let value = get_attr(attrs, &[*key])?;
        match value.as_ref() {
            Value::Array(items) => items.first().and_then(as_text),
            other => as_text(other),
        }
    })
}

fn non_empty(id: &str) -> Option<String> {
    (!id.is_empty()).then(|| id.to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
