//! Decides which spans are billable provider calls.
//!
//! AI SDK instrumentation emits a wrapper span per logical call
//! (`ai.streamText`) and one child span per provider round-trip
//! (`ai.streamText.doStream`). Only the provider round-trips carry usage, so
//! only those are priced.

use serde_json::Value;

use crate::attributes::as_count;
use crate::model::{Attributes, Span};

/// The four provider-call operations that consume tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BillableOperation {
    GenerateText,
    StreamText,
    GenerateObject,
    StreamObject,
}

impl BillableOperation {
    pub const ALL: [Self; 4] = [
        Self::GenerateText,
        Self::StreamText,
        Self::GenerateObject,
        Self::StreamObject,
    ];

    /// The operation identifier as it appears in span names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateText => "ai.generateText.doGenerate",
            Self::StreamText => "ai.streamText.doStream",
            Self::GenerateObject => "ai.generateObject.doGenerate",
            Self::StreamObject => "ai.streamObject.doStream",
        }
    }

    /// Match a span name. Names may carry a function-id suffix, so this is a
    /// containment check.
    pub fn from_span_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| name.contains(op.as_str()))
    }
}

impl std::fmt::Display for BillableOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a span produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The span name is not a provider call.
    NotBillable,
    /// The name matched but a required attribute is missing or mistyped.
    MissingAttribute(&'static str),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotBillable => write!(f, "not a billable operation"),
            Self::MissingAttribute(key) => write!(f, "missing or invalid attribute {key}"),
        }
    }
}

/// Typed view over a span that passed validation.
#[derive(Debug, Clone)]
pub struct CallSpan<'a> {
    pub span: &'a Span,
    pub operation: BillableOperation,
    /// Provider system string (`gen_ai.system`).
    pub system: &'a str,
    /// Originally requested model (`gen_ai.request.model`).
    pub request_model: &'a str,
    /// SDK-reported prompt tokens.
    pub input_tokens: u64,
    /// SDK-reported completion tokens.
    pub output_tokens: u64,
}

impl<'a> CallSpan<'a> {
    pub fn attributes(&self) -> &'a Attributes {
        &self.span.attributes
    }
}

/// Classify a span, returning its typed view or the reason it is skipped.
pub fn classify(span: &Span) -> Result<CallSpan<'_>, SkipReason> {
    let operation = BillableOperation::from_span_name(&span.name).ok_or(SkipReason::NotBillable)?;
    let attrs = &span.attributes;

    non_empty_str(attrs, "operation.name")?;
    non_empty_str(attrs, "ai.operationId")?;
    let system = string(attrs, "gen_ai.system")?;
    let request_model = string(attrs, "gen_ai.request.model")?;
    let input_tokens = number(attrs, "gen_ai.usage.input_tokens")?;
    let output_tokens = number(attrs, "gen_ai.usage.output_tokens")?;

    Ok(CallSpan {
        span,
        operation,
        system,
        request_model,
        input_tokens,
        output_tokens,
    })
}

fn string<'a>(attrs: &'a Attributes, key: &'static str) -> Result<&'a str, SkipReason> {
    attrs
        .get(key)
        .and_then(Value::as_str)
        .ok_or(SkipReason::MissingAttribute(key))
}

fn non_empty_str<'a>(attrs: &'a Attributes, key: &'static str) -> Result<&'a str, SkipReason> {
    string(attrs, key)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or(SkipReason::MissingAttribute(key))
}

fn number(attrs: &Attributes, key: &'static str) -> Result<u64, SkipReason> {
    attrs
        .get(key)
        .filter(|v| v.is_number())
        .and_then(as_count)
        .ok_or(SkipReason::MissingAttribute(key))
}
