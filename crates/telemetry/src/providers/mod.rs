//! Provider usage normalization.
//!
//! SDKs report prompt tokens differently per provider. Some count cached
//! prompt tokens inside the input figure, some report cache writes only in
//! provider metadata. Each family module turns the SDK view into a
//! [`CanonicalUsage`] where every token is counted exactly once.

mod anthropic;
mod google;
mod mistral;
mod openai;
mod xai;

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;

use crate::attributes::{as_count, first_count, MaybeJson};
use crate::classify::CallSpan;
use crate::model::{Attributes, CanonicalUsage};

/// Attributes holding the provider-specific metadata document.
pub const PROVIDER_METADATA_KEYS: &[&str] = &[
    "ai.response.providerMetadata",
    "gen_ai.response.provider_metadata",
];

/// Attributes holding the SDK's own cached prompt token count.
pub const CACHED_INPUT_KEYS: &[&str] = &[
    "ai.usage.cachedInputTokens",
    "gen_ai.usage.cached_input_tokens",
];

/// Provider families with distinct usage semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    Anthropic,
    OpenAi,
    Google,
    Xai,
    Mistral,
    Unknown,
}

/// Substring → family, checked in order against the lowercased provider.
const FAMILY_PATTERNS: &[(&str, ProviderFamily)] = &[
    ("anthropic", ProviderFamily::Anthropic),
    ("openai", ProviderFamily::OpenAi),
    ("google", ProviderFamily::Google),
    ("gemini", ProviderFamily::Google),
    ("xai", ProviderFamily::Xai),
    ("grok", ProviderFamily::Xai),
    ("mistral", ProviderFamily::Mistral),
];

impl ProviderFamily {
    /// Detect the family from a provider string such as `openai.responses`
    /// or `google.generative-ai`.
    pub fn detect(provider: Option<&str>) -> Self {
        let Some(provider) = provider else {
            return Self::Unknown;
        };
        let lower = provider.to_ascii_lowercase();
        FAMILY_PATTERNS
            .iter()
            .find(|(pattern, _)| lower.contains(pattern))
            .map(|(_, family)| *family)
            .unwrap_or(Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Xai => "xai",
            Self::Mistral => "mistral",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage as the SDK reported it, before any provider correction.
pub fn sdk_usage(call: &CallSpan<'_>) -> CanonicalUsage {
    let cached = first_count(call.attributes(), CACHED_INPUT_KEYS).unwrap_or(0);
    CanonicalUsage::new(call.input_tokens, call.output_tokens).with_cache_read(cached)
}

/// Decode the provider metadata document. Malformed JSON is treated as
/// absent.
pub fn provider_metadata(attrs: &Attributes) -> Option<Cow<'_, Value>> {
    PROVIDER_METADATA_KEYS
        .iter()
        .find_map(|key| MaybeJson::from_value(attrs.get(*key)).decode())
}

/// Normalize SDK usage for the given provider.
///
/// Unknown providers, and known ones without any cache signal, get the SDK
/// usage back unchanged.
pub fn normalize_usage(
    provider: Option<&str>,
    attrs: &Attributes,
    sdk: CanonicalUsage,
) -> CanonicalUsage {
    let family = ProviderFamily::detect(provider);
    if family == ProviderFamily::Unknown {
        return sdk;
    }

    let metadata = provider_metadata(attrs);
    let metadata = metadata.as_deref();
    let cached_attr = first_count(attrs, CACHED_INPUT_KEYS)
        .or_else(|| (sdk.cache_read > 0).then_some(sdk.cache_read));

    let usage = match family {
        ProviderFamily::Anthropic => anthropic::normalize(sdk, metadata),
        ProviderFamily::OpenAi => openai::normalize(sdk, metadata, cached_attr),
        ProviderFamily::Google => google::normalize(sdk, metadata, cached_attr),
        ProviderFamily::Xai => xai::normalize(sdk, metadata, cached_attr),
        ProviderFamily::Mistral => mistral::normalize(sdk, metadata, cached_attr),
        ProviderFamily::Unknown => sdk,
    };

    if usage != sdk {
        tracing::trace!(%family, ?sdk, ?usage, "Normalized provider usage");
    }
    usage
}

// ── Shared helpers ────────────────────────────────────────────────────────

/// Deserialize one family's section of the metadata document.
fn family_section<T: DeserializeOwned>(metadata: Option<&Value>, key: &str) -> Option<T> {
    let section = metadata?.get(key).filter(|v| v.is_object())?;
    T::deserialize(section).ok()
}

/// Subtract cached prompt tokens for families that double count them.
///
/// The metadata figure wins; the dedicated SDK attribute is the fallback.
/// A zero metadata count means "not reported". With neither present the SDK
/// usage is returned as-is.
fn subtract_cached(
    sdk: CanonicalUsage,
    from_metadata: Option<u64>,
    cached_attr: Option<u64>,
) -> CanonicalUsage {
    match reported(from_metadata).or(cached_attr) {
        Some(cached) => sdk.split_cached_input(cached),
        None => sdk,
    }
}

/// Providers emit `0` for "no cache data"; only a positive count is a signal.
fn reported(count: Option<u64>) -> Option<u64> {
    count.filter(|&n| n > 0)
}

/// Token count field that tolerates strings, floats, nulls and junk.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(as_count))
}
