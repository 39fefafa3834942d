//! Anthropic reports cached prompt tokens separately from input, so nothing
//! is subtracted. Cache writes are only visible in provider metadata.

use serde::Deserialize;
use serde_json::Value;

use super::{family_section, lenient_count, reported};
use crate::model::CanonicalUsage;

#[derive(Debug, Default, Deserialize)]
struct AnthropicMetadata {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
    #[serde(default, rename = "cacheCreationInputTokens", deserialize_with = "lenient_count")]
    cache_creation_input_tokens: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default, deserialize_with = "lenient_count")]
    cache_creation_input_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    cache_read_input_tokens: Option<u64>,
}

pub(super) fn normalize(sdk: CanonicalUsage, metadata: Option<&Value>) -> CanonicalUsage {
    let Some(meta) = family_section::<AnthropicMetadata>(metadata, "anthropic") else {
        return sdk;
    };
    if meta.usage.is_none() && meta.cache_creation_input_tokens.is_none() {
        return sdk;
    }

    let usage = meta.usage.unwrap_or_default();
    let cache_write = reported(usage.cache_creation_input_tokens)
        .or(meta.cache_creation_input_tokens)
        .unwrap_or(0);
    let cache_read = reported(usage.cache_read_input_tokens).unwrap_or(sdk.cache_read);

    CanonicalUsage::new(sdk.input, sdk.output)
        .with_cache_read(cache_read)
        .with_cache_write(cache_write)
}
