//! OpenAI counts cached prompt tokens inside `input_tokens`.

use serde::Deserialize;
use serde_json::Value;

use super::{family_section, lenient_count, reported, subtract_cached};
use crate::model::CanonicalUsage;

#[derive(Debug, Default, Deserialize)]
struct OpenAiMetadata {
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    /// Older SDK releases put the count at the top level.
    #[serde(default, rename = "cachedPromptTokens", deserialize_with = "lenient_count")]
    cached_prompt_tokens: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default, deserialize_with = "lenient_count")]
    cached_input_tokens: Option<u64>,
}

pub(super) fn normalize(
    sdk: CanonicalUsage,
    metadata: Option<&Value>,
    cached_attr: Option<u64>,
) -> CanonicalUsage {
    let reported = family_section::<OpenAiMetadata>(metadata, "openai").and_then(|meta| {
        meta.usage
            .and_then(|u| reported(u.cached_input_tokens))
            .or(meta.cached_prompt_tokens)
    });
    subtract_cached(sdk, reported, cached_attr)
}
