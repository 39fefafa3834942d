//! Gemini includes cached content in the prompt token count.

use serde::Deserialize;
use serde_json::Value;

use super::{family_section, lenient_count, subtract_cached};
use crate::model::CanonicalUsage;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleMetadata {
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default, deserialize_with = "lenient_count")]
    cached_content_token_count: Option<u64>,
}

pub(super) fn normalize(
    sdk: CanonicalUsage,
    metadata: Option<&Value>,
    cached_attr: Option<u64>,
) -> CanonicalUsage {
    let reported = family_section::<GoogleMetadata>(metadata, "google")
        .and_then(|meta| meta.usage_metadata)
        .and_then(|u| u.cached_content_token_count);
    subtract_cached(sdk, reported, cached_attr)
}

#[cfg(test)]
mod tests {
    use crate::model::CanonicalUsage;
    use crate::providers::normalize_usage;
    use crate::providers::tests::attrs;
    use serde_json::json;

    #[test]
    fn cached_content_is_subtracted() {
        let a = attrs(json!({
            "ai.response.providerMetadata": {
                "google": {"usageMetadata": {"cachedContentTokenCount": 120}}
            }
        }));
        let usage = normalize_usage(Some("google.generative-ai"), &a, CanonicalUsage::new(220, 30));
        assert_eq!(usage, CanonicalUsage::new(100, 30).with_cache_read(120));
    }

    #[test]
    fn gemini_alias_and_attribute_fallback() {
        let a = attrs(json!({"gen_ai.usage.cached_input_tokens": 2025}));
        let usage = normalize_usage(Some("vertex.gemini"), &a, CanonicalUsage::new(2414, 239));
        assert_eq!(usage, CanonicalUsage::new(389, 239).with_cache_read(2025));
    }

    #[test]
    fn zero_metadata_count_falls_back_to_attribute() {
        let a = attrs(json!({
            "ai.usage.cachedInputTokens": 2025,
            "ai.response.providerMetadata": {
                "google": {"usageMetadata": {"cachedContentTokenCount": 0}}
            }
        }));
        let sdk = CanonicalUsage::new(2414, 239);
        let usage = normalize_usage(Some("google.generative-ai"), &a, sdk);
        assert_eq!(usage, CanonicalUsage::new(389, 239).with_cache_read(2025));
    }

    #[test]
    fn no_cache_signal_is_unchanged() {
        let a = attrs(json!({"ai.response.providerMetadata": {"google": {"usageMetadata": {}}}}));
        let sdk = CanonicalUsage::new(2414, 532);
        assert_eq!(normalize_usage(Some("google.generative-ai"), &a, sdk), sdk);
    }
}
