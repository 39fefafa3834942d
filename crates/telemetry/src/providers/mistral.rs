use serde::Deserialize;
use serde_json::Value;

use super::{family_section, lenient_count, subtract_cached};
use crate::model::CanonicalUsage;

#[derive(Debug, Default, Deserialize)]
struct MistralMetadata {
    #[serde(default)]
    usage: Option<MistralUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct MistralUsage {
    #[serde(default, deserialize_with = "lenient_count")]
    cached_tokens: Option<u64>,
}

pub(super) fn normalize(
    sdk: CanonicalUsage,
    metadata: Option<&Value>,
    cached_attr: Option<u64>,
) -> CanonicalUsage {
    let reported = family_section::<MistralMetadata>(metadata, "mistral")
        .and_then(|meta| meta.usage)
        .and_then(|u| u.cached_tokens);
    subtract_cached(sdk, reported, cached_attr)
}

#[cfg(test)]
mod tests {
    use crate::model::CanonicalUsage;
    use crate::providers::normalize_usage;
    use crate::providers::tests::attrs;
    use serde_json::json;

    #[test]
    fn cached_tokens_subtracted() {
        let a = attrs(json!({
            "gen_ai.response.provider_metadata": "{\"mistral\":{\"usage\":{\"cached_tokens\":\"216\"}}}"
        }));
        let usage = normalize_usage(Some("mistral.chat"), &a, CanonicalUsage::new(2216, 740));
        assert_eq!(usage, CanonicalUsage::new(2000, 740).with_cache_read(216));
    }

    #[test]
    fn plain_usage_unchanged() {
        let sdk = CanonicalUsage::new(2216, 740);
        assert_eq!(normalize_usage(Some("mistral.chat"), &attrs(json!({})), sdk), sdk);
    }
}
