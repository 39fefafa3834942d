//! xAI (Grok) counts cached prompt tokens inside input. Metadata may be
//! keyed `xai` or `grok` depending on the SDK provider package.

use serde::Deserialize;
use serde_json::Value;

use super::{family_section, lenient_count, reported, subtract_cached};
use crate::model::CanonicalUsage;

#[derive(Debug, Default, Deserialize)]
struct XaiMetadata {
    #[serde(default)]
    usage: Option<XaiUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct XaiUsage {
    #[serde(default, deserialize_with = "lenient_count")]
    cached_tokens: Option<u64>,
}

pub(super) fn normalize(
    sdk: CanonicalUsage,
    metadata: Option<&Value>,
    cached_attr: Option<u64>,
) -> CanonicalUsage {
    let reported = ["xai", "grok"].into_iter().find_map(|key| {
        family_section::<XaiMetadata>(metadata, key)
            .and_then(|meta| meta.usage)
            .and_then(|u| reported(u.cached_tokens))
    });
    subtract_cached(sdk, reported, cached_attr)
}

#[cfg(test)]
mod tests {
    use crate::model::CanonicalUsage;
    use crate::providers::normalize_usage;
    use crate::providers::tests::attrs;
    use serde_json::json;

    #[test]
    fn xai_keyed_metadata() {
        let a = attrs(json!({
            "ai.response.providerMetadata": {"xai": {"usage": {"cached_tokens": 100}}}
        }));
        let usage = normalize_usage(Some("xai.chat"), &a, CanonicalUsage::new(300, 1));
        assert_eq!(usage, CanonicalUsage::new(200, 1).with_cache_read(100));
    }

    #[test]
    fn xai_key_wins_over_grok() {
        let a = attrs(json!({
            "ai.response.providerMetadata": {
                "xai": {"usage": {"cached_tokens": 100}},
                "grok": {"usage": {"cached_tokens": 250}}
            }
        }));
        let usage = normalize_usage(Some("xai.chat"), &a, CanonicalUsage::new(300, 1));
        assert_eq!(usage, CanonicalUsage::new(200, 1).with_cache_read(100));
    }

    #[test]
    fn zero_xai_count_defers_to_grok() {
        let a = attrs(json!({
            "ai.response.providerMetadata": {
                "xai": {"usage": {"cached_tokens": 0}},
                "grok": {"usage": {"cached_tokens": 250}}
            }
        }));
        let usage = normalize_usage(Some("grok-3"), &a, CanonicalUsage::new(300, 1));
        assert_eq!(usage, CanonicalUsage::new(50, 1).with_cache_read(250));
    }

    #[test]
    fn grok_keyed_metadata() {
        let a = attrs(json!({
            "ai.response.providerMetadata": {"grok": {"usage": {"cached_tokens": 1000}}}
        }));
        let usage = normalize_usage(Some("xai.chat"), &a, CanonicalUsage::new(2166, 598));
        assert_eq!(usage, CanonicalUsage::new(1166, 598).with_cache_read(1000));
    }

    #[test]
    fn no_cache_signal_is_unchanged() {
        let a = attrs(json!({}));
        let sdk = CanonicalUsage::new(2166, 598);
        assert_eq!(normalize_usage(Some("xai.chat"), &a, sdk), sdk);
    }
}
