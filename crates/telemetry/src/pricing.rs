//! Price catalog and cost computation.
//!
//! Token rates are USD per 1 million tokens; `request_usd` is a flat
//! per-call charge. Keys are stored lowercased so lookups are
//! case-insensitive. The catalog is immutable once built and is shared
//! between exporters behind an `Arc`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use spancost_core::error::CatalogError;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::CanonicalUsage;

/// Pricing for one model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceEntry {
    /// Catalog model id (e.g. `openai/gpt-4o`).
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_per_1m_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_per_1m_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_search_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_reasoning_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cache_read_per_1m_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cache_write_per_1m_usd: Option<f64>,
    /// Provider-specific charges with no dedicated field.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "nullable_extras"
    )]
    pub extras: BTreeMap<String, f64>,
}

impl PriceEntry {
    /// Entry with prompt and completion rates only.
    pub fn new(model: impl Into<String>, prompt_per_1m: f64, completion_per_1m: f64) -> Self {
        Self {
            model: model.into(),
            prompt_per_1m_usd: Some(prompt_per_1m),
            completion_per_1m_usd: Some(completion_per_1m),
            ..Self::default()
        }
    }

    pub fn with_cache_rates(mut self, read_per_1m: f64, write_per_1m: f64) -> Self {
        self.input_cache_read_per_1m_usd = Some(read_per_1m);
        self.input_cache_write_per_1m_usd = Some(write_per_1m);
        self
    }

    pub fn with_request_usd(mut self, request_usd: f64) -> Self {
        self.request_usd = Some(request_usd);
        self
    }

    fn rates(&self) -> impl Iterator<Item = (&str, f64)> {
        [
            ("prompt_per_1m_usd", self.prompt_per_1m_usd),
            ("completion_per_1m_usd", self.completion_per_1m_usd),
            ("request_usd", self.request_usd),
            ("image_usd", self.image_usd),
            ("web_search_usd", self.web_search_usd),
            ("internal_reasoning_usd", self.internal_reasoning_usd),
            ("input_cache_read_per_1m_usd", self.input_cache_read_per_1m_usd),
            ("input_cache_write_per_1m_usd", self.input_cache_write_per_1m_usd),
        ]
        .into_iter()
        .filter_map(|(name, rate)| rate.map(|r| (name, r)))
        .chain(self.extras.iter().map(|(name, r)| (name.as_str(), *r)))
    }

    fn validate(&self, key: &str) -> Result<(), CatalogError> {
        if self.model.trim().is_empty() {
            return Err(CatalogError::InvalidEntry {
                key: key.to_string(),
                reason: "model id is empty".into(),
            });
        }
        if let Some((name, rate)) = self.rates().find(|(_, r)| !r.is_finite() || *r < 0.0) {
            return Err(CatalogError::InvalidEntry {
                key: key.to_string(),
                reason: format!("{name} must be a non-negative number, got {rate}"),
            });
        }
        Ok(())
    }
}

fn nullable_extras<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Option<f64>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect())
}

// ── Catalog ───────────────────────────────────────────────────────────────

/// Case-insensitive model key → price entry map.
///
/// Several keys may point at the same entry (an OpenRouter id, its
/// canonical slug and its short name).
#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    entries: BTreeMap<String, Arc<PriceEntry>>,
}

impl PriceCatalog {
    /// Create an empty catalog. Every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(key, entry)` pairs. Later duplicates win.
    pub fn from_entries<K: AsRef<str>>(entries: impl IntoIterator<Item = (K, PriceEntry)>) -> Self {
        let mut catalog = Self::empty();
        for (key, entry) in entries {
            catalog.insert(key.as_ref(), Arc::new(entry));
        }
        catalog
    }

    /// Parse the packaged catalog format: a JSON object keyed by model id.
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let parsed: BTreeMap<String, PriceEntry> =
            serde_json::from_str(raw).map_err(|e| CatalogError::Parse(e.to_string()))?;

        for (key, entry) in &parsed {
            entry.validate(key)?;
        }

        let catalog = Self::from_entries(parsed);
        tracing::debug!(models = catalog.len(), "Loaded price catalog");
        Ok(catalog)
    }

    /// Convert an OpenRouter `/api/v1/models` response body.
    ///
    /// OpenRouter quotes token prices per token as strings; those are
    /// scaled to per-1M rates. Each model is indexed under its id, its
    /// canonical slug and the segment after the last `/`.
    pub fn from_openrouter_models(payload: &Value) -> Result<Self, CatalogError> {
        let payload = OpenRouterPayload::deserialize(payload)
            .map_err(|e| CatalogError::Parse(format!("unexpected OpenRouter payload: {e}")))?;

        let mut catalog = Self::empty();
        for model in payload.data {
            let entry = Arc::new(model.to_entry());
            let primary = model.id.to_lowercase();

            catalog.insert(&primary, Arc::clone(&entry));
            if let Some(slug) = model.canonical_slug.as_deref().filter(|s| !s.is_empty()) {
                catalog.insert(slug, Arc::clone(&entry));
            }
            if let Some((_, short)) = primary.rsplit_once('/').filter(|(_, s)| !s.is_empty()) {
                catalog.insert(short, entry);
            }
        }

        tracing::debug!(keys = catalog.len(), "Converted OpenRouter pricing");
        Ok(catalog)
    }

    /// Built-in prices for common models, keyed by OpenRouter-style ids.
    pub fn with_defaults() -> Self {
        Self::from_entries([
            // ── Anthropic ──────────────────────────────────────────────
            (
                "anthropic/claude-sonnet-4",
                PriceEntry::new("anthropic/claude-sonnet-4", 3.0, 15.0).with_cache_rates(0.3, 3.75),
            ),
            (
                "anthropic/claude-opus-4",
                PriceEntry::new("anthropic/claude-opus-4", 15.0, 75.0).with_cache_rates(1.5, 18.75),
            ),
            (
                "anthropic/claude-3.5-haiku",
                PriceEntry::new("anthropic/claude-3.5-haiku", 0.8, 4.0).with_cache_rates(0.08, 1.0),
            ),
            // ── OpenAI ─────────────────────────────────────────────────
            (
                "openai/gpt-4o",
                PriceEntry::new("openai/gpt-4o", 2.5, 10.0).with_cache_rates(1.25, 0.0),
            ),
            (
                "openai/gpt-4o-mini",
                PriceEntry::new("openai/gpt-4o-mini", 0.15, 0.6).with_cache_rates(0.075, 0.0),
            ),
            (
                "openai/gpt-4.1",
                PriceEntry::new("openai/gpt-4.1", 2.0, 8.0).with_cache_rates(0.5, 0.0),
            ),
            (
                "openai/o3-mini",
                PriceEntry::new("openai/o3-mini", 1.1, 4.4).with_cache_rates(0.55, 0.0),
            ),
            // ── Google ─────────────────────────────────────────────────
            (
                "google/gemini-2.0-flash",
                PriceEntry::new("google/gemini-2.0-flash", 0.1, 0.4).with_cache_rates(0.025, 0.0),
            ),
            (
                "google/gemini-2.5-pro",
                PriceEntry::new("google/gemini-2.5-pro", 1.25, 10.0).with_cache_rates(0.31, 0.0),
            ),
            // ── xAI ────────────────────────────────────────────────────
            (
                "x-ai/grok-3",
                PriceEntry::new("x-ai/grok-3", 3.0, 15.0).with_cache_rates(0.75, 0.0),
            ),
            ("x-ai/grok-3-mini", PriceEntry::new("x-ai/grok-3-mini", 0.3, 0.5)),
            // ── Mistral ────────────────────────────────────────────────
            (
                "mistralai/mistral-large",
                PriceEntry::new("mistralai/mistral-large", 2.0, 6.0),
            ),
            (
                "mistralai/mistral-small",
                PriceEntry::new("mistralai/mistral-small", 0.2, 0.6),
            ),
        ])
    }

    fn insert(&mut self, key: &str, entry: Arc<PriceEntry>) {
        self.entries.insert(key.to_lowercase(), entry);
    }

    /// Look up a price for `model` as reported by `provider`.
    ///
    /// Tries the bare model first, then the provider's leading fragment
    /// joined with `/`, `:` and `-` (`openai.responses` + `gpt-4o` tries
    /// `openai/gpt-4o`). No prefix or fuzzy matching.
    pub fn resolve(&self, provider: Option<&str>, model: &str) -> Option<&PriceEntry> {
        let model = model.to_lowercase();
        if let Some(entry) = self.entries.get(&model) {
            return Some(entry.as_ref());
        }

        let fragment = provider.and_then(provider_fragment)?;
        ['/', ':', '-']
            .into_iter()
            .find_map(|sep| self.entries.get(&format!("{fragment}{sep}{model}")))
            .map(Arc::as_ref)
    }

    /// Whether `model` is a catalog key (case-insensitive).
    pub fn contains_model(&self, model: &str) -> bool {
        self.entries.contains_key(&model.to_lowercase())
    }

    /// All catalog keys, sorted.
    pub fn models(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Leading lowercase alphanumeric run of a provider string
/// (`google.generative-ai` → `google`).
fn provider_fragment(provider: &str) -> Option<String> {
    let lower = provider.to_lowercase();
    let fragment: String = lower
        .chars()
        .take_while(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();
    (!fragment.is_empty()).then_some(fragment)
}

// ── OpenRouter conversion ─────────────────────────────────────────────────

const PER_TOKEN_SCALE: f64 = 1_000_000.0;

const KNOWN_PRICING_KEYS: &[&str] = &[
    "prompt",
    "completion",
    "request",
    "image",
    "web_search",
    "internal_reasoning",
    "input_cache_read",
    "input_cache_write",
];

#[derive(Debug, Deserialize)]
struct OpenRouterPayload {
    data: Vec<OpenRouterModel>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterModel {
    id: String,
    #[serde(default)]
    canonical_slug: Option<String>,
    #[serde(default)]
    pricing: Option<serde_json::Map<String, Value>>,
}

impl OpenRouterModel {
    fn to_entry(&self) -> PriceEntry {
        let empty = serde_json::Map::new();
        let pricing = self.pricing.as_ref().unwrap_or(&empty);
        let rate = |key: &str| pricing.get(key).and_then(price_number);
        let per_1m = |key: &str| rate(key).map(|r| round_decimals(r * PER_TOKEN_SCALE, 9));

        let extras = pricing
            .iter()
            .filter(|(key, _)| !KNOWN_PRICING_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| price_number(value).map(|n| (key.clone(), n)))
            .collect();

        PriceEntry {
            model: self.id.clone(),
            prompt_per_1m_usd: per_1m("prompt"),
            completion_per_1m_usd: per_1m("completion"),
            request_usd: rate("request"),
            image_usd: rate("image"),
            web_search_usd: rate("web_search"),
            internal_reasoning_usd: rate("internal_reasoning"),
            input_cache_read_per_1m_usd: per_1m("input_cache_read"),
            input_cache_write_per_1m_usd: per_1m("input_cache_write"),
            extras,
        }
    }
}

/// OpenRouter prices arrive as numbers or numeric strings. Negative values
/// mark variable pricing and are treated as unknown.
fn price_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n >= 0.0).then_some(n)
}

// ── Cost ──────────────────────────────────────────────────────────────────

/// Cost of one call in US cents, or `None` when no price is known.
///
/// The USD figure is rounded to 12 decimals before conversion and the cent
/// figure to 6 decimals, so identical inputs always produce identical
/// output.
pub fn compute_cost_cents(usage: &CanonicalUsage, price: Option<&PriceEntry>) -> Option<f64> {
    let price = price?;
    let per_token = |rate: Option<f64>| rate.unwrap_or(0.0) / PER_TOKEN_SCALE;

    let usd = usage.input as f64 * per_token(price.prompt_per_1m_usd)
        + usage.output as f64 * per_token(price.completion_per_1m_usd)
        + usage.cache_read as f64 * per_token(price.input_cache_read_per_1m_usd)
        + usage.cache_write as f64 * per_token(price.input_cache_write_per_1m_usd)
        + price.request_usd.unwrap_or(0.0);

    let usd = round_decimals(usd, 12);
    Some(round_decimals(usd * 100.0, 6))
}

fn round_decimals(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn keys_are_case_insensitive() {
        let catalog = PriceCatalog::from_entries([(
            "OpenAI/GPT-4o",
            PriceEntry::new("openai/gpt-4o", 2.5, 10.0),
        )]);
        assert!(catalog.contains_model("openai/gpt-4o"));
        assert!(catalog.contains_model("OPENAI/gpt-4O"));
        assert_eq!(catalog.models(), vec!["openai/gpt-4o"]);
    }

    #[test]
    fn resolve_bare_model_first() {
        let catalog = PriceCatalog::from_entries([
            ("gpt-4o", PriceEntry::new("bare", 1.0, 1.0)),
            ("openai/gpt-4o", PriceEntry::new("prefixed", 2.0, 2.0)),
        ]);
        assert_eq!(catalog.resolve(Some("openai.chat"), "GPT-4o").unwrap().model, "bare");
    }

    #[test]
    fn resolve_with_provider_fragment() {
        let catalog = PriceCatalog::from_entries([
            ("openai/gpt-4o", PriceEntry::new("slash", 2.0, 2.0)),
            ("google:gemini-2.0-flash", PriceEntry::new("colon", 1.0, 1.0)),
            ("mistral-large", PriceEntry::new("dash", 1.0, 1.0)),
        ]);
        assert_eq!(catalog.resolve(Some("openai.responses"), "gpt-4o").unwrap().model, "slash");
        assert_eq!(
            catalog.resolve(Some("google.generative-ai"), "gemini-2.0-flash").unwrap().model,
            "colon"
        );
        assert_eq!(catalog.resolve(Some("mistral.chat"), "large").unwrap().model, "dash");
    }

    #[test]
    fn resolve_miss() {
        let catalog = PriceCatalog::with_defaults();
        assert!(catalog.resolve(None, "gpt-4o").is_none());
        assert!(catalog.resolve(Some(".openai"), "gpt-4o").is_none());
        // No prefix matching on dated model ids.
        assert!(catalog.resolve(Some("openai"), "gpt-4o-2024-08-06").is_none());
        assert!(PriceCatalog::empty().resolve(Some("openai"), "gpt-4o").is_none());
    }

    #[test]
    fn provider_fragment_extraction() {
        assert_eq!(provider_fragment("Google.Generative-AI").as_deref(), Some("google"));
        assert_eq!(provider_fragment("xai").as_deref(), Some("xai"));
        assert_eq!(provider_fragment("-openai"), None);
        assert_eq!(provider_fragment(""), None);
    }

    #[test]
    fn from_json_str_parses_packaged_format() {
        let raw = r#"{
            "OpenAI/GPT-4o-mini": {
                "model": "openai/gpt-4o-mini",
                "prompt_per_1m_usd": 0.15,
                "completion_per_1m_usd": 0.6,
                "request_usd": null,
                "extras": {"audio": 40.0, "video": null}
            }
        }"#;
        let catalog = PriceCatalog::from_json_str(raw).unwrap();
        let entry = catalog.resolve(None, "openai/gpt-4o-mini").unwrap();
        assert_eq!(entry.prompt_per_1m_usd, Some(0.15));
        assert_eq!(entry.request_usd, None);
        assert_eq!(entry.extras.len(), 1);
        assert_eq!(entry.extras["audio"], 40.0);
    }

    #[test]
    fn from_json_str_rejects_bad_input() {
        assert!(matches!(
            PriceCatalog::from_json_str("[1, 2]"),
            Err(CatalogError::Parse(_))
        ));
        assert!(matches!(
            PriceCatalog::from_json_str(r#"{"m": {"model": "m", "prompt_per_1m_usd": -1}}"#),
            Err(CatalogError::InvalidEntry { .. })
        ));
        assert!(matches!(
            PriceCatalog::from_json_str(r#"{"m": {"model": " "}}"#),
            Err(CatalogError::InvalidEntry { .. })
        ));
    }

    #[test]
    fn openrouter_conversion() {
        let payload = json!({
            "data": [
                {
                    "id": "openai/gpt-4o",
                    "canonical_slug": "openai/gpt-4o-2024-05-13",
                    "pricing": {
                        "prompt": "0.0000025",
                        "completion": "0.00001",
                        "request": "0",
                        "input_cache_read": "0.00000125",
                        "audio": "0.00004",
                        "discount": 0,
                        "notes": "n/a"
                    }
                },
                {"id": "openrouter/auto", "pricing": {"prompt": "-1", "completion": "-1"}},
                {"id": "local-model"}
            ]
        });
        let catalog = PriceCatalog::from_openrouter_models(&payload).unwrap();

        assert!(catalog.contains_model("openai/gpt-4o"));
        assert!(catalog.contains_model("openai/gpt-4o-2024-05-13"));
        assert!(catalog.contains_model("gpt-4o"));
        assert!(catalog.contains_model("auto"));
        assert!(catalog.contains_model("local-model"));

        let entry = catalog.resolve(None, "gpt-4o").unwrap();
        assert_eq!(entry.model, "openai/gpt-4o");
        assert!(approx(entry.prompt_per_1m_usd.unwrap(), 2.5));
        assert!(approx(entry.completion_per_1m_usd.unwrap(), 10.0));
        assert!(approx(entry.input_cache_read_per_1m_usd.unwrap(), 1.25));
        assert_eq!(entry.request_usd, Some(0.0));
        assert_eq!(entry.extras.len(), 2);
        assert!(approx(entry.extras["audio"], 0.00004));

        let auto = catalog.resolve(None, "openrouter/auto").unwrap();
        assert_eq!(auto.prompt_per_1m_usd, None);
    }

    #[test]
    fn openrouter_rejects_unexpected_shape() {
        assert!(PriceCatalog::from_openrouter_models(&json!({"models": []})).is_err());
        assert!(PriceCatalog::from_openrouter_models(&json!({"data": [{"name": "x"}]})).is_err());
    }

    #[test]
    fn cost_none_without_price() {
        assert_eq!(compute_cost_cents(&CanonicalUsage::new(100, 100), None), None);
    }

    #[test]
    fn cost_uses_per_million_rates() {
        let price = PriceEntry::new("openai/gpt-4o", 2.5, 10.0).with_cache_rates(1.25, 0.0);
        let usage = CanonicalUsage::new(173, 444).with_cache_read(2048);
        // 173 * 2.5e-6 + 444 * 1e-5 + 2048 * 1.25e-6 = 0.0074325 USD
        let cents = compute_cost_cents(&usage, Some(&price)).unwrap();
        assert!(approx(cents, 0.74325));
    }

    #[test]
    fn cost_includes_cache_write_and_request_fee() {
        let price = PriceEntry::new("anthropic/claude-sonnet-4", 3.0, 15.0)
            .with_cache_rates(0.3, 3.75)
            .with_request_usd(0.001);
        let usage = CanonicalUsage::new(4, 138).with_cache_write(2906);
        // 4*3e-6 + 138*1.5e-5 + 2906*3.75e-6 + 0.001 = 0.0139795 USD
        let cents = compute_cost_cents(&usage, Some(&price)).unwrap();
        assert!(approx(cents, 1.39795));
    }

    #[test]
    fn cost_is_deterministic_and_rounded() {
        let price = PriceEntry::new("m", 0.15, 0.6);
        let usage = CanonicalUsage::new(1, 1);
        let a = compute_cost_cents(&usage, Some(&price)).unwrap();
        let b = compute_cost_cents(&usage, Some(&price)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 0.000075);
    }

    #[test]
    fn missing_rates_count_as_zero() {
        let price = PriceEntry {
            model: "m".into(),
            request_usd: Some(0.02),
            ..PriceEntry::default()
        };
        assert_eq!(
            compute_cost_cents(&CanonicalUsage::new(5000, 5000), Some(&price)),
            Some(2.0)
        );
    }

    #[test]
    fn defaults_cover_common_families() {
        let catalog = PriceCatalog::with_defaults();
        assert!(catalog.resolve(Some("openai.responses"), "gpt-4o-mini").is_some());
        assert!(catalog.resolve(Some("anthropic.messages"), "claude-sonnet-4").is_some());
        assert!(catalog.resolve(Some("google.generative-ai"), "gemini-2.0-flash").is_some());
        assert!(!catalog.is_empty());
    }
}
