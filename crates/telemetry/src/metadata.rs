//! Per-call telemetry metadata set by the application.
//!
//! Applications attach `userId`, `workspaceId` and `modelName` to each AI
//! SDK call; the SDK flattens them into `ai.telemetry.metadata.*` span
//! attributes. Checking a `modelName` against the price catalog before the
//! call catches typos that would otherwise silently produce unpriced logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Attributes;
use crate::pricing::PriceCatalog;
use crate::TelemetryError;

/// Attribute prefix the AI SDK uses for call metadata.
pub const METADATA_PREFIX: &str = "ai.telemetry.metadata";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// Catalog model id that overrides whatever model the span reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl TelemetryMetadata {
    /// Reject empty strings and model names missing from `catalog`.
    pub fn validate(&self, catalog: &PriceCatalog) -> Result<(), TelemetryError> {
        for (field, value) in [
            ("userId", &self.user_id),
            ("workspaceId", &self.workspace_id),
            ("modelName", &self.model_name),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(TelemetryError::InvalidMetadata {
                    field,
                    reason: "must not be empty".into(),
                });
            }
        }

        if let Some(model) = &self.model_name {
            if !catalog.contains_model(model) {
                return Err(TelemetryError::InvalidMetadata {
                    field: "modelName",
                    reason: format!(
                        "unknown model {model:?}; use an id from the price catalog"
                    ),
                });
            }
        }

        Ok(())
    }

    /// Flatten into span attributes the way the AI SDK records them.
    pub fn to_attributes(&self) -> Attributes {
        [
            ("userId", &self.user_id),
            ("workspaceId", &self.workspace_id),
            ("modelName", &self.model_name),
        ]
        .into_iter()
        .filter_map(|(field, value)| {
            value
                .as_ref()
                .map(|v| (format!("{METADATA_PREFIX}.{field}"), Value::String(v.clone())))
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PriceEntry;

    fn catalog() -> PriceCatalog {
        PriceCatalog::from_entries([("openai/gpt-4o", PriceEntry::new("openai/gpt-4o", 2.5, 10.0))])
    }

    #[test]
    fn known_model_is_accepted() {
        let meta = TelemetryMetadata {
            user_id: Some("user-1".into()),
            model_name: Some("OpenAI/GPT-4o".into()),
            ..Default::default()
        };
        assert!(meta.validate(&catalog()).is_ok());
    }

    #[test]
    fn unknown_model_is_rejected() {
        let meta = TelemetryMetadata {
            model_name: Some("gpt-4o-typo".into()),
            ..Default::default()
        };
        let err = meta.validate(&catalog()).unwrap_err();
        assert!(err.to_string().contains("gpt-4o-typo"));
    }

    #[test]
    fn empty_fields_are_rejected() {
        let meta = TelemetryMetadata {
            workspace_id: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(
            meta.validate(&catalog()),
            Err(TelemetryError::InvalidMetadata { field: "workspaceId", .. })
        ));
    }

    #[test]
    fn flattens_to_sdk_attribute_keys() {
        let meta = TelemetryMetadata {
            user_id: Some("u".into()),
            workspace_id: None,
            model_name: Some("openai/gpt-4o".into()),
        };
        let attrs = meta.to_attributes();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["ai.telemetry.metadata.userId"], "u");
        assert_eq!(attrs["ai.telemetry.metadata.modelName"], "openai/gpt-4o");
    }

    #[test]
    fn deserializes_camel_case() {
        let meta: TelemetryMetadata =
            serde_json::from_str(r#"{"userId": "u", "workspaceId": "w", "extra": 1}"#).unwrap();
        assert_eq!(meta.user_id.as_deref(), Some("u"));
        assert_eq!(meta.workspace_id.as_deref(), Some("w"));
        assert_eq!(meta.model_name, None);
    }
}
