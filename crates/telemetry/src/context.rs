//! Attribution of calls to a user and workspace.
//!
//! Each field is resolved on its own, first non-empty of:
//! 1. span attributes under the configured key lists
//! 2. the caller's context callback
//! 3. the [`AmbientContext`] passed to the export call

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::attributes::first_text;
use crate::model::{Attributes, Span};

/// Who a call is billed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            workspace_id: Some(workspace_id.into()),
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            workspace_id: None,
        }
    }

    pub fn workspace(workspace_id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            workspace_id: Some(workspace_id.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.workspace_id.is_none()
    }

    /// Fill unset (or blank) fields from `fallback`.
    pub fn or(self, fallback: &Identity) -> Identity {
        Identity {
            user_id: non_blank(self.user_id).or_else(|| non_blank(fallback.user_id.clone())),
            workspace_id: non_blank(self.workspace_id)
                .or_else(|| non_blank(fallback.workspace_id.clone())),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Caller-supplied context lookup, consulted after span attributes.
pub type ContextCallback = Arc<dyn Fn(&Span, &Attributes) -> Option<Identity> + Send + Sync>;

/// Identity known to the caller outside of span attributes.
///
/// A session-wide default plus per-trace scopes. A scope inherits any field
/// it leaves unset from the default.
#[derive(Debug, Clone, Default)]
pub struct AmbientContext {
    default: Identity,
    scopes: HashMap<String, Identity>,
}

impl AmbientContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with a session-wide default identity.
    pub fn with_default(identity: Identity) -> Self {
        Self {
            default: identity,
            scopes: HashMap::new(),
        }
    }

    /// Attach an identity to every span of one trace.
    pub fn with_trace(mut self, trace_id: impl Into<String>, identity: Identity) -> Self {
        self.scopes.insert(trace_id.into(), identity);
        self
    }

    /// Attach an identity to a trace in place.
    pub fn enter_trace(&mut self, trace_id: impl Into<String>, identity: Identity) {
        self.scopes.insert(trace_id.into(), identity);
    }

    /// Drop a trace scope once the trace is finished.
    pub fn exit_trace(&mut self, trace_id: &str) -> Option<Identity> {
        self.scopes.remove(trace_id)
    }

    /// Effective identity for a trace.
    pub fn for_trace(&self, trace_id: &str) -> Identity {
        match self.scopes.get(trace_id) {
            Some(scoped) => scoped.clone().or(&self.default),
            None => self.default.clone(),
        }
    }
}

/// Attribute key lists searched for identity fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKeys {
    pub user_id: Vec<String>,
    pub workspace_id: Vec<String>,
}

impl Default for IdentityKeys {
    fn default() -> Self {
        let owned = |keys: &[&str]| keys.iter().map(|k| k.to_string()).collect();
        Self {
            user_id: owned(spancost_config::DEFAULT_USER_ID_ATTRIBUTES),
            workspace_id: owned(spancost_config::DEFAULT_WORKSPACE_ID_ATTRIBUTES),
        }
    }
}

/// Resolve the identity for one span.
///
/// The callback runs at most once, and only when attributes leave a field
/// unresolved.
pub fn resolve_context(
    span: &Span,
    keys: &IdentityKeys,
    callback: Option<&ContextCallback>,
    ambient: &AmbientContext,
) -> Identity {
    let attrs = &span.attributes;
    let from_attributes = Identity {
        user_id: first_text(attrs, &keys.user_id),
        workspace_id: first_text(attrs, &keys.workspace_id),
    };
    if from_attributes.user_id.is_some() && from_attributes.workspace_id.is_some() {
        return from_attributes;
    }

    let from_callback = callback
        .and_then(|cb| cb(span, attrs))
        .unwrap_or_default();

    from_attributes
        .or(&from_callback)
        .or(&ambient.for_trace(&span.trace_id))
}
