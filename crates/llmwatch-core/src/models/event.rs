//! Usage event data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded LLM call, as ingested by the (out-of-scope) collection API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique identifier
    pub id: Uuid,

    /// Owning organization
    pub org_id: Uuid,

    /// Model provider (e.g., "openai", "anthropic")
    pub provider: String,

    /// Model name (e.g., "gpt-4o", "claude-3-5-sonnet")
    pub model: String,

    /// Optional deployment/version tag attached by the SDK
    pub version_tag: Option<String>,

    /// Optional session identifier for grouping calls
    pub session_id: Option<String>,

    /// HTTP-style status of the upstream call (>= 400 counts as an error)
    pub status: i32,

    /// End-to-end latency in milliseconds, when measured
    pub latency_ms: Option<f64>,

    /// Input tokens
    pub prompt_tokens: i64,

    /// Output tokens
    pub completion_tokens: i64,

    /// Cost in USD
    pub cost_usd: f64,

    /// When the call was recorded
    pub created_at: DateTime<Utc>,
}

impl UsageEvent {
    /// Total tokens consumed by this call
    pub fn total_tokens(&self) -> i64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Whether the upstream call failed
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Optional allow-lists narrowing which events a metric is computed over.
///
/// `None` or an empty list means no restriction on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionFilters {
    /// Providers to include
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<String>>,

    /// Models to include
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,

    /// Version tags to include
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_tags: Option<Vec<String>>,

    /// Session ids to include
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_ids: Option<Vec<String>>,
}

impl DimensionFilters {
    /// Check whether an event passes every configured allow-list
    pub fn matches(&self, event: &UsageEvent) -> bool {
        fn allowed(list: &Option<Vec<String>>, value: Option<&str>) -> bool {
            match list {
                Some(values) if !values.is_empty() => {
                    value.is_some_and(|v| values.iter().any(|allow| allow == v))
                }
                _ => true,
            }
        }

        allowed(&self.providers, Some(&event.provider))
            && allowed(&self.models, Some(&event.model))
            && allowed(&self.version_tags, event.version_tag.as_deref())
            && allowed(&self.session_ids, event.session_id.as_deref())
    }

    /// Whether no dimension is restricted
    pub fn is_empty(&self) -> bool {
        fn unset(list: &Option<Vec<String>>) -> bool {
            list.as_ref().map_or(true, |v| v.is_empty())
        }

        unset(&self.providers)
            && unset(&self.models)
            && unset(&self.version_tags)
            && unset(&self.session_ids)
    }
}
