//! Webhook configuration and delivery data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type emitted when an alert trigger is recorded
pub const EVENT_ALERT_TRIGGERED: &str = "alert.triggered";

/// A tenant-owned webhook endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Unique identifier
    pub id: Uuid,

    /// Owning organization
    pub org_id: Uuid,

    /// Human-readable name
    pub name: String,

    /// Endpoint URL
    pub url: String,

    /// HMAC signing secret, when signing is enabled
    pub secret: Option<String>,

    /// Custom headers added to every delivery (JSON object of string values)
    pub headers: Option<serde_json::Value>,

    /// Whether deliveries are sent
    pub is_active: bool,

    /// Event types this endpoint subscribes to (e.g., "alert.triggered")
    pub subscribed_events: Vec<String>,
}

/// Status of a webhook delivery lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Created, no attempt recorded yet
    #[default]
    Pending,
    /// A 2xx response was received
    Delivered,
    /// Last attempt failed; may still be retried
    Failed,
}

impl DeliveryStatus {
    /// Parse a stored status string; unknown values fall back to pending
    pub fn parse(s: &str) -> Self {
        match s {
            "delivered" => Self::Delivered,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Storage representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

/// One delivery attempt lineage for a (webhook, trigger) pair.
///
/// Mutated in place on each attempt; `attempts` only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    /// Unique identifier
    pub id: Uuid,

    /// The webhook endpoint being delivered to
    pub webhook_config_id: Uuid,

    /// The trigger that produced this delivery, if any
    pub alert_trigger_id: Option<Uuid>,

    /// Event type of the payload
    pub event_type: String,

    /// The JSON body posted to the endpoint
    pub payload: serde_json::Value,

    /// Current status
    pub status: DeliveryStatus,

    /// Number of attempts made so far
    pub attempts: i32,

    /// When the last attempt ran
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// HTTP status of the last response, when one was received
    pub response_status: Option<i32>,

    /// Last response body, truncated
    pub response_body: Option<String>,

    /// Last transport error, truncated
    pub error_message: Option<String>,

    /// When the delivery succeeded
    pub delivered_at: Option<DateTime<Utc>>,

    /// When the delivery was created
    pub created_at: DateTime<Utc>,
}

impl WebhookDelivery {
    /// Create a fresh pending delivery for a payload
    pub fn new(
        webhook_config_id: Uuid,
        alert_trigger_id: Option<Uuid>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            webhook_config_id,
            alert_trigger_id,
            event_type: event_type.into(),
            payload,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            response_status: None,
            response_body: None,
            error_message: None,
            delivered_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Recorded result of a single delivery attempt
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    /// Whether a 2xx response was received
    pub success: bool,

    /// HTTP status of the response, when one was received
    pub response_status: Option<i32>,

    /// Response body, already truncated by the dispatcher
    pub response_body: Option<String>,

    /// Transport error, already truncated by the dispatcher
    pub error_message: Option<String>,

    /// When the attempt ran
    pub attempted_at: DateTime<Utc>,
}
