//! Persistence seams for LLMWatch
//!
//! The event log and the alert/trigger/webhook tables live in an external
//! relational store. The engine reaches them only through these narrow
//! traits; `postgres` is the production implementation and `memory` backs
//! tests and local development.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{AlertRepository, EventRepository, PostgresPool, WebhookRepository};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AlertConfig, AlertTrigger, AttemptOutcome, DimensionFilters, UsageEvent, WebhookConfig,
    WebhookDelivery,
};

/// Read-only access to the usage event log
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Load events for an organization created at or after `since`,
    /// narrowed by the dimension allow-lists
    async fn query_events(
        &self,
        org_id: Uuid,
        since: DateTime<Utc>,
        filters: &DimensionFilters,
    ) -> Result<Vec<UsageEvent>>;
}

/// Read-only access to alert configurations
#[async_trait]
pub trait AlertConfigStore: Send + Sync {
    /// Active alert configs for one organization
    async fn list_active_alerts(&self, org_id: Uuid) -> Result<Vec<AlertConfig>>;

    /// All organizations with at least one alert config
    async fn list_tenants(&self) -> Result<Vec<Uuid>>;
}

/// Everything needed to dispatch notifications for one trigger: the trigger,
/// its owning alert config, and the owning organization
#[derive(Debug, Clone)]
pub struct TriggerDispatch {
    /// The trigger being dispatched
    pub trigger: AlertTrigger,
    /// The alert config that produced it
    pub config: AlertConfig,
    /// Owning organization
    pub org_id: Uuid,
    /// Organization display name, for notification text
    pub org_name: String,
}

/// Trigger record persistence
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Most recent trigger with `triggered` status for an alert config
    async fn find_most_recent_triggered(
        &self,
        alert_config_id: Uuid,
    ) -> Result<Option<AlertTrigger>>;

    /// Persist a new trigger record
    async fn insert_trigger(&self, trigger: &AlertTrigger) -> Result<()>;

    /// Load a trigger joined with its config and organization.
    ///
    /// Returns `None` when any of the three entities has gone missing, so a
    /// config deleted between evaluation and dispatch is a no-op.
    async fn load_dispatch_context(&self, trigger_id: Uuid) -> Result<Option<TriggerDispatch>>;
}

/// Read-only access to webhook endpoint configurations
#[async_trait]
pub trait WebhookConfigStore: Send + Sync {
    /// Load one webhook config
    async fn get_webhook(&self, id: Uuid) -> Result<Option<WebhookConfig>>;

    /// Active webhooks for an organization subscribed to an event type
    async fn list_active_subscribed(
        &self,
        org_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<WebhookConfig>>;
}

/// Delivery record persistence
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Persist a new delivery record
    async fn insert_delivery(&self, delivery: &WebhookDelivery) -> Result<()>;

    /// Load one delivery record
    async fn get_delivery(&self, id: Uuid) -> Result<Option<WebhookDelivery>>;

    /// Record the outcome of one attempt: bumps the attempt counter, stamps
    /// `last_attempt_at`, and moves the status to delivered or failed
    async fn record_attempt(&self, id: Uuid, outcome: &AttemptOutcome) -> Result<()>;

    /// Failed deliveries still under the attempt cap whose last attempt is
    /// older than `stale_before`, oldest first
    async fn list_retryable_failed(
        &self,
        max_attempts: i32,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>>;
}
