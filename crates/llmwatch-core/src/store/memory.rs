//! In-memory store for tests and local development
//!
//! Holds every table in a single `RwLock`ed state blob. Not intended for
//! production use; `llmwatch serve --memory` runs against it so the engine
//! can be exercised without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AlertConfig, AlertTrigger, AttemptOutcome, DeliveryStatus, DimensionFilters, UsageEvent,
    WebhookConfig, WebhookDelivery,
};

use super::{
    AlertConfigStore, DeliveryStore, EventStore, TriggerDispatch, TriggerStore, WebhookConfigStore,
};

#[derive(Default)]
struct State {
    org_names: HashMap<Uuid, String>,
    events: Vec<UsageEvent>,
    alert_configs: Vec<AlertConfig>,
    triggers: Vec<AlertTrigger>,
    webhooks: Vec<WebhookConfig>,
    deliveries: Vec<WebhookDelivery>,
}

/// In-memory implementation of every store trait
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an organization display name
    pub fn add_org(&self, org_id: Uuid, name: impl Into<String>) {
        self.state.write().org_names.insert(org_id, name.into());
    }

    /// Append a usage event
    pub fn add_event(&self, event: UsageEvent) {
        self.state.write().events.push(event);
    }

    /// Append an alert config
    pub fn add_alert_config(&self, config: AlertConfig) {
        self.state.write().alert_configs.push(config);
    }

    /// Append a webhook config
    pub fn add_webhook(&self, webhook: WebhookConfig) {
        self.state.write().webhooks.push(webhook);
    }

    /// Snapshot of all trigger records, for assertions
    pub fn triggers(&self) -> Vec<AlertTrigger> {
        self.state.read().triggers.clone()
    }

    /// Snapshot of all delivery records, for assertions
    pub fn deliveries(&self) -> Vec<WebhookDelivery> {
        self.state.read().deliveries.clone()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn query_events(
        &self,
        org_id: Uuid,
        since: DateTime<Utc>,
        filters: &DimensionFilters,
    ) -> Result<Vec<UsageEvent>> {
        let state = self.state.read();
        Ok(state
            .events
            .iter()
            .filter(|e| e.org_id == org_id && e.created_at >= since && filters.matches(e))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AlertConfigStore for MemoryStore {
    async fn list_active_alerts(&self, org_id: Uuid) -> Result<Vec<AlertConfig>> {
        let state = self.state.read();
        Ok(state
            .alert_configs
            .iter()
            .filter(|c| c.org_id == org_id && c.is_active)
            .cloned()
            .collect())
    }

    async fn list_tenants(&self) -> Result<Vec<Uuid>> {
        let state = self.state.read();
        let mut tenants: Vec<Uuid> = state.alert_configs.iter().map(|c| c.org_id).collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }
}

#[async_trait]
impl TriggerStore for MemoryStore {
    async fn find_most_recent_triggered(
        &self,
        alert_config_id: Uuid,
    ) -> Result<Option<AlertTrigger>> {
        let state = self.state.read();
        Ok(state
            .triggers
            .iter()
            .filter(|t| {
                t.alert_config_id == alert_config_id
                    && t.status == crate::models::TriggerStatus::Triggered
            })
            .max_by_key(|t| t.triggered_at)
            .cloned())
    }

    async fn insert_trigger(&self, trigger: &AlertTrigger) -> Result<()> {
        self.state.write().triggers.push(trigger.clone());
        Ok(())
    }

    async fn load_dispatch_context(&self, trigger_id: Uuid) -> Result<Option<TriggerDispatch>> {
        let state = self.state.read();

        let Some(trigger) = state.triggers.iter().find(|t| t.id == trigger_id) else {
            return Ok(None);
        };
        let Some(config) = state
            .alert_configs
            .iter()
            .find(|c| c.id == trigger.alert_config_id)
        else {
            return Ok(None);
        };

        let org_name = state
            .org_names
            .get(&config.org_id)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Some(TriggerDispatch {
            trigger: trigger.clone(),
            config: config.clone(),
            org_id: config.org_id,
            org_name,
        }))
    }
}

#[async_trait]
impl WebhookConfigStore for MemoryStore {
    async fn get_webhook(&self, id: Uuid) -> Result<Option<WebhookConfig>> {
        let state = self.state.read();
        Ok(state.webhooks.iter().find(|w| w.id == id).cloned())
    }

    async fn list_active_subscribed(
        &self,
        org_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<WebhookConfig>> {
        let state = self.state.read();
        Ok(state
            .webhooks
            .iter()
            .filter(|w| {
                w.org_id == org_id
                    && w.is_active
                    && w.subscribed_events.iter().any(|e| e == event_type)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn insert_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        self.state.write().deliveries.push(delivery.clone());
        Ok(())
    }

    async fn get_delivery(&self, id: Uuid) -> Result<Option<WebhookDelivery>> {
        let state = self.state.read();
        Ok(state.deliveries.iter().find(|d| d.id == id).cloned())
    }

    async fn record_attempt(&self, id: Uuid, outcome: &AttemptOutcome) -> Result<()> {
        let mut state = self.state.write();
        if let Some(delivery) = state.deliveries.iter_mut().find(|d| d.id == id) {
            delivery.status = if outcome.success {
                DeliveryStatus::Delivered
            } else {
                DeliveryStatus::Failed
            };
            delivery.attempts += 1;
            delivery.last_attempt_at = Some(outcome.attempted_at);
            delivery.response_status = outcome.response_status;
            delivery.response_body = outcome.response_body.clone();
            delivery.error_message = outcome.error_message.clone();
            if outcome.success {
                delivery.delivered_at = Some(outcome.attempted_at);
            }
        }
        Ok(())
    }

    async fn list_retryable_failed(
        &self,
        max_attempts: i32,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>> {
        let state = self.state.read();
        let mut stale: Vec<WebhookDelivery> = state
            .deliveries
            .iter()
            .filter(|d| {
                d.status == DeliveryStatus::Failed
                    && d.attempts < max_attempts
                    && d.last_attempt_at.is_some_and(|at| at < stale_before)
            })
            .cloned()
            .collect();

        stale.sort_by_key(|d| d.last_attempt_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }
}
