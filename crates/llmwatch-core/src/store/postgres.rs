//! PostgreSQL-backed store implementations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::{
    AlertConfig, AlertKind, AlertTrigger, AttemptOutcome, DeliveryStatus, DimensionFilters,
    NotificationChannel, TriggerContext, TriggerStatus, UsageEvent, WebhookConfig, WebhookDelivery,
};

use super::{
    AlertConfigStore, DeliveryStore, EventStore, TriggerDispatch, TriggerStore, WebhookConfigStore,
};

/// PostgreSQL connection pool
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Create a new PostgreSQL connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Repository over the usage event log
#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    /// Create a new event repository
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool.clone(),
        }
    }
}

#[async_trait]
impl EventStore for EventRepository {
    async fn query_events(
        &self,
        org_id: Uuid,
        since: DateTime<Utc>,
        filters: &DimensionFilters,
    ) -> Result<Vec<UsageEvent>> {
        fn allow_list(list: &Option<Vec<String>>) -> Option<&Vec<String>> {
            list.as_ref().filter(|v| !v.is_empty())
        }

        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, org_id, provider, model, version_tag, session_id,
                   status, latency_ms, prompt_tokens, completion_tokens,
                   cost_usd, created_at
            FROM usage_events
            WHERE org_id = $1
              AND created_at >= $2
              AND ($3::text[] IS NULL OR provider = ANY($3))
              AND ($4::text[] IS NULL OR model = ANY($4))
              AND ($5::text[] IS NULL OR version_tag = ANY($5))
              AND ($6::text[] IS NULL OR session_id = ANY($6))
            ORDER BY created_at ASC
            "#,
        )
        .bind(org_id)
        .bind(since)
        .bind(allow_list(&filters.providers))
        .bind(allow_list(&filters.models))
        .bind(allow_list(&filters.version_tags))
        .bind(allow_list(&filters.session_ids))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Repository over alert configs and trigger records
#[derive(Clone)]
pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    /// Create a new alert repository
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool.clone(),
        }
    }
}

#[async_trait]
impl AlertConfigStore for AlertRepository {
    async fn list_active_alerts(&self, org_id: Uuid) -> Result<Vec<AlertConfig>> {
        let rows = sqlx::query_as::<_, AlertConfigRow>(
            r#"
            SELECT * FROM alert_configs
            WHERE org_id = $1 AND is_active = true
            ORDER BY created_at ASC
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_tenants(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT DISTINCT org_id FROM alert_configs ORDER BY org_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl TriggerStore for AlertRepository {
    async fn find_most_recent_triggered(
        &self,
        alert_config_id: Uuid,
    ) -> Result<Option<AlertTrigger>> {
        let row = sqlx::query_as::<_, TriggerRow>(
            r#"
            SELECT * FROM alert_triggers
            WHERE alert_config_id = $1 AND status = 'triggered'
            ORDER BY triggered_at DESC
            LIMIT 1
            "#,
        )
        .bind(alert_config_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert_trigger(&self, trigger: &AlertTrigger) -> Result<()> {
        let context = serde_json::to_value(&trigger.context)?;

        sqlx::query(
            r#"
            INSERT INTO alert_triggers (
                id, alert_config_id, triggered_at, metric_value,
                context, status, resolved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(trigger.id)
        .bind(trigger.alert_config_id)
        .bind(trigger.triggered_at)
        .bind(trigger.metric_value)
        .bind(&context)
        .bind(trigger.status.as_str())
        .bind(trigger.resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_dispatch_context(&self, trigger_id: Uuid) -> Result<Option<TriggerDispatch>> {
        let row = sqlx::query_as::<_, DispatchRow>(
            r#"
            SELECT t.id as trigger_id, t.alert_config_id, t.triggered_at,
                   t.metric_value, t.context, t.status as trigger_status, t.resolved_at,
                   c.org_id, c.name, c.description, c.kind, c.metric,
                   c.threshold_value, c.operator, c.time_window_minutes, c.is_active,
                   c.notification_channels, c.filters, c.created_at, c.updated_at,
                   o.name as org_name
            FROM alert_triggers t
            JOIN alert_configs c ON c.id = t.alert_config_id
            JOIN organizations o ON o.id = c.org_id
            WHERE t.id = $1
            "#,
        )
        .bind(trigger_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}

/// Repository over webhook configs and delivery records
#[derive(Clone)]
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    /// Create a new webhook repository
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool.clone(),
        }
    }
}

#[async_trait]
impl WebhookConfigStore for WebhookRepository {
    async fn get_webhook(&self, id: Uuid) -> Result<Option<WebhookConfig>> {
        let row = sqlx::query_as::<_, WebhookConfigRow>(
            "SELECT * FROM webhook_configs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_active_subscribed(
        &self,
        org_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<WebhookConfig>> {
        let rows = sqlx::query_as::<_, WebhookConfigRow>(
            r#"
            SELECT * FROM webhook_configs
            WHERE org_id = $1 AND is_active = true AND $2 = ANY(subscribed_events)
            ORDER BY created_at ASC
            "#,
        )
        .bind(org_id)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl DeliveryStore for WebhookRepository {
    async fn insert_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (
                id, webhook_config_id, alert_trigger_id, event_type, payload,
                status, attempts, last_attempt_at, response_status,
                response_body, error_message, delivered_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.webhook_config_id)
        .bind(delivery.alert_trigger_id)
        .bind(&delivery.event_type)
        .bind(&delivery.payload)
        .bind(delivery.status.as_str())
        .bind(delivery.attempts)
        .bind(delivery.last_attempt_at)
        .bind(delivery.response_status)
        .bind(&delivery.response_body)
        .bind(&delivery.error_message)
        .bind(delivery.delivered_at)
        .bind(delivery.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_delivery(&self, id: Uuid) -> Result<Option<WebhookDelivery>> {
        let row = sqlx::query_as::<_, DeliveryRow>(
            "SELECT * FROM webhook_deliveries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn record_attempt(&self, id: Uuid, outcome: &AttemptOutcome) -> Result<()> {
        let status = if outcome.success {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Failed
        };

        sqlx::query(
            r#"
            UPDATE webhook_deliveries SET
                status = $2,
                attempts = attempts + 1,
                last_attempt_at = $3,
                response_status = $4,
                response_body = $5,
                error_message = $6,
                delivered_at = CASE WHEN $7 THEN $3 ELSE delivered_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(outcome.attempted_at)
        .bind(outcome.response_status)
        .bind(&outcome.response_body)
        .bind(&outcome.error_message)
        .bind(outcome.success)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_retryable_failed(
        &self,
        max_attempts: i32,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE status = 'failed'
              AND attempts < $1
              AND last_attempt_at < $2
            ORDER BY last_attempt_at ASC
            LIMIT $3
            "#,
        )
        .bind(max_attempts)
        .bind(stale_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// Database row types for mapping

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    org_id: Uuid,
    provider: String,
    model: String,
    version_tag: Option<String>,
    session_id: Option<String>,
    status: i32,
    latency_ms: Option<f64>,
    prompt_tokens: i64,
    completion_tokens: i64,
    cost_usd: f64,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for UsageEvent {
    fn from(row: EventRow) -> Self {
        UsageEvent {
            id: row.id,
            org_id: row.org_id,
            provider: row.provider,
            model: row.model,
            version_tag: row.version_tag,
            session_id: row.session_id,
            status: row.status,
            latency_ms: row.latency_ms,
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            cost_usd: row.cost_usd,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AlertConfigRow {
    id: Uuid,
    org_id: Uuid,
    name: String,
    description: Option<String>,
    kind: String,
    metric: String,
    threshold_value: f64,
    operator: String,
    time_window_minutes: i64,
    is_active: bool,
    notification_channels: serde_json::Value,
    filters: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AlertConfigRow> for AlertConfig {
    fn from(row: AlertConfigRow) -> Self {
        let notification_channels: Vec<NotificationChannel> =
            serde_json::from_value(row.notification_channels).unwrap_or_default();
        let filters: DimensionFilters =
            serde_json::from_value(row.filters).unwrap_or_default();

        AlertConfig {
            id: row.id,
            org_id: row.org_id,
            name: row.name,
            description: row.description,
            kind: AlertKind::parse(&row.kind),
            metric: row.metric,
            threshold_value: row.threshold_value,
            operator: row.operator,
            time_window_minutes: row.time_window_minutes,
            is_active: row.is_active,
            notification_channels,
            filters,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TriggerRow {
    id: Uuid,
    alert_config_id: Uuid,
    triggered_at: DateTime<Utc>,
    metric_value: f64,
    context: serde_json::Value,
    status: String,
    resolved_at: Option<DateTime<Utc>>,
}

impl From<TriggerRow> for AlertTrigger {
    fn from(row: TriggerRow) -> Self {
        let context: TriggerContext = serde_json::from_value(row.context).unwrap_or(
            TriggerContext {
                metric_value: row.metric_value,
                threshold_value: 0.0,
                time_window_minutes: 0,
                filters_applied: DimensionFilters::default(),
                sample_count: None,
            },
        );

        AlertTrigger {
            id: row.id,
            alert_config_id: row.alert_config_id,
            triggered_at: row.triggered_at,
            metric_value: row.metric_value,
            context,
            status: TriggerStatus::parse(&row.status),
            resolved_at: row.resolved_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DispatchRow {
    trigger_id: Uuid,
    alert_config_id: Uuid,
    triggered_at: DateTime<Utc>,
    metric_value: f64,
    context: serde_json::Value,
    trigger_status: String,
    resolved_at: Option<DateTime<Utc>>,
    org_id: Uuid,
    name: String,
    description: Option<String>,
    kind: String,
    metric: String,
    threshold_value: f64,
    operator: String,
    time_window_minutes: i64,
    is_active: bool,
    notification_channels: serde_json::Value,
    filters: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    org_name: String,
}

impl From<DispatchRow> for TriggerDispatch {
    fn from(row: DispatchRow) -> Self {
        let context: TriggerContext = serde_json::from_value(row.context).unwrap_or(
            TriggerContext {
                metric_value: row.metric_value,
                threshold_value: row.threshold_value,
                time_window_minutes: row.time_window_minutes,
                filters_applied: DimensionFilters::default(),
                sample_count: None,
            },
        );
        let notification_channels: Vec<NotificationChannel> =
            serde_json::from_value(row.notification_channels).unwrap_or_default();
        let filters: DimensionFilters =
            serde_json::from_value(row.filters).unwrap_or_default();

        TriggerDispatch {
            trigger: AlertTrigger {
                id: row.trigger_id,
                alert_config_id: row.alert_config_id,
                triggered_at: row.triggered_at,
                metric_value: row.metric_value,
                context,
                status: TriggerStatus::parse(&row.trigger_status),
                resolved_at: row.resolved_at,
            },
            config: AlertConfig {
                id: row.alert_config_id,
                org_id: row.org_id,
                name: row.name,
                description: row.description,
                kind: AlertKind::parse(&row.kind),
                metric: row.metric,
                threshold_value: row.threshold_value,
                operator: row.operator,
                time_window_minutes: row.time_window_minutes,
                is_active: row.is_active,
                notification_channels,
                filters,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            org_id: row.org_id,
            org_name: row.org_name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WebhookConfigRow {
    id: Uuid,
    org_id: Uuid,
    name: String,
    url: String,
    secret: Option<String>,
    headers: Option<serde_json::Value>,
    is_active: bool,
    subscribed_events: Vec<String>,
}

impl From<WebhookConfigRow> for WebhookConfig {
    fn from(row: WebhookConfigRow) -> Self {
        WebhookConfig {
            id: row.id,
            org_id: row.org_id,
            name: row.name,
            url: row.url,
            secret: row.secret,
            headers: row.headers,
            is_active: row.is_active,
            subscribed_events: row.subscribed_events,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: Uuid,
    webhook_config_id: Uuid,
    alert_trigger_id: Option<Uuid>,
    event_type: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    response_status: Option<i32>,
    response_body: Option<String>,
    error_message: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<DeliveryRow> for WebhookDelivery {
    fn from(row: DeliveryRow) -> Self {
        WebhookDelivery {
            id: row.id,
            webhook_config_id: row.webhook_config_id,
            alert_trigger_id: row.alert_trigger_id,
            event_type: row.event_type,
            payload: row.payload,
            status: DeliveryStatus::parse(&row.status),
            attempts: row.attempts,
            last_attempt_at: row.last_attempt_at,
            response_status: row.response_status,
            response_body: row.response_body,
            error_message: row.error_message,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
        }
    }
}
