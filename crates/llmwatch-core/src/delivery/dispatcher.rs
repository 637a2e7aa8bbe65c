//! Webhook and email notification dispatch

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::error::Result;
use crate::models::{
    AttemptOutcome, TriggerContext, WebhookDelivery, EVENT_ALERT_TRIGGERED,
};
use crate::store::{DeliveryStore, TriggerDispatch, TriggerStore, WebhookConfigStore};

use super::notifier::NotificationSender;
use super::retry::{retry_delay, RetryScheduler};
use super::signature::{sign_payload, SIGNATURE_HEADER};

const WEBHOOK_USER_AGENT: &str = concat!("llmwatch-webhook/", env!("CARGO_PKG_VERSION"));

/// Response bodies are stored truncated to this many bytes
const RESPONSE_BODY_LIMIT: usize = 1000;

/// Error messages are stored truncated to this many bytes
const ERROR_MESSAGE_LIMIT: usize = 500;

/// Payload posted for an `alert.triggered` event
#[derive(Debug, Clone, Serialize)]
struct AlertTriggeredPayload {
    event_type: &'static str,
    timestamp: DateTime<Utc>,
    organization_id: Uuid,
    alert: AlertSummary,
    context: TriggerContext,
}

#[derive(Debug, Clone, Serialize)]
struct AlertSummary {
    id: Uuid,
    name: String,
    metric: String,
    threshold_value: f64,
    actual_value: f64,
    trigger_id: Uuid,
}

/// Resolves interested webhook endpoints for a trigger, posts signed
/// payloads, and drives the bounded retry lifecycle of each delivery.
pub struct DeliveryDispatcher {
    triggers: Arc<dyn TriggerStore>,
    webhooks: Arc<dyn WebhookConfigStore>,
    deliveries: Arc<dyn DeliveryStore>,
    email: Option<Arc<dyn NotificationSender>>,
    retry: Arc<dyn RetryScheduler>,
    client: Client,
    config: DeliveryConfig,
}

impl DeliveryDispatcher {
    /// Create a new dispatcher
    pub fn new(
        triggers: Arc<dyn TriggerStore>,
        webhooks: Arc<dyn WebhookConfigStore>,
        deliveries: Arc<dyn DeliveryStore>,
        email: Option<Arc<dyn NotificationSender>>,
        retry: Arc<dyn RetryScheduler>,
        config: DeliveryConfig,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            triggers,
            webhooks,
            deliveries,
            email,
            retry,
            client,
            config,
        }
    }

    /// Fan out notifications for a recorded trigger.
    ///
    /// A trigger, config, or organization deleted since evaluation makes
    /// this a no-op rather than an error.
    pub async fn dispatch_alert_triggered(self: &Arc<Self>, trigger_id: Uuid) -> Result<()> {
        let Some(dispatch) = self.triggers.load_dispatch_context(trigger_id).await? else {
            debug!(%trigger_id, "Trigger gone before dispatch");
            return Ok(());
        };

        if dispatch.config.notification_channels.is_empty() {
            debug!(alert_config_id = %dispatch.config.id, "Alert has no notification channels");
        }

        let payload = serde_json::to_value(build_payload(&dispatch))?;

        let endpoints = self
            .webhooks
            .list_active_subscribed(dispatch.org_id, EVENT_ALERT_TRIGGERED)
            .await?;

        debug!(
            %trigger_id,
            webhooks = endpoints.len(),
            "Dispatching alert.triggered"
        );

        for endpoint in &endpoints {
            if let Err(e) = self
                .deliver_webhook(endpoint.id, EVENT_ALERT_TRIGGERED, payload.clone(), Some(trigger_id))
                .await
            {
                error!(webhook_id = %endpoint.id, error = %e, "Webhook delivery failed to start");
            }
        }

        self.dispatch_emails(&dispatch).await;

        Ok(())
    }

    /// Email fan-out for a trigger; failures are per-recipient and never
    /// block webhook delivery.
    async fn dispatch_emails(&self, dispatch: &TriggerDispatch) {
        let recipients: Vec<&str> = dispatch.config.email_recipients().collect();
        if recipients.is_empty() {
            return;
        }

        let Some(sender) = &self.email else {
            debug!(
                alert_config_id = %dispatch.config.id,
                "Email channels configured but no email sender is available"
            );
            return;
        };

        for to in recipients {
            let result = sender
                .send_alert_email(
                    to,
                    &dispatch.config.name,
                    &dispatch.config.metric,
                    dispatch.trigger.metric_value,
                    dispatch.config.threshold_value,
                    &dispatch.org_name,
                )
                .await;

            match result {
                Ok(()) => debug!(%to, "Alert email sent"),
                Err(e) => warn!(%to, error = %e, "Alert email failed"),
            }
        }
    }

    /// Create a delivery record and run its first attempt inline
    pub async fn deliver_webhook(
        self: &Arc<Self>,
        webhook_config_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
        trigger_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let delivery = WebhookDelivery::new(webhook_config_id, trigger_id, event_type, payload);
        self.deliveries.insert_delivery(&delivery).await?;

        self.attempt_delivery(delivery.id).await?;

        Ok(delivery.id)
    }

    /// Run one delivery attempt; also the entry point for retries and the
    /// sweep. A delivery or webhook config that has gone missing is a no-op.
    pub async fn attempt_delivery(self: &Arc<Self>, delivery_id: Uuid) -> Result<()> {
        let Some(delivery) = self.deliveries.get_delivery(delivery_id).await? else {
            debug!(%delivery_id, "Delivery gone before attempt");
            return Ok(());
        };
        let Some(webhook) = self.webhooks.get_webhook(delivery.webhook_config_id).await? else {
            debug!(%delivery_id, "Webhook config gone before attempt");
            return Ok(());
        };

        let body = serde_json::to_vec(&delivery.payload)?;

        let mut request = self
            .client
            .post(&webhook.url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, WEBHOOK_USER_AGENT);

        if let Some(headers) = webhook.headers.as_ref().and_then(|h| h.as_object()) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key, value);
                }
            }
        }

        if let Some(secret) = &webhook.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body));
        }

        let outcome = match request.body(body).send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();

                AttemptOutcome {
                    success: status.is_success(),
                    response_status: Some(i32::from(status.as_u16())),
                    response_body: Some(truncated(body, RESPONSE_BODY_LIMIT)),
                    error_message: None,
                    attempted_at: Utc::now(),
                }
            }
            Err(e) => AttemptOutcome {
                success: false,
                response_status: None,
                response_body: None,
                error_message: Some(truncated(e.to_string(), ERROR_MESSAGE_LIMIT)),
                attempted_at: Utc::now(),
            },
        };

        self.deliveries.record_attempt(delivery_id, &outcome).await?;

        let attempts = delivery.attempts + 1;

        if outcome.success {
            info!(%delivery_id, url = %webhook.url, attempts, "Webhook delivered");
        } else if attempts >= self.config.max_attempts {
            warn!(
                %delivery_id,
                url = %webhook.url,
                attempts,
                "Webhook delivery abandoned"
            );
        } else {
            warn!(
                %delivery_id,
                url = %webhook.url,
                attempts,
                status = ?outcome.response_status,
                error = ?outcome.error_message,
                "Webhook delivery failed, scheduling retry"
            );
            self.schedule_retry(delivery_id, attempts);
        }

        Ok(())
    }

    /// Re-attempt stale failed deliveries.
    ///
    /// The in-process retry timers die with the process; this sweep is the
    /// durable recovery path and runs once per scheduler tick.
    pub async fn sweep_failed_deliveries(self: &Arc<Self>) -> Result<usize> {
        let stale_before = Utc::now() - chrono::Duration::minutes(self.config.sweep_stale_minutes);

        let stale = self
            .deliveries
            .list_retryable_failed(self.config.max_attempts, stale_before, self.config.sweep_batch_size)
            .await?;

        if stale.is_empty() {
            return Ok(0);
        }

        info!(count = stale.len(), "Sweeping stale failed deliveries");

        let mut retried = 0;
        for delivery in stale {
            match self.attempt_delivery(delivery.id).await {
                Ok(()) => retried += 1,
                Err(e) => error!(delivery_id = %delivery.id, error = %e, "Sweep attempt failed"),
            }
        }

        Ok(retried)
    }

    fn schedule_retry(self: &Arc<Self>, delivery_id: Uuid, attempts: i32) {
        let delay = retry_delay(attempts);
        let dispatcher = self.clone();

        self.retry.schedule(
            delay,
            Box::pin(async move {
                if let Err(e) = dispatcher.attempt_delivery(delivery_id).await {
                    error!(%delivery_id, error = %e, "Retry attempt failed");
                }
            }),
        );
    }
}

fn build_payload(dispatch: &TriggerDispatch) -> AlertTriggeredPayload {
    AlertTriggeredPayload {
        event_type: EVENT_ALERT_TRIGGERED,
        timestamp: Utc::now(),
        organization_id: dispatch.org_id,
        alert: AlertSummary {
            id: dispatch.config.id,
            name: dispatch.config.name.clone(),
            metric: dispatch.config.metric.clone(),
            threshold_value: dispatch.config.threshold_value,
            actual_value: dispatch.trigger.metric_value,
            trigger_id: dispatch.trigger.id,
        },
        context: dispatch.trigger.context.clone(),
    }
}

/// Truncate at a char boundary at or below `max` bytes
fn truncated(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlertConfig, AlertKind, AlertTrigger, DeliveryStatus, DimensionFilters,
        NotificationChannel, TriggerStatus, WebhookConfig,
    };
    use crate::store::{MemoryStore, TriggerStore};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Captures scheduled retries without running them
    #[derive(Default)]
    struct RecordingRetryScheduler {
        delays: Mutex<Vec<Duration>>,
    }

    impl RetryScheduler for RecordingRetryScheduler {
        fn schedule(&self, delay: Duration, _task: futures::future::BoxFuture<'static, ()>) {
            self.delays.lock().push(delay);
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail_for: Option<String>,
    }

    #[async_trait::async_trait]
    impl NotificationSender for RecordingNotifier {
        async fn send_alert_email(
            &self,
            to: &str,
            _alert_name: &str,
            _metric: &str,
            _actual_value: f64,
            _threshold_value: f64,
            _org_name: &str,
        ) -> Result<()> {
            if self.fail_for.as_deref() == Some(to) {
                return Err(crate::error::Error::Notification("smtp refused".to_string()));
            }
            self.sent.lock().push(to.to_string());
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        retry: Arc<RecordingRetryScheduler>,
        notifier: Arc<RecordingNotifier>,
        dispatcher: Arc<DeliveryDispatcher>,
    }

    fn harness() -> Harness {
        harness_with_notifier(RecordingNotifier::default())
    }

    fn harness_with_notifier(notifier: RecordingNotifier) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let retry = Arc::new(RecordingRetryScheduler::default());
        let notifier = Arc::new(notifier);

        let dispatcher = Arc::new(DeliveryDispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Some(notifier.clone()),
            retry.clone(),
            DeliveryConfig::default(),
        ));

        Harness {
            store,
            retry,
            notifier,
            dispatcher,
        }
    }

    fn webhook(org_id: Uuid, url: &str, secret: Option<&str>) -> WebhookConfig {
        WebhookConfig {
            id: Uuid::new_v4(),
            org_id,
            name: "ops hook".to_string(),
            url: url.to_string(),
            secret: secret.map(String::from),
            headers: None,
            is_active: true,
            subscribed_events: vec![EVENT_ALERT_TRIGGERED.to_string()],
        }
    }

    async fn seed_trigger(store: &Arc<MemoryStore>, org_id: Uuid) -> Uuid {
        let config = AlertConfig {
            id: Uuid::new_v4(),
            org_id,
            name: "cost spike".to_string(),
            description: None,
            kind: AlertKind::Threshold,
            metric: "cost_per_day".to_string(),
            threshold_value: 0.4,
            operator: "gt".to_string(),
            time_window_minutes: 60,
            is_active: true,
            notification_channels: vec![
                NotificationChannel::Email {
                    to: "a@example.com".to_string(),
                },
                NotificationChannel::Email {
                    to: "b@example.com".to_string(),
                },
            ],
            filters: DimensionFilters::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let trigger = AlertTrigger {
            id: Uuid::new_v4(),
            alert_config_id: config.id,
            triggered_at: Utc::now(),
            metric_value: 0.5,
            context: TriggerContext {
                metric_value: 0.5,
                threshold_value: 0.4,
                time_window_minutes: 60,
                filters_applied: DimensionFilters::default(),
                sample_count: Some(12),
            },
            status: TriggerStatus::Triggered,
            resolved_at: None,
        };

        store.add_org(org_id, "Acme");
        store.add_alert_config(config);
        store.insert_trigger(&trigger).await.unwrap();
        trigger.id
    }

    #[tokio::test]
    async fn successful_delivery_is_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let h = harness();
        let org_id = Uuid::new_v4();
        let hook = webhook(org_id, &format!("{}/hook", server.uri()), None);
        let hook_id = hook.id;
        h.store.add_webhook(hook);

        let delivery_id = h
            .dispatcher
            .deliver_webhook(hook_id, EVENT_ALERT_TRIGGERED, serde_json::json!({"a": 1}), None)
            .await
            .unwrap();

        let delivery = h.store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert_eq!(delivery.attempts, 1);
        assert_eq!(delivery.response_status, Some(200));
        assert_eq!(delivery.response_body.as_deref(), Some("ok"));
        assert!(delivery.delivered_at.is_some());
        assert!(h.retry.delays.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_schedules_first_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
            .mount(&server)
            .await;

        let h = harness();
        let org_id = Uuid::new_v4();
        let hook = webhook(org_id, &server.uri(), None);
        let hook_id = hook.id;
        h.store.add_webhook(hook);

        let delivery_id = h
            .dispatcher
            .deliver_webhook(hook_id, EVENT_ALERT_TRIGGERED, serde_json::json!({"a": 1}), None)
            .await
            .unwrap();

        let delivery = h.store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.attempts, 1);
        assert_eq!(delivery.response_status, Some(503));
        assert!(delivery.delivered_at.is_none());

        assert_eq!(*h.retry.delays.lock(), vec![Duration::from_secs(60)]);
    }

    #[tokio::test]
    async fn transport_error_is_captured_and_retried() {
        let h = harness();
        let org_id = Uuid::new_v4();
        // Nothing listens on port 1
        let hook = webhook(org_id, "http://127.0.0.1:1/hook", None);
        let hook_id = hook.id;
        h.store.add_webhook(hook);

        let delivery_id = h
            .dispatcher
            .deliver_webhook(hook_id, EVENT_ALERT_TRIGGERED, serde_json::json!({"a": 1}), None)
            .await
            .unwrap();

        let delivery = h.store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.response_status, None);
        assert!(delivery.error_message.is_some());
        assert_eq!(h.retry.delays.lock().len(), 1);
    }

    #[tokio::test]
    async fn retries_walk_the_ladder_and_stop_at_the_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let h = harness();
        let org_id = Uuid::new_v4();
        let hook = webhook(org_id, &server.uri(), None);
        let hook_id = hook.id;
        h.store.add_webhook(hook);

        let delivery_id = h
            .dispatcher
            .deliver_webhook(hook_id, EVENT_ALERT_TRIGGERED, serde_json::json!({"a": 1}), None)
            .await
            .unwrap();

        // Drive the four retries the ladder schedules; the recording
        // scheduler never runs them on its own
        for _ in 0..4 {
            h.dispatcher.attempt_delivery(delivery_id).await.unwrap();
        }

        let delivery = h.store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.attempts, 5);

        let delays: Vec<u64> = h.retry.delays.lock().iter().map(Duration::as_secs).collect();
        assert_eq!(delays, vec![60, 300, 900, 3600]);

        // A sixth attempt is never scheduled
        h.dispatcher.attempt_delivery(delivery_id).await.unwrap();
        let delivery = h.store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.attempts, 6);
        assert_eq!(h.retry.delays.lock().len(), 4);
    }

    #[tokio::test]
    async fn signature_and_custom_headers_are_sent() {
        let payload = serde_json::json!({"event_type": "alert.triggered"});
        let body = serde_json::to_vec(&payload).unwrap();
        let expected = sign_payload("whsec_test", &body);
        assert_eq!(
            expected,
            "sha256=95ff13ca7d8dfc7a52a66b5615f8bff83cc1a1dd70ab960b831ade694e842b51"
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header(SIGNATURE_HEADER, expected.as_str()))
            .and(header("x-environment", "staging"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness();
        let org_id = Uuid::new_v4();
        let mut hook = webhook(org_id, &server.uri(), Some("whsec_test"));
        hook.headers = Some(serde_json::json!({"x-environment": "staging"}));
        let hook_id = hook.id;
        h.store.add_webhook(hook);

        let delivery_id = h
            .dispatcher
            .deliver_webhook(hook_id, EVENT_ALERT_TRIGGERED, payload, None)
            .await
            .unwrap();

        // The mock only matches when every header is present and correct
        let delivery = h.store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn unsigned_webhook_gets_no_signature_header() {
        let server = MockServer::start().await;
        // A signed request would match this mock and fail the delivery
        Mock::given(method("POST"))
            .and(header_exists(SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness();
        let org_id = Uuid::new_v4();
        let hook = webhook(org_id, &server.uri(), None);
        let hook_id = hook.id;
        h.store.add_webhook(hook);

        let delivery_id = h
            .dispatcher
            .deliver_webhook(hook_id, EVENT_ALERT_TRIGGERED, serde_json::json!({}), None)
            .await
            .unwrap();

        let delivery = h.store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn dispatch_fans_out_to_subscribed_webhooks_and_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness();
        let org_id = Uuid::new_v4();
        let trigger_id = seed_trigger(&h.store, org_id).await;

        h.store.add_webhook(webhook(org_id, &server.uri(), None));

        let mut inactive = webhook(org_id, &server.uri(), None);
        inactive.is_active = false;
        h.store.add_webhook(inactive);

        let mut other_event = webhook(org_id, &server.uri(), None);
        other_event.subscribed_events = vec!["invoice.created".to_string()];
        h.store.add_webhook(other_event);

        h.dispatcher.dispatch_alert_triggered(trigger_id).await.unwrap();

        let deliveries = h.store.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, DeliveryStatus::Delivered);
        assert_eq!(deliveries[0].alert_trigger_id, Some(trigger_id));
        assert_eq!(deliveries[0].event_type, EVENT_ALERT_TRIGGERED);

        let payload = &deliveries[0].payload;
        assert_eq!(payload["event_type"], "alert.triggered");
        assert_eq!(payload["organization_id"], org_id.to_string());
        assert_eq!(payload["alert"]["name"], "cost spike");
        assert_eq!(payload["alert"]["actual_value"], 0.5);
        assert_eq!(payload["alert"]["trigger_id"], trigger_id.to_string());
        assert_eq!(payload["context"]["sample_count"], 12);

        let sent = h.notifier.sent.lock().clone();
        assert_eq!(sent, vec!["a@example.com", "b@example.com"]);
    }

    #[tokio::test]
    async fn one_failing_email_does_not_block_the_rest() {
        let h = harness_with_notifier(RecordingNotifier {
            sent: Mutex::new(vec![]),
            fail_for: Some("a@example.com".to_string()),
        });
        let org_id = Uuid::new_v4();
        let trigger_id = seed_trigger(&h.store, org_id).await;

        h.dispatcher.dispatch_alert_triggered(trigger_id).await.unwrap();

        let sent = h.notifier.sent.lock().clone();
        assert_eq!(sent, vec!["b@example.com"]);
    }

    #[tokio::test]
    async fn missing_trigger_is_a_noop() {
        let h = harness();
        h.dispatcher
            .dispatch_alert_triggered(Uuid::new_v4())
            .await
            .unwrap();

        assert!(h.store.deliveries().is_empty());
        assert!(h.notifier.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn missing_delivery_attempt_is_a_noop() {
        let h = harness();
        h.dispatcher.attempt_delivery(Uuid::new_v4()).await.unwrap();
        assert!(h.retry.delays.lock().is_empty());
    }

    #[tokio::test]
    async fn sweep_retries_only_stale_under_cap_deliveries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness();
        let org_id = Uuid::new_v4();
        let hook = webhook(org_id, &server.uri(), None);
        let hook_id = hook.id;
        h.store.add_webhook(hook);

        let seed_failed = |attempts: i32, minutes_ago: i64| {
            let mut delivery = WebhookDelivery::new(
                hook_id,
                None,
                EVENT_ALERT_TRIGGERED,
                serde_json::json!({"a": 1}),
            );
            delivery.status = DeliveryStatus::Failed;
            delivery.attempts = attempts;
            delivery.last_attempt_at = Some(Utc::now() - chrono::Duration::minutes(minutes_ago));
            delivery
        };

        let stale = seed_failed(2, 6);
        let fresh = seed_failed(1, 1);
        let exhausted = seed_failed(5, 30);
        h.store.insert_delivery(&stale).await.unwrap();
        h.store.insert_delivery(&fresh).await.unwrap();
        h.store.insert_delivery(&exhausted).await.unwrap();

        let retried = h.dispatcher.sweep_failed_deliveries().await.unwrap();
        assert_eq!(retried, 1);

        let stale_after = h.store.get_delivery(stale.id).await.unwrap().unwrap();
        assert_eq!(stale_after.status, DeliveryStatus::Delivered);
        assert_eq!(stale_after.attempts, 3);

        let fresh_after = h.store.get_delivery(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_after.status, DeliveryStatus::Failed);
        assert_eq!(fresh_after.attempts, 1);

        let exhausted_after = h.store.get_delivery(exhausted.id).await.unwrap().unwrap();
        assert_eq!(exhausted_after.status, DeliveryStatus::Failed);
        assert_eq!(exhausted_after.attempts, 5);
    }

    #[tokio::test]
    async fn long_response_bodies_are_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(5000)))
            .mount(&server)
            .await;

        let h = harness();
        let org_id = Uuid::new_v4();
        let hook = webhook(org_id, &server.uri(), None);
        let hook_id = hook.id;
        h.store.add_webhook(hook);

        let delivery_id = h
            .dispatcher
            .deliver_webhook(hook_id, EVENT_ALERT_TRIGGERED, serde_json::json!({}), None)
            .await
            .unwrap();

        let delivery = h.store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.response_body.map(|b| b.len()), Some(1000));
    }
}
