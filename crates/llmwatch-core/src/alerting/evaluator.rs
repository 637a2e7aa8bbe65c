//! Alert rule evaluation engine

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    is_triggered, AlertConfig, AlertEvaluation, AlertTrigger, TriggerContext, TriggerStatus,
};
use crate::store::{AlertConfigStore, TriggerStore};

use super::metrics::MetricAggregator;

/// Evaluates every active alert config of a tenant against current event data.
///
/// Evaluation is per-config isolated: one config with an unknown metric or a
/// failing store call is logged and skipped, and its siblings still run.
pub struct AlertEvaluator {
    configs: Arc<dyn AlertConfigStore>,
    triggers: Arc<dyn TriggerStore>,
    aggregator: MetricAggregator,
    suppression_minutes: i64,
}

impl AlertEvaluator {
    /// Create a new evaluator
    pub fn new(
        configs: Arc<dyn AlertConfigStore>,
        triggers: Arc<dyn TriggerStore>,
        aggregator: MetricAggregator,
        suppression_minutes: i64,
    ) -> Self {
        Self {
            configs,
            triggers,
            aggregator,
            suppression_minutes,
        }
    }

    /// Evaluate all active alerts for one organization.
    ///
    /// Returns one result per config that evaluated cleanly; configs that
    /// fail are logged and omitted.
    pub async fn evaluate_tenant(&self, org_id: Uuid) -> Result<Vec<AlertEvaluation>> {
        let configs = self.configs.list_active_alerts(org_id).await?;

        debug!(%org_id, count = configs.len(), "Evaluating alert configs");

        let mut results = Vec::with_capacity(configs.len());
        for config in configs {
            match self.evaluate_config(&config).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(alert_config_id = %config.id, error = %e, "Skipping alert config");
                }
            }
        }

        Ok(results)
    }

    /// Evaluate a single config: window -> metric -> comparison -> recording
    pub async fn evaluate_config(&self, config: &AlertConfig) -> Result<AlertEvaluation> {
        config.validate()?;

        let window_start = Utc::now() - Duration::minutes(config.time_window_minutes);
        let metric = self
            .aggregator
            .compute(config.org_id, &config.metric, window_start, &config.filters)
            .await?;

        let triggered = is_triggered(metric.value, config.threshold_value, &config.operator);

        debug!(
            alert_config_id = %config.id,
            metric = config.metric,
            value = metric.value,
            threshold = config.threshold_value,
            triggered,
            "Evaluated alert config"
        );

        let context = TriggerContext {
            metric_value: metric.value,
            threshold_value: config.threshold_value,
            time_window_minutes: config.time_window_minutes,
            filters_applied: config.filters.clone(),
            sample_count: Some(metric.sample_count),
        };

        let trigger_id = if triggered {
            self.record_trigger(config, metric.value, &context).await?
        } else {
            None
        };

        Ok(AlertEvaluation {
            alert_config_id: config.id,
            is_triggered: triggered,
            metric_value: metric.value,
            context,
            trigger_id,
        })
    }

    /// Record a trigger unless one was already recorded inside the
    /// suppression interval.
    ///
    /// Suppression gates only the recording (and therefore the downstream
    /// notifications); the evaluation result still reports the breach.
    async fn record_trigger(
        &self,
        config: &AlertConfig,
        metric_value: f64,
        context: &TriggerContext,
    ) -> Result<Option<Uuid>> {
        if let Some(recent) = self.triggers.find_most_recent_triggered(config.id).await? {
            let age = Utc::now() - recent.triggered_at;
            if age < Duration::minutes(self.suppression_minutes) {
                debug!(
                    alert_config_id = %config.id,
                    last_triggered_at = %recent.triggered_at,
                    "Trigger suppressed"
                );
                return Ok(None);
            }
        }

        let trigger = AlertTrigger {
            id: Uuid::new_v4(),
            alert_config_id: config.id,
            triggered_at: Utc::now(),
            metric_value,
            context: context.clone(),
            status: TriggerStatus::Triggered,
            resolved_at: None,
        };

        self.triggers.insert_trigger(&trigger).await?;

        info!(
            alert_config_id = %config.id,
            trigger_id = %trigger.id,
            metric_value,
            "Alert triggered"
        );

        Ok(Some(trigger.id))
    }
}
