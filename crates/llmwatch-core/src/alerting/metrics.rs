//! Metric aggregation over windows of usage events

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{DimensionFilters, MetricKind, UsageEvent};
use crate::store::EventStore;

/// Computed metric value with metadata
#[derive(Debug, Clone)]
pub struct MetricValue {
    /// The scalar the threshold is compared against
    pub value: f64,
    /// Number of events the value was computed over
    pub sample_count: u64,
}

/// Computes scalar metrics over a trailing window of usage events.
///
/// Pure over store data: the caller supplies the window start, so two calls
/// with the same window and store contents yield the same value.
pub struct MetricAggregator {
    events: Arc<dyn EventStore>,
}

impl MetricAggregator {
    /// Create a new aggregator over an event store
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    /// Compute a metric for an organization over `[window_start, now]`.
    ///
    /// The metric name is parsed here so an unrecognized kind surfaces as a
    /// per-alert `UnknownMetric` error rather than poisoning the whole pass.
    pub async fn compute(
        &self,
        org_id: Uuid,
        metric: &str,
        window_start: DateTime<Utc>,
        filters: &DimensionFilters,
    ) -> Result<MetricValue> {
        let kind =
            MetricKind::parse(metric).ok_or_else(|| Error::UnknownMetric(metric.to_string()))?;

        let events = self.events.query_events(org_id, window_start, filters).await?;
        let sample_count = events.len() as u64;

        let value = match kind {
            MetricKind::CostPerHour => total_cost(&events) / 1.0,
            MetricKind::CostPerDay => total_cost(&events) / 24.0,
            MetricKind::CostPerWeek => total_cost(&events) / 168.0,
            MetricKind::CostPerMonth => total_cost(&events) / 720.0,
            MetricKind::RequestsPerMinute => events.len() as f64 / 60.0,
            MetricKind::RequestsPerHour => events.len() as f64,
            MetricKind::ErrorRate => error_rate(&events),
            MetricKind::LatencyP95 => latency_percentile(&events, 0.95),
            MetricKind::LatencyP99 => latency_percentile(&events, 0.99),
            MetricKind::TokenUsagePerHour => total_tokens(&events),
            MetricKind::TokenUsagePerDay => total_tokens(&events) / 24.0,
        };

        Ok(MetricValue {
            value,
            sample_count,
        })
    }
}

fn total_cost(events: &[UsageEvent]) -> f64 {
    // The divisor applied by the cost_per_* kinds is fixed per kind rather
    // than derived from the configured window length, matching the billing
    // dashboard's definition of these rates.
    events.iter().map(|e| e.cost_usd).sum()
}

fn total_tokens(events: &[UsageEvent]) -> f64 {
    events.iter().map(UsageEvent::total_tokens).sum::<i64>() as f64
}

fn error_rate(events: &[UsageEvent]) -> f64 {
    if events.is_empty() {
        return 0.0;
    }

    let errors = events.iter().filter(|e| e.is_error()).count();
    errors as f64 / events.len() as f64 * 100.0
}

/// Nearest-rank percentile over the non-null latency samples.
///
/// `index = ceil(n * p) - 1` on the ascending sort, clamped at 0. An empty
/// sample set yields 0.
fn latency_percentile(events: &[UsageEvent], percentile: f64) -> f64 {
    let mut samples: Vec<f64> = events.iter().filter_map(|e| e.latency_ms).collect();
    if samples.is_empty() {
        return 0.0;
    }

    samples.sort_by(|a, b| a.total_cmp(b));

    let rank = (samples.len() as f64 * percentile).ceil() as usize;
    let index = rank.saturating_sub(1);
    samples[index.min(samples.len() - 1)]
}
