//! Alert data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::event::DimensionFilters;

/// Kind of alert rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Simple threshold comparison
    #[default]
    Threshold,
    /// Statistical anomaly detection
    Anomaly,
    /// Spend budget tracking
    Budget,
}

impl AlertKind {
    /// Parse a stored kind string; unknown values fall back to threshold
    pub fn parse(s: &str) -> Self {
        match s {
            "anomaly" => Self::Anomaly,
            "budget" => Self::Budget,
            _ => Self::Threshold,
        }
    }

    /// Storage representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::Anomaly => "anomaly",
            Self::Budget => "budget",
        }
    }
}

/// Computable metric over a trailing time window.
///
/// Alert configs store the metric as a string written by the management API;
/// evaluation parses it into this closed set so a config with an unrecognized
/// metric can only fail its own evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Window cost scaled to an hourly rate
    CostPerHour,
    /// Window cost scaled to a daily rate
    CostPerDay,
    /// Window cost scaled to a weekly rate
    CostPerWeek,
    /// Window cost scaled to a monthly rate
    CostPerMonth,
    /// Event count divided by 60
    RequestsPerMinute,
    /// Raw event count in the window
    RequestsPerHour,
    /// Percentage of events with status >= 400
    ErrorRate,
    /// 95th percentile latency (nearest-rank)
    LatencyP95,
    /// 99th percentile latency (nearest-rank)
    LatencyP99,
    /// Total tokens in the window
    TokenUsagePerHour,
    /// Total tokens divided by 24
    TokenUsagePerDay,
}

impl MetricKind {
    /// Parse a stored metric string
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "cost_per_hour" => Self::CostPerHour,
            "cost_per_day" => Self::CostPerDay,
            "cost_per_week" => Self::CostPerWeek,
            "cost_per_month" => Self::CostPerMonth,
            "requests_per_minute" => Self::RequestsPerMinute,
            "requests_per_hour" => Self::RequestsPerHour,
            "error_rate" => Self::ErrorRate,
            "latency_p95" => Self::LatencyP95,
            "latency_p99" => Self::LatencyP99,
            "token_usage_per_hour" => Self::TokenUsagePerHour,
            "token_usage_per_day" => Self::TokenUsagePerDay,
            _ => return None,
        };
        Some(kind)
    }

    /// Storage representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CostPerHour => "cost_per_hour",
            Self::CostPerDay => "cost_per_day",
            Self::CostPerWeek => "cost_per_week",
            Self::CostPerMonth => "cost_per_month",
            Self::RequestsPerMinute => "requests_per_minute",
            Self::RequestsPerHour => "requests_per_hour",
            Self::ErrorRate => "error_rate",
            Self::LatencyP95 => "latency_p95",
            Self::LatencyP99 => "latency_p99",
            Self::TokenUsagePerHour => "token_usage_per_hour",
            Self::TokenUsagePerDay => "token_usage_per_day",
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Greater than
    Gt,
    /// Greater than or equal to
    Gte,
    /// Less than
    Lt,
    /// Less than or equal to
    Lte,
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
}

impl Operator {
    /// Parse a stored operator string
    pub fn parse(s: &str) -> Option<Self> {
        let op = match s {
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            _ => return None,
        };
        Some(op)
    }

    /// Compare a computed value against a threshold
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq => (value - threshold).abs() < f64::EPSILON,
            Self::Ne => (value - threshold).abs() >= f64::EPSILON,
        }
    }
}

/// Check whether a computed metric value breaches a threshold.
///
/// An unrecognized operator never triggers; operator validity is enforced
/// upstream where configs are written.
pub fn is_triggered(value: f64, threshold: f64, operator: &str) -> bool {
    Operator::parse(operator).is_some_and(|op| op.compare(value, threshold))
}

/// Notification channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationChannel {
    /// Email notification
    Email { to: String },
    /// Signed webhook POST
    Webhook {
        url: String,
        headers: Option<serde_json::Value>,
    },
    /// Slack incoming webhook
    Slack {
        webhook_url: String,
        channel: Option<String>,
    },
}

/// A tenant-owned alert rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Unique identifier
    pub id: Uuid,

    /// Owning organization
    pub org_id: Uuid,

    /// Human-readable name
    pub name: String,

    /// Description of what this alert monitors
    pub description: Option<String>,

    /// Kind of rule
    pub kind: AlertKind,

    /// Metric to monitor (e.g., "error_rate", "cost_per_day")
    pub metric: String,

    /// Threshold value
    pub threshold_value: f64,

    /// Comparison operator ("gt", "gte", "lt", "lte", "eq", "ne")
    pub operator: String,

    /// Trailing window length in minutes
    pub time_window_minutes: i64,

    /// Whether the rule is evaluated
    pub is_active: bool,

    /// Notification channels
    pub notification_channels: Vec<NotificationChannel>,

    /// Dimension allow-lists narrowing the event set
    pub filters: DimensionFilters,

    /// When the rule was created
    pub created_at: DateTime<Utc>,

    /// When the rule was last updated
    pub updated_at: DateTime<Utc>,
}

impl AlertConfig {
    /// Lazy validation run before each evaluation.
    ///
    /// The management API validates on write; the core re-checks so a bad row
    /// fails its own evaluation instead of the tenant's whole pass.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.time_window_minutes < 1 || self.time_window_minutes > 10_080 {
            return Err(crate::error::Error::invalid_config(format!(
                "time window must be 1..=10080 minutes, got {}",
                self.time_window_minutes
            )));
        }

        if matches!(self.kind, AlertKind::Threshold | AlertKind::Budget)
            && self.threshold_value < 0.0
        {
            return Err(crate::error::Error::invalid_config(format!(
                "threshold must be non-negative for {} alerts, got {}",
                self.kind.as_str(),
                self.threshold_value
            )));
        }

        Ok(())
    }

    /// Email recipients configured on this alert
    pub fn email_recipients(&self) -> impl Iterator<Item = &str> {
        self.notification_channels.iter().filter_map(|c| match c {
            NotificationChannel::Email { to } => Some(to.as_str()),
            _ => None,
        })
    }
}

/// Status of a recorded trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerStatus {
    /// Breach is standing
    #[default]
    Triggered,
    /// Breach has been resolved
    Resolved,
}

impl TriggerStatus {
    /// Parse a stored status string; unknown values fall back to triggered
    pub fn parse(s: &str) -> Self {
        match s {
            "resolved" => Self::Resolved,
            _ => Self::Triggered,
        }
    }

    /// Storage representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Triggered => "triggered",
            Self::Resolved => "resolved",
        }
    }
}

/// Evaluation context captured on a trigger, stored as JSONB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerContext {
    /// The computed metric value
    pub metric_value: f64,

    /// The configured threshold
    pub threshold_value: f64,

    /// The configured window length in minutes
    pub time_window_minutes: i64,

    /// The dimension filters that narrowed the window
    pub filters_applied: DimensionFilters,

    /// Number of events the metric was computed over, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u64>,
}

/// An immutable record of one detected threshold breach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertTrigger {
    /// Unique identifier
    pub id: Uuid,

    /// The alert config that breached
    pub alert_config_id: Uuid,

    /// When the breach was detected
    pub triggered_at: DateTime<Utc>,

    /// The metric value at detection time
    pub metric_value: f64,

    /// Evaluation context
    pub context: TriggerContext,

    /// Current status
    pub status: TriggerStatus,

    /// When the breach was resolved (if resolved)
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Outcome of evaluating one alert config.
///
/// `is_triggered` reflects the comparison itself; `trigger_id` is set only
/// when a fresh trigger row was recorded this pass (suppression leaves it
/// `None` while the comparison still reads true).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvaluation {
    /// The evaluated config
    pub alert_config_id: Uuid,

    /// Whether the metric breached the threshold
    pub is_triggered: bool,

    /// The computed metric value
    pub metric_value: f64,

    /// Evaluation context
    pub context: TriggerContext,

    /// Freshly inserted trigger row, when suppression allowed one
    pub trigger_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("gt", 2.0, 1.0, true)]
    #[case("gt", 1.0, 1.0, false)]
    #[case("gte", 1.0, 1.0, true)]
    #[case("gte", 0.5, 1.0, false)]
    #[case("lt", 0.5, 1.0, true)]
    #[case("lt", 1.0, 1.0, false)]
    #[case("lte", 1.0, 1.0, true)]
    #[case("lte", 1.5, 1.0, false)]
    #[case("eq", 1.0, 1.0, true)]
    #[case("eq", 1.1, 1.0, false)]
    #[case("ne", 1.1, 1.0, true)]
    #[case("ne", 1.0, 1.0, false)]
    fn operator_comparisons(
        #[case] operator: &str,
        #[case] value: f64,
        #[case] threshold: f64,
        #[case] expected: bool,
    ) {
        assert_eq!(is_triggered(value, threshold, operator), expected);
    }

    #[rstest]
    #[case("")]
    #[case("between")]
    #[case("GT")]
    fn unknown_operator_never_triggers(#[case] operator: &str) {
        assert!(!is_triggered(f64::MAX, f64::MIN, operator));
        assert!(!is_triggered(0.0, 0.0, operator));
    }

    #[test]
    fn metric_kind_round_trips() {
        for s in [
            "cost_per_hour",
            "cost_per_day",
            "cost_per_week",
            "cost_per_month",
            "requests_per_minute",
            "requests_per_hour",
            "error_rate",
            "latency_p95",
            "latency_p99",
            "token_usage_per_hour",
            "token_usage_per_day",
        ] {
            let kind = MetricKind::parse(s).expect(s);
            assert_eq!(kind.as_str(), s);
        }

        assert_eq!(MetricKind::parse("tokens_per_fortnight"), None);
    }

    fn base_config() -> AlertConfig {
        AlertConfig {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            name: "error spike".to_string(),
            description: None,
            kind: AlertKind::Threshold,
            metric: "error_rate".to_string(),
            threshold_value: 5.0,
            operator: "gt".to_string(),
            time_window_minutes: 60,
            is_active: true,
            notification_channels: vec![NotificationChannel::Email {
                to: "oncall@example.com".to_string(),
            }],
            filters: DimensionFilters::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn validation_rejects_bad_window() {
        let mut config = base_config();
        config.time_window_minutes = 0;
        assert!(config.validate().is_err());

        config.time_window_minutes = 10_081;
        assert!(config.validate().is_err());

        config.time_window_minutes = 10_080;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_negative_threshold_for_budget() {
        let mut config = base_config();
        config.kind = AlertKind::Budget;
        config.threshold_value = -1.0;
        assert!(config.validate().is_err());

        // Anomaly rules may use signed scores
        config.kind = AlertKind::Anomaly;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn email_recipients_filters_channels() {
        let mut config = base_config();
        config.notification_channels.push(NotificationChannel::Webhook {
            url: "https://example.com/hook".to_string(),
            headers: None,
        });

        let recipients: Vec<&str> = config.email_recipients().collect();
        assert_eq!(recipients, vec!["oncall@example.com"]);
    }
}
