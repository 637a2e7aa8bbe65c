//! Email notification seam

use async_trait::async_trait;

use crate::error::Result;

/// Outbound email capability, provided by the hosting service.
///
/// Email formatting and SMTP live outside this crate; the dispatcher holds
/// an `Option<Arc<dyn NotificationSender>>` and treats `None` as "email not
/// configured", which is a legitimate deployment rather than an error.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send one alert notification email
    async fn send_alert_email(
        &self,
        to: &str,
        alert_name: &str,
        metric: &str,
        actual_value: f64,
        threshold_value: f64,
        org_name: &str,
    ) -> Result<()>;
}
