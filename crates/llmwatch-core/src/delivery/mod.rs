//! Webhook and notification delivery
//!
//! Builds signed payloads for recorded triggers, posts them to subscribed
//! endpoints with bounded retries, and fans out email notifications.

mod dispatcher;
mod notifier;
mod retry;
mod signature;

pub use dispatcher::DeliveryDispatcher;
pub use notifier::NotificationSender;
pub use retry::{retry_delay, RetryScheduler, TokioRetryScheduler, RETRY_DELAYS};
pub use signature::{sign_payload, SIGNATURE_HEADER};
