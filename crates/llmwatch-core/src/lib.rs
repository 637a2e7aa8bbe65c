//! # LLMWatch
//!
//! Alert evaluation and webhook delivery engine for LLM usage monitoring.
//!
//! LLMWatch periodically evaluates tenant-defined threshold rules against
//! recorded LLM call telemetry, deduplicates repeat triggers, and delivers
//! signed webhook notifications with bounded retry.
//!
//! ## Architecture
//!
//! - **Alerting**: metric aggregation, threshold evaluation, and the
//!   recurring scheduler that drives both
//! - **Delivery**: signed webhook dispatch with a fixed retry ladder and a
//!   periodic recovery sweep
//! - **Store**: narrow persistence traits with PostgreSQL and in-memory
//!   implementations
//!
//! ## Quick Start
//!
//! ```bash
//! # Run migrations, then start the scheduler
//! llmwatch db migrate
//! llmwatch serve
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod alerting;
pub mod config;
pub mod delivery;
pub mod error;
pub mod models;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertEvaluator, AlertScheduler, MetricAggregator};
    pub use crate::config::Config;
    pub use crate::delivery::{DeliveryDispatcher, NotificationSender, RetryScheduler};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
}
