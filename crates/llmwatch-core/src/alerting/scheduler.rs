//! Recurring driver for alert evaluation and delivery recovery

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::delivery::DeliveryDispatcher;
use crate::error::Result;
use crate::store::AlertConfigStore;

use super::evaluator::AlertEvaluator;

/// Drives the evaluation/dispatch cycle on a fixed interval.
///
/// One driver task owns the timer; ticks run on its sequential await chain,
/// so a slow tick delays the next one instead of overlapping it. The handle
/// is created once at process startup and passed to the shutdown hook.
pub struct AlertScheduler {
    evaluator: Arc<AlertEvaluator>,
    dispatcher: Arc<DeliveryDispatcher>,
    configs: Arc<dyn AlertConfigStore>,
    interval: Duration,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AlertScheduler {
    /// Create a new scheduler
    pub fn new(
        interval: Duration,
        evaluator: Arc<AlertEvaluator>,
        dispatcher: Arc<DeliveryDispatcher>,
        configs: Arc<dyn AlertConfigStore>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            evaluator,
            dispatcher,
            configs,
            interval,
            running: AtomicBool::new(false),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    /// Start the recurring driver; the first tick runs immediately.
    ///
    /// Starting an already-running scheduler is a logged no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Alert scheduler already running");
            return;
        }

        info!(interval_secs = self.interval.as_secs(), "Starting alert scheduler");

        let scheduler = self.clone();
        let mut shutdown = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Alert scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.run_tick().await {
                            error!(error = %e, "Alert tick failed");
                        }
                    }
                }
            }
        });

        *self.handle.lock() = Some(handle);
    }

    /// Stop the driver: no new ticks start, and the current tick (if any)
    /// finishes before this returns. In-flight delivery retries are detached
    /// and run to completion on their own timers. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Alert scheduler already stopped");
            return;
        }

        let _ = self.shutdown.send(true);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Alert scheduler task panicked");
            }
        }

        info!("Alert scheduler stopped");
    }

    /// Whether the driver task is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One full pass: evaluate every tenant, dispatch fresh triggers, then
    /// sweep stale failed deliveries.
    pub async fn run_tick(&self) -> Result<()> {
        let tenants = self.configs.list_tenants().await?;
        debug!(tenants = tenants.len(), "Alert tick");

        for org_id in tenants {
            match self.evaluator.evaluate_tenant(org_id).await {
                Ok(results) => {
                    for result in results {
                        // A suppressed breach carries no fresh trigger row;
                        // re-dispatching the previous row here would notify
                        // the same breach again on every tick.
                        let Some(trigger_id) = result.trigger_id else {
                            continue;
                        };

                        if let Err(e) = self.dispatcher.dispatch_alert_triggered(trigger_id).await {
                            error!(
                                %org_id,
                                %trigger_id,
                                error = %e,
                                "Trigger dispatch failed"
                            );
                        }
                    }
                }
                Err(e) => {
                    error!(%org_id, error = %e, "Tenant evaluation failed");
                }
            }
        }

        let swept = self.dispatcher.sweep_failed_deliveries().await?;
        if swept > 0 {
            debug!(swept, "Retried stale deliveries");
        }

        Ok(())
    }
}
