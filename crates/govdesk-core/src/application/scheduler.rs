//! Background runner for the time-driven operations

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::application::workflow_engine::{SweepReport, WorkflowEngine};

/// Runs [`WorkflowEngine::run_scheduled_sweeps`] on a fixed interval
pub struct WorkflowScheduler {
    engine: Arc<WorkflowEngine>,
    interval: Duration,
}

impl WorkflowScheduler {
    /// Create a scheduler using the engine's configured interval
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        let interval = engine.config().sweep_interval();
        Self { engine, interval }
    }

    /// Override the interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start the loop. It stops when `shutdown` turns `true` or its sender
    /// is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "Workflow scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.engine.run_scheduled_sweeps().await {
                            Ok(report) => {
                                if report != SweepReport::default() {
                                    info!(?report, "Scheduled sweeps applied changes");
                                }
                            }
                            Err(e) => warn!(error = %e, "Scheduled sweeps failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Workflow scheduler stopped");
        })
    }
}
