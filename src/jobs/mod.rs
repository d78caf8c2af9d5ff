//! Scheduled Jobs
//!
//! Background catch-up of the read models. Commands project their own
//! events synchronously; this job repairs whatever a failed or interrupted
//! projection left behind.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;

use crate::projection::{CatchUpReport, ProjectionError, Projector};

/// Configuration for the projection scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval between catch-up passes (default: 5 seconds)
    pub catch_up_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            catch_up_interval: Duration::from_secs(5),
        }
    }
}

/// Report from one catch-up pass
#[derive(Debug, Clone)]
pub struct MaintenanceReport {
    pub streams_advanced: usize,
    pub events_applied: usize,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl MaintenanceReport {
    fn from_outcome(outcome: Result<CatchUpReport, ProjectionError>) -> Self {
        let mut report = Self {
            streams_advanced: 0,
            events_applied: 0,
            errors: Vec::new(),
            completed_at: Utc::now(),
        };
        match outcome {
            Ok(catch_up) => {
                report.streams_advanced = catch_up.streams_advanced;
                report.events_applied = catch_up.events_applied;
            }
            Err(e) => report.errors.push(format!("Projection catch-up: {}", e)),
        }
        report
    }
}

/// Runs the projector's catch-up on an interval
pub struct ProjectionScheduler {
    projector: Projector,
    config: JobSchedulerConfig,
}

impl ProjectionScheduler {
    pub fn new(projector: Projector) -> Self {
        Self {
            projector,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(projector: Projector, config: JobSchedulerConfig) -> Self {
        Self { projector, config }
    }

    /// Start the scheduler in the background.
    /// Returns a handle that can be used to abort it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_until(std::future::pending::<()>()).await;
        })
    }

    /// Run passes until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            interval_ms = self.config.catch_up_interval.as_millis() as u64,
            "Projection scheduler started"
        );

        let mut ticker = interval(self.config.catch_up_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Projection scheduler stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let report = self.run_once().await;
                    for error in &report.errors {
                        tracing::error!(error = %error, "Scheduled catch-up failed");
                    }
                }
            }
        }
    }

    /// Run a single catch-up pass (for manual trigger or testing)
    pub async fn run_once(&self) -> MaintenanceReport {
        let report = MaintenanceReport::from_outcome(self.projector.catch_up().await);
        if report.events_applied > 0 {
            tracing::info!(
                streams_advanced = report.streams_advanced,
                events_applied = report.events_applied,
                "Read models caught up"
            );
        }
        report
    }
}
