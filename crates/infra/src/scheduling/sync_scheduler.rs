//! Cron-driven trigger for sync passes.
//!
//! Each tick runs one [`SyncPass`]: every enabled integration is synced
//! concurrently by the orchestrator, whose per-integration lock keeps a slow
//! run from overlapping the next tick. Join handles are tracked, cancellation
//! is explicit, and every lifecycle step is wrapped in a timeout.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use studiosync_core::SyncOrchestrator;
//! use studiosync_infra::scheduling::{SchedulerResult, SyncScheduler, SyncSchedulerConfig};
//!
//! # async fn example(orchestrator: Arc<SyncOrchestrator>) -> SchedulerResult<()> {
//! let mut scheduler = SyncScheduler::with_config(
//!     SyncSchedulerConfig { cron_expression: "0 */15 * * * *".into(), ..Default::default() },
//!     orchestrator,
//! );
//!
//! scheduler.start().await?;
//! // ... worker runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use studiosync_core::{SyncOrchestrator, SyncOutcome};
use studiosync_domain::constants::DEFAULT_SYNC_CRON;
use studiosync_domain::{Result, SyncConfig};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Counts from one pass over the enabled integrations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub integrations: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Work run on every tick.
#[async_trait]
pub trait SyncPass: Send + Sync {
    async fn run_pass(&self) -> Result<PassSummary>;
}

#[async_trait]
impl SyncPass for SyncOrchestrator {
    async fn run_pass(&self) -> Result<PassSummary> {
        let outcomes = self.run_all_enabled().await?;
        let mut summary = PassSummary { integrations: outcomes.len(), ..PassSummary::default() };
        for (integration_id, outcome) in &outcomes {
            match outcome {
                Ok(SyncOutcome::Completed(_)) => summary.completed += 1,
                Ok(SyncOutcome::AlreadyRunning | SyncOutcome::Skipped { .. }) => summary.skipped += 1,
                Ok(SyncOutcome::TimedOut(_) | SyncOutcome::Failed { .. }) => summary.failed += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(integration_id = %integration_id, error = %err, "sync run could not start");
                }
            }
        }
        Ok(summary)
    }
}

/// Configuration for the sync scheduler.
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Six-field cron expression describing the execution schedule.
    pub cron_expression: String,
    /// Timeout applied to a single pass.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl SyncSchedulerConfig {
    /// Schedule from the engine's sync section. A pass may take as long as
    /// one integration run plus some slack.
    pub fn from_sync_config(sync: &SyncConfig) -> Self {
        Self {
            cron_expression: sync.cron.clone(),
            job_timeout: Duration::from_secs(sync.run_timeout_secs.saturating_add(60)),
            ..Self::default()
        }
    }
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: DEFAULT_SYNC_CRON.into(),
            job_timeout: Duration::from_secs(900),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Sync scheduler with explicit lifecycle management.
pub struct SyncScheduler {
    scheduler: Option<JobScheduler>,
    config: SyncSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    pass: Arc<dyn SyncPass>,
}

impl SyncScheduler {
    pub fn new(cron_expression: String, pass: Arc<dyn SyncPass>) -> Self {
        let config = SyncSchedulerConfig { cron_expression, ..Default::default() };
        Self::with_config(config, pass)
    }

    pub fn with_config(config: SyncSchedulerConfig, pass: Arc<dyn SyncPass>) -> Self {
        Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            pass,
        }
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self), fields(cron = %self.config.cron_expression))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        let start_result = tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?;

        start_result.map_err(|source| SchedulerError::StartFailed { source })?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            Self::monitor_task(cancel).await;
        });

        self.monitor_handle = Some(handle);
        info!("Sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let Some(mut scheduler) = self.scheduler.take() else {
            return Err(SchedulerError::NotRunning);
        };

        let stop_timeout = self.config.stop_timeout;
        let stop_result =
            tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
                .await
                .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?;

        stop_result.map_err(|source| SchedulerError::StopFailed { source })?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        }

        info!("Sync scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Run one pass immediately, outside the cron schedule.
    pub async fn run_now(&self) -> SchedulerResult<Option<PassSummary>> {
        let job_timeout = self.config.job_timeout;
        let run = tokio::time::timeout(job_timeout, Self::perform_pass(self.pass.clone()))
            .await
            .map_err(|source| SchedulerError::Timeout { duration: job_timeout, source })?;
        Ok(run)
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|source| SchedulerError::CreationFailed { source })?;
        let cron_expr = self.config.cron_expression.clone();
        let pass = self.pass.clone();
        let job_timeout = self.config.job_timeout;

        let job_definition = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let pass = pass.clone();

            Box::pin(async move {
                if tokio::time::timeout(job_timeout, Self::perform_pass(pass)).await.is_err() {
                    warn!(timeout_secs = job_timeout.as_secs(), "Sync pass timed out");
                }
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let job_id = job_definition.guid();
        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "Registered sync job");
        Ok(scheduler)
    }

    /// One pass; failures are logged, never propagated into the scheduler.
    async fn perform_pass(pass: Arc<dyn SyncPass>) -> Option<PassSummary> {
        let started = Instant::now();
        match pass.run_pass().await {
            Ok(summary) => {
                info!(
                    integrations = summary.integrations,
                    completed = summary.completed,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Sync pass finished"
                );
                Some(summary)
            }
            Err(err) => {
                error!(error = %err, "Sync pass failed to list integrations");
                None
            }
        }
    }

    async fn monitor_task(cancel: CancellationToken) {
        cancel.cancelled().await;
        debug!("Sync scheduler monitor cancelled");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
