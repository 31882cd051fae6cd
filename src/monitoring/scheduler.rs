//! Periodic sweep over active targets.
//!
//! Each tick loads the due targets and pushes them through a fixed pool of
//! workers sharing one queue. A target whose previous probe is still running
//! is skipped, and no work outlives the tick window it was started in.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use super::prober::TargetProber;
use crate::alerting::StatusResolver;
use crate::db::entities::monitored_target;
use crate::db::{MonitorStore, StoreError};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub sweep_interval: Duration,
    pub worker_count: usize,
    /// Stored intervals below this are treated as this many minutes.
    pub min_check_interval_minutes: i32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(300),
            worker_count: 8,
            min_check_interval_minutes: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Due targets left alone because their previous probe is still running.
    pub skipped: usize,
}

type Queue = Arc<Mutex<mpsc::Receiver<monitored_target::Model>>>;

pub struct MonitorScheduler {
    store: Arc<dyn MonitorStore>,
    prober: Arc<dyn TargetProber>,
    resolver: Arc<StatusResolver>,
    settings: SchedulerSettings,
    in_flight: DashMap<i32, ()>,
}

impl MonitorScheduler {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        prober: Arc<dyn TargetProber>,
        resolver: Arc<StatusResolver>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            prober,
            resolver,
            settings: SchedulerSettings {
                worker_count: settings.worker_count.max(1),
                ..settings
            },
            in_flight: DashMap::new(),
        }
    }

    /// Ticks until `shutdown_rx` fires. Sweeps run as their own tasks so a
    /// slow sweep never delays the next tick. On shutdown the loop stops
    /// ticking and waits for running sweeps, each of which ends by its own
    /// tick deadline.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<()>) {
        info!(
            interval_seconds = self.settings.sweep_interval.as_secs(),
            workers = self.settings.worker_count,
            "Monitor scheduler started."
        );
        let mut interval = time::interval(self.settings.sweep_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        let mut sweeps = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Monitor scheduler received shutdown signal.");
                    break;
                }
                Some(joined) = sweeps.join_next(), if !sweeps.is_empty() => {
                    log_sweep(joined);
                }
                tick = interval.tick() => {
                    let this = self.clone();
                    let deadline = tick + this.settings.sweep_interval;
                    sweeps.spawn(async move { this.sweep_until(deadline).await });
                }
            }
        }

        if !sweeps.is_empty() {
            info!(running = sweeps.len(), "Waiting for running sweeps to finish.");
        }
        while let Some(joined) = sweeps.join_next().await {
            log_sweep(joined);
        }
    }

    /// Runs one sweep bounded by a full interval from now.
    pub async fn run_sweep(self: &Arc<Self>) -> Result<SweepReport, StoreError> {
        self.sweep_until(Instant::now() + self.settings.sweep_interval).await
    }

    pub async fn sweep_until(self: &Arc<Self>, deadline: Instant) -> Result<SweepReport, StoreError> {
        let now = Utc::now();
        let targets = self.store.list_active_targets().await?;
        let mut report = SweepReport::default();

        let (tx, rx) = mpsc::channel(self.settings.worker_count * 2);
        let queue: Queue = Arc::new(Mutex::new(rx));
        let workers: Vec<_> = (0..self.settings.worker_count)
            .map(|worker_id| {
                let this = self.clone();
                let queue = queue.clone();
                tokio::spawn(async move { this.worker(worker_id, queue, deadline).await })
            })
            .collect();

        for target in targets.into_iter().filter(|t| self.is_due(t, now)) {
            if self.in_flight.insert(target.id, ()).is_some() {
                debug!(target_id = target.id, "Previous probe still running; skipping.");
                report.skipped += 1;
                continue;
            }
            let target_id = target.id;
            if tx.send(target).await.is_err() {
                self.in_flight.remove(&target_id);
                break;
            }
            report.dispatched += 1;
        }
        drop(tx);

        for handle in workers {
            match handle.await {
                Ok((succeeded, failed)) => {
                    report.succeeded += succeeded;
                    report.failed += failed;
                }
                Err(e) => error!(error = %e, "Sweep worker terminated abnormally."),
            }
        }
        Ok(report)
    }

    /// Due check with half a sweep interval of slack, so the lag between a
    /// tick and the probe's own timestamp never pushes a target to the
    /// following tick.
    fn is_due(&self, target: &monitored_target::Model, now: DateTime<Utc>) -> bool {
        let slack = chrono::Duration::from_std(self.settings.sweep_interval / 2)
            .unwrap_or_else(|_| chrono::Duration::zero());
        target.is_due(now, self.settings.min_check_interval_minutes, slack)
    }

    async fn worker(&self, worker_id: usize, queue: Queue, deadline: Instant) -> (usize, usize) {
        let mut succeeded = 0;
        let mut failed = 0;

        loop {
            let next = queue.lock().await.recv().await;
            let Some(target) = next else { break };
            let target_id = target.id;

            let work = AssertUnwindSafe(self.process(target)).catch_unwind();
            match time::timeout_at(deadline, work).await {
                Ok(Ok(true)) => succeeded += 1,
                Ok(Ok(false)) => failed += 1,
                Ok(Err(panic)) => {
                    error!(
                        worker_id,
                        target_id,
                        panic = panic_message(&*panic),
                        "Target processing panicked."
                    );
                    failed += 1;
                }
                Err(_) => {
                    warn!(worker_id, target_id, "Target processing cut off at the end of its tick.");
                    failed += 1;
                }
            }
            self.in_flight.remove(&target_id);
        }
        (succeeded, failed)
    }

    async fn process(&self, target: monitored_target::Model) -> bool {
        let outcome = self.prober.probe(&target).await;
        match self.resolver.resolve(&target, outcome).await {
            Ok(resolution) => {
                debug!(
                    target_id = target.id,
                    record_id = resolution.record_id,
                    status = %resolution.status,
                    "Target processed."
                );
                true
            }
            Err(e) => {
                error!(target_id = target.id, error = %e, "Failed to resolve probe outcome.");
                false
            }
        }
    }
}

fn log_sweep(joined: Result<Result<SweepReport, StoreError>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(report)) => info!(?report, "Sweep finished."),
        Ok(Err(e)) => error!(error = %e, "Sweep failed to load targets."),
        Err(e) => error!(error = %e, "Sweep task terminated abnormally."),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
