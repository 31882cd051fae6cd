//! Bounded probe history.
//!
//! One policy covers every target: the `keep_recent` newest records always
//! stay, each transition boundary (the record whose status differs from its
//! predecessor, plus that predecessor) stays while it fits, and the oldest
//! record stays when there is room left. The total never exceeds
//! `max_records`; when boundaries compete for space the oldest record goes
//! first, then the oldest boundary pairs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, instrument};

use super::entities::probe_record;
use super::enums::MonitorStatus;
use super::store::MonitorStore;
use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_recent: usize,
    pub max_records: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_recent: 10,
            max_records: 15,
        }
    }
}

impl RetentionPolicy {
    /// `max_records` is raised so it always leaves room for the recent
    /// window plus one more record.
    pub fn new(keep_recent: usize, max_records: usize) -> Self {
        let keep_recent = keep_recent.max(1);
        Self {
            keep_recent,
            max_records: max_records.max(keep_recent + 1),
        }
    }
}

/// Where the single retention policy is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionMode {
    #[default]
    OnWrite,
    Scheduled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub deleted_count: u64,
}

/// Picks the positions to delete from a target's history. `statuses` must be
/// ordered oldest first.
pub fn plan_prune(statuses: &[MonitorStatus], policy: RetentionPolicy) -> Vec<usize> {
    let len = statuses.len();
    if len <= policy.keep_recent {
        return Vec::new();
    }

    let recent_start = len - policy.keep_recent;
    let mut keep: BTreeSet<usize> = (recent_start..len).collect();

    // Boundary pairs outside the recent window, newest first.
    let mut pairs: Vec<(usize, usize)> = (1..len)
        .filter(|&i| statuses[i] != statuses[i - 1])
        .map(|i| (i - 1, i))
        .filter(|&(before, _)| before < recent_start)
        .collect();
    pairs.reverse();

    // Pairs arrive newest first, so a pair only shares a record with the
    // recent window (the first pair) or with the pair handled just before it.
    // Once one pair no longer fits, no older pair fits either.
    for (before, after) in pairs {
        let extra = [before, after].iter().filter(|i| !keep.contains(i)).count();
        if keep.len() + extra > policy.max_records {
            break;
        }
        keep.insert(before);
        keep.insert(after);
    }

    if keep.len() < policy.max_records {
        keep.insert(0);
    }

    (0..len).filter(|i| !keep.contains(i)).collect()
}

pub struct RetentionManager {
    store: Arc<dyn MonitorStore>,
    policy: RetentionPolicy,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn MonitorStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    #[instrument(skip(self))]
    pub async fn prune_target(&self, target_id: i32) -> Result<PruneReport, StoreError> {
        let records: Vec<probe_record::Model> =
            self.store.probe_records_ascending(target_id).await?;
        let statuses: Vec<MonitorStatus> = records.iter().map(|r| r.status).collect();

        let doomed: Vec<i32> = plan_prune(&statuses, self.policy)
            .into_iter()
            .map(|i| records[i].id)
            .collect();

        if doomed.is_empty() {
            return Ok(PruneReport::default());
        }

        let deleted_count = self.store.delete_probe_records(&doomed).await?;
        debug!(target_id, deleted_count, "Pruned probe history.");
        Ok(PruneReport { deleted_count })
    }

    /// Applies the policy to every target. A failure on one target is logged
    /// and does not stop the others.
    pub async fn prune_all(&self) -> Result<PruneReport, StoreError> {
        let target_ids = self.store.list_target_ids().await?;
        let mut report = PruneReport::default();

        for target_id in target_ids {
            match self.prune_target(target_id).await {
                Ok(r) => report.deleted_count += r.deleted_count,
                Err(e) => error!(target_id, error = %e, "Failed to prune probe history."),
            }
        }

        info!(deleted_count = report.deleted_count, "Retention sweep finished.");
        Ok(report)
    }

    pub async fn run_periodic(
        self: Arc<Self>,
        every: Duration,
        mut shutdown_rx: tokio::sync::watch::Receiver<()>,
    ) {
        info!(interval_seconds = every.as_secs(), "Retention sweep task started.");
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Retention sweep task received shutdown signal.");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.prune_all().await {
                        error!(error = %e, "Error during retention sweep.");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryStore;
    use crate::db::store::NewTarget;
    use crate::monitoring::outcome::{PhaseTimings, ProbeErrorKind, ProbeFailure, ProbeOutcome};
    use chrono::{Duration as ChronoDuration, Utc};
    use MonitorStatus::{Offline, Online};

    fn kept(statuses: &[MonitorStatus], policy: RetentionPolicy) -> Vec<usize> {
        let doomed = plan_prune(statuses, policy);
        (0..statuses.len()).filter(|i| !doomed.contains(i)).collect()
    }

    #[test]
    fn short_history_is_untouched() {
        let statuses = vec![Online; 10];
        assert!(plan_prune(&statuses, RetentionPolicy::default()).is_empty());
    }

    #[test]
    fn outage_inside_recent_window_survives() {
        // online x8, offline x1, online x5
        let mut statuses = vec![Online; 8];
        statuses.push(Offline);
        statuses.extend(vec![Online; 5]);
        let policy = RetentionPolicy::new(10, 15);

        let survivors = kept(&statuses, policy);
        assert!(survivors.contains(&8), "offline record must survive");
        assert!(survivors.contains(&7), "its predecessor must survive");
        for i in 4..14 {
            assert!(survivors.contains(&i));
        }
        assert!(survivors.contains(&0));
        assert_eq!(plan_prune(&statuses, policy), vec![1, 2, 3]);
    }

    #[test]
    fn boundary_pair_older_than_recent_window_is_kept() {
        // Outage at index 3, followed by 20 online checks.
        let mut statuses = vec![Online; 3];
        statuses.push(Offline);
        statuses.extend(vec![Online; 20]);
        let policy = RetentionPolicy::new(10, 15);

        let survivors = kept(&statuses, policy);
        for i in [2, 3, 4] {
            assert!(survivors.contains(&i), "boundary record {i} must survive");
        }
        assert!(survivors.contains(&0));
        assert_eq!(survivors.len(), 14);
    }

    #[test]
    fn flapping_history_never_exceeds_the_ceiling() {
        let statuses: Vec<MonitorStatus> = (0..60)
            .map(|i| if i % 2 == 0 { Online } else { Offline })
            .collect();
        let policy = RetentionPolicy::new(10, 15);

        let survivors = kept(&statuses, policy);
        assert!(survivors.len() <= policy.max_records);
        for i in 50..60 {
            assert!(survivors.contains(&i), "recent record {i} must survive");
        }
    }

    #[test]
    fn no_half_kept_boundary_pair_is_left_with_room_to_spare() {
        let policy = RetentionPolicy::new(4, 7);
        for bits in 0u32..(1 << 12) {
            let statuses: Vec<MonitorStatus> = (0..12)
                .map(|i| if bits & (1 << i) == 0 { Online } else { Offline })
                .collect();
            let survivors = kept(&statuses, policy);
            assert!(survivors.len() <= policy.max_records);
            if survivors.len() == policy.max_records {
                continue;
            }
            for i in 1..statuses.len() {
                if statuses[i] != statuses[i - 1] {
                    assert!(
                        survivors.contains(&(i - 1)) && survivors.contains(&i),
                        "pair ({}, {i}) dropped with room left in {statuses:?}",
                        i - 1
                    );
                }
            }
        }
    }

    #[test]
    fn ceiling_is_raised_above_recent_window() {
        let policy = RetentionPolicy::new(10, 4);
        assert_eq!(policy.max_records, 11);
    }

    #[tokio::test]
    async fn manager_reports_deleted_count() {
        let store = Arc::new(InMemoryStore::new());
        let owner = store.insert_user("ops", "Ops").await.unwrap();
        let target = store
            .insert_target(NewTarget::website(owner.id, "site", "https://example.com"))
            .await
            .unwrap();

        let base = Utc::now();
        for i in 0..14 {
            let at = base + ChronoDuration::minutes(i);
            let outcome = if i == 8 {
                ProbeOutcome::offline(
                    at,
                    PhaseTimings::default(),
                    ProbeFailure::new(ProbeErrorKind::Timeout, "timed out"),
                )
            } else {
                ProbeOutcome::online(at, 200, PhaseTimings::default())
            };
            store.insert_probe_record(target.id, &outcome).await.unwrap();
        }

        let manager = RetentionManager::new(store.clone(), RetentionPolicy::new(10, 15));
        let report = manager.prune_all().await.unwrap();
        assert_eq!(report.deleted_count, 3);

        let remaining = store.probe_records_ascending(target.id).await.unwrap();
        assert_eq!(remaining.len(), 11);
        assert!(remaining.iter().any(|r| r.status == Offline));

        // A second pass over the pruned history is a no-op.
        assert_eq!(manager.prune_all().await.unwrap().deleted_count, 0);
    }

    #[tokio::test]
    async fn periodic_task_prunes_then_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let owner = store.insert_user("ops", "Ops").await.unwrap();
        let target = store
            .insert_target(NewTarget::website(owner.id, "site", "https://example.com"))
            .await
            .unwrap();
        let base = Utc::now();
        for i in 0..20 {
            let outcome = ProbeOutcome::online(base + ChronoDuration::minutes(i), 200, PhaseTimings::default());
            store.insert_probe_record(target.id, &outcome).await.unwrap();
        }

        let manager = Arc::new(RetentionManager::new(store.clone(), RetentionPolicy::new(10, 15)));
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
        let handle = tokio::spawn(manager.run_periodic(Duration::from_secs(3600), shutdown_rx));

        // The first tick fires immediately.
        let pruned = time::timeout(Duration::from_secs(5), async {
            loop {
                let remaining = store.probe_records_ascending(target.id).await.unwrap();
                if remaining.len() < 20 {
                    return remaining.len();
                }
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        // Ten recent records plus the oldest one.
        assert_eq!(pruned, 11);

        shutdown_tx.send(()).unwrap();
        time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
