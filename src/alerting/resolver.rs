//! Turns a probe outcome into persisted state and, on a transition, an alert.
//!
//! Steps run strictly in order and each one is safe to replay:
//!
//! 1. read the previous status (latest record, else the target's own status)
//! 2. insert the probe record
//! 3. write the target's current status and last-checked time
//! 4. on a transition, ask the maintenance suppressor
//! 5. claim the ledger entry for the transition record
//! 6. notify and complete the ledger entry
//! 7. prune history when retention runs on write
//!
//! A crash between steps leaves at most a stale status (fixed by the next
//! probe) or a ledger entry stuck in `pending`, which is never re-sent.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::maintenance::MaintenanceSuppressor;
use crate::db::entities::{monitored_target, probe_record};
use crate::db::enums::{DispatchOutcome, MonitorStatus};
use crate::db::retention::RetentionManager;
use crate::db::{MonitorStore, NewNotificationAttempt, StoreError};
use crate::monitoring::outcome::ProbeOutcome;
use crate::notifications::{AlertContext, Notifier};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What happened on the alerting side of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum AlertDecision {
    /// Status unchanged.
    NoTransition,
    /// First resolution out of `pending`; establishes the baseline silently.
    Baseline,
    Suppressed,
    /// Alerting disabled or no destination configured.
    Skipped,
    /// Another resolution already owns this transition.
    AlreadyClaimed,
    Delivered,
    Failed(String),
}

impl AlertDecision {
    pub fn attempted(&self) -> bool {
        matches!(self, AlertDecision::Delivered | AlertDecision::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub target_id: i32,
    pub record_id: i32,
    pub previous_status: MonitorStatus,
    pub status: MonitorStatus,
    pub alert: AlertDecision,
    pub pruned: u64,
}

impl ResolutionOutcome {
    pub fn is_transition(&self) -> bool {
        self.previous_status != self.status
    }
}

pub struct StatusResolver {
    store: Arc<dyn MonitorStore>,
    suppressor: MaintenanceSuppressor,
    notifier: Arc<dyn Notifier>,
    retention: Option<Arc<RetentionManager>>,
}

impl StatusResolver {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        suppressor: MaintenanceSuppressor,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            suppressor,
            notifier,
            retention: None,
        }
    }

    /// Prunes the target's history after every insert.
    pub fn with_retention_on_write(mut self, retention: Arc<RetentionManager>) -> Self {
        self.retention = Some(retention);
        self
    }

    #[instrument(skip_all, fields(target_id = target.id))]
    pub async fn resolve(
        &self,
        target: &monitored_target::Model,
        outcome: ProbeOutcome,
    ) -> Result<ResolutionOutcome, ResolveError> {
        let previous_status = self
            .store
            .latest_probe_record(target.id)
            .await?
            .map(|r| r.status)
            .unwrap_or(target.status);

        let record = self.store.insert_probe_record(target.id, &outcome).await?;
        self.store
            .update_target_status(target.id, record.status, record.checked_at)
            .await?;

        let alert = if previous_status == record.status {
            AlertDecision::NoTransition
        } else if previous_status == MonitorStatus::Pending {
            info!(record_id = record.id, status = %record.status, "Target baseline established.");
            AlertDecision::Baseline
        } else {
            info!(
                record_id = record.id,
                from = %previous_status,
                to = %record.status,
                "Status transition detected."
            );
            self.dispatch(target, &record, previous_status).await?
        };

        let pruned = match &self.retention {
            Some(retention) => match retention.prune_target(target.id).await {
                Ok(report) => report.deleted_count,
                Err(e) => {
                    error!(error = %e, "Failed to apply retention after insert.");
                    0
                }
            },
            None => 0,
        };

        Ok(ResolutionOutcome {
            target_id: target.id,
            record_id: record.id,
            previous_status,
            status: record.status,
            alert,
            pruned,
        })
    }

    async fn dispatch(
        &self,
        target: &monitored_target::Model,
        record: &probe_record::Model,
        previous_status: MonitorStatus,
    ) -> Result<AlertDecision, ResolveError> {
        // An unreachable suppressor must not silence real outages.
        let suppressed = match self.suppressor.is_suppressed(target.id, record.checked_at).await {
            Ok(suppressed) => suppressed,
            Err(e) => {
                warn!(error = %e, "Maintenance lookup failed; alerting anyway.");
                false
            }
        };

        let destination = target
            .alert_destination
            .as_ref()
            .filter(|_| target.alerts_enabled);

        let initial = if suppressed {
            DispatchOutcome::Suppressed
        } else if destination.is_none() {
            DispatchOutcome::Skipped
        } else {
            DispatchOutcome::Pending
        };

        let claimed = self
            .store
            .claim_notification(NewNotificationAttempt {
                target_id: target.id,
                probe_record_id: record.id,
                from_status: previous_status,
                to_status: record.status,
                outcome: initial,
            })
            .await?;
        if !claimed {
            debug!(record_id = record.id, "Transition already claimed.");
            return Ok(AlertDecision::AlreadyClaimed);
        }

        let destination = match (initial, destination) {
            (DispatchOutcome::Pending, Some(destination)) => destination,
            (DispatchOutcome::Suppressed, _) => {
                info!(record_id = record.id, "Alert suppressed by maintenance window.");
                return Ok(AlertDecision::Suppressed);
            }
            _ => return Ok(AlertDecision::Skipped),
        };

        let owner_name = self
            .store
            .get_user(target.user_id)
            .await?
            .map(|u| u.display_name)
            .unwrap_or_default();
        let alert = AlertContext::new(&owner_name, target, record, previous_status);

        let decision = match self.notifier.notify(destination, &alert).await {
            Ok(()) => {
                self.store
                    .complete_notification(record.id, DispatchOutcome::Delivered, None)
                    .await?;
                AlertDecision::Delivered
            }
            Err(e) => {
                warn!(record_id = record.id, error = %e, "Alert delivery failed.");
                self.store
                    .complete_notification(record.id, DispatchOutcome::Failed, Some(e.to_string()))
                    .await?;
                AlertDecision::Failed(e.to_string())
            }
        };
        Ok(decision)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::retention::RetentionPolicy;
    use crate::db::{InMemoryStore, NewMaintenanceWindow, NewTarget};
    use crate::monitoring::outcome::{PhaseTimings, ProbeErrorKind, ProbeFailure};
    use crate::notifications::NotificationError;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Mutex;

    /// Records every alert it is asked to deliver.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: Mutex<Vec<AlertContext>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            _destination: &serde_json::Value,
            alert: &AlertContext,
        ) -> Result<(), NotificationError> {
            self.sent.lock().unwrap().push(alert.clone());
            if self.fail {
                return Err(NotificationError::Template("channel down".to_string()));
            }
            Ok(())
        }
    }

    pub(crate) fn outcome_at(at: DateTime<Utc>, status: MonitorStatus) -> ProbeOutcome {
        match status {
            MonitorStatus::Online => ProbeOutcome::online(at, 200, PhaseTimings::default()),
            _ => ProbeOutcome::offline(
                at,
                PhaseTimings::default(),
                ProbeFailure::new(ProbeErrorKind::ConnectionRefused, "connection refused"),
            ),
        }
    }

    async fn setup(
        notifier: Arc<RecordingNotifier>,
    ) -> (Arc<InMemoryStore>, StatusResolver, monitored_target::Model) {
        let store = Arc::new(InMemoryStore::new());
        let owner = store.insert_user("alice", "Alice").await.unwrap();
        let target = store
            .insert_target(
                NewTarget::website(owner.id, "shop", "https://shop.example")
                    .with_alerts(serde_json::json!({"type": "webhook", "url": "https://hooks.example", "method": "POST"})),
            )
            .await
            .unwrap();
        let resolver = StatusResolver::new(
            store.clone(),
            MaintenanceSuppressor::new(store.clone()),
            notifier,
        );
        (store, resolver, target)
    }

    async fn run_sequence(
        store: &InMemoryStore,
        resolver: &StatusResolver,
        target_id: i32,
        start: DateTime<Utc>,
        statuses: &[MonitorStatus],
    ) -> Vec<ResolutionOutcome> {
        let mut outcomes = Vec::new();
        for (i, status) in statuses.iter().enumerate() {
            let target = store.get_target(target_id).await.unwrap().unwrap();
            let at = start + Duration::minutes(i as i64 * 5);
            outcomes.push(resolver.resolve(&target, outcome_at(at, *status)).await.unwrap());
        }
        outcomes
    }

    #[tokio::test]
    async fn alerts_fire_only_on_changes() {
        use MonitorStatus::{Offline, Online};
        let notifier = Arc::new(RecordingNotifier::default());
        let (store, resolver, target) = setup(notifier.clone()).await;

        let outcomes = run_sequence(
            &store,
            &resolver,
            target.id,
            Utc::now(),
            &[Online, Online, Offline, Offline, Online],
        )
        .await;

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].status, Offline);
        assert_eq!(sent[0].owner_name, "Alice");
        assert_eq!(
            sent[0].error.as_deref(),
            Some("CONNECTION_REFUSED: connection refused")
        );
        assert_eq!(sent[1].status, Online);
        assert_eq!(sent[1].previous_status, Offline);

        assert_eq!(outcomes[0].alert, AlertDecision::Baseline);
        assert_eq!(outcomes[1].alert, AlertDecision::NoTransition);
        assert_eq!(outcomes[3].alert, AlertDecision::NoTransition);

        let current = store.get_target(target.id).await.unwrap().unwrap();
        assert_eq!(current.status, Online);
        let attempts = store.notification_attempts_for_target(target.id).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(attempts.iter().all(|a| a.outcome == DispatchOutcome::Delivered));
    }

    #[tokio::test]
    async fn maintenance_window_suppresses_transitions_inside_it() {
        use MonitorStatus::{Offline, Online};
        let notifier = Arc::new(RecordingNotifier::default());
        let (store, resolver, target) = setup(notifier.clone()).await;

        let start = Utc::now();
        let t1 = start + Duration::minutes(5);
        let t2 = start + Duration::minutes(10);
        store
            .insert_maintenance_window(NewMaintenanceWindow {
                target_id: target.id,
                starts_at: t1,
                ends_at: t2,
                reason: "deploy".to_string(),
                created_by: target.user_id,
                is_active: true,
            })
            .await
            .unwrap();

        // Offline at t1 and back online at t2: both inside the window.
        let outcomes =
            run_sequence(&store, &resolver, target.id, start, &[Online, Offline, Online]).await;
        assert_eq!(outcomes[1].alert, AlertDecision::Suppressed);
        assert_eq!(outcomes[2].alert, AlertDecision::Suppressed);
        assert!(notifier.sent.lock().unwrap().is_empty());

        // One millisecond after the window closes the alert goes out.
        let target_now = store.get_target(target.id).await.unwrap().unwrap();
        let late = resolver
            .resolve(&target_now, outcome_at(t2 + Duration::milliseconds(1), Offline))
            .await
            .unwrap();
        assert_eq!(late.alert, AlertDecision::Delivered);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);

        let attempts = store.notification_attempts_for_target(target.id).await.unwrap();
        assert_eq!(
            attempts.iter().map(|a| a.outcome).collect::<Vec<_>>(),
            vec![
                DispatchOutcome::Suppressed,
                DispatchOutcome::Suppressed,
                DispatchOutcome::Delivered
            ]
        );
    }

    #[tokio::test]
    async fn delivery_failure_keeps_the_new_status() {
        use MonitorStatus::{Offline, Online};
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let (store, resolver, target) = setup(notifier).await;

        let outcomes = run_sequence(&store, &resolver, target.id, Utc::now(), &[Online, Offline]).await;
        assert!(matches!(outcomes[1].alert, AlertDecision::Failed(_)));

        let current = store.get_target(target.id).await.unwrap().unwrap();
        assert_eq!(current.status, Offline);
        let attempts = store.notification_attempts_for_target(target.id).await.unwrap();
        assert_eq!(attempts[0].outcome, DispatchOutcome::Failed);
        assert_eq!(attempts[0].detail.as_deref(), Some("Templating error: channel down"));
    }

    #[tokio::test]
    async fn targets_without_alerting_record_a_skip() {
        use MonitorStatus::{Offline, Online};
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(InMemoryStore::new());
        let owner = store.insert_user("bob", "Bob").await.unwrap();
        let target = store
            .insert_target(NewTarget::website(owner.id, "blog", "blog.example"))
            .await
            .unwrap();
        let resolver = StatusResolver::new(
            store.clone(),
            MaintenanceSuppressor::new(store.clone()),
            notifier.clone(),
        );

        let outcomes = run_sequence(&store, &resolver, target.id, Utc::now(), &[Online, Offline]).await;
        assert_eq!(outcomes[1].alert, AlertDecision::Skipped);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn claimed_transition_is_not_sent_twice() {
        use MonitorStatus::Online;
        let notifier = Arc::new(RecordingNotifier::default());
        let (store, resolver, target) = setup(notifier.clone()).await;

        run_sequence(&store, &resolver, target.id, Utc::now(), &[Online]).await;
        let target_now = store.get_target(target.id).await.unwrap().unwrap();
        let record = store.latest_probe_record(target.id).await.unwrap().unwrap();

        // Replaying the dispatch step for an already handled record.
        assert!(store
            .claim_notification(NewNotificationAttempt {
                target_id: target.id,
                probe_record_id: record.id,
                from_status: MonitorStatus::Offline,
                to_status: Online,
                outcome: DispatchOutcome::Pending,
            })
            .await
            .unwrap());
        let replay = resolver
            .dispatch(&target_now, &record, MonitorStatus::Offline)
            .await
            .unwrap();
        assert_eq!(replay, AlertDecision::AlreadyClaimed);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retention_on_write_bounds_history() {
        use MonitorStatus::{Offline, Online};
        let notifier = Arc::new(RecordingNotifier::default());
        let (store, resolver, target) = setup(notifier).await;
        let retention = Arc::new(RetentionManager::new(store.clone(), RetentionPolicy::new(3, 5)));
        let resolver = StatusResolver {
            retention: Some(retention),
            ..resolver
        };

        let mut statuses = vec![Online; 6];
        statuses.push(Offline);
        statuses.extend(vec![Online; 6]);
        run_sequence(&store, &resolver, target.id, Utc::now(), &statuses).await;

        let remaining = store.probe_records_ascending(target.id).await.unwrap();
        assert!(remaining.len() <= 5);
        assert_eq!(remaining.last().unwrap().status, Online);
    }
}
