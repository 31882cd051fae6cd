//! Scheduler → prober → resolver → webhook, end to end over the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use uptime_sentinel::alerting::{IncidentLocator, MaintenanceSuppressor, StatusResolver};
use uptime_sentinel::db::entities::monitored_target;
use uptime_sentinel::db::enums::{DispatchOutcome, MonitorStatus};
use uptime_sentinel::db::retention::{RetentionManager, RetentionPolicy};
use uptime_sentinel::db::{InMemoryStore, MonitorStore, NewTarget};
use uptime_sentinel::monitoring::outcome::{PhaseTimings, ProbeErrorKind, ProbeFailure};
use uptime_sentinel::monitoring::{
    MonitorScheduler, ProbeOutcome, SchedulerSettings, TargetProber,
};
use uptime_sentinel::notifications::service::DEFAULT_ALERT_TEMPLATE;
use uptime_sentinel::notifications::NotificationService;

/// Replays a fixed status script, one entry per probe, five minutes apart and
/// far enough in the past that the target is due again on every sweep.
struct ScriptedProber {
    script: Mutex<VecDeque<MonitorStatus>>,
    clock: Mutex<DateTime<Utc>>,
}

impl ScriptedProber {
    fn new(script: &[MonitorStatus]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            clock: Mutex::new(Utc::now() - ChronoDuration::hours(2)),
        }
    }
}

#[async_trait]
impl TargetProber for ScriptedProber {
    async fn probe(&self, _target: &monitored_target::Model) -> ProbeOutcome {
        let status = self.script.lock().unwrap().pop_front().unwrap_or(MonitorStatus::Online);
        let at = {
            let mut clock = self.clock.lock().unwrap();
            *clock += ChronoDuration::minutes(5);
            *clock
        };
        match status {
            MonitorStatus::Online => ProbeOutcome::online(at, 200, PhaseTimings::default()),
            _ => ProbeOutcome::offline(
                at,
                PhaseTimings::default(),
                ProbeFailure::new(ProbeErrorKind::Timeout, "no response"),
            ),
        }
    }
}

/// Minimal webhook receiver: answers 200 to every request and forwards each
/// request body to the returned channel.
async fn webhook_receiver() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/hook", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(body) = complete_body(&buf) {
                        let _ = tx.send(body);
                        break;
                    }
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
            });
        }
    });
    (url, rx)
}

/// Returns the body once headers and `Content-Length` bytes have arrived.
fn complete_body(buf: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(buf);
    let (head, body) = text.split_once("\r\n\r\n")?;
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    (body.len() >= length).then(|| body.to_string())
}

#[tokio::test]
async fn online_offline_online_produces_two_alerts() {
    use MonitorStatus::{Offline, Online};

    let (hook_url, mut deliveries) = webhook_receiver().await;
    let store = Arc::new(InMemoryStore::new());
    let owner = store.insert_user("dana", "Dana").await.unwrap();
    let target = store
        .insert_target(
            NewTarget::website(owner.id, "storefront", "https://storefront.example").with_alerts(
                serde_json::json!({
                    "type": "webhook",
                    "url": hook_url,
                    "method": "POST",
                    "bodyTemplate": "{\"target\": \"{{ target_name }}\", \"status\": \"{{ status }}\"}"
                }),
            ),
        )
        .await
        .unwrap();

    let notifier = Arc::new(
        NotificationService::new(DEFAULT_ALERT_TEMPLATE, Duration::from_secs(5)).unwrap(),
    );
    let retention = Arc::new(RetentionManager::new(store.clone(), RetentionPolicy::default()));
    let resolver = StatusResolver::new(
        store.clone(),
        MaintenanceSuppressor::new(store.clone()),
        notifier,
    )
    .with_retention_on_write(retention);
    let scheduler = Arc::new(MonitorScheduler::new(
        store.clone(),
        Arc::new(ScriptedProber::new(&[Online, Offline, Online])),
        Arc::new(resolver),
        SchedulerSettings {
            sweep_interval: Duration::from_secs(30),
            worker_count: 4,
            min_check_interval_minutes: 1,
        },
    ));

    for _ in 0..3 {
        let report = scheduler.run_sweep().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.succeeded, 1);
    }

    let records = store.probe_records_ascending(target.id).await.unwrap();
    assert_eq!(
        records.iter().map(|r| r.status).collect::<Vec<_>>(),
        vec![Online, Offline, Online]
    );
    let transitions = records.windows(2).filter(|w| w[0].status != w[1].status).count();
    assert_eq!(transitions, 2);

    let attempts = store.notification_attempts_for_target(target.id).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| a.outcome == DispatchOutcome::Delivered));
    assert_eq!(attempts[0].to_status, Offline);
    assert_eq!(attempts[1].to_status, Online);

    let first = tokio::time::timeout(Duration::from_secs(5), deliveries.recv())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), deliveries.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, r#"{"target": "storefront", "status": "offline"}"#);
    assert_eq!(second, r#"{"target": "storefront", "status": "online"}"#);

    let current = store.get_target(target.id).await.unwrap().unwrap();
    assert_eq!(current.status, Online);

    // The outage record can be inspected by its owner.
    let report = IncidentLocator::new(store.clone())
        .locate(owner.id, records[1].id)
        .await
        .unwrap();
    assert_eq!(report.preceding.len(), 1);
    assert_eq!(report.following.len(), 1);
    assert_eq!(report.incident.error_code.as_deref(), Some("TIMEOUT"));
}
