use crate::application::local_records::LocalRecords;
use crate::application::ports::{Clock, DrainReport, SyncGateway, SyncParticipant};
use crate::domain::value_objects::UserId;
use crate::shared::error::AppError;
use crate::shared::metrics;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// アウトボックスの送り出し。
///
/// 1 件ずつ順番に配送し、成功したものだけを同期済みにする。途中の失敗は記録して
/// 次のアクションへ進む。ドレインは同時に 1 本だけ走る。
pub struct OutboxService {
    records: LocalRecords,
    gateway: Arc<dyn SyncGateway>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    gate: Mutex<()>,
}

impl OutboxService {
    pub fn new(
        records: LocalRecords,
        gateway: Arc<dyn SyncGateway>,
        clock: Arc<dyn Clock>,
        retention_days: u32,
    ) -> Self {
        Self {
            records,
            gateway,
            clock,
            retention: Duration::days(i64::from(retention_days)),
            gate: Mutex::new(()),
        }
    }

    /// 別のドレインが実行中なら何もしない
    pub async fn drain(
        &self,
        user_id: Option<&UserId>,
        trigger: &str,
    ) -> Result<DrainReport, AppError> {
        let Ok(_guard) = self.gate.try_lock() else {
            debug!(trigger, "drain already running; skipping");
            return Ok(DrainReport {
                skipped: true,
                ..DrainReport::default()
            });
        };
        self.drain_locked(user_id, trigger).await
    }

    /// 実行中のドレインの完了を待ち、その後にもう一度送り出す
    pub async fn drain_after_current(
        &self,
        user_id: Option<&UserId>,
        trigger: &str,
    ) -> Result<DrainReport, AppError> {
        let _guard = self.gate.lock().await;
        self.drain_locked(user_id, trigger).await
    }

    async fn drain_locked(
        &self,
        user_id: Option<&UserId>,
        trigger: &str,
    ) -> Result<DrainReport, AppError> {
        let pending = self.records.unsynced_actions(user_id).await?;
        let mut report = DrainReport::default();

        for action in &pending {
            report.attempted += 1;
            match self.gateway.deliver(action).await {
                Ok(()) => {
                    // ローカルの書き込み失敗は致命的なのでそのまま返す
                    self.records
                        .mark_action_synced(&action.id, self.clock.now())
                        .await?;
                    report.synced += 1;
                }
                Err(err) => {
                    warn!(
                        action_id = %action.id,
                        action_type = %action.action_type,
                        error = %err,
                        "failed to deliver offline action"
                    );
                    report.failed += 1;
                    report.failed_ids.push(action.id.to_string());
                }
            }
        }

        report.pruned = self.prune().await?;

        metrics::record_drain_pass(
            trigger,
            u64::from(report.synced),
            u64::from(report.failed),
            report.pruned,
        );
        if report.attempted > 0 || report.pruned > 0 {
            info!(
                trigger,
                attempted = report.attempted,
                synced = report.synced,
                failed = report.failed,
                pruned = report.pruned,
                "outbox drain finished"
            );
        }

        Ok(report)
    }

    async fn prune(&self) -> Result<u64, AppError> {
        let cutoff = self.clock.now() - self.retention;
        self.records.prune_synced_actions(cutoff).await
    }
}

#[async_trait]
impl SyncParticipant for OutboxService {
    async fn sync_pending(&self, trigger: &str) -> Result<DrainReport, AppError> {
        self.drain(None, trigger).await
    }

    async fn sync_pending_after_current(&self, trigger: &str) -> Result<DrainReport, AppError> {
        self.drain_after_current(None, trigger).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{LocalStore, ManualClock};
    use crate::application::services::{ConnectivityMonitor, MonitorEvent};
    use crate::domain::entities::OfflineAction;
    use crate::domain::value_objects::OfflineActionType;
    use crate::infrastructure::storage::SqliteLocalStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    struct ScriptedGateway {
        failing: HashSet<String>,
        delivered: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl SyncGateway for ScriptedGateway {
        async fn deliver(&self, action: &OfflineAction) -> Result<(), AppError> {
            if self.failing.contains(action.id.as_str()) {
                return Err(AppError::Network("503".into()));
            }
            self.delivered.lock().unwrap().push(action.id.to_string());
            Ok(())
        }
    }

    /// 最初の配送だけ解放されるまで止まり、その後オフラインとして失敗する
    #[derive(Default)]
    struct StallingGateway {
        stalled: AtomicBool,
        entered: Notify,
        release: Notify,
        delivered: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl SyncGateway for StallingGateway {
        async fn deliver(&self, action: &OfflineAction) -> Result<(), AppError> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
                return Err(AppError::Network("offline".into()));
            }
            self.delivered.lock().unwrap().push(action.id.to_string());
            Ok(())
        }
    }

    fn setup(clock: Arc<ManualClock>) -> LocalRecords {
        let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::in_memory(clock));
        LocalRecords::new(store)
    }

    async fn queue(records: &LocalRecords, clock: &ManualClock, n: usize) -> Vec<OfflineAction> {
        let user = UserId::parse("learner").unwrap();
        let mut actions = vec![];
        for i in 0..n {
            clock.advance(Duration::seconds(1));
            let action = OfflineAction::new(
                user.clone(),
                OfflineActionType::GameScore,
                json!({"score": i}),
                clock.now(),
            )
            .unwrap();
            records.enqueue_action(&action).await.unwrap();
            actions.push(action);
        }
        actions
    }

    #[tokio::test]
    async fn failed_delivery_does_not_stop_the_drain() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap(),
        ));
        let records = setup(clock.clone());
        let actions = queue(&records, &clock, 3).await;

        let gateway = Arc::new(ScriptedGateway {
            failing: HashSet::from([actions[1].id.to_string()]),
            delivered: StdMutex::new(vec![]),
        });
        let service = OutboxService::new(records.clone(), gateway.clone(), clock.clone(), 7);

        let report = service.drain(None, "test").await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.synced, 2);
        assert_eq!(report.failed_ids, vec![actions[1].id.to_string()]);
        assert!(records.action(&actions[0].id).await.unwrap().unwrap().is_synced());
        assert!(!records.action(&actions[1].id).await.unwrap().unwrap().is_synced());
        assert!(records.action(&actions[2].id).await.unwrap().unwrap().is_synced());
        // 作成順に配送される
        assert_eq!(
            *gateway.delivered.lock().unwrap(),
            vec![actions[0].id.to_string(), actions[2].id.to_string()]
        );
    }

    #[tokio::test]
    async fn synced_actions_are_pruned_after_retention() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap(),
        ));
        let records = setup(clock.clone());
        let actions = queue(&records, &clock, 2).await;
        let gateway = Arc::new(ScriptedGateway {
            failing: HashSet::from([actions[1].id.to_string()]),
            delivered: StdMutex::new(vec![]),
        });
        let service = OutboxService::new(records.clone(), gateway, clock.clone(), 7);

        let first = service.drain(None, "test").await.unwrap();
        assert_eq!(first.pruned, 0);

        clock.advance(Duration::days(8));
        let second = service.drain(None, "test").await.unwrap();

        assert_eq!(second.pruned, 1);
        assert!(records.action(&actions[0].id).await.unwrap().is_none());
        // 未同期のものは保持期間を過ぎても消さない
        assert!(records.action(&actions[1].id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reconnect_during_running_drain_delivers_after_it() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap(),
        ));
        let records = setup(clock.clone());
        let actions = queue(&records, &clock, 1).await;
        let gateway = Arc::new(StallingGateway::default());
        let service = Arc::new(OutboxService::new(
            records.clone(),
            gateway.clone(),
            clock.clone(),
            7,
        ));
        let monitor = Arc::new(ConnectivityMonitor::new(service.clone(), false));
        let mut events = monitor.subscribe();

        let running = tokio::spawn({
            let service = service.clone();
            async move { service.drain(None, "interval").await }
        });
        gateway.entered.notified().await;

        let reconnect = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.set_online(true).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!reconnect.is_finished());
        gateway.release.notify_one();

        let first = running.await.unwrap().unwrap();
        assert_eq!(first.failed, 1);

        let report = reconnect.await.unwrap().unwrap();
        assert!(!report.skipped);
        assert_eq!(report.synced, 1);
        assert!(records.unsynced_actions(None).await.unwrap().is_empty());
        assert_eq!(
            *gateway.delivered.lock().unwrap(),
            vec![actions[0].id.to_string()]
        );

        assert_eq!(events.recv().await.unwrap(), MonitorEvent::Online);
        match events.recv().await.unwrap() {
            MonitorEvent::SyncCompleted(published) => assert_eq!(published.synced, 1),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
