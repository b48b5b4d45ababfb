use crate::application::ports::{DrainReport, SyncParticipant};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;
pub const RECONNECT_TRIGGER: &str = "online";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorState {
    pub can_install: bool,
    pub is_installed: bool,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MonitorEvent {
    InstallAvailable,
    Installed,
    Online,
    Offline,
    SyncCompleted(DrainReport),
    SyncFailed(String),
}

#[derive(Debug, Default)]
struct Flags {
    prompt_available: bool,
    installed: bool,
    online: bool,
}

impl Flags {
    fn snapshot(&self) -> MonitorState {
        MonitorState {
            can_install: self.prompt_available && !self.installed,
            is_installed: self.installed,
            is_online: self.online,
        }
    }
}

/// インストール可否と接続状態の監視。
///
/// 状態遷移はすべて `MonitorEvent` として配信され、UI 側は購読するだけでよい。
/// オフラインからオンラインに戻った時点で未同期アクションのドレインを起動する。
pub struct ConnectivityMonitor {
    flags: RwLock<Flags>,
    events: broadcast::Sender<MonitorEvent>,
    sync: Arc<dyn SyncParticipant>,
}

impl ConnectivityMonitor {
    pub fn new(sync: Arc<dyn SyncParticipant>, initially_online: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            flags: RwLock::new(Flags {
                online: initially_online,
                ..Flags::default()
            }),
            events,
            sync,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> MonitorState {
        self.flags.read().await.snapshot()
    }

    /// プラットフォームからインストールプロンプトが提示可能になった
    pub async fn install_prompt_available(&self) -> MonitorState {
        let state = {
            let mut flags = self.flags.write().await;
            flags.prompt_available = true;
            flags.snapshot()
        };
        if state.can_install {
            self.publish(MonitorEvent::InstallAvailable);
        }
        state
    }

    pub async fn app_installed(&self) -> MonitorState {
        let (state, changed) = {
            let mut flags = self.flags.write().await;
            let changed = !flags.installed;
            flags.installed = true;
            flags.prompt_available = false;
            (flags.snapshot(), changed)
        };
        if changed {
            info!("app installed");
            self.publish(MonitorEvent::Installed);
        }
        state
    }

    /// 接続状態の変化を反映する。オフライン→オンラインの遷移ではドレイン結果を返す。
    pub async fn set_online(&self, online: bool) -> Option<DrainReport> {
        let was_online = {
            let mut flags = self.flags.write().await;
            std::mem::replace(&mut flags.online, online)
        };
        if was_online == online {
            return None;
        }

        if !online {
            info!("connection lost");
            self.publish(MonitorEvent::Offline);
            return None;
        }

        info!("connection restored; syncing pending actions");
        self.publish(MonitorEvent::Online);

        // 実行中のドレインがあれば終わるのを待ってから送り直す
        match self.sync.sync_pending_after_current(RECONNECT_TRIGGER).await {
            Ok(report) if report.skipped => {
                warn!("sync after reconnect was skipped");
                Some(report)
            }
            Ok(report) => {
                self.publish(MonitorEvent::SyncCompleted(report.clone()));
                Some(report)
            }
            Err(err) => {
                warn!(error = %err, "sync after reconnect failed");
                self.publish(MonitorEvent::SyncFailed(err.to_string()));
                None
            }
        }
    }

    fn publish(&self, event: MonitorEvent) {
        // 購読者がいない場合の送信エラーは無視してよい
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::error::AppError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingSync {
        calls: AtomicU32,
        fail: bool,
        busy: bool,
    }

    #[async_trait]
    impl SyncParticipant for CountingSync {
        async fn sync_pending(&self, _trigger: &str) -> Result<DrainReport, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Database("locked".into()));
            }
            if self.busy {
                return Ok(DrainReport {
                    skipped: true,
                    ..DrainReport::default()
                });
            }
            Ok(DrainReport {
                attempted: 1,
                synced: 1,
                ..DrainReport::default()
            })
        }
    }

    #[tokio::test]
    async fn can_install_requires_prompt_and_not_installed() {
        let monitor = ConnectivityMonitor::new(Arc::new(CountingSync::default()), true);
        assert!(!monitor.state().await.can_install);

        assert!(monitor.install_prompt_available().await.can_install);

        let state = monitor.app_installed().await;
        assert!(state.is_installed);
        assert!(!state.can_install);

        // インストール後にプロンプトが来ても提示しない
        assert!(!monitor.install_prompt_available().await.can_install);
    }

    #[tokio::test]
    async fn reconnect_triggers_exactly_one_sync() {
        let sync = Arc::new(CountingSync::default());
        let monitor = ConnectivityMonitor::new(sync.clone(), true);
        let mut events = monitor.subscribe();

        assert!(monitor.set_online(false).await.is_none());
        let report = monitor.set_online(true).await.unwrap();
        assert_eq!(report.synced, 1);
        // 既にオンラインなら何もしない
        assert!(monitor.set_online(true).await.is_none());

        assert_eq!(sync.calls.load(Ordering::SeqCst), 1);
        assert_eq!(events.recv().await.unwrap(), MonitorEvent::Offline);
        assert_eq!(events.recv().await.unwrap(), MonitorEvent::Online);
        assert!(matches!(
            events.recv().await.unwrap(),
            MonitorEvent::SyncCompleted(_)
        ));
    }

    #[tokio::test]
    async fn sync_failure_is_published() {
        let sync = Arc::new(CountingSync {
            fail: true,
            ..CountingSync::default()
        });
        let monitor = ConnectivityMonitor::new(sync, false);
        let mut events = monitor.subscribe();

        assert!(monitor.set_online(true).await.is_none());
        assert_eq!(events.recv().await.unwrap(), MonitorEvent::Online);
        assert!(matches!(
            events.recv().await.unwrap(),
            MonitorEvent::SyncFailed(_)
        ));
        assert!(monitor.state().await.is_online);
    }

    #[tokio::test]
    async fn skipped_sync_is_not_reported_as_completed() {
        let sync = Arc::new(CountingSync {
            busy: true,
            ..CountingSync::default()
        });
        let monitor = ConnectivityMonitor::new(sync, false);
        let mut events = monitor.subscribe();

        let report = monitor.set_online(true).await.unwrap();
        assert!(report.skipped);

        assert_eq!(events.recv().await.unwrap(), MonitorEvent::Online);
        assert!(events.try_recv().is_err());
    }
}
