use crate::application::local_records::LocalRecords;
use crate::application::ports::{
    Clock, LocalStore, RemoteProgressStore, SyncGateway, SyncParticipant, SystemClock,
};
use crate::application::services::{
    ConnectivityMonitor, LoadOutcome, OutboxService, ProgressService, ReconciliationService,
};
use crate::domain::entities::UserProgress;
use crate::domain::value_objects::UserId;
use crate::infrastructure::interceptor::{
    Fetcher, MemoryCacheStorage, NetworkInterceptor, ReqwestFetcher,
};
use crate::infrastructure::remote::{HttpRemoteProgressStore, HttpSyncGateway};
use crate::infrastructure::storage::SqliteLocalStore;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 外部とつながるポートの束。テストではモックに差し替える。
pub struct Ports {
    pub store: Arc<dyn LocalStore>,
    pub remote: Arc<dyn RemoteProgressStore>,
    pub gateway: Arc<dyn SyncGateway>,
    pub fetcher: Arc<dyn Fetcher>,
    pub clock: Arc<dyn Clock>,
}

/// アプリケーション全体の状態を管理する構造体
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub records: LocalRecords,
    pub outbox: Arc<OutboxService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub progress: Arc<ProgressService>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub interceptor: Arc<NetworkInterceptor>,
    pub response_caches: MemoryCacheStorage,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = SqliteLocalStore::with_clock(&config.database, clock.clone());
        let origin = Url::parse(&config.interceptor.origin)?;
        let ports = Ports {
            store: Arc::new(store),
            remote: Arc::new(HttpRemoteProgressStore::new(&config.remote)?),
            gateway: Arc::new(HttpSyncGateway::new(&config.remote, &config.sync)?),
            fetcher: Arc::new(ReqwestFetcher::new(
                origin,
                Duration::from_secs(config.remote.timeout_secs),
            )?),
            clock,
        };

        Ok(Self::with_ports(config, ports).await?)
    }

    pub async fn with_ports(config: AppConfig, ports: Ports) -> Result<Self, AppError> {
        ports.store.initialize().await?;
        let records = LocalRecords::new(ports.store);

        let outbox = Arc::new(OutboxService::new(
            records.clone(),
            ports.gateway,
            ports.clock.clone(),
            config.sync.retention_days,
        ));
        let sync: Arc<dyn SyncParticipant> = outbox.clone();

        let reconciliation = Arc::new(ReconciliationService::new(
            ports.remote.clone(),
            records.clone(),
            ports.clock.clone(),
        ));
        let progress = Arc::new(ProgressService::new(
            records.clone(),
            ports.remote,
            ports.clock,
        ));
        let connectivity = Arc::new(ConnectivityMonitor::new(sync.clone(), true));

        let response_caches = MemoryCacheStorage::new();
        let interceptor = Arc::new(NetworkInterceptor::new(
            &config.interceptor,
            &config.sync.background_sync_tag,
            ports.fetcher,
            Arc::new(response_caches.clone()),
            sync,
        )?);

        info!(
            cache_version = %interceptor.cache_names().version,
            "application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            records,
            outbox,
            reconciliation,
            progress,
            connectivity,
            interceptor,
            response_caches,
        })
    }

    /// 進捗を読み込み、ミューテーション用のセッションを開く
    pub async fn open_session(
        &self,
        user_id: &UserId,
        display_name: Option<String>,
    ) -> Result<LoadOutcome, AppError> {
        let outcome = self.reconciliation.load(user_id, display_name).await?;
        self.progress.attach(outcome.progress.clone()).await;
        Ok(outcome)
    }

    /// 利用者が選んだ復旧操作の後にセッションを張り直す
    pub async fn recover_session(&self, user_id: &UserId) -> Result<LoadOutcome, AppError> {
        let outcome = self.reconciliation.recover(user_id).await?;
        self.progress.attach(outcome.progress.clone()).await;
        Ok(outcome)
    }

    pub async fn force_sync_session(&self, user_id: &UserId) -> Result<UserProgress, AppError> {
        let progress = self.reconciliation.force_sync(user_id).await?;
        Ok(self.progress.attach(progress).await)
    }

    pub async fn merge_session(&self, user_id: &UserId) -> Result<UserProgress, AppError> {
        let progress = self.reconciliation.merge_fieldwise_max(user_id).await?;
        Ok(self.progress.attach(progress).await)
    }
}
