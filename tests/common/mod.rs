#![allow(dead_code)]

pub mod mocks;

use chrono::{TimeZone, Utc};
use ecolearn_lib::application::ports::{LocalStore, ManualClock};
use ecolearn_lib::infrastructure::storage::SqliteLocalStore;
use ecolearn_lib::{AppConfig, AppState, Ports, UserId};
use mocks::{MockFetcher, MockRemoteProgressStore, MockSyncGateway};
use std::sync::Arc;

pub const ORIGIN: &str = "http://localhost:3000";

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<SqliteLocalStore>,
    pub remote: MockRemoteProgressStore,
    pub gateway: MockSyncGateway,
    pub fetcher: MockFetcher,
    pub clock: Arc<ManualClock>,
}

pub fn learner() -> UserId {
    UserId::parse("learner-1").unwrap()
}

pub fn url(path: &str) -> reqwest::Url {
    reqwest::Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub async fn test_app() -> TestApp {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 4, 22, 9, 30, 0).unwrap(),
    ));
    let store = Arc::new(SqliteLocalStore::in_memory(clock.clone()));
    let remote = MockRemoteProgressStore::new();
    let gateway = MockSyncGateway::new();
    let fetcher = MockFetcher::new();

    let mut config = AppConfig::default();
    config.interceptor.origin = ORIGIN.to_string();
    config.interceptor.build_id = "integration".to_string();
    config.interceptor.precache_manifest = vec!["/".to_string(), "/offline.html".to_string()];

    let local: Arc<dyn LocalStore> = store.clone();
    let state = AppState::with_ports(
        config,
        Ports {
            store: local,
            remote: Arc::new(remote.clone()),
            gateway: Arc::new(gateway.clone()),
            fetcher: Arc::new(fetcher.clone()),
            clock: clock.clone(),
        },
    )
    .await
    .expect("failed to build test app");

    TestApp {
        state,
        store,
        remote,
        gateway,
        fetcher,
        clock,
    }
}
