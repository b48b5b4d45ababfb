pub mod http_progress_store;
pub mod http_sync_gateway;

pub use http_progress_store::HttpRemoteProgressStore;
pub use http_sync_gateway::HttpSyncGateway;
