//! EcoLearn のオフラインファースト同期レイヤー。
//!
//! ローカルの永続ストア、アウトボックス、リモート進捗との突き合わせ、
//! リクエスト仲介をまとめて提供する。

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::services::{
    ConnectivityMonitor, LoadOutcome, MonitorEvent, MonitorState, OutboxService,
    ProgressService, ProgressSource, ProgressUpdate, ReconciliationService,
};
pub use application::LocalRecords;
pub use domain::entities::{OfflineAction, UserProgress};
pub use domain::value_objects::{OfflineActionType, UserId};
pub use shared::{AppConfig, AppError};
pub use state::{AppState, Ports};
