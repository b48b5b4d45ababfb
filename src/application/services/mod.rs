pub mod connectivity_service;
pub mod outbox_service;
pub mod progress_service;
pub mod reconciliation_service;

pub use connectivity_service::{ConnectivityMonitor, MonitorEvent, MonitorState};
pub use outbox_service::OutboxService;
pub use progress_service::{ProgressService, ProgressUpdate};
pub use reconciliation_service::{LoadOutcome, ProgressSource, ReconciliationService};
