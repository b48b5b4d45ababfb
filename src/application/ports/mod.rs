pub mod clock;
pub mod local_store;
pub mod remote_progress;
pub mod sync_gateway;

pub use clock::{Clock, ManualClock, SystemClock};
pub use local_store::{LocalStore, PartitionCount, StoreStatus};
pub use remote_progress::RemoteProgressStore;
pub use sync_gateway::{DrainReport, SyncGateway, SyncParticipant};
