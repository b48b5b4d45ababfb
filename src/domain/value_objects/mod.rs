pub mod action_id;
pub mod action_type;
pub mod cache_key;
pub mod partition;
pub mod user_id;

pub use action_id::OfflineActionId;
pub use action_type::OfflineActionType;
pub use cache_key::CacheKey;
pub use partition::Partition;
pub use user_id::UserId;
