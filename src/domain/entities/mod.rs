pub mod cached_entry;
pub mod history;
pub mod offline_action;
pub mod user_progress;

pub use cached_entry::CachedEntry;
pub use history::{GameScore, QuizAttempt};
pub use offline_action::OfflineAction;
pub use user_progress::{UserProgress, UserProgressRecord};
