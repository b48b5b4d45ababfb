pub mod entities;
pub mod gamification;
pub mod reconciliation;
pub mod value_objects;
