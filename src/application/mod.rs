pub mod local_records;
pub mod ports;
pub mod services;

pub use local_records::LocalRecords;
