pub mod interceptor;
pub mod remote;
pub mod storage;
