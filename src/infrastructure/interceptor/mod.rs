pub mod cache_names;
pub mod cache_storage;
pub mod fetcher;
pub mod request;
pub mod worker;

pub use cache_names::CacheNames;
pub use cache_storage::{MemoryCacheStorage, ResponseCacheStorage};
pub use fetcher::{FetchError, Fetcher, ReqwestFetcher};
pub use request::{
    FetchOutcome, InterceptedRequest, InterceptedResponse, RequestClass, RequestMode,
    ResponseType,
};
pub use worker::NetworkInterceptor;
