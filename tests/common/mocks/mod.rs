pub mod mock_fetcher;
pub mod mock_gateway;
pub mod mock_remote;

pub use mock_fetcher::*;
pub use mock_gateway::*;
pub use mock_remote::*;
