//! Listing provider integration.
//!
//! Layers, bottom up:
//! - `Transport`: one HTTP GET (RapidAPI in production, fakes in tests)
//! - `RetryingGateway`: cache check, daily budget, bounded retry, decoding
//! - `ProviderClient`: search / details / comps with the comps fallback

pub mod budget;
pub mod client;
pub mod gateway;
pub mod params;
pub mod retry;
pub mod transport;
pub mod wire;

pub use budget::RateBudget;
pub use client::{ProviderClient, SearchCursor};
pub use gateway::{ProviderRequest, RetryingGateway};
pub use params::RequestParams;
pub use retry::RetryPolicy;
pub use transport::{HttpReply, RapidApiTransport, Transport};
