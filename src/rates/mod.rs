//! Market-rate cache: fetcher, durable store and rate resolution.

pub mod fetcher;
pub mod resolver;
pub mod snapshot;
pub mod store;

pub use fetcher::{FetchOptions, RateFetcher};
pub use resolver::{RateQuote, RateResolver, RateSource};
pub use snapshot::{PartialRates, RateSnapshot};
pub use store::RateStore;
