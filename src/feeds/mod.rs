pub mod client;

pub use client::{FeedFetcher, FetchError, RawEntry};
