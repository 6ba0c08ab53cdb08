//! # mintwatch-launch
//!
//! HTTP adapters for the launch pipeline: attachment download, the
//! content-addressed asset store, the issuance service, and authority key
//! providers.

pub mod asset;
mod http;
pub mod issuance;
pub mod keys;
pub mod pinata;

#[cfg(test)]
pub(crate) mod testing;

pub use asset::HttpAssetSource;
pub use issuance::HttpIssuanceService;
pub use keys::{LocalKeyProvider, PoolKeyProvider};
pub use pinata::PinataAssetStore;
