//! Key-value backends for the cache layer.

mod moka_cache;

pub use moka_cache::MokaBackend;
