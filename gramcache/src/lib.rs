//! Read-through/write-through caching between request handlers and the store.
//!
//! Three cache domains (users, the recent-posts index, per-post comment lists)
//! sit on a shared [`CacheBackend`] and fall back to the [`Store`] on a miss.
//! A [`CacheCoordinator`] owns both handles and the per-domain locks.

pub mod aggregation;
pub mod caches;
pub mod coordinator;
pub mod domain;
pub mod keys;
pub mod persistence;
pub mod ports;

pub use aggregation::{Aggregator, PREVIEW_COMMENTS};
pub use caches::{CommentCache, PostIndexCache, UserCache};
pub use coordinator::CacheCoordinator;
pub use persistence::SledStore;
pub use ports::{CacheBackend, Store};
