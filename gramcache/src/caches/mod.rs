pub mod comments;
pub mod post_index;
pub mod users;

pub use comments::CommentCache;
pub use post_index::PostIndexCache;
pub use users::UserCache;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::{Error, Result};

/// Serialize a whole cache entry. Entries are always replaced, never patched.
pub(crate) fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::Internal(format!("failed to serialize '{}': {}", key, e)))
}

/// A payload that does not decode is reported as corruption, not as a miss.
pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|e| Error::corruption(key, e))
}
