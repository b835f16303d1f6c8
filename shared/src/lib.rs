// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cache backend transport: {0}")]
    Transport(String),
    #[error("store: {0}")]
    Store(String),
    #[error("corrupt cache entry '{key}': {reason}")]
    CacheCorruption { key: String, reason: String },
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("account name already taken: {0}")]
    AccountNameTaken(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    pub fn corruption(key: impl Into<String>, reason: impl ToString) -> Self {
        Error::CacheCorruption {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the cache backend was unreachable or timed out.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;
