mod accounts;
mod admin;
mod feed;
mod posts;

pub use accounts::{AccountUseCase, Profile};
pub use admin::AdminUseCase;
pub use feed::FeedUseCase;
pub use posts::PostUseCase;
