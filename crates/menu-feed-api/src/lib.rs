
pub mod raw;
pub mod feed;
pub mod slack;
mod processed;

pub use feed::{FeedClient, FeedError};
pub use processed::*;
pub use raw::PostItem;
