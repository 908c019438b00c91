pub mod logging;
pub mod retry;

pub use retry::{policies, retry_with_backoff, Backoff};
