pub mod backoff;
pub mod cache_padded;

pub use backoff::Backoff;
pub use cache_padded::{CachePadded, CACHE_LINE_SIZE};
