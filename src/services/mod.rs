pub mod catalog;
pub mod database; // Narrow transport interface plus the MySQL-protocol implementation
pub mod hierarchy;
pub mod metadata_cache;
pub mod normalize;
pub mod query_service;
pub mod router;

pub use catalog::*;
pub use hierarchy::*;
pub use metadata_cache::{Clock, SystemClock, TtlCache};
pub use query_service::*;
pub use router::*;
