//! Extraction: paginated API calls fanned out over accounts and regions.

mod collector;
mod fanout;

pub use collector::{CallRequest, ItemMetadata, PaginatedCollector, RawItem};
