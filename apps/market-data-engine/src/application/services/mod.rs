//! Application Services
//!
//! - `aggregation`: concurrent fan-out over quote sources
//! - `market_data`: engine context serializing aggregation cycles
//! - `snapshot_cache`: short-TTL memo of the last cycle
//! - `price_list`: flat, stale-tolerant price list for `/prices` and the stream

pub mod aggregation;
pub mod market_data;
pub mod price_list;
pub mod snapshot_cache;

pub use aggregation::{AggregationService, DEFAULT_SOURCE_TIMEOUT};
pub use market_data::{
    CycleMetrics, EngineError, MarketDataEngine, MarketDataReport, MarketDataRequest,
};
pub use price_list::{DEFAULT_PRICE_LIST_TTL, PriceList, PriceListError, PriceListService};
pub use snapshot_cache::{CachedSnapshots, DEFAULT_SNAPSHOT_TTL, SnapshotCache};
