// Open Bid - Core Library
// Exposes all modules for use in the CLI, the API server and tests

pub mod bids;
pub mod config;
pub mod error;
pub mod geo;
pub mod node;
pub mod prices;
pub mod quantities;
pub mod schema;
pub mod service;
pub mod store;
pub mod telemetry;

// Re-export commonly used types
pub use bids::{
    comparison_rows, load_bids, parse_bids, price_table, write_comparison_csv,
    BidLine, ChartSeries, ComparisonChart, ComparisonRow, ConcreteBid, ContractorBid, LightingBid,
};
pub use config::SpeckleConfig;
pub use error::{BidError, Result};
pub use geo::{distance_label, distance_to_project, GeoPoint, PROJECT_LOCATION};
pub use node::{flatten, Flatten, Node};
pub use prices::{apply_prices, write_prices, PushReceipt};
pub use quantities::{
    collect_counts, collect_names, collect_quantities, collect_volumes, QuantityLine, QuantitySummary,
};
pub use schema::{Category, ContractorPrices, ItemRecord, PriceTable};
pub use service::BidService;
pub use store::{Branch, Commit, MemoryStore, NewCommit, RemoteStore, RootHandle, SpeckleClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
