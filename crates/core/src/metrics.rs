//! Prometheus metrics for the pipeline.
//!
//! Gauges mirror the stats snapshot wholesale on every reload; the only
//! counter grows with each index batch flush.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGauge};

/// Online servers, as of the last stats reload.
pub static SERVERS_ONLINE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("roomsearch_servers_online", "Known online servers").unwrap()
});

/// Indexable servers, as of the last stats reload.
pub static SERVERS_INDEXABLE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "roomsearch_servers_indexable",
        "Servers advertising public rooms",
    )
    .unwrap()
});

/// Parsed rooms, as of the last stats reload.
pub static ROOMS_PARSED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("roomsearch_rooms_parsed", "Rooms stored in the database").unwrap());

/// Indexed rooms, as of the last stats reload.
pub static ROOMS_INDEXED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("roomsearch_rooms_indexed", "Rooms in the search index").unwrap()
});

/// Rooms submitted to the index since process start.
pub static ROOMS_INDEXED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "roomsearch_rooms_indexed_total",
        "Total rooms written to the search index",
    )
    .unwrap()
});

/// All core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SERVERS_ONLINE.clone()),
        Box::new(SERVERS_INDEXABLE.clone()),
        Box::new(ROOMS_PARSED.clone()),
        Box::new(ROOMS_INDEXED.clone()),
        Box::new(ROOMS_INDEXED_TOTAL.clone()),
    ]
}
