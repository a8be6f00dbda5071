use once_cell::sync::Lazy;
use prometheus_client::metrics::counter::Counter;

/// Counts shard insertions.
pub static SHARD_PUTS: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts shard evictions.
pub static SHARD_EVICTIONS: Lazy<Counter> = Lazy::new(Counter::default);
