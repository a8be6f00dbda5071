use once_cell::sync::Lazy;
use prometheus_client::metrics::counter::Counter;

/// Counts peers added to the registry.
pub static PEERS_ADDED: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts peers removed by the staleness sweep.
pub static PEERS_EVICTED: Lazy<Counter> = Lazy::new(Counter::default);
