use once_cell::sync::Lazy;
use prometheus_client::metrics::counter::Counter;

/// Counts calls to `select_workers`.
pub static SELECT_WORKER_CALLS: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts chunks that fell back to local execution.
pub static LOCAL_FALLBACKS: Lazy<Counter> = Lazy::new(Counter::default);
