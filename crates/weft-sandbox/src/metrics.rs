use once_cell::sync::Lazy;
use prometheus_client::metrics::counter::Counter;

/// Counts sandbox executions that produced output.
pub static EXECUTIONS_OK: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts sandbox executions that failed, trapped, or were cut off.
pub static EXECUTIONS_FAILED: Lazy<Counter> = Lazy::new(Counter::default);
