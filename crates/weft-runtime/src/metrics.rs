use once_cell::sync::Lazy;
use prometheus_client::metrics::counter::Counter;

/// Counts jobs accepted at admission.
pub static JOBS_SUBMITTED: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts jobs that reached `Finalized`.
pub static JOBS_FINALIZED: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts jobs that ended in `Failed`.
pub static JOBS_FAILED: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts chunk attempts that missed their deadline.
pub static CHUNK_TIMEOUTS: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts chunks processed for remote managers.
pub static DELEGATED_CHUNKS_SERVED: Lazy<Counter> = Lazy::new(Counter::default);
