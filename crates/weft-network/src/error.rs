use thiserror::Error;

/// Failure modes of the delegation transport.
///
/// These describe what went wrong between two peers, not why; the
/// scheduler decides whether to mark the peer unreachable, retry
/// elsewhere, or surface the failure to the job.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is not reachable through this transport")]
    UnknownPeer(String),

    #[error("connection to peer {0} was closed on this side")]
    Disconnected(String),

    #[error("delivery to peer {peer} failed in flight: {detail}")]
    DeliveryFailed { peer: String, detail: String },

    #[error("peer {peer} sent no response within {waited_ms} ms")]
    ResponseTimeout { peer: String, waited_ms: u64 },

    #[error("a {message_type} cannot be dispatched as a request")]
    UnsupportedMessage { message_type: &'static str },

    #[error(transparent)]
    Common(#[from] weft_common::CommonError),
}
