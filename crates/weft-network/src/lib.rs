//! # Weft Network Crate
//! Pluggable transport and discovery contracts for the delegation RPC.
//! Any reliable, authenticated, ordered request/response transport
//! satisfies the [`Transport`] trait; this crate ships an in-memory
//! loopback mesh used by tests and single-process deployments.

use async_trait::async_trait;
use weft_common::PeerId;
use weft_protocol::WireMessage;

mod error;
mod memory;

pub use error::TransportError;
pub use memory::{InMemoryNetwork, InMemoryTransport};

/// Smoothed link quality toward a peer as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinkQuality {
    pub rtt_ms: f64,
    pub jitter_ms: f64,
    pub loss_frac: f64,
}

/// Handler for messages arriving from remote peers. One handler serves a
/// whole node; it dispatches on the payload type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process `message` from `from` and produce the response message.
    async fn handle(
        &self,
        from: PeerId,
        message: WireMessage,
    ) -> Result<WireMessage, TransportError>;
}

/// Reliable, ordered, request/response transport toward the mesh.
///
/// Implementations must preserve send order per destination peer; no
/// ordering is implied across peers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `message` to `peer` and await its response.
    async fn send(
        &self,
        peer: &PeerId,
        message: WireMessage,
    ) -> Result<WireMessage, TransportError>;

    /// Register the dispatcher for incoming messages. Must be called
    /// before the node is reachable.
    fn set_handler(&self, handler: std::sync::Arc<dyn MessageHandler>);

    /// Peers currently reachable through this transport.
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Last observed link quality toward `peer`.
    fn quality(&self, peer: &PeerId) -> Option<LinkQuality>;

    /// Drop the connection to `peer`; later sends fail until the peer
    /// reconnects.
    fn disconnect(&self, peer: &PeerId);
}

/// Peer discovery contract. LAN mDNS and Kademlia-style DHTs are both
/// acceptable implementations; the core only consumes the interface.
pub trait Discovery: Send + Sync {
    /// Advertise this node under `service_name`.
    fn announce(&self, service_name: &str);

    /// Peers currently known for `service_name` as `(id, address)`.
    fn discovered_peers(&self, service_name: &str) -> Vec<(PeerId, String)>;
}

/// Fixed-membership discovery for tests and static deployments.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    peers: std::sync::Mutex<Vec<(PeerId, String)>>,
}

impl StaticDiscovery {
    pub fn new(peers: Vec<(PeerId, String)>) -> Self {
        Self {
            peers: std::sync::Mutex::new(peers),
        }
    }

    pub fn add_peer(&self, id: PeerId, addr: impl Into<String>) {
        self.peers.lock().unwrap().push((id, addr.into()));
    }
}

impl Discovery for StaticDiscovery {
    fn announce(&self, _service_name: &str) {}

    fn discovered_peers(&self, _service_name: &str) -> Vec<(PeerId, String)> {
        self.peers.lock().unwrap().clone()
    }
}
