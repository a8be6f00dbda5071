//! In-memory loopback mesh.
//!
//! Every node registers an endpoint on a shared [`InMemoryNetwork`] hub;
//! sends are direct handler invocations serialized per destination so the
//! per-peer FIFO guarantee of the transport contract holds. Used by tests
//! and single-process deployments.

use crate::{LinkQuality, MessageHandler, Transport, TransportError};
use async_trait::async_trait;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use weft_common::PeerId;
use weft_protocol::WireMessage;

struct Endpoint {
    handler: Arc<dyn MessageHandler>,
    /// Serializes deliveries to this endpoint, preserving per-peer order.
    delivery_lock: Arc<tokio::sync::Mutex<()>>,
    quality: LinkQuality,
}

/// Shared hub connecting every in-process node.
#[derive(Default)]
pub struct InMemoryNetwork {
    endpoints: Mutex<HashMap<PeerId, Arc<Endpoint>>>,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a transport bound to `local` on this hub. The node becomes
    /// reachable once it registers a handler.
    pub fn transport(self: &Arc<Self>, local: PeerId) -> InMemoryTransport {
        InMemoryTransport {
            hub: Arc::clone(self),
            local,
            disconnected: Mutex::new(HashSet::new()),
        }
    }

    /// Override the reported link quality toward `peer` (test hook).
    pub fn set_quality(&self, peer: &PeerId, quality: LinkQuality) {
        let mut endpoints = self.endpoints.lock().unwrap();
        if let Some(endpoint) = endpoints.get(peer) {
            let updated = Endpoint {
                handler: Arc::clone(&endpoint.handler),
                delivery_lock: Arc::clone(&endpoint.delivery_lock),
                quality,
            };
            endpoints.insert(peer.clone(), Arc::new(updated));
        }
    }

    /// Remove a node from the hub entirely, as if it crashed.
    pub fn drop_node(&self, peer: &PeerId) {
        self.endpoints.lock().unwrap().remove(peer);
    }

    fn register(&self, peer: PeerId, handler: Arc<dyn MessageHandler>) {
        debug!("[InMemoryNetwork] Registering endpoint {peer}");
        self.endpoints.lock().unwrap().insert(
            peer,
            Arc::new(Endpoint {
                handler,
                delivery_lock: Arc::new(tokio::sync::Mutex::new(())),
                quality: LinkQuality {
                    rtt_ms: 1.0,
                    jitter_ms: 0.1,
                    loss_frac: 0.0,
                },
            }),
        );
    }

    fn endpoint(&self, peer: &PeerId) -> Option<Arc<Endpoint>> {
        self.endpoints.lock().unwrap().get(peer).cloned()
    }

    fn peers(&self) -> Vec<PeerId> {
        self.endpoints.lock().unwrap().keys().cloned().collect()
    }
}

/// Transport over the in-memory hub, bound to one node.
pub struct InMemoryTransport {
    hub: Arc<InMemoryNetwork>,
    local: PeerId,
    disconnected: Mutex<HashSet<PeerId>>,
}

impl InMemoryTransport {
    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// Undo a [`Transport::disconnect`].
    pub fn reconnect(&self, peer: &PeerId) {
        self.disconnected.lock().unwrap().remove(peer);
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(
        &self,
        peer: &PeerId,
        message: WireMessage,
    ) -> Result<WireMessage, TransportError> {
        if self.disconnected.lock().unwrap().contains(peer) {
            return Err(TransportError::Disconnected(peer.to_string()));
        }
        let endpoint = self
            .hub
            .endpoint(peer)
            .ok_or_else(|| TransportError::UnknownPeer(peer.to_string()))?;
        let _guard = endpoint.delivery_lock.lock().await;
        endpoint.handler.handle(self.local.clone(), message).await
    }

    fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.hub.register(self.local.clone(), handler);
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        let disconnected = self.disconnected.lock().unwrap();
        self.hub
            .peers()
            .into_iter()
            .filter(|p| *p != self.local && !disconnected.contains(p))
            .collect()
    }

    fn quality(&self, peer: &PeerId) -> Option<LinkQuality> {
        self.hub.endpoint(peer).map(|e| e.quality)
    }

    fn disconnect(&self, peer: &PeerId) {
        self.disconnected.lock().unwrap().insert(peer.clone());
    }
}
