use crate::call::{CibMessage, WireError};
use crate::replication::NodeId;

/// PeerTransport moves messages to other nodes. Sends are fire-and-forget: `Ok` means the message
/// was queued for delivery, not that the peer processed it.
///
/// Messages to the same peer are delivered in the order they were sent.
pub(crate) trait PeerTransport: Send + Sync {
    fn send(&self, to: &NodeId, message: CibMessage) -> Result<(), TransportError>;

    /// Sends to every known peer except ourselves.
    fn broadcast(&self, message: CibMessage) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Peer {0} is not part of the cluster")]
    UnknownPeer(NodeId),
    #[error("Outbound queue for {0} is closed")]
    Closed(NodeId),
    #[error("Outbound queue for {0} is full")]
    QueueFull(NodeId),
    #[error("Failed to encode message: {0}")]
    Encode(#[from] WireError),
}
