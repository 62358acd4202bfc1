use crate::actor::WeakActorClient;
use crate::call::CibMessage;
use crate::replication::{NodeId, PeerTransport, TransportError};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// SentMessage is one entry of the network's send log. `to` is `None` for broadcasts.
#[derive(Clone, Debug)]
pub struct SentMessage {
    pub from: NodeId,
    pub to: Option<NodeId>,
    pub message: CibMessage,
    pub delivered: bool,
}

/// InMemoryNetwork connects nodes of one process without sockets.
///
/// Every send is logged so tests can assert on exactly what a node emitted. Nodes can be isolated
/// to simulate message loss.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    endpoints: BTreeMap<NodeId, mpsc::UnboundedSender<CibMessage>>,
    isolated: HashSet<NodeId>,
    sent: Vec<SentMessage>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        InMemoryNetwork::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a passive endpoint. Whatever is sent to `node` shows up on the returned receiver.
    pub fn add_listener(&self, node: NodeId) -> mpsc::UnboundedReceiver<CibMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().endpoints.insert(node, tx);
        rx
    }

    /// Routes messages for `node` into its actor, one at a time and in send order.
    pub(crate) fn attach(&self, logger: slog::Logger, node: NodeId, actor: WeakActorClient) {
        let mut rx = self.add_listener(node);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if actor.peer_message(message).await.is_err() {
                    slog::debug!(logger, "Node actor has exited, closing in-memory endpoint");
                    break;
                }
            }
        });
    }

    pub(crate) fn transport_for(&self, node: NodeId) -> InMemoryTransport {
        InMemoryTransport {
            node,
            network: self.clone(),
        }
    }

    /// Hands `message` to `to` as if a peer had sent it. Not logged, ignores isolation.
    pub fn inject(&self, to: &NodeId, message: CibMessage) -> bool {
        match self.lock().endpoints.get(to) {
            Some(endpoint) => endpoint.send(message).is_ok(),
            None => false,
        }
    }

    /// Drops everything sent to or from `node` until `heal`.
    pub fn isolate(&self, node: &NodeId) {
        self.lock().isolated.insert(node.clone());
    }

    pub fn heal(&self, node: &NodeId) {
        self.lock().isolated.remove(node);
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    pub fn sent_by(&self, node: &NodeId) -> Vec<SentMessage> {
        self.lock().sent.iter().filter(|m| &m.from == node).cloned().collect()
    }

    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.lock().endpoints.keys().cloned().collect()
    }
}

/// InMemoryTransport is one node's handle on an `InMemoryNetwork`.
pub(crate) struct InMemoryTransport {
    node: NodeId,
    network: InMemoryNetwork,
}

impl PeerTransport for InMemoryTransport {
    fn send(&self, to: &NodeId, message: CibMessage) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let endpoint = match state.endpoints.get(to) {
            Some(endpoint) => endpoint.clone(),
            None => return Err(TransportError::UnknownPeer(to.clone())),
        };

        let isolated = state.isolated.contains(&self.node) || state.isolated.contains(to);
        let delivered = !isolated && endpoint.send(message.clone()).is_ok();
        state.sent.push(SentMessage {
            from: self.node.clone(),
            to: Some(to.clone()),
            message,
            delivered,
        });

        Ok(())
    }

    fn broadcast(&self, message: CibMessage) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let sender_isolated = state.isolated.contains(&self.node);

        let mut delivered = false;
        for (node, endpoint) in state.endpoints.iter() {
            if node == &self.node || sender_isolated || state.isolated.contains(node) {
                continue;
            }
            delivered |= endpoint.send(message.clone()).is_ok();
        }

        state.sent.push(SentMessage {
            from: self.node.clone(),
            to: None,
            message,
            delivered,
        });

        Ok(())
    }
}
