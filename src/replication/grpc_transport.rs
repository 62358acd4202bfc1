use crate::call::{encode_message, CibMessage};
use crate::grpc::grpc_cib_client::GrpcCibClient;
use crate::grpc::{proto_deliver_result, ProtoCibMessage};
use crate::replication::{CibPeerInfo, NodeId, PeerTransport, TransportError};
use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Duration;
use tonic::codegen::http::uri;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

const PEER_QUEUE_SIZE: usize = 256;

/// GrpcPeerTransport keeps one ordered outbound queue per peer. A background task per peer dials
/// lazily and delivers the queue one message at a time.
///
/// Queues are bounded. While a peer is unreachable its queue fills up and further messages to it
/// are dropped; the resync protocol brings the peer back up to date.
pub(crate) struct GrpcPeerTransport {
    logger: slog::Logger,
    queues: HashMap<NodeId, mpsc::Sender<ProtoCibMessage>>,
}

impl GrpcPeerTransport {
    /// Must be called from within a tokio runtime.
    pub(crate) fn new(logger: slog::Logger, me: &NodeId, peers: Vec<CibPeerInfo>, rpc_timeout: Duration) -> Self {
        Self::with_queue_size(logger, me, peers, rpc_timeout, PEER_QUEUE_SIZE)
    }

    fn with_queue_size(
        logger: slog::Logger,
        me: &NodeId,
        peers: Vec<CibPeerInfo>,
        rpc_timeout: Duration,
        queue_size: usize,
    ) -> Self {
        let mut queues = HashMap::with_capacity(peers.len());
        for peer in peers {
            let peer_id = NodeId::new(peer.node_id);
            if &peer_id == me {
                continue;
            }

            let (tx, rx) = mpsc::channel(queue_size);
            let sender = PeerSender {
                logger: logger.new(slog::o!("Peer" => peer_id.to_string())),
                addr: peer.addr,
                rpc_timeout,
                client: None,
            };
            tokio::spawn(sender.run(rx));
            queues.insert(peer_id, tx);
        }

        GrpcPeerTransport { logger, queues }
    }

    fn enqueue(
        &self,
        to: &NodeId,
        queue: &mpsc::Sender<ProtoCibMessage>,
        message: ProtoCibMessage,
    ) -> Result<(), TransportError> {
        match queue.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                slog::warn!(
                    self.logger,
                    "Outbound queue for {} is full, dropping '{}'",
                    to,
                    message.operation
                );
                Err(TransportError::QueueFull(to.clone()))
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed(to.clone())),
        }
    }
}

impl PeerTransport for GrpcPeerTransport {
    fn send(&self, to: &NodeId, message: CibMessage) -> Result<(), TransportError> {
        let queue = self
            .queues
            .get(to)
            .ok_or_else(|| TransportError::UnknownPeer(to.clone()))?;
        self.enqueue(to, queue, encode_message(&message)?)
    }

    /// A full queue only costs that peer the message, the others still get it.
    fn broadcast(&self, message: CibMessage) -> Result<(), TransportError> {
        let proto = encode_message(&message)?;
        for (peer_id, queue) in self.queues.iter() {
            match self.enqueue(peer_id, queue, proto.clone()) {
                Ok(()) | Err(TransportError::QueueFull(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

struct PeerSender {
    logger: slog::Logger,
    addr: SocketAddr,
    rpc_timeout: Duration,
    client: Option<GrpcCibClient<Channel>>,
}

impl PeerSender {
    async fn run(mut self, mut queue: mpsc::Receiver<ProtoCibMessage>) {
        while let Some(message) = queue.recv().await {
            self.deliver(message).await;
        }
        slog::debug!(self.logger, "Outbound queue closed");
    }

    // A failed delivery drops the message. The diff/resync protocol recovers from lost messages.
    async fn deliver(&mut self, message: ProtoCibMessage) {
        let operation = message.operation.clone();
        let mut client = match self.client.take() {
            Some(client) => client,
            None => match self.connect().await {
                Ok(client) => client,
                Err(e) => {
                    slog::warn!(self.logger, "Dropping '{}': failed to connect: {}", operation, e);
                    return;
                }
            },
        };

        slog::debug!(self.logger, "ClientWire - {:?}", message);
        let result = tokio::time::timeout(self.rpc_timeout, client.deliver(Request::new(message))).await;
        slog::debug!(self.logger, "ClientWire - {:?}", result);

        match result {
            Ok(Ok(reply)) => {
                self.client = Some(client);
                match reply.into_inner().result {
                    Some(proto_deliver_result::Result::Ok(_)) => {}
                    Some(proto_deliver_result::Result::Err(e)) => {
                        slog::warn!(self.logger, "Peer refused '{}': {:?}", operation, e.err);
                    }
                    None => {
                        slog::warn!(self.logger, "Peer sent an empty reply to '{}'", operation);
                    }
                }
            }
            // The connection is dropped and redialed on the next message.
            Ok(Err(status)) => {
                slog::warn!(self.logger, "Delivering '{}' failed: {}", operation, status);
            }
            Err(_) => {
                slog::warn!(self.logger, "Delivering '{}' timed out after {:?}", operation, self.rpc_timeout);
            }
        }
    }

    async fn connect(&self) -> Result<GrpcCibClient<Channel>, ConnectError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", self.addr))?;
        let channel = tokio::time::timeout(self.rpc_timeout, endpoint.connect())
            .await
            .map_err(|_| ConnectError::Timeout)??;

        Ok(GrpcCibClient::new(channel))
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectError {
    #[error("invalid peer address: {0}")]
    InvalidUri(uri::InvalidUri),
    #[error("connection failed: {0}")]
    ConnectFailure(Box<dyn Error + Send + Sync>),
    #[error("connection timed out")]
    Timeout,
}

impl From<uri::InvalidUri> for ConnectError {
    fn from(e: uri::InvalidUri) -> Self {
        ConnectError::InvalidUri(e)
    }
}

impl From<tonic::transport::Error> for ConnectError {
    fn from(e: tonic::transport::Error) -> Self {
        ConnectError::ConnectFailure(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallOptions;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn peer(id: &str) -> CibPeerInfo {
        CibPeerInfo {
            node_id: id.to_string(),
            // Nothing listens here, delivery fails until the sender gives up.
            addr: "127.0.0.1:1".parse().unwrap(),
        }
    }

    // The sender tasks only run once the test yields, so the queues fill up deterministically.
    #[tokio::test]
    async fn full_queue_drops_instead_of_growing() {
        let transport = GrpcPeerTransport::with_queue_size(
            logger(),
            &NodeId::new("a"),
            vec![peer("a"), peer("b")],
            Duration::from_millis(50),
            2,
        );
        let to = NodeId::new("b");

        assert!(transport.send(&to, CibMessage::request("ping", CallOptions::NONE)).is_ok());
        assert!(transport.send(&to, CibMessage::request("ping", CallOptions::NONE)).is_ok());
        assert!(matches!(
            transport.send(&to, CibMessage::request("ping", CallOptions::NONE)),
            Err(TransportError::QueueFull(peer)) if peer == to
        ));
        assert!(transport.broadcast(CibMessage::request("ping", CallOptions::NONE)).is_ok());
    }

    #[tokio::test]
    async fn unknown_peers_are_reported() {
        let transport = GrpcPeerTransport::new(logger(), &NodeId::new("a"), vec![peer("b")], Duration::from_millis(50));

        assert!(matches!(
            transport.send(&NodeId::new("a"), CibMessage::request("ping", CallOptions::NONE)),
            Err(TransportError::UnknownPeer(_))
        ));
    }
}
