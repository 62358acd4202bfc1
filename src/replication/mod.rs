mod grpc_transport;
mod memory_transport;
mod peers;
mod resync;
mod role;
mod transport;

pub(crate) use grpc_transport::GrpcPeerTransport;
pub use memory_transport::InMemoryNetwork;
pub use memory_transport::SentMessage;
pub use peers::CibPeerInfo;
pub use peers::NodeId;
pub(crate) use peers::PeerTracker;
pub(crate) use resync::DiffGate;
pub(crate) use resync::ResyncState;
pub use role::Role;
pub(crate) use role::RoleState;
pub(crate) use transport::PeerTransport;
pub use transport::TransportError;
