mod actor;
mod api;
mod call;
mod document;
mod generation;
mod persistence;
mod registry;
mod replication;
mod server;
mod store;
mod grpc {
    include!("../generated/cib.rs");
}

pub use api::connect_remote;
pub use api::try_create_cib_node;
pub use api::CibNode;
pub use api::CibNodeConfig;
pub use api::CibNodeCreationError;
pub use api::CibOptions;
pub use api::CibTransport;
pub use call::notify_events;
pub use call::CallError;
pub use call::CallId;
pub use call::CallOptions;
pub use call::CallOutcome;
pub use call::CibConnection;
pub use call::CibMessage;
pub use call::CibStatus;
pub use call::MessageKind;
pub use call::NotifyCallback;
pub use call::Payload;
pub use call::ReplyCallback;
pub use call::WireError;
pub use document::apply_diff;
pub use document::attrs;
pub use document::calculate_digest;
pub use document::Change;
pub use document::empty_document;
pub use document::parse;
pub use document::serialize;
pub use document::tags;
pub use document::Diff;
pub use document::DiffError;
pub use document::DocumentError;
pub use document::Element;
pub use generation::Generation;
pub use persistence::read_with_recovery;
pub use persistence::validate;
pub use persistence::write_atomic;
pub use persistence::CibFiles;
pub use persistence::CibSource;
pub use persistence::ReadError;
pub use persistence::RecoveredCib;
pub use persistence::WriteError;
pub use persistence::WriteSummary;
pub use replication::CibPeerInfo;
pub use replication::InMemoryNetwork;
pub use replication::NodeId;
pub use replication::Role;
pub use replication::SentMessage;
pub use store::CibStateListener;
pub use store::CibStateSnapshot;
pub use store::FatalError;
pub use store::NodeExit;

// Keep this file to `mod` and `pub use` statements. No `mod` is `pub`, anywhere; types are exported
// one by one.
