use crate::actor::{ActorClient, CibActor};
use crate::api::client::CibNode;
use crate::api::options::CibOptionsValidated;
use crate::call::{CallError, CibConnection, GrpcChannel, SessionRouter};
use crate::generation::Generation;
use crate::persistence::{read_with_recovery, CibFiles, DiskWriter};
use crate::replication::{CibPeerInfo, GrpcPeerTransport, InMemoryNetwork, NodeId, PeerTransport, Role};
use crate::server::RpcServer;
use crate::store::{new_state_channel, CibStateSnapshot, CibStore, CibStoreConfig};
use crate::{server, CibOptions};
use std::collections::HashSet;
use std::convert::TryFrom;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Duration;

const EVENT_QUEUE_SIZE: usize = 64;
const NOTIFICATION_BUFFER: usize = 256;

/// How the node reaches its peers.
pub enum CibTransport {
    /// Dial `CibNodeConfig::peers` over gRPC.
    Grpc,
    /// Exchange messages with the other nodes attached to the same in-process network.
    InMemory(InMemoryNetwork),
}

pub struct CibNodeConfig {
    pub node_id: String,
    /// Where to serve peers and remote clients. `None` serves nothing.
    pub listen_addr: Option<SocketAddr>,
    pub peers: Vec<CibPeerInfo>,
    // The primary copy, its backups and their signatures live here.
    pub cib_directory: PathBuf,
    pub info_logger: slog::Logger,
    pub options: CibOptions,
    pub transport: CibTransport,
}

#[derive(Debug, thiserror::Error)]
pub enum CibNodeCreationError {
    #[error("Illegal options for configuring node: {0}")]
    IllegalNodeOptions(String),
    #[error("Failed to prepare CIB directory")]
    DirectoryInitialization(io::Error),
}

pub async fn try_create_cib_node(config: CibNodeConfig) -> Result<CibNode, CibNodeCreationError> {
    let options = CibOptionsValidated::try_from(config.options)
        .map_err(|e| CibNodeCreationError::IllegalNodeOptions(e.to_string()))?;

    let node_id = NodeId::new(config.node_id);
    let logger = config.info_logger.new(slog::o!("Node" => node_id.to_string()));

    fs::create_dir_all(&config.cib_directory).map_err(CibNodeCreationError::DirectoryInitialization)?;
    let files = CibFiles::new(config.cib_directory, options.series_name.clone(), options.backup_wrap_limit);
    let recovered = read_with_recovery(&logger, &files, options.archive_on_digest_failure);

    let peers: Vec<CibPeerInfo> = config
        .peers
        .into_iter()
        .filter(|peer| peer.node_id != node_id.as_str())
        .collect();
    let peer_ids: HashSet<NodeId> = peers.iter().map(|peer| NodeId::new(peer.node_id.clone())).collect();
    let standalone = peers.is_empty() && matches!(config.transport, CibTransport::Grpc);
    let role = if options.start_as_master.unwrap_or(standalone) {
        Role::Master
    } else {
        Role::Slave
    };

    let (state_notifier, state_listener) = new_state_channel(CibStateSnapshot {
        generation: Generation::of(&recovered.document),
        role,
        resync_count: 0,
        writes_enabled: options.disk_writes_enabled,
        synced_once: false,
        last_write: None,
        write_error: None,
    });
    let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
    let (actor_client, actor_queue_rx) = ActorClient::new(EVENT_QUEUE_SIZE);

    let transport: Arc<dyn PeerTransport> = match config.transport {
        CibTransport::Grpc => Arc::new(GrpcPeerTransport::new(
            logger.clone(),
            &node_id,
            peers,
            options.peer_rpc_timeout,
        )),
        CibTransport::InMemory(network) => {
            network.attach(logger.clone(), node_id.clone(), actor_client.weak());
            Arc::new(network.transport_for(node_id.clone()))
        }
    };

    let store = CibStore::new(CibStoreConfig {
        logger: logger.clone(),
        node_id: node_id.clone(),
        document: recovered.document,
        role,
        resync_threshold: options.resync_threshold,
        standalone,
        transport,
        disk: DiskWriter::new(logger.clone(), files, actor_client.weak()),
        writes_enabled: options.disk_writes_enabled,
        notifications: notifications.clone(),
        state_notifier,
    });

    let cib_actor = CibActor::new(logger.clone(), actor_queue_rx, store);
    let event_loop = tokio::spawn(cib_actor.run_event_loop());

    let sessions = Arc::new(SessionRouter::new(logger.clone(), actor_client.weak(), notifications));

    let server_shutdown_handle = match config.listen_addr {
        Some(addr) => {
            let (handle, signal) = server::shutdown_signal();
            let rpc_server = RpcServer::new(
                logger.clone(),
                actor_client.weak(),
                sessions.clone(),
                options.privileged_remote_clients,
                peer_ids,
            );
            tokio::spawn(rpc_server.run(addr, signal));
            Some(handle)
        }
        None => None,
    };

    Ok(CibNode::new(
        logger,
        node_id,
        actor_client,
        sessions,
        state_listener,
        event_loop,
        options.call_timeout,
        server_shutdown_handle,
    ))
}

/// Connects to a node's client service over gRPC. Remote connections are privileged only if
/// the node was configured with `privileged_remote_clients`.
pub async fn connect_remote(
    logger: slog::Logger,
    addr: SocketAddr,
    client_name: &str,
    call_timeout: Duration,
) -> Result<CibConnection, CallError> {
    let channel = GrpcChannel::connect(logger.clone(), addr).await?;
    CibConnection::connect(logger, client_name, Arc::new(channel), call_timeout).await
}
