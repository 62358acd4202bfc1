use crate::actor::ActorClient;
use crate::call::{CallError, CibConnection, LocalChannel, SessionRouter};
use crate::replication::NodeId;
use crate::server::RpcServerShutdownHandle;
use crate::store::{CibStateListener, CibStateSnapshot, NodeExit};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Duration;

/// CibNode is the handle on one running node. Dropping it stops the node.
pub struct CibNode {
    logger: slog::Logger,
    node_id: NodeId,
    actor_client: ActorClient,
    sessions: Arc<SessionRouter>,
    state_listener: CibStateListener,
    event_loop: JoinHandle<NodeExit>,
    call_timeout: Duration,
    server_shutdown_handle: Option<RpcServerShutdownHandle>,
}

impl CibNode {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        logger: slog::Logger,
        node_id: NodeId,
        actor_client: ActorClient,
        sessions: Arc<SessionRouter>,
        state_listener: CibStateListener,
        event_loop: JoinHandle<NodeExit>,
        call_timeout: Duration,
        server_shutdown_handle: Option<RpcServerShutdownHandle>,
    ) -> Self {
        CibNode {
            logger,
            node_id,
            actor_client,
            sessions,
            state_listener,
            event_loop,
            call_timeout,
            server_shutdown_handle,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Opens an in-process client connection. Unprivileged connections may only read and run
    /// operations that do not need privilege.
    pub async fn connect(&self, client_name: &str, privileged: bool) -> Result<CibConnection, CallError> {
        let channel = LocalChannel::new(self.sessions.clone(), privileged);
        CibConnection::connect(self.logger.clone(), client_name, Arc::new(channel), self.call_timeout).await
    }

    /// A listener on role, generation, resync and persistence state. Intermediate states may be
    /// skipped, the latest one is always observed.
    pub fn state_listener(&self) -> CibStateListener {
        self.state_listener.clone()
    }

    pub fn state(&self) -> CibStateSnapshot {
        self.state_listener.current()
    }

    /// Announces the shutdown to peers and waits for the event loop to end. If no peer has
    /// acknowledged within `timeout` the loop is stopped anyway.
    pub async fn shutdown(self, timeout: Duration) -> NodeExit {
        let CibNode {
            logger,
            actor_client,
            mut event_loop,
            server_shutdown_handle,
            ..
        } = self;

        let joined = if actor_client.shutdown().await.is_err() {
            event_loop.await
        } else {
            match tokio::time::timeout(timeout, &mut event_loop).await {
                Ok(joined) => joined,
                Err(_) => {
                    slog::warn!(logger, "Peers did not acknowledge shutdown within {:?}", timeout);
                    drop(actor_client);
                    event_loop.await
                }
            }
        };

        if let Some(handle) = server_shutdown_handle {
            handle.trigger();
        }
        Self::exit_reason(joined)
    }

    /// Waits until the event loop ends on its own, for example after `quit`.
    pub async fn wait_for_exit(self) -> NodeExit {
        Self::exit_reason(self.event_loop.await)
    }

    fn exit_reason(joined: Result<NodeExit, JoinError>) -> NodeExit {
        match joined {
            Ok(exit) => exit,
            Err(e) => NodeExit::Aborted(e.to_string()),
        }
    }
}
