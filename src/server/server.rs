use crate::actor::WeakActorClient;
use crate::call::{decode_message, encode_message, CommandReply, SessionError, SessionRouter, WireError};
use crate::grpc::grpc_cib_server::{GrpcCib, GrpcCibServer};
use crate::grpc::{
    proto_command_error, proto_command_result, proto_deliver_error, proto_deliver_result, ProtoCallbackRegistration,
    ProtoCibMessage, ProtoCommandAccepted, ProtoCommandError, ProtoCommandResult, ProtoDeliverError,
    ProtoDeliverResult, ProtoDeliverSuccess, ProtoMalformedMessage, ProtoNotAuthorized, ProtoServerFault,
    ProtoUnknownClient,
};
use crate::replication::NodeId;
use crate::server::RpcServerShutdownSignal;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

const CALLBACK_STREAM_SIZE: usize = 64;

/// RpcServer is the type that implements the CIB gRPC interface: peer delivery plus the two
/// client channels.
pub struct RpcServer {
    logger: slog::Logger,
    local_cib: WeakActorClient,
    sessions: Arc<SessionRouter>,
    // Remote clients are privileged only if the node is configured that way.
    privileged_clients: bool,
    // Deliver is only accepted from these nodes.
    peers: HashSet<NodeId>,
}

impl RpcServer {
    pub(crate) fn new(
        logger: slog::Logger,
        local_cib: WeakActorClient,
        sessions: Arc<SessionRouter>,
        privileged_clients: bool,
        peers: HashSet<NodeId>,
    ) -> Self {
        RpcServer {
            logger,
            local_cib,
            sessions,
            privileged_clients,
            peers,
        }
    }

    pub async fn run(self, socket_addr: SocketAddr, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcCibServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal.triggered())
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
    }

    async fn handle_deliver(&self, rpc_request: ProtoCibMessage) -> ProtoDeliverResult {
        let message = match decode_message(rpc_request) {
            Ok(message) => message,
            Err(e) => return Self::deliver_error(proto_deliver_error::Err::Malformed(Self::malformed(e))),
        };

        // Peer messages skip the privilege check, so the sender has to be a configured peer.
        let known_peer = message.origin.as_ref().map_or(false, |origin| self.peers.contains(origin));
        if !known_peer {
            slog::warn!(
                self.logger,
                "Refusing '{}' from {:?}, not a cluster peer",
                message.operation,
                message.origin
            );
            return Self::deliver_error(proto_deliver_error::Err::NotAuthorized(ProtoNotAuthorized {
                // Empty
            }));
        }

        match self.local_cib.peer_message(message).await {
            Ok(()) => ProtoDeliverResult {
                result: Some(proto_deliver_result::Result::Ok(ProtoDeliverSuccess {
                    // Empty
                })),
            },
            Err(_) => Self::deliver_error(proto_deliver_error::Err::ServerFault(Self::actor_exited())),
        }
    }

    fn deliver_error(err: proto_deliver_error::Err) -> ProtoDeliverResult {
        ProtoDeliverResult {
            result: Some(proto_deliver_result::Result::Err(ProtoDeliverError { err: Some(err) })),
        }
    }

    async fn handle_command(&self, rpc_request: ProtoCibMessage) -> ProtoCommandResult {
        let message = match decode_message(rpc_request) {
            Ok(message) => message,
            Err(e) => return Self::command_error(proto_command_error::Err::Malformed(Self::malformed(e))),
        };

        let app_result = self.sessions.handle_command(message, self.privileged_clients).await;
        self.convert_command_result(app_result)
    }

    fn convert_command_result(&self, app_result: Result<CommandReply, SessionError>) -> ProtoCommandResult {
        match app_result {
            Ok(CommandReply::Reply(reply)) => match encode_message(&reply) {
                Ok(proto) => ProtoCommandResult {
                    result: Some(proto_command_result::Result::Reply(proto)),
                },
                Err(e) => {
                    slog::error!(self.logger, "Failed to encode reply: {}", e);
                    Self::command_error(proto_command_error::Err::ServerFault(ProtoServerFault {
                        message: e.to_string(),
                    }))
                }
            },
            Ok(CommandReply::Accepted) => ProtoCommandResult {
                result: Some(proto_command_result::Result::Accepted(ProtoCommandAccepted {
                    // Empty
                })),
            },
            Err(SessionError::UnknownClient) => Self::command_error(proto_command_error::Err::UnknownClient(
                ProtoUnknownClient {
                    // Nothing
                },
            )),
            Err(SessionError::ActorExited) => {
                Self::command_error(proto_command_error::Err::ServerFault(Self::actor_exited()))
            }
            Err(SessionError::Fatal(message)) => {
                Self::command_error(proto_command_error::Err::ServerFault(ProtoServerFault { message }))
            }
        }
    }

    fn command_error(err: proto_command_error::Err) -> ProtoCommandResult {
        ProtoCommandResult {
            result: Some(proto_command_result::Result::Err(ProtoCommandError { err: Some(err) })),
        }
    }

    fn malformed(e: WireError) -> ProtoMalformedMessage {
        ProtoMalformedMessage { message: e.to_string() }
    }

    fn actor_exited() -> ProtoServerFault {
        ProtoServerFault {
            message: "Server internal CIB task has exited".to_string(),
        }
    }

    fn open_callback_stream(
        &self,
        registration: ProtoCallbackRegistration,
    ) -> ReceiverStream<Result<ProtoCibMessage, Status>> {
        let (_, mut callbacks) = self.sessions.register(&registration.client_name);
        let (tx, rx) = mpsc::channel(CALLBACK_STREAM_SIZE);
        let logger = self.logger.new(slog::o!("Client" => registration.client_name));

        tokio::spawn(async move {
            while let Some(message) = callbacks.recv().await {
                let proto = match encode_message(&message) {
                    Ok(proto) => proto,
                    Err(e) => {
                        slog::warn!(logger, "Dropping callback message: {}", e);
                        continue;
                    }
                };
                slog::debug!(logger, "ServerWire - {:?}", proto);
                if tx.send(Ok(proto)).await.is_err() {
                    slog::debug!(logger, "Callback stream closed by client");
                    break;
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

#[async_trait::async_trait]
impl GrpcCib for RpcServer {
    async fn deliver(
        &self,
        rpc_request_wrapped: Request<ProtoCibMessage>,
    ) -> Result<Response<ProtoDeliverResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_deliver(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        Ok(Response::new(rpc_result))
    }

    async fn command(
        &self,
        rpc_request_wrapped: Request<ProtoCibMessage>,
    ) -> Result<Response<ProtoCommandResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_command(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        Ok(Response::new(rpc_result))
    }

    type CallbacksStream = ReceiverStream<Result<ProtoCibMessage, Status>>;

    async fn callbacks(
        &self,
        rpc_request_wrapped: Request<ProtoCallbackRegistration>,
    ) -> Result<Response<Self::CallbacksStream>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        Ok(Response::new(self.open_callback_stream(rpc_request)))
    }
}
