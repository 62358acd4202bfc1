use crate::call::session::{CommandReply, SessionError, SessionRouter};
use crate::call::{decode_message, encode_message, CallError, CibMessage, CibStatus, MessageKind};
use crate::grpc::grpc_cib_client::GrpcCibClient;
use crate::grpc::{proto_command_error, proto_command_result, ProtoCallbackRegistration};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

const CALLBACK_QUEUE_SIZE: usize = 64;

/// CommandChannel is how a `CibConnection` reaches a node: either in process, or over gRPC.
#[async_trait::async_trait]
pub(crate) trait CommandChannel: Send + Sync {
    /// Opens the callback channel and returns the client token. The registration message itself
    /// is consumed.
    async fn register(&self, client_name: &str) -> Result<(String, mpsc::Receiver<CibMessage>), CallError>;

    /// Sends one command. `None` means the node accepted it and any reply will arrive on the
    /// callback channel.
    async fn command(&self, message: CibMessage) -> Result<Option<CibMessage>, CallError>;
}

fn token_from_registration(message: Option<CibMessage>) -> Result<String, CallError> {
    match message {
        Some(CibMessage {
            kind: MessageKind::Register,
            client_id: Some(token),
            ..
        }) => Ok(token),
        Some(other) => Err(CallError::SendFailed(format!(
            "expected registration on callback channel, got {:?}",
            other.kind
        ))),
        None => Err(CallError::NotConnected),
    }
}

/// In-process channel to a node's session router.
pub(crate) struct LocalChannel {
    router: Arc<SessionRouter>,
    privileged: bool,
}

impl LocalChannel {
    pub(crate) fn new(router: Arc<SessionRouter>, privileged: bool) -> Self {
        LocalChannel { router, privileged }
    }
}

#[async_trait::async_trait]
impl CommandChannel for LocalChannel {
    async fn register(&self, client_name: &str) -> Result<(String, mpsc::Receiver<CibMessage>), CallError> {
        let (_, mut callbacks) = self.router.register(client_name);
        let token = token_from_registration(callbacks.recv().await)?;
        Ok((token, callbacks))
    }

    async fn command(&self, message: CibMessage) -> Result<Option<CibMessage>, CallError> {
        let call_id = message.call_id;
        match self.router.handle_command(message, self.privileged).await {
            Ok(CommandReply::Reply(reply)) => Ok(Some(reply)),
            Ok(CommandReply::Accepted) => Ok(None),
            Err(SessionError::UnknownClient) => Err(CallError::Status {
                call_id,
                status: CibStatus::CallbackToken,
                output: None,
            }),
            Err(SessionError::ActorExited) | Err(SessionError::Fatal(_)) => Err(CallError::NotConnected),
        }
    }
}

/// gRPC channel to a remote node's client service.
pub(crate) struct GrpcChannel {
    logger: slog::Logger,
    client: GrpcCibClient<Channel>,
}

impl GrpcChannel {
    pub(crate) async fn connect(logger: slog::Logger, addr: SocketAddr) -> Result<Self, CallError> {
        let endpoint =
            Endpoint::from_shared(format!("http://{}", addr)).map_err(|e| CallError::SendFailed(e.to_string()))?;
        let channel = endpoint.connect().await.map_err(|e| {
            slog::warn!(logger, "Failed to connect to {}: {}", addr, e);
            CallError::NotConnected
        })?;

        Ok(GrpcChannel {
            logger,
            client: GrpcCibClient::new(channel),
        })
    }
}

#[async_trait::async_trait]
impl CommandChannel for GrpcChannel {
    async fn register(&self, client_name: &str) -> Result<(String, mpsc::Receiver<CibMessage>), CallError> {
        let registration = ProtoCallbackRegistration {
            client_name: client_name.to_string(),
        };
        let mut stream = self
            .client
            .clone()
            .callbacks(Request::new(registration))
            .await
            .map_err(|status| CallError::SendFailed(status.to_string()))?
            .into_inner();

        let first = match stream.message().await {
            Ok(Some(proto)) => Some(decode_message(proto).map_err(|e| CallError::SendFailed(e.to_string()))?),
            Ok(None) => None,
            Err(status) => return Err(CallError::SendFailed(status.to_string())),
        };
        let token = token_from_registration(first)?;

        let (tx, rx) = mpsc::channel(CALLBACK_QUEUE_SIZE);
        let logger = self.logger.clone();
        tokio::spawn(async move {
            loop {
                let proto = match stream.message().await {
                    Ok(Some(proto)) => proto,
                    Ok(None) => break,
                    Err(status) => {
                        slog::warn!(logger, "Callback channel failed: {}", status);
                        break;
                    }
                };
                slog::debug!(logger, "ClientWire - {:?}", proto);
                match decode_message(proto) {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => slog::warn!(logger, "Dropping malformed callback message: {}", e),
                }
            }
        });

        Ok((token, rx))
    }

    async fn command(&self, message: CibMessage) -> Result<Option<CibMessage>, CallError> {
        let call_id = message.call_id;
        let proto = encode_message(&message).map_err(|e| CallError::SendFailed(e.to_string()))?;

        slog::debug!(self.logger, "ClientWire - {:?}", proto);
        let result = self.client.clone().command(Request::new(proto)).await;
        slog::debug!(self.logger, "ClientWire - {:?}", result);

        let result = result.map_err(|status| CallError::SendFailed(status.to_string()))?;
        match result.into_inner().result {
            Some(proto_command_result::Result::Reply(reply)) => decode_message(reply)
                .map(Some)
                .map_err(|e| CallError::SendFailed(e.to_string())),
            Some(proto_command_result::Result::Accepted(_)) => Ok(None),
            Some(proto_command_result::Result::Err(e)) => match e.err {
                Some(proto_command_error::Err::UnknownClient(_)) => Err(CallError::Status {
                    call_id,
                    status: CibStatus::CallbackToken,
                    output: None,
                }),
                Some(proto_command_error::Err::Malformed(m)) => Err(CallError::SendFailed(m.message)),
                Some(proto_command_error::Err::ServerFault(_)) | None => Err(CallError::NotConnected),
            },
            None => Err(CallError::SendFailed("empty command result".to_string())),
        }
    }
}
