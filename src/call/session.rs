use crate::actor::{ClientCallError, ClientCallInput, WeakActorClient};
use crate::call::{CibMessage, CibStatus, MessageKind};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};

const CALLBACK_QUEUE_SIZE: usize = 64;

/// Operations handled by the session layer itself, never by the store.
pub mod session_ops {
    pub const NOTIFY_ADD: &str = "notify-add";
    pub const NOTIFY_REMOVE: &str = "notify-remove";
}

#[derive(Debug)]
pub(crate) enum CommandReply {
    /// Sync calls and session operations.
    Reply(CibMessage),
    /// Async and discard-reply calls.
    Accepted,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SessionError {
    #[error("Unknown client token")]
    UnknownClient,
    #[error("CIB event loop has exited")]
    ActorExited,
    #[error("CIB event loop stopped: {0}")]
    Fatal(String),
}

impl From<ClientCallError> for SessionError {
    fn from(e: ClientCallError) -> Self {
        match e {
            ClientCallError::ActorExited => SessionError::ActorExited,
            ClientCallError::Fatal(message) => SessionError::Fatal(message),
        }
    }
}

struct ClientSession {
    name: String,
    callbacks: mpsc::Sender<CibMessage>,
    subscriptions: Arc<Mutex<HashSet<String>>>,
}

/// SessionRouter is the server side of the client protocol. It hands out tokens for callback
/// channels and routes commands to the store.
pub(crate) struct SessionRouter {
    logger: slog::Logger,
    actor: WeakActorClient,
    clients: Arc<Mutex<HashMap<String, ClientSession>>>,
    notifications: broadcast::Sender<CibMessage>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionRouter {
    pub(crate) fn new(
        logger: slog::Logger,
        actor: WeakActorClient,
        notifications: broadcast::Sender<CibMessage>,
    ) -> Self {
        SessionRouter {
            logger,
            actor,
            clients: Arc::new(Mutex::new(HashMap::new())),
            notifications,
        }
    }

    /// Opens a callback channel. The first message on it is a `cib_register` carrying the token
    /// the client has to put in every command.
    pub(crate) fn register(&self, client_name: &str) -> (String, mpsc::Receiver<CibMessage>) {
        let token = hex::encode(rand::random::<[u8; 16]>());
        let (tx, rx) = mpsc::channel(CALLBACK_QUEUE_SIZE);

        let mut hello = CibMessage::request("register", Default::default());
        hello.kind = MessageKind::Register;
        hello.client_id = Some(token.clone());
        hello.client_name = Some(client_name.to_string());
        let _ = tx.try_send(hello);

        let subscriptions = Arc::new(Mutex::new(HashSet::new()));
        lock(&self.clients).insert(
            token.clone(),
            ClientSession {
                name: client_name.to_string(),
                callbacks: tx.clone(),
                subscriptions: subscriptions.clone(),
            },
        );
        self.spawn_notification_forwarder(client_name, token.clone(), tx, subscriptions);
        slog::debug!(self.logger, "Registered client '{}'", client_name);

        (token, rx)
    }

    /// Forwards subscribed notifications until the client drops its callback channel, then
    /// forgets the client.
    fn spawn_notification_forwarder(
        &self,
        client_name: &str,
        token: String,
        callbacks: mpsc::Sender<CibMessage>,
        subscriptions: Arc<Mutex<HashSet<String>>>,
    ) {
        let logger = self.logger.new(slog::o!("Client" => client_name.to_string()));
        let mut notifications = self.notifications.subscribe();
        let clients = self.clients.clone();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = callbacks.closed() => break,
                    received = notifications.recv() => received,
                };
                let notification = match received {
                    Ok(notification) => notification,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        slog::warn!(logger, "Client is too slow, dropped {} notifications", missed);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // The node is gone, commands will fail on their own.
                        callbacks.closed().await;
                        break;
                    }
                };

                let wanted = match &notification.notify_event {
                    Some(event) => lock(&subscriptions).contains(event),
                    None => false,
                };
                if wanted && callbacks.try_send(notification).is_err() {
                    slog::warn!(logger, "Callback queue is full, dropping notification");
                }
            }

            lock(&clients).remove(&token);
            slog::debug!(logger, "Client disconnected");
        });
    }

    fn lookup(
        &self,
        token: Option<&str>,
    ) -> Result<(String, mpsc::Sender<CibMessage>, Arc<Mutex<HashSet<String>>>), SessionError> {
        let token = token.ok_or(SessionError::UnknownClient)?;
        let mut clients = lock(&self.clients);

        let closed = match clients.get(token) {
            None => return Err(SessionError::UnknownClient),
            Some(session) => session.callbacks.is_closed(),
        };
        if closed {
            clients.remove(token);
            return Err(SessionError::UnknownClient);
        }

        let session = &clients[token];
        Ok((
            session.name.clone(),
            session.callbacks.clone(),
            session.subscriptions.clone(),
        ))
    }

    #[cfg(test)]
    fn client_count(&self) -> usize {
        lock(&self.clients).len()
    }

    /// Routes one command.
    ///
    /// Async calls are queued in the store before this returns, so a client's calls are
    /// processed in the order it sent them.
    pub(crate) async fn handle_command(
        &self,
        mut message: CibMessage,
        privileged: bool,
    ) -> Result<CommandReply, SessionError> {
        let (name, callbacks, subscriptions) = self.lookup(message.client_id.as_deref())?;
        if message.client_name.is_none() {
            message.client_name = Some(name);
        }

        match message.operation.as_str() {
            session_ops::NOTIFY_ADD | session_ops::NOTIFY_REMOVE => {
                let status = match &message.notify_event {
                    Some(event) if message.operation == session_ops::NOTIFY_ADD => {
                        lock(&subscriptions).insert(event.clone());
                        CibStatus::Ok
                    }
                    Some(event) => {
                        lock(&subscriptions).remove(event);
                        CibStatus::Ok
                    }
                    None => CibStatus::InvalidArgument,
                };
                return Ok(CommandReply::Reply(message.reply(status, None)));
            }
            _ => {}
        }

        let options = message.call_options;
        let request = message.clone();
        let pending = self
            .actor
            .enqueue_client_call(ClientCallInput { message, privileged })
            .await?;

        if options.is_sync() {
            let reply = pending.wait().await?;
            return Ok(CommandReply::Reply(reply));
        }
        if options.discards_reply() {
            return Ok(CommandReply::Accepted);
        }

        let logger = self.logger.clone();
        tokio::spawn(async move {
            let reply = match pending.wait().await {
                Ok(reply) => reply,
                Err(e) => {
                    slog::warn!(logger, "No reply for call {}: {}", request.call_id, e);
                    request.reply(CibStatus::NotConnected, None)
                }
            };
            if callbacks.send(reply).await.is_err() {
                slog::debug!(logger, "Client went away before call {} finished", request.call_id);
            }
        });
        Ok(CommandReply::Accepted)
    }
}
