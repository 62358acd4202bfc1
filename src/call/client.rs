use crate::call::channel::CommandChannel;
use crate::call::session::session_ops;
use crate::call::{CallId, CallIdAllocator, CallOptions, CibMessage, CibStatus, MessageKind};
use crate::document::Element;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};
use tokio_stream::StreamExt;
use tokio_util::time::{delay_queue, DelayQueue};

/// Invoked with the call id, the result code and the output of an async call.
pub type ReplyCallback = Box<dyn FnOnce(CallId, CibStatus, Option<Element>) + Send>;

/// Invoked for every notification of the event it was registered for.
pub type NotifyCallback = Box<dyn Fn(&CibMessage) + Send>;

// A far newer id than expected means the counter wrapped, the reply is old.
const WRAP_WINDOW: i64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("Not connected to the CIB")]
    NotConnected,
    #[error("Failed to send call: {0}")]
    SendFailed(String),
    #[error("No reply to call {0} in time")]
    Timeout(CallId),
    #[error("Reply to call {0} carried no result code")]
    MissingReturnCode(CallId),
    #[error("Call {call_id} failed: {status}")]
    Status {
        call_id: CallId,
        status: CibStatus,
        output: Option<Element>,
    },
}

impl CallError {
    /// The result code a caller would see for this error.
    pub fn status(&self) -> CibStatus {
        match self {
            CallError::NotConnected => CibStatus::NotConnected,
            CallError::SendFailed(_) => CibStatus::SendFailed,
            CallError::Timeout(_) => CibStatus::RemoteTimeout,
            CallError::MissingReturnCode(_) => CibStatus::MissingReturnCode,
            CallError::Status { status, .. } => *status,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum CallOutcome {
    /// Sync call that returned ok.
    Completed { call_id: CallId, output: Option<Element> },
    /// Async call. The reply goes to the callback registered for the id, if any.
    Pending(CallId),
    /// Discard-reply call. Nobody will ever see its result.
    Discarded,
}

enum DispatchCommand {
    AddReplyCallback {
        call_id: CallId,
        timeout: Option<Duration>,
        callback: ReplyCallback,
    },
    /// Forgets a reply callback without invoking it.
    DropReplyCallback {
        call_id: CallId,
        ack: oneshot::Sender<()>,
    },
    AddNotifyCallback {
        event: String,
        name: String,
        callback: NotifyCallback,
        ack: oneshot::Sender<bool>,
    },
    RemoveNotifyCallback {
        event: String,
        name: String,
        ack: oneshot::Sender<Option<usize>>,
    },
    #[cfg(test)]
    CountReplyCallbacks { ack: oneshot::Sender<usize> },
}

type SyncReply = (CallId, Result<CibMessage, CallError>);

/// CibConnection is a client's session with one node.
///
/// Sync calls wait for their reply. Async calls return the call id right away and their reply
/// is handed to a callback by a background dispatcher, which also delivers notifications.
pub struct CibConnection {
    logger: slog::Logger,
    client_name: String,
    token: String,
    channel: Arc<dyn CommandChannel>,
    call_ids: Mutex<CallIdAllocator>,
    call_timeout: Duration,
    sync_tx: mpsc::Sender<SyncReply>,
    sync_inbox: tokio::sync::Mutex<mpsc::Receiver<SyncReply>>,
    dispatcher: mpsc::Sender<DispatchCommand>,
}

impl CibConnection {
    pub(crate) async fn connect(
        logger: slog::Logger,
        client_name: &str,
        channel: Arc<dyn CommandChannel>,
        call_timeout: Duration,
    ) -> Result<Self, CallError> {
        let (token, callbacks) = channel.register(client_name).await?;
        let logger = logger.new(slog::o!("Client" => client_name.to_string()));

        let (dispatcher, commands) = mpsc::channel(16);
        tokio::spawn(Dispatcher::new(logger.clone()).run(commands, callbacks));

        let (sync_tx, sync_rx) = mpsc::channel(16);
        Ok(CibConnection {
            logger,
            client_name: client_name.to_string(),
            token,
            channel,
            call_ids: Mutex::new(CallIdAllocator::new()),
            call_timeout,
            sync_tx,
            sync_inbox: tokio::sync::Mutex::new(sync_rx),
            dispatcher,
        })
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    fn stamp(&self, message: &mut CibMessage) -> CallId {
        let call_id = self
            .call_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next();
        message.kind = MessageKind::Command;
        message.call_id = call_id;
        message.client_id = Some(self.token.clone());
        message.client_name = Some(self.client_name.clone());
        call_id
    }

    /// Submits a call. With `sync_call` this waits for the reply, otherwise it returns as soon
    /// as the node has accepted the call.
    pub async fn perform(&self, mut message: CibMessage) -> Result<CallOutcome, CallError> {
        let call_id = self.stamp(&mut message);
        if message.call_options.is_sync() {
            return self.perform_sync(call_id, message).await;
        }

        let discard = message.call_options.discards_reply();
        match self.channel.command(message).await? {
            None if discard => Ok(CallOutcome::Discarded),
            None => Ok(CallOutcome::Pending(call_id)),
            Some(reply) => complete(call_id, reply),
        }
    }

    /// Submits an async call whose reply is handed to `callback`. Without a reply within
    /// `timeout` the callback gets `RemoteTimeout`.
    pub async fn submit_async(
        &self,
        mut message: CibMessage,
        timeout: Option<Duration>,
        callback: ReplyCallback,
    ) -> Result<CallId, CallError> {
        message.call_options = message
            .call_options
            .without(CallOptions::SYNC_CALL)
            .without(CallOptions::DISCARD_REPLY);
        let call_id = self.stamp(&mut message);

        // Registered first so the reply cannot overtake it.
        self.dispatcher
            .send(DispatchCommand::AddReplyCallback {
                call_id,
                timeout,
                callback,
            })
            .await
            .map_err(|_| CallError::NotConnected)?;

        let error = match self.channel.command(message).await {
            Ok(None) => return Ok(call_id),
            Ok(Some(_)) => CallError::SendFailed(format!("call {} was answered inline", call_id)),
            Err(e) => e,
        };

        // No reply will come for this id, so its callback has to go now.
        let (ack, dropped) = oneshot::channel();
        if self
            .dispatcher
            .send(DispatchCommand::DropReplyCallback { call_id, ack })
            .await
            .is_ok()
        {
            let _ = dropped.await;
        }
        Err(error)
    }

    #[cfg(test)]
    async fn pending_replies(&self) -> usize {
        let (ack, count) = oneshot::channel();
        let _ = self.dispatcher.send(DispatchCommand::CountReplyCallbacks { ack }).await;
        count.await.unwrap_or_default()
    }

    async fn perform_sync(
        &self,
        call_id: CallId,
        message: CibMessage,
    ) -> Result<CallOutcome, CallError> {
        let mut inbox = self.sync_inbox.lock().await;

        let channel = self.channel.clone();
        let sync_tx = self.sync_tx.clone();
        tokio::spawn(async move {
            let result = match channel.command(message).await {
                Ok(Some(reply)) => Ok(reply),
                Ok(None) => Err(CallError::SendFailed(format!("sync call {} was not answered inline", call_id))),
                Err(e) => Err(e),
            };
            let id = match &result {
                Ok(reply) => reply.call_id,
                Err(_) => call_id,
            };
            let _ = sync_tx.send((id, result)).await;
        });

        let deadline = Instant::now() + self.call_timeout;
        loop {
            let (id, result) = match tokio::time::timeout_at(deadline, inbox.recv()).await {
                Ok(Some(reply)) => reply,
                Ok(None) => return Err(CallError::NotConnected),
                Err(_) => {
                    slog::warn!(self.logger, "No reply to call {} after {:?}", call_id, self.call_timeout);
                    return Err(CallError::Timeout(call_id));
                }
            };

            let (got, wanted) = (i64::from(id.as_i32()), i64::from(call_id.as_i32()));
            if got == wanted {
                return complete(call_id, result?);
            } else if got < wanted || got - WRAP_WINDOW > wanted {
                slog::warn!(self.logger, "Received old reply {} while waiting for {}", id, call_id);
            } else {
                slog::warn!(self.logger, "Received reply {} from the future while waiting for {}", id, call_id);
            }
        }
    }

    /// Registers `callback` for notifications of `event`. Returns false if a callback with the
    /// same name is already registered for it.
    pub async fn add_notify_callback(
        &self,
        event: &str,
        name: &str,
        callback: NotifyCallback,
    ) -> Result<bool, CallError> {
        let (ack, added) = oneshot::channel();
        self.dispatcher
            .send(DispatchCommand::AddNotifyCallback {
                event: event.to_string(),
                name: name.to_string(),
                callback,
                ack,
            })
            .await
            .map_err(|_| CallError::NotConnected)?;

        if !added.await.map_err(|_| CallError::NotConnected)? {
            return Ok(false);
        }
        self.subscription(session_ops::NOTIFY_ADD, event).await?;
        Ok(true)
    }

    /// Removes a notify callback. Returns false if it was not registered.
    pub async fn remove_notify_callback(&self, event: &str, name: &str) -> Result<bool, CallError> {
        let (ack, removed) = oneshot::channel();
        self.dispatcher
            .send(DispatchCommand::RemoveNotifyCallback {
                event: event.to_string(),
                name: name.to_string(),
                ack,
            })
            .await
            .map_err(|_| CallError::NotConnected)?;

        match removed.await.map_err(|_| CallError::NotConnected)? {
            None => Ok(false),
            Some(0) => {
                self.subscription(session_ops::NOTIFY_REMOVE, event).await?;
                Ok(true)
            }
            Some(_) => Ok(true),
        }
    }

    async fn subscription(&self, operation: &str, event: &str) -> Result<(), CallError> {
        let mut message = CibMessage::request(operation, CallOptions::SYNC_CALL);
        message.notify_event = Some(event.to_string());
        self.perform(message).await.map(|_| ())
    }

    /// Sync `query` of a section, or of the whole document with `None`.
    pub async fn query(&self, section: Option<&str>) -> Result<Option<Element>, CallError> {
        let mut message = CibMessage::request("query", CallOptions::SYNC_CALL);
        message.section = section.map(str::to_string);
        match self.perform(message).await? {
            CallOutcome::Completed { output, .. } => Ok(output),
            _ => Ok(None),
        }
    }

    /// Sync `is-master`. A slave answers with `NotMaster`, which is reported as `Ok(false)`.
    pub async fn is_master(&self) -> Result<bool, CallError> {
        match self.perform(CibMessage::request("is-master", CallOptions::SYNC_CALL)).await {
            Ok(_) => Ok(true),
            Err(CallError::Status {
                status: CibStatus::NotMaster,
                ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn complete(call_id: CallId, reply: CibMessage) -> Result<CallOutcome, CallError> {
    match reply.result {
        Some(CibStatus::Ok) => Ok(CallOutcome::Completed {
            call_id,
            output: reply.into_document(),
        }),
        Some(status) => Err(CallError::Status {
            call_id,
            status,
            output: reply.into_document(),
        }),
        None => Err(CallError::MissingReturnCode(call_id)),
    }
}

struct PendingCallback {
    callback: ReplyCallback,
    timeout: Option<delay_queue::Key>,
}

struct Dispatcher {
    logger: slog::Logger,
    replies: HashMap<CallId, PendingCallback>,
    timeouts: DelayQueue<CallId>,
    notify: HashMap<String, Vec<(String, NotifyCallback)>>,
}

impl Dispatcher {
    fn new(logger: slog::Logger) -> Self {
        Dispatcher {
            logger,
            replies: HashMap::new(),
            timeouts: DelayQueue::new(),
            notify: HashMap::new(),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<DispatchCommand>,
        mut callbacks: mpsc::Receiver<CibMessage>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                message = callbacks.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => {
                        slog::warn!(self.logger, "Callback channel closed");
                        self.fail_pending(CibStatus::NotConnected);
                        break;
                    }
                },
                Some(expired) = self.timeouts.next(), if !self.timeouts.is_empty() => {
                    let call_id = expired.into_inner();
                    if let Some(pending) = self.replies.remove(&call_id) {
                        slog::warn!(self.logger, "Async call {} timed out", call_id);
                        (pending.callback)(call_id, CibStatus::RemoteTimeout, None);
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: DispatchCommand) {
        match command {
            DispatchCommand::AddReplyCallback {
                call_id,
                timeout,
                callback,
            } => {
                let timeout = timeout.map(|t| self.timeouts.insert(call_id, t));
                self.replies.insert(call_id, PendingCallback { callback, timeout });
            }
            DispatchCommand::DropReplyCallback { call_id, ack } => {
                if let Some(PendingCallback { timeout: Some(key), .. }) = self.replies.remove(&call_id) {
                    self.timeouts.remove(&key);
                }
                let _ = ack.send(());
            }
            DispatchCommand::AddNotifyCallback {
                event,
                name,
                callback,
                ack,
            } => {
                let callbacks = self.notify.entry(event.clone()).or_insert_with(Vec::new);
                if callbacks.iter().any(|(existing, _)| existing == &name) {
                    slog::warn!(self.logger, "Callback '{}' already registered for {}", name, event);
                    let _ = ack.send(false);
                } else {
                    callbacks.push((name, callback));
                    let _ = ack.send(true);
                }
            }
            DispatchCommand::RemoveNotifyCallback { event, name, ack } => {
                let remaining = match self.notify.get_mut(&event) {
                    Some(callbacks) => {
                        let before = callbacks.len();
                        callbacks.retain(|(existing, _)| existing != &name);
                        if callbacks.len() < before {
                            Some(callbacks.len())
                        } else {
                            None
                        }
                    }
                    None => None,
                };
                let _ = ack.send(remaining);
            }
            #[cfg(test)]
            DispatchCommand::CountReplyCallbacks { ack } => {
                let _ = ack.send(self.replies.len());
            }
        }
    }

    fn dispatch(&mut self, message: CibMessage) {
        match message.kind {
            MessageKind::Notify => {
                let event = message.notify_event.as_deref().unwrap_or_default();
                if let Some(callbacks) = self.notify.get(event) {
                    for (_, callback) in callbacks.iter() {
                        callback(&message);
                    }
                }
            }
            MessageKind::Command => {
                let call_id = message.call_id;
                let pending = match self.replies.remove(&call_id) {
                    Some(pending) => pending,
                    None => {
                        slog::debug!(self.logger, "No callback for reply {}", call_id);
                        return;
                    }
                };
                if let Some(key) = pending.timeout {
                    self.timeouts.remove(&key);
                }
                let status = message.result.unwrap_or(CibStatus::MissingReturnCode);
                (pending.callback)(call_id, status, message.into_document());
            }
            MessageKind::Register => {
                slog::debug!(self.logger, "Ignoring repeated registration");
            }
        }
    }

    fn fail_pending(&mut self, status: CibStatus) {
        self.timeouts.clear();
        for (call_id, pending) in self.replies.drain() {
            (pending.callback)(call_id, status, None);
        }
    }
}
