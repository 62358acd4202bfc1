use crate::call::CibMessage;
use crate::persistence::DiskWriteOutcome;
use crate::store::{CibStore, NodeExit};
use std::error::Error;
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
enum Event {
    // A command from a local or remote client. The reply goes back on the callback, even for
    // async and discard-reply calls, whoever enqueued it decides what to do with it.
    ClientCall(ClientCallInput, Callback<CibMessage, ClientCallError>),

    // Diffs, full replaces, resync requests and shutdown handshakes from other nodes. There is
    // nobody to reply to.
    PeerMessage(CibMessage),

    // Result of the background disk write.
    DiskWriteComplete(DiskWriteOutcome),

    // Start the shutdown handshake with peers.
    Shutdown,
}

#[derive(Debug)]
pub(crate) struct ClientCallInput {
    pub(crate) message: CibMessage,
    pub(crate) privileged: bool,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ClientCallError {
    #[error("CIB event loop has exited")]
    ActorExited,
    #[error("CIB event loop stopped while processing the call: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
#[error("CIB event loop has exited")]
pub(crate) struct ActorExited;

#[derive(Debug)]
struct Callback<O: Debug, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    pub fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }
}

/// Receiving end of an actor's queue, handed to `CibActor::new`.
pub(crate) struct EventReceiver(mpsc::Receiver<Event>);

#[cfg(test)]
impl EventReceiver {
    /// Skips everything but disk write results. Lets tests stand in for the event loop.
    pub(crate) async fn next_disk_write(&mut self) -> Option<DiskWriteOutcome> {
        while let Some(event) = self.0.recv().await {
            if let Event::DiskWriteComplete(outcome) = event {
                return Some(outcome);
            }
        }
        None
    }
}

#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

/// A call that is queued in the actor. Awaiting it yields the reply.
pub(crate) struct PendingReply(oneshot::Receiver<Result<CibMessage, ClientCallError>>);

impl PendingReply {
    pub(crate) async fn wait(self) -> Result<CibMessage, ClientCallError> {
        match self.0.await {
            Ok(result) => result,
            Err(_) => Err(ClientCallError::ActorExited),
        }
    }
}

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (ActorClient { sender }, EventReceiver(receiver))
    }

    /// A handle that does not keep the event loop alive.
    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    /// Queues the call and returns once it is in line. Calls are processed in the order they
    /// were queued.
    pub(crate) async fn enqueue_client_call(
        &self,
        input: ClientCallInput,
    ) -> Result<PendingReply, ClientCallError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Event::ClientCall(input, Callback(tx)))
            .await
            .map_err(|_| ClientCallError::ActorExited)?;
        Ok(PendingReply(rx))
    }

    pub(crate) async fn peer_message(&self, message: CibMessage) -> Result<(), ActorExited> {
        self.send(Event::PeerMessage(message)).await
    }

    pub(crate) async fn disk_write_complete(&self, outcome: DiskWriteOutcome) -> Result<(), ActorExited> {
        self.send(Event::DiskWriteComplete(outcome)).await
    }

    pub(crate) async fn shutdown(&self) -> Result<(), ActorExited> {
        self.send(Event::Shutdown).await
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        self.sender.send(event).await.map_err(|_| ActorExited)
    }
}

/// WeakActorClient is held by everything the actor itself owns or spawns (server, transports,
/// disk writer), so that dropping the node's `ActorClient` ends the event loop.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl WeakActorClient {
    fn upgrade(&self) -> Result<ActorClient, ActorExited> {
        match self.sender.upgrade() {
            Some(sender) => Ok(ActorClient { sender }),
            None => Err(ActorExited),
        }
    }

    pub(crate) async fn enqueue_client_call(
        &self,
        input: ClientCallInput,
    ) -> Result<PendingReply, ClientCallError> {
        let client = self.upgrade().map_err(|_| ClientCallError::ActorExited)?;
        client.enqueue_client_call(input).await
    }

    pub(crate) async fn peer_message(&self, message: CibMessage) -> Result<(), ActorExited> {
        self.upgrade()?.peer_message(message).await
    }

    pub(crate) async fn disk_write_complete(&self, outcome: DiskWriteOutcome) -> Result<(), ActorExited> {
        self.upgrade()?.disk_write_complete(outcome).await
    }
}

/// CibActor is the store in actor model: one event at a time, in arrival order.
pub(crate) struct CibActor {
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    store: CibStore,
    exit: Option<NodeExit>,
}

impl CibActor {
    pub(crate) fn new(logger: slog::Logger, receiver: EventReceiver, store: CibStore) -> Self {
        CibActor {
            logger,
            receiver: receiver.0,
            store,
            exit: None,
        }
    }

    pub(crate) async fn run_event_loop(mut self) -> NodeExit {
        self.store.publish_state();

        while let Some(event) = self.receiver.recv().await {
            self.handle_event(event);
            self.store.publish_state();

            if let Some(exit) = self.exit.take().or_else(|| self.store.take_exit()) {
                slog::info!(self.logger, "Event loop exiting: {:?}", exit);
                return exit;
            }
        }

        slog::info!(self.logger, "All clients dropped, event loop exiting");
        NodeExit::ClientsDropped
    }

    // This must NOT be async. Any long running work must be spawned on another actor
    // and/or come as a callback to this actor.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::ClientCall(input, callback) => match self.store.process_request(&input.message, input.privileged) {
                Ok(reply) => callback.send(Ok(reply)),
                Err(e) => {
                    callback.send(Err(ClientCallError::Fatal(e.to_string())));
                    self.exit = Some(NodeExit::Fatal(e));
                }
            },
            Event::PeerMessage(message) => {
                if let Err(e) = self.store.handle_peer_message(message) {
                    self.exit = Some(NodeExit::Fatal(e));
                }
            }
            Event::DiskWriteComplete(outcome) => {
                self.store.disk_write_complete(outcome);
            }
            Event::Shutdown => {
                self.store.begin_shutdown();
            }
        }
    }
}
