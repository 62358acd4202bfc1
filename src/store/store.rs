use crate::call::{notify_events, CallOptions, CibMessage, CibStatus};
use crate::document::{attrs, tags, without_status, Diff, Element, KNOWN_SCHEMAS};
use crate::generation::{stamp_for_write, Generation};
use crate::persistence::{DiskWriteOutcome, DiskWriter};
use crate::registry::{self, OperationDescriptor};
use crate::replication::{NodeId, PeerTracker, PeerTransport, ResyncState, Role, RoleState};
use crate::store::{CibStateNotifier, CibStateSnapshot};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Why the event loop stopped.
#[derive(Debug)]
pub enum NodeExit {
    /// A `quit` request was processed.
    Quit,
    /// Shutdown completed.
    Terminated,
    Fatal(FatalError),
    /// Every handle on the node was dropped.
    ClientsDropped,
    /// The event loop task panicked or was cancelled.
    Aborted(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("The previous document could not be re-installed after a failed update: {0}")]
    ReinstallFailed(CibStatus),
}

/// What an operation did to the document.
#[derive(Debug)]
pub(crate) enum DocumentChange {
    None,
    /// An edit of the current document. The store advances num_updates.
    Updated(Element),
    /// A complete document that brings its own generation. `forward` is the diff that produced
    /// it, when there was one.
    Installed { doc: Element, forward: Option<Diff> },
}

#[derive(Debug)]
pub(crate) struct OpOutput {
    pub(crate) output: Option<Element>,
    pub(crate) change: DocumentChange,
    /// Set by a whole-document replace that completes a resync.
    pub(crate) clears_resync: bool,
}

impl OpOutput {
    pub(crate) fn unchanged() -> Self {
        OpOutput {
            output: None,
            change: DocumentChange::None,
            clears_resync: false,
        }
    }

    pub(crate) fn with_output(output: Element) -> Self {
        OpOutput {
            output: Some(output),
            ..OpOutput::unchanged()
        }
    }

    pub(crate) fn updated(doc: Element) -> Self {
        OpOutput {
            change: DocumentChange::Updated(doc),
            ..OpOutput::unchanged()
        }
    }

    pub(crate) fn installed(doc: Element, forward: Option<Diff>) -> Self {
        OpOutput {
            change: DocumentChange::Installed { doc, forward },
            ..OpOutput::unchanged()
        }
    }
}

enum CommitError {
    Rejected(CibStatus),
    Fatal(FatalError),
}

pub(crate) struct CibStoreConfig {
    pub(crate) logger: slog::Logger,
    pub(crate) node_id: NodeId,
    pub(crate) document: Element,
    pub(crate) role: Role,
    pub(crate) resync_threshold: u32,
    /// No peers are configured.
    pub(crate) standalone: bool,
    pub(crate) transport: Arc<dyn PeerTransport>,
    pub(crate) disk: DiskWriter,
    pub(crate) writes_enabled: bool,
    pub(crate) notifications: broadcast::Sender<CibMessage>,
    pub(crate) state_notifier: CibStateNotifier,
}

/// CibStore owns the live document and every piece of node-wide state that goes with it. It is
/// only ever touched from the event loop.
pub(crate) struct CibStore {
    pub(super) logger: slog::Logger,
    pub(super) node_id: NodeId,
    pub(super) document: Element,
    pub(super) role: RoleState,
    pub(super) resync: ResyncState,
    pub(super) peers: PeerTracker,
    pub(super) transport: Arc<dyn PeerTransport>,
    standalone: bool,
    disk: DiskWriter,
    writes_enabled: bool,
    last_write: Option<Generation>,
    write_error: Option<CibStatus>,
    pub(super) shutting_down: bool,
    pending_exit: Option<NodeExit>,
    notifications: broadcast::Sender<CibMessage>,
    state_notifier: CibStateNotifier,
    last_published: Option<CibStateSnapshot>,
}

impl CibStore {
    pub(crate) fn new(config: CibStoreConfig) -> Self {
        let mut role = RoleState::new(Role::Slave);
        if config.role == Role::Master {
            role.request_master();
        }

        CibStore {
            logger: config.logger,
            node_id: config.node_id,
            document: config.document,
            role,
            resync: ResyncState::new(config.resync_threshold),
            peers: PeerTracker::new(),
            transport: config.transport,
            standalone: config.standalone,
            disk: config.disk,
            writes_enabled: config.writes_enabled,
            last_write: None,
            write_error: None,
            shutting_down: false,
            pending_exit: None,
            notifications: config.notifications,
            state_notifier: config.state_notifier,
            last_published: None,
        }
    }

    pub(crate) fn generation(&self) -> Generation {
        Generation::of(&self.document)
    }

    pub(crate) fn snapshot(&self) -> CibStateSnapshot {
        CibStateSnapshot {
            generation: self.generation(),
            role: self.role.role(),
            resync_count: self.resync.count(),
            writes_enabled: self.writes_enabled,
            synced_once: self.role.synced_once(),
            last_write: self.last_write,
            write_error: self.write_error,
        }
    }

    /// Publishes the current state if it differs from what was last published.
    pub(crate) fn publish_state(&mut self) {
        let snapshot = self.snapshot();
        if self.last_published.as_ref() != Some(&snapshot) {
            self.state_notifier.notify_new_state(snapshot.clone());
            self.last_published = Some(snapshot);
        }
    }

    pub(super) fn request_exit(&mut self, exit: NodeExit) {
        if self.pending_exit.is_none() {
            self.pending_exit = Some(exit);
        }
    }

    pub(crate) fn take_exit(&mut self) -> Option<NodeExit> {
        self.pending_exit.take()
    }

    /// Runs one request through resolve, authorize, prepare, execute, install and cleanup.
    ///
    /// Every failure short of a fatal one is reported in the reply's result code.
    pub(crate) fn process_request(
        &mut self,
        request: &CibMessage,
        privileged: bool,
    ) -> Result<CibMessage, FatalError> {
        let logger = self.logger.new(slog::o!(
            "Op" => request.operation.clone(),
            "CallId" => request.call_id.as_i32(),
        ));

        let op = match registry::resolve(&request.operation) {
            Ok(op) => op,
            Err(e) => {
                slog::warn!(logger, "{}", e);
                return Ok(self.reply_to(request, e.into(), None));
            }
        };

        if let Err(e) = registry::authorize(op, privileged) {
            slog::warn!(logger, "{}", e);
            return Ok(self.reply_to(request, e.into(), None));
        }

        let read_only = !self.role.is_master() && !request.global_update;
        if read_only && op.modifies && op.needs_privilege && !op.is_role_change() {
            slog::debug!(logger, "Rejecting '{}', we are in R/O mode", op.name);
            return Ok(self.reply_to(request, CibStatus::NotMaster, None));
        }

        let input = registry::prepare(&logger, op.prepare, request);

        let (status, output) = match (op.execute)(self, request, &input) {
            Ok(result) => match self.commit(op, request, result.change, result.clears_resync) {
                Ok(()) => (CibStatus::Ok, result.output),
                Err(CommitError::Rejected(status)) => (status, None),
                Err(CommitError::Fatal(e)) => {
                    slog::crit!(logger, "{}", e);
                    return Err(e);
                }
            },
            Err(status) => {
                slog::debug!(logger, "Operation failed: {}", status);
                (status, None)
            }
        };

        let reply = self.reply_to(request, status, output.clone());
        let released = registry::cleanup(&logger, op.cleanup, request.call_options, input, output);
        slog::trace!(logger, "Cleanup released {:?}", released);

        Ok(reply)
    }

    fn reply_to(&self, request: &CibMessage, status: CibStatus, output: Option<Element>) -> CibMessage {
        let mut reply = request.reply(status, output);
        reply.host = Some(self.node_id.clone());
        reply
    }

    /// A message from another node. Peers are trusted; their replies go nowhere.
    pub(crate) fn handle_peer_message(&mut self, message: CibMessage) -> Result<(), FatalError> {
        let origin = match &message.origin {
            Some(origin) => origin.clone(),
            None => {
                slog::warn!(self.logger, "Dropping peer message '{}' without an origin", message.operation);
                return Ok(());
            }
        };
        if origin == self.node_id {
            return Ok(());
        }

        self.observe_peer(&origin, &message);

        let reply = self.process_request(&message, true)?;
        if let Some(status) = reply.result.filter(|status| !status.is_ok()) {
            slog::debug!(
                self.logger,
                "'{}' from {} finished with: {}",
                message.operation,
                origin,
                status
            );
        }
        Ok(())
    }

    fn observe_peer(&mut self, origin: &NodeId, message: &CibMessage) {
        if let Some(doc) = message.document().filter(|doc| doc.name() == tags::CIB) {
            self.peers.observe_generation(origin, Generation::of(doc));
        }
        if let Some(diff) = &message.update_diff {
            self.peers.observe_generation(origin, diff.to);
            if message.global_update && message.operation == "apply-diff" {
                self.peers.observe_master(origin);
            }
        }
    }

    fn commit(
        &mut self,
        op: &OperationDescriptor,
        request: &CibMessage,
        change: DocumentChange,
        clears_resync: bool,
    ) -> Result<(), CommitError> {
        let (candidate, forward, event) = match change {
            DocumentChange::None => return Ok(()),
            DocumentChange::Updated(mut doc) => {
                self.generation().incremented().write_to(&mut doc);
                (doc, None, notify_events::DIFF)
            }
            DocumentChange::Installed { doc, forward } => {
                let event = match forward {
                    Some(_) => notify_events::DIFF,
                    None => notify_events::REFRESH,
                };
                (doc, forward, event)
            }
        };

        let previous = self.install(candidate)?;
        if clears_resync {
            self.resync.clear();
        }

        let diff = match forward {
            Some(diff) => Some(diff),
            None => match Diff::compute(&previous, &self.document) {
                Ok(diff) => Some(diff),
                Err(e) => {
                    slog::warn!(self.logger, "Could not compute the diff for '{}': {}", op.name, e);
                    None
                }
            },
        };

        let options = request.call_options;
        if self.role.is_master()
            && op.modifies
            && !request.global_update
            && !options.contains(CallOptions::SCOPE_LOCAL)
            && !options.contains(CallOptions::INHIBIT_BCAST)
        {
            if let Some(diff) = &diff {
                self.broadcast_diff(diff.clone());
            }
        }

        if !options.contains(CallOptions::INHIBIT_NOTIFY) {
            let notification = CibMessage::notification(event, &request.operation, CibStatus::Ok, diff);
            let _ = self.notifications.send(notification);
        }

        self.request_write(&previous);
        Ok(())
    }

    /// Swaps in `candidate`. The previous document is handed back only once the new one checked
    /// out; otherwise the previous one is put back.
    fn install(&mut self, candidate: Element) -> Result<Element, CommitError> {
        let previous = std::mem::replace(&mut self.document, candidate);

        let status = match check_document(&self.document) {
            Ok(()) => return Ok(previous),
            Err(status) => status,
        };

        slog::warn!(self.logger, "New document failed validation: {}", status);
        self.document = previous;
        if let Err(reinstall) = check_document(&self.document) {
            return Err(CommitError::Fatal(FatalError::ReinstallFailed(reinstall)));
        }
        Err(CommitError::Rejected(status))
    }

    fn broadcast_diff(&self, diff: Diff) {
        let mut update = CibMessage::request("apply-diff", CallOptions::NONE);
        update.global_update = true;
        update.origin = Some(self.node_id.clone());
        slog::debug!(self.logger, "Forwarding diff {} -> {}", diff.from, diff.to);
        update.update_diff = Some(diff);

        if let Err(e) = self.transport.broadcast(update) {
            slog::warn!(self.logger, "Could not forward diff to peers: {}", e);
        }
    }

    /// Sends to one node, or to everyone when `to` is `None`.
    pub(super) fn send_to(&self, to: Option<&NodeId>, mut message: CibMessage) -> Result<(), CibStatus> {
        message.origin = Some(self.node_id.clone());
        let sent = match to {
            Some(node) => self.transport.send(node, message),
            None => self.transport.broadcast(message),
        };
        sent.map_err(|e| {
            slog::warn!(self.logger, "Send to {:?} failed: {}", to, e);
            CibStatus::NotConnected
        })
    }

    fn request_write(&mut self, previous: &Element) {
        let before = stamp_for_write(&without_status(previous));
        let after = stamp_for_write(&without_status(&self.document));
        if before == after {
            return;
        }

        if !self.writes_enabled {
            slog::warn!(
                self.logger,
                "Disk writes are disabled, generation {} only exists in memory",
                self.generation()
            );
            return;
        }
        self.disk.request(self.document.clone());
    }

    pub(crate) fn disk_write_complete(&mut self, outcome: DiskWriteOutcome) {
        match outcome {
            Ok(summary) => {
                self.last_write = Some(summary.generation);
            }
            Err(e) => {
                let status = e.status();
                slog::error!(self.logger, "Disk write failed ({}): {}", status, e);
                self.write_error = Some(status);
                if self.writes_enabled {
                    self.writes_enabled = false;
                    slog::error!(
                        self.logger,
                        "Disabling disk writes, the on-disk copy will not follow further changes"
                    );
                }
            }
        }
        self.disk.write_finished(self.writes_enabled);
    }

    /// Asks peers to acknowledge our shutdown. A standalone node stops right away.
    pub(crate) fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;

        if self.standalone {
            slog::info!(self.logger, "No peers to notify, shutting down");
            self.request_exit(NodeExit::Terminated);
            return;
        }

        slog::info!(self.logger, "Requesting shutdown acknowledgement from peers");
        let request = CibMessage::request("shutdown-request", CallOptions::NONE);
        if self.send_to(None, request).is_err() {
            self.request_exit(NodeExit::Terminated);
        }
    }
}

fn check_document(doc: &Element) -> Result<(), CibStatus> {
    if doc.name() != tags::CIB {
        return Err(CibStatus::Validation);
    }
    match doc.attr(attrs::VALIDATE_WITH) {
        Some(schema) if !KNOWN_SCHEMAS.contains(&schema) => Err(CibStatus::Validation),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::actor::{ActorClient, WeakActorClient};
    use crate::document::empty_document;
    use crate::persistence::CibFiles;
    use crate::replication::InMemoryNetwork;
    use crate::store::state;

    pub(crate) fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    /// A store wired to `network` with disk writes disabled.
    pub(crate) fn store_on(network: &InMemoryNetwork, node: &str, role: Role) -> CibStore {
        let (notifications, _) = broadcast::channel(16);
        notifying_store_on(network, node, role, notifications)
    }

    pub(crate) fn notifying_store_on(
        network: &InMemoryNetwork,
        node: &str,
        role: Role,
        notifications: broadcast::Sender<CibMessage>,
    ) -> CibStore {
        let (actor, _events) = ActorClient::new(1);
        let disk = DiskWriter::new(logger(), CibFiles::new("/nonexistent", "cib", 10), actor.weak());
        build(network, node, role, notifications, disk, false)
    }

    /// A master whose writes go to `files`. Write results are sent to `actor`.
    pub(crate) fn writing_store_on(
        network: &InMemoryNetwork,
        node: &str,
        files: CibFiles,
        actor: WeakActorClient,
    ) -> CibStore {
        let (notifications, _) = broadcast::channel(16);
        let disk = DiskWriter::new(logger(), files, actor);
        build(network, node, Role::Master, notifications, disk, true)
    }

    fn build(
        network: &InMemoryNetwork,
        node: &str,
        role: Role,
        notifications: broadcast::Sender<CibMessage>,
        disk: DiskWriter,
        writes_enabled: bool,
    ) -> CibStore {
        let (state_notifier, _listener) = state::new(CibStateSnapshot {
            generation: Generation::default(),
            role,
            resync_count: 0,
            writes_enabled,
            synced_once: false,
            last_write: None,
            write_error: None,
        });

        CibStore::new(CibStoreConfig {
            logger: logger(),
            node_id: NodeId::new(node),
            document: empty_document(),
            role,
            resync_threshold: 3,
            standalone: false,
            transport: Arc::new(network.transport_for(NodeId::new(node))),
            disk,
            writes_enabled,
            notifications,
            state_notifier,
        })
    }

    pub(crate) fn call(store: &mut CibStore, request: CibMessage) -> CibMessage {
        store.process_request(&request, true).unwrap()
    }
}
