use crate::call::{CallOptions, CibMessage, CibStatus, Payload};
use crate::document::{apply_diff, Diff, DiffError};
use crate::registry::PreparedInput;
use crate::replication::DiffGate;
use crate::store::{CibStore, NodeExit, OpOutput};

pub(crate) fn process_apply_diff(
    store: &mut CibStore,
    request: &CibMessage,
    input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let diff = input.diff.as_ref().ok_or(CibStatus::NoObject)?;

    if store.role.is_master() {
        store.resync.pin_for_master();
    }

    match store.resync.begin_diff() {
        DiffGate::Refuse { count } => {
            slog::warn!(
                store.logger,
                "Not applying diff {} -> {} (sync in progress, {} refused)",
                diff.from,
                diff.to,
                count
            );
            return Err(CibStatus::DiffResync);
        }
        DiffGate::Proceed { reset: true } => {
            slog::info!(store.logger, "No full copy arrived in time, retrying the resync if needed");
        }
        DiffGate::Proceed { reset: false } => {}
    }

    match apply_diff(&store.document, diff) {
        Ok(doc) => Ok(OpOutput::installed(doc, Some(diff.clone()))),
        Err(e) => Err(store.diff_failed(request, diff, e)),
    }
}

pub(crate) fn process_sync(
    store: &mut CibStore,
    request: &CibMessage,
    _input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    store.sync_our_cib(request, true)?;
    Ok(OpOutput::unchanged())
}

pub(crate) fn process_sync_one(
    store: &mut CibStore,
    request: &CibMessage,
    _input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    store.sync_our_cib(request, false)?;
    Ok(OpOutput::unchanged())
}

/// master, slave, slave-all and is-master.
pub(crate) fn process_readwrite(
    store: &mut CibStore,
    request: &CibMessage,
    _input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    match request.operation.as_str() {
        "is-master" => {
            if !store.role.is_master() {
                return Err(CibStatus::NotMaster);
            }
        }
        "master" => {
            if store.role.request_master() {
                slog::info!(store.logger, "We are now in R/W mode");
                store.peers.forget_master();
                store.resync.pin_for_master();
            } else {
                slog::debug!(store.logger, "We are still in R/W mode");
            }
        }
        _ => {
            if store.role.request_slave() {
                slog::info!(store.logger, "We are now in R/O mode");
            }
        }
    }
    Ok(OpOutput::unchanged())
}

pub(crate) fn process_shutdown_req(
    store: &mut CibStore,
    request: &CibMessage,
    _input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let host = request
        .origin
        .as_ref()
        .map(|origin| origin.to_string())
        .unwrap_or_else(|| "local client".to_string());

    if !request.is_reply {
        slog::info!(store.logger, "Shutdown REQ from {}", host);
        if let Some(origin) = request.origin.as_ref().filter(|origin| **origin != store.node_id) {
            let mut ack = request.reply(CibStatus::Ok, None);
            ack.host = Some(origin.clone());
            store.send_to(Some(origin), ack)?;
        }
        return Ok(OpOutput::unchanged());
    }

    if store.shutting_down {
        slog::info!(store.logger, "Shutdown ACK from {}", host);
        store.request_exit(NodeExit::Terminated);
        return Ok(OpOutput::unchanged());
    }

    slog::error!(store.logger, "Shutdown ACK from {} - not shutting down", host);
    Err(CibStatus::Unknown)
}

pub(crate) fn process_quit(
    store: &mut CibStore,
    _request: &CibMessage,
    _input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    slog::warn!(store.logger, "Asked to exit, complying");
    store.request_exit(NodeExit::Quit);
    Ok(OpOutput::unchanged())
}

/// Answers with the document root and its generation, without any content.
pub(crate) fn process_ping(
    store: &mut CibStore,
    _request: &CibMessage,
    _input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    Ok(OpOutput::with_output(store.document.without_children()))
}

pub(crate) fn process_noop(
    _store: &mut CibStore,
    _request: &CibMessage,
    _input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    Ok(OpOutput::unchanged())
}

impl CibStore {
    fn diff_failed(&mut self, request: &CibMessage, diff: &Diff, error: DiffError) -> CibStatus {
        if self.role.is_master() {
            slog::error!(
                self.logger,
                "Diff {} -> {} failed on the master: {}",
                diff.from,
                diff.to,
                error
            );
            self.resync.clear();
            return CibStatus::DiffFailed;
        }

        if request.call_options.contains(CallOptions::FORCE_DIFF) {
            slog::warn!(self.logger, "Not requesting full refresh in slave mode");
            return CibStatus::DiffFailed;
        }

        slog::warn!(self.logger, "Diff {} -> {} does not apply: {}", diff.from, diff.to, error);
        self.resync.record_failure();
        self.request_resync()
    }

    /// Asks the node with the newest known copy for a full replace.
    fn request_resync(&mut self) -> CibStatus {
        let target = self.peers.resync_target(&self.node_id);
        match &target {
            Some(node) => slog::info!(self.logger, "Requesting re-sync from {}", node),
            None => slog::info!(self.logger, "Requesting re-sync from all peers"),
        }

        let mut sync_me = CibMessage::request("sync-one", CallOptions::NONE);
        sync_me.delegated_from = Some(self.node_id.clone());
        sync_me.host = target.clone();

        match self.send_to(target.as_ref(), sync_me) {
            Ok(()) => CibStatus::DiffResync,
            Err(status) => status,
        }
    }

    /// Sends our whole document as a global replace, to every peer or to the node that asked.
    ///
    /// A sync-one that was broadcast rather than addressed to us is left to the master.
    fn sync_our_cib(&mut self, request: &CibMessage, all: bool) -> Result<(), CibStatus> {
        if !all && request.host.is_none() && request.origin.is_some() && !self.role.is_master() {
            slog::debug!(self.logger, "Leaving broadcast '{}' to the master", request.operation);
            return Ok(());
        }

        let requester = request.delegated_from.clone().or_else(|| request.origin.clone());
        if !all && requester.is_none() {
            slog::error!(self.logger, "Bad sync: '{}' does not say who to sync", request.operation);
            return Err(CibStatus::InvalidArgument);
        }

        let mut replace = request.clone();
        replace.operation = "replace".to_string();
        replace.original_operation = Some(request.operation.clone());
        replace.section = None;
        replace.result = None;
        replace.update_diff = None;
        replace.delegated_from = None;
        replace.is_reply = requester.is_some();
        replace.host = requester.clone();
        replace.global_update = true;
        replace.calldata = Some(Payload::Document(self.document.clone()));

        let to = if all { None } else { requester.as_ref() };
        match to {
            Some(node) => slog::debug!(self.logger, "Syncing generation {} to {}", self.generation(), node),
            None => slog::debug!(self.logger, "Syncing generation {} to all peers", self.generation()),
        }
        self.send_to(to, replace)
    }
}

#[cfg(test)]
mod tests {
    use crate::call::{CallOptions, CibMessage, CibStatus};
    use crate::document::{empty_document, Diff};
    use crate::generation::Generation;
    use crate::replication::{InMemoryNetwork, NodeId, Role};
    use crate::store::test_support::{call, store_on};
    use crate::store::NodeExit;

    fn mismatching_diff() -> CibMessage {
        let mut base = empty_document();
        Generation::new(0, 9, 0).write_to(&mut base);
        let mut next = base.clone();
        Generation::new(0, 9, 1).write_to(&mut next);

        let mut message = CibMessage::request("apply-diff", CallOptions::NONE);
        message.global_update = true;
        message.update_diff = Some(Diff::compute(&base, &next).unwrap());
        message
    }

    fn sync_requests(network: &InMemoryNetwork, node: &str) -> usize {
        network
            .sent_by(&NodeId::new(node))
            .iter()
            .filter(|m| m.message.operation == "sync-one")
            .count()
    }

    #[test]
    fn is_master_distinguishes_roles() {
        let network = InMemoryNetwork::new();
        let mut master = store_on(&network, "m", Role::Master);
        let mut slave = store_on(&network, "s", Role::Slave);
        let is_master = || CibMessage::request("is-master", CallOptions::SYNC_CALL);

        assert_eq!(call(&mut master, is_master()).result, Some(CibStatus::Ok));
        assert_eq!(call(&mut slave, is_master()).result, Some(CibStatus::NotMaster));
    }

    #[test]
    fn promotion_pins_resync_and_demotion_is_idempotent() {
        let network = InMemoryNetwork::new();
        let mut store = store_on(&network, "s", Role::Slave);
        store.resync.record_failure();

        call(&mut store, CibMessage::request("master", CallOptions::NONE));
        assert!(store.role.is_master());
        assert!(store.role.synced_once());
        assert_eq!(store.resync.count(), 0);

        call(&mut store, CibMessage::request("slave", CallOptions::NONE));
        call(&mut store, CibMessage::request("slave-all", CallOptions::NONE));
        assert!(!store.role.is_master());
    }

    #[test]
    fn refused_diffs_do_not_repeat_the_resync_request() {
        let network = InMemoryNetwork::new();
        let _master = network.add_listener(NodeId::new("m"));
        let mut store = store_on(&network, "s", Role::Slave);

        let first = call(&mut store, mismatching_diff());
        let second = call(&mut store, mismatching_diff());

        assert_eq!(first.result, Some(CibStatus::DiffResync));
        assert_eq!(second.result, Some(CibStatus::DiffResync));
        assert_eq!(store.resync.count(), 2);
        assert_eq!(sync_requests(&network, "s"), 1);
    }

    #[test]
    fn resync_request_is_retried_past_the_ceiling() {
        let network = InMemoryNetwork::new();
        let _master = network.add_listener(NodeId::new("m"));
        let mut store = store_on(&network, "s", Role::Slave);

        // Threshold is 3: one request, two refusals, then the counter resets and a fresh
        // request goes out.
        let counts: Vec<u32> = (0..4)
            .map(|_| {
                call(&mut store, mismatching_diff());
                store.resync.count()
            })
            .collect();

        assert_eq!(counts, vec![1, 2, 3, 1]);
        assert_eq!(sync_requests(&network, "s"), 2);
    }

    #[test]
    fn forced_diff_failure_skips_the_resync() {
        let network = InMemoryNetwork::new();
        let mut store = store_on(&network, "s", Role::Slave);
        let mut forced = mismatching_diff();
        forced.call_options = CallOptions::FORCE_DIFF;

        let reply = call(&mut store, forced);

        assert_eq!(reply.result, Some(CibStatus::DiffFailed));
        assert_eq!(store.resync.count(), 0);
        assert!(network.sent_messages().is_empty());
    }

    #[test]
    fn unreachable_resync_target_reports_not_connected() {
        let network = InMemoryNetwork::new();
        let mut store = store_on(&network, "s", Role::Slave);
        store.peers.observe_master(&NodeId::new("gone"));

        let reply = call(&mut store, mismatching_diff());

        assert_eq!(reply.result, Some(CibStatus::NotConnected));
        assert_eq!(store.resync.count(), 1);
    }

    #[test]
    fn sync_without_requester_is_refused() {
        let network = InMemoryNetwork::new();
        let mut store = store_on(&network, "m", Role::Master);

        let reply = call(&mut store, CibMessage::request("sync-one", CallOptions::NONE));

        assert_eq!(reply.result, Some(CibStatus::InvalidArgument));
    }

    #[test]
    fn sync_all_broadcasts_the_document() {
        let network = InMemoryNetwork::new();
        let mut store = store_on(&network, "m", Role::Master);

        let reply = call(&mut store, CibMessage::request("sync", CallOptions::NONE));

        assert_eq!(reply.result, Some(CibStatus::Ok));
        let sent = network.sent_by(&NodeId::new("m"));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, None);
        assert_eq!(sent[0].message.operation, "replace");
        assert!(sent[0].message.global_update);
    }

    #[test]
    fn shutdown_handshake() {
        let network = InMemoryNetwork::new();
        let _leaving = network.add_listener(NodeId::new("a"));
        let mut peer = store_on(&network, "b", Role::Master);
        let mut leaving = store_on(&network, "a", Role::Slave);

        leaving.begin_shutdown();
        let request = network.sent_by(&NodeId::new("a")).remove(0).message;
        assert_eq!(request.operation, "shutdown-request");

        peer.handle_peer_message(request).unwrap();
        let ack = network.sent_by(&NodeId::new("b")).remove(0);
        assert_eq!(ack.to, Some(NodeId::new("a")));
        assert!(ack.message.is_reply);

        assert!(peer.take_exit().is_none());
        leaving.handle_peer_message(ack.message).unwrap();
        assert!(matches!(leaving.take_exit(), Some(NodeExit::Terminated)));
    }

    #[test]
    fn unexpected_shutdown_ack_is_an_error() {
        let network = InMemoryNetwork::new();
        let mut store = store_on(&network, "a", Role::Master);
        let mut ack = CibMessage::request("shutdown-request", CallOptions::NONE);
        ack.is_reply = true;

        let reply = call(&mut store, ack);

        assert_eq!(reply.result, Some(CibStatus::Unknown));
        assert!(store.take_exit().is_none());
    }

    #[test]
    fn quit_and_ping() {
        let network = InMemoryNetwork::new();
        let mut store = store_on(&network, "a", Role::Master);

        let ping = call(&mut store, CibMessage::request("ping", CallOptions::NONE));
        let noop = call(&mut store, CibMessage::request("noop", CallOptions::NONE));
        assert_eq!(ping.result, Some(CibStatus::Ok));
        assert_eq!(Generation::of(ping.document().unwrap()), store.generation());
        assert!(ping.document().unwrap().children().is_empty());
        assert_eq!(noop.result, Some(CibStatus::Ok));
        assert!(store.take_exit().is_none());

        call(&mut store, CibMessage::request("quit", CallOptions::NONE));
        assert!(matches!(store.take_exit(), Some(NodeExit::Quit)));
    }
}
