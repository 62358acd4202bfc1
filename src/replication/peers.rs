use crate::generation::Generation;
use std::fmt;
use std::net::SocketAddr;

/// NodeId names one cluster node.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId(String);

impl NodeId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId::new(id)
    }
}

#[derive(Clone, Debug)]
pub struct CibPeerInfo {
    pub node_id: String,
    pub addr: SocketAddr,
}

/// PeerTracker remembers what we have heard from other nodes, which is what picks the node to
/// ask for a full copy.
#[derive(Debug, Default)]
pub(crate) struct PeerTracker {
    best: Option<(Generation, NodeId)>,
    master: Option<NodeId>,
}

impl PeerTracker {
    pub(crate) fn new() -> Self {
        PeerTracker::default()
    }

    /// Records that `origin` holds a copy at `generation`. Ties keep the first node seen.
    pub(crate) fn observe_generation(&mut self, origin: &NodeId, generation: Generation) {
        let newer = match &self.best {
            None => true,
            Some((best, _)) => generation > *best,
        };
        if newer {
            self.best = Some((generation, origin.clone()));
        }
    }

    pub(crate) fn observe_master(&mut self, origin: &NodeId) {
        self.master = Some(origin.clone());
    }

    pub(crate) fn forget_master(&mut self) {
        self.master = None;
    }

    /// Node holding the newest copy we know of, else the master. `None` means ask everyone.
    pub(crate) fn resync_target(&self, me: &NodeId) -> Option<NodeId> {
        if let Some((_, origin)) = &self.best {
            if origin != me {
                return Some(origin.clone());
            }
        }
        match &self.master {
            Some(master) if master != me => Some(master.clone()),
            _ => None,
        }
    }
}
