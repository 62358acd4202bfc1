use crate::call::CibStatus;
use crate::generation::Generation;
use crate::replication::Role;
use tokio::sync::watch;

/// What an observer can see of a node between two events.
#[derive(Clone, Debug, PartialEq)]
pub struct CibStateSnapshot {
    pub generation: Generation,
    pub role: Role,
    pub resync_count: u32,
    pub writes_enabled: bool,
    pub synced_once: bool,
    /// Generation of the last copy that made it to disk.
    pub last_write: Option<Generation>,
    /// Why the last disk write failed, either `DiskWriteFailed` or `BadPermissions`.
    pub write_error: Option<CibStatus>,
}

pub(crate) fn new(initial_state: CibStateSnapshot) -> (CibStateNotifier, CibStateListener) {
    let (snd, rcv) = watch::channel(initial_state);

    (CibStateNotifier { snd }, CibStateListener { rcv })
}

pub(crate) struct CibStateNotifier {
    snd: watch::Sender<CibStateSnapshot>,
}

impl CibStateNotifier {
    pub(crate) fn notify_new_state(&self, new_state: CibStateSnapshot) {
        let _ = self.snd.send(new_state);
    }
}

#[derive(Clone)]
pub struct CibStateListener {
    rcv: watch::Receiver<CibStateSnapshot>,
}

impl CibStateListener {
    /// Waits for the next published state. `None` once the node is gone.
    pub async fn next(&mut self) -> Option<CibStateSnapshot> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }

    pub fn current(&self) -> CibStateSnapshot {
        self.rcv.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(num_updates: u32) -> CibStateSnapshot {
        CibStateSnapshot {
            generation: Generation::new(0, 1, num_updates),
            role: Role::Slave,
            resync_count: 0,
            writes_enabled: true,
            synced_once: false,
            last_write: None,
            write_error: None,
        }
    }

    #[tokio::test]
    async fn listener_sees_latest_state() {
        let (notifier, mut listener) = new(snapshot(0));

        notifier.notify_new_state(snapshot(1));
        notifier.notify_new_state(snapshot(2));

        assert_eq!(listener.next().await, Some(snapshot(2)));
        assert_eq!(listener.current(), snapshot(2));

        drop(notifier);
        assert_eq!(listener.next().await, None);
    }
}
