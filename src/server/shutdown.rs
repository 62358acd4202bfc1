use tokio::sync::oneshot;

pub(crate) fn shutdown_signal() -> (RpcServerShutdownHandle, RpcServerShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (RpcServerShutdownHandle { tx }, RpcServerShutdownSignal { rx })
}

/// Stops the server when triggered or dropped.
pub(crate) struct RpcServerShutdownHandle {
    tx: oneshot::Sender<()>,
}

impl RpcServerShutdownHandle {
    pub(crate) fn trigger(self) {
        let _ = self.tx.send(());
    }
}

pub(crate) struct RpcServerShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl RpcServerShutdownSignal {
    /// Resolves once the handle was triggered or dropped.
    pub(crate) async fn triggered(self) {
        // Either outcome means stop.
        let _ = self.rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn dropping_the_handle_fires_the_signal() {
        let (handle, signal) = shutdown_signal();
        drop(handle);

        assert!(timeout(Duration::from_secs(1), signal.triggered()).await.is_ok());
    }

    #[tokio::test]
    async fn signal_waits_for_the_handle() {
        let (handle, signal) = shutdown_signal();

        assert!(timeout(Duration::from_millis(50), signal.triggered()).await.is_err());
        handle.trigger();
    }
}
