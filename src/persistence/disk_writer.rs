use crate::actor::WeakActorClient;
use crate::document::Element;
use crate::persistence::{write_atomic, CibFiles, WriteError, WriteSummary};

pub(crate) type DiskWriteOutcome = Result<WriteSummary, WriteError>;

/// DiskWriter runs `write_atomic` off the event loop. The result comes back to the actor as an
/// event.
///
/// At most one write is in flight. Documents requested meanwhile replace each other, only the
/// newest gets written once the current write completes.
pub(crate) struct DiskWriter {
    logger: slog::Logger,
    files: CibFiles,
    actor: WeakActorClient,
    in_flight: bool,
    queued: Option<Element>,
}

impl DiskWriter {
    pub(crate) fn new(logger: slog::Logger, files: CibFiles, actor: WeakActorClient) -> Self {
        DiskWriter {
            logger,
            files,
            actor,
            in_flight: false,
            queued: None,
        }
    }

    pub(crate) fn request(&mut self, doc: Element) {
        if self.in_flight {
            if self.queued.replace(doc).is_some() {
                slog::debug!(self.logger, "Superseded a queued disk write");
            }
            return;
        }
        self.start(doc);
    }

    /// Called when the in-flight write finished. Starts the queued write, if any and allowed.
    pub(crate) fn write_finished(&mut self, writes_enabled: bool) {
        self.in_flight = false;
        match self.queued.take() {
            Some(doc) if writes_enabled => self.start(doc),
            Some(_) => slog::warn!(self.logger, "Dropping queued disk write, writes are disabled"),
            None => {}
        }
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        !self.in_flight && self.queued.is_none()
    }

    fn start(&mut self, doc: Element) {
        self.in_flight = true;

        let logger = self.logger.clone();
        let files = self.files.clone();
        let actor = self.actor.clone();
        tokio::spawn(async move {
            let write_logger = logger.clone();
            let write = tokio::task::spawn_blocking(move || write_atomic(&write_logger, &files, &doc));
            let outcome = match write.await {
                Ok(outcome) => outcome,
                Err(e) => Err(WriteError::Aborted(e.to_string())),
            };
            if actor.disk_write_complete(outcome).await.is_err() {
                slog::debug!(logger, "Disk write finished after the node exited");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::document::empty_document;
    use crate::generation::Generation;
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn at_epoch(epoch: u32) -> Element {
        let mut doc = empty_document();
        Generation::new(0, epoch, 0).write_to(&mut doc);
        doc
    }

    #[tokio::test]
    async fn requests_during_a_write_collapse_to_the_newest() {
        let dir = TempDir::new().unwrap();
        let (actor, mut events) = ActorClient::new(4);
        let mut writer = DiskWriter::new(logger(), CibFiles::new(dir.path(), "cib", 10), actor.weak());

        writer.request(at_epoch(1));
        writer.request(at_epoch(2));
        writer.request(at_epoch(3));

        let first = events.next_disk_write().await.unwrap().unwrap();
        assert_eq!(first.generation, Generation::new(0, 1, 0));
        writer.write_finished(true);

        let second = events.next_disk_write().await.unwrap().unwrap();
        assert_eq!(second.generation, Generation::new(0, 3, 0));
        writer.write_finished(true);

        assert!(writer.is_idle());
        assert!(timeout(Duration::from_millis(100), events.next_disk_write()).await.is_err());
    }

    #[tokio::test]
    async fn queued_document_is_dropped_once_writes_are_disabled() {
        let dir = TempDir::new().unwrap();
        let (actor, mut events) = ActorClient::new(4);
        let mut writer = DiskWriter::new(logger(), CibFiles::new(dir.path(), "cib", 10), actor.weak());

        writer.request(at_epoch(1));
        writer.request(at_epoch(2));
        events.next_disk_write().await.unwrap().unwrap();
        writer.write_finished(false);

        assert!(writer.is_idle());
        assert!(timeout(Duration::from_millis(100), events.next_disk_write()).await.is_err());
    }
}
