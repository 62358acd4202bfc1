use crate::call::CibStatus;
use crate::document::{attrs, digest_of_bytes, parse, serialize, without_status, DocumentError, Element};
use crate::generation::{stamp_for_write, Generation};
use crate::persistence::series::sync_directory;
use crate::persistence::{sig_path, validate, CibFiles, ReadError};
use chrono::Utc;
use std::fs;
use std::io::{self, Write};
use tempfile::NamedTempFile;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("The on-disk copy was modified outside of the store: {0}")]
    ManualModification(ReadError),
    #[error("Freshly written copy failed verification")]
    VerifyFailed,
    #[error("Write task did not finish: {0}")]
    Aborted(String),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl WriteError {
    /// Result code a failed write is reported with.
    pub fn status(&self) -> CibStatus {
        match self {
            WriteError::Io(e) if e.kind() == io::ErrorKind::PermissionDenied => CibStatus::BadPermissions,
            WriteError::ManualModification(ReadError::Io(e)) if e.kind() == io::ErrorKind::PermissionDenied => {
                CibStatus::BadPermissions
            }
            _ => CibStatus::DiskWriteFailed,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WriteSummary {
    pub generation: Generation,
    pub digest: String,
    /// Sequence number the previous primary was backed up to.
    pub backup: Option<u32>,
}

/// Writes `doc` as the new primary.
///
/// Nothing that was already committed is touched until the new copy and its signature are on
/// disk and verified. The status section is not written and num_updates is stored as 0.
pub fn write_atomic(logger: &slog::Logger, files: &CibFiles, doc: &Element) -> Result<WriteSummary, WriteError> {
    let mut on_disk = stamp_for_write(&without_status(doc));
    on_disk.set_attr(
        attrs::LAST_WRITTEN,
        Utc::now().format("%a %b %e %H:%M:%S %Y").to_string(),
    );
    let generation = Generation::of(&on_disk);

    let primary = files.primary();
    match validate(logger, &primary) {
        Ok(_) | Err(ReadError::Missing(_)) => {}
        Err(e) => {
            slog::error!(logger, "Refusing to overwrite {}: {}", primary.display(), e);
            return Err(WriteError::ManualModification(e));
        }
    }

    let mut doc_tmp = NamedTempFile::new_in(files.directory())?;
    doc_tmp.write_all(&serialize(&on_disk)?)?;
    doc_tmp.as_file().sync_all()?;

    let digest = digest_of_bytes(&fs::read(doc_tmp.path())?)?;

    let mut sig_tmp = NamedTempFile::new_in(files.directory())?;
    sig_tmp.write_all(digest.as_bytes())?;
    sig_tmp.as_file().sync_all()?;

    let reread = fs::read(doc_tmp.path())?;
    if parse(&reread)? != on_disk || digest_of_bytes(&reread)? != digest {
        slog::error!(logger, "Verification of the new copy at generation {} failed", generation);
        return Err(WriteError::VerifyFailed);
    }

    let backup = files.rotate()?;

    doc_tmp.persist(&primary).map_err(|e| e.error)?;
    sig_tmp.persist(sig_path(&primary)).map_err(|e| e.error)?;
    sync_directory(files.directory())?;

    slog::info!(
        logger,
        "Wrote generation {} to {} (digest {}, previous copy in backup {:?})",
        generation,
        primary.display(),
        digest,
        backup
    );

    Ok(WriteSummary {
        generation,
        digest,
        backup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{calculate_digest, empty_document, tags};
    use slog::Drain;
    use tempfile::TempDir;

    fn logger() -> slog::Logger {
        let decorator = slog_term::PlainDecorator::new(std::io::stdout());
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        slog::Logger::root(drain, slog::o!())
    }

    fn backups(files: &CibFiles) -> usize {
        (0..files.wrap_limit()).filter(|seq| files.backup(*seq).exists()).count()
    }

    #[test]
    fn repeated_writes_stay_valid_and_rotate_once_each() {
        let log = logger();
        let dir = TempDir::new().unwrap();
        let files = CibFiles::new(dir.path(), "cib", 10);
        let doc = empty_document();

        let first = write_atomic(&log, &files, &doc).unwrap();
        assert!(validate(&log, &files.primary()).is_ok());
        assert_eq!(first.backup, None);
        assert_eq!(backups(&files), 0);

        let second = write_atomic(&log, &files, &doc).unwrap();
        assert!(validate(&log, &files.primary()).is_ok());
        assert_eq!(second.backup, Some(0));
        assert_eq!(backups(&files), 1);

        let stored = fs::read_to_string(sig_path(&files.primary())).unwrap();
        assert_eq!(stored, second.digest);
    }

    #[test]
    fn status_and_update_counter_are_not_persisted() {
        let log = logger();
        let dir = TempDir::new().unwrap();
        let files = CibFiles::new(dir.path(), "cib", 10);
        let mut doc = empty_document();
        Generation::new(1, 2, 3).write_to(&mut doc);

        let summary = write_atomic(&log, &files, &doc).unwrap();
        let on_disk = validate(&log, &files.primary()).unwrap();

        assert_eq!(summary.generation, Generation::new(1, 2, 0));
        assert_eq!(Generation::of(&on_disk), Generation::new(1, 2, 0));
        assert!(on_disk.child(tags::STATUS).is_none());
        assert!(on_disk.attr(attrs::LAST_WRITTEN).is_some());
        assert_eq!(Generation::of(&doc), Generation::new(1, 2, 3));
    }

    #[test]
    fn hand_edited_primary_blocks_the_write() {
        let log = logger();
        let dir = TempDir::new().unwrap();
        let files = CibFiles::new(dir.path(), "cib", 10);
        write_atomic(&log, &files, &empty_document()).unwrap();

        let mut edited = validate(&log, &files.primary()).unwrap();
        edited.set_attr("epoch", "99");
        fs::write(files.primary(), serialize(&edited).unwrap()).unwrap();
        assert_ne!(
            calculate_digest(&edited).unwrap(),
            fs::read_to_string(sig_path(&files.primary())).unwrap()
        );

        let result = write_atomic(&log, &files, &empty_document());

        assert!(matches!(result, Err(WriteError::ManualModification(_))));
        assert_eq!(backups(&files), 0);
    }

    #[test]
    fn failures_map_to_result_codes() {
        let denied = WriteError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        let unreadable_io = io::Error::from(io::ErrorKind::PermissionDenied);
        let unreadable = WriteError::ManualModification(ReadError::Io(unreadable_io));
        let full = WriteError::Io(io::Error::new(io::ErrorKind::Other, "no space left"));

        assert_eq!(denied.status(), CibStatus::BadPermissions);
        assert_eq!(unreadable.status(), CibStatus::BadPermissions);
        assert_eq!(full.status(), CibStatus::DiskWriteFailed);
        assert_eq!(WriteError::VerifyFailed.status(), CibStatus::DiskWriteFailed);
    }
}
