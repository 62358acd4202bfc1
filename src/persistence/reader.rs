use crate::document::{attrs, calculate_digest, empty_document, ensure_status, parse, DocumentError, Element};
use crate::generation::Generation;
use crate::persistence::{sig_path, CibFiles};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("{} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("Digest of {} does not match its signature", .0.display())]
    BadDigest(PathBuf),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// Where `read_with_recovery` found its document.
#[derive(Clone, Debug, PartialEq)]
pub enum CibSource {
    Primary,
    Backup(u32),
    Empty,
}

#[derive(Debug)]
pub struct RecoveredCib {
    pub document: Element,
    pub source: CibSource,
}

/// Reads and verifies one document file against its signature.
///
/// A missing signature is accepted with a warning so stores written before signatures existed
/// still load.
pub fn validate(logger: &slog::Logger, path: &Path) -> Result<Element, ReadError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ReadError::Missing(path.to_path_buf())),
        Err(e) => return Err(e.into()),
    };
    let doc = parse(&raw)?;

    match fs::read_to_string(sig_path(path)) {
        Ok(expected) => {
            if expected.trim() != calculate_digest(&doc)? {
                return Err(ReadError::BadDigest(path.to_path_buf()));
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            slog::warn!(logger, "No digest for {}, accepting it unverified", path.display());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(doc)
}

/// Loads the newest usable copy: the primary, else the newest valid backup, else an empty
/// document. Never fails. A corrupt primary is moved aside, never deleted.
pub fn read_with_recovery(logger: &slog::Logger, files: &CibFiles, archive_corrupt: bool) -> RecoveredCib {
    let primary = files.primary();

    let mut found = match validate(logger, &primary) {
        Ok(doc) => Some((doc, CibSource::Primary)),
        Err(ReadError::Missing(_)) => {
            slog::info!(logger, "No primary copy at {}", primary.display());
            None
        }
        Err(e) => {
            slog::error!(logger, "Primary copy is unusable: {}", e);
            if archive_corrupt {
                archive(logger, &primary);
            }
            None
        }
    };

    if found.is_none() {
        found = newest_valid_backup(logger, files);
    }

    let (mut document, source) = found.unwrap_or_else(|| (empty_document(), CibSource::Empty));
    fill_missing_generation(logger, &mut document);
    if ensure_status(&mut document) {
        slog::debug!(logger, "Added missing status section");
    }

    let generation = Generation::of(&document);
    match &source {
        CibSource::Primary => {
            slog::info!(logger, "Loaded generation {} from {}", generation, primary.display());
        }
        CibSource::Backup(seq) => {
            slog::warn!(
                logger,
                "Loaded generation {} from backup {}",
                generation,
                files.backup(*seq).display()
            );
        }
        CibSource::Empty => {
            slog::warn!(logger, "No usable copy on disk, starting from an empty document");
        }
    }

    RecoveredCib { document, source }
}

fn newest_valid_backup(logger: &slog::Logger, files: &CibFiles) -> Option<(Element, CibSource)> {
    let mut seq = files.last_sequence()?;

    for _ in 0..files.wrap_limit() {
        let path = files.backup(seq);
        if !path.exists() {
            slog::debug!(logger, "Backup {} does not exist, giving up", path.display());
            return None;
        }
        match validate(logger, &path) {
            Ok(doc) => return Some((doc, CibSource::Backup(seq))),
            Err(e) => slog::warn!(logger, "Skipping backup: {}", e),
        }
        seq = files.previous(seq);
    }

    None
}

/// Moves `path` and its signature to `<path>.auto.<random>`.
fn archive(logger: &slog::Logger, path: &Path) {
    let mut archived = path.as_os_str().to_owned();
    archived.push(format!(".auto.{:08x}", rand::random::<u32>()));
    let archived = PathBuf::from(archived);

    match fs::rename(path, &archived) {
        Ok(()) => slog::error!(logger, "Archived corrupt copy as {}", archived.display()),
        Err(e) => {
            slog::error!(logger, "Could not archive {}: {}", path.display(), e);
            return;
        }
    }

    let sig = sig_path(path);
    if sig.exists() {
        if let Err(e) = fs::rename(&sig, sig_path(&archived)) {
            slog::error!(logger, "Could not archive {}: {}", sig.display(), e);
        }
    }
}

fn fill_missing_generation(logger: &slog::Logger, doc: &mut Element) {
    for name in Generation::missing_attributes(doc) {
        if name == attrs::ADMIN_EPOCH {
            slog::warn!(logger, "Document has no {}, defaulting to 0", name);
        } else {
            slog::debug!(logger, "Document has no {}, defaulting to 0", name);
        }
        doc.set_attr(name, "0");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{serialize, tags};
    use crate::persistence::write_atomic;
    use slog::Drain;
    use tempfile::TempDir;

    fn logger() -> slog::Logger {
        let decorator = slog_term::PlainDecorator::new(std::io::stdout());
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        slog::Logger::root(drain, slog::o!())
    }

    fn at_generation(epoch: u32) -> Element {
        let mut doc = empty_document();
        Generation::new(0, epoch, 0).write_to(&mut doc);
        doc
    }

    #[test]
    fn empty_directory_yields_empty_document() {
        let dir = TempDir::new().unwrap();
        let files = CibFiles::new(dir.path(), "cib", 5);

        let recovered = read_with_recovery(&logger(), &files, true);

        assert_eq!(recovered.source, CibSource::Empty);
        assert_eq!(Generation::of(&recovered.document), Generation::default());
        assert!(recovered.document.child(tags::STATUS).is_some());
    }

    #[test]
    fn corrupt_primary_falls_back_to_backup_and_is_archived() {
        let log = logger();
        let dir = TempDir::new().unwrap();
        let files = CibFiles::new(dir.path(), "cib", 5);
        write_atomic(&log, &files, &at_generation(1)).unwrap();
        write_atomic(&log, &files, &at_generation(2)).unwrap();

        // Backup 0 now holds epoch 1. Tamper with the primary behind the store's back.
        let mut tampered = at_generation(2);
        tampered.set_attr("dc-uuid", "intruder");
        fs::remove_file(files.primary()).unwrap();
        fs::write(files.primary(), serialize(&tampered).unwrap()).unwrap();

        let recovered = read_with_recovery(&log, &files, true);

        assert_eq!(recovered.source, CibSource::Backup(0));
        assert_eq!(Generation::of(&recovered.document), Generation::new(0, 1, 0));
        assert!(!files.primary().exists());
        let archived: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("cib.json.auto."))
            .collect();
        assert_eq!(archived.len(), 2);
    }

    #[test]
    fn unsigned_primary_is_accepted() {
        let dir = TempDir::new().unwrap();
        let files = CibFiles::new(dir.path(), "cib", 5);
        let mut doc = Element::new(tags::CIB).with_attr(attrs::EPOCH, "7");
        doc.push_child(Element::new(tags::CONFIGURATION));
        fs::write(files.primary(), serialize(&doc).unwrap()).unwrap();

        let recovered = read_with_recovery(&logger(), &files, true);

        assert_eq!(recovered.source, CibSource::Primary);
        assert_eq!(recovered.document.attr(attrs::ADMIN_EPOCH), Some("0"));
        assert_eq!(Generation::of(&recovered.document), Generation::new(0, 7, 0));
        assert!(recovered.document.child(tags::STATUS).is_some());
    }

    #[test]
    fn missing_backup_stops_the_walk() {
        let log = logger();
        let dir = TempDir::new().unwrap();
        let files = CibFiles::new(dir.path(), "cib", 5);
        write_atomic(&log, &files, &at_generation(1)).unwrap();
        write_atomic(&log, &files, &at_generation(2)).unwrap();
        fs::write(files.primary(), b"garbage").unwrap();
        fs::remove_file(files.backup(0)).unwrap();

        let recovered = read_with_recovery(&log, &files, false);

        assert_eq!(recovered.source, CibSource::Empty);
        assert!(files.primary().exists());
    }
}
