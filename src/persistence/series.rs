use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// CibFiles is the on-disk layout of one store.
///
/// ```text
/// <dir>/<series>.json          primary document
/// <dir>/<series>.json.sig      digest of the primary
/// <dir>/<series>-<seq>         backups, each with a matching .sig
/// <dir>/<series>.last          next sequence number and wrap limit
/// ```
#[derive(Clone, Debug)]
pub struct CibFiles {
    directory: PathBuf,
    series_name: String,
    wrap_limit: u32,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct SequenceCounter {
    next: u32,
    wrap: u32,
}

impl CibFiles {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(directory: P, series_name: S, wrap_limit: u32) -> Self {
        CibFiles {
            directory: directory.into(),
            series_name: series_name.into(),
            wrap_limit: wrap_limit.max(1),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn wrap_limit(&self) -> u32 {
        self.wrap_limit
    }

    pub fn primary(&self) -> PathBuf {
        self.directory.join(format!("{}.json", self.series_name))
    }

    pub fn backup(&self, seq: u32) -> PathBuf {
        self.directory.join(format!("{}-{}", self.series_name, seq))
    }

    fn counter(&self) -> PathBuf {
        self.directory.join(format!("{}.last", self.series_name))
    }

    /// Sequence number the next backup will use. A missing or unreadable counter starts at 0.
    pub fn next_sequence(&self) -> u32 {
        match fs::read(self.counter()) {
            Ok(raw) => match serde_json::from_slice::<SequenceCounter>(&raw) {
                Ok(counter) => self.wrap(counter.next),
                Err(_) => 0,
            },
            Err(_) => 0,
        }
    }

    /// Sequence number of the most recent backup, if one was ever taken.
    pub fn last_sequence(&self) -> Option<u32> {
        if !self.counter().exists() {
            return None;
        }
        let next = self.next_sequence();
        Some(if next == 0 { self.wrap_limit - 1 } else { next - 1 })
    }

    /// The sequence number preceding `seq` in the ring.
    pub fn previous(&self, seq: u32) -> u32 {
        if seq == 0 {
            self.wrap_limit - 1
        } else {
            seq - 1
        }
    }

    fn wrap(&self, seq: u32) -> u32 {
        seq % self.wrap_limit
    }

    /// Copies the current primary and its signature into the series and advances the counter.
    /// Returns the sequence number used, or `None` when there was nothing to back up.
    pub fn rotate(&self) -> io::Result<Option<u32>> {
        let primary = self.primary();
        if !primary.exists() {
            return Ok(None);
        }

        let seq = self.next_sequence();
        let backup = self.backup(seq);
        remove_if_present(&backup)?;
        remove_if_present(&sig_path(&backup))?;

        link_or_copy(&primary, &backup)?;
        let primary_sig = sig_path(&primary);
        if primary_sig.exists() {
            link_or_copy(&primary_sig, &sig_path(&backup))?;
        }

        self.write_counter(self.wrap(seq + 1))?;
        sync_directory(&self.directory)?;

        Ok(Some(seq))
    }

    fn write_counter(&self, next: u32) -> io::Result<()> {
        let counter = SequenceCounter {
            next,
            wrap: self.wrap_limit,
        };
        let raw = serde_json::to_vec(&counter).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut tmp = NamedTempFile::new_in(&self.directory)?;
        tmp.write_all(&raw)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.counter()).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Signature file belonging to `path`.
pub fn sig_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".sig");
    PathBuf::from(name)
}

pub(crate) fn sync_directory(directory: &Path) -> io::Result<()> {
    fs::File::open(directory)?.sync_all()
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn link_or_copy(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => Ok(()),
        Err(_) => fs::copy(from, to).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn replace(path: &Path, contents: String) {
        remove_if_present(path).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn fresh_directory_has_no_backups() {
        let dir = TempDir::new().unwrap();
        let files = CibFiles::new(dir.path(), "cib", 3);

        assert_eq!(files.next_sequence(), 0);
        assert_eq!(files.last_sequence(), None);
        assert_eq!(files.rotate().unwrap(), None);
    }

    #[test]
    fn rotation_wraps_and_overwrites_oldest() {
        let dir = TempDir::new().unwrap();
        let files = CibFiles::new(dir.path(), "cib", 3);

        for round in 0..4u32 {
            // Backups are hard links, so the primary must be replaced rather than rewritten.
            replace(&files.primary(), format!("round {}", round));
            replace(&sig_path(&files.primary()), format!("sig {}", round));
            assert_eq!(files.rotate().unwrap(), Some(round % 3));
        }

        assert_eq!(fs::read_to_string(files.backup(0)).unwrap(), "round 3");
        assert_eq!(fs::read_to_string(sig_path(&files.backup(0))).unwrap(), "sig 3");
        assert_eq!(fs::read_to_string(files.backup(2)).unwrap(), "round 2");
        assert_eq!(files.last_sequence(), Some(0));
        assert_eq!(files.previous(0), 2);
    }

    #[test]
    fn sig_path_appends_suffix() {
        assert_eq!(sig_path(Path::new("/var/lib/cib/cib-4")), PathBuf::from("/var/lib/cib/cib-4.sig"));
    }
}
