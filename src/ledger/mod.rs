//! Durable record of item ids that are fully synchronized.
//!
//! The ledger is a plain append-only text log with one id per line. It is read
//! once at startup into an in-memory set and then kept live by [`Ledger::commit`],
//! which always appends to disk (and fsyncs) before updating the set. A crash
//! mid-append can therefore lose at most the one in-flight entry, never an
//! earlier one.

pub mod error;

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

pub use self::error::LedgerError;

/// In-memory mirror of the append-only ledger file.
pub struct Ledger {
    ids: HashSet<String>,
    path: PathBuf,
    /// Held for the lifetime of the ledger; the advisory lock is released when
    /// the file is dropped.
    #[allow(dead_code)]
    lock_file: std::fs::File,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("path", &self.path)
            .field("entries", &self.ids.len())
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open the ledger at `path`, creating an empty one if it does not exist.
    ///
    /// Takes an exclusive lock on `<path>.lock` so that a second instance
    /// cannot interleave appends. An unterminated trailing line left by a
    /// crash mid-append is discarded and truncated away.
    pub async fn open(path: &Path) -> Result<Self, LedgerError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::open_blocking(path)).await?
    }

    fn open_blocking(path: PathBuf) -> Result<Self, LedgerError> {
        let open_err = |source| LedgerError::Open {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(open_err)?;
        }

        let lock_path = lock_path_for(&path);
        let lock_file = std::fs::File::create(&lock_path).map_err(open_err)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| LedgerError::Locked(lock_path.clone()))?;

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(open_err)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(open_err)?;

        let committed_len = contents.rfind('\n').map_or(0, |i| i + 1);
        if committed_len < contents.len() {
            tracing::warn!(
                path = %path.display(),
                fragment = %&contents[committed_len..],
                "Discarding unterminated ledger line left by an interrupted append"
            );
            file.set_len(committed_len as u64).map_err(open_err)?;
            file.sync_all().map_err(open_err)?;
        }

        let ids = parse_ids(&contents[..committed_len]);

        tracing::debug!(path = %path.display(), entries = ids.len(), "Ledger loaded");

        Ok(Self {
            ids,
            path,
            lock_file,
        })
    }

    /// Whether `id` has already been fully synchronized.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id` as synchronized.
    ///
    /// The durable append (including `fsync`) completes before the in-memory
    /// set is updated. Committing an id that is already present is a no-op.
    pub async fn commit(&mut self, id: &str) -> Result<(), LedgerError> {
        validate_id(id)?;
        if self.ids.contains(id) {
            return Ok(());
        }

        let append_err = |source| LedgerError::Append {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(append_err)?;
        let mut line = String::with_capacity(id.len() + 1);
        line.push_str(id);
        line.push('\n');
        file.write_all(line.as_bytes()).await.map_err(append_err)?;
        file.sync_data().await.map_err(append_err)?;

        self.ids.insert(id.to_owned());
        Ok(())
    }

    /// Number of synchronized ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read the committed ids at `path` without taking the writer lock.
///
/// For inspection only (e.g. while a sync is running). A missing file reads as
/// empty and an unterminated trailing line is ignored but left in place.
pub async fn read_ids(path: &Path) -> Result<HashSet<String>, LedgerError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let committed_len = contents.rfind('\n').map_or(0, |i| i + 1);
            Ok(parse_ids(&contents[..committed_len]))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(source) => Err(LedgerError::Open {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_ids(committed: &str) -> HashSet<String> {
    committed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Whether `id` can be stored as one ledger line and read back unchanged.
pub(crate) fn validate_id(id: &str) -> Result<(), LedgerError> {
    if id.is_empty() || id.contains(['\n', '\r']) || id.trim() != id {
        return Err(LedgerError::InvalidId(id.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("processed_files.log")
    }

    #[tokio::test]
    async fn test_open_missing_creates_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(&dir);

        let ledger = Ledger::open(&path).await.unwrap();
        assert!(ledger.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/ledger.log");

        let ledger = Ledger::open(&path).await.unwrap();
        assert!(ledger.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_open_reads_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(&dir);
        std::fs::write(&path, "a.jpg\n  b.jpg \n\nc.jpg\n").unwrap();

        let ledger = Ledger::open(&path).await.unwrap();
        assert_eq!(ledger.len(), 3);
        assert!(ledger.contains("a.jpg"));
        assert!(ledger.contains("b.jpg"));
        assert!(ledger.contains("c.jpg"));
        assert!(!ledger.contains("d.jpg"));
    }

    #[tokio::test]
    async fn test_commit_appends_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(&dir);
        std::fs::write(&path, "a.jpg\n").unwrap();

        {
            let mut ledger = Ledger::open(&path).await.unwrap();
            ledger.commit("b.jpg").await.unwrap();
            assert!(ledger.contains("b.jpg"));
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a.jpg\nb.jpg\n");
        let reopened = Ledger::open(&path).await.unwrap();
        assert!(reopened.contains("a.jpg"));
        assert!(reopened.contains("b.jpg"));
    }

    #[tokio::test]
    async fn test_commit_existing_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(&dir);

        let mut ledger = Ledger::open(&path).await.unwrap();
        ledger.commit("a.jpg").await.unwrap();
        ledger.commit("a.jpg").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a.jpg\n");
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_torn_tail_is_discarded_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(&dir);
        std::fs::write(&path, "a.jpg\nb.jp").unwrap();

        let mut ledger = Ledger::open(&path).await.unwrap();
        assert!(ledger.contains("a.jpg"));
        assert!(!ledger.contains("b.jp"));

        ledger.commit("c.jpg").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a.jpg\nc.jpg\n");
    }

    #[tokio::test]
    async fn test_second_open_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(&dir);

        let _first = Ledger::open(&path).await.unwrap();
        let second = Ledger::open(&path).await;
        assert!(matches!(second, Err(LedgerError::Locked(_))));
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(&dir);

        drop(Ledger::open(&path).await.unwrap());
        assert!(Ledger::open(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_commit_rejects_unrepresentable_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::open(&ledger_path(&dir)).await.unwrap();

        for bad in ["", "a\nb.jpg", "a.jpg\r", " padded.jpg"] {
            let err = ledger.commit(bad).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidId(_)), "{bad:?}");
        }
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_read_ids_ignores_lock_and_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(&dir);
        std::fs::write(&path, "a.jpg\nb.jpg\nc.jp").unwrap();

        let _writer = Ledger::open(&path).await.unwrap();
        let ids = read_ids(&path).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("b.jpg"));
    }

    #[tokio::test]
    async fn test_read_ids_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(&dir);
        assert!(read_ids(&path).await.unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_lock_path_appends_suffix() {
        assert_eq!(
            lock_path_for(Path::new("/var/lib/sync/processed.log")),
            PathBuf::from("/var/lib/sync/processed.log.lock")
        );
    }
}
