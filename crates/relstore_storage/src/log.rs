//! File-backed object store.
//!
//! The store file is an append-only log:
//!
//! ```text
//! RSLOG001                          magic, 8 bytes
//! [len u32 LE][checksum 8][body]    one frame per write
//! ...
//! ```
//!
//! `checksum` is the first 8 bytes of SHA-256 over `body`; `body` is a CBOR
//! [`LogEntry`]. The log is replayed into memory on open. A frame cut short
//! at the end of the file (a torn write) is truncated away; a complete frame
//! with a bad checksum is corruption.
//!
//! A failed append is rolled back by truncating the file to the last good
//! frame. If that truncate fails too, the writer is poisoned and refuses
//! further writes until [`LogObjectStore::compact`] rewrites the file.

use crate::backend::{IndexCursor, ObjectStore};
use crate::error::{StoreError, StoreResult};
use crate::table::{RecordTable, SharedTable, TableCursor};
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;
use relstore_codec::{from_cbor, to_cbor, CompositeId, StoredHash, Value};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAGIC: &[u8; 8] = b"RSLOG001";
const CHECKSUM_LEN: usize = 8;
const FRAME_HEADER_LEN: usize = 4 + CHECKSUM_LEN;

/// One logged write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum LogEntry {
    /// Store (or replace) a hash.
    #[serde(rename = "put")]
    Put(StoredHash),
    /// Remove the record whose `[type, id]` key is given.
    #[serde(rename = "delete")]
    Delete(Value),
}

/// Options for opening a [`LogObjectStore`].
#[derive(Debug, Clone)]
pub struct LogStoreOptions {
    /// Whether to create the file if it doesn't exist.
    pub create_if_missing: bool,
    /// Whether to fsync after every write (safer but slower).
    pub sync_on_write: bool,
    /// Open without ever writing to the log file.
    ///
    /// Takes a shared lock, leaves a torn tail in place and rejects writes.
    pub read_only: bool,
}

impl Default for LogStoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            read_only: false,
        }
    }
}

impl LogStoreOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync after every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to open the store read-only.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}

/// Statistics about a log store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Frames in the file, including superseded ones.
    pub frames: u64,
    /// Records currently live.
    pub live_records: usize,
    /// File size in bytes.
    pub file_size: u64,
    /// Live record count per type tag.
    pub types: BTreeMap<String, usize>,
}

/// A durable object store backed by an append-only log file.
///
/// An advisory lock on `<path>.lock` keeps other processes out while the
/// store is open. File I/O runs on tokio's blocking pool.
///
/// # Example
///
/// ```no_run
/// use relstore_storage::{LogObjectStore, LogStoreOptions};
/// use std::path::Path;
///
/// let store = LogObjectStore::open(Path::new("app.rslog"), LogStoreOptions::default()).unwrap();
/// println!("{} live records", store.stats().live_records);
/// ```
#[derive(Debug)]
pub struct LogObjectStore {
    inner: Arc<LogInner>,
}

#[derive(Debug)]
struct LogInner {
    path: PathBuf,
    options: LogStoreOptions,
    shared: Arc<SharedTable>,
    writer: Mutex<LogWriter>,
    _lock_file: File,
}

#[derive(Debug)]
struct LogWriter {
    file: File,
    frames: u64,
    /// Offset just past the last complete frame.
    size: u64,
    poisoned: bool,
    #[cfg(test)]
    faults: WriterFaults,
}

/// Failures a test can arm on the writer.
#[cfg(test)]
#[derive(Debug, Default)]
struct WriterFaults {
    /// Fail the next append after writing this many bytes of its frame.
    torn_append: Option<usize>,
    /// Fail the rollback that follows a failed append.
    rollback: bool,
}

/// Result of scanning a log image.
struct Replay {
    entries: Vec<LogEntry>,
    /// Offset just past the last complete frame.
    valid_len: u64,
}

impl LogObjectStore {
    /// Opens or creates a log store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - The file is not a log store or a frame is corrupted
    /// - I/O errors occur
    pub fn open(path: &Path, options: LogStoreOptions) -> StoreResult<Self> {
        if !path.exists() {
            if !options.create_if_missing || options.read_only {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no store at {}", path.display()),
                )));
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = lock_path_for(path);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        let locked = if options.read_only {
            FileExt::try_lock_shared(&lock_file)
        } else {
            FileExt::try_lock_exclusive(&lock_file)
        };
        if locked.is_err() {
            return Err(StoreError::Locked { path: lock_path });
        }

        let mut file = if options.read_only {
            OpenOptions::new().read(true).open(path)?
        } else {
            OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(path)?
        };

        let mut image = Vec::new();
        file.read_to_end(&mut image)?;

        let mut table = RecordTable::default();
        let mut frames = 0;
        let size;

        if image.is_empty() && options.read_only {
            size = 0;
        } else if image.is_empty() {
            file.write_all(MAGIC)?;
            file.sync_all()?;
            size = MAGIC.len() as u64;
        } else {
            let replay = scan(&image)?;
            frames = replay.entries.len() as u64;
            for entry in replay.entries {
                apply(&mut table, entry)?;
            }
            if replay.valid_len < image.len() as u64 && options.read_only {
                warn!(
                    path = %path.display(),
                    ignored = image.len() as u64 - replay.valid_len,
                    "ignoring torn frame at end of read-only log"
                );
            } else if replay.valid_len < image.len() as u64 {
                warn!(
                    path = %path.display(),
                    dropped = image.len() as u64 - replay.valid_len,
                    "truncating torn frame at end of log"
                );
                file.set_len(replay.valid_len)?;
                file.sync_all()?;
            }
            size = replay.valid_len;
        }

        info!(
            path = %path.display(),
            frames,
            records = table.len(),
            read_only = options.read_only,
            "opened log store"
        );

        let name = path.display().to_string();
        Ok(Self {
            inner: Arc::new(LogInner {
                path: path.to_path_buf(),
                options,
                shared: Arc::new(SharedTable::new(name, table)),
                writer: Mutex::new(LogWriter::new(file, frames, size)),
                _lock_file: lock_file,
            }),
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns frame and record statistics.
    #[must_use]
    pub fn stats(&self) -> LogStats {
        let writer = self.inner.writer.lock();
        let table = self.inner.shared.table.read();
        LogStats {
            frames: writer.frames,
            live_records: table.len(),
            file_size: writer.size,
            types: table.type_counts(),
        }
    }

    /// Rewrites the log so it holds exactly one frame per live record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the rewrite fails. On
    /// failure the original file is left in place.
    pub async fn compact(&self) -> StoreResult<LogStats> {
        self.ensure_writable()?;
        let inner = Arc::clone(&self.inner);
        run_blocking(move || inner.compact()).await?;
        Ok(self.stats())
    }

    /// Closes the store. Later operations fail with `Unavailable`.
    pub fn close(&self) {
        self.inner.shared.close();
    }

    /// Returns true if the store was opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.options.read_only
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        self.inner.shared.ensure_open()?;
        if self.is_read_only() {
            return Err(StoreError::read_only(self.inner.shared.name()));
        }
        Ok(())
    }

    #[cfg(test)]
    fn arm_faults(&self, faults: WriterFaults) {
        self.inner.writer.lock().faults = faults;
    }
}

impl LogInner {
    fn write_put(&self, id: CompositeId, hash: StoredHash, create: bool) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        if create && self.shared.table.read().contains(&id) {
            return Err(StoreError::KeyConflict { id });
        }
        writer.append(&LogEntry::Put(hash.clone()), self.options.sync_on_write)?;
        self.shared.table.write().insert(id, hash);
        Ok(())
    }

    fn write_delete(&self, id: &CompositeId) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        if !self.shared.table.read().contains(id) {
            return Ok(());
        }
        writer.append(&LogEntry::Delete(id.to_value()), self.options.sync_on_write)?;
        self.shared.table.write().remove(id);
        Ok(())
    }

    fn compact(&self) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        let tmp_path = self.path.with_extension("compact");

        let mut image = MAGIC.to_vec();
        let mut frames = 0;
        for hash in self.shared.table.read().values() {
            image.extend_from_slice(&encode_frame(&LogEntry::Put(hash.clone()))?);
            frames += 1;
        }

        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&image)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        let before = writer.size;
        *writer = LogWriter::new(file, frames, image.len() as u64);

        debug!(
            path = %self.path.display(),
            before,
            after = writer.size,
            frames,
            "compacted log store"
        );
        Ok(())
    }
}

impl LogWriter {
    fn new(file: File, frames: u64, size: u64) -> Self {
        Self {
            file,
            frames,
            size,
            poisoned: false,
            #[cfg(test)]
            faults: WriterFaults::default(),
        }
    }

    fn append(&mut self, entry: &LogEntry, sync: bool) -> StoreResult<()> {
        if self.poisoned {
            return Err(StoreError::corrupted(format!(
                "log has unrecovered bytes past offset {}",
                self.size
            )));
        }
        let frame = encode_frame(entry)?;
        if let Err(err) = self.write_frame(&frame, sync) {
            self.rollback();
            return Err(err.into());
        }
        self.frames += 1;
        self.size += frame.len() as u64;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8], sync: bool) -> io::Result<()> {
        self.check_torn_append(frame)?;
        self.file.write_all(frame)?;
        if sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Cuts the file back to the last complete frame.
    fn rollback(&mut self) {
        match self.truncate_to_size() {
            Ok(()) => debug!(size = self.size, "rolled back failed append"),
            Err(err) => {
                warn!(size = self.size, error = %err, "rollback failed, refusing further writes");
                self.poisoned = true;
            }
        }
    }

    fn truncate_to_size(&mut self) -> io::Result<()> {
        self.check_rollback()?;
        self.file.set_len(self.size)?;
        self.file.sync_all()
    }

    #[cfg(test)]
    fn check_torn_append(&mut self, frame: &[u8]) -> io::Result<()> {
        match self.faults.torn_append.take() {
            Some(written) => {
                self.file.write_all(&frame[..written.min(frame.len())])?;
                Err(io::Error::other("injected append failure"))
            }
            None => Ok(()),
        }
    }

    #[cfg(not(test))]
    #[inline]
    fn check_torn_append(&mut self, _frame: &[u8]) -> io::Result<()> {
        Ok(())
    }

    #[cfg(test)]
    fn check_rollback(&mut self) -> io::Result<()> {
        if std::mem::take(&mut self.faults.rollback) {
            return Err(io::Error::other("injected rollback failure"));
        }
        Ok(())
    }

    #[cfg(not(test))]
    #[inline]
    fn check_rollback(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LogObjectStore {
    fn name(&self) -> &str {
        self.inner.shared.name()
    }

    async fn get(&self, id: &CompositeId) -> StoreResult<Option<StoredHash>> {
        self.inner.shared.ensure_open()?;
        Ok(self.inner.shared.table.read().get(id).cloned())
    }

    async fn add(&self, hash: StoredHash) -> StoreResult<()> {
        self.ensure_writable()?;
        let id = hash.validate()?;
        let inner = Arc::clone(&self.inner);
        run_blocking(move || inner.write_put(id, hash, true)).await
    }

    async fn put(&self, hash: StoredHash) -> StoreResult<()> {
        self.ensure_writable()?;
        let id = hash.validate()?;
        let inner = Arc::clone(&self.inner);
        run_blocking(move || inner.write_put(id, hash, false)).await
    }

    async fn delete(&self, id: &CompositeId) -> StoreResult<()> {
        self.ensure_writable()?;
        let inner = Arc::clone(&self.inner);
        let id = id.clone();
        run_blocking(move || inner.write_delete(&id)).await
    }

    async fn open_index_cursor(&self, type_tag: &str) -> StoreResult<Box<dyn IndexCursor>> {
        let cursor = TableCursor::open(Arc::clone(&self.inner.shared), type_tag)?;
        Ok(Box::new(cursor))
    }
}

async fn run_blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(io::Error::other(format!("blocking task failed: {e}"))))?
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn checksum(body: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(body);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

fn encode_frame(entry: &LogEntry) -> StoreResult<Vec<u8>> {
    let body = to_cbor(entry)?;
    let len = u32::try_from(body.len())
        .map_err(|_| StoreError::corrupted(format!("frame of {} bytes is too large", body.len())))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&checksum(&body));
    frame.extend_from_slice(&body);
    Ok(frame)
}

fn scan(image: &[u8]) -> StoreResult<Replay> {
    if image.len() < MAGIC.len() || &image[..MAGIC.len()] != MAGIC {
        return Err(StoreError::corrupted("missing log header"));
    }

    let mut entries = Vec::new();
    let mut pos = MAGIC.len();
    loop {
        let rest = &image[pos..];
        if rest.len() < FRAME_HEADER_LEN {
            break;
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&rest[..4]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        if rest.len() < FRAME_HEADER_LEN + len {
            break;
        }
        let body = &rest[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len];
        if rest[4..FRAME_HEADER_LEN] != checksum(body) {
            return Err(StoreError::corrupted(format!(
                "checksum mismatch in frame at offset {pos}"
            )));
        }
        entries.push(from_cbor(body)?);
        pos += FRAME_HEADER_LEN + len;
    }

    Ok(Replay {
        entries,
        valid_len: pos as u64,
    })
}

fn apply(table: &mut RecordTable, entry: LogEntry) -> StoreResult<()> {
    match entry {
        LogEntry::Put(hash) => {
            let id = hash.validate()?;
            table.insert(id, hash);
        }
        LogEntry::Delete(raw) => {
            let id = CompositeId::from_value(&raw)?;
            table.remove(&id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn post(id: &str, title: &str) -> StoredHash {
        let mut hash = StoredHash::new();
        hash.set_identity(&CompositeId::new("Post", id));
        hash.insert("title", title);
        hash
    }

    fn open(dir: &TempDir) -> LogObjectStore {
        LogObjectStore::open(&dir.path().join("store.rslog"), LogStoreOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn log_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store.put(post("1", "a")).await.unwrap();
            store.put(post("2", "b")).await.unwrap();
            store.put(post("1", "c")).await.unwrap();
            store.delete(&CompositeId::new("Post", "2")).await.unwrap();
        }

        let store = open(&dir);
        let one = store.get(&CompositeId::new("Post", "1")).await.unwrap().unwrap();
        assert_eq!(one.get("title"), Some(&Value::from("c")));
        assert!(store.get(&CompositeId::new("Post", "2")).await.unwrap().is_none());
        assert_eq!(store.stats().frames, 4);
        assert_eq!(store.stats().live_records, 1);
    }

    #[tokio::test]
    async fn log_add_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.add(post("1", "a")).await.unwrap();
        assert!(matches!(
            store.add(post("1", "b")).await,
            Err(StoreError::KeyConflict { .. })
        ));
        assert_eq!(store.stats().frames, 1);
    }

    #[tokio::test]
    async fn log_delete_of_missing_key_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.delete(&CompositeId::new("Post", "9")).await.unwrap();
        assert_eq!(store.stats().frames, 0);
    }

    #[tokio::test]
    async fn log_truncates_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.rslog");
        {
            let store = open(&dir);
            store.put(post("1", "a")).await.unwrap();
        }
        let good_len = fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[42, 0, 0, 0, 1, 2]).unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.stats().live_records, 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
    }

    #[tokio::test]
    async fn log_detects_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.rslog");
        {
            let store = open(&dir);
            store.put(post("1", "a")).await.unwrap();
        }
        let mut image = fs::read(&path).unwrap();
        let last = image.len() - 1;
        image[last] ^= 0xff;
        fs::write(&path, image).unwrap();

        let result = LogObjectStore::open(&path, LogStoreOptions::default());
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn log_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.bin");
        fs::write(&path, b"not a log at all").unwrap();
        assert!(matches!(
            LogObjectStore::open(&path, LogStoreOptions::default()),
            Err(StoreError::Corrupted(_))
        ));
    }

    #[test]
    fn log_missing_without_create_fails() {
        let dir = TempDir::new().unwrap();
        let options = LogStoreOptions::new().create_if_missing(false);
        let result = LogObjectStore::open(&dir.path().join("absent.rslog"), options);
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn log_lock_excludes_second_open() {
        let dir = TempDir::new().unwrap();
        let _first = open(&dir);
        let second = LogObjectStore::open(&dir.path().join("store.rslog"), LogStoreOptions::default());
        assert!(matches!(second, Err(StoreError::Locked { .. })));
    }

    #[tokio::test]
    async fn log_compact_keeps_live_records_only() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            for i in 0..5 {
                store.put(post("1", &format!("v{i}"))).await.unwrap();
            }
            store.put(post("2", "b")).await.unwrap();
            store.delete(&CompositeId::new("Post", "2")).await.unwrap();

            let stats = store.compact().await.unwrap();
            assert_eq!(stats.frames, 1);
            assert_eq!(stats.live_records, 1);

            store.put(post("3", "c")).await.unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.stats().frames, 2);
        let one = store.get(&CompositeId::new("Post", "1")).await.unwrap().unwrap();
        assert_eq!(one.get("title"), Some(&Value::from("v4")));
    }

    #[tokio::test]
    async fn log_cursor_scans_type() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.put(post("1", "a")).await.unwrap();
        store.put(post("2", "b")).await.unwrap();

        let mut cursor = store.open_index_cursor("Post").await.unwrap();
        let mut count = 0;
        while cursor.next().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        assert_eq!(store.stats().types.get("Post"), Some(&2));
    }

    #[tokio::test]
    async fn log_closed_store_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.close();
        assert!(matches!(
            store.put(post("1", "a")).await,
            Err(StoreError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn log_failed_append_is_rolled_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.rslog");
        {
            let store = open(&dir);
            store.put(post("1", "a")).await.unwrap();
            let good_len = fs::metadata(&path).unwrap().len();

            store.arm_faults(WriterFaults {
                torn_append: Some(13),
                ..WriterFaults::default()
            });
            assert!(matches!(store.put(post("2", "lost")).await, Err(StoreError::Io(_))));
            assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
            assert!(store.get(&CompositeId::new("Post", "2")).await.unwrap().is_none());

            store.put(post("3", "c")).await.unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.stats().frames, 2);
        assert!(store.get(&CompositeId::new("Post", "2")).await.unwrap().is_none());
        assert!(store.get(&CompositeId::new("Post", "3")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn log_failed_rollback_poisons_writer_until_compact() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store.put(post("1", "a")).await.unwrap();
            store.arm_faults(WriterFaults {
                torn_append: Some(13),
                rollback: true,
            });
            assert!(store.put(post("2", "b")).await.is_err());
            assert!(matches!(
                store.put(post("3", "c")).await,
                Err(StoreError::Corrupted(_))
            ));
            assert!(matches!(
                store.delete(&CompositeId::new("Post", "1")).await,
                Err(StoreError::Corrupted(_))
            ));

            store.compact().await.unwrap();
            store.put(post("3", "c")).await.unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.stats().live_records, 2);
        assert!(store.get(&CompositeId::new("Post", "2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn log_read_only_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.rslog");
        {
            let store = open(&dir);
            store.put(post("1", "a")).await.unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[42, 0, 0, 0, 1, 2]).unwrap();
        }
        let torn = fs::read(&path).unwrap();

        let store = LogObjectStore::open(&path, LogStoreOptions::new().read_only(true)).unwrap();
        assert!(store.is_read_only());
        assert!(store.get(&CompositeId::new("Post", "1")).await.unwrap().is_some());
        assert!(matches!(
            store.put(post("2", "b")).await,
            Err(StoreError::ReadOnly { .. })
        ));
        assert!(matches!(store.compact().await, Err(StoreError::ReadOnly { .. })));
        assert_eq!(fs::read(&path).unwrap(), torn);
    }

    #[test]
    fn log_read_only_never_creates_or_initializes() {
        let dir = TempDir::new().unwrap();
        let absent = dir.path().join("absent.rslog");
        let options = LogStoreOptions::new().read_only(true);
        assert!(matches!(
            LogObjectStore::open(&absent, options.clone()),
            Err(StoreError::Io(_))
        ));
        assert!(!absent.exists());

        let empty = dir.path().join("empty.rslog");
        fs::write(&empty, b"").unwrap();
        let store = LogObjectStore::open(&empty, options).unwrap();
        assert_eq!(store.stats().live_records, 0);
        assert_eq!(fs::metadata(&empty).unwrap().len(), 0);
    }

    #[test]
    fn log_readers_share_the_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.rslog");
        drop(open(&dir));

        let options = LogStoreOptions::new().read_only(true);
        let _first = LogObjectStore::open(&path, options.clone()).unwrap();
        let _second = LogObjectStore::open(&path, options).unwrap();
        assert!(matches!(
            LogObjectStore::open(&path, LogStoreOptions::default()),
            Err(StoreError::Locked { .. })
        ));
    }

    fn replay_matches_model(ops: Vec<(u8, Option<u8>)>, compact: bool) -> Result<(), TestCaseError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let dir = TempDir::new().unwrap();
        let mut model = BTreeMap::new();

        rt.block_on(async {
            let store = open(&dir);
            for (id, title) in &ops {
                let key = id.to_string();
                match title {
                    Some(title) => {
                        store.put(post(&key, &title.to_string())).await.unwrap();
                        model.insert(key, title.to_string());
                    }
                    None => {
                        store.delete(&CompositeId::new("Post", key.as_str())).await.unwrap();
                        model.remove(&key);
                    }
                }
            }
            if compact {
                store.compact().await.unwrap();
            }
        });

        let reopened = open(&dir);
        prop_assert_eq!(reopened.stats().live_records, model.len());
        for id in 0..6u8 {
            let key = id.to_string();
            let stored = rt
                .block_on(reopened.get(&CompositeId::new("Post", key.as_str())))
                .unwrap();
            let title = stored.and_then(|h| h.get("title").and_then(Value::as_text).map(String::from));
            prop_assert_eq!(title.as_ref(), model.get(&key));
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn log_replay_matches_last_write(
            ops in prop::collection::vec((0u8..6, prop::option::of(any::<u8>())), 0..40),
            compact in any::<bool>(),
        ) {
            replay_matches_model(ops, compact)?;
        }
    }
}
