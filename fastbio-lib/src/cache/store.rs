use std::{
    fs,
    io::{self, ErrorKind as IoErrorKind, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::{CacheKey, ErrorKind, Payload, Result};

/// Leading bytes of every entry file, bumped whenever the layout changes
const MAGIC: &[u8; 4] = b"FBC1";

/// Magic, timestamp and payload length
const HEADER_LEN: usize = MAGIC.len() + 8 + 8;

/// A response body persisted in the [`CacheStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    key: CacheKey,
    payload: Payload,
    stored_at: SystemTime,
}

impl CacheEntry {
    pub(crate) const fn new(key: CacheKey, payload: Payload, stored_at: SystemTime) -> Self {
        Self {
            key,
            payload,
            stored_at,
        }
    }

    /// The key this entry is stored under
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The cached response body
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// When the entry was written. Only second precision is kept.
    #[must_use]
    pub const fn stored_at(&self) -> SystemTime {
        self.stored_at
    }

    /// Consume the entry, returning the payload
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    fn encode(&self) -> Vec<u8> {
        let secs = self
            .stored_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&secs.to_le_bytes());
        bytes.extend_from_slice(&(self.payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Returns `None` if `bytes` is not a complete entry
    fn decode(key: CacheKey, bytes: &[u8]) -> Option<Self> {
        let (header, payload) = bytes.split_at_checked(HEADER_LEN)?;
        let (magic, rest) = header.split_at(MAGIC.len());
        if magic != MAGIC {
            return None;
        }
        let (secs, len) = rest.split_at(8);
        let secs = u64::from_le_bytes(secs.try_into().ok()?);
        let len = u64::from_le_bytes(len.try_into().ok()?);
        if usize::try_from(len).ok()? != payload.len() {
            return None;
        }

        Some(Self {
            key,
            payload: payload.to_vec(),
            stored_at: UNIX_EPOCH + Duration::from_secs(secs),
        })
    }
}

/// Content-addressed response cache on disk.
///
/// Each entry lives in its own file at `<root>/<xx>/<rest>` where `xx` are
/// the first two hex digits of the [`CacheKey`]. Writes go to a temporary
/// file in the same shard directory which is then renamed over the target,
/// so a concurrent reader either sees the previous entry, the new one or
/// nothing, but never a partial file. Several stores (even in different
/// processes) may share one root directory.
///
/// Entries never expire unless a maximum age is configured with
/// [`CacheStore::with_max_age`].
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    max_age: Option<Duration>,
}

impl CacheStore {
    /// Open (and create, if needed) a cache rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CacheIo`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| ErrorKind::CacheIo(root.clone(), e))?;
        Ok(Self {
            root,
            max_age: None,
        })
    }

    /// Treat entries older than `max_age` as missing
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// The directory holding all entries
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file an entry with the given key is stored in
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        let (shard, rest) = key.shard();
        self.root.join(shard).join(rest)
    }

    /// Look up the payload stored under `key`
    #[must_use]
    pub fn lookup(&self, key: &CacheKey) -> Option<Payload> {
        self.lookup_entry(key).map(CacheEntry::into_payload)
    }

    /// Look up the entry stored under `key`.
    ///
    /// Unreadable entries are reported as a miss. Entries which cannot be
    /// decoded are deleted, so the next successful response replaces them.
    #[must_use]
    pub fn lookup_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return None,
            Err(e) => {
                warn!("{}", ErrorKind::CacheIo(path, e));
                return None;
            }
        };

        let Some(entry) = CacheEntry::decode(key.clone(), &bytes) else {
            warn!("Removing corrupt cache entry `{}`", path.display());
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != IoErrorKind::NotFound
            {
                warn!("{}", ErrorKind::CacheIo(path, e));
            }
            return None;
        };

        if let Some(max_age) = self.max_age {
            let age = SystemTime::now()
                .duration_since(entry.stored_at)
                .unwrap_or_default();
            if age > max_age {
                debug!("Ignoring stale cache entry for {key}");
                return None;
            }
        }

        Some(entry)
    }

    /// Persist `payload` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CacheIo`] if the entry cannot be written.
    pub fn store(&self, key: &CacheKey, payload: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let shard = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(shard).map_err(|e| ErrorKind::CacheIo(shard.to_path_buf(), e))?;

        let entry = CacheEntry::new(key.clone(), payload.to_vec(), SystemTime::now());
        let write = || -> io::Result<()> {
            let mut file = NamedTempFile::new_in(shard)?;
            file.write_all(&entry.encode())?;
            file.flush()?;
            file.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| ErrorKind::CacheIo(path.clone(), e))
    }

    /// Delete the entry stored under `key`.
    /// Returns whether there was an entry to delete.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CacheIo`] if the entry exists but cannot be removed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(ErrorKind::CacheIo(path, e)),
        }
    }

    /// Delete every entry. Returns the number of deleted entries.
    ///
    /// Only shard directories are touched, other files below the root are
    /// left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CacheIo`] if a shard directory cannot be removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for shard in self.shards()? {
            removed += count_entries(&shard);
            fs::remove_dir_all(&shard).map_err(|e| ErrorKind::CacheIo(shard, e))?;
        }
        Ok(removed)
    }

    /// Number of entries currently on disk
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards()
            .map(|shards| shards.iter().map(PathBuf::as_path).map(count_entries).sum())
            .unwrap_or(0)
    }

    /// Whether the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shards(&self) -> Result<Vec<PathBuf>> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ErrorKind::CacheIo(self.root.clone(), e)),
        };
        Ok(dir
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|entry| is_shard_name(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect())
    }
}

fn is_shard_name(name: &str) -> bool {
    name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit())
}

/// Temporary files start with a dot and are not counted
fn count_entries(shard: &Path) -> usize {
    fs::read_dir(shard)
        .map(|dir| {
            dir.filter_map(std::result::Result::ok)
                .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
                .count()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use http::HeaderMap;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;
    use url::Url;

    use super::*;
    use crate::Method;

    fn key(url: &str) -> CacheKey {
        CacheKey::new(Method::Get, &Url::parse(url).unwrap(), &HeaderMap::new(), None)
    }

    #[test]
    fn test_store_then_lookup() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let key = key("https://x/y");

        assert_eq!(store.lookup(&key), None);
        store.store(&key, b"hello").unwrap();
        assert_eq!(store.lookup(&key), Some(b"hello".to_vec()));

        let entry = store.lookup_entry(&key).unwrap();
        assert_eq!(entry.key(), &key);
        assert_eq!(entry.payload(), b"hello");
    }

    #[test]
    fn test_lookup_survives_reopen() {
        let dir = tempdir().unwrap();
        let key = key("https://x/y");
        CacheStore::open(dir.path())
            .unwrap()
            .store(&key, b"durable")
            .unwrap();

        let reopened = CacheStore::open(dir.path()).unwrap();
        assert_eq!(reopened.lookup(&key), Some(b"durable".to_vec()));
    }

    #[test]
    fn test_empty_payload_is_a_hit() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let key = key("https://x/404");

        store.store(&key, b"").unwrap();
        assert_eq!(store.lookup(&key), Some(Vec::new()));
    }

    #[test]
    fn test_sharded_layout() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let key = key("https://x/y");
        store.store(&key, b"hello").unwrap();

        let path = store.path_for(&key);
        assert!(path.is_file());
        assert_eq!(path.parent().unwrap().parent().unwrap(), dir.path());
        assert_eq!(
            path.parent().unwrap().file_name().unwrap().to_string_lossy(),
            &key.as_str()[..2]
        );
    }

    #[test]
    fn test_truncated_entry_is_a_miss_and_deleted() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let key = key("https://x/y");
        store.store(&key, b"hello world").unwrap();

        let path = store.path_for(&key);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        assert_eq!(store.lookup(&key), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_foreign_file_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let key = key("https://x/y");
        let path = store.path_for(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not a cache entry at all").unwrap();

        assert_eq!(store.lookup(&key), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_entry_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path())
            .unwrap()
            .with_max_age(Some(Duration::from_secs(60)));
        let key = key("https://x/y");

        let old = CacheEntry::new(
            key.clone(),
            b"old".to_vec(),
            SystemTime::now() - Duration::from_secs(3600),
        );
        let path = store.path_for(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, old.encode()).unwrap();

        assert_eq!(store.lookup(&key), None);

        store.store(&key, b"fresh").unwrap();
        assert_eq!(store.lookup(&key), Some(b"fresh".to_vec()));
    }

    #[test]
    fn test_without_max_age_entries_are_durable() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let key = key("https://x/y");

        let old = CacheEntry::new(key.clone(), b"old".to_vec(), UNIX_EPOCH);
        let path = store.path_for(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, old.encode()).unwrap();

        assert_eq!(store.lookup(&key), Some(b"old".to_vec()));
    }

    #[test]
    fn test_store_failure_is_reported() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let key = key("https://x/y");

        // A regular file where the shard directory should be
        let (shard, _) = key.shard();
        fs::write(dir.path().join(shard), b"").unwrap();

        let err = store.store(&key, b"hello").unwrap_err();
        assert!(matches!(err, ErrorKind::CacheIo(..)));
        assert_eq!(store.lookup(&key), None);
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let keys: Vec<_> = (0..5).map(|i| key(&format!("https://x/{i}"))).collect();
        for key in &keys {
            store.store(key, b"payload").unwrap();
        }
        fs::write(dir.path().join("README"), b"keep me").unwrap();
        assert_eq!(store.len(), 5);

        assert!(store.remove(&keys[0]).unwrap());
        assert!(!store.remove(&keys[0]).unwrap());
        assert_eq!(store.len(), 4);

        assert_eq!(store.clear().unwrap(), 4);
        assert!(store.is_empty());
        assert!(dir.path().join("README").exists());
        assert_eq!(store.lookup(&keys[1]), None);
    }

    #[test]
    fn test_concurrent_writers_never_expose_partial_entries() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let key = key("https://x/contended");
        let payload = vec![42u8; 64 * 1024];

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        store.store(&key, &payload).unwrap();
                    }
                });
                scope.spawn(|| {
                    for _ in 0..10 {
                        if let Some(found) = store.lookup(&key) {
                            assert_eq!(found.len(), payload.len());
                        }
                    }
                });
            }
        });

        assert_eq!(store.lookup(&key), Some(payload));
        assert_eq!(store.len(), 1);
    }
}
