use crate::errors::{Result, VaultError};
use fs2::FileExt as _;
use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    path::PathBuf,
    sync::Mutex,
};

/// The opaque secure key-value store the vault persists into.
///
/// Implementations are expected to provide platform-level at-rest
/// protection (keychain, keystore, encrypted disk); the vault layers its
/// own password-based encryption on top regardless, so a compromised store
/// alone never yields a seed.
pub trait SecureStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// File-backed store: one private file per key under a private directory.
///
/// Writes are atomic (temp + rename), so a `put` over an existing key
/// either fully replaces it or leaves the old value intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    pub fn open(dir: PathBuf, lock_path: PathBuf) -> Result<Self> {
        crate::fsutil::ensure_private_dir(&dir).map_err(|e| VaultError::Store(e.to_string()))?;
        Ok(Self { dir, lock_path })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // Keys are fixed identifiers, never user input; reject separators
        // anyway so a bad caller cannot escape the store directory.
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(VaultError::Store(format!("invalid store key: {key}")));
        }
        Ok(self.dir.join(key))
    }

    /// Exclusive advisory lock serializing vault mutations across
    /// processes. Fails fast with `StoreBusy` instead of blocking.
    pub fn acquire_write_lock(&self) -> Result<StoreLock> {
        if let Some(parent) = self.lock_path.parent() {
            crate::fsutil::ensure_private_dir(parent)
                .map_err(|e| VaultError::Store(e.to_string()))?;
        }
        let f = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| VaultError::Store(format!("open lock file: {e}")))?;
        match f.try_lock_exclusive() {
            Ok(()) => Ok(StoreLock { file: f }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(VaultError::StoreBusy),
            Err(e) => Err(VaultError::Store(format!("lock exclusive: {e}"))),
        }
    }
}

impl SecureStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let p = self.path_for(key)?;
        if !p.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&p).map_err(|e| VaultError::Store(format!("read {key}: {e}")))?;
        Ok(Some(bytes))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let p = self.path_for(key)?;
        crate::fsutil::write_atomic_private(&p, value)
            .map_err(|e| VaultError::Store(format!("write {key}: {e}")))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let p = self.path_for(key)?;
        match fs::remove_file(&p) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::Store(format!("delete {key}: {e}"))),
        }
    }
}

/// RAII guard for the cross-process write lock.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Advisory lock is released on close anyway; unlock eagerly so the
        // guard can be dropped long before the process exits.
        drop(fs2::FileExt::unlock(&self.file));
    }
}

/// In-memory store for tests and embedding hosts that bring their own
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SecureStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

impl<S: SecureStore + ?Sized> SecureStore for &S {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_store(dir: &std::path::Path) -> Result<FileStore> {
        FileStore::open(dir.join("vault"), dir.join("keelvault.lock"))
    }

    #[test]
    fn file_store_put_get_delete() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = file_store(dir.path())?;

        assert_eq!(store.get("vault.record")?, None);
        store.put("vault.record", b"payload")?;
        assert_eq!(store.get("vault.record")?.as_deref(), Some(&b"payload"[..]));

        store.delete("vault.record")?;
        assert_eq!(store.get("vault.record")?, None);
        // Deleting again is a no-op.
        store.delete("vault.record")?;
        Ok(())
    }

    #[test]
    fn file_store_put_replaces_atomically() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = file_store(dir.path())?;

        store.put("vault.record", b"old")?;
        store.put("vault.record", b"new")?;
        assert_eq!(store.get("vault.record")?.as_deref(), Some(&b"new"[..]));
        Ok(())
    }

    #[test]
    fn file_store_rejects_path_escapes() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = file_store(dir.path())?;

        let err = store.put("../escape", b"x").err();
        assert!(
            matches!(err, Some(VaultError::Store(_))),
            "separator keys must be rejected"
        );
        Ok(())
    }

    #[test]
    fn write_lock_is_exclusive() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = file_store(dir.path())?;

        let held = store.acquire_write_lock()?;
        let second = store.acquire_write_lock();
        assert_eq!(second.err(), Some(VaultError::StoreBusy));

        drop(held);
        let reacquired = store.acquire_write_lock();
        assert!(reacquired.is_ok(), "lock must be reacquirable after drop");
        Ok(())
    }

    #[test]
    fn memory_store_round_trips() -> eyre::Result<()> {
        let store = MemoryStore::new();
        store.put("k", b"v")?;
        assert_eq!(store.get("k")?.as_deref(), Some(&b"v"[..]));
        store.delete("k")?;
        assert_eq!(store.get("k")?, None);
        Ok(())
    }
}
