//! Durable key-value store for the guest cart document.
//!
//! The browser-storage analogue: one JSON document per profile directory
//! under the key `guestCart`, created lazily on first use and never
//! explicitly destroyed. All mutations go through [`GuestCartStore::with_document`],
//! the single read-modify-write choke point, so no caller can interleave a
//! stale read with a write. Writes are atomic (temp file + rename), which
//! keeps a partial failure from ever corrupting the document.
//!
//! The store is shared across every tab of the same profile with no
//! cross-process locking: two profiles' tabs writing concurrently race and
//! the last write wins. That is an accepted limitation of the storage
//! model, not something this type tries to fix.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::document::CartDocument;
use crate::error::Result;

/// Storage key for the guest cart document.
const STORE_KEY: &str = "guestCart";

/// File-backed store for the guest [`CartDocument`].
///
/// Cheaply cloneable; clones share the same in-process write lock.
#[derive(Debug, Clone)]
pub struct GuestCartStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    path: PathBuf,
    // In-process guard around read-modify-write sequences. Cross-process
    // writers are not locked out; last write wins.
    lock: Mutex<()>,
}

impl GuestCartStore {
    /// Open (or create) the store in the given profile directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                path: dir.join(format!("{STORE_KEY}.json")),
                lock: Mutex::new(()),
            }),
        })
    }

    /// Load the current document.
    ///
    /// A missing or malformed file is recovered by reinitializing an empty
    /// document; this never fails and never loses the storage file - the
    /// empty document is only persisted by the next mutation.
    #[must_use]
    pub fn load(&self) -> CartDocument {
        let _guard = self.guard();
        self.read_or_default()
    }

    /// Run a read-modify-write transaction against the document.
    ///
    /// This is the only mutation entry point: the current document is
    /// read, `f` computes the next state in place, and the result is
    /// written back atomically before the lock is released.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated document cannot be written back.
    /// The previous on-disk state is left intact in that case.
    pub fn with_document<T>(&self, f: impl FnOnce(&mut CartDocument) -> T) -> Result<T> {
        let _guard = self.guard();
        let mut document = self.read_or_default();
        let out = f(&mut document);
        self.write_atomic(&document)?;
        Ok(out)
    }

    fn read_or_default(&self) -> CartDocument {
        let raw = match fs::read(&self.inner.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CartDocument::empty();
            }
            Err(e) => {
                tracing::warn!(path = %self.inner.path.display(), error = %e, "failed to read guest cart, reinitializing");
                return CartDocument::empty();
            }
        };

        serde_json::from_slice(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %self.inner.path.display(), error = %e, "corrupt guest cart document, reinitializing");
            CartDocument::empty()
        })
    }

    fn write_atomic(&self, document: &CartDocument) -> Result<()> {
        let tmp = self.inner.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(document)?)?;
        fs::rename(&tmp, &self.inner.path)?;
        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // A poisoned lock only means another thread panicked mid-closure;
        // the on-disk state is still the last atomic write.
        self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
