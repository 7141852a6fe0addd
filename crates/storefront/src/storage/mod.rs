//! Local key-value persistence for the guest cart.
//!
//! [`KeyValueStore`] is the seam: [`MemoryStore`] backs tests and embedded
//! use, [`FileStore`] keeps one JSON file per key under a directory.
//! [`GuestCartRepository`] owns the `guest_cart` entries on top of either.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use fads_core::Cart;
use thiserror::Error;

/// Storage key of the guest cart snapshot.
pub const GUEST_CART_KEY: &str = "guest_cart";

/// Storage key of the lines a signed-in cart left in the snapshot at logout.
pub const CARRIED_CART_KEY: &str = "guest_cart_carried";

/// Errors from a [`KeyValueStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing medium failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// A value could not be serialized.
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),

    /// Keys are restricted to `[A-Za-z0-9_-]`.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// String key-value persistence.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read a value; `None` when the key is unset.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing medium cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an unset key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing medium cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // The map holds plain strings; a panic mid-insert cannot corrupt it.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Directory-backed store writing `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash never leaves a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path(key)?;
        let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path).inspect_err(|_| {
            let _ = std::fs::remove_file(&tmp);
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path(key)?) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Reads and writes the guest cart snapshot.
#[derive(Clone)]
pub struct GuestCartRepository {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for GuestCartRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestCartRepository").finish_non_exhaustive()
    }
}

impl GuestCartRepository {
    pub fn new(store: impl KeyValueStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Load the snapshot. A missing or unreadable snapshot is an empty cart;
    /// unreadable ones are logged.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only if the store itself fails.
    pub fn load(&self) -> Result<Cart, StorageError> {
        self.read(GUEST_CART_KEY)
    }

    /// What the guest added on top of the lines carried over from the last
    /// signed-in cart. This is the part merged into a remote cart at login.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only if the store itself fails.
    pub fn load_additions(&self) -> Result<Cart, StorageError> {
        let snapshot = self.read(GUEST_CART_KEY)?;
        let carried = self.read(CARRIED_CART_KEY)?;
        Ok(snapshot.subtract(&carried))
    }

    /// The lines carried over from the last signed-in cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    pub fn load_carried(&self) -> Result<Cart, StorageError> {
        self.read(CARRIED_CART_KEY)
    }

    fn read(&self, key: &str) -> Result<Cart, StorageError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(Cart::default());
        };
        match serde_json::from_str::<Cart>(&raw) {
            Ok(cart) => Ok(cart),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding unreadable cart snapshot");
                Ok(Cart::default())
            }
        }
    }

    /// Replace the snapshot after a guest mutation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cart cannot be encoded or written.
    pub fn save(&self, cart: &Cart) -> Result<(), StorageError> {
        let raw = serde_json::to_string(cart)?;
        self.store.set(GUEST_CART_KEY, &raw)
    }

    /// Replace the snapshot with a signed-in cart at logout, remembering
    /// `carried` as the lines the server already holds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a cart cannot be encoded or written.
    pub fn save_carried(&self, cart: &Cart, carried: &Cart) -> Result<(), StorageError> {
        self.store
            .set(CARRIED_CART_KEY, &serde_json::to_string(carried)?)?;
        self.save(cart)
    }

    /// Delete the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(GUEST_CART_KEY)?;
        self.store.remove(CARRIED_CART_KEY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;
    use fads_core::{CartAction, Price, ProductId, Variant};

    use super::*;

    fn cart() -> Cart {
        Cart::default()
            .reduce(CartAction::Add {
                product_id: ProductId::parse("A").unwrap(),
                variant: Variant::new(Some("M"), None).unwrap(),
                quantity: 2,
                unit_price: Price::whole(1000),
                at: DateTime::UNIX_EPOCH,
            })
            .unwrap()
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fads-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_repository_roundtrip_and_clear() {
        let repo = GuestCartRepository::new(MemoryStore::new());
        assert!(repo.load().unwrap().is_empty());

        repo.save(&cart()).unwrap();
        assert_eq!(repo.load().unwrap(), cart());

        repo.clear().unwrap();
        assert!(repo.load().unwrap().is_empty());
    }

    #[test]
    fn test_additions_exclude_carried_lines() {
        let repo = GuestCartRepository::new(MemoryStore::new());
        repo.save_carried(&cart(), &cart()).unwrap();
        assert_eq!(repo.load().unwrap(), cart());
        assert!(repo.load_additions().unwrap().is_empty());

        let more = cart()
            .reduce(CartAction::Add {
                product_id: ProductId::parse("A").unwrap(),
                variant: Variant::new(Some("M"), None).unwrap(),
                quantity: 1,
                unit_price: Price::whole(1000),
                at: DateTime::UNIX_EPOCH,
            })
            .unwrap();
        repo.save(&more).unwrap();
        assert_eq!(repo.load_additions().unwrap().item_count(), 1);

        repo.clear().unwrap();
        repo.save(&more).unwrap();
        assert_eq!(repo.load_additions().unwrap(), more);
    }

    #[test]
    fn test_corrupt_snapshot_loads_empty() {
        let store = MemoryStore::new();
        store.set(GUEST_CART_KEY, "{not json").unwrap();
        let repo = GuestCartRepository::new(store.clone());
        assert!(repo.load().unwrap().is_empty());

        // A legacy bare array is also unreadable.
        store
            .set(GUEST_CART_KEY, r#"[{"id":"A","quantity":1}]"#)
            .unwrap();
        assert!(repo.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_writes_json_file() {
        let dir = temp_dir("store");
        let store = FileStore::open(&dir).unwrap();
        let repo = GuestCartRepository::new(store.clone());

        repo.save(&cart()).unwrap();
        let raw = std::fs::read_to_string(dir.join("guest_cart.json")).unwrap();
        assert!(raw.contains("\"version\":1"));
        assert_eq!(repo.load().unwrap(), cart());

        repo.clear().unwrap();
        assert!(!dir.join("guest_cart.json").exists());
        repo.clear().unwrap();

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = temp_dir("keys");
        let store = FileStore::open(&dir).unwrap();
        assert!(matches!(
            store.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
        assert_eq!(store.get("missing").unwrap(), None);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
