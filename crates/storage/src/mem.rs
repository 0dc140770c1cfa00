//! An in-memory [KeyValueStore] used in tests and as the reference
//! implementation of the transaction discipline.

use crate::{KeyValueStore, StoreError, StoreResult};
use std::collections::BTreeMap;

/// Overlay entry: `Some` is a write, `None` is a recorded deletion.
type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// An ordered-map store with a vector of overlay transactions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    base: BTreeMap<Vec<u8>, Vec<u8>>,
    overlays: Vec<Overlay>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of live keys in the merged view.
    pub fn len(&self) -> usize {
        let mut keys: BTreeMap<&[u8], bool> = BTreeMap::new();
        for k in self.base.keys() {
            keys.insert(k.as_slice(), true);
        }
        for overlay in &self.overlays {
            for (k, v) in overlay {
                keys.insert(k.as_slice(), v.is_some());
            }
        }
        keys.into_values().filter(|live| *live).count()
    }

    /// Whether the merged view holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        for overlay in self.overlays.iter().rev() {
            if let Some(entry) = overlay.get(key) {
                return Ok(entry.clone());
            }
        }
        Ok(self.base.get(key).cloned())
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> StoreResult<()> {
        match self.overlays.last_mut() {
            Some(overlay) => {
                overlay.insert(key, Some(value));
            }
            None => {
                self.base.insert(key, value);
            }
        }
        Ok(())
    }

    fn del(&mut self, key: &[u8]) -> StoreResult<()> {
        match self.overlays.last_mut() {
            Some(overlay) => {
                overlay.insert(key.to_vec(), None);
            }
            None => {
                self.base.remove(key);
            }
        }
        Ok(())
    }

    fn begin(&mut self) -> StoreResult<()> {
        self.overlays.push(Overlay::new());
        Ok(())
    }

    fn commit(&mut self, apply_deletes: bool) -> StoreResult<()> {
        let overlay = self.overlays.pop().ok_or(StoreError::NoTransaction)?;
        for (key, entry) in overlay {
            match entry {
                Some(value) => self.put(key, value)?,
                None if apply_deletes => self.del(&key)?,
                None => {}
            }
        }
        Ok(())
    }

    fn dispose(&mut self) -> StoreResult<()> {
        self.overlays.pop().ok_or(StoreError::NoTransaction)?;
        Ok(())
    }

    fn depth(&self) -> usize {
        self.overlays.len()
    }
}
