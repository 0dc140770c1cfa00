//! The byte-keyed store abstraction and its transaction discipline.

use crate::{StoreError, StoreResult};

/// An opaque, byte-keyed, persistent store with a stack of nested
/// overlay transactions.
///
/// `begin` pushes an overlay; writes land in the topmost overlay until it
/// is either folded down with `commit` or thrown away with `dispose`.
/// Reads always observe the merged view. `commit(apply_deletes = false)`
/// folds the overlay's writes but drops its recorded deletions, which is
/// what the block executor relies on to preserve per-block trie pruning.
pub trait KeyValueStore {
    /// Reads the value stored under `key`.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`.
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> StoreResult<()>;

    /// Deletes the value stored under `key`.
    fn del(&mut self, key: &[u8]) -> StoreResult<()>;

    /// Opens a nested transaction.
    fn begin(&mut self) -> StoreResult<()>;

    /// Folds the topmost transaction into its parent.
    fn commit(&mut self, apply_deletes: bool) -> StoreResult<()>;

    /// Discards the topmost transaction.
    fn dispose(&mut self) -> StoreResult<()>;

    /// The number of transactions currently open.
    fn depth(&self) -> usize;
}

/// A scope guard over one [KeyValueStore] transaction.
///
/// Dropping the guard without calling [ScopedTx::commit] disposes the
/// transaction, mirroring a dispose-on-scope-exit defer.
#[derive(Debug)]
pub struct ScopedTx<'a, K: KeyValueStore + ?Sized> {
    kv: &'a mut K,
    open: bool,
}

impl<'a, K: KeyValueStore + ?Sized> ScopedTx<'a, K> {
    /// Begins a transaction on `kv` and wraps it in a guard.
    pub fn begin(kv: &'a mut K) -> StoreResult<Self> {
        kv.begin()?;
        Ok(Self { kv, open: true })
    }

    /// Access to the guarded store, for writes within the transaction.
    pub fn kv(&mut self) -> &mut K {
        self.kv
    }

    /// Commits the transaction, consuming the guard.
    pub fn commit(mut self, apply_deletes: bool) -> StoreResult<()> {
        self.open = false;
        self.kv.commit(apply_deletes)
    }

    /// Explicitly disposes the transaction, consuming the guard.
    pub fn dispose(mut self) -> Result<(), StoreError> {
        self.open = false;
        self.kv.dispose()
    }
}

impl<K: KeyValueStore + ?Sized> Drop for ScopedTx<'_, K> {
    fn drop(&mut self) {
        if self.open {
            // A dispose failure on the unwind path has nowhere to go.
            let _ = self.kv.dispose();
        }
    }
}
