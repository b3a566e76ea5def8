//! Per-account storage access: an in-memory overlay over whatever the
//! configured [`Explorer`] reports, so a `SSTORE` earlier in the same
//! classification is visible to a later `SLOAD` without round-tripping to
//! the chain, mirroring the read-through-then-cache behavior of the
//! original `Storage` class in `octopus.core.storage`.

use std::collections::HashMap;
use std::sync::Arc;

use proxyscope_common::{Address, BlockTag, Explorer, Word};

use crate::errors::VMError;

#[derive(Default)]
struct Overlay {
    writes: HashMap<(Address, Word), Word>,
    /// Every value fetched from the explorer during this classification,
    /// cached the moment it's read — the same lazy-population behavior the
    /// original's dict-subclass `Storage` gets for free from `__missing__`.
    reads: HashMap<(Address, Word), Word>,
}

/// Storage access shared by every nested call frame in one classification
/// run. Cheap to clone: the overlay is reference-counted, the same way the
/// original reuses one `Storage` object across nested `Handler` calls.
#[derive(Clone)]
pub struct Storage {
    explorer: Arc<dyn Explorer>,
    block: BlockTag,
    overlay: Arc<std::sync::Mutex<Overlay>>,
}

impl Storage {
    pub fn new(explorer: Arc<dyn Explorer>, block: BlockTag) -> Self {
        Self { explorer, block, overlay: Arc::new(std::sync::Mutex::new(Overlay::default())) }
    }

    pub fn block(&self) -> BlockTag {
        self.block
    }

    /// Reads `(address, slot)`, preferring any uncommitted write made
    /// earlier in this classification over the chain's reported value.
    pub fn load(&self, address: Address, slot: Word) -> Result<Word, VMError> {
        if let Some(v) =
            self.overlay.lock().unwrap_or_else(|e| e.into_inner()).writes.get(&(address, slot))
        {
            return Ok(*v);
        }
        let value = self.explorer.get_storage_at(address, slot, self.block)?;
        self.overlay
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reads
            .insert((address, slot), value);
        Ok(value)
    }

    pub fn store(&self, address: Address, slot: Word, value: Word) {
        self.overlay
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .writes
            .insert((address, slot), value);
    }

    /// Every `(slot, value)` pair observed at `address` so far in this
    /// classification — reads and writes alike — the frame-local "storage
    /// cache" the classifier searches for a slot holding a known address.
    pub fn entries_for(&self, address: Address) -> Vec<(Word, Word)> {
        let overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: HashMap<Word, Word> = HashMap::new();
        for (&(a, slot), &value) in overlay.reads.iter() {
            if a == address {
                entries.insert(slot, value);
            }
        }
        for (&(a, slot), &value) in overlay.writes.iter() {
            if a == address {
                entries.insert(slot, value);
            }
        }
        entries.into_iter().collect()
    }

    pub fn code(&self, address: Address) -> Result<Vec<u8>, VMError> {
        Ok(self.explorer.get_code(address, self.block)?)
    }

    pub fn balance(&self, address: Address) -> Result<Word, VMError> {
        Ok(self.explorer.get_balance(address, self.block)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxyscope_common::MockExplorer;

    #[test]
    fn overlay_write_shadows_the_explorer() {
        let addr = Address::zero();
        let explorer =
            Arc::new(MockExplorer::new().with_storage(addr, Word::from(1), Word::from(10)));
        let storage = Storage::new(explorer, BlockTag::Latest);
        assert_eq!(storage.load(addr, Word::from(1)).unwrap(), Word::from(10));
        storage.store(addr, Word::from(1), Word::from(99));
        assert_eq!(storage.load(addr, Word::from(1)).unwrap(), Word::from(99));
    }

    #[test]
    fn overlay_is_shared_across_clones() {
        let explorer = Arc::new(MockExplorer::new());
        let storage = Storage::new(explorer, BlockTag::Latest);
        let clone = storage.clone();
        clone.store(Address::zero(), Word::from(2), Word::from(5));
        assert_eq!(storage.load(Address::zero(), Word::from(2)).unwrap(), Word::from(5));
    }
}
