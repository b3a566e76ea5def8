//! Binary-search historian (spec.md §4.9, component C9): reconstructs the
//! ordered list of distinct historical values of one storage slot by
//! bisecting block ranges, grounded in `proxion/__main__.py::binary_search`.

use std::collections::HashMap;

use proxyscope_common::{Address, BlockTag, Explorer, Word};

use crate::errors::ClassifyError;

/// Memoized per-slot value lookups, keyed by block number — the source's
/// `table` dict. Not persisted across classifications.
pub struct Historian<'a> {
    explorer: &'a dyn Explorer,
    address: Address,
    slot: Word,
    memo: HashMap<u64, Word>,
}

impl<'a> Historian<'a> {
    pub fn new(explorer: &'a dyn Explorer, address: Address, slot: Word) -> Self {
        Self { explorer, address, slot, memo: HashMap::new() }
    }

    fn value_at(&mut self, block: u64) -> Result<Word, ClassifyError> {
        if let Some(v) = self.memo.get(&block) {
            return Ok(*v);
        }
        let value = self.explorer.get_storage_at(self.address, self.slot, BlockTag::Number(block))?;
        self.memo.insert(block, value);
        Ok(value)
    }

    /// Enumerates the distinct values this slot has taken, in increasing
    /// block order, as of `right_block` (normally the latest block). The
    /// zero sentinel at block 1 (before the slot was ever set) is dropped,
    /// and adjacent duplicates at the tail are trimmed.
    pub fn history(&mut self, right_block: u64) -> Result<Vec<Word>, ClassifyError> {
        let mut values_by_block: Vec<(u64, Word)> = Vec::new();
        self.bisect(1, right_block, &mut values_by_block)?;

        values_by_block.sort_by_key(|(block, _)| *block);
        let mut distinct = Vec::new();
        for (_, value) in values_by_block {
            if value.is_zero() {
                continue;
            }
            if distinct.last() != Some(&value) {
                distinct.push(value);
            }
        }
        Ok(distinct)
    }

    /// Recursively bisects `[left, right]`; only halves whose endpoints
    /// differ are worth exploring further, since a constant value across
    /// a range means no transition happened inside it.
    fn bisect(
        &mut self,
        left: u64,
        right: u64,
        out: &mut Vec<(u64, Word)>,
    ) -> Result<(), ClassifyError> {
        let left_value = self.value_at(left)?;
        let right_value = self.value_at(right)?;
        out.push((left, left_value));
        out.push((right, right_value));

        if left_value == right_value || right <= left + 1 {
            return Ok(());
        }

        let mid = left + (right - left) / 2;
        let mid_value = self.value_at(mid)?;
        out.push((mid, mid_value));

        if left_value != mid_value {
            self.bisect(left, mid, out)?;
        }
        if mid_value != right_value {
            self.bisect(mid, right, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxyscope_common::MockExplorer;

    #[test]
    fn single_transition_is_found_by_bisection() {
        let addr = Address::zero();
        let slot = Word::from(1u8);
        let mut explorer = MockExplorer::new();
        for block in 1..=5 {
            explorer = explorer.with_storage_at_block(addr, slot, block, Word::from(0xaau32));
        }
        for block in 6..=10 {
            explorer = explorer.with_storage_at_block(addr, slot, block, Word::from(0xbbu32));
        }
        let mut historian = Historian::new(&explorer, addr, slot);
        let history = historian.history(10).unwrap();
        assert_eq!(history, vec![Word::from(0xaau32), Word::from(0xbbu32)]);
    }

    #[test]
    fn constant_value_yields_a_single_entry() {
        let addr = Address::zero();
        let slot = Word::from(1u8);
        let mut explorer = MockExplorer::new();
        for block in 1..=10 {
            explorer = explorer.with_storage_at_block(addr, slot, block, Word::from(0x42u32));
        }
        let mut historian = Historian::new(&explorer, addr, slot);
        assert_eq!(historian.history(10).unwrap(), vec![Word::from(0x42u32)]);
    }

    #[test]
    fn all_zero_history_yields_nothing() {
        let addr = Address::zero();
        let slot = Word::from(1u8);
        let explorer = MockExplorer::new();
        let mut historian = Historian::new(&explorer, addr, slot);
        assert!(historian.history(10).unwrap().is_empty());
    }
}
