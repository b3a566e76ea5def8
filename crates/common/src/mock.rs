//! An in-memory `Explorer` fixture for deterministic tests, the same role
//! `test_utils.rs` plays in the teacher's `ethrex-levm`/`ethrex-rpc`
//! crates: no network access, fully scripted responses.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{Address, BlockHeader, BlockTag, Explorer, ExplorerError, Word};

#[derive(Debug, Default)]
struct State {
    code: HashMap<Address, Vec<u8>>,
    storage: HashMap<(Address, Word), Word>,
    /// storage history keyed by block number, consulted in preference to
    /// `storage` when a classification asks for a specific historical block.
    storage_history: HashMap<(Address, Word, u64), Word>,
    balances: HashMap<Address, Word>,
    blocks: HashMap<u64, BlockHeader>,
    latest_block: u64,
    gas_price: Word,
}

/// A scriptable `Explorer` backed by plain maps, built up with the
/// `with_*` builder methods before being handed to a classifier or VM.
#[derive(Debug, Default)]
pub struct MockExplorer {
    state: Mutex<State>,
}

impl MockExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(self, address: Address, code: Vec<u8>) -> Self {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).code.insert(address, code);
        self
    }

    pub fn with_storage(self, address: Address, slot: Word, value: Word) -> Self {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .storage
            .insert((address, slot), value);
        self
    }

    /// Scripts the value of `(address, slot)` as of a specific block, used
    /// by historian tests to exercise the binary-search bisection.
    pub fn with_storage_at_block(
        self,
        address: Address,
        slot: Word,
        block: u64,
        value: Word,
    ) -> Self {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .storage_history
            .insert((address, slot, block), value);
        self
    }

    pub fn with_balance(self, address: Address, balance: Word) -> Self {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).balances.insert(address, balance);
        self
    }

    pub fn with_latest_block(self, number: u64) -> Self {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).latest_block = number;
        self
    }

    pub fn with_block(self, header: BlockHeader) -> Self {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).blocks.insert(header.number, header);
        self
    }

    pub fn with_gas_price(self, price: Word) -> Self {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).gas_price = price;
        self
    }
}

impl Explorer for MockExplorer {
    fn get_code(&self, address: Address, _block: BlockTag) -> Result<Vec<u8>, ExplorerError> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    fn get_storage_at(
        &self,
        address: Address,
        slot: Word,
        block: BlockTag,
    ) -> Result<Word, ExplorerError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let BlockTag::Number(n) = block {
            if let Some(v) = state.storage_history.get(&(address, slot, n)) {
                return Ok(*v);
            }
            // fall through to the "current" value for blocks not explicitly
            // scripted, so callers only need to script the transitions.
        }
        Ok(state.storage.get(&(address, slot)).copied().unwrap_or_default())
    }

    fn get_balance(&self, address: Address, _block: BlockTag) -> Result<Word, ExplorerError> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    fn block_number(&self) -> Result<u64, ExplorerError> {
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).latest_block)
    }

    fn get_block_by_number(&self, number: u64) -> Result<BlockHeader, ExplorerError> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .blocks
            .get(&number)
            .copied()
            .unwrap_or(BlockHeader { number, ..Default::default() }))
    }

    fn gas_price(&self) -> Result<Word, ExplorerError> {
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).gas_price)
    }
}
