//! The narrow read-only chain interface the core depends on (spec.md §6,
//! component C1). Defined here rather than in its own crate so that
//! `proxyscope-vm` and `proxyscope-analyzer` can depend on the trait
//! without pulling in an HTTP client — only the binary links an actual
//! `Explorer` implementation (`proxyscope-explorer::JsonRpcExplorer`).

use crate::{Address, BlockTag, ExplorerError, Word};

/// Block header fields returned by `get_block_by_number`, matching the
/// subset spec.md §6 lists (`hash, difficulty, gasLimit, ...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: crate::H256,
    pub difficulty: Word,
    pub gas_limit: u64,
    pub timestamp: u64,
    pub coinbase: Address,
    pub base_fee: Option<Word>,
}

/// Read-only chain access. Every method is synchronous: per spec.md §5
/// the interpreter treats explorer calls as blocking suspension points,
/// never as concurrent work to overlap with interpretation.
pub trait Explorer: Send + Sync {
    /// Runtime bytecode at `address`. Empty bytes for no code (`"0x"`).
    fn get_code(&self, address: Address, block: BlockTag) -> Result<Vec<u8>, ExplorerError>;

    /// Value stored at `(address, slot)`. Zero for an unset slot.
    fn get_storage_at(
        &self,
        address: Address,
        slot: Word,
        block: BlockTag,
    ) -> Result<Word, ExplorerError>;

    /// Balance of `address`, in wei, at `block`.
    fn get_balance(&self, address: Address, block: BlockTag) -> Result<Word, ExplorerError>;

    /// Highest known block number.
    fn block_number(&self) -> Result<u64, ExplorerError>;

    /// Header fields for the given block.
    fn get_block_by_number(&self, number: u64) -> Result<BlockHeader, ExplorerError>;

    /// Current gas price, in wei.
    fn gas_price(&self) -> Result<Word, ExplorerError>;
}
