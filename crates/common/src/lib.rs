//! Shared primitive types and encoding helpers for proxyscope.
//!
//! Every other crate in the workspace builds on the `Word`/`Address`
//! aliases defined here instead of reaching for its own integer or byte
//! representation, the same way `ethrex-common` is the single source of
//! truth for `Address`/`H256`/`U256` across the teacher's workspace.

pub mod errors;
pub mod explorer;
pub mod hexutil;
pub mod mock;

use sha3::{Digest, Keccak256};

pub use ethereum_types::{Address, H256, U256};
pub use errors::ExplorerError;
pub use explorer::{BlockHeader, Explorer};
pub use mock::MockExplorer;

/// A 256-bit EVM word. An alias, not a newtype: arithmetic throughout the
/// workspace is plain `U256` wrapping arithmetic.
pub type Word = U256;

/// Block selector for historical reads, matching spec.md's `block` option
/// (`"latest"` or a specific block number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl Default for BlockTag {
    fn default() -> Self {
        BlockTag::Latest
    }
}

impl std::fmt::Display for BlockTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockTag::Latest => write!(f, "latest"),
            BlockTag::Number(n) => write!(f, "{n:#x}"),
        }
    }
}

/// keccak256 of arbitrary input.
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

/// Canonicalize a 256-bit word to an address by taking its low-order 20
/// bytes (the standard way a `SLOAD`ed storage slot is read back as an
/// implementation address).
pub fn word_to_address(word: Word) -> Address {
    let mut bytes = [0u8; 32];
    word.to_big_endian(&mut bytes);
    Address::from_slice(&bytes[12..])
}

/// Zero-extend an address into a 256-bit word (the form it takes once
/// pushed onto the EVM stack).
pub fn address_to_word(address: Address) -> Word {
    Word::from_big_endian(address.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_to_address_keeps_low_20_bytes() {
        let word = Word::from(0xbeefu64);
        let addr = word_to_address(word);
        assert_eq!(format!("{addr:#x}"), "0x000000000000000000000000000000000000beef");
    }

    #[test]
    fn address_word_roundtrip() {
        let addr = Address::from_low_u64_be(0xdead_beef);
        assert_eq!(word_to_address(address_to_word(addr)), addr);
    }

    #[test]
    fn keccak_matches_known_digest() {
        // keccak256("") is a well known constant, used as a sanity check
        // that we reach for the Keccak variant and not SHA3-256.
        let digest = keccak256(b"");
        assert_eq!(
            format!("{digest:#x}"),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
