//! Hex encode/decode helpers matching the wire conventions of spec.md §6:
//! slot values are 0x-prefixed 64-hex-character words, addresses are
//! 0x-prefixed 40-hex-character lowercase strings, and an explorer
//! response of `"0x"` means "unset"/"empty".

use crate::{Address, Word};

#[derive(Debug, thiserror::Error)]
pub enum HexDecodeError {
    #[error("expected a 0x-prefixed hex string, got {0:?}")]
    MissingPrefix(String),
    #[error("invalid hex digits in {0:?}")]
    InvalidHex(String),
}

/// Strips the `0x`/`0X` prefix, if present. A bare hex string without the
/// prefix is accepted too: explorer responses are conventionally prefixed
/// but not every JSON-RPC backend is consistent about it.
fn strip_prefix(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

/// Decodes a 0x-hex byte string. `"0x"` decodes to an empty vector, which
/// callers use to detect "no code"/"unset storage" per the Explorer
/// contract in spec.md §6.
pub fn decode_hex_bytes(s: &str) -> Result<Vec<u8>, HexDecodeError> {
    let stripped = strip_prefix(s);
    if stripped.is_empty() {
        return Ok(Vec::new());
    }
    let padded = if stripped.len() % 2 == 1 {
        format!("0{stripped}")
    } else {
        stripped.to_string()
    };
    hex::decode(&padded).map_err(|_| HexDecodeError::InvalidHex(s.to_string()))
}

/// Decodes a hex-encoded 256-bit word. Missing/empty input decodes to zero,
/// matching `Storage::sload`'s default for an unset slot.
pub fn decode_hex_word(s: &str) -> Result<Word, HexDecodeError> {
    let bytes = decode_hex_bytes(s)?;
    if bytes.is_empty() {
        return Ok(Word::zero());
    }
    Ok(Word::from_big_endian(&left_pad32(&bytes)))
}

fn left_pad32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let start = 32usize.saturating_sub(bytes.len());
    let take = bytes.len().min(32);
    out[start..].copy_from_slice(&bytes[bytes.len() - take..]);
    out
}

/// Encodes a word as a 0x-prefixed, zero-padded 64-hex-character string.
pub fn encode_word(word: Word) -> String {
    let mut bytes = [0u8; 32];
    word.to_big_endian(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

/// Encodes an address as a 0x-prefixed, lowercase 40-hex-character string.
pub fn encode_address(address: Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// Parses a 0x-hex address string.
pub fn decode_address(s: &str) -> Result<Address, HexDecodeError> {
    let bytes = decode_hex_bytes(s)?;
    if bytes.len() > 20 {
        return Err(HexDecodeError::InvalidHex(s.to_string()));
    }
    let mut padded = [0u8; 20];
    padded[20 - bytes.len()..].copy_from_slice(&bytes);
    Ok(Address::from_slice(&padded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_code_decodes_to_empty() {
        assert_eq!(decode_hex_bytes("0x").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn unset_slot_decodes_to_zero() {
        assert_eq!(decode_hex_word("0x").unwrap(), Word::zero());
    }

    #[test]
    fn word_roundtrip() {
        let w = Word::from(0x1234_5678u64);
        assert_eq!(decode_hex_word(&encode_word(w)).unwrap(), w);
    }

    #[test]
    fn address_roundtrip() {
        let addr = Address::from_low_u64_be(0xdead_beef);
        assert_eq!(decode_address(&encode_address(addr)).unwrap(), addr);
    }
}
