//! Environmental group (spec.md §4.4): opcodes served from `CallInfo` or
//! from the bytecode/calldata the frame is running against. `ORIGIN`,
//! `GASPRICE`, and `BALANCE` are inconcrete on every use per spec.md §4.4.

use proxyscope_common::{address_to_word, Word};

use super::Emulator;
use crate::disassembler::Instruction;
use crate::errors::{OpcodeResult, VMError};
use crate::memory::word_to_offset;

pub fn dispatch(emu: &mut Emulator, instruction: &Instruction) -> Result<OpcodeResult, VMError> {
    match instruction.name.as_str() {
        "ADDRESS" => {
            emu.state.push(address_to_word(emu.callinfo.address))?;
        }
        "CALLER" => {
            emu.state.push(address_to_word(emu.callinfo.caller))?;
        }
        "ORIGIN" => {
            emu.mark_inconcrete("ORIGIN");
            emu.state.push(address_to_word(emu.callinfo.origin))?;
        }
        "CALLVALUE" => {
            emu.state.push(emu.callinfo.callvalue)?;
        }
        "CALLDATASIZE" => {
            emu.state.push(Word::from(emu.callinfo.calldata.len() as u64))?;
        }
        "CALLDATALOAD" => {
            let offset = word_to_offset(emu.state.pop()?)?;
            emu.state.push(calldata_word(&emu.callinfo.calldata, offset))?;
        }
        "CALLDATACOPY" => {
            let dest = word_to_offset(emu.state.pop()?)?;
            let offset = word_to_offset(emu.state.pop()?)?;
            let size = word_to_offset(emu.state.pop()?)?;
            let data = calldata_range(&emu.callinfo.calldata, offset, size);
            emu.state.memory.store_range(dest, &data)?;
        }
        "CODESIZE" => {
            emu.state.push(Word::from(emu.code.len() as u64))?;
        }
        "CODECOPY" => {
            let dest = word_to_offset(emu.state.pop()?)?;
            let offset = word_to_offset(emu.state.pop()?)?;
            let size = word_to_offset(emu.state.pop()?)?;
            let data = calldata_range(&emu.code, offset, size);
            emu.state.memory.store_range(dest, &data)?;
        }
        "GASPRICE" => {
            emu.mark_inconcrete("GASPRICE");
            let price = emu.handler.gas_price()?;
            emu.state.push(price)?;
        }
        "BALANCE" => {
            emu.mark_inconcrete("BALANCE");
            let addr = proxyscope_common::word_to_address(emu.state.pop()?);
            let balance = emu.handler.balance(addr)?;
            emu.state.push(balance)?;
        }
        "EXTCODESIZE" => {
            let addr = proxyscope_common::word_to_address(emu.state.pop()?);
            let size = emu.handler.ext_code_size(addr)?;
            emu.state.push(Word::from(size as u64))?;
        }
        "EXTCODEHASH" => {
            let addr = proxyscope_common::word_to_address(emu.state.pop()?);
            let hash = emu.handler.ext_code_hash(addr)?;
            emu.state.push(hash)?;
        }
        "EXTCODECOPY" => {
            let addr = proxyscope_common::word_to_address(emu.state.pop()?);
            let dest = word_to_offset(emu.state.pop()?)?;
            let offset = word_to_offset(emu.state.pop()?)?;
            let size = word_to_offset(emu.state.pop()?)?;
            let code = emu.handler.code_at(addr)?;
            let data = calldata_range(&code, offset, size);
            emu.state.memory.store_range(dest, &data)?;
        }
        "RETURNDATASIZE" => {
            emu.state.push(Word::from(emu.last_return_data.len() as u64))?;
        }
        "RETURNDATACOPY" => {
            let dest = word_to_offset(emu.state.pop()?)?;
            let offset = word_to_offset(emu.state.pop()?)?;
            let size = word_to_offset(emu.state.pop()?)?;
            let data = calldata_range(&emu.last_return_data, offset, size);
            emu.state.memory.store_range(dest, &data)?;
        }
        _ => unreachable!("environment dispatch received {}", instruction.name),
    }
    Ok(OpcodeResult::Continue)
}

/// Reads a 32-byte word starting at `offset`, right-padding with zeros
/// past the end of `data` (spec.md §4.4's `CALLDATALOAD` rule).
fn calldata_word(data: &[u8], offset: usize) -> Word {
    let mut word = [0u8; 32];
    for (i, slot) in word.iter_mut().enumerate() {
        if let Some(byte) = data.get(offset + i) {
            *slot = *byte;
        }
    }
    Word::from_big_endian(&word)
}

/// Zero-padded slice of `data[offset..offset+size]`, used by the `*COPY`
/// family whenever the requested range runs past the source's length.
fn calldata_range(data: &[u8], offset: usize, size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size];
    for (i, slot) in out.iter_mut().enumerate() {
        if let Some(byte) = data.get(offset + i) {
            *slot = *byte;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calldata_word_right_pads_past_the_end() {
        let data = [0xaa, 0xbb];
        let word = calldata_word(&data, 0);
        let mut expected = [0u8; 32];
        expected[0] = 0xaa;
        expected[1] = 0xbb;
        assert_eq!(word, Word::from_big_endian(&expected));
    }

    #[test]
    fn calldata_range_zero_pads_a_short_source() {
        let data = [1, 2, 3];
        assert_eq!(calldata_range(&data, 1, 4), vec![2, 3, 0, 0]);
    }
}
