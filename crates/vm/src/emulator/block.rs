//! Block-info group (spec.md §4.4): every member is inconcrete on every
//! use, unconditionally, since the classifier cannot model consensus
//! block data faithfully — these opcodes are served from the Handler only
//! so a contract that branches on them still runs to completion and gets
//! flagged via `inconcrete_opcodes` rather than aborting.

use proxyscope_common::Word;

use super::Emulator;
use crate::disassembler::Instruction;
use crate::errors::{OpcodeResult, VMError};
use crate::memory::word_to_offset;

/// No `Explorer` operation exposes chain id; classification doesn't
/// depend on a specific network, so a fixed mainnet id is used as a
/// stand-in and the opcode is always recorded as inconcrete regardless.
const STUB_CHAIN_ID: u64 = 1;

pub fn dispatch(emu: &mut Emulator, instruction: &Instruction) -> Result<OpcodeResult, VMError> {
    emu.mark_inconcrete(&instruction.name);
    match instruction.name.as_str() {
        "BLOCKHASH" => {
            let number = word_to_offset(emu.state.pop()?)? as u64;
            let header = emu.handler.block_by_number(number)?;
            emu.state.push(Word::from_big_endian(header.hash.as_bytes()))?;
        }
        "DIFFICULTY" => {
            let number = emu.handler.block_number()?;
            emu.state.push(emu.handler.difficulty(number)?)?;
        }
        "CHAINID" => {
            emu.state.push(Word::from(STUB_CHAIN_ID))?;
        }
        "GASLIMIT" => {
            let number = emu.handler.block_number()?;
            emu.state.push(Word::from(emu.handler.gas_limit(number)?))?;
        }
        "BASEFEE" => {
            let number = emu.handler.block_number()?;
            let header = emu.handler.block_by_number(number)?;
            emu.state.push(header.base_fee.unwrap_or_default())?;
        }
        "TIMESTAMP" => {
            let number = emu.handler.block_number()?;
            emu.state.push(Word::from(emu.handler.block_by_number(number)?.timestamp))?;
        }
        "COINBASE" => {
            let number = emu.handler.block_number()?;
            let header = emu.handler.block_by_number(number)?;
            emu.state.push(proxyscope_common::address_to_word(header.coinbase))?;
        }
        "NUMBER" => {
            emu.state.push(Word::from(emu.handler.block_number()?))?;
        }
        "SELFBALANCE" => {
            let balance = emu.handler.balance(emu.callinfo.address)?;
            emu.state.push(balance)?;
        }
        _ => unreachable!("block dispatch received {}", instruction.name),
    }
    Ok(OpcodeResult::Continue)
}
