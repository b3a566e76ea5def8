//! Stack/memory/storage/control-flow group (spec.md §4.4): `POP`,
//! `MLOAD`/`MSTORE`/`MSTORE8`, `SLOAD`/`SSTORE`, `JUMP`/`JUMPI`,
//! `PC`/`MSIZE`/`GAS`, `JUMPDEST`.

use proxyscope_common::Word;

use super::Emulator;
use crate::disassembler::Instruction;
use crate::errors::{ExceptionalHalt, OpcodeResult, VMError};
use crate::memory::word_to_offset;

pub fn dispatch(emu: &mut Emulator, instruction: &Instruction) -> Result<OpcodeResult, VMError> {
    match instruction.name.as_str() {
        "POP" => {
            emu.state.pop()?;
        }
        "MLOAD" => {
            let offset = word_to_offset(emu.state.pop()?)?;
            let word = emu.state.memory.load_word(offset)?;
            emu.state.push(Word::from_big_endian(&word))?;
        }
        "MSTORE" => {
            let offset = word_to_offset(emu.state.pop()?)?;
            let value = emu.state.pop()?;
            let mut bytes = [0u8; 32];
            value.to_big_endian(&mut bytes);
            emu.state.memory.store_word(offset, bytes)?;
        }
        "MSTORE8" => {
            let offset = word_to_offset(emu.state.pop()?)?;
            let value = emu.state.pop()?;
            emu.state.memory.store_byte(offset, value.low_u32() as u8)?;
        }
        "SLOAD" => {
            let slot = emu.state.pop()?;
            let value = emu.state.storage.load(emu.callinfo.storage_address, slot)?;
            emu.state.push(value)?;
        }
        "SSTORE" => {
            let slot = emu.state.pop()?;
            let value = emu.state.pop()?;
            emu.state.storage.store(emu.callinfo.storage_address, slot, value);
        }
        "JUMP" => {
            let dest = word_to_offset(emu.state.pop()?)?;
            jump_to(emu, dest)?;
        }
        "JUMPI" => {
            let dest = word_to_offset(emu.state.pop()?)?;
            let condition = emu.state.pop()?;
            if !condition.is_zero() {
                jump_to(emu, dest)?;
            }
        }
        "PC" => {
            emu.state.push(Word::from(instruction.pc as u64))?;
        }
        "MSIZE" => {
            emu.state.push(Word::from(emu.state.memory.len() as u64))?;
        }
        "GAS" => {
            emu.state.push(Word::from(emu.state.gas))?;
        }
        "JUMPDEST" => {}
        _ => unreachable!("memory/storage dispatch received {}", instruction.name),
    }
    Ok(OpcodeResult::Continue)
}

/// Sets the program counter to `dest`, rejecting any target that isn't a
/// valid `JUMPDEST` (spec.md §4.4 control-flow rule; spec.md §7 class 3).
fn jump_to(emu: &mut Emulator, dest: usize) -> Result<(), ExceptionalHalt> {
    if !emu.disassembly.valid_jumpdests.contains(&dest) {
        return Err(ExceptionalHalt::InvalidJumpDest(dest));
    }
    emu.state.pc = dest;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::disassemble;
    use crate::emulator::Emulator;
    use crate::handler::Handler;
    use crate::state::CallInfo;
    use crate::storage::Storage;
    use proxyscope_common::{Address, BlockTag, MockExplorer};
    use std::sync::Arc;

    fn emulator_for(code: &[u8]) -> Emulator {
        let handler = Arc::new(Handler::new(Arc::new(MockExplorer::new()), BlockTag::Latest));
        let storage = Storage::new(Arc::new(MockExplorer::new()), BlockTag::Latest);
        let callinfo = CallInfo {
            address: Address::zero(),
            caller: Address::zero(),
            origin: Address::zero(),
            storage_address: Address::zero(),
            calldata: Vec::new(),
            callvalue: Word::zero(),
            gas: 1_000_000,
            codesize: code.len(),
        };
        Emulator::new(handler, code.to_vec(), disassemble(code), callinfo, storage, 1_000_000, 0)
    }

    #[test]
    fn jump_to_non_jumpdest_is_an_exceptional_halt() {
        // PUSH1 0x02, JUMP, (0x00 is not a JUMPDEST)
        let mut emu = emulator_for(&[0x60, 0x02, 0x56, 0x00]);
        let result = emu.run().unwrap();
        assert!(!result.success);
    }

    #[test]
    fn jump_to_jumpdest_continues_execution() {
        // PUSH1 0x04, JUMP, STOP(skipped), JUMPDEST, STOP
        let mut emu = emulator_for(&[0x60, 0x04, 0x56, 0x00, 0x5b, 0x00]);
        let result = emu.run().unwrap();
        assert!(result.success);
        assert_eq!(result.last_opcode.as_deref(), Some("STOP"));
    }

    #[test]
    fn sstore_then_sload_round_trips_in_the_same_frame() {
        // PUSH1 7, PUSH1 1, SSTORE, PUSH1 1, SLOAD
        let mut emu = emulator_for(&[0x60, 0x07, 0x60, 0x01, 0x55, 0x60, 0x01, 0x54]);
        emu.run().unwrap();
        assert_eq!(emu.state.stack, vec![Word::from(7u8)]);
    }
}
