//! `RETURN`/`REVERT`/`SELFDESTRUCT`/`CREATE`/`CREATE2`/`CALL`/`CALLCODE`/
//! `DELEGATECALL`/`STATICCALL` (spec.md §4.4 system group, component C6's
//! call-spawning side).

use proxyscope_common::{word_to_address, Word};

use super::Emulator;
use crate::disassembler::Instruction;
use crate::errors::{HaltReason, OpcodeResult, VMError};
use crate::handler::call_succeeded;
use crate::memory::word_to_offset;
use crate::state::{CallInfo, DelegateRecord};

pub fn dispatch(emu: &mut Emulator, instruction: &Instruction) -> Result<OpcodeResult, VMError> {
    match instruction.name.as_str() {
        "RETURN" => {
            let offset = word_to_offset(emu.state.pop()?)?;
            let size = word_to_offset(emu.state.pop()?)?;
            let data = emu.state.memory.load_range(offset, size)?;
            return Ok(OpcodeResult::Halt(HaltReason::Return(data)));
        }
        "REVERT" => {
            let offset = word_to_offset(emu.state.pop()?)?;
            let size = word_to_offset(emu.state.pop()?)?;
            let data = emu.state.memory.load_range(offset, size)?;
            return Ok(OpcodeResult::Halt(HaltReason::Revert(data)));
        }
        "SELFDESTRUCT" => {
            emu.state.pop()?;
            return Ok(OpcodeResult::Halt(HaltReason::SelfDestruct));
        }
        "CREATE" => {
            emu.mark_inconcrete("CREATE");
            return create(emu, false);
        }
        "CREATE2" => {
            emu.mark_inconcrete("CREATE2");
            return create(emu, true);
        }
        "CALL" => return call(emu, CallKind::Call),
        "CALLCODE" => return call(emu, CallKind::CallCode),
        "DELEGATECALL" => return call(emu, CallKind::DelegateCall),
        "STATICCALL" => return call(emu, CallKind::StaticCall),
        _ => unreachable!("system dispatch received {}", instruction.name),
    }
}

fn create(emu: &mut Emulator, is_create2: bool) -> Result<OpcodeResult, VMError> {
    let value = emu.state.pop()?;
    let offset = word_to_offset(emu.state.pop()?)?;
    let size = word_to_offset(emu.state.pop()?)?;
    if is_create2 {
        // salt is popped but, matching `emulator.py::Handler.create`, never
        // used to derive the address: a synthetic counter is used instead.
        emu.state.pop()?;
    }
    let init_code = emu.state.memory.load_range(offset, size)?;

    let callinfo = CallInfo {
        address: emu.callinfo.address,
        caller: emu.callinfo.address,
        origin: emu.callinfo.origin,
        storage_address: emu.callinfo.address,
        calldata: Vec::new(),
        callvalue: value,
        gas: emu.state.gas,
        codesize: init_code.len(),
    };

    let (success, address) = emu.handler.create(
        &emu.handler.clone(),
        callinfo,
        init_code,
        emu.state.storage.clone(),
        emu.state.gas,
        emu.depth + 1,
    )?;

    let pushed = if success {
        address.map(proxyscope_common::address_to_word).unwrap_or_default()
    } else {
        Word::zero()
    };
    emu.state.push(pushed)?;
    Ok(OpcodeResult::Continue)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}

fn call(emu: &mut Emulator, kind: CallKind) -> Result<OpcodeResult, VMError> {
    let _gas_requested = emu.state.pop()?;
    let target = word_to_address(emu.state.pop()?);
    let value = if kind == CallKind::Call || kind == CallKind::CallCode {
        emu.state.pop()?
    } else {
        Word::zero()
    };
    let arg_offset = word_to_offset(emu.state.pop()?)?;
    let arg_length = word_to_offset(emu.state.pop()?)?;
    let ret_offset = word_to_offset(emu.state.pop()?)?;
    let ret_length = word_to_offset(emu.state.pop()?)?;

    let calldata = emu.state.memory.load_range(arg_offset, arg_length)?;

    let callinfo = match kind {
        CallKind::Call | CallKind::StaticCall => CallInfo {
            address: target,
            caller: emu.callinfo.address,
            origin: emu.callinfo.origin,
            storage_address: target,
            calldata: calldata.clone(),
            callvalue: value,
            gas: emu.state.gas,
            codesize: 0,
        },
        CallKind::CallCode => CallInfo {
            address: target,
            caller: emu.callinfo.address,
            origin: emu.callinfo.origin,
            storage_address: emu.callinfo.storage_address,
            calldata: calldata.clone(),
            callvalue: value,
            gas: emu.state.gas,
            codesize: 0,
        },
        CallKind::DelegateCall => CallInfo {
            address: target,
            caller: emu.callinfo.caller,
            origin: emu.callinfo.origin,
            storage_address: emu.callinfo.storage_address,
            calldata: calldata.clone(),
            callvalue: emu.callinfo.callvalue,
            gas: emu.state.gas,
            codesize: 0,
        },
    };

    let result = emu.handler.call(
        &emu.handler.clone(),
        callinfo.clone(),
        emu.state.storage.clone(),
        emu.state.gas,
        emu.depth + 1,
    )?;

    let resolved = match result.last_opcode.as_deref() {
        Some("RETURN") => Some(HaltReason::Return(result.return_data.clone())),
        Some("REVERT") => Some(HaltReason::Revert(result.return_data.clone())),
        _ => None,
    };
    // corrected `{RETURN, REVERT}` set-membership test (spec.md §9 open
    // question) — the original's single-string comparison never matched.
    let succeeded = matches!(&resolved, Some(h) if call_succeeded(h));

    // The delegate record is appended unconditionally, even when the
    // target never reached RETURN/REVERT: a logic contract that merely
    // STOPs is still evidence this is a delegating proxy, and dropping
    // the record here would make `classify` miss it entirely.
    if kind == CallKind::DelegateCall {
        emu.delegate_records.push(DelegateRecord {
            callinfo: callinfo.clone(),
            arg_offset,
            arg_length,
            call_result: if succeeded { resolved.clone() } else { None },
            nested: result.delegate_records.clone(),
        });
    }

    let halt = match resolved {
        Some(h) if succeeded => h,
        _ => {
            emu.unresolved_call = Some((callinfo.clone(), None));
            return Ok(OpcodeResult::Halt(HaltReason::CallUnresolved));
        }
    };

    emu.inconcrete_opcodes.extend(result.inconcrete_opcodes);
    emu.delegate_records.extend(if kind == CallKind::DelegateCall {
        Vec::new()
    } else {
        result.delegate_records
    });

    emu.last_return_data = halt.output().to_vec();
    let output = halt.output().to_vec();
    let copy_len = ret_length.min(output.len());
    if copy_len > 0 {
        emu.state.memory.store_range(ret_offset, &output[..copy_len])?;
    }

    let success = matches!(halt, HaltReason::Return(_));
    emu.state.push(if success { Word::from(1u8) } else { Word::zero() })?;
    Ok(OpcodeResult::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::disassemble;
    use crate::emulator::Emulator;
    use crate::handler::Handler;
    use crate::state::CallInfo as VmCallInfo;
    use crate::storage::Storage;
    use proxyscope_common::{Address, BlockTag, MockExplorer};
    use std::sync::Arc;

    fn run(code: &[u8], explorer: MockExplorer) -> crate::state::EmulationResult {
        let explorer = Arc::new(explorer);
        let handler = Arc::new(Handler::new(explorer.clone(), BlockTag::Latest));
        let storage = Storage::new(explorer, BlockTag::Latest);
        let callinfo = VmCallInfo {
            address: Address::zero(),
            caller: Address::zero(),
            origin: Address::zero(),
            storage_address: Address::zero(),
            calldata: Vec::new(),
            callvalue: Word::zero(),
            gas: 1_000_000,
            codesize: code.len(),
        };
        let mut emu = Emulator::new(
            handler,
            code.to_vec(),
            disassemble(code),
            callinfo,
            storage,
            1_000_000,
            0,
        );
        emu.run().unwrap()
    }

    #[test]
    fn delegatecall_to_a_stopping_target_is_recorded_but_unresolved() {
        let target = Address::from_low_u64_be(0x42);
        // PUSH0 x4 (retLen,retOff,argLen,argOff), PUSH20 target, PUSH2 gas, DELEGATECALL
        let mut code = vec![0x5f, 0x5f, 0x5f, 0x5f];
        code.push(0x73); // PUSH20
        code.extend_from_slice(target.as_bytes());
        code.push(0x61); // PUSH2
        code.extend_from_slice(&[0xff, 0xff]);
        code.push(0xf4); // DELEGATECALL
        let explorer = MockExplorer::new().with_code(target, vec![0x00]); // STOP
        let result = run(&code, explorer);
        assert!(!result.success);
        assert_eq!(result.last_opcode.as_deref(), Some("CALL_UNRESOLVED"));
        assert_eq!(result.delegate_records.len(), 1);
        assert_eq!(result.delegate_records[0].callinfo.address, target);
        assert!(result.delegate_records[0].call_result.is_none());
    }

    #[test]
    fn delegatecall_to_a_returning_target_is_recorded_as_a_delegate() {
        let target = Address::from_low_u64_be(0x42);
        let mut code = vec![0x5f, 0x5f, 0x5f, 0x5f];
        code.push(0x73);
        code.extend_from_slice(target.as_bytes());
        code.push(0x61);
        code.extend_from_slice(&[0xff, 0xff]);
        code.push(0xf4); // DELEGATECALL
        // target: PUSH1 0, PUSH1 0, RETURN
        let explorer = MockExplorer::new().with_code(target, vec![0x60, 0x00, 0x60, 0x00, 0xf3]);
        let result = run(&code, explorer);
        assert_eq!(result.delegate_records.len(), 1);
        assert_eq!(result.delegate_records[0].callinfo.address, target);
    }
}
