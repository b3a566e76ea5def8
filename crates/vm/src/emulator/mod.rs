//! The interpreter loop (spec.md §4.4, component C7): fetch, dispatch,
//! repeat until halt. Opcode semantics are split into per-category
//! submodules the way the teacher splits `opcode_handlers/{arithmetic,
//! bitwise_comparison, environment, system}.rs`.

mod arithmetic;
mod block;
mod comparison;
mod environment;
mod memory_storage;
mod system;

use std::collections::HashSet;
use std::sync::Arc;

use proxyscope_common::Word;

use crate::disassembler::{Disassembly, Instruction};
use crate::errors::{ExceptionalHalt, HaltReason, OpcodeResult, VMError};
use crate::handler::Handler;
use crate::opcodes::Category;
use crate::state::{CallInfo, DelegateRecord, EmulationResult, VMState};
use crate::storage::Storage;

/// One interpreter frame: the call it's running, the code it's running
/// against, and the bookkeeping the classifier inspects once it halts.
pub struct Emulator {
    pub(crate) handler: Arc<Handler>,
    pub(crate) code: Vec<u8>,
    pub(crate) disassembly: Disassembly,
    pub(crate) callinfo: CallInfo,
    pub(crate) state: VMState,
    pub(crate) depth: usize,
    pub(crate) delegate_records: Vec<DelegateRecord>,
    pub(crate) inconcrete_opcodes: HashSet<String>,
    /// Output of the most recently completed nested call, consulted by
    /// `RETURNDATASIZE`/`RETURNDATACOPY`.
    pub(crate) last_return_data: Vec<u8>,
    pub(crate) unresolved_call: Option<(CallInfo, Option<HaltReason>)>,
}

impl Emulator {
    pub fn new(
        handler: Arc<Handler>,
        code: Vec<u8>,
        disassembly: Disassembly,
        callinfo: CallInfo,
        storage: Storage,
        gas: u64,
        depth: usize,
    ) -> Self {
        Self {
            handler,
            code,
            disassembly,
            callinfo,
            state: VMState::new(storage, gas),
            depth,
            delegate_records: Vec::new(),
            inconcrete_opcodes: HashSet::new(),
            last_return_data: Vec::new(),
            unresolved_call: None,
        }
    }

    /// Runs instructions until the frame halts. Exceptional halts (stack
    /// misuse, memory bound, bad jump, invalid opcode) are caught here and
    /// folded into the result rather than propagated — per spec.md §7,
    /// only explorer/internal failures abort the whole classification.
    pub fn run(&mut self) -> Result<EmulationResult, VMError> {
        loop {
            let Some(instruction) = self.disassembly.at(self.state.pc).cloned() else {
                return Ok(self.finish(HaltReason::Stop));
            };
            self.state.pc = instruction.next_pc();
            self.state.gas = self.state.gas.saturating_sub(instruction.fee);
            self.state.last_instruction = Some(instruction.name.clone());

            tracing::trace!(pc = instruction.pc, op = %instruction.name, "dispatch");

            match self.dispatch(&instruction) {
                Ok(OpcodeResult::Continue) => continue,
                Ok(OpcodeResult::Halt(reason)) => return Ok(self.finish(reason)),
                Err(VMError::ExceptionalHalt(halt)) => {
                    tracing::debug!(pc = instruction.pc, op = %instruction.name, %halt, "exceptional halt");
                    return Ok(self.finish(HaltReason::Exception(halt)));
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn dispatch(&mut self, instruction: &Instruction) -> Result<OpcodeResult, VMError> {
        match instruction.category {
            Category::Stop => Ok(OpcodeResult::Halt(HaltReason::Stop)),
            Category::Arithmetic => arithmetic::dispatch(self, instruction),
            Category::ComparisonLogic => comparison::dispatch(self, instruction),
            Category::Sha3 => comparison::dispatch_sha3(self),
            Category::Environmental => environment::dispatch(self, instruction),
            Category::BlockInfo => block::dispatch(self, instruction),
            Category::StackMemStorageFlow => memory_storage::dispatch(self, instruction),
            Category::Push => {
                let value = Word::from_big_endian(&instruction.operand);
                self.state.push(value)?;
                Ok(OpcodeResult::Continue)
            }
            Category::Dup => {
                let n = instruction.pops as usize;
                let value = self.state.peek(n)?;
                self.state.push(value)?;
                Ok(OpcodeResult::Continue)
            }
            Category::Swap => {
                let n = instruction.pushes as usize;
                self.state.swap_top(n)?;
                Ok(OpcodeResult::Continue)
            }
            Category::Log => {
                for _ in 0..instruction.pops {
                    self.state.pop()?;
                }
                Ok(OpcodeResult::Continue)
            }
            Category::System => system::dispatch(self, instruction),
            Category::Unknown => Err(ExceptionalHalt::InvalidOpcode(instruction.opcode).into()),
        }
    }

    /// Marks an opcode whose concrete value the emulator cannot faithfully
    /// model (spec.md §4.4's inconcrete-opcode set).
    pub(crate) fn mark_inconcrete(&mut self, name: &str) {
        self.inconcrete_opcodes.insert(name.to_string());
    }

    fn finish(&mut self, reason: HaltReason) -> EmulationResult {
        let success = matches!(reason, HaltReason::Stop | HaltReason::Return(_));
        let last_opcode = match &reason {
            HaltReason::Stop => Some("STOP".to_string()),
            HaltReason::Return(_) => Some("RETURN".to_string()),
            HaltReason::Revert(_) => Some("REVERT".to_string()),
            HaltReason::SelfDestruct => Some("SELFDESTRUCT".to_string()),
            HaltReason::Exception(_) => self.state.last_instruction.clone(),
            HaltReason::CallUnresolved => Some("CALL_UNRESOLVED".to_string()),
        };
        EmulationResult {
            last_opcode,
            return_data: reason.output().to_vec(),
            success,
            unresolved_call: self.unresolved_call.take(),
            delegate_records: std::mem::take(&mut self.delegate_records),
            inconcrete_opcodes: std::mem::take(&mut self.inconcrete_opcodes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::disassemble;
    use proxyscope_common::{Address, BlockTag, MockExplorer};

    fn run_code(code: &[u8]) -> EmulationResult {
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
    fn stop_halts_successfully_with_no_output() {
        let result = run_code(&[0x00]);
        assert!(result.success);
        assert_eq!(result.last_opcode.as_deref(), Some("STOP"));
        assert!(result.return_data.is_empty());
    }

    #[test]
    fn running_off_the_end_of_code_is_an_implicit_stop() {
        let result = run_code(&[0x60, 0x01]); // PUSH1 1, no STOP
        assert!(result.success);
    }

    #[test]
    fn invalid_opcode_halts_exceptionally_without_propagating() {
        let result = run_code(&[0xfe]);
        assert!(!result.success);
        assert_eq!(result.last_opcode.as_deref(), Some("INVALID"));
    }

    #[test]
    fn push_add_return_wraps_and_returns_data() {
        // PUSH1 1, PUSH1 1, ADD, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, RETURN
        let code = [
            0x60, 0x01, 0x60, 0x01, 0x01, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3,
        ];
        let result = run_code(&code);
        assert!(result.success);
        let mut expected = [0u8; 32];
        expected[31] = 2;
        assert_eq!(result.return_data, expected);
    }
}
