//! The per-frame state tuple (spec.md §3 `VMState`, `CallInfo`,
//! `DelegateRecord`, `EmulationResult`), grounded in `vmstate.py`'s
//! `EthereumVMstate` and the call-metadata fields `emulator.py::Handler`
//! thread through every nested call.

use std::collections::HashSet;

use proxyscope_common::{Address, Word};

use crate::errors::{ExceptionalHalt, HaltReason};
use crate::memory::Memory;
use crate::storage::Storage;

/// Stack discipline limit shared with the teacher's `levm` (`1024` is the
/// consensus EVM stack depth, kept here purely as a sanity bound since
/// nothing enforces consensus gas against it).
pub const STACK_LIMIT: usize = 1024;

/// The call parameters a frame runs against (spec.md §3 `CallInfo`).
/// `storage_address` differs from `address` for `DELEGATECALL`/
/// `CALLCODE`, where the callee's code runs against the *caller's*
/// storage.
#[derive(Debug, Clone)]
pub struct CallInfo {
    pub address: Address,
    pub caller: Address,
    pub origin: Address,
    pub storage_address: Address,
    pub calldata: Vec<u8>,
    pub callvalue: Word,
    pub gas: u64,
    pub codesize: usize,
}

/// One `DELEGATECALL` observed during emulation, recorded on the *outer*
/// frame regardless of how deeply it's nested under further delegatecalls.
#[derive(Debug, Clone)]
pub struct DelegateRecord {
    pub callinfo: CallInfo,
    pub arg_offset: usize,
    pub arg_length: usize,
    pub call_result: Option<HaltReason>,
    pub nested: Vec<DelegateRecord>,
}

/// The outcome of running one top-level or nested frame to completion.
#[derive(Debug, Clone, Default)]
pub struct EmulationResult {
    pub last_opcode: Option<String>,
    pub return_data: Vec<u8>,
    pub success: bool,
    /// Populated when a `CALL`/`DELEGATECALL`/`STATICCALL`/`CALLCODE`
    /// target halted without reaching `RETURN`/`REVERT` — the outer frame
    /// records the stranded sub-call instead of propagating a hard error.
    pub unresolved_call: Option<(CallInfo, Option<HaltReason>)>,
    pub delegate_records: Vec<DelegateRecord>,
    pub inconcrete_opcodes: HashSet<String>,
}

/// The mutable state of one interpreter frame: stack, memory, storage
/// handle, program counter, remaining gas, and the last instruction name
/// dispatched (used for post-mortem halt classification).
pub struct VMState {
    pub stack: Vec<Word>,
    pub memory: Memory,
    pub storage: Storage,
    pub pc: usize,
    pub gas: u64,
    pub last_instruction: Option<String>,
}

impl VMState {
    pub fn new(storage: Storage, gas: u64) -> Self {
        Self {
            stack: Vec::new(),
            memory: Memory::new(),
            storage,
            pc: 0,
            gas,
            last_instruction: None,
        }
    }

    pub fn push(&mut self, value: Word) -> Result<(), ExceptionalHalt> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(ExceptionalHalt::StackOverflow { size: self.stack.len() + 1 });
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Word, ExceptionalHalt> {
        self.stack
            .pop()
            .ok_or(ExceptionalHalt::StackUnderflow { needed: 1, available: 0 })
    }

    /// 1-based peek from the top, used by `DUP_n`/`SWAP_n` and by the
    /// backward tracer's stack-index bookkeeping.
    pub fn peek(&self, depth_from_top: usize) -> Result<Word, ExceptionalHalt> {
        let len = self.stack.len();
        if depth_from_top == 0 || depth_from_top > len {
            return Err(ExceptionalHalt::StackUnderflow {
                needed: depth_from_top,
                available: len,
            });
        }
        Ok(self.stack[len - depth_from_top])
    }

    pub fn swap_top(&mut self, depth_from_top: usize) -> Result<(), ExceptionalHalt> {
        let len = self.stack.len();
        if depth_from_top == 0 || depth_from_top > len {
            return Err(ExceptionalHalt::StackUnderflow {
                needed: depth_from_top,
                available: len,
            });
        }
        self.stack.swap(len - 1, len - depth_from_top);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxyscope_common::{BlockTag, MockExplorer};
    use std::sync::Arc;

    fn state() -> VMState {
        VMState::new(Storage::new(Arc::new(MockExplorer::new()), BlockTag::Latest), 1_000_000)
    }

    #[test]
    fn push_respects_the_stack_limit() {
        let mut s = state();
        for i in 0..STACK_LIMIT {
            s.push(Word::from(i)).unwrap();
        }
        assert!(matches!(s.push(Word::from(0)), Err(ExceptionalHalt::StackOverflow { .. })));
    }

    #[test]
    fn pop_on_empty_stack_underflows() {
        let mut s = state();
        assert!(matches!(s.pop(), Err(ExceptionalHalt::StackUnderflow { .. })));
    }

    #[test]
    fn peek_and_swap_are_1_indexed_from_top() {
        let mut s = state();
        s.push(Word::from(1)).unwrap();
        s.push(Word::from(2)).unwrap();
        s.push(Word::from(3)).unwrap();
        assert_eq!(s.peek(1).unwrap(), Word::from(3));
        s.swap_top(3).unwrap();
        assert_eq!(s.stack, vec![Word::from(3), Word::from(2), Word::from(1)]);
    }
}
