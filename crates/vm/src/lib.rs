//! A concrete, call-depth recursive EVM interpreter built to classify a
//! contract's behavior rather than to execute consensus-accurate
//! transactions: gas is tracked but never enforced, block-context values
//! are explorer-sourced stand-ins, and every opcode whose concrete value
//! can't be modeled faithfully is recorded rather than guessed at.
//!
//! Mirrors the role `ethrex-levm` plays in the teacher's workspace — a
//! standalone interpreter crate depended on by the code that drives it —
//! but the frame model here is the original's recursive "spawn a nested
//! machine per call" rather than an explicit callframe stack, since the
//! classifier only needs the per-frame record a nested run produces.

pub mod disassembler;
pub mod emulator;
pub mod errors;
pub mod handler;
pub mod memory;
pub mod opcodes;
pub mod state;
pub mod storage;

pub use disassembler::{disassemble, Disassembly, Instruction};
pub use emulator::Emulator;
pub use errors::{ExceptionalHalt, HaltReason, InternalError, OpcodeResult, VMError};
pub use handler::Handler;
pub use state::{CallInfo, DelegateRecord, EmulationResult, VMState};
pub use storage::Storage;
