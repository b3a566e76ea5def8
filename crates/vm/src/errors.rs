//! Error taxonomy for the interpreter, split along the same fatal/non-fatal
//! line the original `emulator.py` draws implicitly: running out of gas or
//! hitting a malformed stack access halts only the current call frame
//! (folded into an [`crate::state::EmulationResult`]), while a transport
//! failure talking to the chain, or a bug in our own disassembly, aborts
//! the whole classification.

use proxyscope_common::ExplorerError;

/// A condition that stops execution of the *current* call frame. Caught by
/// [`crate::handler::Emulator::run`] and turned into a halted
/// [`crate::state::EmulationResult`] rather than propagated past it — a
/// proxy that reverts partway through is still a proxy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExceptionalHalt {
    #[error("stack underflow: need {needed} items, have {available}")]
    StackUnderflow { needed: usize, available: usize },

    #[error("stack overflow: {size} exceeds the 1024-item limit")]
    StackOverflow { size: usize },

    #[error("memory offset {0} exceeds the analysis memory bound")]
    MemoryBound(usize),

    #[error("invalid jump destination {0:#x}")]
    InvalidJumpDest(usize),

    #[error("encountered INVALID opcode {0:#04x}")]
    InvalidOpcode(u8),

    #[error("call depth {0} exceeds the maximum recursion depth")]
    CallDepthExceeded(usize),
}

/// A bug in disassembly or opcode dispatch that should never happen against
/// well-formed bytecode: these propagate out of the whole classification,
/// since continuing would mean guessing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternalError {
    #[error("program counter {0} out of bounds for {1}-byte bytecode")]
    PcOutOfBounds(usize, usize),

    #[error("opcode dispatch reached an unreachable category for {0:#04x}")]
    UnreachableCategory(u8),
}

/// The error type threaded through every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum VMError {
    #[error("exceptional halt: {0}")]
    ExceptionalHalt(#[from] ExceptionalHalt),

    #[error("explorer: {0}")]
    Explorer(#[from] ExplorerError),

    #[error("internal: {0}")]
    Internal(#[from] InternalError),
}

/// The outcome of dispatching a single instruction: either execution keeps
/// going, or the frame halts (normally or exceptionally) with output bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpcodeResult {
    Continue,
    Halt(HaltReason),
}

/// Why a call frame stopped running instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// `STOP`: success, no return data.
    Stop,
    /// `RETURN`: success, with return data.
    Return(Vec<u8>),
    /// `REVERT`: failure, with revert data.
    Revert(Vec<u8>),
    /// `SELFDESTRUCT`.
    SelfDestruct,
    /// An [`ExceptionalHalt`] was raised and caught at the frame boundary.
    Exception(ExceptionalHalt),
    /// A nested `CALL`/`CALLCODE`/`DELEGATECALL`/`STATICCALL` halted
    /// without reaching `RETURN`/`REVERT`; the outer frame records the
    /// stranded sub-call (spec.md §7 class 6) and halts itself rather
    /// than guessing at a result.
    CallUnresolved,
}

impl HaltReason {
    /// Whether the call should be treated as having produced usable output,
    /// i.e. one of the historically mismatched `{RETURN, REVERT}` outcomes
    /// the original's `"RETURN, REVERT"` string literal was meant to check.
    pub fn is_return_or_revert(&self) -> bool {
        matches!(self, HaltReason::Return(_) | HaltReason::Revert(_))
    }

    pub fn output(&self) -> &[u8] {
        match self {
            HaltReason::Return(data) | HaltReason::Revert(data) => data,
            _ => &[],
        }
    }
}
