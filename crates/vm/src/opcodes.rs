//! The fixed opcode metadata table driving both the disassembler (C2) and
//! the emulator's category dispatch (C7), mirroring the
//! `is_arithmetic`/`is_comparaison_logic`/`is_sha3`/`is_environmental`/
//! `uses_block_info`/`uses_stack_block_storage_info`/`is_system`
//! predicates of the original `EthereumDisassembler`/`emulator.py`.

/// The instruction category flags from spec.md §3's `Instruction` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Arithmetic,
    ComparisonLogic,
    Sha3,
    Environmental,
    BlockInfo,
    StackMemStorageFlow,
    Push,
    Dup,
    Swap,
    Log,
    System,
    /// `STOP` is dispatched on its own in the emulator but is otherwise an
    /// ordinary fixed-name, no-operand opcode.
    Stop,
    Unknown,
}

/// Static metadata for a single opcode: name, stack effect, nominal gas
/// fee. `PUSHn`/`DUPn`/`SWAPn`/`LOGn` names are parametrized and are
/// synthesized by the disassembler rather than stored here (see
/// [`crate::disassembler`]).
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub pops: u8,
    pub pushes: u8,
    pub fee: u64,
    pub category: Category,
}

const fn op(name: &'static str, pops: u8, pushes: u8, fee: u64, category: Category) -> OpInfo {
    OpInfo { name, pops, pushes, fee, category }
}

pub const INVALID: OpInfo = op("INVALID", 0, 0, 0, Category::Unknown);

/// Looks up metadata for a fixed-name opcode byte. Returns [`INVALID`] for
/// any byte the table doesn't recognize (including the `PUSH`/`DUP`/
/// `SWAP`/`LOG` ranges, which the disassembler handles before falling
/// back to this table).
pub fn fixed_opcode_info(byte: u8) -> OpInfo {
    use Category::*;
    match byte {
        0x00 => op("STOP", 0, 0, 0, Stop),
        0x01 => op("ADD", 2, 1, 3, Arithmetic),
        0x02 => op("MUL", 2, 1, 5, Arithmetic),
        0x03 => op("SUB", 2, 1, 3, Arithmetic),
        0x04 => op("DIV", 2, 1, 5, Arithmetic),
        0x05 => op("SDIV", 2, 1, 5, Arithmetic),
        0x06 => op("MOD", 2, 1, 5, Arithmetic),
        0x07 => op("SMOD", 2, 1, 5, Arithmetic),
        0x08 => op("ADDMOD", 3, 1, 8, Arithmetic),
        0x09 => op("MULMOD", 3, 1, 8, Arithmetic),
        0x0a => op("EXP", 2, 1, 10, Arithmetic),
        0x0b => op("SIGNEXTEND", 2, 1, 5, Arithmetic),

        0x10 => op("LT", 2, 1, 3, ComparisonLogic),
        0x11 => op("GT", 2, 1, 3, ComparisonLogic),
        0x12 => op("SLT", 2, 1, 3, ComparisonLogic),
        0x13 => op("SGT", 2, 1, 3, ComparisonLogic),
        0x14 => op("EQ", 2, 1, 3, ComparisonLogic),
        0x15 => op("ISZERO", 1, 1, 3, ComparisonLogic),
        0x16 => op("AND", 2, 1, 3, ComparisonLogic),
        0x17 => op("OR", 2, 1, 3, ComparisonLogic),
        0x18 => op("XOR", 2, 1, 3, ComparisonLogic),
        0x19 => op("NOT", 1, 1, 3, ComparisonLogic),
        0x1a => op("BYTE", 2, 1, 3, ComparisonLogic),
        0x1b => op("SHL", 2, 1, 3, ComparisonLogic),
        0x1c => op("SHR", 2, 1, 3, ComparisonLogic),
        0x1d => op("SAR", 2, 1, 3, ComparisonLogic),

        0x20 => op("SHA3", 2, 1, 30, Sha3),

        0x30 => op("ADDRESS", 0, 1, 2, Environmental),
        0x31 => op("BALANCE", 1, 1, 100, Environmental),
        0x32 => op("ORIGIN", 0, 1, 2, Environmental),
        0x33 => op("CALLER", 0, 1, 2, Environmental),
        0x34 => op("CALLVALUE", 0, 1, 2, Environmental),
        0x35 => op("CALLDATALOAD", 1, 1, 3, Environmental),
        0x36 => op("CALLDATASIZE", 0, 1, 2, Environmental),
        0x37 => op("CALLDATACOPY", 3, 0, 3, Environmental),
        0x38 => op("CODESIZE", 0, 1, 2, Environmental),
        0x39 => op("CODECOPY", 3, 0, 3, Environmental),
        0x3a => op("GASPRICE", 0, 1, 2, Environmental),
        0x3b => op("EXTCODESIZE", 1, 1, 100, Environmental),
        0x3c => op("EXTCODECOPY", 4, 0, 100, Environmental),
        0x3d => op("RETURNDATASIZE", 0, 1, 2, Environmental),
        0x3e => op("RETURNDATACOPY", 3, 0, 3, Environmental),
        0x3f => op("EXTCODEHASH", 1, 1, 100, Environmental),

        0x40 => op("BLOCKHASH", 1, 1, 20, BlockInfo),
        0x41 => op("COINBASE", 0, 1, 2, BlockInfo),
        0x42 => op("TIMESTAMP", 0, 1, 2, BlockInfo),
        0x43 => op("NUMBER", 0, 1, 2, BlockInfo),
        0x44 => op("DIFFICULTY", 0, 1, 2, BlockInfo),
        0x45 => op("GASLIMIT", 0, 1, 2, BlockInfo),
        0x46 => op("CHAINID", 0, 1, 2, BlockInfo),
        0x47 => op("SELFBALANCE", 0, 1, 5, BlockInfo),
        0x48 => op("BASEFEE", 0, 1, 2, BlockInfo),

        0x50 => op("POP", 1, 0, 2, StackMemStorageFlow),
        0x51 => op("MLOAD", 1, 1, 3, StackMemStorageFlow),
        0x52 => op("MSTORE", 2, 0, 3, StackMemStorageFlow),
        0x53 => op("MSTORE8", 2, 0, 3, StackMemStorageFlow),
        0x54 => op("SLOAD", 1, 1, 100, StackMemStorageFlow),
        0x55 => op("SSTORE", 2, 0, 100, StackMemStorageFlow),
        0x56 => op("JUMP", 1, 0, 8, StackMemStorageFlow),
        0x57 => op("JUMPI", 2, 0, 10, StackMemStorageFlow),
        0x58 => op("PC", 0, 1, 2, StackMemStorageFlow),
        0x59 => op("MSIZE", 0, 1, 2, StackMemStorageFlow),
        0x5a => op("GAS", 0, 1, 2, StackMemStorageFlow),
        0x5b => op("JUMPDEST", 0, 0, 1, StackMemStorageFlow),
        0x5f => op("PUSH0", 0, 1, 2, Push),

        0xf0 => op("CREATE", 3, 1, 32000, System),
        0xf1 => op("CALL", 7, 1, 100, System),
        0xf2 => op("CALLCODE", 7, 1, 100, System),
        0xf3 => op("RETURN", 2, 0, 0, System),
        0xf4 => op("DELEGATECALL", 6, 1, 100, System),
        0xf5 => op("CREATE2", 4, 1, 32000, System),
        0xfa => op("STATICCALL", 6, 1, 100, System),
        0xfd => op("REVERT", 2, 0, 0, System),
        0xff => op("SELFDESTRUCT", 1, 0, 5000, System),
        0xfe => INVALID,

        _ => INVALID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_byte_is_invalid() {
        assert_eq!(fixed_opcode_info(0x0c).category, Category::Unknown);
    }

    #[test]
    fn sstore_is_stack_memory_storage_flow() {
        let info = fixed_opcode_info(0x55);
        assert_eq!(info.name, "SSTORE");
        assert_eq!(info.category, Category::StackMemStorageFlow);
        assert_eq!((info.pops, info.pushes), (2, 0));
    }
}
