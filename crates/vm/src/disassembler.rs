//! Linear disassembly (spec.md component C2), grounded in the instruction
//! stream `EthereumDisassembler` builds in `emulator.py`: a straight,
//! single pass over the bytecode that special-cases the `PUSH`/`DUP`/
//! `SWAP`/`LOG` byte ranges (whose names and stack effects are
//! parametrized by the low nibble) before falling back to the fixed
//! opcode table for everything else.

use std::collections::HashSet;

use crate::opcodes::{fixed_opcode_info, Category};

/// One decoded instruction: its offset in the bytecode, the raw opcode
/// byte, a display name, and (for `PUSHn`) the operand bytes that follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub pc: usize,
    pub opcode: u8,
    pub name: String,
    pub operand: Vec<u8>,
    pub pops: u8,
    pub pushes: u8,
    pub fee: u64,
    pub category: Category,
}

impl Instruction {
    /// Offset of the first byte after this instruction (operand included).
    pub fn next_pc(&self) -> usize {
        self.pc + 1 + self.operand.len()
    }
}

/// The result of disassembling one contract's runtime bytecode: the
/// instruction stream plus the set of valid `JUMPDEST` offsets, needed so
/// the emulator can reject jumps that land inside a `PUSH` operand.
#[derive(Debug, Clone, Default)]
pub struct Disassembly {
    pub instructions: Vec<Instruction>,
    pub valid_jumpdests: HashSet<usize>,
    /// Byte offset → index into `instructions`, built in the same pass as
    /// the instruction stream (spec.md §9 design note: the source resolves
    /// every `JUMP` with an O(n) linear `next(filter(...))` scan; this map
    /// makes `at` an O(1) lookup instead).
    index_by_pc: std::collections::HashMap<usize, usize>,
}

impl Disassembly {
    /// Looks up the instruction starting exactly at `pc`, if any — used by
    /// the emulator's fetch-decode step and by the CFG builder.
    pub fn at(&self, pc: usize) -> Option<&Instruction> {
        self.index_by_pc.get(&pc).map(|&i| &self.instructions[i])
    }
}

/// Disassembles raw runtime bytecode into an instruction stream.
pub fn disassemble(code: &[u8]) -> Disassembly {
    let mut instructions = Vec::new();
    let mut valid_jumpdests = HashSet::new();
    let mut index_by_pc = std::collections::HashMap::new();
    let mut pc = 0usize;

    while pc < code.len() {
        let opcode = code[pc];
        let instruction = decode_one(code, pc, opcode);
        if opcode == 0x5b {
            valid_jumpdests.insert(pc);
        }
        index_by_pc.insert(pc, instructions.len());
        pc = instruction.next_pc();
        instructions.push(instruction);
    }

    Disassembly { instructions, valid_jumpdests, index_by_pc }
}

fn decode_one(code: &[u8], pc: usize, opcode: u8) -> Instruction {
    match opcode {
        // PUSH1..PUSH32
        0x60..=0x7f => {
            let n = (opcode - 0x5f) as usize;
            let start = pc + 1;
            let end = (start + n).min(code.len());
            let operand = code[start..end].to_vec();
            Instruction {
                pc,
                opcode,
                name: format!("PUSH{n}"),
                operand,
                pops: 0,
                pushes: 1,
                fee: 3,
                category: Category::Push,
            }
        }
        // DUP1..DUP16
        0x80..=0x8f => {
            let n = opcode - 0x7f;
            Instruction {
                pc,
                opcode,
                name: format!("DUP{n}"),
                operand: Vec::new(),
                pops: n,
                pushes: n + 1,
                fee: 3,
                category: Category::Dup,
            }
        }
        // SWAP1..SWAP16
        0x90..=0x9f => {
            let n = opcode - 0x8f;
            Instruction {
                pc,
                opcode,
                name: format!("SWAP{n}"),
                operand: Vec::new(),
                pops: n + 1,
                pushes: n + 1,
                fee: 3,
                category: Category::Swap,
            }
        }
        // LOG0..LOG4
        0xa0..=0xa4 => {
            let n = opcode - 0xa0;
            Instruction {
                pc,
                opcode,
                name: format!("LOG{n}"),
                operand: Vec::new(),
                pops: n + 2,
                pushes: 0,
                fee: 375 * (u64::from(n) + 1),
                category: Category::Log,
            }
        }
        _ => {
            let info = fixed_opcode_info(opcode);
            Instruction {
                pc,
                opcode,
                name: info.name.to_string(),
                operand: Vec::new(),
                pops: info.pops,
                pushes: info.pushes,
                fee: info.fee,
                category: info.category,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push1_consumes_its_operand() {
        // PUSH1 0x2a, STOP
        let code = [0x60, 0x2a, 0x00];
        let d = disassemble(&code);
        assert_eq!(d.instructions.len(), 2);
        assert_eq!(d.instructions[0].name, "PUSH1");
        assert_eq!(d.instructions[0].operand, vec![0x2a]);
        assert_eq!(d.instructions[1].pc, 2);
        assert_eq!(d.instructions[1].name, "STOP");
    }

    #[test]
    fn truncated_push_operand_is_zero_padded_by_absence() {
        // PUSH2 with only one trailing byte available.
        let code = [0x61, 0xaa];
        let d = disassemble(&code);
        assert_eq!(d.instructions[0].operand, vec![0xaa]);
    }

    #[test]
    fn jumpdest_is_rejected_when_inside_a_push_operand() {
        // PUSH1 0x5b (looks like JUMPDEST but is actually operand data).
        let code = [0x60, 0x5b, 0x00];
        let d = disassemble(&code);
        assert!(d.valid_jumpdests.is_empty());
    }

    #[test]
    fn dup_and_swap_stack_effects() {
        let code = [0x82, 0x91]; // DUP3, SWAP2
        let d = disassemble(&code);
        assert_eq!((d.instructions[0].pops, d.instructions[0].pushes), (3, 4));
        assert_eq!((d.instructions[1].pops, d.instructions[1].pushes), (3, 3));
    }
}
