//! Control-flow graph construction (spec.md §4.6, component C10), grounded
//! in `AdvCheck.py::BackwardAnalyzer.__init__`'s `evm_cfg_builder`-style
//! basic-block pass plus its `_cfg_back` reverse-edge map, both built in
//! one linear scan over the instruction stream.

use std::collections::HashMap;

use proxyscope_vm::disassembler::{Disassembly, Instruction};

/// A maximal straight-line run of instructions: starts after a
/// flow-altering instruction or at a `JUMPDEST`, ends at one (inclusive).
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub start_offset: usize,
    pub end_offset: usize,
    /// Indices into the owning [`Cfg`]'s instruction slice, not a private
    /// copy — blocks are views over the disassembly.
    pub instruction_range: std::ops::Range<usize>,
    pub outgoing_edges: Vec<usize>,
}

fn is_block_terminator(name: &str) -> bool {
    matches!(name, "JUMP" | "JUMPI" | "STOP" | "RETURN" | "REVERT" | "INVALID" | "SELFDESTRUCT")
}

/// The basic-block graph for one bytecode blob, plus the reverse-edge
/// (predecessor) map the backward tracer walks.
pub struct Cfg<'a> {
    pub disassembly: &'a Disassembly,
    pub blocks: Vec<BasicBlock>,
    /// offset of a block's first instruction → block index.
    block_index_by_offset: HashMap<usize, usize>,
    /// offset of a block's first instruction → offsets of predecessor
    /// blocks' first instructions.
    pub predecessors: HashMap<usize, Vec<usize>>,
}

impl<'a> Cfg<'a> {
    pub fn build(disassembly: &'a Disassembly) -> Self {
        let instructions = &disassembly.instructions;
        let mut blocks = Vec::new();
        let mut block_index_by_offset = HashMap::new();

        let mut start = 0usize;
        for i in 0..instructions.len() {
            let at_terminator = is_block_terminator(&instructions[i].name);
            let next_is_new_block = instructions
                .get(i + 1)
                .map(|next| disassembly.valid_jumpdests.contains(&next.pc))
                .unwrap_or(false);
            if at_terminator || next_is_new_block || i + 1 == instructions.len() {
                let block_index = blocks.len();
                let start_offset = instructions[start].pc;
                let end_offset = instructions[i].next_pc();
                block_index_by_offset.insert(start_offset, block_index);
                blocks.push(BasicBlock {
                    start_offset,
                    end_offset,
                    instruction_range: start..(i + 1),
                    outgoing_edges: Vec::new(),
                });
                start = i + 1;
            }
        }

        let mut cfg = Self { disassembly, blocks, block_index_by_offset, predecessors: HashMap::new() };
        cfg.link_edges();
        cfg
    }

    fn link_edges(&mut self) {
        let instructions = &self.disassembly.instructions;
        let block_starts: Vec<usize> = self.blocks.iter().map(|b| b.start_offset).collect();

        for i in 0..self.blocks.len() {
            let last_index = self.blocks[i].instruction_range.end - 1;
            let last = &instructions[last_index];
            let fall_through = self.blocks[i].end_offset;

            let mut targets = Vec::new();
            match last.name.as_str() {
                "JUMP" | "JUMPI" => {
                    // a jump target is only known when the immediately
                    // preceding instruction is a PUSH (spec.md §4.6);
                    // anything else is a symbolic jump the CFG can't fold.
                    if last_index > 0 {
                        let push = &instructions[last_index - 1];
                        if push.name.starts_with("PUSH") {
                            let target_word = proxyscope_common::U256::from_big_endian(&push.operand);
                            if target_word <= proxyscope_common::U256::from(usize::MAX) {
                                let target = target_word.as_usize();
                                if self.block_index_by_offset.contains_key(&target) {
                                    targets.push(target);
                                }
                            }
                        }
                    }
                    if last.name == "JUMPI" && block_starts.contains(&fall_through) {
                        targets.push(fall_through);
                    }
                }
                "STOP" | "RETURN" | "REVERT" | "INVALID" | "SELFDESTRUCT" => {}
                _ => {
                    if block_starts.contains(&fall_through) {
                        targets.push(fall_through);
                    }
                }
            }

            self.blocks[i].outgoing_edges = targets.clone();
            for target in targets {
                self.predecessors.entry(target).or_default().push(self.blocks[i].start_offset);
            }
        }
    }

    pub fn block_at(&self, offset: usize) -> Option<&BasicBlock> {
        self.block_index_by_offset.get(&offset).map(|&i| &self.blocks[i])
    }

    pub fn instruction_at(&self, offset: usize) -> Option<&Instruction> {
        self.disassembly.at(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxyscope_vm::disassemble;

    #[test]
    fn straight_line_code_is_a_single_block() {
        let code = [0x60, 0x01, 0x60, 0x02, 0x01, 0x00]; // PUSH1 1, PUSH1 2, ADD, STOP
        let d = disassemble(&code);
        let cfg = Cfg::build(&d);
        assert_eq!(cfg.blocks.len(), 1);
    }

    #[test]
    fn jumpdest_starts_a_new_block() {
        // PUSH1 3, JUMP, JUMPDEST, STOP
        let code = [0x60, 0x03, 0x56, 0x5b, 0x00];
        let d = disassemble(&code);
        let cfg = Cfg::build(&d);
        assert_eq!(cfg.blocks.len(), 2);
        assert_eq!(cfg.blocks[0].outgoing_edges, vec![3]);
        assert_eq!(cfg.predecessors.get(&3), Some(&vec![0]));
    }

    #[test]
    fn symbolic_jump_has_no_resolved_successor() {
        // PUSH1 0, MLOAD, JUMP (target isn't a PUSH-immediate)
        let code = [0x60, 0x00, 0x51, 0x56];
        let d = disassemble(&code);
        let cfg = Cfg::build(&d);
        assert!(cfg.blocks[0].outgoing_edges.is_empty());
    }
}
