//! Backward stack-slot tracing (spec.md §4.7, component C11): a direct
//! idiomatic port of `AdvCheck.py::BackwardAnalyzer.trace_op_input`,
//! including its `ConcreteWord`/`HashedWord` split.

use std::collections::HashSet;

use proxyscope_common::Word;

use crate::cfg::Cfg;

/// The statically-resolved origin of a stack slot, spec.md §3's "Word
/// variant (static analyzer only)".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracedWord {
    /// A value known at analysis time, e.g. directly from a `PUSH`.
    Concrete(Word),
    /// A keccak digest of something whose inputs couldn't be resolved.
    Hashed,
}

/// Walks predecessor instructions backward from `(start_pc, stack_index)`
/// until the value's origin is found or lost. `stack_index` is 1-based
/// from the top, matching the source's convention.
pub fn trace(cfg: &Cfg, start_pc: usize, stack_index: usize) -> Option<TracedWord> {
    let mut visited = HashSet::new();
    trace_inner(cfg, start_pc, stack_index, &mut visited)
}

fn trace_inner(
    cfg: &Cfg,
    start_pc: usize,
    stack_index: usize,
    visited: &mut HashSet<usize>,
) -> Option<TracedWord> {
    let block = cfg.block_at(block_start_containing(cfg, start_pc)?)?;
    let instructions = &cfg.disassembly.instructions[block.instruction_range.clone()];

    // Walk backward from the instruction immediately preceding `start_pc`
    // within this block.
    let mut index_in_block = instructions.iter().position(|i| i.pc == start_pc)?;
    let mut stack_index = stack_index;

    while index_in_block > 0 {
        index_in_block -= 1;
        let instruction = &instructions[index_in_block];

        if instruction.name.starts_with("PUSH") && stack_index == 1 {
            return Some(TracedWord::Concrete(Word::from_big_endian(&instruction.operand)));
        }
        if instruction.name == "SHA3" && stack_index == 1 {
            return Some(TracedWord::Hashed);
        }
        if let Some(n) = dup_n(&instruction.name) {
            if stack_index == 1 {
                stack_index = n + 1;
            }
            continue;
        }
        if let Some(n) = swap_n(&instruction.name) {
            if stack_index == 1 {
                stack_index = n + 1;
            } else if stack_index == n + 1 {
                stack_index = 1;
            }
            continue;
        }
        // Any other instruction shifts the tracked slot by its net stack
        // effect (pops − pushes) and we keep walking backward — this is a
        // heuristic, not a fully sound data-flow analysis: it can in
        // principle walk "through" a computed value (e.g. past an `ADD`)
        // as if it were a pass-through slot. That mirrors the original
        // tracer's behavior exactly; soundness is only guaranteed (and
        // only claimed) for slots produced directly by a `PUSH`/`SHA3`.
        let net = i64::from(instruction.pushes) - i64::from(instruction.pops);
        let adjusted = stack_index as i64 - net;
        if adjusted < 1 {
            return None;
        }
        stack_index = adjusted as usize;
    }

    // Ran off the start of the block: recurse into predecessors, guarding
    // against cycles, and return the first non-unknown result.
    if !visited.insert(block.start_offset) {
        return None;
    }
    let preds = cfg.predecessors.get(&block.start_offset).cloned().unwrap_or_default();
    for pred_start in preds {
        let pred_block = cfg.block_at(pred_start)?;
        let last_instruction = &cfg.disassembly.instructions[pred_block.instruction_range.end - 1];
        if let Some(found) = trace_inner(cfg, last_instruction.pc, stack_index, visited) {
            return Some(found);
        }
    }
    None
}

fn block_start_containing(cfg: &Cfg, pc: usize) -> Option<usize> {
    cfg.blocks.iter().find(|b| pc >= b.start_offset && pc < b.end_offset).map(|b| b.start_offset)
}

fn dup_n(name: &str) -> Option<u8> {
    name.strip_prefix("DUP")?.parse().ok()
}

fn swap_n(name: &str) -> Option<u8> {
    name.strip_prefix("SWAP")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxyscope_vm::disassemble;

    #[test]
    fn traces_a_push_immediate_on_straight_line_code() {
        // PUSH1 0x2a, PUSH1 0x00, SSTORE
        let code = [0x60, 0x2a, 0x60, 0x00, 0x55];
        let d = disassemble(&code);
        let cfg = Cfg::build(&d);
        // SSTORE is at pc=4; its key (stack_index 1) is the operand of the
        // PUSH1 0x00 immediately before it.
        let result = trace(&cfg, 4, 1);
        assert_eq!(result, Some(TracedWord::Concrete(Word::from(0u8))));
    }

    #[test]
    fn traces_the_value_argument_at_stack_index_2() {
        let code = [0x60, 0x2a, 0x60, 0x00, 0x55];
        let d = disassemble(&code);
        let cfg = Cfg::build(&d);
        let result = trace(&cfg, 4, 2);
        assert_eq!(result, Some(TracedWord::Concrete(Word::from(0x2au8))));
    }

    #[test]
    fn sha3_produced_key_is_hashed() {
        // PUSH1 0, PUSH1 0, SHA3, PUSH1 0, SLOAD
        let code = [0x60, 0x00, 0x60, 0x00, 0x20, 0x60, 0x00, 0x54];
        let d = disassemble(&code);
        let cfg = Cfg::build(&d);
        let result = trace(&cfg, 7, 1);
        assert_eq!(result, Some(TracedWord::Hashed));
    }

    #[test]
    fn dup_resets_the_tracked_slot() {
        // PUSH1 9, DUP1, POP, SLOAD  -> SLOAD's key should trace to 9
        let code = [0x60, 0x09, 0x80, 0x50, 0x54];
        let d = disassemble(&code);
        let cfg = Cfg::build(&d);
        let result = trace(&cfg, 4, 1);
        assert_eq!(result, Some(TracedWord::Concrete(Word::from(9u8))));
    }
}
