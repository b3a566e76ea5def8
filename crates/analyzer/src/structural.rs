//! Structural collision analysis (spec.md §4.10, component C12): a direct
//! port of `AdvCheck.py::check_advanced` and its `find_selectors`/
//! `find_storage_access` helpers.

use std::collections::HashSet;

use proxyscope_common::Word;
use proxyscope_vm::disassemble;

use crate::cfg::Cfg;
use crate::tracer::{self, TracedWord};

/// The slot/selector facts extracted from one contract's bytecode.
#[derive(Debug, Clone, Default)]
pub struct ContractFacts {
    pub read_slots: HashSet<Word>,
    pub written_slots: HashSet<Word>,
    pub selectors: HashSet<u32>,
}

/// Walks every instruction in `code`, resolving `SLOAD`/`SSTORE` keys via
/// the backward tracer and collecting every `PUSH4` operand as a
/// candidate function selector.
pub fn analyze_contract(code: &[u8]) -> ContractFacts {
    let disassembly = disassemble(code);
    let cfg = Cfg::build(&disassembly);
    let mut facts = ContractFacts::default();

    for instruction in &disassembly.instructions {
        match instruction.name.as_str() {
            "SLOAD" | "SSTORE" => {
                if let Some(TracedWord::Concrete(slot)) = tracer::trace(&cfg, instruction.pc, 1) {
                    if instruction.name == "SLOAD" {
                        facts.read_slots.insert(slot);
                    } else {
                        facts.written_slots.insert(slot);
                    }
                }
            }
            "PUSH4" => {
                let mut padded = [0u8; 4];
                let len = instruction.operand.len().min(4);
                padded[4 - len..].copy_from_slice(&instruction.operand[instruction.operand.len() - len..]);
                let selector = u32::from_be_bytes(padded);
                if selector != 0xFFFF_FFFF {
                    facts.selectors.insert(selector);
                }
            }
            _ => {}
        }
    }
    facts
}

/// The four storage-slot intersections and per-logic selector collisions
/// spec.md §4.10 asks for, computed proxy-vs-*current* logic contract
/// only — matching `check_advanced`'s use of `logic_slots[-1]`, the last
/// element of the supplied (old-then-current) logic address list — while
/// selectors are still collected for every logic contract supplied.
pub struct StructuralAnalysis {
    pub proxy: ContractFacts,
    /// One [`ContractFacts`] per logic contract, in the order supplied.
    pub logics: Vec<ContractFacts>,
    pub slots_read_read: HashSet<Word>,
    pub slots_read_write: HashSet<Word>,
    pub slots_write_read: HashSet<Word>,
    pub slots_write_write: HashSet<Word>,
    /// `colliding_signatures[i]` is `logics[i].selectors ∩ proxy.selectors`.
    pub colliding_signatures: Vec<HashSet<u32>>,
}

pub fn analyze(proxy_code: &[u8], logic_codes: &[Vec<u8>]) -> StructuralAnalysis {
    let proxy = analyze_contract(proxy_code);
    let logics: Vec<ContractFacts> = logic_codes.iter().map(|c| analyze_contract(c)).collect();

    let colliding_signatures =
        logics.iter().map(|l| l.selectors.intersection(&proxy.selectors).copied().collect()).collect();

    let current = logics.last();
    let (slots_read_read, slots_read_write, slots_write_read, slots_write_write) = match current {
        Some(current) => (
            proxy.read_slots.intersection(&current.read_slots).copied().collect(),
            proxy.read_slots.intersection(&current.written_slots).copied().collect(),
            proxy.written_slots.intersection(&current.read_slots).copied().collect(),
            proxy.written_slots.intersection(&current.written_slots).copied().collect(),
        ),
        None => Default::default(),
    };

    StructuralAnalysis {
        proxy,
        logics,
        slots_read_read,
        slots_read_write,
        slots_write_read,
        slots_write_write,
        colliding_signatures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_ignore_the_ffffffff_sentinel() {
        // PUSH4 0xFFFFFFFF, PUSH4 0x12345678, STOP
        let mut code = vec![0x63, 0xff, 0xff, 0xff, 0xff];
        code.extend_from_slice(&[0x63, 0x12, 0x34, 0x56, 0x78]);
        code.push(0x00);
        let facts = analyze_contract(&code);
        assert_eq!(facts.selectors, HashSet::from([0x1234_5678]));
    }

    #[test]
    fn shared_slot_between_proxy_and_current_logic_collides() {
        // both: PUSH1 0, PUSH1 5, SSTORE
        let code = vec![0x60, 0x00, 0x60, 0x05, 0x55];
        let analysis = analyze(&code, &[code.clone()]);
        assert_eq!(analysis.slots_write_write, HashSet::from([Word::zero()]));
    }

    #[test]
    fn no_logic_contracts_yields_empty_intersections() {
        let code = vec![0x00];
        let analysis = analyze(&code, &[]);
        assert!(analysis.slots_read_read.is_empty());
        assert!(analysis.logics.is_empty());
    }
}
