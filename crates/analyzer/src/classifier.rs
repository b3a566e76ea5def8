//! Proxy classification (spec.md §4.8, component C8): drives the
//! interpreter with a synthetic call and derives a [`ProxyClassification`]
//! from what it observes, grounded directly in `proxion/__main__.py::
//! proxy_check` and its `SLOTS` table.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use proxyscope_common::{hexutil, keccak256, word_to_address, Address, BlockTag, Explorer, Word};
use proxyscope_vm::disassembler::disassemble;
use proxyscope_vm::{CallInfo, Handler, Storage};
use serde::{Serialize, Serializer};

use crate::errors::ClassifyError;
use crate::historian::Historian;

/// Serializes as spec.md §6's 0x-prefixed 64-hex-character word, matching
/// the `adv_check` convention the CLI already uses for slot values.
fn serialize_word_opt<S: Serializer>(word: &Option<Word>, serializer: S) -> Result<S::Ok, S::Error> {
    match word {
        Some(w) => serializer.serialize_some(&hexutil::encode_word(*w)),
        None => serializer.serialize_none(),
    }
}

/// Same hex-word convention as [`serialize_word_opt`], applied to each
/// value in the standard-slot map.
fn serialize_word_map<S: Serializer>(
    map: &HashMap<String, Word>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let mut out = serializer.serialize_map(Some(map.len()))?;
    for (name, word) in map {
        out.serialize_entry(name, &hexutil::encode_word(*word))?;
    }
    out.end()
}

/// The address every synthetic probe call is made from, matching
/// `proxy_check`'s `0xcc…cc` sender/origin stand-in.
fn synthetic_caller() -> Address {
    Address::from_slice(&[0xcc; 20])
}

fn slot_from_string(label: &str) -> Word {
    Word::from_big_endian(keccak256(label.as_bytes()).as_bytes())
}

/// `keccak("PROXIABLE")`, EIP-1822's UUPS implementation slot.
static EIP1822_IMPLEMENT_SLOT: Lazy<Word> = Lazy::new(|| slot_from_string("PROXIABLE"));
// 0xc5f16f0fc...59e824811a75490a032005904cfbc

/// `keccak("eip1967.proxy.implementation") - 1`.
static ERC1967_IMPLEMENT_SLOT: Lazy<Word> =
    Lazy::new(|| slot_from_string("eip1967.proxy.implementation") - Word::from(1u8));
// 0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc

/// `keccak("eip1967.proxy.beacon") - 1`.
static ERC1967_BEACON_SLOT: Lazy<Word> =
    Lazy::new(|| slot_from_string("eip1967.proxy.beacon") - Word::from(1u8));
// 0xa3f0ad74e5423aebfd80d3ef4346578335a9a72aeaee59ff6cb3582b35133d50

/// `keccak("eip1967.proxy.admin") - 1`.
static ERC1967_ADMIN_SLOT: Lazy<Word> =
    Lazy::new(|| slot_from_string("eip1967.proxy.admin") - Word::from(1u8));
// 0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103

/// `keccak("diamond.standard.diamond.storage")`, EIP-2535's storage root.
static EIP2535_DIAMOND_SLOT: Lazy<Word> =
    Lazy::new(|| slot_from_string("diamond.standard.diamond.storage"));
// 0xc8fcad8db84d3cc18b4c41d551ea0ee66dd599cde068d998e57d5e09332c131b

static EIP2535_DIAMOND1_OWNER_SLOT: Lazy<Word> = Lazy::new(|| *EIP2535_DIAMOND_SLOT + Word::from(3u8));
static EIP2535_DIAMOND23_OWNER_SLOT: Lazy<Word> = Lazy::new(|| *EIP2535_DIAMOND_SLOT + Word::from(4u8));

/// The fixed probe table, in the order `proxy_check` checks it: name,
/// slot, and which boolean flag a non-zero read sets.
fn standard_slot_table() -> Vec<(&'static str, Word, StandardFlag)> {
    vec![
        ("EIP1822_IMPLEMENT_SLOT", *EIP1822_IMPLEMENT_SLOT, StandardFlag::Erc1822),
        ("ERC1967_IMPLEMENT_SLOT", *ERC1967_IMPLEMENT_SLOT, StandardFlag::Erc1967),
        ("ERC1967_BEACON_SLOT", *ERC1967_BEACON_SLOT, StandardFlag::Erc1967),
        ("ERC1967_ADMIN_SLOT", *ERC1967_ADMIN_SLOT, StandardFlag::Erc1967),
        ("EIP2535_DIAMOND_SLOT", *EIP2535_DIAMOND_SLOT, StandardFlag::Erc2535),
        ("EIP2535_DIAMOND1_OWNER_SLOT", *EIP2535_DIAMOND1_OWNER_SLOT, StandardFlag::Erc2535),
        ("EIP2535_DIAMOND23_OWNER_SLOT", *EIP2535_DIAMOND23_OWNER_SLOT, StandardFlag::Erc2535),
    ]
}

#[derive(Clone, Copy)]
enum StandardFlag {
    Erc1822,
    Erc1967,
    Erc2535,
}

/// spec.md §3's `ProxyClassification` result record.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyClassification {
    pub address: Address,
    pub success: bool,
    pub error: Option<String>,
    pub is_proxy: Option<bool>,
    pub erc1167: bool,
    pub erc1822: bool,
    pub erc1967: bool,
    pub erc2535: bool,
    pub multi_delegatecall: bool,
    pub reason: Option<String>,
    #[serde(serialize_with = "serialize_word_opt")]
    pub implementation_slot: Option<Word>,
    #[serde(serialize_with = "serialize_word_map")]
    pub standard_slots: HashMap<String, Word>,
    pub current_implementation: Option<Address>,
    pub old_implementations: Vec<Address>,
}

impl ProxyClassification {
    fn empty(address: Address) -> Self {
        Self {
            address,
            success: false,
            error: None,
            is_proxy: None,
            erc1167: false,
            erc1822: false,
            erc1967: false,
            erc2535: false,
            multi_delegatecall: false,
            reason: None,
            implementation_slot: None,
            standard_slots: HashMap::new(),
            current_implementation: None,
            old_implementations: Vec::new(),
        }
    }
}

/// Every `PUSH4` operand in `code` whose value isn't the `0xFFFFFFFF`
/// sentinel — the function-selector set spec.md §4.8 step 2 asks for.
fn enumerate_selectors(code: &[u8]) -> Vec<u32> {
    disassemble(code)
        .instructions
        .into_iter()
        .filter(|i| i.name == "PUSH4")
        .filter_map(|i| {
            if i.operand.len() != 4 {
                return None;
            }
            let selector = u32::from_be_bytes(i.operand.clone().try_into().ok()?);
            (selector != 0xFFFF_FFFF).then_some(selector)
        })
        .collect()
}

/// The first 4-byte value not already in `taken`, starting at `0xAABBCCDD`
/// and incrementing — a synthetic selector guaranteed not to hit a real
/// dispatch branch in `code`.
fn choose_synthetic_selector(taken: &[u32]) -> u32 {
    let mut candidate: u32 = 0xAABB_CCDD;
    while taken.contains(&candidate) {
        candidate = candidate.wrapping_add(1);
    }
    candidate
}

/// Classifies `target` at `block`, running a synthetic fallback call
/// against its runtime bytecode.
pub fn classify(
    explorer: Arc<dyn Explorer>,
    target: Address,
    block: BlockTag,
    gas: u64,
) -> Result<ProxyClassification, ClassifyError> {
    let code = explorer.get_code(target, block)?;
    if code.is_empty() {
        let mut result = ProxyClassification::empty(target);
        result.error = Some("no bytecode at the requested address/block".to_string());
        return Ok(result);
    }

    let mut result = ProxyClassification::empty(target);

    let selectors = enumerate_selectors(&code);
    let synthetic_selector = choose_synthetic_selector(&selectors);
    let mut calldata = synthetic_selector.to_be_bytes().to_vec();
    calldata.extend_from_slice(&[0xEE; 32]);

    let callinfo = CallInfo {
        address: target,
        caller: synthetic_caller(),
        origin: synthetic_caller(),
        storage_address: target,
        calldata: calldata.clone(),
        callvalue: Word::zero(),
        gas,
        codesize: code.len(),
    };

    // Probe the well-known proxy slots directly, independent of whatever
    // the emulator itself reads during the run.
    let mut last_nonzero: Option<(String, Word)> = None;
    for (name, slot, flag) in standard_slot_table() {
        let value = explorer.get_storage_at(target, slot, block)?;
        if value.is_zero() {
            continue;
        }
        match flag {
            StandardFlag::Erc1822 => result.erc1822 = true,
            StandardFlag::Erc1967 => result.erc1967 = true,
            StandardFlag::Erc2535 => result.erc2535 = true,
        }
        result.standard_slots.insert(name.to_string(), value);
        last_nonzero = Some((name.to_string(), value));
    }
    if let Some((_, value)) = &last_nonzero {
        result.current_implementation = Some(word_to_address(*value));
    }

    let handler = Arc::new(Handler::new(explorer.clone(), block));
    let storage = Storage::new(explorer.clone(), block);
    let emulation = handler.call(&handler, callinfo, storage.clone(), gas, 0)?;

    if emulation.delegate_records.is_empty() {
        result.is_proxy = Some(false);
        result.reason = Some("no delegatecall in fallback function".to_string());
    } else {
        result.is_proxy = Some(true);
        result.multi_delegatecall = emulation.delegate_records.len() > 1;
        let last = emulation.delegate_records.last().expect("checked non-empty above");
        let logic_address = last.callinfo.address;
        if last.callinfo.calldata != calldata {
            result.is_proxy = Some(false);
            result.reason = Some("calldata different".to_string());
        } else {
            result.current_implementation = Some(logic_address);
        }
    }

    if result.is_proxy == Some(true) {
        let logic_word = proxyscope_common::address_to_word(
            result.current_implementation.expect("set alongside is_proxy above"),
        );
        let found_slot = storage
            .entries_for(target)
            .into_iter()
            .find(|&(_, value)| value == logic_word)
            .map(|(slot, _)| slot);

        match found_slot {
            Some(slot) => result.implementation_slot = Some(slot),
            None => {
                let needle = result
                    .current_implementation
                    .expect("set alongside is_proxy above")
                    .as_bytes()
                    .to_vec();
                result.erc1167 = code.windows(needle.len()).any(|w| w == needle.as_slice());
            }
        }

        if let Some(slot) = result.implementation_slot {
            let right_block = match block {
                BlockTag::Number(n) => n,
                BlockTag::Latest => explorer.block_number()?,
            };
            let mut historian = Historian::new(explorer.as_ref(), target, slot);
            let history = historian.history(right_block)?;
            let mut old_implementations: Vec<Address> =
                history.into_iter().map(word_to_address).collect();
            // `__main__.py:195-197` pops the history's last entry once it
            // matches the slot's current value: the slot read back here is
            // already the live implementation, not a prior one.
            if old_implementations.last() == result.current_implementation.as_ref() {
                old_implementations.pop();
            }
            result.old_implementations = old_implementations;
        }
    }

    if !emulation.inconcrete_opcodes.is_empty() {
        result.success = false;
        result.error = Some(format!(
            "inconcrete opcodes encountered: {:?}",
            emulation.inconcrete_opcodes
        ));
    } else {
        result.success = true;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxyscope_common::MockExplorer;

    fn classify_code(code: Vec<u8>) -> ProxyClassification {
        let target = Address::from_low_u64_be(1);
        let explorer = Arc::new(MockExplorer::new().with_code(target, code));
        classify(explorer, target, BlockTag::Latest, 1_000_000).unwrap()
    }

    #[test]
    fn empty_code_is_reported_as_no_bytecode() {
        let target = Address::from_low_u64_be(1);
        let explorer = Arc::new(MockExplorer::new());
        let result = classify(explorer, target, BlockTag::Latest, 1_000_000).unwrap();
        assert!(!result.success);
        assert_eq!(result.is_proxy, None);
        assert!(result.error.unwrap().contains("no bytecode"));
    }

    #[test]
    fn hard_coded_non_proxy_has_no_delegatecall() {
        // PUSH1 1, PUSH1 0, SSTORE, STOP
        let result = classify_code(vec![0x60, 0x01, 0x60, 0x00, 0x55, 0x00]);
        assert_eq!(result.is_proxy, Some(false));
        assert_eq!(result.reason.as_deref(), Some("no delegatecall in fallback function"));
    }

    #[test]
    fn minimal_eip1167_clone_is_detected() {
        let logic = Address::from_slice(&[0xbe; 20]); // stand-in for 0x…BEEF
        let mut code = hex::decode("363d3d373d3d3d363d73").unwrap();
        code.extend_from_slice(logic.as_bytes());
        code.extend_from_slice(&hex::decode("5af43d82803e903d91602b57fd5bf3").unwrap());

        let target = Address::from_low_u64_be(1);
        let explorer = Arc::new(
            MockExplorer::new()
                .with_code(target, code)
                // the clone forwards the untouched calldata, so the target
                // must echo back a RETURN for the call to resolve.
                .with_code(logic, vec![0x60, 0x00, 0x60, 0x00, 0xf3]),
        );
        let result = classify(explorer, target, BlockTag::Latest, 1_000_000).unwrap();
        assert_eq!(result.is_proxy, Some(true));
        assert!(result.erc1167);
        assert_eq!(result.current_implementation, Some(logic));
        assert_eq!(result.implementation_slot, None);
    }

    #[test]
    fn erc1967_slot_is_resolved_and_historized() {
        let slot = *ERC1967_IMPLEMENT_SLOT;
        let logic = Address::from_low_u64_be(0xdead_beef);
        let logic_word = proxyscope_common::address_to_word(logic);

        // SLOADs the implementation slot, then DELEGATECALLs it, forwarding
        // the untouched calldata via CALLDATASIZE/CALLDATACOPY.
        let target = Address::from_low_u64_be(1);
        let explorer = Arc::new(
            MockExplorer::new()
                .with_code(target, build_erc1967_forwarder(slot))
                .with_storage(target, slot, logic_word)
                .with_code(logic, vec![0x60, 0x00, 0x60, 0x00, 0xf3])
                .with_storage_at_block(target, slot, 1, Word::zero())
                .with_latest_block(10),
        );
        let result = classify(explorer, target, BlockTag::Latest, 1_000_000).unwrap();
        assert_eq!(result.is_proxy, Some(true));
        assert!(result.erc1967);
        assert_eq!(result.implementation_slot, Some(slot));
        assert_eq!(result.current_implementation, Some(logic));
        assert_eq!(result.standard_slots.get("ERC1967_IMPLEMENT_SLOT"), Some(&logic_word));
        // `logic` is both the live value at `slot` and the only entry the
        // historian's bisection finds, so it's popped as the current value.
        assert_eq!(result.old_implementations, vec![]);
    }

    /// Loads the implementation slot, then forwards the full untouched
    /// calldata to it via `DELEGATECALL`. Stack just before the call, top
    /// first: `gas, impl(dup'd via DUP5), argOff=0, argLen=calldatasize,
    /// retOff=0, retLen=0, impl` (the last `impl` is `SLOAD`'s original,
    /// left untouched 5 slots down for `DUP5` to reach).
    fn build_erc1967_forwarder(slot: Word) -> Vec<u8> {
        let mut code = Vec::new();
        code.extend_from_slice(&[0x36, 0x60, 0x00, 0x60, 0x00, 0x37]); // calldatacopy to mem[0..calldatasize]
        let mut slot_bytes = [0u8; 32];
        slot.to_big_endian(&mut slot_bytes);
        code.push(0x7f); // PUSH32 slot
        code.extend_from_slice(&slot_bytes);
        code.push(0x54); // SLOAD -> [impl]
        code.push(0x5f); // PUSH0 retLen -> [impl, retLen]
        code.push(0x5f); // PUSH0 retOff -> [impl, retLen, retOff]
        code.push(0x36); // CALLDATASIZE -> [impl, retLen, retOff, argLen]
        code.push(0x5f); // PUSH0 argOff -> [impl, retLen, retOff, argLen, argOff]
        code.push(0x84); // DUP5 (copy `impl`, 5 deep) -> [impl, retLen, retOff, argLen, argOff, impl]
        code.extend_from_slice(&[0x61, 0xff, 0xff]); // PUSH2 gas -> [.., impl, gas]
        code.push(0xf4); // DELEGATECALL pops gas, target, argOff, argLen, retOff, retLen
        code.push(0x00); // STOP
        code
    }

    #[test]
    fn calldata_transforming_forwarder_is_not_a_proxy() {
        let logic = Address::from_low_u64_be(2);
        // DELEGATECALL with args pointing at memory that was overwritten
        // (PUSH1 0 MSTORE8 first, so the forwarded calldata differs).
        let mut code = vec![0x36, 0x60, 0x00, 0x60, 0x00, 0x37]; // calldatacopy to mem[0..size]
        code.extend_from_slice(&[0x60, 0x00, 0x60, 0x00, 0x53]); // PUSH1 0, PUSH1 0, MSTORE8 -> mutates mem[0]
        code.extend_from_slice(&[0x5f, 0x5f]); // retOff, retLen
        code.push(0x36); // argLen = calldatasize
        code.push(0x5f); // argOff = 0
        code.push(0x73); // PUSH20 logic
        code.extend_from_slice(logic.as_bytes());
        code.extend_from_slice(&[0x61, 0xff, 0xff]); // gas
        code.push(0xf4); // DELEGATECALL
        code.push(0x00);

        let target = Address::from_low_u64_be(1);
        let explorer = Arc::new(
            MockExplorer::new()
                .with_code(target, code)
                .with_code(logic, vec![0x60, 0x00, 0x60, 0x00, 0xf3]),
        );
        let result = classify(explorer, target, BlockTag::Latest, 1_000_000).unwrap();
        assert_eq!(result.is_proxy, Some(false));
        assert_eq!(result.reason.as_deref(), Some("calldata different"));
    }
}
