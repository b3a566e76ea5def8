//! `LT`/`GT`/`SLT`/`SGT`/`EQ`/`ISZERO`/`AND`/`OR`/`XOR`/`NOT`/`BYTE`/`SHL`/
//! `SHR`/`SAR` and `SHA3` (spec.md §4.4 comparison/logic and hashing
//! groups).

use proxyscope_common::{keccak256, Word};

use super::Emulator;
use crate::disassembler::Instruction;
use crate::errors::{OpcodeResult, VMError};
use crate::memory::word_to_offset;

fn bool_word(b: bool) -> Word {
    if b {
        Word::from(1u8)
    } else {
        Word::zero()
    }
}

fn is_negative(w: Word) -> bool {
    w.bit(255)
}

/// Signed comparison via sign-then-magnitude: differing signs decide it
/// outright, equal signs fall back to unsigned order.
fn signed_less_than(a: Word, b: Word) -> bool {
    match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

pub fn dispatch(emu: &mut Emulator, instruction: &Instruction) -> Result<OpcodeResult, VMError> {
    match instruction.name.as_str() {
        "LT" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(bool_word(a < b))?;
        }
        "GT" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(bool_word(a > b))?;
        }
        "SLT" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(bool_word(signed_less_than(a, b)))?;
        }
        "SGT" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(bool_word(signed_less_than(b, a)))?;
        }
        "EQ" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(bool_word(a == b))?;
        }
        "ISZERO" => {
            let a = emu.state.pop()?;
            emu.state.push(bool_word(a.is_zero()))?;
        }
        "AND" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(a & b)?;
        }
        "OR" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(a | b)?;
        }
        "XOR" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(a ^ b)?;
        }
        "NOT" => {
            let a = emu.state.pop()?;
            emu.state.push(!a)?;
        }
        "BYTE" => {
            let (n, x) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(byte_at(n, x))?;
        }
        "SHL" => {
            let (shift, value) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(shift_left(shift, value))?;
        }
        "SHR" => {
            let (shift, value) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(shift_right(shift, value))?;
        }
        "SAR" => {
            let (shift, value) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(shift_arithmetic_right(shift, value))?;
        }
        _ => unreachable!("comparison dispatch received {}", instruction.name),
    }
    Ok(OpcodeResult::Continue)
}

pub fn dispatch_sha3(emu: &mut Emulator) -> Result<OpcodeResult, VMError> {
    let offset = word_to_offset(emu.state.pop()?)?;
    let size = word_to_offset(emu.state.pop()?)?;
    let bytes = emu.state.memory.load_range(offset, size)?;
    let digest = keccak256(&bytes);
    emu.state.push(Word::from_big_endian(digest.as_bytes()))?;
    Ok(OpcodeResult::Continue)
}

fn byte_at(n: Word, x: Word) -> Word {
    if n >= Word::from(32u8) {
        return Word::zero();
    }
    let mut bytes = [0u8; 32];
    x.to_big_endian(&mut bytes);
    Word::from(bytes[n.as_u32() as usize])
}

fn shift_left(shift: Word, value: Word) -> Word {
    if shift >= Word::from(256u16) {
        return Word::zero();
    }
    value << (shift.as_u32() as usize)
}

fn shift_right(shift: Word, value: Word) -> Word {
    if shift >= Word::from(256u16) {
        return Word::zero();
    }
    value >> (shift.as_u32() as usize)
}

fn shift_arithmetic_right(shift: Word, value: Word) -> Word {
    let negative = is_negative(value);
    if shift >= Word::from(256u16) {
        return if negative { Word::MAX } else { Word::zero() };
    }
    let shifted = value >> (shift.as_u32() as usize);
    if !negative {
        return shifted;
    }
    // fill the vacated high bits with ones to preserve the sign.
    let fill = Word::MAX << (256 - shift.as_u32() as usize);
    shifted | fill
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_less_than_handles_crossing_signs() {
        let neg = !Word::zero(); // -1 in two's complement
        assert!(signed_less_than(neg, Word::from(1u8)));
        assert!(!signed_less_than(Word::from(1u8), neg));
    }

    #[test]
    fn byte_extracts_big_endian_index() {
        let x = Word::from(0x1122u32);
        assert_eq!(byte_at(Word::from(30u8), x), Word::from(0x11u8));
        assert_eq!(byte_at(Word::from(31u8), x), Word::from(0x22u8));
        assert_eq!(byte_at(Word::from(32u8), x), Word::zero());
    }

    #[test]
    fn sar_of_negative_one_stays_negative_one() {
        let neg_one = !Word::zero();
        assert_eq!(shift_arithmetic_right(Word::from(4u8), neg_one), neg_one);
    }

    #[test]
    fn shr_of_negative_one_is_not_sign_preserving() {
        let neg_one = !Word::zero();
        let shifted = shift_right(Word::from(4u8), neg_one);
        assert_ne!(shifted, neg_one);
    }
}
