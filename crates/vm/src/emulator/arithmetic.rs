//! `ADD`/`SUB`/`MUL`/`DIV`/`MOD`/`EXP`/`ADDMOD`/`MULMOD`/`SDIV`/`SMOD`/
//! `SIGNEXTEND` (spec.md §4.4 arithmetic group). Modular `Word` wraparound
//! throughout; signed variants reinterpret operands as two's-complement
//! with round-toward-zero division and sign-preserving remainder.

use proxyscope_common::Word;

use super::Emulator;
use crate::disassembler::Instruction;
use crate::errors::{OpcodeResult, VMError};

fn is_negative(w: Word) -> bool {
    w.bit(255)
}

/// Two's-complement negation: `!w + 1`, wrapping.
fn negate(w: Word) -> Word {
    (!w).overflowing_add(Word::from(1u8)).0
}

fn abs_unsigned(w: Word) -> Word {
    if is_negative(w) {
        negate(w)
    } else {
        w
    }
}

pub fn dispatch(emu: &mut Emulator, instruction: &Instruction) -> Result<OpcodeResult, VMError> {
    match instruction.name.as_str() {
        "ADD" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(a.overflowing_add(b).0)?;
        }
        "MUL" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(a.overflowing_mul(b).0)?;
        }
        "SUB" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(a.overflowing_sub(b).0)?;
        }
        "DIV" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(if b.is_zero() { Word::zero() } else { a / b })?;
        }
        "SDIV" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            if b.is_zero() {
                emu.state.push(Word::zero())?;
            } else {
                let negative_result = is_negative(a) != is_negative(b);
                let quotient = abs_unsigned(a) / abs_unsigned(b);
                emu.state.push(if negative_result { negate(quotient) } else { quotient })?;
            }
        }
        "MOD" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(if b.is_zero() { Word::zero() } else { a % b })?;
        }
        "SMOD" => {
            let (a, b) = (emu.state.pop()?, emu.state.pop()?);
            if b.is_zero() {
                emu.state.push(Word::zero())?;
            } else {
                let remainder = abs_unsigned(a) % abs_unsigned(b);
                emu.state.push(if is_negative(a) { negate(remainder) } else { remainder })?;
            }
        }
        "ADDMOD" => {
            let (a, b, n) = (emu.state.pop()?, emu.state.pop()?, emu.state.pop()?);
            emu.state.push(if n.is_zero() { Word::zero() } else { addmod(a, b, n) })?;
        }
        "MULMOD" => {
            let (a, b, n) = (emu.state.pop()?, emu.state.pop()?, emu.state.pop()?);
            emu.state.push(if n.is_zero() { Word::zero() } else { mulmod(a, b, n) })?;
        }
        "EXP" => {
            let (base, exponent) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(mod_pow(base, exponent))?;
        }
        "SIGNEXTEND" => {
            let (i, x) = (emu.state.pop()?, emu.state.pop()?);
            emu.state.push(sign_extend(i, x))?;
        }
        _ => unreachable!("arithmetic dispatch received non-arithmetic opcode {}", instruction.name),
    }
    Ok(OpcodeResult::Continue)
}

/// `(a + b) mod n` without overflowing a `Word`, via a 512-bit
/// intermediate built from the crate's big-endian byte helpers.
fn addmod(a: Word, b: Word, n: Word) -> Word {
    let wide_a = to_u512(a);
    let wide_b = to_u512(b);
    let wide_n = to_u512(n);
    let sum = wide_a + wide_b;
    from_u512_mod(sum, wide_n)
}

fn mulmod(a: Word, b: Word, n: Word) -> Word {
    let wide_a = to_u512(a);
    let wide_b = to_u512(b);
    let wide_n = to_u512(n);
    let product = wide_a * wide_b;
    from_u512_mod(product, wide_n)
}

ethereum_types::construct_uint! {
    struct U512(8);
}

fn to_u512(w: Word) -> U512 {
    let mut bytes = [0u8; 32];
    w.to_big_endian(&mut bytes);
    U512::from_big_endian(&bytes)
}

fn from_u512_mod(value: U512, modulus: U512) -> Word {
    if modulus.is_zero() {
        return Word::zero();
    }
    let reduced = value % modulus;
    let mut bytes = [0u8; 64];
    reduced.to_big_endian(&mut bytes);
    Word::from_big_endian(&bytes[32..])
}

fn mod_pow(mut base: Word, mut exponent: Word) -> Word {
    let mut result = Word::from(1u8);
    while !exponent.is_zero() {
        if exponent.bit(0) {
            result = result.overflowing_mul(base).0;
        }
        base = base.overflowing_mul(base).0;
        exponent >>= 1;
    }
    result
}

fn sign_extend(i: Word, x: Word) -> Word {
    if i >= Word::from(32u8) {
        return x;
    }
    let byte_index = i.as_u32() as usize; // i < 32, safe
    let mut bytes = [0u8; 32];
    x.to_big_endian(&mut bytes);
    let sign_byte_pos = 31 - byte_index;
    let is_negative = bytes[sign_byte_pos] & 0x80 != 0;
    if is_negative {
        for b in bytes.iter_mut().take(sign_byte_pos) {
            *b = 0xff;
        }
    } else {
        for b in bytes.iter_mut().take(sign_byte_pos) {
            *b = 0x00;
        }
    }
    Word::from_big_endian(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_wraps_modulo_2_256() {
        let max = Word::MAX;
        assert_eq!(max.overflowing_add(Word::from(1u8)).0, Word::zero());
    }

    #[test]
    fn sdiv_of_negative_one_by_positive_two_rounds_toward_zero() {
        let neg_one = negate(Word::from(1u8));
        let result = {
            let b = Word::from(2u8);
            let negative_result = is_negative(neg_one) != is_negative(b);
            let quotient = abs_unsigned(neg_one) / abs_unsigned(b);
            if negative_result {
                negate(quotient)
            } else {
                quotient
            }
        };
        assert_eq!(result, Word::zero());
    }

    #[test]
    fn sign_extend_negative_byte_fills_with_ones() {
        // SIGNEXTEND(0, 0xff) == all-ones (sign bit of the low byte is set).
        let extended = sign_extend(Word::zero(), Word::from(0xffu8));
        assert_eq!(extended, Word::MAX);
    }

    #[test]
    fn sign_extend_positive_byte_fills_with_zeros() {
        let extended = sign_extend(Word::zero(), Word::from(0x7fu8));
        assert_eq!(extended, Word::from(0x7fu8));
    }

    #[test]
    fn mulmod_reduces_through_a_wide_intermediate() {
        let a = Word::MAX;
        let b = Word::from(2u8);
        let n = Word::from(10u8);
        // (MAX * 2) mod 10 computed independently via addmod(a, a, n).
        assert_eq!(mulmod(a, b, n), addmod(a, a, n));
    }

    #[test]
    fn mod_pow_matches_small_cases() {
        assert_eq!(mod_pow(Word::from(2u8), Word::from(10u8)), Word::from(1024u32));
    }
}
