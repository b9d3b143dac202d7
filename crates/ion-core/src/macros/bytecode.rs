//! Template bytecode instruction format.
//!
//! Each instruction is a `u32`: the opcode in the top 8 bits and a 24-bit
//! operand in the rest. Some instructions are followed by extra operand
//! words:
//!
//! | op | operand | extra words |
//! |---|---|---|
//! | `INLINE_INT`, `INLINE_FLOAT` | - | 1 |
//! | `INLINE_LONG`, `INLINE_DOUBLE` | - | 2 (low word first) |
//! | `LIST_START`, `SEXP_START`, `STRUCT_START` | words up to and including `CONTAINER_END` | children |
//! | `INVOKE` | constant index of the macro | 1 (argument word count) + arguments |
//! | `ARGUMENT` | words up to and including `ARGUMENT_END` | argument expressions |

use crate::error::{malformed, IonResult};

pub const NULL_NULL: u8 = 0x01;
pub const NULL_TYPED: u8 = 0x02;
pub const BOOL: u8 = 0x03;
pub const SMALL_INT: u8 = 0x04;
pub const INLINE_INT: u8 = 0x05;
pub const INLINE_LONG: u8 = 0x06;
pub const INLINE_FLOAT: u8 = 0x07;
pub const INLINE_DOUBLE: u8 = 0x08;
pub const FLOAT_ZERO: u8 = 0x09;
pub const DECIMAL_ZERO: u8 = 0x0A;
pub const EMPTY_STRING: u8 = 0x0B;
pub const SYSTEM_SYMBOL: u8 = 0x0C;
pub const UNKNOWN_SYMBOL: u8 = 0x0D;
pub const CP_BIG_INT: u8 = 0x10;
pub const CP_DECIMAL: u8 = 0x11;
pub const CP_TIMESTAMP: u8 = 0x12;
pub const CP_STRING: u8 = 0x13;
pub const CP_SYMBOL: u8 = 0x14;
pub const CP_BLOB: u8 = 0x15;
pub const CP_CLOB: u8 = 0x16;
pub const LIST_START: u8 = 0x20;
pub const SEXP_START: u8 = 0x21;
pub const STRUCT_START: u8 = 0x22;
pub const CONTAINER_END: u8 = 0x23;
pub const CP_FIELD_NAME: u8 = 0x30;
pub const SYSTEM_FIELD_NAME: u8 = 0x31;
pub const CP_ANNOTATION: u8 = 0x32;
pub const ARGUMENT_REF: u8 = 0x40;
pub const INVOKE: u8 = 0x41;
pub const ARGUMENT: u8 = 0x42;
pub const ARGUMENT_END: u8 = 0x43;

/// Largest operand that fits in an instruction.
pub const MAX_DATA: u32 = 0x00FF_FFFF;
pub const SMALL_INT_MIN: i128 = -(1 << 23);
pub const SMALL_INT_MAX: i128 = (1 << 23) - 1;

#[inline]
pub const fn instruction(op: u8, data: u32) -> u32 {
    (op as u32) << 24 | (data & MAX_DATA)
}

#[inline]
pub const fn op(word: u32) -> u8 {
    (word >> 24) as u8
}

#[inline]
pub const fn data(word: u32) -> u32 {
    word & MAX_DATA
}

/// The operand as a sign-extended 24-bit integer.
#[inline]
pub const fn small_int(word: u32) -> i32 {
    ((word << 8) as i32) >> 8
}

/// Reads the word at `i`, reporting out-of-range access as malformed data.
pub fn word_at(bytecode: &[u32], i: usize) -> IonResult<u32> {
    match bytecode.get(i) {
        Some(word) => Ok(*word),
        None => malformed(format!("bytecode index {i} out of bounds")),
    }
}

/// Number of words the expression starting at `i` occupies.
pub fn expression_len(bytecode: &[u32], i: usize) -> IonResult<usize> {
    let word = word_at(bytecode, i)?;
    Ok(match op(word) {
        INLINE_INT | INLINE_FLOAT => 2,
        INLINE_LONG | INLINE_DOUBLE => 3,
        LIST_START | SEXP_START | STRUCT_START | ARGUMENT => 1 + data(word) as usize,
        INVOKE => 2 + word_at(bytecode, i + 1)? as usize,
        _ => 1,
    })
}

/// Two operand words as a 64-bit value, low word first.
pub fn long_at(bytecode: &[u32], i: usize) -> IonResult<u64> {
    let low = word_at(bytecode, i)? as u64;
    let high = word_at(bytecode, i + 1)? as u64;
    Ok(high << 32 | low)
}

pub fn push_long(out: &mut Vec<u32>, value: u64) {
    out.push(value as u32);
    out.push((value >> 32) as u32);
}
