//! The Ion 1.1 opcode dispatch table.

use crate::types::Token;

/// How the body length of an opcode is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// The body is exactly this many bytes.
    Fixed(u8),
    /// A FlexUInt byte length follows the opcode.
    Prefixed,
    /// The body runs until an end marker.
    Delimited,
    /// The opcode's own framing decides (symbol IDs, e-expressions,
    /// annotation sequences).
    Computed,
    Invalid,
}

/// A row of the dispatch table. `token` is `None` for NOPs and invalid
/// opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub token: Option<Token>,
    pub length: Length,
}

impl OpcodeInfo {
    const fn new(token: Token, length: Length) -> Self {
        Self {
            token: Some(token),
            length,
        }
    }

    pub fn is_nop(&self) -> bool {
        self.token.is_none() && !matches!(self.length, Length::Invalid)
    }
}

pub const IVM: u8 = 0xE0;
pub const SYSTEM_SYMBOL: u8 = 0xEE;
pub const SYSTEM_MACRO: u8 = 0xEF;
pub const END: u8 = 0xF0;
pub const EEXP_FLEX_ADDRESS: u8 = 0xF4;
pub const EEXP_PREFIXED: u8 = 0xF5;

/// Number of body bytes of the short timestamp opcodes `0x80..=0x8C`.
pub const SHORT_TIMESTAMP_LENGTHS: [u8; 13] = [1, 2, 2, 4, 5, 6, 7, 8, 5, 5, 7, 8, 9];

const INVALID: OpcodeInfo = OpcodeInfo {
    token: None,
    length: Length::Invalid,
};

const fn classify(op: u8) -> OpcodeInfo {
    let low = op & 0x0F;
    match op {
        0x00..=0x5F => OpcodeInfo::new(Token::MacroInvocation, Length::Computed),
        0x60..=0x68 => OpcodeInfo::new(Token::Int, Length::Fixed(low)),
        0x6A => OpcodeInfo::new(Token::Float, Length::Fixed(0)),
        0x6B => OpcodeInfo::new(Token::Float, Length::Fixed(2)),
        0x6C => OpcodeInfo::new(Token::Float, Length::Fixed(4)),
        0x6D => OpcodeInfo::new(Token::Float, Length::Fixed(8)),
        0x6E | 0x6F => OpcodeInfo::new(Token::Bool, Length::Fixed(0)),
        0x70..=0x7F => OpcodeInfo::new(Token::Decimal, Length::Fixed(low)),
        0x80..=0x8C => OpcodeInfo::new(
            Token::Timestamp,
            Length::Fixed(SHORT_TIMESTAMP_LENGTHS[low as usize]),
        ),
        0x90..=0x9F => OpcodeInfo::new(Token::String, Length::Fixed(low)),
        0xA0..=0xAF => OpcodeInfo::new(Token::Symbol, Length::Fixed(low)),
        0xB0..=0xBF => OpcodeInfo::new(Token::List, Length::Fixed(low)),
        0xC0..=0xCF => OpcodeInfo::new(Token::Sexp, Length::Fixed(low)),
        0xD1 => INVALID,
        0xD0..=0xDF => OpcodeInfo::new(Token::Struct, Length::Fixed(low)),
        IVM => OpcodeInfo::new(Token::VersionMarker, Length::Fixed(3)),
        0xE1 => OpcodeInfo::new(Token::Symbol, Length::Fixed(1)),
        0xE2 => OpcodeInfo::new(Token::Symbol, Length::Fixed(2)),
        0xE3 => OpcodeInfo::new(Token::Symbol, Length::Computed),
        0xE4..=0xE9 => OpcodeInfo::new(Token::Annotations, Length::Computed),
        0xEA => OpcodeInfo::new(Token::Null, Length::Fixed(0)),
        0xEB => OpcodeInfo::new(Token::Null, Length::Fixed(1)),
        0xEC => OpcodeInfo {
            token: None,
            length: Length::Fixed(0),
        },
        0xED => OpcodeInfo {
            token: None,
            length: Length::Prefixed,
        },
        SYSTEM_SYMBOL => OpcodeInfo::new(Token::Symbol, Length::Fixed(1)),
        SYSTEM_MACRO => OpcodeInfo::new(Token::MacroInvocation, Length::Computed),
        END => OpcodeInfo::new(Token::End, Length::Fixed(0)),
        0xF1 => OpcodeInfo::new(Token::List, Length::Delimited),
        0xF2 => OpcodeInfo::new(Token::Sexp, Length::Delimited),
        0xF3 => OpcodeInfo::new(Token::Struct, Length::Delimited),
        EEXP_FLEX_ADDRESS => OpcodeInfo::new(Token::MacroInvocation, Length::Computed),
        EEXP_PREFIXED => OpcodeInfo::new(Token::MacroInvocation, Length::Prefixed),
        0xF6 => OpcodeInfo::new(Token::Int, Length::Prefixed),
        0xF7 => OpcodeInfo::new(Token::Decimal, Length::Prefixed),
        0xF8 => OpcodeInfo::new(Token::Timestamp, Length::Prefixed),
        0xF9 => OpcodeInfo::new(Token::String, Length::Prefixed),
        0xFA => OpcodeInfo::new(Token::Symbol, Length::Prefixed),
        0xFB => OpcodeInfo::new(Token::List, Length::Prefixed),
        0xFC => OpcodeInfo::new(Token::Sexp, Length::Prefixed),
        0xFD => OpcodeInfo::new(Token::Struct, Length::Prefixed),
        0xFE => OpcodeInfo::new(Token::Blob, Length::Prefixed),
        0xFF => OpcodeInfo::new(Token::Clob, Length::Prefixed),
        _ => INVALID,
    }
}

const fn build_table() -> [OpcodeInfo; 256] {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = classify(i as u8);
        i += 1;
    }
    table
}

/// Dispatch table indexed by opcode byte.
pub static OPCODES: [OpcodeInfo; 256] = build_table();

#[inline]
pub fn lookup(op: u8) -> OpcodeInfo {
    OPCODES[op as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_checks() {
        assert_eq!(lookup(0x3F).token, Some(Token::MacroInvocation));
        assert_eq!(lookup(0x64), OpcodeInfo::new(Token::Int, Length::Fixed(4)));
        assert_eq!(lookup(0x69).length, Length::Invalid);
        assert_eq!(lookup(0x6B), OpcodeInfo::new(Token::Float, Length::Fixed(2)));
        assert_eq!(lookup(0x6E).token, Some(Token::Bool));
        assert_eq!(lookup(0x8C).length, Length::Fixed(9));
        assert_eq!(lookup(0x8D).length, Length::Invalid);
        assert_eq!(lookup(0xD0), OpcodeInfo::new(Token::Struct, Length::Fixed(0)));
        assert_eq!(lookup(0xD1).length, Length::Invalid);
        assert_eq!(lookup(0xDF).length, Length::Fixed(15));
        assert_eq!(lookup(0xF3).length, Length::Delimited);
        assert_eq!(lookup(0xFF).token, Some(Token::Clob));
    }

    #[test]
    fn nops() {
        assert!(lookup(0xEC).is_nop());
        assert!(lookup(0xED).is_nop());
        assert!(!lookup(0x69).is_nop());
        assert!(!lookup(0x60).is_nop());
    }

    #[test]
    fn every_value_opcode_has_a_length() {
        for info in OPCODES.iter() {
            if info.token.is_some() {
                assert_ne!(info.length, Length::Invalid);
            }
        }
    }
}
