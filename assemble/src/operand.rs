use std::str::FromStr;

use common::{AddressingMode, Register};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unrecognized operand")]
    Unrecognized,
    #[error("value {0} does not fit in a byte")]
    OutOfRange(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operand {
    pub mode: AddressingMode,
    pub value: u8,
}

enum Literal {
    Register(Register),
    Number(u8),
}

fn parse_number(token: &str) -> Option<Result<u8, ResolveError>> {
    let (digits, radix) = match token.strip_prefix("0X").or_else(|| token.strip_prefix("0x")) {
        Some(hex) => (hex, 16),
        None => (token, 10),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    // all digits, so the only failure left is overflow
    Some(u8::from_str_radix(digits, radix).map_err(|_| ResolveError::OutOfRange(token.to_owned())))
}

fn parse_literal(token: &str) -> Result<Literal, ResolveError> {
    if let Ok(reg) = Register::from_str(token) {
        return Ok(Literal::Register(reg));
    }
    match parse_number(token) {
        Some(n) => Ok(Literal::Number(n?)),
        None => Err(ResolveError::Unrecognized),
    }
}

/// Classifies an operand token. `[...]` selects a memory operand, anything
/// else is a register or an immediate.
pub fn resolve(token: &str) -> Result<Operand, ResolveError> {
    let bracketed = token.len() > 2 && token.starts_with('[') && token.ends_with(']');

    if bracketed {
        let inner = &token[1..token.len() - 1];
        Ok(match parse_literal(inner)? {
            Literal::Register(reg) => Operand { mode: AddressingMode::RegisterIndirect, value: reg.pin() },
            Literal::Number(n) => Operand { mode: AddressingMode::Direct, value: n },
        })
    } else {
        Ok(match parse_literal(token)? {
            Literal::Register(reg) => Operand { mode: AddressingMode::Register, value: reg.pin() },
            Literal::Number(n) => Operand { mode: AddressingMode::Immediate, value: n },
        })
    }
}

/// Addressing-mode pairs a two-address instruction may encode.
/// A register destination takes any source; a memory destination only
/// takes a register or immediate source.
pub fn is_legal(dst: AddressingMode, src: AddressingMode) -> bool {
    use AddressingMode as M;
    match (dst, src) {
        (M::Register, _) => true,
        (M::Direct | M::RegisterIndirect, M::Register | M::Immediate) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn op(mode: AddressingMode, value: u8) -> Result<Operand, ResolveError> {
        Ok(Operand { mode, value })
    }

    #[test]
    fn unbracketed() {
        assert_eq!(op(AddressingMode::Register, Register::A.pin()), resolve("A"));
        assert_eq!(op(AddressingMode::Register, 22), resolve("T2"));
        assert_eq!(op(AddressingMode::Immediate, 42), resolve("42"));
        assert_eq!(op(AddressingMode::Immediate, 0x2A), resolve("0X2A"));
        assert_eq!(op(AddressingMode::Immediate, 0xFF), resolve("0xff"));
        assert_eq!(op(AddressingMode::Immediate, 0), resolve("000"));
    }

    #[test]
    fn bracketed() {
        assert_eq!(op(AddressingMode::RegisterIndirect, Register::B.pin()), resolve("[B]"));
        assert_eq!(op(AddressingMode::Direct, 5), resolve("[5]"));
        assert_eq!(op(AddressingMode::Direct, 0x10), resolve("[0X10]"));
    }

    #[test]
    fn rejects() {
        for token in ["", "Q", "-1", "1.5", "0X", "0XG1", "[]", "[A", "A]", "[[A]]", "[ A]", "1A", "LOOP"] {
            assert_eq!(Err(ResolveError::Unrecognized), resolve(token), "{:?}", token);
        }
        assert_eq!(Err(ResolveError::OutOfRange("256".to_owned())), resolve("256"));
        assert_eq!(Err(ResolveError::OutOfRange("0X100".to_owned())), resolve("[0X100]"));
        assert_eq!(Err(ResolveError::OutOfRange("99999999999".to_owned())), resolve("99999999999"));
    }

    #[test]
    fn legality_table() {
        use AddressingMode as M;
        let legal = [
            (M::Register, M::Immediate),
            (M::Register, M::Register),
            (M::Register, M::Direct),
            (M::Register, M::RegisterIndirect),
            (M::Direct, M::Immediate),
            (M::Direct, M::Register),
            (M::RegisterIndirect, M::Immediate),
            (M::RegisterIndirect, M::Register),
        ];

        for dst in AddressingMode::iter() {
            for src in AddressingMode::iter() {
                assert_eq!(legal.contains(&(dst, src)), is_legal(dst, src), "{:?} <- {:?}", dst, src);
            }
        }
    }
}
