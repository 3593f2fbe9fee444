use std::mem;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("invalid op or label name")]
    InvalidName,
    #[error("'{0}' unexpected")]
    Unexpected(char),
    #[error("dst and src should be separated by ','")]
    MissingSeparator,
    #[error("src is empty")]
    EmptySrc,
    #[error("supports up to two addresses")]
    TooManyAddresses,
}

/// One parsed source line. Operands are kept as raw tokens and resolved
/// during the second pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Label { name: String },
    TwoAddr { mnemonic: String, dst: String, src: String },
    OneAddr { mnemonic: String, dst: String },
    ZeroAddr { mnemonic: String },
    SyntaxError(SyntaxError),
}

impl Instruction {
    pub fn syntax_error(&self) -> Option<&SyntaxError> {
        match self {
            Instruction::SyntaxError(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    FirstWord,
    EndFirstWord,
    EndLabel,
    Dst,
    EndDst,
    StartSrc,
    Src,
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_name_char(c: char, first: bool) -> bool {
    if first {
        c.is_ascii_alphabetic() || c == '_'
    } else {
        c.is_ascii_alphanumeric() || c == '_'
    }
}

/// Runs the line state machine over an already normalized line. Every
/// state either consumes the current character or moves to a state that
/// re-examines it; `None` stands for end of line.
pub fn parse(line: &str) -> Instruction {
    let chars: Vec<char> = line.chars().collect();
    let mut pos = 0;
    let mut state = State::FirstWord;

    let mut word = String::new();
    let mut mnemonic = String::new();
    let mut dst = String::new();

    loop {
        let c = chars.get(pos).copied();
        state = match (state, c) {
            (State::FirstWord, Some(c)) if is_name_char(c, word.is_empty()) => {
                word.push(c);
                pos += 1;
                State::FirstWord
            }
            (State::FirstWord, _) => State::EndFirstWord,

            (State::EndFirstWord, _) if word.is_empty() => {
                return Instruction::SyntaxError(SyntaxError::InvalidName);
            }
            (State::EndFirstWord, Some(c)) if is_blank(c) => {
                pos += 1;
                State::EndFirstWord
            }
            (State::EndFirstWord, None) => {
                return Instruction::ZeroAddr { mnemonic: word };
            }
            (State::EndFirstWord, Some(':')) => {
                pos += 1;
                State::EndLabel
            }
            (State::EndFirstWord, Some(_)) => {
                mnemonic = mem::take(&mut word);
                State::Dst
            }

            (State::EndLabel, Some(c)) if is_blank(c) => {
                pos += 1;
                State::EndLabel
            }
            (State::EndLabel, None) => {
                return Instruction::Label { name: word };
            }
            (State::EndLabel, Some(c)) => {
                return Instruction::SyntaxError(SyntaxError::Unexpected(c));
            }

            (State::Dst, Some(c)) if !is_blank(c) && c != ',' => {
                word.push(c);
                pos += 1;
                State::Dst
            }
            (State::Dst, _) => State::EndDst,

            (State::EndDst, Some(c)) if is_blank(c) => {
                pos += 1;
                State::EndDst
            }
            (State::EndDst, None) => {
                return Instruction::OneAddr { mnemonic, dst: word };
            }
            (State::EndDst, Some(',')) => {
                pos += 1;
                dst = mem::take(&mut word);
                State::StartSrc
            }
            (State::EndDst, Some(_)) => {
                return Instruction::SyntaxError(SyntaxError::MissingSeparator);
            }

            (State::StartSrc, Some(c)) if is_blank(c) => {
                pos += 1;
                State::StartSrc
            }
            (State::StartSrc, None) => {
                return Instruction::SyntaxError(SyntaxError::EmptySrc);
            }
            (State::StartSrc, Some(_)) => State::Src,

            (State::Src, None) => {
                return Instruction::TwoAddr { mnemonic, dst, src: word };
            }
            (State::Src, Some(c)) if is_blank(c) || c == ',' => {
                return Instruction::SyntaxError(SyntaxError::TooManyAddresses);
            }
            (State::Src, Some(c)) => {
                word.push(c);
                pos += 1;
                State::Src
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two(mnemonic: &str, dst: &str, src: &str) -> Instruction {
        Instruction::TwoAddr {
            mnemonic: mnemonic.to_owned(),
            dst: dst.to_owned(),
            src: src.to_owned(),
        }
    }

    fn one(mnemonic: &str, dst: &str) -> Instruction {
        Instruction::OneAddr { mnemonic: mnemonic.to_owned(), dst: dst.to_owned() }
    }

    #[test]
    fn labels() {
        assert_eq!(Instruction::Label { name: "LOOP".to_owned() }, parse("LOOP:"));
        assert_eq!(Instruction::Label { name: "L1".to_owned() }, parse("L1:"));
        assert_eq!(Instruction::Label { name: "_START".to_owned() }, parse("_START \t:  "));
        assert_eq!(Instruction::SyntaxError(SyntaxError::Unexpected('H')), parse("L1: HLT"));
    }

    #[test]
    fn zero_addr() {
        assert_eq!(Instruction::ZeroAddr { mnemonic: "HLT".to_owned() }, parse("HLT"));
        assert_eq!(Instruction::ZeroAddr { mnemonic: "NOP".to_owned() }, parse("NOP  "));
    }

    #[test]
    fn one_addr() {
        assert_eq!(one("JMP", "LOOP"), parse("JMP LOOP"));
        assert_eq!(one("PUSH", "[0X10]"), parse("PUSH [0X10]"));
        assert_eq!(one("INC", "A"), parse("INC\tA"));
        assert_eq!(one("MOV", "[A]"), parse("MOV[A]"));
    }

    #[test]
    fn two_addr() {
        assert_eq!(two("MOV", "A", "5"), parse("MOV A, 5"));
        assert_eq!(two("MOV", "A", "B"), parse("MOV A,B"));
        assert_eq!(two("ADD", "[B]", "0X2A"), parse("ADD [B] ,   0X2A"));
        assert_eq!(two("MOV", "", "A"), parse("MOV ,A"));
    }

    #[test]
    fn errors() {
        assert_eq!(Instruction::SyntaxError(SyntaxError::InvalidName), parse("5 A"));
        assert_eq!(Instruction::SyntaxError(SyntaxError::InvalidName), parse(":"));
        assert_eq!(Instruction::SyntaxError(SyntaxError::MissingSeparator), parse("MOV A B"));
        assert_eq!(Instruction::SyntaxError(SyntaxError::EmptySrc), parse("MOV A,"));
        assert_eq!(Instruction::SyntaxError(SyntaxError::EmptySrc), parse("MOV A,  "));
        assert_eq!(Instruction::SyntaxError(SyntaxError::TooManyAddresses), parse("MOV A, B, C"));
        assert_eq!(Instruction::SyntaxError(SyntaxError::TooManyAddresses), parse("MOV A, B C"));
        assert_eq!(Some(&SyntaxError::MissingSeparator), parse("MOV A B").syntax_error());
        assert_eq!(None, parse("MOV A, B").syntax_error());
    }

    #[test]
    fn messages() {
        assert_eq!("'X' unexpected", SyntaxError::Unexpected('X').to_string());
        assert_eq!("src is empty", SyntaxError::EmptySrc.to_string());
    }
}
