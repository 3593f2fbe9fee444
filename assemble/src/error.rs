use std::fmt;

use crate::{parse::SyntaxError, source::SourceLine};

/// Where a diagnostic points: the original line number and the normalized
/// text of that line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub text: String,
}

impl From<&SourceLine> for Location {
    fn from(line: &SourceLine) -> Self {
        Location {
            line: line.number,
            text: line.text.clone(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "    {} | {}", self.line, self.text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Dst,
    Src,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Dst => "dst",
            Role::Src => "src",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub error: SyntaxError,
    pub at: Location,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error: {}\n{}", self.error, self.at)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    #[error("{} syntax error(s) found", .0.len())]
    Syntax(Vec<Diagnostic>),
    #[error("label \"{name}\" defined repeatedly\n{at}")]
    DuplicateLabel { name: String, at: Location },
    #[error("unsupported op \"{mnemonic}\"\n{at}")]
    UnsupportedOp { mnemonic: String, at: Location },
    #[error("unsupported instruction \"{mnemonic}\"\n{at}")]
    UnsupportedInstruction { mnemonic: String, at: Location },
    #[error("invalid {role}\n{at}")]
    InvalidOperand { role: Role, at: Location },
    #[error("{role} value {value} does not fit in a byte\n{at}")]
    OutOfRange { role: Role, value: String, at: Location },
    #[error("undefined label \"{name}\"\n{at}")]
    UndefinedLabel { name: String, at: Location },
    #[error("invalid addressing mode\n{at}")]
    InvalidAddressingMode { at: Location },
}

impl AssembleError {
    /// Source line the error is attributed to. Syntax errors report the
    /// first offending line.
    pub fn line(&self) -> Option<usize> {
        match self {
            AssembleError::Syntax(diagnostics) => diagnostics.first().map(|d| d.at.line),
            AssembleError::DuplicateLabel { at, .. }
            | AssembleError::UnsupportedOp { at, .. }
            | AssembleError::UnsupportedInstruction { at, .. }
            | AssembleError::InvalidOperand { at, .. }
            | AssembleError::OutOfRange { at, .. }
            | AssembleError::UndefinedLabel { at, .. }
            | AssembleError::InvalidAddressingMode { at } => Some(at.line),
        }
    }
}
