pub mod error;
pub mod operand;
pub mod parse;
pub mod source;

use std::{borrow::Cow, collections::BTreeMap, str::FromStr};

use common::*;

pub use error::{AssembleError, Diagnostic, Location, Role};
pub use operand::{is_legal, resolve, Operand, ResolveError};
pub use parse::{parse, Instruction, SyntaxError};
pub use source::{normalize, SourceLine};

/// Label name to byte offset. Labels are global to the compilation unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    offsets: BTreeMap<String, u32>,
}

impl LabelTable {
    pub fn get(&self, name: &str) -> Option<u32> {
        self.offsets.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.offsets.iter().map(|(name, offset)| (name.as_str(), *offset))
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Returns false if `name` was already defined.
    fn define(&mut self, name: &str, offset: u32) -> bool {
        if self.offsets.contains_key(name) {
            return false;
        }
        self.offsets.insert(name.to_owned(), offset);
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assembly {
    pub bytes: Vec<u8>,
    pub labels: LabelTable,
}

fn looks_like_label(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn resolve_as(token: &str, role: Role, at: &SourceLine) -> Result<Operand, AssembleError> {
    resolve(token).map_err(|e| match e {
        ResolveError::Unrecognized => AssembleError::InvalidOperand { role, at: at.into() },
        ResolveError::OutOfRange(value) => AssembleError::OutOfRange { role, value, at: at.into() },
    })
}

impl Instruction {
    /// Encodes one instruction. Labels produce no bytes.
    pub fn encode(&self, labels: &LabelTable, at: &SourceLine) -> Result<Option<[u8; 3]>, AssembleError> {
        let bytes = match self {
            Instruction::Label { .. } => return Ok(None),
            Instruction::SyntaxError(error) => {
                return Err(AssembleError::Syntax(vec![Diagnostic {
                    error: error.clone(),
                    at: at.into(),
                }]));
            }
            Instruction::TwoAddr { mnemonic, dst, src } => {
                let op = TwoAddrOp::from_str(mnemonic).map_err(|_| AssembleError::UnsupportedOp {
                    mnemonic: mnemonic.clone(),
                    at: at.into(),
                })?;
                let dst = resolve_as(dst, Role::Dst, at)?;
                let src = resolve_as(src, Role::Src, at)?;
                if !is_legal(dst.mode, src.mode) {
                    return Err(AssembleError::InvalidAddressingMode { at: at.into() });
                }
                let ir = Ir::TwoAddr { op, dst: dst.mode, src: src.mode };
                [ir.encode(), dst.value, src.value]
            }
            Instruction::OneAddr { mnemonic, dst } => {
                let op = OneAddrOp::from_str(mnemonic).map_err(|_| AssembleError::UnsupportedOp {
                    mnemonic: mnemonic.clone(),
                    at: at.into(),
                })?;

                // label targets become decimal immediates
                let target: Cow<str> = match labels.get(dst) {
                    Some(offset) if op.is_transfer() => Cow::Owned(offset.to_string()),
                    _ => Cow::Borrowed(dst.as_str()),
                };

                let operand = match resolve_as(&target, Role::Dst, at) {
                    Err(AssembleError::InvalidOperand { .. }) if op.is_transfer() && looks_like_label(dst) => {
                        return Err(AssembleError::UndefinedLabel { name: dst.clone(), at: at.into() });
                    }
                    result => result?,
                };
                let ir = Ir::OneAddr { op, dst: operand.mode };
                [ir.encode(), operand.value, 0]
            }
            Instruction::ZeroAddr { mnemonic } => {
                let op = ZeroAddrOp::from_str(mnemonic).map_err(|_| AssembleError::UnsupportedInstruction {
                    mnemonic: mnemonic.clone(),
                    at: at.into(),
                })?;
                [Ir::ZeroAddr(op).encode(), 0, 0]
            }
        };

        Ok(Some(bytes))
    }
}

pub fn assemble_from_str(input: &str) -> Result<Assembly, AssembleError> {
    assemble(&normalize(input))
}

/// Parses every line, then lays out labels and encodes. All syntax errors
/// are collected before giving up; any later error stops at the first
/// offending line and no bytes are returned.
pub fn assemble(lines: &[SourceLine]) -> Result<Assembly, AssembleError> {
    let instructions: Vec<Instruction> = lines.iter().map(|line| parse(&line.text)).collect();

    let diagnostics: Vec<Diagnostic> = lines.iter()
        .zip(&instructions)
        .filter_map(|(line, inst)| {
            inst.syntax_error().map(|error| Diagnostic {
                error: error.clone(),
                at: line.into(),
            })
        })
        .collect();

    if !diagnostics.is_empty() {
        for d in &diagnostics {
            tracing::warn!(line = d.at.line, "syntax error: {}", d.error);
        }
        return Err(AssembleError::Syntax(diagnostics));
    }

    let program: Vec<(&SourceLine, Instruction)> = lines.iter().zip(instructions).collect();
    assemble_inner(&program)
}

fn assemble_inner(program: &[(&SourceLine, Instruction)]) -> Result<Assembly, AssembleError> {
    tracing::trace!("starting pass 1");
    let mut labels = LabelTable::default();
    let mut pc = 0u32;
    for (line, inst) in program {
        match inst {
            Instruction::Label { name } => {
                if !labels.define(name, pc) {
                    return Err(AssembleError::DuplicateLabel {
                        name: name.clone(),
                        at: (*line).into(),
                    });
                }
                tracing::trace!("{:04x} {}:", pc, name);
            }
            _ => pc += INSTRUCTION_BYTES,
        }
    }

    tracing::trace!("starting pass 2");
    let mut rom = Vec::with_capacity(pc as usize);
    for (line, inst) in program {
        if let Some(bytes) = inst.encode(&labels, line)? {
            tracing::debug!(
                "{:04x}  {:02x} {:02x} {:02x}  {}",
                rom.len(), bytes[0], bytes[1], bytes[2], line.text);
            rom.extend_from_slice(&bytes);
        }
    }

    Ok(Assembly { bytes: rom, labels })
}
