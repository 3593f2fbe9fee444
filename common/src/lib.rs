extern crate strum;
#[macro_use]
extern crate strum_macros;

extern crate packed_struct;
extern crate packed_struct_codegen;

use packed_struct::prelude::*;

#[macro_use]
extern crate bitflags;

pub mod hexfile;

/// Every encoded instruction is `[ir, dst, src]`.
pub const INSTRUCTION_BYTES: u32 = 3;

/// Two-address family marker: `1ooo ddss`.
pub const ADDR2: u8 = 1 << 7;
/// One-address family marker: `01oo oodd`.
pub const ADDR1: u8 = 1 << 6;
pub const ADDR2_SHIFT: u8 = 4;
pub const ADDR1_SHIFT: u8 = 2;

bitflags! {
    /// Processor status word as seen by the control unit.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Psw: u8 {
        const OVERFLOW = 0b0001;
        const ZERO = 0b0010;
        const PARITY = 0b0100;
        const INTERRUPT = 0b1000;
    }
}

#[derive(Clone, Copy, Display, Debug, PartialEq, Eq)]
#[derive(EnumCount, EnumIter, EnumString)]
#[derive(PrimitiveEnum_u8)]
pub enum AluOp {
    Add = 0,
    Sub = 1,
    Inc = 2,
    Dec = 3,
    And = 4,
    Or = 5,
    Xor = 6,
    Not = 7,
}

#[derive(Clone, Copy, Display, Debug, PartialEq, Eq, Hash)]
#[derive(EnumCount, EnumIter, EnumString)]
#[derive(PrimitiveEnum_u8)]
pub enum AddressingMode {
    Immediate = 0,        // 5
    Register = 1,         // A
    Direct = 2,           // [5]
    RegisterIndirect = 3, // [A]
}

#[derive(Clone, Copy, Display, Debug, PartialEq, Eq, Hash)]
#[derive(EnumCount, EnumIter, EnumString)]
#[derive(PrimitiveEnum_u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TwoAddrOp {
    Mov = 0x80,
    Add = 0x90,
    Sub = 0xA0,
    And = 0xB0,
    Or = 0xC0,
    Xor = 0xD0,
    Cmp = 0xE0,
}

#[derive(Clone, Copy, Display, Debug, PartialEq, Eq, Hash)]
#[derive(EnumCount, EnumIter, EnumString)]
#[derive(PrimitiveEnum_u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum OneAddrOp {
    Inc = 0x40,
    Dec = 0x44,
    Not = 0x48,
    Jmp = 0x4C, // unconditional
    Jo = 0x50,  // overflow
    Jz = 0x54,  // zero
    Jp = 0x58,  // parity (odd)
    Jno = 0x5C,
    Jnz = 0x60,
    Jnp = 0x64,
    Push = 0x68,
    Pop = 0x6C,
    Call = 0x70,
    Int = 0x74,
}

impl OneAddrOp {
    /// Operations whose destination may name a label.
    pub fn is_transfer(&self) -> bool {
        match self {
            OneAddrOp::Jmp
            | OneAddrOp::Jo
            | OneAddrOp::Jz
            | OneAddrOp::Jp
            | OneAddrOp::Jno
            | OneAddrOp::Jnz
            | OneAddrOp::Jnp
            | OneAddrOp::Call
            | OneAddrOp::Int => true,
            OneAddrOp::Inc
            | OneAddrOp::Dec
            | OneAddrOp::Not
            | OneAddrOp::Push
            | OneAddrOp::Pop => false,
        }
    }

    /// Whether a conditional transfer is taken under `psw`. `None` for
    /// operations that are not jumps.
    pub fn jump_taken(&self, psw: Psw) -> Option<bool> {
        Some(match self {
            OneAddrOp::Jmp => true,
            OneAddrOp::Jo => psw.contains(Psw::OVERFLOW),
            OneAddrOp::Jz => psw.contains(Psw::ZERO),
            OneAddrOp::Jp => psw.contains(Psw::PARITY),
            OneAddrOp::Jno => !psw.contains(Psw::OVERFLOW),
            OneAddrOp::Jnz => !psw.contains(Psw::ZERO),
            OneAddrOp::Jnp => !psw.contains(Psw::PARITY),
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Display, Debug, PartialEq, Eq, Hash)]
#[derive(EnumCount, EnumIter, EnumString)]
#[derive(PrimitiveEnum_u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ZeroAddrOp {
    Nop = 0x00,
    Ret = 0x01,
    Iret = 0x02,
    Sti = 0x03,
    Cli = 0x04,
    Hlt = 0x3F,
}

/// Architectural registers, numbered by the pin id the datapath decodes.
/// Pin 0 is reserved for "nothing on the bus".
#[derive(Clone, Copy, Display, Debug, PartialEq, Eq, Hash)]
#[derive(EnumCount, EnumIter, EnumString)]
#[derive(PrimitiveEnum_u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Register {
    Msr = 1, // memory segment
    Mar = 2, // memory address
    Mdr = 3,
    Ram = 4,
    Ir = 5,
    Dst = 6,
    Src = 7,
    A = 8,
    B = 9,
    C = 10,
    D = 11,
    Di = 12,
    Si = 13,
    Sp = 14,
    Bp = 15,
    Cs = 16,
    Ds = 17,
    Ss = 18,
    Es = 19,
    Vec = 20,
    T1 = 21,
    T2 = 22,
}

impl Register {
    pub fn pin(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, PackedStruct)]
#[packed_struct(size_bytes = "1", endian = "lsb", bit_numbering = "lsb0")]
pub struct TwoAddrFields {
    #[packed_field(bits = "4..=7")]
    pub op: Integer<u8, packed_bits::Bits::<4>>,
    #[packed_field(bits = "2..=3", ty = "enum")]
    pub dst: AddressingMode,
    #[packed_field(bits = "0..=1", ty = "enum")]
    pub src: AddressingMode,
}

#[derive(Debug, PackedStruct)]
#[packed_struct(size_bytes = "1", endian = "lsb", bit_numbering = "lsb0")]
pub struct OneAddrFields {
    #[packed_field(bits = "2..=7")]
    pub op: Integer<u8, packed_bits::Bits::<6>>,
    #[packed_field(bits = "0..=1", ty = "enum")]
    pub dst: AddressingMode,
}

/// The first byte of an encoded instruction, split into operation and
/// addressing modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ir {
    TwoAddr { op: TwoAddrOp, dst: AddressingMode, src: AddressingMode },
    OneAddr { op: OneAddrOp, dst: AddressingMode },
    ZeroAddr(ZeroAddrOp),
}

impl Ir {
    pub fn encode(&self) -> u8 {
        match self {
            Ir::TwoAddr { op, dst, src } => *op as u8 | (*dst as u8) << 2 | *src as u8,
            Ir::OneAddr { op, dst } => *op as u8 | *dst as u8,
            Ir::ZeroAddr(op) => *op as u8,
        }
    }

    /// `None` when the byte names no defined operation.
    pub fn decode(ir: u8) -> Option<Ir> {
        if ir & ADDR2 != 0 {
            let fields = TwoAddrFields::unpack(&[ir]).ok()?;
            let op = TwoAddrOp::from_primitive(*fields.op << ADDR2_SHIFT)?;
            Some(Ir::TwoAddr { op, dst: fields.dst, src: fields.src })
        } else if ir & ADDR1 != 0 {
            let fields = OneAddrFields::unpack(&[ir]).ok()?;
            let op = OneAddrOp::from_primitive(*fields.op << ADDR1_SHIFT)?;
            Some(Ir::OneAddr { op, dst: fields.dst })
        } else {
            ZeroAddrOp::from_primitive(ir).map(Ir::ZeroAddr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn families() {
        for op in TwoAddrOp::iter() {
            assert_eq!(ADDR2, op as u8 & ADDR2, "{}", op);
            assert_eq!(0, op as u8 & 0x0F, "{}", op);
        }
        for op in OneAddrOp::iter() {
            assert_eq!(ADDR1, op as u8 & 0xC0, "{}", op);
            assert_eq!(0, op as u8 & 0x03, "{}", op);
        }
        for op in ZeroAddrOp::iter() {
            assert_eq!(0, op as u8 & 0xC0, "{}", op);
        }
    }

    #[test]
    fn mnemonics() {
        assert_eq!(TwoAddrOp::Mov, <TwoAddrOp as FromStr>::from_str("MOV").unwrap());
        assert_eq!(OneAddrOp::Jnz, <OneAddrOp as FromStr>::from_str("JNZ").unwrap());
        assert_eq!(ZeroAddrOp::Iret, <ZeroAddrOp as FromStr>::from_str("IRET").unwrap());
        assert!(<TwoAddrOp as FromStr>::from_str("INC").is_err());
        assert!(<OneAddrOp as FromStr>::from_str("mov").is_err());
        assert_eq!("CMP", TwoAddrOp::Cmp.to_string());
    }

    #[test]
    fn registers() {
        assert_eq!(Register::A, <Register as FromStr>::from_str("A").unwrap());
        assert_eq!(Register::T2, <Register as FromStr>::from_str("T2").unwrap());
        assert_eq!(Register::Di, <Register as FromStr>::from_str("DI").unwrap());
        assert!(<Register as FromStr>::from_str("Q").is_err());

        let pins: Vec<u8> = Register::iter().map(|r| r.pin()).collect();
        assert_eq!((1..=22).collect::<Vec<u8>>(), pins);
    }

    #[test]
    fn two_addr_round_trip() {
        for op in TwoAddrOp::iter() {
            for dst in AddressingMode::iter() {
                for src in AddressingMode::iter() {
                    let ir = Ir::TwoAddr { op, dst, src };
                    assert_eq!(Some(ir), Ir::decode(ir.encode()));
                }
            }
        }
        assert_eq!(0x80 | 1 << 2, Ir::TwoAddr {
            op: TwoAddrOp::Mov,
            dst: AddressingMode::Register,
            src: AddressingMode::Immediate,
        }.encode());
    }

    #[test]
    fn undefined() {
        assert_eq!(None, Ir::decode(0xF0)); // no 8th two-address op
        assert_eq!(None, Ir::decode(0x78)); // past INT
        assert_eq!(None, Ir::decode(0x05));
        assert_eq!(None, Ir::decode(0x3E));
        assert_eq!(Some(Ir::ZeroAddr(ZeroAddrOp::Hlt)), Ir::decode(0x3F));
    }

    #[test]
    fn jumps() {
        assert_eq!(Some(true), OneAddrOp::Jz.jump_taken(Psw::ZERO));
        assert_eq!(Some(false), OneAddrOp::Jnz.jump_taken(Psw::ZERO | Psw::PARITY));
        assert_eq!(Some(true), OneAddrOp::Jmp.jump_taken(Psw::empty()));
        assert_eq!(None, OneAddrOp::Call.jump_taken(Psw::all()));
        assert!(OneAddrOp::Int.is_transfer());
        assert!(!OneAddrOp::Push.is_transfer());
    }
}
