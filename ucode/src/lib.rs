extern crate packed_struct;
extern crate packed_struct_codegen;
use packed_struct::prelude::*;

use std::borrow::Cow;

use common::hexfile::HexFile;
use common::*;

use lazy_static::lazy_static;
lazy_static! {
    pub static ref CONTROL_STORE: ControlStore = ucode();
}

/// Entries in the control store: 8 bits of opcode, 4 of psw, 4 of cycle.
pub const CONTROL_STORE_LEN: usize = 1 << 16;
pub const MAX_UOPS: usize = 16;
/// Micro-ops every instruction spends loading `ir`, `dst` and `src`.
pub const FETCH_LEN: usize = 6;

/// One control word. Bits 0..=4 select the register driving the bus and
/// bits 5..=9 the register latching it, by pin id.
#[derive(Clone, Copy, Debug, PartialEq)]
#[derive(PackedStruct)]
#[packed_struct(size_bytes = "4", endian = "lsb", bit_numbering = "lsb0")]
pub struct MicroOp {
    #[packed_field(bits = "0..=4")]
    pub bus_out: Integer<u8, packed_bits::Bits::<5>>,
    #[packed_field(bits = "5..=9")]
    pub bus_in: Integer<u8, packed_bits::Bits::<5>>,
    #[packed_field(bits = "10")]
    pub src_r: bool,
    #[packed_field(bits = "11")]
    pub src_w: bool,
    #[packed_field(bits = "12")]
    pub dst_r: bool,
    #[packed_field(bits = "13")]
    pub dst_w: bool,
    #[packed_field(bits = "14")]
    pub pc_we: bool,
    #[packed_field(bits = "15")]
    pub pc_cs: bool,
    #[packed_field(bits = "16")]
    pub pc_en: bool,
    #[packed_field(bits = "17..=19", ty = "enum")]
    pub alu_op: AluOp,
    #[packed_field(bits = "20")]
    pub alu_out: bool,
    #[packed_field(bits = "21")]
    pub alu_psw: bool,
    #[packed_field(bits = "22")]
    pub alu_int_w: bool,
    #[packed_field(bits = "23")]
    pub alu_int: bool,
    #[packed_field(bits = "30")]
    pub cycle_reset: bool,
    #[packed_field(bits = "31")]
    pub halt: bool,
}

/// Which of the two operand latches an indirect transfer goes through.
/// The latch holds a register pin id; `*_R` and `*_W` read or write the
/// register it names.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Operand {
    Dst,
    Src,
}

impl Operand {
    fn latch(&self) -> Register {
        match self {
            Operand::Dst => Register::Dst,
            Operand::Src => Register::Src,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Output {
    Reg(Register),
    Via(Operand),
    Pc,
    Alu(AluOp),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Load {
    Reg(Register),
    Via(Operand),
    Pc,
}

impl MicroOp {
    pub fn empty() -> MicroOp {
        MicroOp {
            bus_out: 0.into(),
            bus_in: 0.into(),
            src_r: false,
            src_w: false,
            dst_r: false,
            dst_w: false,
            pc_we: false,
            pc_cs: false,
            pc_en: false,
            alu_op: AluOp::Add,
            alu_out: false,
            alu_psw: false,
            alu_int_w: false,
            alu_int: false,
            cycle_reset: false,
            halt: false,
        }
    }

    pub fn halt() -> MicroOp {
        MicroOp { halt: true, ..MicroOp::empty() }
    }

    /// Ends the instruction without doing anything else.
    pub fn next() -> MicroOp {
        MicroOp::empty().end()
    }

    fn create(out: Output, load: Load) -> MicroOp {
        let mut u = MicroOp::empty();

        match out {
            Output::Reg(r) => u.bus_out = r.pin().into(),
            Output::Via(Operand::Dst) => u.dst_r = true,
            Output::Via(Operand::Src) => u.src_r = true,
            Output::Pc => u.pc_cs = true,
            Output::Alu(op) => {
                u.alu_op = op;
                u.alu_out = true;
            }
        }

        match load {
            Load::Reg(r) => u.bus_in = r.pin().into(),
            Load::Via(Operand::Dst) => u.dst_w = true,
            Load::Via(Operand::Src) => u.src_w = true,
            Load::Pc => {
                u.pc_cs = true;
                u.pc_we = true;
            }
        }

        u
    }

    /// Only latches flags from `op`; the result never reaches the bus.
    fn flags(op: AluOp) -> MicroOp {
        MicroOp { alu_op: op, alu_psw: true, ..MicroOp::empty() }
    }

    fn pc_inc(mut self) -> MicroOp {
        self.pc_cs = true;
        self.pc_we = true;
        self.pc_en = true;
        self
    }

    fn latch_psw(mut self) -> MicroOp {
        self.alu_psw = true;
        self
    }

    fn enable_interrupts(mut self) -> MicroOp {
        self.alu_psw = true;
        self.alu_int_w = true;
        self
    }

    fn disable_interrupts(mut self) -> MicroOp {
        self.alu_psw = true;
        self.alu_int_w = true;
        self.alu_int = true;
        self
    }

    fn end(mut self) -> MicroOp {
        self.cycle_reset = true;
        self
    }

    pub fn word(&self) -> u32 {
        u32::from_be_bytes(self.pack().expect("every field fits its bits"))
    }

    pub fn from_word(word: u32) -> MicroOp {
        MicroOp::unpack(&word.to_be_bytes()).expect("every bit pattern is a valid micro-op")
    }

    /// Whether this micro-op finishes the current instruction.
    pub fn is_last(&self) -> bool {
        self.cycle_reset || self.halt
    }
}

/// Index into the control store.
#[derive(Clone, Copy, Debug, PartialEq)]
#[derive(PackedStruct)]
#[packed_struct(size_bytes = "2", endian = "lsb", bit_numbering = "lsb0")]
pub struct MicroAddress {
    #[packed_field(bits = "8..=15")]
    pub opcode: u8,
    #[packed_field(bits = "4..=7")]
    pub psw: Integer<u8, packed_bits::Bits::<4>>,
    #[packed_field(bits = "0..=3")]
    pub cycle: Integer<u8, packed_bits::Bits::<4>>,
}

impl MicroAddress {
    pub fn new(opcode: u8, psw: Psw, cycle: u8) -> MicroAddress {
        MicroAddress {
            opcode,
            psw: (psw.bits() & 0xF).into(),
            cycle: (cycle & 0xF).into(),
        }
    }

    pub fn index(&self) -> usize {
        u16::from_be_bytes(self.pack().expect("every field fits its bits")) as usize
    }
}

/// The synthesized control store, one micro-op per `MicroAddress`.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlStore {
    uops: Vec<MicroOp>,
}

impl ControlStore {
    pub fn get(&self, opcode: u8, psw: Psw, cycle: u8) -> MicroOp {
        self.uops[MicroAddress::new(opcode, psw, cycle).index()]
    }

    /// The micro-ops executed for one instruction under one psw, up to and
    /// including the one that ends it.
    pub fn sequence(&self, opcode: u8, psw: Psw) -> Vec<MicroOp> {
        let mut seq = Vec::new();
        for cycle in 0..MAX_UOPS as u8 {
            let u = self.get(opcode, psw, cycle);
            seq.push(u);
            if u.is_last() {
                break;
            }
        }
        seq
    }

    pub fn words(&self) -> impl Iterator<Item = u32> + '_ {
        self.uops.iter().map(MicroOp::word)
    }

    /// Raw image, each word little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words().flat_map(u32::to_le_bytes).collect()
    }

    pub fn to_hex(&self) -> HexFile {
        HexFile::from_words(self.words()).with_comment("control store: opcode << 8 | psw << 4 | cycle")
    }
}

pub struct Ucode {
    uops: Vec<MicroOp>,

    base_address: usize,
    uop_count: usize,
}

macro_rules! add {
    ($self:expr, $out:expr, $load:expr) => {
        $self.add_with_source($out, $load, file!(), line!());
    };
}

impl Ucode {
    fn new() -> Ucode {
        Ucode {
            uops: vec![MicroOp::empty(); CONTROL_STORE_LEN],
            base_address: 0,
            uop_count: 0,
        }
    }

    fn add_op(&mut self, u: MicroOp, file: &'static str, line: u32) {
        assert!(self.uop_count < MAX_UOPS, "sequence at {:04x} is too long", self.base_address);

        let address = self.base_address + self.uop_count;
        if tracing::enabled!(tracing::Level::TRACE) {
            let mut file = Cow::Borrowed(file);
            if file.contains('\\') {
                file = Cow::Owned(file.replace('\\', "/"));
            }
            tracing::trace!("addr:{:04x} uop:{:08x} source:{}:{}", address, u.word(), file, line);
        }

        self.uops[address] = u;
        self.uop_count += 1;
    }

    fn add_with_source(&mut self, out: Output, load: Load, file: &'static str, line: u32) {
        self.add_op(MicroOp::create(out, load), file, line);
    }

    fn fetch(&mut self) {
        for latch in [Register::Ir, Register::Dst, Register::Src] {
            add!(self, Output::Pc, Load::Reg(Register::Mar));
            self.add_op(MicroOp::create(Output::Reg(Register::Ram), Load::Reg(latch)).pc_inc(), file!(), line!());
        }
    }

    /// Decrements `sp` and points the memory address at the new top of
    /// the stack segment.
    fn push_address(&mut self) {
        add!(self, Output::Reg(Register::Sp), Load::Reg(Register::A));
        add!(self, Output::Alu(AluOp::Dec), Load::Reg(Register::Sp));
        add!(self, Output::Reg(Register::Sp), Load::Reg(Register::Mar));
        add!(self, Output::Reg(Register::Ss), Load::Reg(Register::Msr));
    }

    fn pop_address(&mut self) {
        add!(self, Output::Reg(Register::Sp), Load::Reg(Register::Mar));
        add!(self, Output::Reg(Register::Ss), Load::Reg(Register::Msr));
    }

    fn pop_release(&mut self) {
        add!(self, Output::Reg(Register::Sp), Load::Reg(Register::A));
        add!(self, Output::Alu(AluOp::Inc), Load::Reg(Register::Sp));
    }

    fn code_segment() -> MicroOp {
        MicroOp::create(Output::Reg(Register::Cs), Load::Reg(Register::Msr))
    }

    /// Where an operand's value comes from once any memory address has been
    /// set up.
    fn value_of(operand: Operand, mode: AddressingMode) -> Output {
        match mode {
            AddressingMode::Immediate => Output::Reg(operand.latch()),
            AddressingMode::Register => Output::Via(operand),
            AddressingMode::Direct | AddressingMode::RegisterIndirect => Output::Reg(Register::Ram),
        }
    }

    fn address_of(operand: Operand, mode: AddressingMode) -> Option<Output> {
        match mode {
            AddressingMode::Direct => Some(Output::Reg(operand.latch())),
            AddressingMode::RegisterIndirect => Some(Output::Via(operand)),
            AddressingMode::Immediate | AddressingMode::Register => None,
        }
    }

    fn mov(&mut self, dst: AddressingMode, src: AddressingMode) -> bool {
        let into = match dst {
            AddressingMode::Register => Load::Via(Operand::Dst),
            AddressingMode::Direct | AddressingMode::RegisterIndirect => Load::Reg(Register::Ram),
            AddressingMode::Immediate => return false,
        };

        let dst_address = Ucode::address_of(Operand::Dst, dst);
        let src_address = Ucode::address_of(Operand::Src, src);
        if dst_address.is_some() && src_address.is_some() {
            return false;
        }

        if let Some(address) = dst_address.or(src_address) {
            add!(self, address, Load::Reg(Register::Mar));
        }
        self.add_op(MicroOp::create(Ucode::value_of(Operand::Src, src), into).end(), file!(), line!());
        true
    }

    fn binary(&mut self, dst: AddressingMode, src: AddressingMode, op: AluOp, write_back: bool) -> bool {
        let rhs = match (dst, src) {
            (AddressingMode::Register, AddressingMode::Immediate | AddressingMode::Register) => {
                Ucode::value_of(Operand::Src, src)
            }
            _ => return false,
        };

        add!(self, Output::Via(Operand::Dst), Load::Reg(Register::A));
        add!(self, rhs, Load::Reg(Register::B));
        let result = if write_back {
            MicroOp::create(Output::Alu(op), Load::Via(Operand::Dst)).latch_psw()
        } else {
            MicroOp::flags(op)
        };
        self.add_op(result.end(), file!(), line!());
        true
    }

    fn unary(&mut self, dst: AddressingMode, op: AluOp) -> bool {
        if dst != AddressingMode::Register {
            return false;
        }

        add!(self, Output::Via(Operand::Dst), Load::Reg(Register::A));
        self.add_op(
            MicroOp::create(Output::Alu(op), Load::Via(Operand::Dst)).latch_psw().end(),
            file!(),
            line!());
        true
    }

    fn two_addr(&mut self, op: TwoAddrOp, dst: AddressingMode, src: AddressingMode) -> bool {
        match op {
            TwoAddrOp::Mov => self.mov(dst, src),
            TwoAddrOp::Add => self.binary(dst, src, AluOp::Add, true),
            TwoAddrOp::Sub => self.binary(dst, src, AluOp::Sub, true),
            TwoAddrOp::And => self.binary(dst, src, AluOp::And, true),
            TwoAddrOp::Or => self.binary(dst, src, AluOp::Or, true),
            TwoAddrOp::Xor => self.binary(dst, src, AluOp::Xor, true),
            TwoAddrOp::Cmp => self.binary(dst, src, AluOp::Sub, false),
        }
    }

    fn one_addr(&mut self, op: OneAddrOp, dst: AddressingMode, psw: Psw) -> bool {
        match op {
            OneAddrOp::Inc => self.unary(dst, AluOp::Inc),
            OneAddrOp::Dec => self.unary(dst, AluOp::Dec),
            OneAddrOp::Not => self.unary(dst, AluOp::Not),
            OneAddrOp::Jmp
            | OneAddrOp::Jo
            | OneAddrOp::Jz
            | OneAddrOp::Jp
            | OneAddrOp::Jno
            | OneAddrOp::Jnz
            | OneAddrOp::Jnp => {
                if dst != AddressingMode::Immediate {
                    return false;
                }
                if op.jump_taken(psw) == Some(true) {
                    self.add_op(
                        MicroOp::create(Output::Reg(Register::Dst), Load::Pc).end(),
                        file!(),
                        line!());
                } else {
                    self.add_op(MicroOp::next(), file!(), line!());
                }
                true
            }
            OneAddrOp::Push => {
                if !matches!(dst, AddressingMode::Immediate | AddressingMode::Register) {
                    return false;
                }
                self.push_address();
                add!(self, Ucode::value_of(Operand::Dst, dst), Load::Reg(Register::Ram));
                self.add_op(Ucode::code_segment().end(), file!(), line!());
                true
            }
            OneAddrOp::Pop => {
                if dst != AddressingMode::Register {
                    return false;
                }
                self.pop_address();
                add!(self, Output::Reg(Register::Ram), Load::Via(Operand::Dst));
                self.pop_release();
                self.add_op(Ucode::code_segment().end(), file!(), line!());
                true
            }
            OneAddrOp::Call | OneAddrOp::Int => {
                if dst != AddressingMode::Immediate {
                    return false;
                }
                if op == OneAddrOp::Int && !psw.contains(Psw::INTERRUPT) {
                    self.add_op(MicroOp::next(), file!(), line!());
                    return true;
                }

                self.push_address();
                add!(self, Output::Pc, Load::Reg(Register::Ram));
                self.add_op(Ucode::code_segment(), file!(), line!());
                let mut jump = MicroOp::create(Output::Reg(Register::Dst), Load::Pc).end();
                if op == OneAddrOp::Int {
                    jump = jump.disable_interrupts();
                }
                self.add_op(jump, file!(), line!());
                true
            }
        }
    }

    fn zero_addr(&mut self, op: ZeroAddrOp) -> bool {
        match op {
            ZeroAddrOp::Nop => self.add_op(MicroOp::next(), file!(), line!()),
            ZeroAddrOp::Ret | ZeroAddrOp::Iret => {
                self.pop_address();
                add!(self, Output::Reg(Register::Ram), Load::Pc);
                self.pop_release();
                let mut restore = Ucode::code_segment().end();
                if op == ZeroAddrOp::Iret {
                    restore = restore.enable_interrupts();
                }
                self.add_op(restore, file!(), line!());
            }
            ZeroAddrOp::Sti => self.add_op(MicroOp::empty().enable_interrupts().end(), file!(), line!()),
            ZeroAddrOp::Cli => self.add_op(MicroOp::empty().disable_interrupts().end(), file!(), line!()),
            ZeroAddrOp::Hlt => self.add_op(MicroOp::halt(), file!(), line!()),
        }
        true
    }

    fn execute(&mut self, ir: u8, psw: Psw) -> bool {
        match Ir::decode(ir) {
            Some(Ir::TwoAddr { op, dst, src }) => self.two_addr(op, dst, src),
            Some(Ir::OneAddr { op, dst }) => self.one_addr(op, dst, psw),
            Some(Ir::ZeroAddr(op)) => self.zero_addr(op),
            None => false,
        }
    }

    fn build(mut self) -> ControlStore {
        let mut implemented = 0;

        for ir in 0..=u8::MAX {
            for psw in 0..(1u8 << 4) {
                let psw = Psw::from_bits_truncate(psw);

                self.base_address = MicroAddress::new(ir, psw, 0).index();
                self.uop_count = 0;

                tracing::trace!("addr:{:04x} ir:{:02x}={:?} psw:[{:?}]", self.base_address, ir, Ir::decode(ir), psw);

                self.fetch();
                assert_eq!(FETCH_LEN, self.uop_count);

                // undefined opcodes and illegal operand modes decide before
                // emitting anything, so the halt lands right after the fetch
                if self.execute(ir, psw) {
                    implemented += 1;
                } else {
                    self.add_op(MicroOp::halt(), file!(), line!());
                }
            }
        }

        tracing::debug!("synthesized {} of {} control entries", implemented, 1 << 12);
        ControlStore { uops: self.uops }
    }
}

pub fn ucode() -> ControlStore {
    Ucode::new().build()
}
