//! x87 floating point.
//!
//! Memory forms go through the shared ModR/M encoder and return a
//! [`MemPatch`]; register-stack forms are two bytes with ST(i) in the low
//! bits of the second, returned as a [`RegPatch`].

use xjit_core::{Cond, EncodeError, Features, FpuReg, Mem16, Mem32, Mem64, MemOperand, Result};

use super::encoder::{Assembler, Slot};
use super::patch::{MemPatch, RegPatch};
use super::primitives::Opcode;

/// Arithmetic sub-opcodes (ModR/M.reg of D8/DC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FpuArith {
    Add = 0,
    Mul = 1,
    Sub = 4,
    Subr = 5,
    Div = 6,
    Divr = 7,
}

impl FpuArith {
    /// Sub-opcode in the `ST(i), ST0` (DC) register form, where the
    /// reversed and plain variants of SUB and DIV trade places.
    const fn sti_code(self) -> u8 {
        match self {
            FpuArith::Add | FpuArith::Mul => self as u8,
            _ => (self as u8) ^ 1,
        }
    }
}

/// Floating-point memory operands: `m32fp` and `m64fp`.
pub trait FloatMem: MemOperand {
    /// FLD/FST/FSTP opcode.
    const LOAD: u8;
    /// FADD/FMUL/FSUB/FDIV opcode.
    const ARITH: u8;
}

impl FloatMem for Mem32 {
    const LOAD: u8 = 0xD9;
    const ARITH: u8 = 0xD8;
}

impl FloatMem for Mem64 {
    const LOAD: u8 = 0xDD;
    const ARITH: u8 = 0xDC;
}

/// Integer memory operands of FILD/FISTP: `m16int`, `m32int`, `m64int`.
pub trait IntMem: MemOperand {
    /// Opcode and ModR/M.reg of FILD.
    const LOAD: (u8, u8);
    /// Opcode and ModR/M.reg of FISTP.
    const STORE_POP: (u8, u8);
}

impl IntMem for Mem16 {
    const LOAD: (u8, u8) = (0xDF, 0);
    const STORE_POP: (u8, u8) = (0xDF, 3);
}

impl IntMem for Mem32 {
    const LOAD: (u8, u8) = (0xDB, 0);
    const STORE_POP: (u8, u8) = (0xDB, 3);
}

impl IntMem for Mem64 {
    const LOAD: (u8, u8) = (0xDF, 5);
    const STORE_POP: (u8, u8) = (0xDF, 7);
}

macro_rules! fpu_arith_methods {
    ($($mem:ident, $st0:ident, $sti:ident => $op:ident);* $(;)?) => {$(
        pub fn $mem<M: FloatMem>(&mut self, src: M) -> Result<MemPatch> {
            self.farith(FpuArith::$op, src)
        }

        /// `ST0 <- ST0 op ST(i)`.
        pub fn $st0(&mut self, src: FpuReg) -> Result<RegPatch<FpuReg>> {
            self.farith_st0(FpuArith::$op, src)
        }

        /// `ST(i) <- ST(i) op ST0`.
        pub fn $sti(&mut self, dst: FpuReg) -> Result<RegPatch<FpuReg>> {
            self.farith_sti(FpuArith::$op, dst)
        }
    )*};
}

impl Assembler<'_> {
    fn fpu_mem(&mut self, opcode: u8, ext: u8, m: &impl MemOperand) -> Result<MemPatch> {
        self.require(Features::FPU)?;
        let (_, patch) = self.mem_ext(Opcode::new(opcode), Slot::ext(ext), m.address())?;
        Ok(patch)
    }

    fn fpu_fixed(&mut self, bytes: [u8; 2]) -> Result<usize> {
        self.require(Features::FPU)?;
        self.encode_fixed(&bytes)
    }

    /// `opcode, row + i` for ST(i).
    fn fpu_st(&mut self, opcode: u8, row: u8, st: FpuReg) -> Result<RegPatch<FpuReg>> {
        let at = self.fpu_fixed([opcode, row | st.code()])?;
        Ok(RegPatch::low_bits(at + 1))
    }

    // -- Load / store --

    pub fn fld<M: FloatMem>(&mut self, src: M) -> Result<MemPatch> {
        self.fpu_mem(M::LOAD, 0, &src)
    }

    pub fn fst<M: FloatMem>(&mut self, dst: M) -> Result<MemPatch> {
        self.fpu_mem(M::LOAD, 2, &dst)
    }

    pub fn fstp<M: FloatMem>(&mut self, dst: M) -> Result<MemPatch> {
        self.fpu_mem(M::LOAD, 3, &dst)
    }

    /// Push a copy of ST(i).
    pub fn fld_st(&mut self, src: FpuReg) -> Result<RegPatch<FpuReg>> {
        self.fpu_st(0xD9, 0xC0, src)
    }

    pub fn fst_st(&mut self, dst: FpuReg) -> Result<RegPatch<FpuReg>> {
        self.fpu_st(0xDD, 0xD0, dst)
    }

    pub fn fstp_st(&mut self, dst: FpuReg) -> Result<RegPatch<FpuReg>> {
        self.fpu_st(0xDD, 0xD8, dst)
    }

    pub fn fild<M: IntMem>(&mut self, src: M) -> Result<MemPatch> {
        let (opcode, ext) = M::LOAD;
        self.fpu_mem(opcode, ext, &src)
    }

    pub fn fistp<M: IntMem>(&mut self, dst: M) -> Result<MemPatch> {
        let (opcode, ext) = M::STORE_POP;
        self.fpu_mem(opcode, ext, &dst)
    }

    pub fn fldcw(&mut self, src: Mem16) -> Result<MemPatch> {
        self.fpu_mem(0xD9, 5, &src)
    }

    pub fn fnstcw(&mut self, dst: Mem16) -> Result<MemPatch> {
        self.fpu_mem(0xD9, 7, &dst)
    }

    // -- Arithmetic --

    pub fn farith<M: FloatMem>(&mut self, op: FpuArith, src: M) -> Result<MemPatch> {
        self.fpu_mem(M::ARITH, op as u8, &src)
    }

    pub fn farith_st0(&mut self, op: FpuArith, src: FpuReg) -> Result<RegPatch<FpuReg>> {
        self.fpu_st(0xD8, 0xC0 | ((op as u8) << 3), src)
    }

    pub fn farith_sti(&mut self, op: FpuArith, dst: FpuReg) -> Result<RegPatch<FpuReg>> {
        self.fpu_st(0xDC, 0xC0 | (op.sti_code() << 3), dst)
    }

    fpu_arith_methods! {
        fadd, fadd_st0, fadd_sti => Add;
        fmul, fmul_st0, fmul_sti => Mul;
        fsub, fsub_st0, fsub_sti => Sub;
        fsubr, fsubr_st0, fsubr_sti => Subr;
        fdiv, fdiv_st0, fdiv_sti => Div;
        fdivr, fdivr_st0, fdivr_sti => Divr;
    }

    // -- Stack and constants --

    pub fn fxch(&mut self, st: FpuReg) -> Result<RegPatch<FpuReg>> {
        self.fpu_st(0xD9, 0xC8, st)
    }

    pub fn fchs(&mut self) -> Result<usize> {
        self.fpu_fixed([0xD9, 0xE0])
    }

    pub fn fabs(&mut self) -> Result<usize> {
        self.fpu_fixed([0xD9, 0xE1])
    }

    pub fn fldz(&mut self) -> Result<usize> {
        self.fpu_fixed([0xD9, 0xEE])
    }

    pub fn fld1(&mut self) -> Result<usize> {
        self.fpu_fixed([0xD9, 0xE8])
    }

    pub fn fsqrt(&mut self) -> Result<usize> {
        self.fpu_fixed([0xD9, 0xFA])
    }

    // -- Compare / status --

    /// `FCOMIP ST0, ST(i)`: compare into EFLAGS and pop.
    pub fn fcomip(&mut self, st: FpuReg) -> Result<RegPatch<FpuReg>> {
        self.require(Features::CMOV)?;
        self.fpu_st(0xDF, 0xF0, st)
    }

    /// `FUCOMIP ST0, ST(i)`.
    pub fn fucomip(&mut self, st: FpuReg) -> Result<RegPatch<FpuReg>> {
        self.require(Features::CMOV)?;
        self.fpu_st(0xDF, 0xE8, st)
    }

    /// `FCMOVcc ST0, ST(i)`. Only the conditions testing CF, ZF and PF
    /// exist: B, E, BE, P and their negations.
    pub fn fcmovcc(&mut self, cond: Cond, src: FpuReg) -> Result<RegPatch<FpuReg>> {
        let (opcode, row) = match cond {
            Cond::B => (0xDA, 0xC0),
            Cond::E => (0xDA, 0xC8),
            Cond::Be => (0xDA, 0xD0),
            Cond::P => (0xDA, 0xD8),
            Cond::Ae => (0xDB, 0xC0),
            Cond::Ne => (0xDB, 0xC8),
            Cond::A => (0xDB, 0xD0),
            Cond::Np => (0xDB, 0xD8),
            _ => return Err(EncodeError::InvalidOperand("FCMOVcc condition")),
        };
        self.require(Features::CMOV)?;
        self.fpu_st(opcode, row, src)
    }

    /// `FNSTSW AX`.
    pub fn fnstsw_ax(&mut self) -> Result<usize> {
        self.fpu_fixed([0xDF, 0xE0])
    }

    pub fn fwait(&mut self) -> Result<usize> {
        self.require(Features::FPU)?;
        self.encode_fixed(&[0x9B])
    }
}
