//! MMX integer SIMD on the eight 64-bit MM registers.

use xjit_core::{Features, Mem64, MemOperand, MmxReg, Result};

use super::encoder::{Assembler, Form, Rm, Slot};
use super::operand::Rm32;
use super::patch::{MemPatch, RegPatch};
use super::primitives::{ModrmFields, Opcode};

const OPC_MOVD_TO_MM: Opcode = Opcode::ext(0x6E);
const OPC_MOVD_FROM_MM: Opcode = Opcode::ext(0x7E);
const OPC_MOVQ_LOAD: Opcode = Opcode::ext(0x6F);
const OPC_MOVQ_STORE: Opcode = Opcode::ext(0x7F);

/// Two-operand packed operations, `mm <- mm op mm/m64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MmxOp {
    Paddb = 0xFC,
    Paddw = 0xFD,
    Paddd = 0xFE,
    Psubb = 0xF8,
    Psubw = 0xF9,
    Psubd = 0xFA,
    Pand = 0xDB,
    Por = 0xEB,
    Pxor = 0xEF,
}

/// Source operand of MMX instructions: an MM register or `m64`.
///
/// A register source hands back a [`RegPatch`] on ModR/M.rm, a memory
/// source its [`MemPatch`].
pub trait MmxRm: Copy {
    type Patch: Copy + std::fmt::Debug;

    fn to_rm(&self) -> Rm<'_>;

    fn mmx_patch(&self, fields: &ModrmFields) -> Self::Patch;
}

impl MmxRm for MmxReg {
    type Patch = RegPatch<MmxReg>;

    fn to_rm(&self) -> Rm<'_> {
        Rm::Reg(Slot::reg(*self))
    }

    fn mmx_patch(&self, fields: &ModrmFields) -> RegPatch<MmxReg> {
        RegPatch::rm_field(fields)
    }
}

impl MmxRm for Mem64 {
    type Patch = MemPatch;

    fn to_rm(&self) -> Rm<'_> {
        Rm::Mem(self.address())
    }

    fn mmx_patch(&self, fields: &ModrmFields) -> MemPatch {
        MemPatch::new(self.address(), fields)
    }
}

macro_rules! mmx_methods {
    ($($name:ident => $op:ident),* $(,)?) => {$(
        pub fn $name<S: MmxRm>(
            &mut self,
            dst: MmxReg,
            src: S,
        ) -> Result<(RegPatch<MmxReg>, S::Patch)> {
            self.mmx_op(MmxOp::$op, dst, src)
        }
    )*};
}

impl Assembler<'_> {
    /// `EMMS`: empty the MMX state before x87 code runs again.
    pub fn emms(&mut self) -> Result<usize> {
        self.require(Features::MMX)?;
        self.encode_fixed(&[0x0F, 0x77])
    }

    /// `MOVD mm, r/m32`.
    pub fn movd_to_mm<S: Rm32>(
        &mut self,
        dst: MmxReg,
        src: S,
    ) -> Result<(RegPatch<MmxReg>, S::Patch)> {
        self.require(Features::MMX)?;
        let f = self.encode(&Form::new(OPC_MOVD_TO_MM, Slot::reg(dst), src.to_rm()))?;
        Ok((RegPatch::reg_field(&f), src.rm_patch(&f)))
    }

    /// `MOVD r/m32, mm`.
    pub fn movd_from_mm<D: Rm32>(
        &mut self,
        dst: D,
        src: MmxReg,
    ) -> Result<(D::Patch, RegPatch<MmxReg>)> {
        self.require(Features::MMX)?;
        let f = self.encode(&Form::new(OPC_MOVD_FROM_MM, Slot::reg(src), dst.to_rm()))?;
        Ok((dst.rm_patch(&f), RegPatch::reg_field(&f)))
    }

    /// `MOVQ mm, mm/m64`.
    pub fn movq<S: MmxRm>(
        &mut self,
        dst: MmxReg,
        src: S,
    ) -> Result<(RegPatch<MmxReg>, S::Patch)> {
        self.mmx_load(OPC_MOVQ_LOAD, dst, src)
    }

    /// `MOVQ m64, mm`.
    pub fn movq_store(
        &mut self,
        dst: Mem64,
        src: MmxReg,
    ) -> Result<(MemPatch, RegPatch<MmxReg>)> {
        self.require(Features::MMX)?;
        let (f, patch) = self.mem_ext(OPC_MOVQ_STORE, Slot::reg(src), dst.address())?;
        Ok((patch, RegPatch::reg_field(&f)))
    }

    pub fn mmx_op<S: MmxRm>(
        &mut self,
        op: MmxOp,
        dst: MmxReg,
        src: S,
    ) -> Result<(RegPatch<MmxReg>, S::Patch)> {
        self.mmx_load(Opcode::ext(op as u8), dst, src)
    }

    /// `mm <- mm/m64` shape shared by MOVQ and the packed operations.
    fn mmx_load<S: MmxRm>(
        &mut self,
        opcode: Opcode,
        dst: MmxReg,
        src: S,
    ) -> Result<(RegPatch<MmxReg>, S::Patch)> {
        self.require(Features::MMX)?;
        let f = self.encode(&Form::new(opcode, Slot::reg(dst), src.to_rm()))?;
        Ok((RegPatch::reg_field(&f), src.mmx_patch(&f)))
    }

    mmx_methods! {
        paddb => Paddb,
        paddw => Paddw,
        paddd => Paddd,
        psubb => Psubb,
        psubw => Psubw,
        psubd => Psubd,
        pand => Pand,
        por => Por,
        pxor => Pxor,
    }
}
