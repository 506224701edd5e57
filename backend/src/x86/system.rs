//! Moves to and from segment, control and debug registers.

use xjit_core::{
    CtrlReg, DbgReg, EncodeError, Features, GpReg, OperandSize, Reg32, Reg64, Register, Result,
    SegReg,
};

use super::encoder::{Assembler, Form, Rm, Slot};
use super::operand::Rm16;
use super::patch::RegPatch;
use super::primitives::Opcode;

const OPC_MOV_TO_SREG: Opcode = Opcode::new(0x8E);
const OPC_MOV_FROM_SREG: Opcode = Opcode::new(0x8C);
const OPC_MOV_FROM_CR: Opcode = Opcode::ext(0x20);
const OPC_MOV_FROM_DR: Opcode = Opcode::ext(0x21);
const OPC_MOV_TO_CR: Opcode = Opcode::ext(0x22);
const OPC_MOV_TO_DR: Opcode = Opcode::ext(0x23);

/// General register on the other side of a control or debug register
/// move. The width is fixed by the mode: `Reg32` in 32-bit code, `Reg64`
/// in 64-bit code, never with REX.W.
pub trait SystemGpReg: GpReg {}

impl SystemGpReg for Reg32 {}
impl SystemGpReg for Reg64 {}

impl Assembler<'_> {
    /// `MOV Sreg, r/m16` (8E /r). CS cannot be loaded this way, and the
    /// returned patch refuses it too.
    pub fn mov_to_sreg<S: Rm16>(
        &mut self,
        dst: SegReg,
        src: S,
    ) -> Result<(RegPatch<SegReg>, S::Patch)> {
        self.require(Features::I386)?;
        if dst == SegReg::Cs {
            return Err(EncodeError::InvalidOperand("MOV to CS"));
        }
        let f = self.encode(&Form::new(OPC_MOV_TO_SREG, Slot::reg(dst), src.to_rm()))?;
        Ok((RegPatch::reg_field(&f).refuse(SegReg::Cs), src.rm_patch(&f)))
    }

    /// `MOV r/m16, Sreg` (8C /r).
    ///
    /// A register destination takes the operand-size prefix; without it
    /// the store writes the whole 32-bit register. A memory destination is
    /// always a 16-bit store.
    pub fn mov_from_sreg<D: Rm16>(
        &mut self,
        dst: D,
        src: SegReg,
    ) -> Result<(D::Patch, RegPatch<SegReg>)> {
        self.require(Features::I386)?;
        let form = Form::new(OPC_MOV_FROM_SREG, Slot::reg(src), dst.to_rm());
        let form = match dst.to_rm() {
            Rm::Reg(_) => form.size(OperandSize::Word),
            Rm::Mem(_) => form,
        };
        let f = self.encode(&form)?;
        Ok((dst.rm_patch(&f), RegPatch::reg_field(&f)))
    }

    /// `MOV CRn, reg` (0F 22 /r). CR8 is 64-bit only and takes REX.R.
    pub fn mov_to_cr<R: SystemGpReg>(
        &mut self,
        dst: CtrlReg,
        src: R,
    ) -> Result<(RegPatch<CtrlReg>, RegPatch<R>)> {
        self.special_mov(OPC_MOV_TO_CR, dst, src)
    }

    /// `MOV reg, CRn` (0F 20 /r).
    pub fn mov_from_cr<R: SystemGpReg>(
        &mut self,
        dst: R,
        src: CtrlReg,
    ) -> Result<(RegPatch<R>, RegPatch<CtrlReg>)> {
        let (special, gp) = self.special_mov(OPC_MOV_FROM_CR, src, dst)?;
        Ok((gp, special))
    }

    /// `MOV DRn, reg` (0F 23 /r).
    pub fn mov_to_dr<R: SystemGpReg>(
        &mut self,
        dst: DbgReg,
        src: R,
    ) -> Result<(RegPatch<DbgReg>, RegPatch<R>)> {
        self.special_mov(OPC_MOV_TO_DR, dst, src)
    }

    /// `MOV reg, DRn` (0F 21 /r).
    pub fn mov_from_dr<R: SystemGpReg>(
        &mut self,
        dst: R,
        src: DbgReg,
    ) -> Result<(RegPatch<R>, RegPatch<DbgReg>)> {
        let (special, gp) = self.special_mov(OPC_MOV_FROM_DR, src, dst)?;
        Ok((gp, special))
    }

    /// Control/debug register in ModR/M.reg, general register in
    /// ModR/M.rm (mod is always 11).
    fn special_mov<S: Register, R: SystemGpReg>(
        &mut self,
        opcode: Opcode,
        special: S,
        gp: R,
    ) -> Result<(RegPatch<S>, RegPatch<R>)> {
        self.require(Features::I386)?;
        match R::SIZE {
            OperandSize::Qword => self.require_64bit("64-bit system register operand")?,
            _ => self.require_32bit("32-bit system register operand in 64-bit mode")?,
        }
        let f = self.encode(&Form::new(opcode, Slot::reg(special), Rm::Reg(Slot::gp(gp))))?;
        Ok((RegPatch::reg_field(&f), RegPatch::rm_field(&f)))
    }
}
