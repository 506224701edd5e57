//! Operand-side traits shared by the instruction families.

use std::fmt;

use xjit_core::{
    Mem16, Mem32, Mem64, Mem8, MemOperand, OperandSize, Reg16, Reg32, Reg64, Reg8,
};

use super::encoder::{Rm, Slot};
use super::patch::{MemPatch, RegPatch};
use super::primitives::ModrmFields;

/// A register or sized memory operand that can occupy ModR/M.rm.
///
/// `Patch` is what the encoder hands back for the operand: a
/// [`RegPatch`] for registers, a [`MemPatch`] for memory.
pub trait RmOperand: Copy {
    const SIZE: OperandSize;
    type Patch: Copy + fmt::Debug;

    fn to_rm(&self) -> Rm<'_>;

    fn rm_patch(&self, fields: &ModrmFields) -> Self::Patch;
}

macro_rules! rm_reg {
    ($($reg:ty),*) => {$(
        impl RmOperand for $reg {
            const SIZE: OperandSize = <$reg as xjit_core::GpReg>::SIZE;
            type Patch = RegPatch<$reg>;

            #[inline]
            fn to_rm(&self) -> Rm<'_> {
                Rm::Reg(Slot::gp(*self))
            }

            #[inline]
            fn rm_patch(&self, fields: &ModrmFields) -> RegPatch<$reg> {
                RegPatch::rm_field(fields)
            }
        }
    )*};
}

macro_rules! rm_mem {
    ($($mem:ty),*) => {$(
        impl RmOperand for $mem {
            const SIZE: OperandSize = <$mem as MemOperand>::SIZE;
            type Patch = MemPatch;

            #[inline]
            fn to_rm(&self) -> Rm<'_> {
                Rm::Mem(self.address())
            }

            #[inline]
            fn rm_patch(&self, fields: &ModrmFields) -> MemPatch {
                MemPatch::new(self.address(), fields)
            }
        }
    )*};
}

rm_reg!(Reg8, Reg16, Reg32, Reg64);
rm_mem!(Mem8, Mem16, Mem32, Mem64);

/// Byte-sized r/m operand (`Reg8` or `Mem8`).
pub trait Rm8: RmOperand {}
/// Word-sized r/m operand.
pub trait Rm16: RmOperand {}
/// Dword-sized r/m operand.
pub trait Rm32: RmOperand {}
/// Qword-sized r/m operand.
pub trait Rm64: RmOperand {}

impl Rm8 for Reg8 {}
impl Rm8 for Mem8 {}
impl Rm16 for Reg16 {}
impl Rm16 for Mem16 {}
impl Rm32 for Reg32 {}
impl Rm32 for Mem32 {}
impl Rm64 for Reg64 {}
impl Rm64 for Mem64 {}

/// `(r/m, reg)` pairs of one width, any of 8/16/32/64 bits.
pub trait RmRegPair {}

/// `(reg, r/m)` pairs of one width, 16/32/64 bits only (CMOVcc and
/// other instructions without a byte form).
pub trait RegRmPair {}

macro_rules! pairs {
    ($($reg:ty, $mem:ty);*) => {$(
        impl RmRegPair for ($reg, $reg) {}
        impl RmRegPair for ($mem, $reg) {}
    )*};
}

pairs!(Reg8, Mem8; Reg16, Mem16; Reg32, Mem32; Reg64, Mem64);

impl RegRmPair for (Reg16, Reg16) {}
impl RegRmPair for (Reg16, Mem16) {}
impl RegRmPair for (Reg32, Reg32) {}
impl RegRmPair for (Reg32, Mem32) {}
impl RegRmPair for (Reg64, Reg64) {}
impl RegRmPair for (Reg64, Mem64) {}
