//! The i386 integer instruction set, available on every target.
//!
//! Two-operand families dispatch on the Rust types of their operands: each
//! family trait is implemented only for the operand tuples the hardware can
//! encode, so a width mismatch (`add(Reg32, Reg8)`) or an immediate with no
//! matching form (`add(Reg64, i64)`) does not compile. What can only be
//! known at run time (mode, REX conflicts, enabled features) is checked
//! before anything is written.

#![allow(non_upper_case_globals)]

use xjit_core::imm::{fits_i32, fits_i8};
use xjit_core::{
    Address, Cond, EncodeError, GpReg, Immediate, Mem16, Mem32, Mem64, Mem8, OperandSize,
    Reg16, Reg32, Reg64, Reg8, Result,
};

use super::encoder::{Assembler, Form, Plain, Rm, Slot};
use super::label::{NearLabel, ShortLabel};
use super::operand::{Rm32, Rm8, RmOperand};
use super::patch::{ImmPatch, MemPatch, Rel32Patch, Rel8Patch, RegPatch};
use super::primitives::{ImmBytes, Opcode};

// -- Opcodes --

const OPC_ARITH_EvIz: Opcode = Opcode::sized(0x80);
const OPC_ARITH_EvIb: Opcode = Opcode::new(0x83);

const OPC_MOV_EvGv: Opcode = Opcode::sized(0x88);
const OPC_MOV_GvEv: Opcode = Opcode::sized(0x8A);
const OPC_MOV_EvIz: Opcode = Opcode::sized(0xC6);
const OPC_MOVB_Ib: Opcode = Opcode::new(0xB0);
const OPC_MOV_Iv: Opcode = Opcode::new(0xB8);
const OPC_LEA: Opcode = Opcode::new(0x8D);

const OPC_TEST_EvGv: Opcode = Opcode::sized(0x84);
const OPC_TEST_AIz: Opcode = Opcode::sized(0xA8);
const OPC_XCHG_EvGv: Opcode = Opcode::sized(0x86);

const OPC_SHIFT_1: Opcode = Opcode::sized(0xD0);
const OPC_SHIFT_Ib: Opcode = Opcode::sized(0xC0);
const OPC_SHIFT_cl: Opcode = Opcode::sized(0xD2);

const OPC_GRP3: Opcode = Opcode::sized(0xF6);
const OPC_GRP4: Opcode = Opcode::sized(0xFE);
const OPC_GRP5: Opcode = Opcode::new(0xFF);

const OPC_PUSH_r: Opcode = Opcode::new(0x50);
const OPC_POP_r: Opcode = Opcode::new(0x58);
const OPC_PUSH_Ib: Opcode = Opcode::new(0x6A);
const OPC_PUSH_Iz: Opcode = Opcode::new(0x68);
const OPC_POP_Ev: Opcode = Opcode::new(0x8F);

const OPC_MOVZBL: Opcode = Opcode::ext(0xB6);
const OPC_MOVSXD: Opcode = Opcode::new(0x63);
const OPC_SETCC: Opcode = Opcode::ext(0x90);
const OPC_BT_EvGv: Opcode = Opcode::ext(0xA3);
const OPC_GRPBT: Opcode = Opcode::ext(0xBA);

const OPC_IMUL_GvEv: Opcode = Opcode::ext(0xAF);
const OPC_IMUL_GvEvIb: Opcode = Opcode::new(0x6B);
const OPC_IMUL_GvEvIz: Opcode = Opcode::new(0x69);

const OPC_JCC_short: Opcode = Opcode::new(0x70);
const OPC_JCC_long: Opcode = Opcode::ext(0x80);
const OPC_JMP_short: Opcode = Opcode::new(0xEB);
const OPC_JMP_long: Opcode = Opcode::new(0xE9);
const OPC_CALL_Jz: Opcode = Opcode::new(0xE8);
const OPC_LOOP: Opcode = Opcode::new(0xE2);
const OPC_JECXZ: Opcode = Opcode::new(0xE3);

const OPC_CBW: Opcode = Opcode::new(0x98);
const OPC_CWD: Opcode = Opcode::new(0x99);
const OPC_RET: u8 = 0xC3;
const OPC_RET_Iw: Opcode = Opcode::new(0xC2);
const OPC_INT_Ib: Opcode = Opcode::new(0xCD);
const OPC_NOP: u8 = 0x90;

// -- Sub-operation enums --

/// Arithmetic sub-opcodes (ModR/M.reg of 0x80/0x81/0x83, bits 5:3 of the
/// register forms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

impl ArithOp {
    /// `op r/m, reg`.
    const fn store_opcode(self) -> Opcode {
        Opcode::sized((self as u8) << 3)
    }

    /// `op reg, r/m`.
    const fn load_opcode(self) -> Opcode {
        Opcode::sized(((self as u8) << 3) | 2)
    }

    /// `op AL/eAX, imm`.
    const fn acc_opcode(self) -> Opcode {
        Opcode::sized(((self as u8) << 3) | 4)
    }
}

/// Shift/rotate sub-opcodes (ModR/M.reg of 0xC0/0xD0/0xD2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShiftOp {
    Rol = 0,
    Ror = 1,
    Rcl = 2,
    Rcr = 3,
    Shl = 4,
    Shr = 5,
    Sar = 7,
}

/// Group 3 sub-opcodes (ModR/M.reg of 0xF6/0xF7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext3Op {
    Not = 2,
    Neg = 3,
    Mul = 4,
    Imul = 5,
    Div = 6,
    Idiv = 7,
}

/// Bit-test sub-opcodes (ModR/M.reg of 0F BA).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BitTestOp {
    Bt = 4,
    Bts = 5,
    Btr = 6,
    Btc = 7,
}

impl BitTestOp {
    /// `0F A3/AB/B3/BB`: `op r/m, reg`.
    const fn reg_opcode(self) -> Opcode {
        OPC_BT_EvGv.plus(((self as u8) - 4) << 3)
    }
}

/// Shift count held in CL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByCl;

/// Shift count of one (the `D0`/`D1` forms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByOne;

// -- Family traits --

/// Operand tuples of ADD, OR, ADC, SBB, AND, SUB, XOR and CMP.
pub trait AluOperands {
    type Output;
    fn encode_alu(self, asm: &mut Assembler<'_>, op: ArithOp) -> Result<Self::Output>;
}

/// Operand tuples of MOV between general registers, memory and immediates.
pub trait MovOperands {
    type Output;
    fn encode_mov(self, asm: &mut Assembler<'_>) -> Result<Self::Output>;
}

pub trait TestOperands {
    type Output;
    fn encode_test(self, asm: &mut Assembler<'_>) -> Result<Self::Output>;
}

pub trait XchgOperands {
    type Output;
    fn encode_xchg(self, asm: &mut Assembler<'_>) -> Result<Self::Output>;
}

/// `(destination, count)` where the count is a `u8`, [`ByCl`] or [`ByOne`].
pub trait ShiftOperands {
    type Output;
    fn encode_shift(self, asm: &mut Assembler<'_>, op: ShiftOp) -> Result<Self::Output>;
}

/// Two-operand `IMUL reg, r/m` and three-operand `IMUL reg, r/m, imm`.
pub trait ImulOperands {
    type Output;
    fn encode_imul(self, asm: &mut Assembler<'_>) -> Result<Self::Output>;
}

pub trait BitTestOperands {
    type Output;
    fn encode_bit_test(self, asm: &mut Assembler<'_>, op: BitTestOp) -> Result<Self::Output>;
}

/// `(wide register, narrow r/m)` pairs of MOVZX and MOVSX.
pub trait ExtendOperands {
    type Output;
    fn encode_extend(self, asm: &mut Assembler<'_>, signed: bool) -> Result<Self::Output>;
}

/// Operands of PUSH and POP: word registers and memory, plus the native
/// stack width (dword in 32-bit mode, qword in 64-bit mode).
pub trait PushPopOperand: Copy {
    type Output;
    fn encode_push(self, asm: &mut Assembler<'_>) -> Result<Self::Output>;
    fn encode_pop(self, asm: &mut Assembler<'_>) -> Result<Self::Output>;
}

/// Registers with an accumulator-immediate form for immediates of type `T`.
pub trait AccumulatorImm<T: Immediate>: GpReg {}

impl AccumulatorImm<i8> for Reg8 {}
impl AccumulatorImm<u8> for Reg8 {}
impl AccumulatorImm<i16> for Reg16 {}
impl AccumulatorImm<u16> for Reg16 {}
impl AccumulatorImm<i32> for Reg32 {}
impl AccumulatorImm<u32> for Reg32 {}
impl AccumulatorImm<i32> for Reg64 {}

/// Destination registers of LEA.
pub trait LeaDest: GpReg {}

impl LeaDest for Reg16 {}
impl LeaDest for Reg32 {}
impl LeaDest for Reg64 {}

/// Indirect branch targets of the native width.
pub trait NativeRm: RmOperand {}

impl NativeRm for Reg32 {}
impl NativeRm for Mem32 {}
impl NativeRm for Reg64 {}
impl NativeRm for Mem64 {}

// -- ALU --

macro_rules! alu_operands {
    ($reg:ty, $mem:ty, [$($imm:ty),*] $(, sx $sx:ty)?) => {
        impl AluOperands for ($reg, $reg) {
            type Output = (RegPatch<$reg>, RegPatch<$reg>);
            fn encode_alu(self, asm: &mut Assembler<'_>, op: ArithOp) -> Result<Self::Output> {
                asm.rm_reg(op.store_opcode(), self.0, self.1)
            }
        }

        impl AluOperands for ($mem, $reg) {
            type Output = (MemPatch, RegPatch<$reg>);
            fn encode_alu(self, asm: &mut Assembler<'_>, op: ArithOp) -> Result<Self::Output> {
                asm.rm_reg(op.store_opcode(), self.0, self.1)
            }
        }

        impl AluOperands for ($reg, $mem) {
            type Output = (RegPatch<$reg>, MemPatch);
            fn encode_alu(self, asm: &mut Assembler<'_>, op: ArithOp) -> Result<Self::Output> {
                asm.reg_rm(op.load_opcode(), self.0, self.1)
            }
        }

        $(
            impl AluOperands for ($reg, $imm) {
                type Output = (RegPatch<$reg>, ImmPatch<$imm>);
                fn encode_alu(self, asm: &mut Assembler<'_>, op: ArithOp) -> Result<Self::Output> {
                    asm.rm_imm(OPC_ARITH_EvIz, op as u8, self.0, self.1)
                }
            }

            impl AluOperands for ($mem, $imm) {
                type Output = (MemPatch, ImmPatch<$imm>);
                fn encode_alu(self, asm: &mut Assembler<'_>, op: ArithOp) -> Result<Self::Output> {
                    asm.rm_imm(OPC_ARITH_EvIz, op as u8, self.0, self.1)
                }
            }
        )*

        $(
            impl AluOperands for ($reg, $sx) {
                type Output = (RegPatch<$reg>, ImmPatch<$sx>);
                fn encode_alu(self, asm: &mut Assembler<'_>, op: ArithOp) -> Result<Self::Output> {
                    asm.rm_imm(OPC_ARITH_EvIb, op as u8, self.0, self.1)
                }
            }

            impl AluOperands for ($mem, $sx) {
                type Output = (MemPatch, ImmPatch<$sx>);
                fn encode_alu(self, asm: &mut Assembler<'_>, op: ArithOp) -> Result<Self::Output> {
                    asm.rm_imm(OPC_ARITH_EvIb, op as u8, self.0, self.1)
                }
            }
        )?
    };
}

alu_operands!(Reg8, Mem8, [i8, u8]);
alu_operands!(Reg16, Mem16, [i16, u16], sx i8);
alu_operands!(Reg32, Mem32, [i32, u32], sx i8);
alu_operands!(Reg64, Mem64, [i32], sx i8);

// -- MOV --

macro_rules! mov_operands {
    ($reg:ty, $mem:ty) => {
        impl MovOperands for ($reg, $reg) {
            type Output = (RegPatch<$reg>, RegPatch<$reg>);
            fn encode_mov(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.rm_reg(OPC_MOV_EvGv, self.0, self.1)
            }
        }

        impl MovOperands for ($mem, $reg) {
            type Output = (MemPatch, RegPatch<$reg>);
            fn encode_mov(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.rm_reg(OPC_MOV_EvGv, self.0, self.1)
            }
        }

        impl MovOperands for ($reg, $mem) {
            type Output = (RegPatch<$reg>, MemPatch);
            fn encode_mov(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.reg_rm(OPC_MOV_GvEv, self.0, self.1)
            }
        }
    };
}

/// `MOV reg, imm` through the `+r` form, `MOV mem, imm` through C6/C7.
macro_rules! mov_imm_operands {
    ($reg:ty, $mem:ty, $opc:expr, [$($imm:ty),*]) => {$(
        impl MovOperands for ($reg, $imm) {
            type Output = (RegPatch<$reg>, ImmPatch<$imm>);
            fn encode_mov(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.mov_reg_imm($opc, self.0, self.1)
            }
        }

        impl MovOperands for ($mem, $imm) {
            type Output = (MemPatch, ImmPatch<$imm>);
            fn encode_mov(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.rm_imm(OPC_MOV_EvIz, 0, self.0, self.1)
            }
        }
    )*};
}

mov_operands!(Reg8, Mem8);
mov_operands!(Reg16, Mem16);
mov_operands!(Reg32, Mem32);
mov_operands!(Reg64, Mem64);
mov_imm_operands!(Reg8, Mem8, OPC_MOVB_Ib, [i8, u8]);
mov_imm_operands!(Reg16, Mem16, OPC_MOV_Iv, [i16, u16]);
mov_imm_operands!(Reg32, Mem32, OPC_MOV_Iv, [i32, u32]);

/// `MOV r64, imm64` (REX.W B8+r io).
impl MovOperands for (Reg64, i64) {
    type Output = (RegPatch<Reg64>, ImmPatch<i64>);
    fn encode_mov(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
        asm.mov_reg_imm(OPC_MOV_Iv, self.0, self.1)
    }
}

impl MovOperands for (Reg64, u64) {
    type Output = (RegPatch<Reg64>, ImmPatch<u64>);
    fn encode_mov(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
        asm.mov_reg_imm(OPC_MOV_Iv, self.0, self.1)
    }
}

/// `MOV r/m64, imm32` sign-extended (REX.W C7 /0 id).
impl MovOperands for (Reg64, i32) {
    type Output = (RegPatch<Reg64>, ImmPatch<i32>);
    fn encode_mov(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
        asm.rm_imm(OPC_MOV_EvIz, 0, self.0, self.1)
    }
}

impl MovOperands for (Mem64, i32) {
    type Output = (MemPatch, ImmPatch<i32>);
    fn encode_mov(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
        asm.rm_imm(OPC_MOV_EvIz, 0, self.0, self.1)
    }
}

// -- TEST / XCHG --

macro_rules! test_xchg_operands {
    ($reg:ty, $mem:ty, [$($imm:ty),*]) => {
        impl TestOperands for ($reg, $reg) {
            type Output = (RegPatch<$reg>, RegPatch<$reg>);
            fn encode_test(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.rm_reg(OPC_TEST_EvGv, self.0, self.1)
            }
        }

        impl TestOperands for ($mem, $reg) {
            type Output = (MemPatch, RegPatch<$reg>);
            fn encode_test(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.rm_reg(OPC_TEST_EvGv, self.0, self.1)
            }
        }

        $(
            impl TestOperands for ($reg, $imm) {
                type Output = (RegPatch<$reg>, ImmPatch<$imm>);
                fn encode_test(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                    asm.rm_imm(OPC_GRP3, 0, self.0, self.1)
                }
            }

            impl TestOperands for ($mem, $imm) {
                type Output = (MemPatch, ImmPatch<$imm>);
                fn encode_test(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                    asm.rm_imm(OPC_GRP3, 0, self.0, self.1)
                }
            }
        )*

        impl XchgOperands for ($reg, $reg) {
            type Output = (RegPatch<$reg>, RegPatch<$reg>);
            fn encode_xchg(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.rm_reg(OPC_XCHG_EvGv, self.0, self.1)
            }
        }

        impl XchgOperands for ($mem, $reg) {
            type Output = (MemPatch, RegPatch<$reg>);
            fn encode_xchg(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.rm_reg(OPC_XCHG_EvGv, self.0, self.1)
            }
        }

        impl XchgOperands for ($reg, $mem) {
            type Output = (RegPatch<$reg>, MemPatch);
            fn encode_xchg(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.reg_rm(OPC_XCHG_EvGv, self.0, self.1)
            }
        }
    };
}

test_xchg_operands!(Reg8, Mem8, [i8, u8]);
test_xchg_operands!(Reg16, Mem16, [i16, u16]);
test_xchg_operands!(Reg32, Mem32, [i32, u32]);
test_xchg_operands!(Reg64, Mem64, [i32]);

// -- Shifts --

impl<D: RmOperand> ShiftOperands for (D, u8) {
    type Output = (D::Patch, ImmPatch<u8>);
    fn encode_shift(self, asm: &mut Assembler<'_>, op: ShiftOp) -> Result<Self::Output> {
        asm.rm_imm(OPC_SHIFT_Ib, op as u8, self.0, self.1)
    }
}

impl<D: RmOperand> ShiftOperands for (D, ByCl) {
    type Output = D::Patch;
    fn encode_shift(self, asm: &mut Assembler<'_>, op: ShiftOp) -> Result<Self::Output> {
        asm.rm_ext(OPC_SHIFT_cl, op as u8, self.0)
    }
}

impl<D: RmOperand> ShiftOperands for (D, ByOne) {
    type Output = D::Patch;
    fn encode_shift(self, asm: &mut Assembler<'_>, op: ShiftOp) -> Result<Self::Output> {
        asm.rm_ext(OPC_SHIFT_1, op as u8, self.0)
    }
}

// -- IMUL / bit test --

macro_rules! imul_bt_operands {
    ($reg:ty, $mem:ty, [$($imm:ty),*]) => {
        impl ImulOperands for ($reg, $reg) {
            type Output = (RegPatch<$reg>, RegPatch<$reg>);
            fn encode_imul(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.reg_rm(OPC_IMUL_GvEv, self.0, self.1)
            }
        }

        impl ImulOperands for ($reg, $mem) {
            type Output = (RegPatch<$reg>, MemPatch);
            fn encode_imul(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.reg_rm(OPC_IMUL_GvEv, self.0, self.1)
            }
        }

        impl ImulOperands for ($reg, $reg, i8) {
            type Output = (RegPatch<$reg>, RegPatch<$reg>, ImmPatch<i8>);
            fn encode_imul(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.reg_rm_imm(OPC_IMUL_GvEvIb, self.0, self.1, self.2)
            }
        }

        impl ImulOperands for ($reg, $mem, i8) {
            type Output = (RegPatch<$reg>, MemPatch, ImmPatch<i8>);
            fn encode_imul(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.reg_rm_imm(OPC_IMUL_GvEvIb, self.0, self.1, self.2)
            }
        }

        $(
            impl ImulOperands for ($reg, $reg, $imm) {
                type Output = (RegPatch<$reg>, RegPatch<$reg>, ImmPatch<$imm>);
                fn encode_imul(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                    asm.reg_rm_imm(OPC_IMUL_GvEvIz, self.0, self.1, self.2)
                }
            }

            impl ImulOperands for ($reg, $mem, $imm) {
                type Output = (RegPatch<$reg>, MemPatch, ImmPatch<$imm>);
                fn encode_imul(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                    asm.reg_rm_imm(OPC_IMUL_GvEvIz, self.0, self.1, self.2)
                }
            }
        )*

        impl BitTestOperands for ($reg, $reg) {
            type Output = (RegPatch<$reg>, RegPatch<$reg>);
            fn encode_bit_test(self, asm: &mut Assembler<'_>, op: BitTestOp) -> Result<Self::Output> {
                asm.rm_reg(op.reg_opcode(), self.0, self.1)
            }
        }

        impl BitTestOperands for ($mem, $reg) {
            type Output = (MemPatch, RegPatch<$reg>);
            fn encode_bit_test(self, asm: &mut Assembler<'_>, op: BitTestOp) -> Result<Self::Output> {
                asm.rm_reg(op.reg_opcode(), self.0, self.1)
            }
        }

        impl BitTestOperands for ($reg, u8) {
            type Output = (RegPatch<$reg>, ImmPatch<u8>);
            fn encode_bit_test(self, asm: &mut Assembler<'_>, op: BitTestOp) -> Result<Self::Output> {
                asm.rm_imm(OPC_GRPBT, op as u8, self.0, self.1)
            }
        }

        impl BitTestOperands for ($mem, u8) {
            type Output = (MemPatch, ImmPatch<u8>);
            fn encode_bit_test(self, asm: &mut Assembler<'_>, op: BitTestOp) -> Result<Self::Output> {
                asm.rm_imm(OPC_GRPBT, op as u8, self.0, self.1)
            }
        }
    };
}

imul_bt_operands!(Reg16, Mem16, [i16, u16]);
imul_bt_operands!(Reg32, Mem32, [i32, u32]);
imul_bt_operands!(Reg64, Mem64, [i32]);

// -- MOVZX / MOVSX --

macro_rules! extend_operands {
    ($dst:ty: $($src:ty => $word:expr),*) => {$(
        impl ExtendOperands for ($dst, $src) {
            type Output = (RegPatch<$dst>, <$src as RmOperand>::Patch);
            fn encode_extend(self, asm: &mut Assembler<'_>, signed: bool) -> Result<Self::Output> {
                // 0F B6 / B7 / BE / BF
                let sign = if signed { 8 } else { 0 };
                let opcode = OPC_MOVZBL.plus(sign | $word);
                asm.reg_rm(opcode, self.0, self.1)
            }
        }
    )*};
}

extend_operands!(Reg16: Reg8 => 0, Mem8 => 0);
extend_operands!(Reg32: Reg8 => 0, Mem8 => 0, Reg16 => 1, Mem16 => 1);
extend_operands!(Reg64: Reg8 => 0, Mem8 => 0, Reg16 => 1, Mem16 => 1);

// -- PUSH / POP --

macro_rules! push_pop_reg {
    ($($reg:ty),*) => {$(
        impl PushPopOperand for $reg {
            type Output = RegPatch<$reg>;
            fn encode_push(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.stack_reg(OPC_PUSH_r, self)
            }
            fn encode_pop(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.stack_reg(OPC_POP_r, self)
            }
        }
    )*};
}

macro_rules! push_pop_mem {
    ($($mem:ty),*) => {$(
        impl PushPopOperand for $mem {
            type Output = MemPatch;
            fn encode_push(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.stack_rm(OPC_GRP5, 6, self)
            }
            fn encode_pop(self, asm: &mut Assembler<'_>) -> Result<Self::Output> {
                asm.stack_rm(OPC_POP_Ev, 0, self)
            }
        }
    )*};
}

push_pop_reg!(Reg16, Reg32, Reg64);
push_pop_mem!(Mem16, Mem32, Mem64);

// -- Instructions --

macro_rules! alu_methods {
    ($($name:ident => $op:ident),* $(,)?) => {$(
        #[doc = concat!("`", stringify!($op), " dst, src`.")]
        pub fn $name<D, S>(&mut self, dst: D, src: S) -> Result<<(D, S) as AluOperands>::Output>
        where
            (D, S): AluOperands,
        {
            (dst, src).encode_alu(self, ArithOp::$op)
        }
    )*};
}

macro_rules! shift_methods {
    ($($name:ident => $op:ident),* $(,)?) => {$(
        pub fn $name<D, C>(&mut self, dst: D, count: C) -> Result<<(D, C) as ShiftOperands>::Output>
        where
            (D, C): ShiftOperands,
        {
            (dst, count).encode_shift(self, ShiftOp::$op)
        }
    )*};
}

macro_rules! group3_methods {
    ($($name:ident => $op:ident),* $(,)?) => {$(
        pub fn $name<D: RmOperand>(&mut self, dst: D) -> Result<D::Patch> {
            self.rm_ext(OPC_GRP3, Ext3Op::$op as u8, dst)
        }
    )*};
}

macro_rules! bit_test_methods {
    ($($name:ident => $op:ident),* $(,)?) => {$(
        pub fn $name<D, S>(&mut self, dst: D, bit: S) -> Result<<(D, S) as BitTestOperands>::Output>
        where
            (D, S): BitTestOperands,
        {
            (dst, bit).encode_bit_test(self, BitTestOp::$op)
        }
    )*};
}

macro_rules! fixed_methods {
    ($($(#[$doc:meta])* $name:ident => [$($byte:expr),+]),* $(,)?) => {$(
        $(#[$doc])*
        pub fn $name(&mut self) -> Result<usize> {
            self.encode_fixed(&[$($byte),+])
        }
    )*};
}

impl Assembler<'_> {
    // -- Arithmetic --

    /// General ALU entry point; `add`, `sub`, ... are shorthands.
    pub fn alu<D, S>(&mut self, op: ArithOp, dst: D, src: S) -> Result<<(D, S) as AluOperands>::Output>
    where
        (D, S): AluOperands,
    {
        (dst, src).encode_alu(self, op)
    }

    alu_methods! {
        add => Add,
        or => Or,
        adc => Adc,
        sbb => Sbb,
        and => And,
        sub => Sub,
        xor => Xor,
        cmp => Cmp,
    }

    /// Short accumulator form `op AL/AX/EAX/RAX, imm` (04, 05, 0C, ...).
    ///
    /// One byte shorter than the general form and chosen only when called
    /// explicitly. `dst` must be the accumulator.
    pub fn alu_acc<R, T>(&mut self, op: ArithOp, dst: R, imm: T) -> Result<ImmPatch<T>>
    where
        R: AccumulatorImm<T>,
        T: Immediate,
    {
        self.acc_imm(op.acc_opcode(), dst, imm)
    }

    /// `TEST AL/AX/EAX/RAX, imm` (A8/A9).
    pub fn test_acc<R, T>(&mut self, dst: R, imm: T) -> Result<ImmPatch<T>>
    where
        R: AccumulatorImm<T>,
        T: Immediate,
    {
        self.acc_imm(OPC_TEST_AIz, dst, imm)
    }

    fn acc_imm<R, T>(&mut self, opcode: Opcode, dst: R, imm: T) -> Result<ImmPatch<T>>
    where
        R: AccumulatorImm<T>,
        T: Immediate,
    {
        if !dst.is_accumulator() {
            return Err(EncodeError::NotAccumulator);
        }
        let plain = Plain::new(opcode).size(R::SIZE).imm(ImmBytes::of(imm));
        let f = self.encode_plain(&plain)?;
        Ok(ImmPatch::trailing(&f))
    }

    group3_methods! {
        not => Not,
        neg => Neg,
        mul => Mul,
        imul1 => Imul,
        div => Div,
        idiv => Idiv,
    }

    pub fn inc<D: RmOperand>(&mut self, dst: D) -> Result<D::Patch> {
        self.rm_ext(OPC_GRP4, 0, dst)
    }

    pub fn dec<D: RmOperand>(&mut self, dst: D) -> Result<D::Patch> {
        self.rm_ext(OPC_GRP4, 1, dst)
    }

    /// `IMUL reg, r/m`.
    pub fn imul<D, S>(&mut self, dst: D, src: S) -> Result<<(D, S) as ImulOperands>::Output>
    where
        (D, S): ImulOperands,
    {
        (dst, src).encode_imul(self)
    }

    /// `IMUL reg, r/m, imm`.
    pub fn imul3<D, S, T>(
        &mut self,
        dst: D,
        src: S,
        imm: T,
    ) -> Result<<(D, S, T) as ImulOperands>::Output>
    where
        (D, S, T): ImulOperands,
    {
        (dst, src, imm).encode_imul(self)
    }

    pub fn shift<D, C>(&mut self, op: ShiftOp, dst: D, count: C) -> Result<<(D, C) as ShiftOperands>::Output>
    where
        (D, C): ShiftOperands,
    {
        (dst, count).encode_shift(self, op)
    }

    shift_methods! {
        rol => Rol,
        ror => Ror,
        rcl => Rcl,
        rcr => Rcr,
        shl => Shl,
        shr => Shr,
        sar => Sar,
    }

    bit_test_methods! {
        bt => Bt,
        bts => Bts,
        btr => Btr,
        btc => Btc,
    }

    // -- Data movement --

    pub fn mov<D, S>(&mut self, dst: D, src: S) -> Result<<(D, S) as MovOperands>::Output>
    where
        (D, S): MovOperands,
    {
        (dst, src).encode_mov(self)
    }

    pub(crate) fn mov_reg_imm<R: GpReg, T: Immediate>(
        &mut self,
        opcode: Opcode,
        dst: R,
        imm: T,
    ) -> Result<(RegPatch<R>, ImmPatch<T>)> {
        let plain = Plain::new(opcode)
            .size(R::SIZE)
            .reg(Slot::gp(dst))
            .imm(ImmBytes::of(imm));
        let f = self.encode_plain(&plain)?;
        Ok((RegPatch::opcode_field(&f), ImmPatch::trailing(&f)))
    }

    pub fn lea<R: LeaDest>(&mut self, dst: R, addr: Address) -> Result<(RegPatch<R>, MemPatch)> {
        let f = self.encode(&Form::new(OPC_LEA, Slot::gp(dst), Rm::Mem(&addr)).size(R::SIZE))?;
        Ok((RegPatch::reg_field(&f), MemPatch::new(&addr, &f)))
    }

    pub fn test<D, S>(&mut self, dst: D, src: S) -> Result<<(D, S) as TestOperands>::Output>
    where
        (D, S): TestOperands,
    {
        (dst, src).encode_test(self)
    }

    pub fn xchg<D, S>(&mut self, dst: D, src: S) -> Result<<(D, S) as XchgOperands>::Output>
    where
        (D, S): XchgOperands,
    {
        (dst, src).encode_xchg(self)
    }

    pub fn movzx<D, S>(&mut self, dst: D, src: S) -> Result<<(D, S) as ExtendOperands>::Output>
    where
        (D, S): ExtendOperands,
    {
        (dst, src).encode_extend(self, false)
    }

    pub fn movsx<D, S>(&mut self, dst: D, src: S) -> Result<<(D, S) as ExtendOperands>::Output>
    where
        (D, S): ExtendOperands,
    {
        (dst, src).encode_extend(self, true)
    }

    /// `MOVSXD r64, r/m32` (64-bit mode only).
    pub fn movsxd<S: Rm32>(&mut self, dst: Reg64, src: S) -> Result<(RegPatch<Reg64>, S::Patch)> {
        self.reg_rm(OPC_MOVSXD, dst, src)
    }

    pub fn setcc<D: Rm8>(&mut self, cond: Cond, dst: D) -> Result<D::Patch> {
        self.rm_ext(OPC_SETCC.plus(cond.code()), 0, dst)
    }

    // -- Stack --

    pub fn push<O: PushPopOperand>(&mut self, src: O) -> Result<O::Output> {
        src.encode_push(self)
    }

    pub fn pop<O: PushPopOperand>(&mut self, dst: O) -> Result<O::Output> {
        dst.encode_pop(self)
    }

    /// `PUSH imm8`, sign-extended to the stack width.
    pub fn push_imm8(&mut self, imm: i8) -> Result<ImmPatch<i8>> {
        let f = self.encode_plain(&Plain::new(OPC_PUSH_Ib).imm(ImmBytes::of(imm)))?;
        Ok(ImmPatch::trailing(&f))
    }

    /// `PUSH imm32`, sign-extended to 64 bits in long mode.
    pub fn push_imm32(&mut self, imm: i32) -> Result<ImmPatch<i32>> {
        let f = self.encode_plain(&Plain::new(OPC_PUSH_Iz).imm(ImmBytes::of(imm)))?;
        Ok(ImmPatch::trailing(&f))
    }

    /// Stack and indirect-branch operands have no dword form in long mode.
    fn check_stack_size(&self, size: OperandSize) -> Result<()> {
        if size == OperandSize::Dword {
            self.require_32bit("dword operand of a 64-bit default instruction")?;
        }
        Ok(())
    }

    pub(crate) fn stack_reg<R: GpReg>(&mut self, opcode: Opcode, reg: R) -> Result<RegPatch<R>> {
        self.check_stack_size(R::SIZE)?;
        let plain = Plain::new(opcode).size(R::SIZE).default64().reg(Slot::gp(reg));
        let f = self.encode_plain(&plain)?;
        Ok(RegPatch::opcode_field(&f))
    }

    pub(crate) fn stack_rm<M: RmOperand>(&mut self, opcode: Opcode, ext: u8, m: M) -> Result<M::Patch> {
        self.check_stack_size(M::SIZE)?;
        let form = Form::new(opcode, Slot::ext(ext), m.to_rm()).size(M::SIZE).default64();
        let f = self.encode(&form)?;
        Ok(m.rm_patch(&f))
    }

    // -- Sign extension of the accumulator --

    fn acc_convert(&mut self, opcode: Opcode, size: OperandSize) -> Result<usize> {
        let f = self.encode_plain(&Plain::new(opcode).size(size))?;
        Ok(f.start)
    }

    /// AL -> AX.
    pub fn cbw(&mut self) -> Result<usize> {
        self.acc_convert(OPC_CBW, OperandSize::Word)
    }

    /// AX -> EAX.
    pub fn cwde(&mut self) -> Result<usize> {
        self.acc_convert(OPC_CBW, OperandSize::Dword)
    }

    /// EAX -> RAX.
    pub fn cdqe(&mut self) -> Result<usize> {
        self.acc_convert(OPC_CBW, OperandSize::Qword)
    }

    /// AX -> DX:AX.
    pub fn cwd(&mut self) -> Result<usize> {
        self.acc_convert(OPC_CWD, OperandSize::Word)
    }

    /// EAX -> EDX:EAX.
    pub fn cdq(&mut self) -> Result<usize> {
        self.acc_convert(OPC_CWD, OperandSize::Dword)
    }

    /// RAX -> RDX:RAX.
    pub fn cqo(&mut self) -> Result<usize> {
        self.acc_convert(OPC_CWD, OperandSize::Qword)
    }

    // -- Misc --

    fixed_methods! {
        ret => [OPC_RET],
        nop => [OPC_NOP],
        int3 => [0xCC],
        hlt => [0xF4],
        leave => [0xC9],
        clc => [0xF8],
        stc => [0xF9],
        cmc => [0xF5],
        cld => [0xFC],
        std => [0xFD],
    }

    /// `RET imm16`: return and pop `imm` bytes of arguments.
    pub fn ret_imm(&mut self, imm: u16) -> Result<ImmPatch<u16>> {
        let f = self.encode_plain(&Plain::new(OPC_RET_Iw).imm(ImmBytes::of(imm)))?;
        Ok(ImmPatch::trailing(&f))
    }

    pub fn int(&mut self, vector: u8) -> Result<ImmPatch<u8>> {
        let f = self.encode_plain(&Plain::new(OPC_INT_Ib).imm(ImmBytes::of(vector)))?;
        Ok(ImmPatch::trailing(&f))
    }

    /// `n` one-byte NOPs, written in one piece or not at all.
    pub fn pad(&mut self, n: usize) -> Result<usize> {
        let start = self.buffer().offset();
        let remaining = self.buffer().remaining();
        if n > remaining {
            return Err(EncodeError::BufferFull {
                needed: n,
                remaining,
            });
        }
        let chunk = [OPC_NOP; 16];
        let mut left = n;
        while left > 0 {
            let len = left.min(chunk.len());
            self.encode_fixed(&chunk[..len])?;
            left -= len;
        }
        Ok(start)
    }

    // -- Branches --

    fn branch_forward(&mut self, opcode: Opcode, width: usize) -> Result<usize> {
        let f = self.encode_plain(&Plain::new(opcode).imm(ImmBytes::sized(0, width)))?;
        Ok(f.end() - width)
    }

    /// Direct branch to a known `target`; the displacement is range
    /// checked before anything is written.
    fn branch_to(&mut self, opcode: Opcode, width: usize, target: usize) -> Result<usize> {
        let len = usize::from(opcode.escape) + 1 + width;
        let rel = target as i64 - (self.offset() + len) as i64;
        let fits = if width == 1 {
            fits_i8(rel)
        } else {
            fits_i32(rel)
        };
        if !fits {
            return Err(EncodeError::BranchOutOfRange(rel));
        }
        let f = self.encode_plain(&Plain::new(opcode).imm(ImmBytes::sized(rel, width)))?;
        Ok(f.end() - width)
    }

    pub fn jmp_short_forward(&mut self) -> Result<ShortLabel> {
        self.branch_forward(OPC_JMP_short, 1).map(ShortLabel::new)
    }

    pub fn jcc_short_forward(&mut self, cond: Cond) -> Result<ShortLabel> {
        self.branch_forward(OPC_JCC_short.plus(cond.code()), 1)
            .map(ShortLabel::new)
    }

    /// `LOOP rel8`: decrement ECX/RCX, branch if non-zero.
    pub fn loop_forward(&mut self) -> Result<ShortLabel> {
        self.branch_forward(OPC_LOOP, 1).map(ShortLabel::new)
    }

    /// `JECXZ rel8` (`JRCXZ` in 64-bit mode).
    pub fn jecxz_forward(&mut self) -> Result<ShortLabel> {
        self.branch_forward(OPC_JECXZ, 1).map(ShortLabel::new)
    }

    pub fn jmp_forward(&mut self) -> Result<NearLabel> {
        self.branch_forward(OPC_JMP_long, 4).map(NearLabel::new)
    }

    pub fn jcc_forward(&mut self, cond: Cond) -> Result<NearLabel> {
        self.branch_forward(OPC_JCC_long.plus(cond.code()), 4)
            .map(NearLabel::new)
    }

    pub fn call_forward(&mut self) -> Result<NearLabel> {
        self.branch_forward(OPC_CALL_Jz, 4).map(NearLabel::new)
    }

    pub fn jmp_short_to(&mut self, target: usize) -> Result<Rel8Patch> {
        self.branch_to(OPC_JMP_short, 1, target).map(Rel8Patch::at)
    }

    pub fn jcc_short_to(&mut self, cond: Cond, target: usize) -> Result<Rel8Patch> {
        self.branch_to(OPC_JCC_short.plus(cond.code()), 1, target)
            .map(Rel8Patch::at)
    }

    pub fn jmp_to(&mut self, target: usize) -> Result<Rel32Patch> {
        self.branch_to(OPC_JMP_long, 4, target).map(Rel32Patch::at)
    }

    pub fn jcc_to(&mut self, cond: Cond, target: usize) -> Result<Rel32Patch> {
        self.branch_to(OPC_JCC_long.plus(cond.code()), 4, target)
            .map(Rel32Patch::at)
    }

    pub fn call_to(&mut self, target: usize) -> Result<Rel32Patch> {
        self.branch_to(OPC_CALL_Jz, 4, target).map(Rel32Patch::at)
    }

    /// `JMP r/m`: indirect jump through a register or memory.
    pub fn jmp_indirect<T: NativeRm>(&mut self, target: T) -> Result<T::Patch> {
        self.stack_rm(OPC_GRP5, 4, target)
    }

    /// `CALL r/m`: indirect call through a register or memory.
    pub fn call_indirect<T: NativeRm>(&mut self, target: T) -> Result<T::Patch> {
        self.stack_rm(OPC_GRP5, 2, target)
    }
}
