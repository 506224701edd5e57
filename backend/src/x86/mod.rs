//! x86 / x86-64 instruction encoder.
//!
//! [`Assembler`] is the entry point. Instruction families live in one
//! module per instruction-set generation and add inherent methods to it;
//! each is gated on its [`Features`](xjit_core::Features) flag.

pub mod base;
pub mod encoder;
pub mod i486;
pub mod label;
pub mod mmx;
pub mod operand;
pub mod p6;
pub mod patch;
pub mod pentium;
pub mod primitives;
pub mod system;
pub mod x87;

pub use base::{
    AccumulatorImm, AluOperands, ArithOp, BitTestOp, BitTestOperands, ByCl, ByOne, Ext3Op,
    ExtendOperands, ImulOperands, LeaDest, MovOperands, NativeRm, PushPopOperand, ShiftOp,
    ShiftOperands, TestOperands, XchgOperands,
};
pub use encoder::{Assembler, Rm, Slot};
pub use i486::BswapReg;
pub use label::{BindError, NearLabel, ShortLabel};
pub use mmx::{MmxOp, MmxRm};
pub use operand::{RegRmPair, Rm16, Rm32, Rm64, Rm8, RmOperand, RmRegPair};
pub use patch::{
    AddrPatch, DispPatch, ImmPatch, MemPatch, Rel32Patch, Rel8Patch, RegPatch, RelPatch,
};
pub use system::SystemGpReg;
pub use x87::{FloatMem, FpuArith, IntMem};
