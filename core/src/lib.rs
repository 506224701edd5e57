pub mod cond;
pub mod config;
pub mod error;
pub mod imm;
pub mod mem;
pub mod reg;

pub use cond::Cond;
pub use config::{Config, Features, Mode};
pub use error::{EncodeError, Result};
pub use imm::Immediate;
pub use mem::{
    byte_ptr, dword_ptr, qword_ptr, word_ptr, AddrSize, Address, AddressingMode, Displacement,
    Layout, Mem16, Mem32, Mem64, Mem8, MemOperand, Scale, Sib,
};
pub use reg::{
    AddressRegister, CtrlReg, DbgReg, FpuReg, GpReg, MmxReg, OperandSize, Reg16, Reg32, Reg64,
    Reg8, Register, RexRequirement, SegReg,
};
