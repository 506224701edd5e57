//! Pentium additions, each behind its own CPUID feature bit.

use xjit_core::{Features, Mem64, MemOperand, Result};

use super::encoder::{Assembler, Slot};
use super::patch::MemPatch;
use super::primitives::Opcode;

const OPC_CMPXCHG8B: Opcode = Opcode::ext(0xC7);

impl Assembler<'_> {
    /// `CMPXCHG8B m64` (0F C7 /1): compare EDX:EAX with `m`.
    pub fn cmpxchg8b(&mut self, m: Mem64) -> Result<MemPatch> {
        self.require(Features::CX8)?;
        // The operand is always 64 bits wide; no REX.W.
        let (_, patch) = self.mem_ext(OPC_CMPXCHG8B, Slot::ext(1), m.address())?;
        Ok(patch)
    }

    /// `RDTSC`: time-stamp counter into EDX:EAX.
    pub fn rdtsc(&mut self) -> Result<usize> {
        self.require(Features::TSC)?;
        self.encode_fixed(&[0x0F, 0x31])
    }

    /// `RDMSR`: MSR\[ECX\] into EDX:EAX.
    pub fn rdmsr(&mut self) -> Result<usize> {
        self.require(Features::MSR)?;
        self.encode_fixed(&[0x0F, 0x32])
    }

    /// `WRMSR`: EDX:EAX into MSR\[ECX\].
    pub fn wrmsr(&mut self) -> Result<usize> {
        self.require(Features::MSR)?;
        self.encode_fixed(&[0x0F, 0x30])
    }

    pub fn cpuid(&mut self) -> Result<usize> {
        self.require(Features::CPUID)?;
        self.encode_fixed(&[0x0F, 0xA2])
    }
}
