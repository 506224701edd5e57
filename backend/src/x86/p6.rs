//! P6-family additions: conditional moves, RDPMC and the long NOP forms.

use xjit_core::{Cond, EncodeError, Features, GpReg, Result};

use super::encoder::Assembler;
use super::operand::{RegRmPair, RmOperand};
use super::patch::RegPatch;
use super::primitives::Opcode;

const OPC_CMOVCC: Opcode = Opcode::ext(0x40);

/// Recommended multi-byte NOP sequences, indexed by length - 1.
const NOPS: [&[u8]; 9] = [
    &[0x90],
    &[0x66, 0x90],
    &[0x0F, 0x1F, 0x00],
    &[0x0F, 0x1F, 0x40, 0x00],
    &[0x0F, 0x1F, 0x44, 0x00, 0x00],
    &[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00],
    &[0x0F, 0x1F, 0x80, 0x00, 0x00, 0x00, 0x00],
    &[0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
    &[0x66, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
];

impl Assembler<'_> {
    /// `CMOVcc reg, r/m` (0F 40+cc /r).
    pub fn cmovcc<D, S>(&mut self, cond: Cond, dst: D, src: S) -> Result<(RegPatch<D>, S::Patch)>
    where
        D: GpReg,
        S: RmOperand,
        (D, S): RegRmPair,
    {
        self.require(Features::CMOV)?;
        self.reg_rm(OPC_CMOVCC.plus(cond.code()), dst, src)
    }

    /// `RDPMC`: performance counter ECX into EDX:EAX.
    pub fn rdpmc(&mut self) -> Result<usize> {
        self.require(Features::PMC)?;
        self.encode_fixed(&[0x0F, 0x33])
    }

    /// `n` bytes of padding using the fewest NOP instructions.
    pub fn nops(&mut self, n: usize) -> Result<usize> {
        self.require(Features::CMOV)?;
        let start = self.offset();
        let remaining = self.buffer().remaining();
        if n > remaining {
            return Err(EncodeError::BufferFull {
                needed: n,
                remaining,
            });
        }
        let mut left = n;
        while left > 0 {
            let len = left.min(NOPS.len());
            self.encode_fixed(NOPS[len - 1])?;
            left -= len;
        }
        Ok(start)
    }
}
