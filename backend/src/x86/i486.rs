//! Instructions added by the i486.

use xjit_core::{Address, Features, GpReg, Reg32, Reg64, Result};

use super::encoder::{Assembler, Plain, Slot};
use super::operand::{RmOperand, RmRegPair};
use super::patch::{MemPatch, RegPatch};
use super::primitives::Opcode;

const OPC_BSWAP: Opcode = Opcode::ext(0xC8);
const OPC_XADD: Opcode = Opcode::ext_sized(0xC0);
const OPC_CMPXCHG: Opcode = Opcode::ext_sized(0xB0);
const OPC_INVLPG: Opcode = Opcode::ext(0x01);

/// BSWAP operands: 32- and 64-bit registers.
pub trait BswapReg: GpReg {}

impl BswapReg for Reg32 {}
impl BswapReg for Reg64 {}

impl Assembler<'_> {
    /// `BSWAP reg` (0F C8+r).
    pub fn bswap<R: BswapReg>(&mut self, reg: R) -> Result<RegPatch<R>> {
        self.require(Features::I486)?;
        let f = self.encode_plain(&Plain::new(OPC_BSWAP).size(R::SIZE).reg(Slot::gp(reg)))?;
        Ok(RegPatch::opcode_field(&f))
    }

    /// `XADD r/m, reg`. Prefix with [`lock`](Self::lock) for an atomic add.
    pub fn xadd<D, S>(&mut self, dst: D, src: S) -> Result<(D::Patch, RegPatch<S>)>
    where
        D: RmOperand,
        S: GpReg,
        (D, S): RmRegPair,
    {
        self.require(Features::I486)?;
        self.rm_reg(OPC_XADD, dst, src)
    }

    /// `CMPXCHG r/m, reg`: compare the accumulator with `dst`.
    pub fn cmpxchg<D, S>(&mut self, dst: D, src: S) -> Result<(D::Patch, RegPatch<S>)>
    where
        D: RmOperand,
        S: GpReg,
        (D, S): RmRegPair,
    {
        self.require(Features::I486)?;
        self.rm_reg(OPC_CMPXCHG, dst, src)
    }

    pub fn invd(&mut self) -> Result<usize> {
        self.require(Features::I486)?;
        self.encode_fixed(&[0x0F, 0x08])
    }

    pub fn wbinvd(&mut self) -> Result<usize> {
        self.require(Features::I486)?;
        self.encode_fixed(&[0x0F, 0x09])
    }

    /// `INVLPG m` (0F 01 /7).
    pub fn invlpg(&mut self, addr: Address) -> Result<MemPatch> {
        self.require(Features::I486)?;
        let (_, patch) = self.mem_ext(OPC_INVLPG, Slot::ext(7), &addr)?;
        Ok(patch)
    }
}
