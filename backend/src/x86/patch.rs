//! Handles onto fields of already-emitted instructions.
//!
//! A patch stores offsets only. `replace` rewrites the field in place and
//! `read` decodes it back; neither ever changes the instruction's size. A
//! replacement that would need a different encoding shape (an extra REX
//! byte, a SIB byte, a displacement) is refused with
//! [`EncodeError::PatchWouldResize`] and nothing is written.

use std::marker::PhantomData;

use xjit_core::imm::fits_i8;
use xjit_core::{
    AddrSize, Address, EncodeError, Immediate, Reg32, Reg64, Register, Result, RexRequirement,
};

use super::primitives::{Fields, ModrmFields, MOD_INDIRECT, REX_B, REX_R, REX_X};
use crate::code_buffer::CodeBuffer;

const fn codes(list: &[u8]) -> u16 {
    let mut mask = 0u16;
    let mut i = 0;
    while i < list.len() {
        mask |= 1 << list[i];
        i += 1;
    }
    mask
}

/// Codes whose low bits read as "SIB follows" in ModR/M.rm.
const SIB_ESCAPE: u16 = codes(&[4, 12]);
/// Codes whose low bits read as "no base" under mod = 00.
const NO_BASE: u16 = codes(&[5, 13]);
/// Index code 100 without REX.X means "no index".
const NO_INDEX: u16 = codes(&[4]);

/// Patches rewrite bytes that must exist; a measure-mode buffer has none.
fn stored(buf: &CodeBuffer) -> Result<()> {
    if buf.is_measuring() {
        Err(EncodeError::NoStorage)
    } else {
        Ok(())
    }
}

/// A 3-bit register field, plus its REX extension bit when the
/// instruction carries a REX byte.
///
/// `R` is any register class: general purpose, x87 stack, MMX, segment,
/// control or debug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegPatch<R> {
    at: usize,
    shift: u8,
    rex: Option<usize>,
    rex_bit: u8,
    /// Codes that would change the encoding shape.
    forbidden: u16,
    /// Codes the instruction does not allow at all.
    refused: u16,
    _reg: PhantomData<R>,
}

impl<R: Register> RegPatch<R> {
    fn new(at: usize, shift: u8, rex: Option<usize>, rex_bit: u8, forbidden: u16) -> Self {
        Self {
            at,
            shift,
            rex,
            rex_bit,
            forbidden,
            refused: 0,
            _reg: PhantomData,
        }
    }

    /// ModR/M.reg.
    pub(crate) fn reg_field(f: &ModrmFields) -> Self {
        Self::new(f.modrm, 3, f.fields.rex, REX_R, 0)
    }

    /// ModR/M.rm of a register-direct (mod = 11) instruction.
    pub(crate) fn rm_field(f: &ModrmFields) -> Self {
        Self::new(f.modrm, 0, f.fields.rex, REX_B, 0)
    }

    /// Low three opcode bits of a `+r` instruction.
    pub(crate) fn opcode_field(f: &Fields) -> Self {
        Self::new(f.opcode, 0, f.rex, REX_B, 0)
    }

    /// Low three bits of a byte with no REX byte in front (the second
    /// opcode byte of x87 register forms).
    pub(crate) fn low_bits(at: usize) -> Self {
        Self::new(at, 0, None, 0, 0)
    }

    /// Refuse `reg` as a replacement.
    pub(crate) fn refuse(mut self, reg: R) -> Self {
        self.refused |= 1 << reg.code();
        self
    }

    /// Offset of the byte holding the field.
    #[inline]
    pub fn offset(&self) -> usize {
        self.at
    }

    /// Whether `reg` can be written into this field.
    pub fn accepts(&self, reg: R) -> bool {
        self.check(reg).is_ok()
    }

    fn check(&self, reg: R) -> Result<()> {
        if self.refused & (1 << reg.code()) != 0 {
            return Err(EncodeError::InvalidOperand("register not allowed in this field"));
        }
        if self.forbidden & (1 << reg.code()) != 0 {
            return Err(EncodeError::PatchWouldResize);
        }
        match (self.rex, reg.rex_requirement()) {
            (None, RexRequirement::Required) => Err(EncodeError::PatchWouldResize),
            (Some(_), RexRequirement::Forbidden) => Err(EncodeError::RexConflict),
            _ => Ok(()),
        }
    }

    pub fn replace(&self, buf: &mut CodeBuffer, reg: R) -> Result<()> {
        self.check(reg)?;
        let code = reg.code();
        let mask = 0b111 << self.shift;
        let byte = (buf.read_u8(self.at)? & !mask) | ((code & 0x7) << self.shift);
        if let Some(rex_at) = self.rex {
            let old = buf.read_u8(rex_at)?;
            let rex = if code >= 8 {
                old | self.rex_bit
            } else {
                old & !self.rex_bit
            };
            buf.patch_u8(rex_at, rex)?;
        }
        buf.patch_u8(self.at, byte)
    }

    pub fn read(&self, buf: &CodeBuffer) -> Result<R> {
        let mut code = (buf.read_u8(self.at)? >> self.shift) & 0x7;
        if let Some(rex_at) = self.rex {
            if buf.read_u8(rex_at)? & self.rex_bit != 0 {
                code |= 8;
            }
        }
        R::from_code(code, self.rex.is_some())
            .ok_or(EncodeError::InvalidOperand("register field"))
    }
}

/// An immediate of exactly `T`'s width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmPatch<T> {
    at: usize,
    _ty: PhantomData<T>,
}

impl<T: Immediate> ImmPatch<T> {
    pub(crate) fn at(at: usize) -> Self {
        Self {
            at,
            _ty: PhantomData,
        }
    }

    /// The immediate ending the instruction described by `f`.
    pub(crate) fn trailing(f: &Fields) -> Self {
        Self::at(f.end() - T::WIDTH.bytes())
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.at
    }

    pub fn replace(&self, buf: &mut CodeBuffer, value: T) -> Result<()> {
        stored(buf)?;
        let mut raw = [0u8; 8];
        value.write_le(&mut raw);
        buf.write_at(self.at, &raw[..T::WIDTH.bytes()])
    }

    pub fn read(&self, buf: &CodeBuffer) -> Result<T> {
        let mut raw = [0u8; 8];
        buf.read_at(self.at, &mut raw[..T::WIDTH.bytes()])?;
        Ok(T::read_le(&raw))
    }
}

/// A memory displacement, 1 or 4 bytes wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispPatch {
    at: usize,
    width: u8,
}

impl DispPatch {
    #[inline]
    pub fn offset(&self) -> usize {
        self.at
    }

    /// Encoded width in bytes.
    #[inline]
    pub fn width(&self) -> usize {
        self.width as usize
    }

    /// Overwrite the displacement. A disp8 field only takes values in
    /// `-128..=127`.
    pub fn replace(&self, buf: &mut CodeBuffer, disp: i32) -> Result<()> {
        stored(buf)?;
        if self.width == 1 {
            if !fits_i8(disp as i64) {
                return Err(EncodeError::DisplacementOutOfRange(disp as i64));
            }
            buf.patch_u8(self.at, disp as i8 as u8)
        } else {
            buf.patch_u32(self.at, disp as u32)
        }
    }

    pub fn read(&self, buf: &CodeBuffer) -> Result<i32> {
        if self.width == 1 {
            Ok(buf.read_u8(self.at)? as i8 as i32)
        } else {
            Ok(buf.read_u32(self.at)? as i32)
        }
    }
}

/// Base or index register of an address, at the address's width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrPatch {
    Dword(RegPatch<Reg32>),
    Qword(RegPatch<Reg64>),
}

impl AddrPatch {
    fn new(
        size: AddrSize,
        at: usize,
        shift: u8,
        rex: Option<usize>,
        bit: u8,
        forbidden: u16,
    ) -> Self {
        match size {
            AddrSize::Bits32 => Self::Dword(RegPatch::new(at, shift, rex, bit, forbidden)),
            AddrSize::Bits64 => Self::Qword(RegPatch::new(at, shift, rex, bit, forbidden)),
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Self::Dword(p) => p.offset(),
            Self::Qword(p) => p.offset(),
        }
    }
}

/// Patchable parts of a memory operand. Which parts exist follows the
/// addressing mode: `[disp32]` has only `disp`, `[base]` only `base`
/// (plus `disp` for EBP/RBP/R13 bases, which carry a zero disp8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemPatch {
    pub base: Option<AddrPatch>,
    pub index: Option<AddrPatch>,
    pub disp: Option<DispPatch>,
}

impl MemPatch {
    pub(crate) fn new(addr: &Address, f: &ModrmFields) -> Self {
        let layout = addr.layout();
        let rex = f.fields.rex;
        let indirect = layout.modrm_mod == MOD_INDIRECT;
        let size = addr.addr_size();

        let base = size.filter(|_| addr.base_code().is_some()).map(|size| {
            match f.sib {
                Some(sib_at) => {
                    let forbidden = if indirect { NO_BASE } else { 0 };
                    AddrPatch::new(size, sib_at, 0, rex, REX_B, forbidden)
                }
                None => {
                    let forbidden = SIB_ESCAPE | if indirect { NO_BASE } else { 0 };
                    AddrPatch::new(size, f.modrm, 0, rex, REX_B, forbidden)
                }
            }
        });
        let index = size
            .filter(|_| addr.index_code().is_some())
            .zip(f.sib)
            .map(|(size, sib_at)| AddrPatch::new(size, sib_at, 3, rex, REX_X, NO_INDEX));
        let disp = f.disp.map(|(at, width)| DispPatch { at, width });

        Self { base, index, disp }
    }
}

/// The relative displacement of a direct branch whose target was known
/// when it was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelPatch<const W: usize> {
    at: usize,
}

/// `rel8` of a short branch.
pub type Rel8Patch = RelPatch<1>;
/// `rel32` of a near branch or call.
pub type Rel32Patch = RelPatch<4>;

impl<const W: usize> RelPatch<W> {
    pub(crate) fn at(at: usize) -> Self {
        Self { at }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.at
    }

    /// Re-point the branch at `target`. Fails without writing when the
    /// displacement does not fit the field.
    pub fn retarget(&self, buf: &mut CodeBuffer, target: usize) -> Result<()> {
        stored(buf)?;
        let rel = target as i64 - (self.at + W) as i64;
        match W {
            1 if fits_i8(rel) => buf.patch_u8(self.at, rel as i8 as u8),
            4 if xjit_core::imm::fits_i32(rel) => buf.patch_u32(self.at, rel as i32 as u32),
            _ => Err(EncodeError::BranchOutOfRange(rel)),
        }
    }

    /// Current branch target.
    pub fn target(&self, buf: &CodeBuffer) -> Result<usize> {
        let rel = match W {
            1 => buf.read_u8(self.at)? as i8 as i64,
            _ => buf.read_u32(self.at)? as i32 as i64,
        };
        let target = (self.at + W) as i64 + rel;
        usize::try_from(target).map_err(|_| EncodeError::BranchOutOfRange(rel))
    }
}
