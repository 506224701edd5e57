//! The assembler front object and the encode routines every instruction
//! funnels through.
//!
//! An instruction is described by a [`Form`] (ModR/M based) or a
//! [`Plain`] (opcode, optional `+r` register, optional immediate). Both are
//! validated completely, assembled into an [`Insn`] scratch buffer and
//! committed with a single bounds-checked write, so a rejected instruction
//! never leaves bytes behind.

use log::trace;
use xjit_core::mem::Displacement;
use xjit_core::{
    AddrSize, Address, Config, EncodeError, Features, GpReg, Immediate, Mode, OperandSize,
    Register, Result, RexRequirement,
};

use super::operand::RmOperand;
use super::patch::{ImmPatch, MemPatch, RegPatch};
use super::primitives::{
    modrm, sib, Fields, ImmBytes, Insn, ModrmFields, Opcode, Rex, ESCAPE, MAX_INSN_LEN,
    MOD_DIRECT, PREFIX_ADDRESS_SIZE, PREFIX_LOCK, PREFIX_OPERAND_SIZE, REX_B, REX_R, REX_X,
};
use crate::code_buffer::CodeBuffer;

/// A register number placed in ModR/M.reg, ModR/M.rm or the low opcode
/// bits, with the REX constraint it brings along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    code: u8,
    rex: RexRequirement,
}

impl Slot {
    pub(crate) fn gp<R: GpReg>(reg: R) -> Self {
        Self::reg(reg)
    }

    /// Any register class in a register field (segment, control, debug,
    /// MMX as well as general purpose).
    pub(crate) fn reg<R: Register>(reg: R) -> Self {
        Self {
            code: reg.code(),
            rex: reg.rex_requirement(),
        }
    }

    /// An opcode extension (`/digit`).
    pub(crate) fn ext(code: u8) -> Self {
        Self {
            code,
            rex: RexRequirement::Any,
        }
    }

    #[inline]
    pub fn code(&self) -> u8 {
        self.code
    }

    fn claim(self, rex: &mut Rex, no_rex: &mut bool, bit: u8) {
        rex.extend(self.code, bit);
        match self.rex {
            RexRequirement::Required => rex.force(),
            RexRequirement::Forbidden => *no_rex = true,
            RexRequirement::Any => {}
        }
    }
}

/// Contents of ModR/M.rm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rm<'a> {
    Reg(Slot),
    Mem(&'a Address),
}

/// A ModR/M-based instruction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Form<'a> {
    size: Option<OperandSize>,
    /// 64-bit operand size is the default (PUSH, POP, indirect branches):
    /// a qword operand gets no REX.W.
    default64: bool,
    opcode: Opcode,
    reg: Slot,
    rm: Rm<'a>,
    imm: Option<ImmBytes>,
}

impl<'a> Form<'a> {
    pub(crate) fn new(opcode: Opcode, reg: Slot, rm: Rm<'a>) -> Self {
        Self {
            size: None,
            default64: false,
            opcode,
            reg,
            rm,
            imm: None,
        }
    }

    pub(crate) fn size(mut self, size: OperandSize) -> Self {
        self.size = Some(size);
        self
    }

    pub(crate) fn default64(mut self) -> Self {
        self.default64 = true;
        self
    }

    pub(crate) fn imm(mut self, imm: ImmBytes) -> Self {
        self.imm = Some(imm);
        self
    }
}

/// An instruction without ModR/M: bare opcode, `+r` register form,
/// and/or trailing immediate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Plain {
    size: Option<OperandSize>,
    default64: bool,
    opcode: Opcode,
    reg: Option<Slot>,
    imm: Option<ImmBytes>,
}

impl Plain {
    pub(crate) fn new(opcode: Opcode) -> Self {
        Self {
            size: None,
            default64: false,
            opcode,
            reg: None,
            imm: None,
        }
    }

    pub(crate) fn size(mut self, size: OperandSize) -> Self {
        self.size = Some(size);
        self
    }

    pub(crate) fn default64(mut self) -> Self {
        self.default64 = true;
        self
    }

    /// Register added to the low three opcode bits.
    pub(crate) fn reg(mut self, reg: Slot) -> Self {
        self.reg = Some(reg);
        self
    }

    pub(crate) fn imm(mut self, imm: ImmBytes) -> Self {
        self.imm = Some(imm);
        self
    }
}

/// Writes instructions for one target configuration into a [`CodeBuffer`].
///
/// Instruction methods live in the feature modules (`base`, `i486`,
/// `pentium`, `p6`, `x87`, `mmx`, `system`); each checks its
/// [`Features`] flag before writing.
pub struct Assembler<'a> {
    buf: &'a mut CodeBuffer,
    config: Config,
}

impl<'a> Assembler<'a> {
    pub fn new(buf: &'a mut CodeBuffer, config: Config) -> Self {
        Self { buf, config }
    }

    #[inline]
    pub fn buffer(&self) -> &CodeBuffer {
        self.buf
    }

    #[inline]
    pub fn buffer_mut(&mut self) -> &mut CodeBuffer {
        self.buf
    }

    #[inline]
    pub fn config(&self) -> Config {
        self.config
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// Offset the next instruction will be written at.
    #[inline]
    pub fn offset(&self) -> usize {
        self.buf.offset()
    }

    /// Append raw bytes (data, hand-assembled sequences).
    pub fn emit_raw(&mut self, bytes: &[u8]) -> Result<usize> {
        let at = self.buf.emit_bytes(bytes)?;
        trace!("{at:#06x}: raw {bytes:02x?}");
        Ok(at)
    }

    /// LOCK prefix for the instruction that follows.
    pub fn lock(&mut self) -> Result<usize> {
        self.emit_raw(&[PREFIX_LOCK])
    }

    pub(crate) fn require(&self, features: Features) -> Result<()> {
        if self.config.has(features) {
            Ok(())
        } else {
            Err(EncodeError::FeatureDisabled(features))
        }
    }

    pub(crate) fn mode_mismatch(&self, what: &'static str) -> EncodeError {
        EncodeError::ModeMismatch {
            mode: self.config.mode,
            what,
        }
    }

    pub(crate) fn require_64bit(&self, what: &'static str) -> Result<()> {
        if self.config.is_64bit() {
            Ok(())
        } else {
            Err(self.mode_mismatch(what))
        }
    }

    pub(crate) fn require_32bit(&self, what: &'static str) -> Result<()> {
        if self.config.is_64bit() {
            Err(self.mode_mismatch(what))
        } else {
            Ok(())
        }
    }

    // -- Encoding --

    /// Encode and commit a ModR/M instruction.
    pub(crate) fn encode(&mut self, form: &Form<'_>) -> Result<ModrmFields> {
        let mut rex = Rex::default();
        let mut no_rex = false;
        let word = self.operand_size(form.size, form.default64, &mut rex)?;
        form.reg.claim(&mut rex, &mut no_rex, REX_R);

        let mut addr32 = false;
        match form.rm {
            Rm::Reg(slot) => slot.claim(&mut rex, &mut no_rex, REX_B),
            Rm::Mem(addr) => {
                let layout = addr.layout();
                rex.extend(layout.rex_b_source(), REX_B);
                rex.extend(layout.rex_x_source(), REX_X);
                addr32 = self.address_size(addr)?;
            }
        }
        self.check_rex(&rex, no_rex)?;

        let mut insn = Insn::new();
        if let Rm::Mem(addr) = form.rm {
            if let Some(seg) = addr.segment_prefix() {
                insn.push(seg);
            }
        }
        if addr32 {
            insn.push(PREFIX_ADDRESS_SIZE);
        }
        let byte_form = form.size == Some(OperandSize::Byte);
        let (rex_at, opcode_at) = head(&mut insn, word, &rex, form.opcode, byte_form);

        let mut sib_at = None;
        let mut disp = None;
        let modrm_at = match form.rm {
            Rm::Reg(slot) => insn.push(modrm(MOD_DIRECT, form.reg.code, slot.code)),
            Rm::Mem(addr) => {
                let layout = addr.layout();
                let at = insn.push(modrm(layout.modrm_mod, form.reg.code, layout.rm));
                if let Some(s) = layout.sib {
                    sib_at = Some(insn.push(sib(s.scale.bits(), s.index, s.base)));
                }
                disp = match layout.disp {
                    Displacement::None => None,
                    Displacement::Byte(d) => Some((insn.push(d as u8), 1)),
                    Displacement::Dword(d) => Some((insn.extend(&d.to_le_bytes()), 4)),
                };
                at
            }
        };
        if let Some(imm) = form.imm {
            insn.extend(imm.as_bytes());
        }

        let fields = ModrmFields {
            fields: Fields {
                start: 0,
                len: insn.len(),
                rex: rex_at,
                opcode: opcode_at,
            },
            modrm: modrm_at,
            sib: sib_at,
            disp,
        };
        let start = self.commit(&insn)?;
        Ok(fields.rebase(start))
    }

    /// Encode and commit an instruction without ModR/M.
    pub(crate) fn encode_plain(&mut self, plain: &Plain) -> Result<Fields> {
        let mut rex = Rex::default();
        let mut no_rex = false;
        let word = self.operand_size(plain.size, plain.default64, &mut rex)?;
        let mut opcode = plain.opcode;
        if let Some(slot) = plain.reg {
            slot.claim(&mut rex, &mut no_rex, REX_B);
            opcode = opcode.plus(slot.code & 0x7);
        }
        self.check_rex(&rex, no_rex)?;

        let mut insn = Insn::new();
        let byte_form = plain.size == Some(OperandSize::Byte);
        let (rex_at, opcode_at) = head(&mut insn, word, &rex, opcode, byte_form);
        if let Some(imm) = plain.imm {
            insn.extend(imm.as_bytes());
        }

        let fields = Fields {
            start: 0,
            len: insn.len(),
            rex: rex_at,
            opcode: opcode_at,
        };
        let start = self.commit(&insn)?;
        Ok(fields.rebase(start))
    }

    /// Fixed byte sequence with no operands (`RDTSC`, `FLDZ`, ...).
    pub(crate) fn encode_fixed(&mut self, bytes: &[u8]) -> Result<usize> {
        let at = self.buf.emit_bytes(bytes)?;
        trace!("{at:#06x}: {bytes:02x?}");
        Ok(at)
    }

    fn commit(&mut self, insn: &Insn) -> Result<usize> {
        debug_assert!(insn.len() <= MAX_INSN_LEN);
        let at = self.buf.emit_bytes(insn.as_bytes())?;
        trace!("{at:#06x}: {:02x?}", insn.as_bytes());
        Ok(at)
    }

    /// Apply the operand size to `rex`; returns whether 0x66 is needed.
    fn operand_size(
        &self,
        size: Option<OperandSize>,
        default64: bool,
        rex: &mut Rex,
    ) -> Result<bool> {
        match size {
            Some(OperandSize::Qword) => {
                self.require_64bit("64-bit operand")?;
                if !default64 {
                    rex.w();
                }
                Ok(false)
            }
            Some(OperandSize::Word) => Ok(true),
            _ => Ok(false),
        }
    }

    /// Returns whether the address-size prefix is needed.
    fn address_size(&self, addr: &Address) -> Result<bool> {
        match (addr.addr_size(), self.config.mode) {
            (Some(AddrSize::Bits64), Mode::Bits32) => Err(self.mode_mismatch("64-bit address")),
            (Some(AddrSize::Bits32), Mode::Bits64) => Ok(true),
            _ => Ok(false),
        }
    }

    fn check_rex(&self, rex: &Rex, no_rex: bool) -> Result<()> {
        if !rex.is_needed() {
            return Ok(());
        }
        if !self.config.is_64bit() {
            return Err(self.mode_mismatch("register requires a REX prefix"));
        }
        if no_rex {
            return Err(EncodeError::RexConflict);
        }
        Ok(())
    }

    // -- Shared operand shapes --

    /// `op r/m, reg`: destination in ModR/M.rm.
    pub(crate) fn rm_reg<D: RmOperand, S: GpReg>(
        &mut self,
        opcode: Opcode,
        dst: D,
        src: S,
    ) -> Result<(D::Patch, RegPatch<S>)> {
        let f = self.encode(&Form::new(opcode, Slot::gp(src), dst.to_rm()).size(D::SIZE))?;
        Ok((dst.rm_patch(&f), RegPatch::reg_field(&f)))
    }

    /// `op reg, r/m`: destination in ModR/M.reg (load direction).
    pub(crate) fn reg_rm<D: GpReg, S: RmOperand>(
        &mut self,
        opcode: Opcode,
        dst: D,
        src: S,
    ) -> Result<(RegPatch<D>, S::Patch)> {
        let f = self.encode(&Form::new(opcode, Slot::gp(dst), src.to_rm()).size(D::SIZE))?;
        Ok((RegPatch::reg_field(&f), src.rm_patch(&f)))
    }

    /// `op reg, r/m, imm` (three-operand IMUL).
    pub(crate) fn reg_rm_imm<D: GpReg, S: RmOperand, T: Immediate>(
        &mut self,
        opcode: Opcode,
        dst: D,
        src: S,
        imm: T,
    ) -> Result<(RegPatch<D>, S::Patch, ImmPatch<T>)> {
        let form = Form::new(opcode, Slot::gp(dst), src.to_rm())
            .size(D::SIZE)
            .imm(ImmBytes::of(imm));
        let f = self.encode(&form)?;
        Ok((
            RegPatch::reg_field(&f),
            src.rm_patch(&f),
            ImmPatch::trailing(&f.fields),
        ))
    }

    /// `op r/m, imm` with an opcode extension in ModR/M.reg.
    pub(crate) fn rm_imm<D: RmOperand, T: Immediate>(
        &mut self,
        opcode: Opcode,
        ext: u8,
        dst: D,
        imm: T,
    ) -> Result<(D::Patch, ImmPatch<T>)> {
        let form = Form::new(opcode, Slot::ext(ext), dst.to_rm())
            .size(D::SIZE)
            .imm(ImmBytes::of(imm));
        let f = self.encode(&form)?;
        Ok((dst.rm_patch(&f), ImmPatch::trailing(&f.fields)))
    }

    /// `op r/m` with an opcode extension in ModR/M.reg.
    pub(crate) fn rm_ext<D: RmOperand>(
        &mut self,
        opcode: Opcode,
        ext: u8,
        dst: D,
    ) -> Result<D::Patch> {
        let f = self.encode(&Form::new(opcode, Slot::ext(ext), dst.to_rm()).size(D::SIZE))?;
        Ok(dst.rm_patch(&f))
    }

    /// ModR/M instruction on an unsized memory operand (LEA, INVLPG, x87).
    pub(crate) fn mem_ext(
        &mut self,
        opcode: Opcode,
        reg: Slot,
        addr: &Address,
    ) -> Result<(ModrmFields, MemPatch)> {
        let f = self.encode(&Form::new(opcode, reg, Rm::Mem(addr)))?;
        Ok((f, MemPatch::new(addr, &f)))
    }
}

/// Emit operand-size prefix, REX, escape and opcode.
/// Returns the REX and opcode positions.
fn head(
    insn: &mut Insn,
    word: bool,
    rex: &Rex,
    opcode: Opcode,
    byte_form: bool,
) -> (Option<usize>, usize) {
    if word {
        insn.push(PREFIX_OPERAND_SIZE);
    }
    let rex_at = rex.byte().map(|b| insn.push(b));
    if opcode.escape {
        insn.push(ESCAPE);
    }
    let opcode_at = insn.push(opcode.resolve(byte_form));
    (rex_at, opcode_at)
}
