//! Byte-level building blocks: ModR/M, SIB, REX, prefixes and the
//! scratch buffer an instruction is assembled in before it is committed.

// -- Prefix bytes --

pub const PREFIX_OPERAND_SIZE: u8 = 0x66;
pub const PREFIX_ADDRESS_SIZE: u8 = 0x67;
pub const PREFIX_LOCK: u8 = 0xF0;
pub const ESCAPE: u8 = 0x0F;

pub const REX: u8 = 0x40;
pub const REX_W: u8 = 0x08;
pub const REX_R: u8 = 0x04;
pub const REX_X: u8 = 0x02;
pub const REX_B: u8 = 0x01;

// -- ModR/M `mod` values --

pub const MOD_INDIRECT: u8 = 0b00;
pub const MOD_DISP8: u8 = 0b01;
pub const MOD_DISP32: u8 = 0b10;
pub const MOD_DIRECT: u8 = 0b11;

/// Longest legal x86 instruction.
pub const MAX_INSN_LEN: usize = 15;

/// Encode the ModR/M byte.
#[inline]
pub const fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
    ((mod_ & 0b11) << 6) | ((reg & 0b111) << 3) | (rm & 0b111)
}

/// Encode the SIB byte.
#[inline]
pub const fn sib(scale: u8, index: u8, base: u8) -> u8 {
    ((scale & 0b11) << 6) | ((index & 0b111) << 3) | (base & 0b111)
}

/// Accumulated REX bits for one instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rex {
    bits: u8,
    /// A REX byte is needed even with no bits set (SPL/BPL/SIL/DIL).
    forced: bool,
}

impl Rex {
    pub fn w(&mut self) {
        self.bits |= REX_W;
    }

    /// Add the extension bit of `code` (bit 3) under `bit`.
    pub fn extend(&mut self, code: u8, bit: u8) {
        if code >= 8 {
            self.bits |= bit;
        }
    }

    pub fn force(&mut self) {
        self.forced = true;
    }

    pub fn is_needed(&self) -> bool {
        self.bits != 0 || self.forced
    }

    pub fn byte(&self) -> Option<u8> {
        self.is_needed().then_some(REX | self.bits)
    }
}

/// Opcode descriptor.
///
/// `sized` marks opcodes with a `w` bit: the byte form is `byte`, the
/// 16/32/64-bit forms are `byte | 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub escape: bool,
    pub byte: u8,
    pub sized: bool,
}

impl Opcode {
    /// One-byte opcode, no `w` bit.
    pub const fn new(byte: u8) -> Self {
        Self {
            escape: false,
            byte,
            sized: false,
        }
    }

    /// One-byte opcode whose low bit selects byte vs. full size.
    pub const fn sized(byte: u8) -> Self {
        Self {
            escape: false,
            byte,
            sized: true,
        }
    }

    /// `0F xx`.
    pub const fn ext(byte: u8) -> Self {
        Self {
            escape: true,
            byte,
            sized: false,
        }
    }

    /// `0F xx` with a `w` bit.
    pub const fn ext_sized(byte: u8) -> Self {
        Self {
            escape: true,
            byte,
            sized: true,
        }
    }

    /// Add `n` to the opcode byte (condition codes, `+r` forms, direction bit).
    pub const fn plus(mut self, n: u8) -> Self {
        self.byte = self.byte.wrapping_add(n);
        self
    }

    /// Opcode byte for an operand of `byte_form` width.
    #[inline]
    pub const fn resolve(self, byte_form: bool) -> u8 {
        if self.sized && !byte_form {
            self.byte | 1
        } else {
            self.byte
        }
    }
}

/// Positions of the parts of an encoded instruction, as byte offsets.
/// Relative to the instruction start until committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fields {
    pub start: usize,
    pub len: usize,
    pub rex: Option<usize>,
    pub opcode: usize,
}

impl Fields {
    /// Shift every position by `base` (the commit offset).
    pub(crate) fn rebase(mut self, base: usize) -> Self {
        self.start = base;
        self.rex = self.rex.map(|o| o + base);
        self.opcode += base;
        self
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// [`Fields`] of an instruction with a ModR/M byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModrmFields {
    pub fields: Fields,
    pub modrm: usize,
    pub sib: Option<usize>,
    /// Position and width (1 or 4) of the displacement.
    pub disp: Option<(usize, u8)>,
}

impl ModrmFields {
    pub(crate) fn rebase(mut self, base: usize) -> Self {
        self.fields = self.fields.rebase(base);
        self.modrm += base;
        self.sib = self.sib.map(|o| o + base);
        self.disp = self.disp.map(|(o, w)| (o + base, w));
        self
    }
}

/// Scratch space for one instruction. Assembling here first lets the
/// encoder reject an instruction before any byte reaches the buffer.
#[derive(Debug, Clone)]
pub struct Insn {
    bytes: [u8; 16],
    len: usize,
}

impl Insn {
    pub fn new() -> Self {
        Self {
            bytes: [0; 16],
            len: 0,
        }
    }

    /// Append one byte, returning its position.
    #[inline]
    pub fn push(&mut self, b: u8) -> usize {
        let at = self.len;
        self.bytes[at] = b;
        self.len += 1;
        at
    }

    /// Append a slice, returning the position of its first byte.
    #[inline]
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let at = self.len;
        self.bytes[at..at + data.len()].copy_from_slice(data);
        self.len += data.len();
        at
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Default for Insn {
    fn default() -> Self {
        Self::new()
    }
}

/// Little-endian immediate bytes with their encoded width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmBytes {
    raw: [u8; 8],
    len: u8,
}

impl ImmBytes {
    pub fn of<T: xjit_core::Immediate>(value: T) -> Self {
        let mut raw = [0u8; 8];
        value.write_le(&mut raw);
        Self {
            raw,
            len: T::WIDTH.bytes() as u8,
        }
    }

    /// `value` truncated to `len` bytes.
    pub fn sized(value: i64, len: usize) -> Self {
        Self {
            raw: value.to_le_bytes(),
            len: len as u8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw[..self.len as usize]
    }
}
