//! Effective addresses and sized memory operands.
//!
//! An [`Address`] is built through one constructor per addressing mode, so
//! the fields it carries are always exactly the ones its mode implies. The
//! ModR/M `mod`/`rm` values, the SIB byte and the displacement width are
//! computed once at construction and never re-derived by the encoder.

use crate::error::EncodeError;
use crate::reg::{AddressRegister, OperandSize, SegReg};

/// Index scale factor, stored as its log2 (the SIB `scale` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Scale {
    X1 = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
}

impl Scale {
    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub const fn factor(self) -> u8 {
        1 << (self as u8)
    }
}

/// Width of the registers forming an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrSize {
    Bits32,
    Bits64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// `[disp32]`; RIP-relative when assembling 64-bit code.
    Offset,
    /// `[base]`
    Base,
    /// `[base + disp]`
    BaseOffset,
    /// `[index * scale + disp32]`
    IndexOffset,
    /// `[base + index * scale]`
    BaseIndex,
    /// `[base + index * scale + disp]`
    BaseIndexOffset,
}

/// Encoded displacement following ModR/M (and SIB).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Displacement {
    None,
    Byte(i8),
    Dword(i32),
}

impl Displacement {
    /// Smallest encoding of a displacement that must be present.
    pub const fn fit(disp: i32) -> Self {
        if disp >= i8::MIN as i32 && disp <= i8::MAX as i32 {
            Displacement::Byte(disp as i8)
        } else {
            Displacement::Dword(disp)
        }
    }

    pub const fn len(self) -> usize {
        match self {
            Displacement::None => 0,
            Displacement::Byte(_) => 1,
            Displacement::Dword(_) => 4,
        }
    }

    pub const fn is_none(self) -> bool {
        matches!(self, Displacement::None)
    }

    /// ModR/M `mod` value for a register-based address with this displacement.
    const fn modrm_mod(self) -> u8 {
        match self {
            Displacement::None => 0b00,
            Displacement::Byte(_) => 0b01,
            Displacement::Dword(_) => 0b10,
        }
    }
}

/// SIB fields. `index` and `base` are 4-bit register codes; index code 4
/// means "no index".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sib {
    pub scale: Scale,
    pub index: u8,
    pub base: u8,
}

pub const SIB_NO_INDEX: u8 = 0b100;
pub const SIB_NO_BASE: u8 = 0b101;
pub const RM_SIB: u8 = 0b100;
pub const RM_DISP32: u8 = 0b101;

/// Everything the encoder needs to emit the address part of an instruction.
///
/// `rm` is a 4-bit code: when no SIB is present its bit 3 is REX.B,
/// otherwise REX.B comes from the SIB base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    pub modrm_mod: u8,
    pub rm: u8,
    pub sib: Option<Sib>,
    pub disp: Displacement,
}

impl Layout {
    /// Register code carried in REX.B.
    #[inline]
    pub fn rex_b_source(&self) -> u8 {
        match self.sib {
            Some(sib) => sib.base,
            None => self.rm,
        }
    }

    /// Register code carried in REX.X.
    #[inline]
    pub fn rex_x_source(&self) -> u8 {
        self.sib.map_or(0, |sib| sib.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Form {
    Offset { disp: i32 },
    Base { base: u8 },
    BaseOffset { base: u8, disp: i32 },
    IndexOffset { index: u8, scale: Scale, disp: i32 },
    BaseIndex { base: u8, index: u8, scale: Scale },
    BaseIndexOffset { base: u8, index: u8, scale: Scale, disp: i32 },
}

/// An effective address in one of the six addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    form: Form,
    size: Option<AddrSize>,
    segment: Option<SegReg>,
    default_segment: SegReg,
    layout: Layout,
}

impl Address {
    /// `[disp32]`.
    pub fn offset(disp: i32) -> Self {
        Self::build(Form::Offset { disp }, None)
    }

    /// `[base]`.
    pub fn base<A: AddressRegister>(base: A) -> Self {
        Self::build(Form::Base { base: base.code() }, Some(A::ADDR_SIZE))
    }

    /// `[base + disp]`. The displacement is always encoded, as disp8 when
    /// it fits and disp32 otherwise.
    pub fn base_offset<A: AddressRegister>(base: A, disp: i32) -> Self {
        Self::build(
            Form::BaseOffset {
                base: base.code(),
                disp,
            },
            Some(A::ADDR_SIZE),
        )
    }

    /// `[index * scale + disp32]`.
    pub fn index_offset<A: AddressRegister>(
        index: A,
        scale: Scale,
        disp: i32,
    ) -> Result<Self, EncodeError> {
        let index = checked_index(index)?;
        Ok(Self::build(
            Form::IndexOffset { index, scale, disp },
            Some(A::ADDR_SIZE),
        ))
    }

    /// `[base + index * scale]`.
    pub fn base_index<A: AddressRegister>(
        base: A,
        index: A,
        scale: Scale,
    ) -> Result<Self, EncodeError> {
        let index = checked_index(index)?;
        Ok(Self::build(
            Form::BaseIndex {
                base: base.code(),
                index,
                scale,
            },
            Some(A::ADDR_SIZE),
        ))
    }

    /// `[base + index * scale + disp]`.
    pub fn base_index_offset<A: AddressRegister>(
        base: A,
        index: A,
        scale: Scale,
        disp: i32,
    ) -> Result<Self, EncodeError> {
        let index = checked_index(index)?;
        Ok(Self::build(
            Form::BaseIndexOffset {
                base: base.code(),
                index,
                scale,
                disp,
            },
            Some(A::ADDR_SIZE),
        ))
    }

    /// Attach a segment override. A prefix is only emitted if it differs
    /// from the address's implicit segment.
    pub fn with_segment(mut self, segment: SegReg) -> Self {
        self.segment = Some(segment);
        self
    }

    fn build(form: Form, size: Option<AddrSize>) -> Self {
        let default_segment = match form {
            Form::Base { base }
            | Form::BaseOffset { base, .. }
            | Form::BaseIndex { base, .. }
            | Form::BaseIndexOffset { base, .. }
                if base == 4 || base == 5 =>
            {
                SegReg::Ss
            }
            _ => SegReg::Ds,
        };
        Self {
            form,
            size,
            segment: None,
            default_segment,
            layout: layout_of(form),
        }
    }

    pub fn mode(&self) -> AddressingMode {
        match self.form {
            Form::Offset { .. } => AddressingMode::Offset,
            Form::Base { .. } => AddressingMode::Base,
            Form::BaseOffset { .. } => AddressingMode::BaseOffset,
            Form::IndexOffset { .. } => AddressingMode::IndexOffset,
            Form::BaseIndex { .. } => AddressingMode::BaseIndex,
            Form::BaseIndexOffset { .. } => AddressingMode::BaseIndexOffset,
        }
    }

    /// Width of the address registers; `None` for the offset-only form.
    #[inline]
    pub fn addr_size(&self) -> Option<AddrSize> {
        self.size
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[inline]
    pub fn needs_sib(&self) -> bool {
        self.layout.sib.is_some()
    }

    #[inline]
    pub fn displacement(&self) -> Displacement {
        self.layout.disp
    }

    #[inline]
    pub fn segment(&self) -> Option<SegReg> {
        self.segment
    }

    #[inline]
    pub fn default_segment(&self) -> SegReg {
        self.default_segment
    }

    /// Segment-override prefix byte, if one must be emitted.
    pub fn segment_prefix(&self) -> Option<u8> {
        self.segment
            .filter(|&s| s != self.default_segment)
            .map(SegReg::prefix)
    }

    /// Base register code, if the mode has one.
    pub fn base_code(&self) -> Option<u8> {
        match self.form {
            Form::Base { base }
            | Form::BaseOffset { base, .. }
            | Form::BaseIndex { base, .. }
            | Form::BaseIndexOffset { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Index register code and scale, if the mode has one.
    pub fn index_code(&self) -> Option<(u8, Scale)> {
        match self.form {
            Form::IndexOffset { index, scale, .. }
            | Form::BaseIndex { index, scale, .. }
            | Form::BaseIndexOffset { index, scale, .. } => Some((index, scale)),
            _ => None,
        }
    }

    /// Displacement the caller asked for (0 when the mode has none).
    pub fn disp(&self) -> i32 {
        match self.form {
            Form::Offset { disp }
            | Form::BaseOffset { disp, .. }
            | Form::IndexOffset { disp, .. }
            | Form::BaseIndexOffset { disp, .. } => disp,
            Form::Base { .. } | Form::BaseIndex { .. } => 0,
        }
    }

    /// Whether any register of the address needs REX to be named.
    pub fn uses_extended(&self) -> bool {
        self.base_code().is_some_and(|b| b >= 8)
            || self.index_code().is_some_and(|(i, _)| i >= 8)
    }
}

fn checked_index<A: AddressRegister>(index: A) -> Result<u8, EncodeError> {
    // Index code 100 without REX.X means "no index".
    if index.code() == SIB_NO_INDEX {
        return Err(EncodeError::StackPointerIndex);
    }
    Ok(index.code())
}

/// ModR/M `rm` (and SIB) for a base register without index.
fn base_rm(base: u8) -> (u8, Option<Sib>) {
    if base & 0x7 == RM_SIB {
        // ESP/RSP/R12 as rm means "SIB follows".
        let sib = Sib {
            scale: Scale::X1,
            index: SIB_NO_INDEX,
            base,
        };
        (RM_SIB, Some(sib))
    } else {
        (base, None)
    }
}

/// Displacement for a base that the caller gave no offset for.
fn implicit_disp(base: u8) -> Displacement {
    // mod=00 with base 101 means disp32 / RIP-relative, so EBP/RBP/R13
    // need an explicit zero disp8.
    if base & 0x7 == SIB_NO_BASE {
        Displacement::Byte(0)
    } else {
        Displacement::None
    }
}

fn layout_of(form: Form) -> Layout {
    match form {
        Form::Offset { disp } => Layout {
            modrm_mod: 0b00,
            rm: RM_DISP32,
            sib: None,
            disp: Displacement::Dword(disp),
        },
        Form::Base { base } => {
            let (rm, sib) = base_rm(base);
            let disp = implicit_disp(base);
            Layout {
                modrm_mod: disp.modrm_mod(),
                rm,
                sib,
                disp,
            }
        }
        Form::BaseOffset { base, disp } => {
            let (rm, sib) = base_rm(base);
            let disp = Displacement::fit(disp);
            Layout {
                modrm_mod: disp.modrm_mod(),
                rm,
                sib,
                disp,
            }
        }
        Form::IndexOffset { index, scale, disp } => Layout {
            modrm_mod: 0b00,
            rm: RM_SIB,
            sib: Some(Sib {
                scale,
                index,
                base: SIB_NO_BASE,
            }),
            disp: Displacement::Dword(disp),
        },
        Form::BaseIndex { base, index, scale } => {
            let disp = implicit_disp(base);
            Layout {
                modrm_mod: disp.modrm_mod(),
                rm: RM_SIB,
                sib: Some(Sib { scale, index, base }),
                disp,
            }
        }
        Form::BaseIndexOffset {
            base,
            index,
            scale,
            disp,
        } => {
            let disp = Displacement::fit(disp);
            Layout {
                modrm_mod: disp.modrm_mod(),
                rm: RM_SIB,
                sib: Some(Sib { scale, index, base }),
                disp,
            }
        }
    }
}

/// A memory operand with a known access width.
pub trait MemOperand: Copy {
    const SIZE: OperandSize;

    fn address(&self) -> &Address;
}

macro_rules! sized_mem {
    ($(#[$doc:meta])* $name:ident, $ctor:ident, $size:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub Address);

        impl MemOperand for $name {
            const SIZE: OperandSize = $size;

            #[inline]
            fn address(&self) -> &Address {
                &self.0
            }
        }

        #[inline]
        pub fn $ctor(addr: Address) -> $name {
            $name(addr)
        }
    };
}

sized_mem!(
    /// `byte ptr [...]`
    Mem8,
    byte_ptr,
    OperandSize::Byte
);
sized_mem!(
    /// `word ptr [...]`
    Mem16,
    word_ptr,
    OperandSize::Word
);
sized_mem!(
    /// `dword ptr [...]`
    Mem32,
    dword_ptr,
    OperandSize::Dword
);
sized_mem!(
    /// `qword ptr [...]`
    Mem64,
    qword_ptr,
    OperandSize::Qword
);
