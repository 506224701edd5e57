use std::fmt;

use crate::mem::AddrSize;

/// Width class of a general-purpose operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperandSize {
    Byte = 8,
    Word = 16,
    Dword = 32,
    Qword = 64,
}

impl OperandSize {
    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub const fn bytes(self) -> usize {
        (self as usize) / 8
    }
}

/// How a register constrains the presence of a REX prefix.
///
/// SPL/BPL/SIL/DIL only exist when a REX prefix is present; AH/CH/DH/BH
/// only exist when it is absent. Everything else is indifferent apart
/// from R8-R15, which need REX for their extension bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RexRequirement {
    Any,
    Required,
    Forbidden,
}

/// Anything that is encoded as a register number in an instruction field.
///
/// `code()` is the 4-bit hardware number: the low three bits go into
/// ModR/M, SIB or the opcode byte, bit 3 into REX.R/X/B.
pub trait Register: Copy + Eq + fmt::Debug {
    fn code(self) -> u8;

    /// Inverse of `code()`. `rex_present` disambiguates AH..BH from
    /// SPL..DIL for byte registers and is ignored otherwise.
    fn from_code(code: u8, rex_present: bool) -> Option<Self>;

    #[inline]
    fn rex_requirement(self) -> RexRequirement {
        if self.code() >= 8 {
            RexRequirement::Required
        } else {
            RexRequirement::Any
        }
    }
}

/// A general-purpose register of a fixed width.
pub trait GpReg: Register {
    const SIZE: OperandSize;

    #[inline]
    fn low3(self) -> u8 {
        self.code() & 0x7
    }

    /// R8-R15 and their narrower views.
    #[inline]
    fn is_extended(self) -> bool {
        self.code() >= 8
    }

    /// AL/AX/EAX/RAX.
    #[inline]
    fn is_accumulator(self) -> bool {
        self.code() == 0
    }
}

/// Registers usable as base or index of an effective address.
pub trait AddressRegister: GpReg + sealed::Sealed {
    const ADDR_SIZE: AddrSize;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Reg32 {}
    impl Sealed for super::Reg64 {}
}

/// 8-bit general-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    Al,
    Cl,
    Dl,
    Bl,
    Ah,
    Ch,
    Dh,
    Bh,
    Spl,
    Bpl,
    Sil,
    Dil,
    R8b,
    R9b,
    R10b,
    R11b,
    R12b,
    R13b,
    R14b,
    R15b,
}

impl GpReg for Reg8 {
    const SIZE: OperandSize = OperandSize::Byte;
}

impl Register for Reg8 {
    fn code(self) -> u8 {
        use Reg8::*;
        match self {
            Al => 0,
            Cl => 1,
            Dl => 2,
            Bl => 3,
            Ah | Spl => 4,
            Ch | Bpl => 5,
            Dh | Sil => 6,
            Bh | Dil => 7,
            R8b => 8,
            R9b => 9,
            R10b => 10,
            R11b => 11,
            R12b => 12,
            R13b => 13,
            R14b => 14,
            R15b => 15,
        }
    }

    fn from_code(code: u8, rex_present: bool) -> Option<Self> {
        use Reg8::*;
        Some(match (code, rex_present) {
            (0, _) => Al,
            (1, _) => Cl,
            (2, _) => Dl,
            (3, _) => Bl,
            (4, false) => Ah,
            (5, false) => Ch,
            (6, false) => Dh,
            (7, false) => Bh,
            (4, true) => Spl,
            (5, true) => Bpl,
            (6, true) => Sil,
            (7, true) => Dil,
            (8, _) => R8b,
            (9, _) => R9b,
            (10, _) => R10b,
            (11, _) => R11b,
            (12, _) => R12b,
            (13, _) => R13b,
            (14, _) => R14b,
            (15, _) => R15b,
            _ => return None,
        })
    }

    fn rex_requirement(self) -> RexRequirement {
        use Reg8::*;
        match self {
            Ah | Ch | Dh | Bh => RexRequirement::Forbidden,
            Spl | Bpl | Sil | Dil => RexRequirement::Required,
            r if r.is_extended() => RexRequirement::Required,
            _ => RexRequirement::Any,
        }
    }
}

macro_rules! gp_reg {
    ($(#[$doc:meta])* $name:ident, $size:expr, [$($var:ident),* $(,)?]) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($var),*
        }

        impl $name {
            const ALL: [$name; 16] = [$($name::$var),*];
        }

        impl GpReg for $name {
            const SIZE: OperandSize = $size;
        }

        impl Register for $name {
            #[inline]
            fn code(self) -> u8 {
                self as u8
            }

            #[inline]
            fn from_code(code: u8, _rex_present: bool) -> Option<Self> {
                Self::ALL.get(code as usize).copied()
            }
        }
    };
}

gp_reg!(
    /// 16-bit general-purpose registers.
    Reg16,
    OperandSize::Word,
    [Ax, Cx, Dx, Bx, Sp, Bp, Si, Di, R8w, R9w, R10w, R11w, R12w, R13w, R14w, R15w]
);

gp_reg!(
    /// 32-bit general-purpose registers.
    Reg32,
    OperandSize::Dword,
    [Eax, Ecx, Edx, Ebx, Esp, Ebp, Esi, Edi, R8d, R9d, R10d, R11d, R12d, R13d, R14d, R15d]
);

gp_reg!(
    /// 64-bit general-purpose registers.
    ///
    /// Encoding matches the x86-64 ModR/M and REX register numbering.
    Reg64,
    OperandSize::Qword,
    [Rax, Rcx, Rdx, Rbx, Rsp, Rbp, Rsi, Rdi, R8, R9, R10, R11, R12, R13, R14, R15]
);

impl AddressRegister for Reg32 {
    const ADDR_SIZE: AddrSize = AddrSize::Bits32;
}

impl AddressRegister for Reg64 {
    const ADDR_SIZE: AddrSize = AddrSize::Bits64;
}

/// Segment registers, numbered as in the `Sreg` field of MOV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SegReg {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
    Fs = 4,
    Gs = 5,
}

impl SegReg {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => SegReg::Es,
            1 => SegReg::Cs,
            2 => SegReg::Ss,
            3 => SegReg::Ds,
            4 => SegReg::Fs,
            5 => SegReg::Gs,
            _ => return None,
        })
    }

    /// Segment-override prefix byte.
    pub const fn prefix(self) -> u8 {
        match self {
            SegReg::Es => 0x26,
            SegReg::Cs => 0x2E,
            SegReg::Ss => 0x36,
            SegReg::Ds => 0x3E,
            SegReg::Fs => 0x64,
            SegReg::Gs => 0x65,
        }
    }
}

/// Control registers reachable through `MOV CRn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CtrlReg {
    Cr0 = 0,
    Cr2 = 2,
    Cr3 = 3,
    Cr4 = 4,
    Cr8 = 8,
}

impl CtrlReg {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => CtrlReg::Cr0,
            2 => CtrlReg::Cr2,
            3 => CtrlReg::Cr3,
            4 => CtrlReg::Cr4,
            8 => CtrlReg::Cr8,
            _ => return None,
        })
    }
}

/// Debug registers reachable through `MOV DRn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DbgReg {
    Dr0 = 0,
    Dr1 = 1,
    Dr2 = 2,
    Dr3 = 3,
    Dr4 = 4,
    Dr5 = 5,
    Dr6 = 6,
    Dr7 = 7,
}

impl DbgReg {
    const ALL: [DbgReg; 8] = [DbgReg::Dr0, DbgReg::Dr1, DbgReg::Dr2, DbgReg::Dr3, DbgReg::Dr4, DbgReg::Dr5, DbgReg::Dr6, DbgReg::Dr7];

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// x87 stack registers, ST(0)..ST(7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FpuReg {
    St0 = 0,
    St1 = 1,
    St2 = 2,
    St3 = 3,
    St4 = 4,
    St5 = 5,
    St6 = 6,
    St7 = 7,
}

impl FpuReg {
    const ALL: [FpuReg; 8] = [FpuReg::St0, FpuReg::St1, FpuReg::St2, FpuReg::St3, FpuReg::St4, FpuReg::St5, FpuReg::St6, FpuReg::St7];

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// MMX registers. They alias the x87 register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MmxReg {
    Mm0 = 0,
    Mm1 = 1,
    Mm2 = 2,
    Mm3 = 3,
    Mm4 = 4,
    Mm5 = 5,
    Mm6 = 6,
    Mm7 = 7,
}

impl MmxReg {
    const ALL: [MmxReg; 8] = [MmxReg::Mm0, MmxReg::Mm1, MmxReg::Mm2, MmxReg::Mm3, MmxReg::Mm4, MmxReg::Mm5, MmxReg::Mm6, MmxReg::Mm7];

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// Register classes without REX-dependent aliasing.
macro_rules! field_reg {
    ($($name:ident),*) => {$(
        impl Register for $name {
            #[inline]
            fn code(self) -> u8 {
                self as u8
            }

            #[inline]
            fn from_code(code: u8, _rex_present: bool) -> Option<Self> {
                $name::from_code(code)
            }
        }
    )*};
}

field_reg!(SegReg, CtrlReg, DbgReg, FpuReg, MmxReg);
