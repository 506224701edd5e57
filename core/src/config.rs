use bitflags::bitflags;

/// Processor mode code is assembled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// 32-bit protected mode: no REX, no 64-bit operands.
    Bits32,
    /// 64-bit long mode.
    Bits64,
}

bitflags! {
    /// Instruction-set extensions the assembler may emit.
    ///
    /// Each feature module checks its flag before writing. Profiles are
    /// plain unions, so a target is described by listing what it has
    /// rather than by a chain of processor generations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features: u32 {
        /// Baseline integer set (always available).
        const I386 = 1 << 0;
        /// BSWAP, XADD, CMPXCHG, cache/TLB control.
        const I486 = 1 << 1;
        /// CMPXCHG8B.
        const CX8 = 1 << 2;
        /// RDTSC.
        const TSC = 1 << 3;
        /// RDMSR / WRMSR.
        const MSR = 1 << 4;
        /// CPUID.
        const CPUID = 1 << 5;
        /// x87 floating point.
        const FPU = 1 << 6;
        /// CMOVcc, FCMOVcc.
        const CMOV = 1 << 7;
        /// RDPMC.
        const PMC = 1 << 8;
        /// MMX integer SIMD.
        const MMX = 1 << 9;

        const PENTIUM = Self::I386.bits()
            | Self::I486.bits()
            | Self::CX8.bits()
            | Self::TSC.bits()
            | Self::MSR.bits()
            | Self::CPUID.bits()
            | Self::FPU.bits();
        const PENTIUM_MMX = Self::PENTIUM.bits() | Self::MMX.bits();
        const PENTIUM_PRO = Self::PENTIUM.bits() | Self::CMOV.bits() | Self::PMC.bits();
        const P2 = Self::PENTIUM_PRO.bits() | Self::MMX.bits();
        const X86_64_BASELINE = Self::P2.bits();
    }
}

/// Target description handed to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Config {
    pub mode: Mode,
    pub features: Features,
}

impl Config {
    /// 32-bit code for a processor with the given extensions.
    pub fn x86(features: Features) -> Self {
        Self {
            mode: Mode::Bits32,
            features: features | Features::I386,
        }
    }

    /// 64-bit code with every extension long mode guarantees.
    pub fn x64() -> Self {
        Self {
            mode: Mode::Bits64,
            features: Features::X86_64_BASELINE,
        }
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features | Features::I386;
        self
    }

    #[inline]
    pub fn is_64bit(&self) -> bool {
        self.mode == Mode::Bits64
    }

    #[inline]
    pub fn has(&self, features: Features) -> bool {
        self.features.contains(features)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::x64()
    }
}
