/// x86 condition codes for Jcc/SETcc/CMOVcc/FCMOVcc.
///
/// The discriminant is the `tttn` nibble added to the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cond {
    O = 0x0,
    No = 0x1,
    B = 0x2,
    Ae = 0x3,
    E = 0x4,
    Ne = 0x5,
    Be = 0x6,
    A = 0x7,
    S = 0x8,
    Ns = 0x9,
    P = 0xA,
    Np = 0xB,
    L = 0xC,
    Ge = 0xD,
    Le = 0xE,
    G = 0xF,
}

impl Cond {
    pub const C: Cond = Cond::B;
    pub const NC: Cond = Cond::Ae;
    pub const Z: Cond = Cond::E;
    pub const NZ: Cond = Cond::Ne;

    const ALL: [Cond; 16] = [
        Cond::O,
        Cond::No,
        Cond::B,
        Cond::Ae,
        Cond::E,
        Cond::Ne,
        Cond::Be,
        Cond::A,
        Cond::S,
        Cond::Ns,
        Cond::P,
        Cond::Np,
        Cond::L,
        Cond::Ge,
        Cond::Le,
        Cond::G,
    ];

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Return the inverted condition.
    pub fn invert(self) -> Self {
        // Flip the low bit
        Self::ALL[(self as usize) ^ 1]
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}
