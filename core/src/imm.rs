use crate::reg::OperandSize;

/// An immediate operand. The Rust type is the static width/sign tag:
/// `i8` picks sign-extended imm8 forms, `u8`/`i16`/`u32`… pick the
/// full-width forms of the matching destination.
pub trait Immediate: Copy + PartialEq + std::fmt::Debug {
    const WIDTH: OperandSize;
    const SIGNED: bool;

    /// Write exactly `WIDTH.bytes()` little-endian bytes into `out`.
    fn write_le(self, out: &mut [u8]);

    /// Read back a value written by `write_le`.
    fn read_le(src: &[u8]) -> Self;

    /// Value widened to 64 bits, honoring signedness.
    fn to_i64(self) -> i64;
}

macro_rules! immediate {
    ($ty:ty, $width:expr, $signed:expr) => {
        impl Immediate for $ty {
            const WIDTH: OperandSize = $width;
            const SIGNED: bool = $signed;

            #[inline]
            fn write_le(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le(src: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&src[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }

            #[inline]
            fn to_i64(self) -> i64 {
                self as i64
            }
        }
    };
}

immediate!(i8, OperandSize::Byte, true);
immediate!(u8, OperandSize::Byte, false);
immediate!(i16, OperandSize::Word, true);
immediate!(u16, OperandSize::Word, false);
immediate!(i32, OperandSize::Dword, true);
immediate!(u32, OperandSize::Dword, false);
immediate!(i64, OperandSize::Qword, true);
immediate!(u64, OperandSize::Qword, false);

/// Whether `value` survives a round trip through a sign-extended imm8.
#[inline]
pub const fn fits_i8(value: i64) -> bool {
    value >= i8::MIN as i64 && value <= i8::MAX as i64
}

#[inline]
pub const fn fits_i32(value: i64) -> bool {
    value >= i32::MIN as i64 && value <= i32::MAX as i64
}
