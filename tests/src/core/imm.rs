use xjit_core::imm::{fits_i32, fits_i8};
use xjit_core::{Immediate, OperandSize};

#[test]
fn widths_and_signedness() {
    assert_eq!(<i8 as Immediate>::WIDTH, OperandSize::Byte);
    assert_eq!(<u16 as Immediate>::WIDTH, OperandSize::Word);
    assert_eq!(<i64 as Immediate>::WIDTH, OperandSize::Qword);
    assert!(<i32 as Immediate>::SIGNED);
    assert!(!<u32 as Immediate>::SIGNED);
}

#[test]
fn little_endian_bytes() {
    let mut out = [0u8; 8];
    0x1234_5678i32.write_le(&mut out);
    assert_eq!(out[..4], [0x78, 0x56, 0x34, 0x12]);
    assert_eq!(i32::read_le(&out), 0x1234_5678);

    (-2i16).write_le(&mut out);
    assert_eq!(out[..2], [0xFE, 0xFF]);
    assert_eq!((-2i16).to_i64(), -2);
    assert_eq!(0xFFFFu16.to_i64(), 0xFFFF);
}

#[test]
fn range_checks() {
    assert!(fits_i8(127));
    assert!(fits_i8(-128));
    assert!(!fits_i8(128));
    assert!(fits_i32(i64::from(i32::MIN)));
    assert!(!fits_i32(i64::from(u32::MAX)));
}
