use xjit_backend::x86::{ArithOp, ByCl, ByOne};
use xjit_backend::{Assembler, CodeBuffer};
use xjit_core::{
    byte_ptr, dword_ptr, qword_ptr, word_ptr, Address, Cond, EncodeError, Mode, Reg16, Reg32,
    Reg64, Reg8, Scale, SegReg,
};

use super::{encode32, encode64, hex, x64, x86};

// -- Reference scenarios --

#[test]
fn mov_al_dl() {
    let code = encode32(|a| {
        a.mov(Reg8::Al, Reg8::Dl).unwrap();
    });
    assert_eq!(hex(&code), "88 D0");
}

#[test]
fn lea_ebx_edx_plus_50() {
    let code = encode32(|a| {
        a.lea(Reg32::Ebx, Address::base_offset(Reg32::Edx, 50)).unwrap();
    });
    assert_eq!(hex(&code), "8D 5A 32");
}

#[test]
fn mov_dword_esp_eax() {
    let code = encode32(|a| {
        a.mov(dword_ptr(Address::base(Reg32::Esp)), Reg32::Eax).unwrap();
    });
    assert_eq!(hex(&code), "89 04 24");
}

#[test]
fn add_eax_imm32() {
    let code = encode32(|a| {
        a.add(Reg32::Eax, 0x12345678i32).unwrap();
    });
    assert_eq!(hex(&code), "81 C0 78 56 34 12");
}

// -- Register forms --

#[test]
fn rex_for_extended_registers() {
    let code = encode64(|a| {
        a.mov(Reg64::Rax, Reg64::R8).unwrap();
        a.mov(Reg32::R9d, Reg32::Eax).unwrap();
        a.add(Reg64::R15, Reg64::R14).unwrap();
    });
    assert_eq!(hex(&code), "4C 89 C0 41 89 C1 4D 01 F7");
}

#[test]
fn byte_registers_and_rex() {
    let code = encode64(|a| {
        a.mov(Reg8::Sil, Reg8::Al).unwrap();
        a.mov(Reg8::Ah, Reg8::Bl).unwrap();
        a.mov(Reg8::R8b, Reg8::Cl).unwrap();
    });
    assert_eq!(hex(&code), "40 88 C6 88 DC 41 88 C8");
}

#[test]
fn high_byte_register_conflicts_with_rex() {
    let mut buf = CodeBuffer::with_capacity(64);
    let mut a = Assembler::new(&mut buf, x64());
    assert_eq!(a.mov(Reg8::Ah, Reg8::Sil), Err(EncodeError::RexConflict));
    assert_eq!(a.mov(Reg8::R8b, Reg8::Bh), Err(EncodeError::RexConflict));
    assert_eq!(
        a.mov(byte_ptr(Address::base(Reg64::R9)), Reg8::Ch),
        Err(EncodeError::RexConflict)
    );
    assert_eq!(a.offset(), 0);
}

#[test]
fn operand_size_prefix() {
    let code = encode64(|a| {
        a.sub(Reg16::Ax, 0x1234i16).unwrap();
        a.mov(Reg16::Cx, Reg16::Dx).unwrap();
    });
    assert_eq!(hex(&code), "66 81 E8 34 12 66 89 D1");
}

// -- Immediates --

#[test]
fn immediate_type_selects_form() {
    let code = encode64(|a| {
        a.add(Reg64::Rsp, 8i8).unwrap();
        a.add(Reg32::Eax, 8i32).unwrap();
        a.and(Reg8::Cl, 0x0Fu8).unwrap();
        a.cmp(word_ptr(Address::base(Reg64::Rsi)), 5i8).unwrap();
    });
    assert_eq!(
        hex(&code),
        "48 83 C4 08 81 C0 08 00 00 00 80 E1 0F 66 83 3E 05"
    );
}

#[test]
fn mov_immediates() {
    let code = encode64(|a| {
        a.mov(Reg64::Rax, 0x1122334455667788i64).unwrap();
        a.mov(Reg32::R9d, 1u32).unwrap();
        a.mov(Reg64::Rcx, -1i32).unwrap();
        a.mov(Reg8::Bl, 0x7Fi8).unwrap();
    });
    assert_eq!(
        hex(&code),
        "48 B8 88 77 66 55 44 33 22 11 41 B9 01 00 00 00 48 C7 C1 FF FF FF FF B3 7F"
    );
}

#[test]
fn mov_memory_immediates() {
    let code = encode64(|a| {
        a.mov(dword_ptr(Address::base_offset(Reg64::Rsp, 8)), 0x7Fi32)
            .unwrap();
        a.mov(byte_ptr(Address::base(Reg64::Rdi)), 0xFFu8).unwrap();
        a.mov(qword_ptr(Address::base(Reg64::Rax)), -2i32).unwrap();
    });
    assert_eq!(
        hex(&code),
        "C7 44 24 08 7F 00 00 00 C6 07 FF 48 C7 00 FE FF FF FF"
    );
}

#[test]
fn accumulator_forms() {
    let code = encode64(|a| {
        a.alu_acc(ArithOp::Add, Reg32::Eax, 1i32).unwrap();
        a.alu_acc(ArithOp::Sub, Reg8::Al, 1i8).unwrap();
        a.alu_acc(ArithOp::Cmp, Reg64::Rax, -1i32).unwrap();
        a.test_acc(Reg32::Eax, 0xFFu32).unwrap();
    });
    assert_eq!(
        hex(&code),
        "05 01 00 00 00 2C 01 48 3D FF FF FF FF A9 FF 00 00 00"
    );
}

#[test]
fn accumulator_form_rejects_other_registers() {
    let mut buf = CodeBuffer::with_capacity(64);
    let mut a = Assembler::new(&mut buf, x64());
    assert_eq!(
        a.alu_acc(ArithOp::Add, Reg32::Ecx, 1i32),
        Err(EncodeError::NotAccumulator)
    );
    assert_eq!(a.test_acc(Reg8::R8b, 1u8), Err(EncodeError::NotAccumulator));
    assert_eq!(a.offset(), 0);
}

// -- Memory forms --

#[test]
fn base_register_special_cases() {
    let code = encode64(|a| {
        a.mov(Reg32::Eax, dword_ptr(Address::base(Reg64::Rbp))).unwrap();
        a.mov(Reg64::Rax, qword_ptr(Address::base(Reg64::R13))).unwrap();
        a.mov(Reg64::Rax, qword_ptr(Address::base(Reg64::R12))).unwrap();
        a.mov(Reg64::Rax, qword_ptr(Address::base(Reg64::Rsp))).unwrap();
    });
    assert_eq!(hex(&code), "8B 45 00 49 8B 45 00 49 8B 04 24 48 8B 04 24");
}

#[test]
fn displacement_width() {
    let code = encode64(|a| {
        a.lea(Reg64::Rax, Address::base_offset(Reg64::Rbx, 127)).unwrap();
        a.lea(Reg64::Rax, Address::base_offset(Reg64::Rbx, 128)).unwrap();
        a.lea(Reg64::Rax, Address::base_offset(Reg64::Rbx, -128)).unwrap();
        a.lea(Reg64::Rax, Address::base_offset(Reg64::Rbx, 0)).unwrap();
    });
    assert_eq!(
        hex(&code),
        "48 8D 43 7F 48 8D 83 80 00 00 00 48 8D 43 80 48 8D 43 00"
    );
}

#[test]
fn sib_forms() {
    let code = encode64(|a| {
        let addr = Address::base_index_offset(Reg64::Rbx, Reg64::Rcx, Scale::X4, 0x10).unwrap();
        a.lea(Reg64::Rax, addr).unwrap();
        let addr = Address::base_index(Reg64::R13, Reg64::R9, Scale::X8).unwrap();
        a.lea(Reg64::Rax, addr).unwrap();
    });
    assert_eq!(hex(&code), "48 8D 44 8B 10 4B 8D 44 CD 00");
}

#[test]
fn index_without_base() {
    let code = encode32(|a| {
        let addr = Address::index_offset(Reg32::Ecx, Scale::X8, 0x100).unwrap();
        a.lea(Reg32::Eax, addr).unwrap();
    });
    assert_eq!(hex(&code), "8D 04 CD 00 01 00 00");
}

#[test]
fn offset_addressing() {
    // Absolute in 32-bit code, RIP-relative in 64-bit code; same bytes.
    let code32 = encode32(|a| {
        a.mov(Reg32::Eax, dword_ptr(Address::offset(0x1000))).unwrap();
    });
    let code64 = encode64(|a| {
        a.mov(Reg32::Eax, dword_ptr(Address::offset(0x1000))).unwrap();
    });
    assert_eq!(hex(&code32), "8B 05 00 10 00 00");
    assert_eq!(code32, code64);
}

#[test]
fn address_size_prefix_in_long_mode() {
    let code = encode64(|a| {
        a.mov(Reg32::Eax, dword_ptr(Address::base(Reg32::Ecx))).unwrap();
    });
    assert_eq!(hex(&code), "67 8B 01");
}

#[test]
fn segment_override() {
    let code = encode32(|a| {
        let fs = Address::base(Reg32::Ecx).with_segment(SegReg::Fs);
        a.mov(Reg32::Eax, dword_ptr(fs)).unwrap();
        let ds = Address::base(Reg32::Ecx).with_segment(SegReg::Ds);
        a.mov(Reg32::Eax, dword_ptr(ds)).unwrap();
        let ss = Address::base(Reg32::Ebp).with_segment(SegReg::Ss);
        a.mov(Reg32::Eax, dword_ptr(ss)).unwrap();
    });
    assert_eq!(hex(&code), "64 8B 01 8B 01 8B 45 00");
}

// -- Mode checks --

#[test]
fn long_mode_operands_rejected_in_32bit() {
    let mut buf = CodeBuffer::with_capacity(64);
    let mut a = Assembler::new(&mut buf, x86());
    let mismatch = |r: Result<(), EncodeError>| matches!(r, Err(EncodeError::ModeMismatch { mode: Mode::Bits32, .. }));
    assert!(mismatch(a.mov(Reg64::Rax, Reg64::Rbx).map(|_| ())));
    assert!(mismatch(a.mov(Reg32::R8d, Reg32::Eax).map(|_| ())));
    assert!(mismatch(a.mov(Reg8::Sil, Reg8::Al).map(|_| ())));
    assert!(mismatch(
        a.mov(Reg32::Eax, dword_ptr(Address::base(Reg64::Rax))).map(|_| ())
    ));
    assert!(mismatch(a.cqo().map(|_| ())));
    assert_eq!(a.offset(), 0);
}

// -- Instruction families --

#[test]
fn shifts() {
    let code = encode64(|a| {
        a.shl(Reg32::Eax, ByOne).unwrap();
        a.shr(Reg64::Rdx, 4u8).unwrap();
        a.sar(Reg8::Cl, ByCl).unwrap();
        a.rol(dword_ptr(Address::base(Reg64::Rax)), ByCl).unwrap();
    });
    assert_eq!(hex(&code), "D1 E0 48 C1 EA 04 D2 F9 D3 00");
}

#[test]
fn unary_group() {
    let code = encode64(|a| {
        a.neg(Reg32::Eax).unwrap();
        a.not(Reg64::Rax).unwrap();
        a.inc(Reg32::Ecx).unwrap();
        a.dec(Reg8::Bl).unwrap();
        a.idiv(Reg64::Rcx).unwrap();
        a.mul(dword_ptr(Address::base(Reg64::Rbx))).unwrap();
    });
    assert_eq!(hex(&code), "F7 D8 48 F7 D0 FF C1 FE CB 48 F7 F9 F7 23");
}

#[test]
fn push_pop() {
    let code = encode64(|a| {
        a.push(Reg64::Rbp).unwrap();
        a.push(Reg64::R12).unwrap();
        a.pop(Reg64::Rbx).unwrap();
        a.push(Reg16::Ax).unwrap();
        a.push(qword_ptr(Address::base(Reg64::Rax))).unwrap();
        a.pop(qword_ptr(Address::base(Reg64::Rcx))).unwrap();
        a.push_imm8(-1).unwrap();
        a.push_imm32(0x1000).unwrap();
    });
    assert_eq!(
        hex(&code),
        "55 41 54 5B 66 50 FF 30 8F 01 6A FF 68 00 10 00 00"
    );
}

#[test]
fn push_width_follows_mode() {
    let code = encode32(|a| {
        a.push(Reg32::Eax).unwrap();
        a.pop(dword_ptr(Address::base(Reg32::Esi))).unwrap();
    });
    assert_eq!(hex(&code), "50 8F 06");

    let mut buf = CodeBuffer::with_capacity(16);
    let mut a = Assembler::new(&mut buf, x64());
    assert!(matches!(
        a.push(Reg32::Eax),
        Err(EncodeError::ModeMismatch { .. })
    ));
}

#[test]
fn extensions() {
    let code = encode64(|a| {
        a.movzx(Reg32::Eax, Reg8::Cl).unwrap();
        a.movsx(Reg64::Rax, Reg16::Cx).unwrap();
        a.movzx(Reg16::Ax, byte_ptr(Address::base(Reg64::Rsi))).unwrap();
        a.movsxd(Reg64::Rax, Reg32::Eax).unwrap();
    });
    assert_eq!(hex(&code), "0F B6 C1 48 0F BF C1 66 0F B6 06 48 63 C0");
}

#[test]
fn setcc_and_test() {
    let code = encode64(|a| {
        a.setcc(Cond::E, Reg8::Al).unwrap();
        a.setcc(Cond::Ne, Reg8::Sil).unwrap();
        a.test(Reg32::Eax, Reg32::Eax).unwrap();
        a.test(Reg8::Al, 1u8).unwrap();
    });
    assert_eq!(hex(&code), "0F 94 C0 40 0F 95 C6 85 C0 F6 C0 01");
}

#[test]
fn xchg_imul_bit_test() {
    let code = encode64(|a| {
        a.xchg(Reg64::Rax, Reg64::Rbx).unwrap();
        a.imul(Reg32::Eax, Reg32::Ecx).unwrap();
        a.imul3(Reg32::Eax, Reg32::Ecx, 10i8).unwrap();
        a.imul3(Reg32::Eax, Reg32::Ecx, 1000i32).unwrap();
        a.bt(Reg32::Eax, 3u8).unwrap();
        a.bts(Reg32::Eax, Reg32::Ecx).unwrap();
    });
    assert_eq!(
        hex(&code),
        "48 87 D8 0F AF C1 6B C1 0A 69 C1 E8 03 00 00 0F BA E0 03 0F AB C8"
    );
}

#[test]
fn accumulator_conversions() {
    let code = encode64(|a| {
        a.cbw().unwrap();
        a.cwde().unwrap();
        a.cdqe().unwrap();
        a.cwd().unwrap();
        a.cdq().unwrap();
        a.cqo().unwrap();
    });
    assert_eq!(hex(&code), "66 98 98 48 98 66 99 99 48 99");
}

#[test]
fn fixed_instructions() {
    let code = encode64(|a| {
        a.ret().unwrap();
        a.ret_imm(8).unwrap();
        a.int(0x80).unwrap();
        a.int3().unwrap();
        a.leave().unwrap();
        a.nop().unwrap();
        a.pad(3).unwrap();
    });
    assert_eq!(hex(&code), "C3 C2 08 00 CD 80 CC C9 90 90 90 90");
}

#[test]
fn indirect_branches() {
    let code = encode64(|a| {
        a.jmp_indirect(Reg64::Rax).unwrap();
        a.call_indirect(qword_ptr(Address::base(Reg64::Rax))).unwrap();
        a.call_indirect(Reg64::R11).unwrap();
    });
    assert_eq!(hex(&code), "FF E0 FF 10 41 FF D3");
}

#[test]
fn known_target_branches() {
    let code = encode64(|a| {
        a.jmp_to(0).unwrap();
        a.jmp_short_to(0).unwrap();
        a.jcc_to(Cond::E, 0x100).unwrap();
        a.call_to(0).unwrap();
    });
    // jmp at 0: rel = 0 - 5; jmp short at 5: rel = 0 - 7;
    // je at 7: rel = 0x100 - 13; call at 13: rel = 0 - 18
    assert_eq!(
        hex(&code),
        "E9 FB FF FF FF EB F9 0F 84 F3 00 00 00 E8 EE FF FF FF"
    );
}

#[test]
fn short_branch_out_of_range_writes_nothing() {
    let mut buf = CodeBuffer::with_capacity(64);
    let mut a = Assembler::new(&mut buf, x64());
    assert_eq!(
        a.jmp_short_to(200),
        Err(EncodeError::BranchOutOfRange(198))
    );
    assert_eq!(
        a.jcc_short_to(Cond::L, 130),
        Err(EncodeError::BranchOutOfRange(128))
    );
    assert_eq!(a.offset(), 0);
}

// -- Atomicity --

#[test]
fn buffer_full_leaves_no_partial_instruction() {
    let mut buf = CodeBuffer::with_capacity(4);
    let mut a = Assembler::new(&mut buf, x64());
    a.nop().unwrap();
    assert_eq!(
        a.add(Reg32::Eax, 0x12345678i32).map(|_| ()),
        Err(EncodeError::BufferFull {
            needed: 6,
            remaining: 3
        })
    );
    assert_eq!(a.offset(), 1);
    a.add(Reg32::Eax, Reg32::Ecx).unwrap();
    assert_eq!(hex(buf.as_slice()), "90 01 C8");
}

#[test]
fn measure_mode_tracks_length() {
    let emit = |a: &mut Assembler<'_>| {
        a.mov(Reg64::Rax, 0x1122334455667788i64).unwrap();
        a.lea(Reg64::R12, Address::base_offset(Reg64::R13, 0x1000)).unwrap();
        a.push(Reg64::Rbx).unwrap();
    };

    let mut real = CodeBuffer::with_capacity(64);
    emit(&mut Assembler::new(&mut real, x64()));
    let mut measure = CodeBuffer::measure(64);
    emit(&mut Assembler::new(&mut measure, x64()));

    assert_eq!(measure.offset(), real.offset());
    assert!(measure.as_slice().is_empty());
}
