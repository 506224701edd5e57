//! Property tests over registers, displacements and buffer sizes.

use iced_x86::{Decoder, DecoderOptions, Mnemonic};
use proptest::prelude::*;
use xjit_backend::{Assembler, CodeBuffer};
use xjit_core::{dword_ptr, qword_ptr, Address, Displacement, EncodeError, Reg32, Reg64, Scale};

use super::{encode64, x64, REG64};

fn arb_reg64() -> impl Strategy<Value = Reg64> {
    prop::sample::select(REG64.to_vec())
}

fn arb_index() -> impl Strategy<Value = Reg64> {
    prop::sample::select(
        REG64
            .iter()
            .copied()
            .filter(|&r| r != Reg64::Rsp)
            .collect::<Vec<_>>(),
    )
}

fn arb_scale() -> impl Strategy<Value = Scale> {
    prop::sample::select(vec![Scale::X1, Scale::X2, Scale::X4, Scale::X8])
}

/// A short mixed sequence exercising most operand shapes.
fn sequence(a: &mut Assembler<'_>, base: Reg64, index: Reg64, scale: Scale, disp: i32) {
    let addr = Address::base_index_offset(base, index, scale, disp).unwrap();
    a.mov(base, index).unwrap();
    a.lea(Reg64::Rax, addr).unwrap();
    a.add(dword_ptr(Address::base_offset(base, disp)), 7i8).unwrap();
    a.push(base).unwrap();
    a.imul(Reg64::R11, base).unwrap();
    a.ret().unwrap();
}

proptest! {
    #[test]
    fn encoding_is_deterministic(
        base in arb_reg64(),
        index in arb_index(),
        scale in arb_scale(),
        disp in any::<i32>(),
    ) {
        let first = encode64(|a| sequence(a, base, index, scale, disp));
        let second = encode64(|a| sequence(a, base, index, scale, disp));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn displacement_width_follows_value(base in arb_reg64(), disp in any::<i32>()) {
        let code = encode64(|a| {
            a.lea(Reg64::Rax, Address::base_offset(base, disp)).unwrap();
        });
        // REX.W, 8D, ModR/M, optional SIB, displacement.
        let sib = usize::from(matches!(base, Reg64::Rsp | Reg64::R12));
        let expected = 3 + sib + Displacement::fit(disp).len();
        prop_assert_eq!(code.len(), expected);

        let mut decoder = Decoder::with_ip(64, &code, 0, DecoderOptions::NONE);
        let instr = decoder.decode();
        prop_assert_eq!(instr.mnemonic(), Mnemonic::Lea);
        prop_assert_eq!(instr.len(), code.len());
        prop_assert_eq!(instr.memory_displacement64() as i64, i64::from(disp));
    }

    #[test]
    fn stack_pointer_base_always_takes_sib(
        base in prop::sample::select(vec![Reg64::Rsp, Reg64::R12]),
        disp in any::<i32>(),
    ) {
        let code = encode64(|a| {
            a.mov(Reg32::Ecx, dword_ptr(Address::base_offset(base, disp))).unwrap();
        });
        let modrm_at = if base == Reg64::R12 { 2 } else { 1 };
        prop_assert_eq!(code[modrm_at] & 0x07, 0b100);
        prop_assert_eq!(code[modrm_at + 1], 0x24);
    }

    #[test]
    fn patched_registers_match_fresh_encoding(
        a_reg in arb_reg64(),
        b_reg in arb_reg64(),
        c_reg in arb_reg64(),
    ) {
        let mut buf = CodeBuffer::with_capacity(16);
        let mut asm = Assembler::new(&mut buf, x64());
        let (dst, _) = asm.mov(a_reg, b_reg).unwrap();
        // REX.W is always present, so any 64-bit register fits.
        dst.replace(asm.buffer_mut(), c_reg).unwrap();
        let patched = asm.buffer().as_slice().to_vec();

        let fresh = encode64(|a| {
            a.mov(c_reg, b_reg).unwrap();
        });
        prop_assert_eq!(patched, fresh);
    }

    #[test]
    fn measuring_matches_writing(
        base in arb_reg64(),
        index in arb_index(),
        scale in arb_scale(),
        disp in any::<i32>(),
    ) {
        let written = encode64(|a| sequence(a, base, index, scale, disp));

        let mut buf = CodeBuffer::measure(256);
        let mut asm = Assembler::new(&mut buf, x64());
        sequence(&mut asm, base, index, scale, disp);
        prop_assert_eq!(asm.offset(), written.len());
    }

    #[test]
    fn rejected_writes_leave_no_bytes(cap in 0usize..16, disp in any::<i32>()) {
        let mut buf = CodeBuffer::with_capacity(cap);
        let mut asm = Assembler::new(&mut buf, x64());
        let addr = Address::base_index_offset(Reg64::R13, Reg64::R9, Scale::X2, disp).unwrap();
        let mut written = 0;
        loop {
            let before = asm.offset();
            match asm.mov(Reg64::R8, qword_ptr(addr)) {
                Ok(_) => written += asm.offset() - before,
                Err(EncodeError::BufferFull { .. }) => {
                    prop_assert_eq!(asm.offset(), before);
                    break;
                }
                Err(e) => return Err(TestCaseError::fail(format!("unexpected {e}"))),
            }
        }
        prop_assert_eq!(written, asm.offset());
        prop_assert!(asm.offset() <= cap);
    }

    #[test]
    fn immediate_patch_round_trips(first in any::<i32>(), value in any::<i32>()) {
        let mut buf = CodeBuffer::with_capacity(16);
        let mut asm = Assembler::new(&mut buf, x64());
        let (_, imm) = asm.mov(Reg32::Ecx, first).unwrap();
        imm.replace(asm.buffer_mut(), value).unwrap();
        prop_assert_eq!(imm.read(asm.buffer()).unwrap(), value);

        let fresh = encode64(|a| {
            a.mov(Reg32::Ecx, value).unwrap();
        });
        prop_assert_eq!(asm.buffer().as_slice(), &fresh[..]);
    }

    #[test]
    fn near_branch_retarget_round_trips(
        first in 0usize..4096,
        rel in -5i64..=i64::from(i32::MAX),
    ) {
        let mut buf = CodeBuffer::with_capacity(16);
        let mut asm = Assembler::new(&mut buf, x64());
        let branch = asm.jmp_to(first).unwrap();
        // E9 rel32 at offset 0 ends at 5.
        let target = (5 + rel) as usize;
        branch.retarget(asm.buffer_mut(), target).unwrap();
        prop_assert_eq!(branch.target(asm.buffer()).unwrap(), target);
        prop_assert_eq!(&asm.buffer().as_slice()[1..], &(rel as i32).to_le_bytes()[..]);
    }

    #[test]
    fn short_branch_retarget_stays_in_range(target in 0usize..512) {
        let mut buf = CodeBuffer::with_capacity(16);
        let mut asm = Assembler::new(&mut buf, x64());
        let branch = asm.jmp_short_to(0).unwrap();
        let before = asm.buffer().as_slice().to_vec();
        // EB rel8 at offset 0 ends at 2.
        let rel = target as i64 - 2;
        match branch.retarget(asm.buffer_mut(), target) {
            Ok(()) => {
                prop_assert!((-128..=127).contains(&rel));
                prop_assert_eq!(branch.target(asm.buffer()).unwrap(), target);
            }
            Err(e) => {
                prop_assert_eq!(e, EncodeError::BranchOutOfRange(rel));
                prop_assert!(rel > 127);
                prop_assert_eq!(asm.buffer().as_slice(), &before[..]);
            }
        }
    }

    #[test]
    fn disp8_patch_round_trips(value in -128i32..=127, outside in 128i32..=i32::MAX) {
        let mut buf = CodeBuffer::with_capacity(16);
        let mut asm = Assembler::new(&mut buf, x64());
        let (_, mem) = asm
            .mov(Reg32::Eax, dword_ptr(Address::base_offset(Reg64::Rbx, 8)))
            .unwrap();
        let disp = mem.disp.unwrap();
        prop_assert_eq!(disp.width(), 1);

        disp.replace(asm.buffer_mut(), value).unwrap();
        prop_assert_eq!(disp.read(asm.buffer()).unwrap(), value);
        for wide in [outside, -outside - 1] {
            prop_assert_eq!(
                disp.replace(asm.buffer_mut(), wide),
                Err(EncodeError::DisplacementOutOfRange(i64::from(wide)))
            );
        }
        prop_assert_eq!(disp.read(asm.buffer()).unwrap(), value);
        prop_assert_eq!(asm.offset(), 3);
    }

    #[test]
    fn disp32_patch_round_trips(value in any::<i32>()) {
        let mut buf = CodeBuffer::with_capacity(16);
        let mut asm = Assembler::new(&mut buf, x64());
        let (_, mem) = asm
            .mov(Reg32::Eax, dword_ptr(Address::base_offset(Reg64::Rbx, 0x1000)))
            .unwrap();
        let disp = mem.disp.unwrap();
        prop_assert_eq!(disp.width(), 4);
        disp.replace(asm.buffer_mut(), value).unwrap();
        prop_assert_eq!(disp.read(asm.buffer()).unwrap(), value);
    }
}
