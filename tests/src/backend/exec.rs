//! Run generated code on the host (System V x86-64).

use xjit_backend::{Assembler, CodeBuffer};
use xjit_core::{qword_ptr, Address, Cond, Reg32, Reg64, Scale};

use super::x64;

/// Flip `buf` to executable and return the entry point as a function.
macro_rules! entry {
    ($buf:expr, $ty:ty) => {{
        $buf.set_executable().unwrap();
        let ptr = $buf.entry_ptr(0).unwrap();
        // SAFETY: the buffer holds a complete function with this signature.
        unsafe { std::mem::transmute::<*const u8, $ty>(ptr) }
    }};
}

#[test]
fn add_two_arguments() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let mut a = Assembler::new(&mut buf, x64());
    a.mov(Reg32::Eax, Reg32::Edi).unwrap();
    a.add(Reg32::Eax, Reg32::Esi).unwrap();
    a.ret().unwrap();

    let f = entry!(buf, extern "C" fn(i32, i32) -> i32);
    assert_eq!(f(2, 40), 42);
    assert_eq!(f(-5, 3), -2);
}

#[test]
fn counted_loop_with_labels() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let mut a = Assembler::new(&mut buf, x64());
    a.xor(Reg32::Eax, Reg32::Eax).unwrap();
    a.test(Reg32::Edi, Reg32::Edi).unwrap();
    let done = a.jcc_short_forward(Cond::E).unwrap();
    let top = a.offset();
    a.add(Reg32::Eax, Reg32::Edi).unwrap();
    a.dec(Reg32::Edi).unwrap();
    a.jcc_short_to(Cond::Ne, top).unwrap();
    done.bind(a.buffer_mut()).unwrap();
    a.ret().unwrap();

    let f = entry!(buf, extern "C" fn(u32) -> u32);
    assert_eq!(f(0), 0);
    assert_eq!(f(10), 55);
    assert_eq!(f(100), 5050);
}

#[test]
fn scaled_index_load() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let mut a = Assembler::new(&mut buf, x64());
    let addr = Address::base_index(Reg64::Rdi, Reg64::Rsi, Scale::X8).unwrap();
    a.mov(Reg64::Rax, qword_ptr(addr)).unwrap();
    a.ret().unwrap();

    let data = [10i64, -20, 30, i64::MAX];
    let f = entry!(buf, extern "C" fn(*const i64, usize) -> i64);
    for (i, &v) in data.iter().enumerate() {
        assert_eq!(f(data.as_ptr(), i), v);
    }
}

#[test]
fn patch_then_rerun() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let mut a = Assembler::new(&mut buf, x64());
    let (_, imm) = a.mov(Reg64::Rax, 7i64).unwrap();
    a.ret().unwrap();

    let f = entry!(buf, extern "C" fn() -> i64);
    assert_eq!(f(), 7);

    buf.set_writable().unwrap();
    imm.replace(&mut buf, -123_456_789_012).unwrap();
    let f = entry!(buf, extern "C" fn() -> i64);
    assert_eq!(f(), -123_456_789_012);
}
