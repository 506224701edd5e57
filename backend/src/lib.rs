pub mod code_buffer;
pub mod exec_mem;
pub mod x86;

pub use code_buffer::{CodeBuffer, SubBlock};
pub use exec_mem::ExecMemory;
pub use x86::Assembler;
