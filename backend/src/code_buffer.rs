use std::io;
use std::ops::{Deref, DerefMut};

use log::debug;
use xjit_core::{EncodeError, Result};

use crate::exec_mem::ExecMemory;

/// Default code buffer size: 16 MiB.
const DEFAULT_CODE_BUF_SIZE: usize = 16 * 1024 * 1024;

/// Byte used by `reserve` for space that is filled in later (INT3).
pub const RESERVE_FILL: u8 = 0xCC;

enum Storage {
    Mapped(ExecMemory),
    Owned(Box<[u8]>),
    /// Size-only pass: the cursor moves, nothing is stored.
    Measure,
}

/// Fixed-capacity code region with an append cursor.
///
/// Appends go through [`emit_bytes`](Self::emit_bytes), which either writes
/// the whole slice or fails without moving the cursor. Random-access
/// writes (patching) are bounds-checked against the capacity.
pub struct CodeBuffer {
    storage: Storage,
    size: usize,
    offset: usize,
    /// Writable window `[base, limit)`; the whole buffer unless inside a
    /// sub-block.
    base: usize,
    limit: usize,
}

impl CodeBuffer {
    /// Allocate an executable-memory backed buffer (rounded up to page size).
    pub fn new(size: usize) -> io::Result<Self> {
        let mem = ExecMemory::new(size)?;
        let size = mem.len();
        Ok(Self {
            storage: Storage::Mapped(mem),
            size,
            offset: 0,
            base: 0,
            limit: size,
        })
    }

    /// Allocate with the default size (16 MiB).
    pub fn with_default_size() -> io::Result<Self> {
        Self::new(DEFAULT_CODE_BUF_SIZE)
    }

    /// Heap-backed buffer of exactly `size` bytes. Not executable.
    pub fn with_capacity(size: usize) -> Self {
        debug!("heap code buffer of {size} bytes");
        Self {
            storage: Storage::Owned(vec![0u8; size].into_boxed_slice()),
            size,
            offset: 0,
            base: 0,
            limit: size,
        }
    }

    /// Measure-mode buffer: encodes advance the cursor but store nothing.
    pub fn measure(size: usize) -> Self {
        Self {
            storage: Storage::Measure,
            size,
            offset: 0,
            base: 0,
            limit: size,
        }
    }

    #[inline]
    pub fn is_measuring(&self) -> bool {
        matches!(self.storage, Storage::Measure)
    }

    /// Current write offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Remaining writable bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit - self.offset
    }

    /// Rewind the cursor to the start. Storage is left untouched, so
    /// previously returned offsets still name the same bytes.
    pub fn reset(&mut self) {
        debug!("code buffer reset from offset {}", self.offset);
        self.offset = self.base;
    }

    /// Set the write offset (e.g. to resume writing at a saved position).
    pub fn set_offset(&mut self, offset: usize) -> Result<()> {
        if offset < self.base || offset > self.limit {
            return Err(EncodeError::OutOfBounds {
                offset,
                len: 0,
                capacity: self.limit,
            });
        }
        self.offset = offset;
        Ok(())
    }

    // -- Emit methods --

    /// Append `data` at the cursor. Returns the offset it was written at.
    pub fn emit_bytes(&mut self, data: &[u8]) -> Result<usize> {
        let start = self.offset;
        if data.len() > self.remaining() {
            return Err(EncodeError::BufferFull {
                needed: data.len(),
                remaining: self.remaining(),
            });
        }
        if let Some(bytes) = self.bytes_mut() {
            bytes[start..start + data.len()].copy_from_slice(data);
        }
        self.offset += data.len();
        Ok(start)
    }

    #[inline]
    pub fn emit_u8(&mut self, val: u8) -> Result<usize> {
        self.emit_bytes(&[val])
    }

    #[inline]
    pub fn emit_u16(&mut self, val: u16) -> Result<usize> {
        self.emit_bytes(&val.to_le_bytes())
    }

    #[inline]
    pub fn emit_u32(&mut self, val: u32) -> Result<usize> {
        self.emit_bytes(&val.to_le_bytes())
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) -> Result<usize> {
        self.emit_bytes(&val.to_le_bytes())
    }

    /// Skip `len` bytes, filling them with [`RESERVE_FILL`]. Returns the
    /// start offset of the reserved span.
    pub fn reserve(&mut self, len: usize) -> Result<usize> {
        if len > self.remaining() {
            return Err(EncodeError::BufferFull {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let start = self.offset;
        if let Some(bytes) = self.bytes_mut() {
            bytes[start..start + len].fill(RESERVE_FILL);
        }
        self.offset += len;
        Ok(start)
    }

    // -- Random access --

    fn check(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(EncodeError::OutOfBounds {
                offset,
                len,
                capacity: self.size,
            }),
        }
    }

    /// Overwrite bytes at `offset` (for back-patching). A no-op beyond the
    /// bounds check in measure mode.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.check(offset, data.len())?;
        if let Some(bytes) = self.bytes_mut() {
            bytes[offset..offset + data.len()].copy_from_slice(data);
        }
        Ok(())
    }

    /// Copy `out.len()` bytes starting at `offset` into `out`.
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        self.check(offset, out.len())?;
        let bytes = self.bytes().ok_or(EncodeError::NoStorage)?;
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
        Ok(())
    }

    #[inline]
    pub fn patch_u8(&mut self, offset: usize, val: u8) -> Result<()> {
        self.write_at(offset, &[val])
    }

    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) -> Result<()> {
        self.write_at(offset, &val.to_le_bytes())
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        let mut raw = [0u8; 1];
        self.read_at(offset, &mut raw)?;
        Ok(raw[0])
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.read_at(offset, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Get the generated code as a byte slice (up to current offset).
    /// Empty in measure mode.
    pub fn as_slice(&self) -> &[u8] {
        self.bytes().map_or(&[], |b| &b[..self.offset])
    }

    /// Restrict writing to `[start, start + len)` until the returned guard
    /// is dropped. The guard's cursor starts at `start`; the outer cursor
    /// is restored afterwards.
    pub fn sub_block(&mut self, start: usize, len: usize) -> Result<SubBlock<'_>> {
        match start.checked_add(len) {
            Some(end) if start >= self.base && end <= self.limit => {}
            _ => {
                return Err(EncodeError::OutOfBounds {
                    offset: start,
                    len,
                    capacity: self.limit,
                })
            }
        }
        let saved = (self.offset, self.base, self.limit);
        self.offset = start;
        self.base = start;
        self.limit = start + len;
        Ok(SubBlock { buf: self, saved })
    }

    // -- Executable memory --

    /// Pointer to `offset` inside an executable-memory backed buffer.
    pub fn entry_ptr(&self, offset: usize) -> Result<*const u8> {
        self.check(offset, 0)?;
        match &self.storage {
            // SAFETY: offset <= size was checked above.
            Storage::Mapped(mem) => Ok(unsafe { mem.as_ptr().add(offset) }),
            _ => Err(EncodeError::NoStorage),
        }
    }

    /// Make the buffer executable and non-writable.
    pub fn set_executable(&self) -> io::Result<()> {
        self.mapped()?.set_executable()
    }

    /// Make the buffer writable and non-executable.
    pub fn set_writable(&self) -> io::Result<()> {
        self.mapped()?.set_writable()
    }

    fn mapped(&self) -> io::Result<&ExecMemory> {
        match &self.storage {
            Storage::Mapped(mem) => Ok(mem),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "code buffer is not backed by executable memory",
            )),
        }
    }

    fn bytes(&self) -> Option<&[u8]> {
        match &self.storage {
            Storage::Mapped(mem) => Some(mem.as_slice()),
            Storage::Owned(b) => Some(b),
            Storage::Measure => None,
        }
    }

    fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.storage {
            Storage::Mapped(mem) => Some(mem.as_mut_slice()),
            Storage::Owned(b) => Some(b),
            Storage::Measure => None,
        }
    }
}

/// Window onto part of a [`CodeBuffer`]; see [`CodeBuffer::sub_block`].
pub struct SubBlock<'a> {
    buf: &'a mut CodeBuffer,
    saved: (usize, usize, usize),
}

impl Deref for SubBlock<'_> {
    type Target = CodeBuffer;

    fn deref(&self) -> &CodeBuffer {
        self.buf
    }
}

impl DerefMut for SubBlock<'_> {
    fn deref_mut(&mut self) -> &mut CodeBuffer {
        self.buf
    }
}

impl Drop for SubBlock<'_> {
    fn drop(&mut self) {
        (self.buf.offset, self.buf.base, self.buf.limit) = self.saved;
    }
}
