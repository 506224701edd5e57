use std::io;
use std::ptr;

use log::debug;

/// Anonymous page-aligned memory for generated code.
///
/// Follows W^X discipline: the mapping is either writable or
/// executable, never both.
pub struct ExecMemory {
    ptr: *mut u8,
    size: usize,
}

// SAFETY: ExecMemory owns its mmap'd memory exclusively.
unsafe impl Send for ExecMemory {}

impl ExecMemory {
    /// Map `size` bytes (rounded up to page size) read/write.
    pub fn new(size: usize) -> io::Result<Self> {
        let page_size = page_size();
        let size = (size.max(1) + page_size - 1) & !(page_size - 1);

        // SAFETY: mmap with MAP_ANONYMOUS | MAP_PRIVATE, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        debug!("mapped {size} bytes of code memory at {ptr:p}");
        Ok(Self {
            ptr: ptr as *mut u8,
            size,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr as *const u8
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the whole mapping is initialized (anonymous pages are zeroed).
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    /// Only valid while the mapping is writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: exclusive borrow of an initialized mapping we own.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }

    /// Make the mapping executable and non-writable.
    pub fn set_executable(&self) -> io::Result<()> {
        self.protect(libc::PROT_READ | libc::PROT_EXEC)
    }

    /// Make the mapping writable and non-executable.
    pub fn set_writable(&self) -> io::Result<()> {
        self.protect(libc::PROT_READ | libc::PROT_WRITE)
    }

    fn protect(&self, prot: libc::c_int) -> io::Result<()> {
        let ret = unsafe { libc::mprotect(self.ptr as *mut libc::c_void, self.size, prot) };
        if ret != 0 {
            Err(io::Error::last_os_error())
        } else {
            debug!("mprotect {:p} +{} -> {prot:#x}", self.ptr, self.size);
            Ok(())
        }
    }
}

impl Drop for ExecMemory {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf is always safe to call.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
