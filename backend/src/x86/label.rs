//! Forward branch labels.
//!
//! A branch to a not-yet-known target is emitted with a zero
//! displacement and returns a label naming that placeholder. Binding the
//! label consumes it, so each placeholder is resolved at most once.

use log::trace;
use thiserror::Error;
use xjit_core::imm::{fits_i32, fits_i8};
use xjit_core::{EncodeError, Result};

use crate::code_buffer::CodeBuffer;

/// Why a short label could not be bound.
#[derive(Debug, Error)]
pub enum BindError {
    /// The displacement does not fit in rel8. The label is handed back
    /// unbound and the buffer is untouched.
    #[error("short label {label:?} cannot reach displacement {rel}")]
    LabelOverflow { label: ShortLabel, rel: i64 },

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

fn rel_to(at: usize, width: usize, target: usize) -> i64 {
    target as i64 - (at + width) as i64
}

/// Unbound `rel8` placeholder of a short jump, `Jcc`, `LOOP` or `JECXZ`.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an unbound label leaves a zero displacement behind"]
pub struct ShortLabel {
    at: usize,
}

impl ShortLabel {
    pub(crate) fn new(at: usize) -> Self {
        Self { at }
    }

    /// Offset of the placeholder byte.
    #[inline]
    pub fn offset(&self) -> usize {
        self.at
    }

    /// Point the branch at `target`.
    pub fn bind_to(self, buf: &mut CodeBuffer, target: usize) -> std::result::Result<(), BindError> {
        let rel = rel_to(self.at, 1, target);
        if !fits_i8(rel) {
            return Err(BindError::LabelOverflow { label: self, rel });
        }
        buf.patch_u8(self.at, rel as i8 as u8)?;
        trace!("bind rel8 at {:#x} -> {target:#x}", self.at);
        Ok(())
    }

    /// Point the branch at the buffer's current offset.
    pub fn bind(self, buf: &mut CodeBuffer) -> std::result::Result<(), BindError> {
        let target = buf.offset();
        self.bind_to(buf, target)
    }
}

/// Unbound `rel32` placeholder of a near `JMP`, `Jcc` or `CALL`.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an unbound label leaves a zero displacement behind"]
pub struct NearLabel {
    at: usize,
}

impl NearLabel {
    pub(crate) fn new(at: usize) -> Self {
        Self { at }
    }

    /// Offset of the first placeholder byte.
    #[inline]
    pub fn offset(&self) -> usize {
        self.at
    }

    pub fn bind_to(self, buf: &mut CodeBuffer, target: usize) -> Result<()> {
        let rel = rel_to(self.at, 4, target);
        if !fits_i32(rel) {
            return Err(EncodeError::BranchOutOfRange(rel));
        }
        buf.patch_u32(self.at, rel as i32 as u32)?;
        trace!("bind rel32 at {:#x} -> {target:#x}", self.at);
        Ok(())
    }

    pub fn bind(self, buf: &mut CodeBuffer) -> Result<()> {
        let target = buf.offset();
        self.bind_to(buf, target)
    }
}
