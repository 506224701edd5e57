use thiserror::Error;

use crate::config::{Features, Mode};

/// Why an instruction was not encoded, or a field not patched.
///
/// Every encode either writes a complete instruction or fails with one of
/// these before touching the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("operand not encodable in {mode:?} mode: {what}")]
    ModeMismatch { mode: Mode, what: &'static str },

    #[error("AH/CH/DH/BH cannot be combined with an operand that needs a REX prefix")]
    RexConflict,

    #[error("ESP/RSP cannot be used as an index register")]
    StackPointerIndex,

    #[error("accumulator form requires AL/AX/EAX/RAX as destination")]
    NotAccumulator,

    #[error("instruction requires CPU feature {0:?}")]
    FeatureDisabled(Features),

    #[error("invalid operand: {0}")]
    InvalidOperand(&'static str),

    #[error("code buffer full: need {needed} bytes, {remaining} left")]
    BufferFull { needed: usize, remaining: usize },

    #[error("access of {len} bytes at offset {offset} exceeds capacity {capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("code buffer is in measure mode and holds no bytes")]
    NoStorage,

    #[error("replacement would change the instruction size")]
    PatchWouldResize,

    #[error("displacement {0} does not fit the encoded field")]
    DisplacementOutOfRange(i64),

    #[error("branch displacement {0} out of range")]
    BranchOutOfRange(i64),
}

pub type Result<T> = std::result::Result<T, EncodeError>;
