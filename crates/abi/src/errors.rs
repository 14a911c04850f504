use console::ConsoleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which LIFO a stack fault happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackKind {
    Data,
    Return,
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackKind::Data => write!(f, "data"),
            StackKind::Return => write!(f, "return"),
        }
    }
}

/// Faults raised while the machine runs. Every one of them stops it.
#[derive(Debug, Error)]
pub enum VmError {
    /// Code cell holds a number outside the primitive set.
    #[error("decode fault: opcode {opcode} at pc {pc:#06x}")]
    Decode { opcode: u16, pc: u16 },
    /// Access reaches past the end of memory.
    #[error("address fault: {width}-byte access at {addr:#06x}")]
    Address { addr: u16, width: u8 },
    #[error("{stack} stack underflow (pointer {pointer:#06x})")]
    StackUnderflow { stack: StackKind, pointer: u16 },
    #[error("{stack} stack overflow (pointer {pointer:#06x})")]
    StackOverflow { stack: StackKind, pointer: u16 },
    #[error(transparent)]
    Console(#[from] ConsoleError),
    /// Stepping a machine that already faulted.
    #[error("machine stopped by an earlier fault: {fault}")]
    Stopped { fault: String },
}

/// Faults raised before the first step: the image itself is unusable.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("short image: expected {expected} bytes, got {actual}")]
    Short { expected: usize, actual: usize },
    #[error("oversized image: expected exactly {expected} bytes")]
    Oversized { expected: usize },
    #[error("image io: {0}")]
    Io(#[from] std::io::Error),
}
