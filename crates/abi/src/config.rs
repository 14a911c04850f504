use serde::{Deserialize, Serialize};

use crate::vm::Registers;
use crate::{CELL, EOF_SENTINEL, STACK_CELLS};

/// Legal extent of one stack. The register equals `base` when the stack is
/// empty and counts down toward `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackBounds {
    pub base: u16,
    pub limit: u16,
}

impl StackBounds {
    /// `cells` deep below `base`.
    pub fn below(base: u16, cells: u16) -> Self {
        Self {
            base,
            limit: base.saturating_sub(cells.saturating_mul(CELL)),
        }
    }
}

/// Host policy for a machine. The default is the bare engine: no stack
/// checks, 0xFFFF on end of input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub data_stack: Option<StackBounds>,
    pub return_stack: Option<StackBounds>,
    pub eof: u16,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            data_stack: None,
            return_stack: None,
            eof: EOF_SENTINEL,
        }
    }
}

impl MachineConfig {
    /// Stack checks sized for the standard 16K layout.
    pub fn hardened() -> Self {
        Self::hardened_for(&Registers::boot(0))
    }

    /// Stack checks based at whatever SP and RP the image boots with.
    pub fn hardened_for(boot: &Registers) -> Self {
        Self {
            data_stack: Some(StackBounds::below(boot.sp, STACK_CELLS)),
            return_stack: Some(StackBounds::below(boot.rp, STACK_CELLS)),
            ..Self::default()
        }
    }
}
