// Execution contract for the threaded 16-bit machine.
// Fixes the memory map, the boot block and the primitive set.
// Images built against these numbers run on any host that links this crate.

pub mod config;
pub mod errors;
pub mod image;
pub mod isa;
pub mod memory;
mod stack;
pub mod vm;

pub use config::{MachineConfig, StackBounds};
pub use errors::{ImageError, StackKind, VmError};
pub use image::{Image, ImageBuilder};
pub use isa::Opcode;
pub use memory::Memory;
pub use vm::{Machine, Register, Registers, RunOutcome, VMStatus};

/// Width of a cell in bytes.
pub const CELL: u16 = 2;
pub const MEMORY_SIZE: usize = 0x4000;

// Boot block: the four registers, one cell each.
pub const REG_PC: u16 = 0;
pub const REG_IP: u16 = 2;
pub const REG_SP: u16 = 4;
pub const REG_RP: u16 = 6;

/// First address a builder hands out.
pub const CODE_START: u16 = 0x100;

pub const STACK_CELLS: u16 = 64;
/// Return stack base, just under the top of memory.
pub const RPP: u16 = MEMORY_SIZE as u16 - 8 * CELL;
/// Terminal input buffer, directly below the return stack area.
pub const TIBB: u16 = RPP - STACK_CELLS * CELL;
/// Data stack base.
pub const SPP: u16 = TIBB - 8 * CELL;

/// KEY pushes this when input is exhausted (C's EOF truncated to a cell).
pub const EOF_SENTINEL: u16 = 0xFFFF;
