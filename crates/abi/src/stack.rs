//! Stack engine. Any register can serve as a stack pointer; the stack grows
//! toward lower addresses and the register holds the top cell's address.

use console::Console;

use crate::config::StackBounds;
use crate::errors::{StackKind, VmError};
use crate::vm::{Machine, Register};
use crate::CELL;

impl<C: Console> Machine<C> {
    fn bounds(&self, reg: Register) -> Option<(StackKind, StackBounds)> {
        match reg {
            Register::Sp => self.config.data_stack.map(|b| (StackKind::Data, b)),
            Register::Rp => self.config.return_stack.map(|b| (StackKind::Return, b)),
            Register::Pc | Register::Ip => None,
        }
    }

    /// Address of the cell `depth` below the top, checked against the
    /// configured extent when there is one.
    fn slot(&self, reg: Register, depth: u16) -> Result<u16, VmError> {
        let pointer = self.regs.get(reg);
        let addr = pointer.wrapping_add(depth.wrapping_mul(CELL));
        if let Some((stack, bounds)) = self.bounds(reg) {
            if pointer as u32 + depth as u32 * CELL as u32 >= bounds.base as u32 {
                return Err(VmError::StackUnderflow { stack, pointer });
            }
        }
        Ok(addr)
    }

    pub fn push(&mut self, reg: Register, value: u16) -> Result<(), VmError> {
        let pointer = self.regs.get(reg);
        if let Some((stack, bounds)) = self.bounds(reg) {
            if pointer <= bounds.limit {
                return Err(VmError::StackOverflow { stack, pointer });
            }
        }
        let top = pointer.wrapping_sub(CELL);
        self.memory.write_cell(top, value)?;
        self.regs.set(reg, top);
        Ok(())
    }

    pub fn pop(&mut self, reg: Register) -> Result<u16, VmError> {
        let top = self.slot(reg, 0)?;
        let value = self.memory.read_cell(top)?;
        self.regs.set(reg, top.wrapping_add(CELL));
        Ok(value)
    }

    /// Reads a cell without moving the pointer; depth 0 is the top.
    pub fn peek(&self, reg: Register, depth: u16) -> Result<u16, VmError> {
        let addr = self.slot(reg, depth)?;
        self.memory.read_cell(addr)
    }

    /// Overwrites the top cell in place.
    pub(crate) fn replace_top(&mut self, reg: Register, value: u16) -> Result<(), VmError> {
        let addr = self.slot(reg, 0)?;
        self.memory.write_cell(addr, value)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::MachineConfig;
    use crate::errors::{StackKind, VmError};
    use crate::image::ImageBuilder;
    use crate::vm::{Machine, Register};
    use crate::{RPP, SPP};
    use console::BufferConsole;
    use proptest::prelude::*;

    fn machine(config: MachineConfig) -> Machine<BufferConsole> {
        let image = ImageBuilder::new().build();
        Machine::with_config(&image, BufferConsole::new(), config)
    }

    proptest! {
        #[test]
        fn pops_return_pushes_in_reverse(values in proptest::collection::vec(any::<u16>(), 0..64)) {
            let mut vm = machine(MachineConfig::default());
            for &v in &values {
                vm.push(Register::Sp, v).unwrap();
            }
            let mut popped = Vec::new();
            for _ in 0..values.len() {
                popped.push(vm.pop(Register::Sp).unwrap());
            }
            popped.reverse();
            prop_assert_eq!(popped, values);
            prop_assert_eq!(vm.registers().sp, SPP);
        }
    }

    #[test]
    fn push_moves_pointer_down_one_cell() {
        let mut vm = machine(MachineConfig::default());
        vm.push(Register::Rp, 0xABCD).unwrap();
        assert_eq!(vm.registers().rp, RPP - 2);
        assert_eq!(vm.memory().read_cell(RPP - 2).unwrap(), 0xABCD);
    }

    #[test]
    fn peek_leaves_the_stack_alone() {
        let mut vm = machine(MachineConfig::default());
        vm.push(Register::Sp, 1).unwrap();
        vm.push(Register::Sp, 2).unwrap();
        assert_eq!(vm.peek(Register::Sp, 0).unwrap(), 2);
        assert_eq!(vm.peek(Register::Sp, 1).unwrap(), 1);
        assert_eq!(vm.registers().sp, SPP - 4);
    }

    #[test]
    fn unchecked_pop_reads_past_the_base() {
        let mut vm = machine(MachineConfig::default());
        assert_eq!(vm.pop(Register::Sp).unwrap(), 0);
        assert_eq!(vm.registers().sp, SPP + 2);
    }

    #[test]
    fn bounded_pop_on_empty_stack_underflows() {
        let mut vm = machine(MachineConfig::hardened());
        let err = vm.pop(Register::Sp).unwrap_err();
        assert!(matches!(
            err,
            VmError::StackUnderflow { stack: StackKind::Data, pointer } if pointer == SPP
        ));
        assert_eq!(vm.registers().sp, SPP);
    }

    #[test]
    fn bounded_peek_below_depth_underflows() {
        let mut vm = machine(MachineConfig::hardened());
        vm.push(Register::Sp, 5).unwrap();
        assert_eq!(vm.peek(Register::Sp, 0).unwrap(), 5);
        assert!(matches!(
            vm.peek(Register::Sp, 1),
            Err(VmError::StackUnderflow { .. })
        ));
    }

    #[test]
    fn bounded_push_past_limit_overflows() {
        let mut vm = machine(MachineConfig::hardened());
        for n in 0..crate::STACK_CELLS {
            vm.push(Register::Rp, n).unwrap();
        }
        let err = vm.push(Register::Rp, 99).unwrap_err();
        assert!(matches!(
            err,
            VmError::StackOverflow { stack: StackKind::Return, .. }
        ));
    }
}
