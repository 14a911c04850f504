//! Fetch-execute core of the indirect-threaded machine.
//!
//! PC addresses a code cell (a primitive number). IP walks a thread body whose
//! cells are code-cell addresses. Most primitives finish with NEXT, which
//! loads the next code address from the thread into PC.

use console::Console;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::MachineConfig;
use crate::errors::VmError;
use crate::image::Image;
use crate::isa::Opcode;
use crate::memory::Memory;
use crate::{CELL, REG_IP, REG_PC, REG_RP, REG_SP, RPP, SPP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Register {
    Pc,
    Ip,
    Sp,
    Rp,
}

impl Register {
    /// Boot block address the register is loaded from.
    pub fn addr(self) -> u16 {
        match self {
            Register::Pc => REG_PC,
            Register::Ip => REG_IP,
            Register::Sp => REG_SP,
            Register::Rp => REG_RP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    pub pc: u16,
    pub ip: u16,
    pub sp: u16,
    pub rp: u16,
}

impl Registers {
    /// Fresh registers entering at `entry` with both stacks empty.
    pub fn boot(entry: u16) -> Self {
        Self {
            pc: entry,
            ip: 0,
            sp: SPP,
            rp: RPP,
        }
    }

    pub fn get(&self, reg: Register) -> u16 {
        match reg {
            Register::Pc => self.pc,
            Register::Ip => self.ip,
            Register::Sp => self.sp,
            Register::Rp => self.rp,
        }
    }

    pub fn set(&mut self, reg: Register, value: u16) {
        match reg {
            Register::Pc => self.pc = value,
            Register::Ip => self.ip = value,
            Register::Sp => self.sp = value,
            Register::Rp => self.rp = value,
        }
    }

    pub(crate) fn from_boot_block(bytes: &[u8]) -> Self {
        let cell = |reg: Register| {
            let at = reg.addr() as usize;
            u16::from_le_bytes([bytes[at], bytes[at + 1]])
        };
        Self {
            pc: cell(Register::Pc),
            ip: cell(Register::Ip),
            sp: cell(Register::Sp),
            rp: cell(Register::Rp),
        }
    }

    pub(crate) fn write_boot_block(&self, bytes: &mut [u8]) {
        for reg in [Register::Pc, Register::Ip, Register::Sp, Register::Rp] {
            let at = reg.addr() as usize;
            bytes[at..at + 2].copy_from_slice(&self.get(reg).to_le_bytes());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMStatus {
    Running,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Halted { steps: u64 },
    /// Step budget spent; the machine can be resumed.
    Suspended { steps: u64 },
}

pub struct Machine<C: Console> {
    pub(crate) memory: Memory,
    pub(crate) regs: Registers,
    pub(crate) config: MachineConfig,
    console: C,
    halted: bool,
    fault: Option<String>,
    steps: u64,
}

impl<C: Console> Machine<C> {
    pub fn new(image: &Image, console: C) -> Self {
        Self::with_config(image, console, MachineConfig::default())
    }

    pub fn with_config(image: &Image, console: C, config: MachineConfig) -> Self {
        let regs = Registers::from_boot_block(image.as_bytes());
        debug!(?regs, ?config, "machine booted");
        Self {
            memory: Memory::from_image(image),
            regs,
            config,
            console,
            halted: false,
            fault: None,
            steps: 0,
        }
    }

    pub fn registers(&self) -> Registers {
        self.regs
    }

    pub fn set_registers(&mut self, regs: Registers) {
        self.regs = regs;
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    /// True once HALT has run. A faulted machine is not halted.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The fault that stopped the machine, if any.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Opcodes executed so far, HALT included.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Current memory as a loadable image, live registers in the boot block.
    pub fn dump(&self) -> Image {
        let mut bytes = self.memory.as_bytes().to_vec();
        self.regs.write_boot_block(&mut bytes);
        Image::from_memory(bytes)
    }

    /// One fetch-execute cycle. A fault stops the machine for good; later
    /// calls fail with [`VmError::Stopped`].
    pub fn step(&mut self) -> Result<VMStatus, VmError> {
        if let Some(fault) = &self.fault {
            return Err(VmError::Stopped {
                fault: fault.clone(),
            });
        }
        if self.halted {
            return Ok(VMStatus::Halted);
        }
        let result = self.cycle();
        if let Err(err) = &result {
            self.fault = Some(err.to_string());
            warn!(%err, pc = self.regs.pc, steps = self.steps, "machine fault");
        }
        result
    }

    fn cycle(&mut self) -> Result<VMStatus, VmError> {
        // Fetch
        let pc = self.regs.pc;
        let raw = self.memory.read_cell(pc)?;
        let op = Opcode::decode(raw).ok_or(VmError::Decode { opcode: raw, pc })?;
        self.regs.pc = pc.wrapping_add(CELL);
        self.steps += 1;
        trace!(pc, op = op.mnemonic(), ip = self.regs.ip, sp = self.regs.sp, rp = self.regs.rp, "step");

        // Execute
        self.execute(op)
    }

    /// NEXT: PC takes the code address IP points at, IP moves on.
    fn next(&mut self) -> Result<(), VmError> {
        let ip = self.regs.ip;
        self.regs.pc = self.memory.read_cell(ip)?;
        self.regs.ip = ip.wrapping_add(CELL);
        Ok(())
    }

    /// IP := the inline branch target at IP.
    fn branch(&mut self) -> Result<(), VmError> {
        self.regs.ip = self.memory.read_cell(self.regs.ip)?;
        Ok(())
    }

    fn skip_inline(&mut self) {
        self.regs.ip = self.regs.ip.wrapping_add(CELL);
    }

    fn binary(&mut self, f: impl FnOnce(u16, u16) -> u16) -> Result<(), VmError> {
        let b = self.pop(Register::Sp)?;
        let a = self.pop(Register::Sp)?;
        self.push(Register::Sp, f(a, b))
    }

    fn execute(&mut self, op: Opcode) -> Result<VMStatus, VmError> {
        match op {
            Opcode::Halt => {
                self.halted = true;
                debug!(steps = self.steps, "halt");
                return Ok(VMStatus::Halted);
            }
            Opcode::Key => {
                let c = match self.console.key()? {
                    Some(byte) => byte as u16,
                    None => self.config.eof,
                };
                self.push(Register::Sp, c)?;
            }
            Opcode::Emit => {
                let c = self.pop(Register::Sp)?;
                self.console.emit(c as u8)?;
            }
            Opcode::Lit => {
                let n = self.memory.read_cell(self.regs.ip)?;
                self.skip_inline();
                self.push(Register::Sp, n)?;
            }
            Opcode::Exit => {
                self.regs.ip = self.pop(Register::Rp)?;
            }
            Opcode::Execute => {
                self.regs.pc = self.pop(Register::Sp)?;
                return Ok(VMStatus::Running);
            }
            Opcode::Loop => {
                // Decrement first; reaching zero ends the loop.
                let count = self.peek(Register::Rp, 0)?.wrapping_sub(1);
                if count == 0 {
                    self.pop(Register::Rp)?;
                    self.skip_inline();
                } else {
                    self.replace_top(Register::Rp, count)?;
                    self.branch()?;
                }
            }
            Opcode::BranchIfZero => {
                if self.pop(Register::Sp)? == 0 {
                    self.branch()?;
                } else {
                    self.skip_inline();
                }
            }
            Opcode::Branch => self.branch()?,
            Opcode::Store => {
                let addr = self.pop(Register::Sp)?;
                let value = self.pop(Register::Sp)?;
                self.memory.write_cell(addr, value)?;
            }
            Opcode::Fetch => {
                let addr = self.pop(Register::Sp)?;
                let value = self.memory.read_cell(addr)?;
                self.push(Register::Sp, value)?;
            }
            Opcode::CStore => {
                let addr = self.pop(Register::Sp)?;
                let value = self.pop(Register::Sp)?;
                self.memory.write_byte(addr, value as u8)?;
            }
            Opcode::CFetch => {
                let addr = self.pop(Register::Sp)?;
                let value = self.memory.read_byte(addr)?;
                self.push(Register::Sp, value as u16)?;
            }
            Opcode::RpFetch => {
                let rp = self.regs.rp;
                self.push(Register::Sp, rp)?;
            }
            Opcode::RpStore => {
                self.regs.rp = self.pop(Register::Sp)?;
            }
            Opcode::RFrom => {
                let value = self.pop(Register::Rp)?;
                self.push(Register::Sp, value)?;
            }
            Opcode::RFetch => {
                let value = self.peek(Register::Rp, 0)?;
                self.push(Register::Sp, value)?;
            }
            Opcode::ToR => {
                let value = self.pop(Register::Sp)?;
                self.push(Register::Rp, value)?;
            }
            Opcode::SpFetch => {
                let sp = self.regs.sp;
                self.push(Register::Sp, sp)?;
            }
            Opcode::SpStore => {
                self.regs.sp = self.pop(Register::Sp)?;
            }
            Opcode::Drop => {
                self.pop(Register::Sp)?;
            }
            Opcode::Dup => {
                let top = self.peek(Register::Sp, 0)?;
                self.push(Register::Sp, top)?;
            }
            Opcode::Swap => {
                let b = self.pop(Register::Sp)?;
                let a = self.pop(Register::Sp)?;
                self.push(Register::Sp, b)?;
                self.push(Register::Sp, a)?;
            }
            Opcode::Over => {
                let second = self.peek(Register::Sp, 1)?;
                self.push(Register::Sp, second)?;
            }
            Opcode::ZeroLess => {
                let n = self.pop(Register::Sp)?;
                let flag = if n & 0x8000 != 0 { 0xFFFF } else { 0 };
                self.push(Register::Sp, flag)?;
            }
            Opcode::And => self.binary(|a, b| a & b)?,
            Opcode::Or => self.binary(|a, b| a | b)?,
            Opcode::Xor => self.binary(|a, b| a ^ b)?,
            Opcode::UmPlus => {
                let b = self.pop(Register::Sp)?;
                let a = self.pop(Register::Sp)?;
                let (sum, carry) = a.overflowing_add(b);
                self.push(Register::Sp, sum)?;
                self.push(Register::Sp, carry as u16)?;
            }
            Opcode::DoList => {
                // PC already points past the doLIST cell, at the body.
                let ip = self.regs.ip;
                self.push(Register::Rp, ip)?;
                self.regs.ip = self.regs.pc;
            }
        }

        self.next()?;
        Ok(VMStatus::Running)
    }

    /// Runs until HALT or a fault. Returns the total step count.
    pub fn run(&mut self) -> Result<u64, VmError> {
        match self.drive(None)? {
            RunOutcome::Halted { steps } | RunOutcome::Suspended { steps } => Ok(steps),
        }
    }

    /// Runs at most `max_steps` more cycles.
    pub fn run_for(&mut self, max_steps: u64) -> Result<RunOutcome, VmError> {
        self.drive(Some(max_steps))
    }

    fn drive(&mut self, budget: Option<u64>) -> Result<RunOutcome, VmError> {
        let mut remaining = budget;
        let outcome = loop {
            if remaining == Some(0) {
                break Ok(RunOutcome::Suspended { steps: self.steps });
            }
            match self.step() {
                Ok(VMStatus::Running) => {}
                Ok(VMStatus::Halted) => break Ok(RunOutcome::Halted { steps: self.steps }),
                Err(err) => break Err(err),
            }
            if let Some(left) = remaining.as_mut() {
                *left -= 1;
            }
        };
        // Whatever was emitted before a fault still reaches the host.
        let flushed = self.console.flush();
        let outcome = outcome?;
        flushed?;
        Ok(outcome)
    }

    /// Renders `cells` cells from `addr`, naming the ones that decode.
    pub fn disassemble(&self, addr: u16, cells: u16) -> Result<Vec<String>, VmError> {
        (0..cells)
            .map(|i| -> Result<String, VmError> {
                let at = addr.wrapping_add(i.wrapping_mul(CELL));
                let raw = self.memory.read_cell(at)?;
                Ok(match Opcode::decode(raw) {
                    Some(op) => format!("{at:#06x}: {raw:5}  {}", op.mnemonic()),
                    None => format!("{at:#06x}: {raw:5}"),
                })
            })
            .collect()
    }
}
