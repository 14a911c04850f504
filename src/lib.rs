use wasm_bindgen::prelude::*;

use abi::{Image, ImageBuilder, Machine, MachineConfig, Opcode, RunOutcome, VmError, CELL, RPP};
use console::BufferConsole;
use thiserror::Error;

pub use abi;
pub use console;

pub const SYSTEM_STATUS: &str = r#"
================================================================================
EFORTH-VM // INDIRECT-THREADED 16-BIT CORE
================================================================================
[ ARCHITECTURE ]
16K flat image. PC/IP/SP/RP boot block. 30 primitives. KEY/EMIT byte streams.

SELF TEST SUITE:
"#;

/// Step budget for hosts that cannot block forever (a browser tab).
pub const BROWSER_STEP_BUDGET: u64 = 50_000_000;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Image(#[from] abi::ImageError),
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error("step budget exhausted after {steps} steps")]
    Suspended { steps: u64 },
}

/// Loads `image`, feeds it `input`, runs it to HALT and returns what it emitted.
pub fn run_image(
    image: &[u8],
    input: &[u8],
    config: MachineConfig,
    max_steps: Option<u64>,
) -> Result<Vec<u8>, ShellError> {
    let image = Image::from_bytes(image)?;
    let mut vm = Machine::with_config(&image, BufferConsole::with_input(input), config);
    match max_steps {
        None => {
            vm.run()?;
        }
        Some(limit) => {
            if let RunOutcome::Suspended { steps } = vm.run_for(limit)? {
                return Err(ShellError::Suspended { steps });
            }
        }
    }
    Ok(vm.into_console().into_output())
}

// --- SELF TEST SCENARIOS ---

pub struct Scenario {
    pub name: &'static str,
    pub check: fn() -> Result<(), String>,
}

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario { name: "ABI_OPCODE_MAPPING", check: check_opcode_mapping },
        Scenario { name: "EMIT_HELLO", check: check_hello },
        Scenario { name: "UM_PLUS_CARRY", check: check_um_plus },
        Scenario { name: "NEXT_COUNTED_LOOP", check: check_loop },
        Scenario { name: "DOLIST_EXIT_BALANCE", check: check_nesting },
        Scenario { name: "DECODE_FAULT", check: check_decode_fault },
    ]
}

fn run_built(b: &ImageBuilder, input: &[u8]) -> Result<Machine<BufferConsole>, String> {
    let mut vm = Machine::new(&b.build(), BufferConsole::with_input(input));
    match vm.run_for(1000).map_err(|e| e.to_string())? {
        RunOutcome::Halted { .. } => Ok(vm),
        RunOutcome::Suspended { steps } => Err(format!("no halt after {steps} steps")),
    }
}

fn check_opcode_mapping() -> Result<(), String> {
    if Opcode::Halt.code() != 0 { return Err("BYE != 0".into()); }
    if Opcode::DoList.code() != 29 { return Err("doLIST != 29".into()); }
    if Opcode::decode(30).is_some() { return Err("30 decodes".into()); }
    Ok(())
}

fn check_hello() -> Result<(), String> {
    let mut b = ImageBuilder::new();
    let p = b.primitives();
    let entry = b.colon(&[
        p[Opcode::Lit], 72, p[Opcode::Emit],
        p[Opcode::Lit], 105, p[Opcode::Emit],
        p[Opcode::Halt],
    ]);
    b.entry(entry);
    let vm = run_built(&b, b"")?;
    match vm.console().output() {
        [72, 105] => Ok(()),
        other => Err(format!("output {other:?}")),
    }
}

fn check_um_plus() -> Result<(), String> {
    let mut b = ImageBuilder::new();
    let p = b.primitives();
    let entry = b.colon(&[
        p[Opcode::Lit], 65535, p[Opcode::Lit], 2, p[Opcode::UmPlus],
        p[Opcode::Emit], p[Opcode::Emit],
        p[Opcode::Halt],
    ]);
    b.entry(entry);
    let vm = run_built(&b, b"")?;
    // carry comes off first
    match vm.console().output() {
        [1, 1] => Ok(()),
        other => Err(format!("carry/low {other:?}")),
    }
}

fn check_loop() -> Result<(), String> {
    let mut b = ImageBuilder::new();
    let p = b.primitives();
    let entry = b.begin_colon();
    b.cells(&[p[Opcode::Lit], 3, p[Opcode::ToR]]);
    let body = b.cells(&[p[Opcode::RFetch], p[Opcode::Emit]]);
    b.cells(&[p[Opcode::Loop], body, p[Opcode::Halt]]);
    b.entry(entry);
    let vm = run_built(&b, b"")?;
    if vm.console().output() != [3, 2, 1] {
        return Err(format!("counts {:?}", vm.console().output()));
    }
    if vm.registers().rp != RPP - CELL {
        return Err(format!("rp {:#06x}", vm.registers().rp));
    }
    Ok(())
}

fn check_nesting() -> Result<(), String> {
    let mut b = ImageBuilder::new();
    let p = b.primitives();
    let inner = b.colon(&[p[Opcode::Exit]]);
    let middle = b.colon(&[inner, inner, p[Opcode::Exit]]);
    let entry = b.colon(&[middle, p[Opcode::Halt]]);
    b.entry(entry);
    let vm = run_built(&b, b"")?;
    let regs = vm.registers();
    if regs.rp != RPP - CELL {
        return Err(format!("rp {:#06x}", regs.rp));
    }
    if regs.ip != entry + 3 * CELL {
        return Err(format!("ip {:#06x}", regs.ip));
    }
    Ok(())
}

fn check_decode_fault() -> Result<(), String> {
    let mut b = ImageBuilder::new();
    let bad = b.cell(30);
    b.entry(bad);
    let mut vm = Machine::new(&b.build(), BufferConsole::new());
    match vm.run() {
        Err(VmError::Decode { opcode: 30, pc }) if pc == bad && vm.steps() == 0 => Ok(()),
        other => Err(format!("{other:?}")),
    }
}

pub fn run_suite() -> String {
    let mut report = String::from(SYSTEM_STATUS);
    for scenario in scenarios() {
        report.push_str(&format!("TEST: {:<30} ... ", scenario.name));
        match (scenario.check)() {
            Ok(()) => report.push_str("PASS\n"),
            Err(e) => report.push_str(&format!("FAIL ({e})\n")),
        }
    }
    report
}

// --- BROWSER SHELL ---

#[wasm_bindgen]
pub fn init_shell() -> String {
    run_suite()
}

/// Runs a 16K image against `input` and hands back the emitted bytes.
#[wasm_bindgen]
pub fn run(image: &[u8], input: &[u8]) -> Result<Vec<u8>, JsError> {
    run_image(image, input, MachineConfig::default(), Some(BROWSER_STEP_BUDGET))
        .map_err(|e| JsError::new(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello() -> Vec<u8> {
        let mut b = ImageBuilder::new();
        let p = b.primitives();
        let entry = b.colon(&[p[Opcode::Lit], 72, p[Opcode::Emit], p[Opcode::Lit], 105, p[Opcode::Emit], p[Opcode::Halt]]);
        b.entry(entry);
        b.build().as_bytes().to_vec()
    }

    #[test]
    fn suite_passes() {
        let report = run_suite();
        assert!(!report.contains("FAIL"), "{report}");
        assert_eq!(report.matches("PASS").count(), scenarios().len());
    }

    #[test]
    fn run_image_returns_output() {
        let out = run_image(&hello(), b"", MachineConfig::default(), None).unwrap();
        assert_eq!(out, b"Hi");
    }

    #[test]
    fn run_image_rejects_short_images() {
        let err = run_image(&[0; 10], b"", MachineConfig::default(), None).unwrap_err();
        assert!(matches!(err, ShellError::Image(abi::ImageError::Short { actual: 10, .. })));
    }

    #[test]
    fn run_image_gives_up_at_the_budget() {
        let mut b = ImageBuilder::new();
        let p = b.primitives();
        let entry = b.begin_colon();
        let top = b.cell(p[Opcode::Branch]);
        b.cell(top);
        b.entry(entry);
        let err = run_image(b.build().as_bytes(), b"", MachineConfig::default(), Some(100)).unwrap_err();
        assert!(matches!(err, ShellError::Suspended { steps: 100 }));
    }
}
