use colored::*;
use eforth_vm::{scenarios, Scenario};

const MANIFESTO: &str = r#"
================================================================================
EFORTH-VM // LIVING SPECIFICATION
================================================================================

[ MACHINE ]
--------------------------------------------------------------------------------
Memory      16384 bytes, cells are 16-bit little-endian, no alignment rule.
Registers   PC IP SP RP, booted from cells 0..8 of the image.
Stacks      data and return, both grow down, pointer = top cell.
Threading   PC -> code cell (primitive 0..29), IP -> thread body of code
            addresses. NEXT: PC := [IP], IP += 2.

[ DECISIONS ]
--------------------------------------------------------------------------------
EXECUTE     takes its target from the data stack, no NEXT.
next        decrements first; a count of N runs the body N times.
KEY         pushes 0xFFFF at end of input (configurable).
Faults      decode, address, stack bounds (opt-in). All of them stop the run.

================================================================================
ACCEPTANCE SUITE
================================================================================
"#;

fn main() {
    println!("{}", MANIFESTO);
    let mut passed = 0;
    let mut failed = 0;

    for scenario in scenarios() {
        run_test(&scenario, &mut passed, &mut failed);
    }

    println!("\n--------------------------------------------------------------------------------");
    println!("{} passed, {} failed", passed, failed);
    if failed == 0 {
        println!("{}", "ALL SYSTEMS NOMINAL.".green().bold());
    } else {
        std::process::exit(1);
    }
}

// --- TEST INFRASTRUCTURE ---

fn run_test(scenario: &Scenario, passed: &mut i32, failed: &mut i32) {
    print!("TEST: {:<30} ... ", scenario.name);
    match (scenario.check)() {
        Ok(_) => { println!("{}", "PASS".green()); *passed += 1; }
        Err(e) => { println!("{}", "FAIL".red()); println!("  -> {}", e); *failed += 1; }
    }
}
