use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use abi::{Image, Machine, MachineConfig, Registers, RunOutcome, StackBounds};
use anyhow::{Context, Result};
use clap::Parser;
use console::{BufferConsole, StreamConsole};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shell-cli", about = "Boot a 16K eForth memory image on stdin/stdout")]
struct Args {
    /// Memory image to boot (exactly 16384 bytes)
    image: PathBuf,

    /// JSON machine config (stack bounds, end-of-input sentinel)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Check both stacks, 64 cells deep below the boot SP and RP
    #[arg(long)]
    hardened: bool,

    /// Give up after this many steps
    #[arg(long)]
    max_steps: Option<u64>,

    /// Value KEY pushes at end of input
    #[arg(long)]
    eof: Option<u16>,

    /// Print the final registers as JSON on stderr
    #[arg(long)]
    dump_registers: bool,

    /// Write final memory, registers included, to this path
    #[arg(long)]
    dump_image: Option<PathBuf>,

    /// List this many cells from the boot PC instead of running
    #[arg(long)]
    disassemble: Option<u16>,
}

#[derive(Serialize)]
struct Report {
    registers: Registers,
    steps: u64,
    halted: bool,
    fault: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

/// `--hardened` bases any bounds the config file leaves open at the image's
/// boot SP and RP.
fn machine_config(args: &Args, boot: &Registers) -> Result<MachineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => MachineConfig::default(),
    };
    if args.hardened {
        let hardened = MachineConfig::hardened_for(boot);
        config.data_stack = config.data_stack.or(hardened.data_stack);
        config.return_stack = config.return_stack.or(hardened.return_stack);
    }
    if let Some(eof) = args.eof {
        config.eof = eof;
    }
    Ok(config)
}

fn describe(bounds: Option<StackBounds>) -> String {
    match bounds {
        Some(b) => format!("{:#06x}..{:#06x}", b.limit, b.base),
        None => "unchecked".into(),
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let image = Image::open(&args.image)
        .with_context(|| format!("loading image {}", args.image.display()))?;
    let config = machine_config(&args, &image.registers())?;
    info!(
        boot = ?image.registers(),
        data_stack = %describe(config.data_stack),
        return_stack = %describe(config.return_stack),
        "image ready"
    );

    if let Some(cells) = args.disassemble {
        let vm = Machine::new(&image, BufferConsole::new());
        for line in vm.disassemble(vm.registers().pc, cells)? {
            println!("{line}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let console = StreamConsole::new(io::stdin().lock(), io::stdout().lock());
    let mut vm = Machine::with_config(&image, console, config);
    let outcome = match args.max_steps {
        Some(limit) => vm.run_for(limit),
        None => vm.run().map(|steps| RunOutcome::Halted { steps }),
    };

    if args.dump_registers {
        let report = Report {
            registers: vm.registers(),
            steps: vm.steps(),
            halted: vm.is_halted(),
            fault: vm.fault().map(str::to_owned),
        };
        eprintln!("{}", serde_json::to_string(&report)?);
    }
    if let Some(path) = &args.dump_image {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        vm.dump().save(BufWriter::new(file))?;
    }

    match outcome {
        Ok(RunOutcome::Halted { steps }) => {
            info!(steps, "halted");
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::Suspended { steps }) => {
            eprintln!("VM SUSPENDED after {steps} steps");
            Ok(ExitCode::from(2))
        }
        Err(err) => {
            let regs = vm.registers();
            eprintln!("VM CRASH: {err}");
            eprintln!(
                "  pc={:#06x} ip={:#06x} sp={:#06x} rp={:#06x} after {} steps",
                regs.pc,
                regs.ip,
                regs.sp,
                regs.rp,
                vm.steps()
            );
            eprintln!(
                "  data stack {}, return stack {}",
                describe(vm.config().data_stack),
                describe(vm.config().return_stack)
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("shell-cli: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["shell-cli", "mem.bin"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    fn standard_boot() -> Registers {
        Registers::boot(0x100)
    }

    #[test]
    fn default_config_is_unchecked() {
        let config = machine_config(&args(&[]), &standard_boot()).unwrap();
        assert_eq!(config, MachineConfig::default());
    }

    #[test]
    fn hardened_flag_fills_in_bounds() {
        let config = machine_config(&args(&["--hardened", "--eof", "0"]), &standard_boot()).unwrap();
        assert_eq!(config.data_stack, MachineConfig::hardened().data_stack);
        assert_eq!(config.return_stack, MachineConfig::hardened().return_stack);
        assert_eq!(config.eof, 0);
    }

    #[test]
    fn config_file_is_json() {
        let path = std::env::temp_dir().join(format!("shell-cli-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "data_stack": { "base": 4096, "limit": 4000 }, "eof": 4 }"#).unwrap();
        let config =
            machine_config(&args(&["--config", path.to_str().unwrap(), "--hardened"]), &standard_boot())
                .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.data_stack, Some(StackBounds { base: 4096, limit: 4000 }));
        assert_eq!(config.return_stack, MachineConfig::hardened().return_stack);
        assert_eq!(config.eof, 4);
    }

    #[test]
    fn hardened_flag_follows_the_image_boot_block() {
        let boot = Registers { pc: 0x100, ip: 0, sp: 0x3000, rp: 0x3800 };
        let config = machine_config(&args(&["--hardened"]), &boot).unwrap();
        assert_eq!(config.data_stack, Some(StackBounds { base: 0x3000, limit: 0x2F80 }));
        assert_eq!(config.return_stack, Some(StackBounds { base: 0x3800, limit: 0x3780 }));
    }

    #[test]
    fn describe_bounds() {
        assert_eq!(describe(None), "unchecked");
        assert_eq!(describe(Some(StackBounds { base: 0x100, limit: 0x80 })), "0x0080..0x0100");
    }
}
