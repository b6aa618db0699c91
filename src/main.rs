use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_derive::Parser;
use log::{error, info, warn};

use realmode86::error::EmulationError;
use realmode86::host::{keyboard, Terminal};
use realmode86::vm::runtime::{Runtime, RuntimeOptions};

/// Instructions executed between screen refreshes and keyboard polls.
const BATCH: u64 = 10_000;

#[derive(Parser, Debug)]
#[command(name = "realmode86", about = "Real-mode 8086 emulator")]
struct CLI {
    /// Boot sector, flat binary or DOS .COM image
    image: PathBuf,
    /// Load a flat binary at this linear address (hex) and start there
    #[arg(long, value_parser = parse_hex)]
    load_addr: Option<usize>,
    /// Treat the image as a DOS .COM program (implied by a .com extension)
    #[arg(long)]
    com: bool,
    /// Log every instruction at trace level
    #[arg(long)]
    trace: bool,
    /// Stop after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,
    /// Run without the terminal UI and print the screen at the end
    #[arg(long)]
    headless: bool,
    /// Keystrokes to place in the keyboard buffer before starting
    #[arg(long)]
    keys: Option<String>,
}

fn parse_hex(value: &str) -> Result<usize, String> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    usize::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address '{}': {}", value, e))
}

fn load(vm: &mut Runtime, args: &CLI) -> Result<(), EmulationError> {
    let is_com = args.com
        || args
            .image
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("com"));

    if is_com {
        vm.load_com(&args.image)?;
    } else if let Some(addr) = args.load_addr {
        vm.load_binary(&args.image, addr)?;
        vm.cpu.registers.cs.set((addr >> 4) as u16);
        vm.cpu.registers.ip.set((addr & 0x0F) as u16);
    } else {
        vm.load_boot_sector(&args.image)?;
    }
    Ok(())
}

/// Runs up to `budget` instructions. Returns `false` once the CPU stopped.
fn run_batch(vm: &mut Runtime, budget: u64) -> Result<bool, EmulationError> {
    for _ in 0..budget {
        match vm.step() {
            Ok(()) => {}
            Err(EmulationError::Halt) => return Ok(false),
            Err(e) => return Err(e),
        }
        if vm.is_halted() {
            return Ok(false);
        }
    }
    Ok(true)
}

fn run(vm: &mut Runtime, args: &CLI) -> Result<(), Box<dyn Error>> {
    let mut terminal = if args.headless { None } else { Some(Terminal::enter()?) };
    let mut executed = 0u64;

    loop {
        let budget = match args.max_steps {
            Some(limit) if executed >= limit => {
                warn!("Instruction limit of {} reached", limit);
                break;
            }
            Some(limit) => (limit - executed).min(BATCH),
            None => BATCH,
        };
        executed += budget;

        let running = run_batch(vm, budget);
        if let Some(terminal) = terminal.as_mut() {
            terminal.render(vm)?;
            if !terminal.pump_keys(vm)? {
                info!("Interrupted by user");
                break;
            }
        }
        if !running? {
            break;
        }
    }

    drop(terminal);
    println!("{}", vm.screen_text());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = CLI::parse();

    let mut vm = Runtime::new(RuntimeOptions { trace: args.trace });
    if let Err(e) = load(&mut vm, &args) {
        error!("{}", e);
        return ExitCode::from(2);
    }

    for c in args.keys.as_deref().unwrap_or_default().chars() {
        match keyboard::char_to_key(c) {
            Some((scancode, ascii)) => {
                if !vm.inject_key(scancode, ascii) {
                    warn!("Keyboard buffer full, dropping {:?}", c);
                }
            }
            None => warn!("No scancode for {:?}", c),
        }
    }

    if let Err(e) = run(&mut vm, &args) {
        error!("{}", e);
        error!("{:?}", vm);
        return ExitCode::FAILURE;
    }
    ExitCode::from(vm.exit_status.unwrap_or(0))
}
