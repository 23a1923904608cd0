use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter};
use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_flame::{FlameLayer, FlushGuard};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use x86e_amd64::config::DEFAULT_MEMORY_SIZE;
use x86e_amd64::{
    with_entry_point, Amd64Cpu, Amd64Machine, Kernel, MachineConfig, RegisterId, RunSummary,
};
use x86e_core::{FreeRunningClock, GatedClock, IoSinks, Observer, OscillatorClock};

#[derive(Debug, Parser)]
#[command(about = "Runs x86-64 assembly (Intel syntax) on a virtual CPU")]
struct Args {
    /// Assembly source file.
    program: PathBuf,

    /// Syscall ABI to emulate (linux or darwin).
    #[arg(long, default_value = "linux")]
    kernel: Kernel,

    /// Log every instruction as it executes.
    #[arg(long)]
    debug_instructions: bool,

    /// Execute at most this many instructions per second.
    #[arg(long, conflicts_with = "step")]
    frequency: Option<u64>,

    /// Execute one instruction per Enter key press, printing registers after each.
    #[arg(long)]
    step: bool,

    /// Size of the memory store; also the initial stack pointer.
    #[arg(long, default_value_t = DEFAULT_MEMORY_SIZE)]
    memory_size: u64,

    /// Write folded tracing spans to this file for flamegraph generation.
    #[arg(long)]
    flame: Option<PathBuf>,
}

type FlameGuard = FlushGuard<BufWriter<File>>;

const STACK_DUMP_BYTES: usize = 16;

fn init_tracing(args: &Args) -> Result<Option<FlameGuard>> {
    let default_level = if args.debug_instructions { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_format = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let (flame_layer, guard) = match &args.flame {
        Some(path) => {
            let (layer, guard) = FlameLayer::with_file(path).map_err(|e| anyhow!("{e}"))?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_format)
        .with(flame_layer)
        .init();
    Ok(guard)
}

fn print_registers(cpu: &Amd64Cpu) {
    let regs = &cpu.state().registers;
    let line = [
        RegisterId::Rip,
        RegisterId::Rax,
        RegisterId::Rbx,
        RegisterId::Rcx,
        RegisterId::Rdx,
        RegisterId::Rsi,
        RegisterId::Rdi,
        RegisterId::Rbp,
        RegisterId::Rsp,
    ]
    .iter()
    .map(|id| format!("{}=0x{:X}", id, regs.get(*id)))
    .collect::<Vec<_>>()
    .join(" ");
    eprintln!(
        "{} zf={} sf={}",
        line,
        regs.get(RegisterId::Zf),
        regs.get(RegisterId::Sf)
    );
    let state = cpu.state();
    let sp = regs.get(RegisterId::Rsp);
    let top = state
        .memory
        .read(sp, STACK_DUMP_BYTES)
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(" ");
    eprintln!("stack @0x{:X}: {}", sp, top);
    match cpu.current_instruction() {
        Some(next) => eprintln!("next: {}", next),
        None => eprintln!("next: <end of program>"),
    }
}

async fn run_stepped(machine: &mut Amd64Machine) -> Result<RunSummary> {
    let (mut clock, handle) = GatedClock::create();
    // A plain thread so a failed run never waits on a pending stdin read at shutdown.
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if line.is_err() || handle.step().is_err() {
                break;
            }
        }
        handle.cancel();
    });

    print_registers(machine.cpu());
    let mut print_state = |cpu: &Amd64Cpu| print_registers(cpu);
    let observer: &mut Observer<'_, Amd64Cpu> = &mut print_state;
    Ok(machine.run(&mut clock, Some(observer)).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let flame_guard = init_tracing(&args)?;

    tracing::info!("loading program {}", args.program.display());
    let source = fs::read_to_string(&args.program)
        .with_context(|| format!("failed to read {}", args.program.display()))?;
    let source = with_entry_point(&source, args.kernel)?;

    let config = MachineConfig::default()
        .with_kernel(args.kernel)
        .with_trace_instructions(args.debug_instructions)
        .with_memory_size(args.memory_size);
    let mut machine = Amd64Machine::new(&source, config, IoSinks::stdio())?;

    let summary = if args.step {
        run_stepped(&mut machine).await?
    } else if let Some(hz) = args.frequency {
        let mut clock = OscillatorClock::new(hz);
        tracing::info!("pacing at {} instruction(s) per second", clock.frequency_hz());
        machine.run(&mut clock, None).await?
    } else {
        machine.run(&mut FreeRunningClock::new(), None).await?
    };

    let code = summary
        .exit_code
        .unwrap_or(machine.cpu().register(RegisterId::Rax) as i64);
    if let Some(guard) = flame_guard {
        guard.flush().map_err(|e| anyhow!("{e}"))?;
    }
    std::process::exit(code as i32);
}
