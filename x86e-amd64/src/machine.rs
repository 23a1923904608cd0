use x86e_core::{Clock, Cpu, IoSinks, Observer};

use crate::assembler::Program;
use crate::config::MachineConfig;
use crate::cpu::{Amd64Cpu, CpuState};
use crate::decoder::decode_program;
use crate::error::{EmulatorError, Result};
use crate::registers::RegisterId;

/// Outcome of a completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: u64,
    /// `None` when execution ran past the last instruction.
    pub exit_code: Option<i64>,
}

#[derive(Debug)]
pub struct Amd64Machine {
    config: MachineConfig,
    program: Program,
    cpu: Cpu<Amd64Cpu>,
}

impl Amd64Machine {
    /// Parses and decodes `source`, then points `rip` at the entry label.
    pub fn new(source: &str, config: MachineConfig, io: IoSinks) -> Result<Amd64Machine> {
        let program = Program::parse(source);
        let instructions = decode_program(&program)?;
        let entry = program.label(&config.entry_label).ok_or_else(|| {
            tracing::error!("no '{}' label in program", config.entry_label);
            EmulatorError::MissingEntryPoint(config.entry_label.clone())
        })?;

        let mut state = CpuState::new(config.kernel, config.memory_size);
        state.set_instruction_pointer(entry);

        tracing::info!(
            "created {} machine: {} instruction(s), entry '{}' at {}",
            config.kernel,
            instructions.len(),
            config.entry_label,
            entry
        );
        let cpu = Amd64Cpu::new(instructions, state, io, config.trace_instructions);
        Ok(Amd64Machine {
            config,
            program,
            cpu: Cpu::new(cpu),
        })
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn cpu(&self) -> &Amd64Cpu {
        self.cpu.inner()
    }

    pub fn steps(&self) -> u64 {
        self.cpu.steps()
    }

    /// Executes one instruction without a clock. Returns `false` once halted.
    pub fn step(&mut self) -> Result<bool> {
        self.cpu.step()
    }

    /// Runs to completion, taking one permit from `clock` per instruction.
    pub async fn run(
        &mut self,
        clock: &mut dyn Clock,
        observer: Option<&mut Observer<'_, Amd64Cpu>>,
    ) -> Result<RunSummary> {
        let steps = self.cpu.run(clock, observer).await?;
        let summary = self.summary(steps);
        tracing::info!(
            "run finished after {} step(s), exit code {:?}, rax 0x{:X}, {} memory cell(s) written",
            summary.steps,
            summary.exit_code,
            self.cpu().register(RegisterId::Rax),
            self.cpu().state().memory.touched()
        );
        Ok(summary)
    }

    fn summary(&self, steps: u64) -> RunSummary {
        RunSummary {
            steps,
            exit_code: self.cpu().state().exit_code,
        }
    }
}
