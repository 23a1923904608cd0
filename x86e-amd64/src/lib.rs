pub mod assembler;
pub mod bootstrap;
pub mod config;
pub mod cpu;
pub mod decoder;
pub mod error;
pub mod instructions;
pub mod machine;
pub mod operand;
pub mod registers;
pub mod syscalls;

mod stack;

pub use crate::assembler::Program;
pub use crate::bootstrap::{start_stub, with_entry_point};
pub use crate::config::MachineConfig;
pub use crate::cpu::{Amd64Cpu, CpuState};
pub use crate::error::{EmulatorError, Result};
pub use crate::instructions::Instruction;
pub use crate::machine::{Amd64Machine, RunSummary};
pub use crate::registers::{RegisterFile, RegisterId, RegisterRef, Width};
pub use crate::syscalls::Kernel;
