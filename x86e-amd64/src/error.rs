use thiserror::Error;
use x86e_core::{ClockError, IoError};

use crate::syscalls::Kernel;

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("unsupported instruction: {0}")]
    UnsupportedInstruction(String),
    #[error("unsupported syscall {number} for kernel {kernel}")]
    UnsupportedSyscall { kernel: Kernel, number: u64 },
    #[error("{mnemonic} expects {expected} operand(s), found {found}")]
    InvalidOperandCount {
        mnemonic: String,
        expected: usize,
        found: usize,
    },
    #[error("cannot jump to invalid label: {0}")]
    InvalidLabel(String),
    #[error("unsupported addressing mode: {0}")]
    UnsupportedAddressingMode(String),
    #[error("malformed immediate: {0}")]
    MalformedImmediate(String),
    #[error("operand {0} cannot be used as a destination")]
    InvalidDestination(String),
    #[error("program has no entry point label '{0}'")]
    MissingEntryPoint(String),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Clock(#[from] ClockError),
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
