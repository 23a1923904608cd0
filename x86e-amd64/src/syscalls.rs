use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use x86e_core::{IoError, IoSinks};

use crate::cpu::CpuState;
use crate::error::{EmulatorError, Result};
use crate::registers::RegisterId;

/// Which operating system's syscall ABI is emulated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Kernel {
    #[default]
    LinuxAmd64,
    DarwinAmd64,
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kernel::LinuxAmd64 => f.write_str("LINUX_AMD64"),
            Kernel::DarwinAmd64 => f.write_str("DARWIN_AMD64"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid kernel '{0}', expected one of: linux, darwin")]
pub struct ParseKernelError(String);

impl FromStr for Kernel {
    type Err = ParseKernelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" | "linux_amd64" => Ok(Kernel::LinuxAmd64),
            "darwin" | "darwin_amd64" => Ok(Kernel::DarwinAmd64),
            _ => Err(ParseKernelError(String::from(s))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Syscall {
    Write,
    Exit,
}

impl Kernel {
    pub fn number(self, syscall: Syscall) -> u64 {
        let (linux, darwin) = syscall.numbers();
        match self {
            Kernel::LinuxAmd64 => linux,
            Kernel::DarwinAmd64 => darwin,
        }
    }

    pub fn lookup(self, number: u64) -> Option<Syscall> {
        Syscall::ALL
            .into_iter()
            .find(|syscall| self.number(*syscall) == number)
    }
}

impl Syscall {
    pub const ALL: [Syscall; 2] = [Syscall::Write, Syscall::Exit];

    // (linux, darwin)
    const fn numbers(self) -> (u64, u64) {
        match self {
            Syscall::Write => (1, 4),
            Syscall::Exit => (60, 1),
        }
    }

    fn invoke(self, state: &mut CpuState, io: &mut IoSinks) -> Result<()> {
        match self {
            Syscall::Write => sys_write(state, io),
            Syscall::Exit => sys_exit(state, io),
        }
    }
}

/// Dispatches on `rax` using the state's kernel table.
pub fn dispatch(state: &mut CpuState, io: &mut IoSinks) -> Result<()> {
    let number = state.registers.get(RegisterId::Rax);
    let syscall = state
        .kernel
        .lookup(number)
        .ok_or(EmulatorError::UnsupportedSyscall {
            kernel: state.kernel,
            number,
        })?;
    tracing::debug!("syscall {:?} ({}) on {}", syscall, number, state.kernel);
    syscall.invoke(state, io)
}

// write(fd = rdi, buf = rsi, len = rdx), one byte at a time.
fn sys_write(state: &mut CpuState, io: &mut IoSinks) -> Result<()> {
    let fd = state.registers.get(RegisterId::Rdi);
    let buf = state.registers.get(RegisterId::Rsi);
    let len = state.registers.get(RegisterId::Rdx);

    if !io.is_open(fd) {
        return Err(IoError::UnknownDescriptor(fd).into());
    }
    for i in 0..len {
        let byte = state.memory.read_u8(buf.wrapping_add(i));
        io.write_byte(fd, byte)?;
    }
    io.flush(fd)?;
    Ok(())
}

// exit(code = rdi)
fn sys_exit(state: &mut CpuState, io: &mut IoSinks) -> Result<()> {
    let code = state.registers.get(RegisterId::Rdi) as i64;
    state.done = true;
    state.exit_code = Some(code);
    tracing::info!("exit syscall with code {}", code);
    io.exit(code);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use x86e_core::SharedBuffer;

    use super::*;

    fn state(kernel: Kernel) -> CpuState {
        CpuState::new(kernel, 1024)
    }

    #[test]
    fn tables_match_each_kernel() {
        assert_eq!(Kernel::LinuxAmd64.number(Syscall::Write), 1);
        assert_eq!(Kernel::LinuxAmd64.number(Syscall::Exit), 60);
        assert_eq!(Kernel::DarwinAmd64.number(Syscall::Write), 4);
        assert_eq!(Kernel::DarwinAmd64.number(Syscall::Exit), 1);

        assert_eq!(Kernel::LinuxAmd64.lookup(1), Some(Syscall::Write));
        assert_eq!(Kernel::DarwinAmd64.lookup(1), Some(Syscall::Exit));
        assert_eq!(Kernel::LinuxAmd64.lookup(4), None);
    }

    #[test]
    fn kernel_from_str() {
        assert_eq!("linux".parse::<Kernel>(), Ok(Kernel::LinuxAmd64));
        assert_eq!("Darwin".parse::<Kernel>(), Ok(Kernel::DarwinAmd64));
        assert_eq!("DARWIN_AMD64".parse::<Kernel>(), Ok(Kernel::DarwinAmd64));
        assert!("windows".parse::<Kernel>().is_err());
    }

    #[test]
    fn write_forwards_bytes_to_descriptor() {
        let out = SharedBuffer::new();
        let mut io = IoSinks::new().with_descriptor(1, out.clone());
        let mut state = state(Kernel::LinuxAmd64);
        state.memory.write(200, b"hi");
        state.registers.set(RegisterId::Rax, 1);
        state.registers.set(RegisterId::Rdi, 1);
        state.registers.set(RegisterId::Rsi, 200);
        state.registers.set(RegisterId::Rdx, 2);

        dispatch(&mut state, &mut io).unwrap();
        assert_eq!(out.contents(), b"hi");
        assert!(!state.done);
    }

    #[test]
    fn write_to_closed_descriptor_fails() {
        let mut io = IoSinks::new();
        let mut state = state(Kernel::DarwinAmd64);
        state.registers.set(RegisterId::Rax, 4);
        state.registers.set(RegisterId::Rdi, 9);
        let err = dispatch(&mut state, &mut io).unwrap_err();
        assert!(matches!(err, EmulatorError::Io(IoError::UnknownDescriptor(9))));
    }

    #[test]
    fn exit_sets_done_and_calls_handler() {
        for (kernel, number) in [(Kernel::LinuxAmd64, 60), (Kernel::DarwinAmd64, 1)] {
            let seen = Arc::new(Mutex::new(None));
            let seen_in_handler = seen.clone();
            let mut io = IoSinks::new().on_exit(move |code| {
                *seen_in_handler.lock().unwrap() = Some(code);
            });
            let mut state = state(kernel);
            state.registers.set(RegisterId::Rax, number);
            state.registers.set(RegisterId::Rdi, 6);

            dispatch(&mut state, &mut io).unwrap();
            assert!(state.done);
            assert_eq!(state.exit_code, Some(6));
            assert_eq!(*seen.lock().unwrap(), Some(6));
        }
    }

    #[test]
    fn unmapped_number_is_fatal() {
        let mut io = IoSinks::new();
        let mut state = state(Kernel::LinuxAmd64);
        state.registers.set(RegisterId::Rax, 4);
        let err = dispatch(&mut state, &mut io).unwrap_err();
        assert!(matches!(
            err,
            EmulatorError::UnsupportedSyscall {
                kernel: Kernel::LinuxAmd64,
                number: 4
            }
        ));
        assert!(!state.done);
    }
}
