use std::fmt;

use x86e_core::{CpuComponent, IoSinks, Memory};

use crate::error::Result;
use crate::instructions::{AluOp, Condition, Instruction};
use crate::operand::Location;
use crate::registers::{RegisterFile, RegisterId, Width};
use crate::syscalls::{self, Kernel};

/// The architectural state of the virtual CPU.
#[derive(Debug)]
pub struct CpuState {
    pub registers: RegisterFile,
    pub memory: Memory,
    pub kernel: Kernel,
    /// Set only by the exit syscall.
    pub done: bool,
    pub exit_code: Option<i64>,
}

impl CpuState {
    /// `rsp` starts at `memory_size`, the top of the store.
    pub fn new(kernel: Kernel, memory_size: u64) -> Self {
        let mut registers = RegisterFile::new();
        registers.set(RegisterId::Rsp, memory_size);
        CpuState {
            registers,
            memory: Memory::new(memory_size),
            kernel,
            done: false,
            exit_code: None,
        }
    }

    pub fn instruction_pointer(&self) -> usize {
        self.registers.get(RegisterId::Rip) as usize
    }

    pub fn set_instruction_pointer(&mut self, index: usize) {
        self.registers.set(RegisterId::Rip, index as u64);
    }

    fn advance(&mut self) {
        let next = self.registers.get(RegisterId::Rip).wrapping_add(1);
        self.registers.set(RegisterId::Rip, next);
    }

    // A write to `rip` is a branch; anything else falls through.
    fn retire(&mut self, written: Location) {
        if !written.is_instruction_pointer() {
            self.advance();
        }
    }

    fn set_flags(&mut self, result: u64, width: Width) {
        let result = result & width.mask();
        self.registers.set_flag(RegisterId::Zf, result == 0);
        self.registers
            .set_flag(RegisterId::Sf, result & width.sign_bit() != 0);
        self.registers.set_flag(RegisterId::Of, false);
    }

    fn condition_holds(&self, condition: Condition) -> bool {
        match condition {
            Condition::Zero => self.registers.flag(RegisterId::Zf),
            Condition::NotZero => !self.registers.flag(RegisterId::Zf),
            Condition::GreaterOrEqual => {
                self.registers.flag(RegisterId::Sf) == self.registers.flag(RegisterId::Of)
            }
        }
    }
}

/// Executes a decoded amd64 instruction stream against a [`CpuState`].
pub struct Amd64Cpu {
    state: CpuState,
    program: Vec<Instruction>,
    io: IoSinks,
    trace_instructions: bool,
}

impl fmt::Debug for Amd64Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Amd64Cpu")
            .field("rip", &self.state.instruction_pointer())
            .field("instructions", &self.program.len())
            .field("done", &self.state.done)
            .finish()
    }
}

impl CpuComponent for Amd64Cpu {
    type Error = crate::error::EmulatorError;

    fn halted(&self) -> bool {
        self.state.done || self.state.instruction_pointer() >= self.program.len()
    }

    fn execute_step(&mut self) -> Result<()> {
        let ip = self.state.instruction_pointer();
        let Some(instruction) = self.program.get(ip) else {
            return Ok(());
        };
        if self.trace_instructions {
            tracing::info!(target: "x86e::trace", "instruction: {}", instruction);
        }
        tracing::trace!("rip {} | {:?}", ip, instruction);
        execute(&mut self.state, &mut self.io, instruction, ip)
    }
}

impl Amd64Cpu {
    pub fn new(
        program: Vec<Instruction>,
        state: CpuState,
        io: IoSinks,
        trace_instructions: bool,
    ) -> Self {
        Amd64Cpu {
            state,
            program,
            io,
            trace_instructions,
        }
    }

    pub fn state(&self) -> &CpuState {
        &self.state
    }

    pub fn program(&self) -> &[Instruction] {
        &self.program
    }

    pub fn current_instruction(&self) -> Option<&Instruction> {
        self.program.get(self.state.instruction_pointer())
    }

    pub fn register(&self, id: RegisterId) -> u64 {
        self.state.registers.get(id)
    }
}

// Sources and destinations are resolved before anything is written.
fn execute(
    state: &mut CpuState,
    io: &mut IoSinks,
    instruction: &Instruction,
    ip: usize,
) -> Result<()> {
    match instruction {
        Instruction::Push { source } => {
            let value = source.value(state);
            state.push(value);
            state.advance();
        }
        Instruction::Pop { destination } => {
            let location = destination.locate(state);
            let value = state.pop();
            location.write(state, value);
            state.retire(location);
        }
        Instruction::Mov {
            destination,
            source,
        } => {
            let value = source.value(state);
            let location = destination.locate(state);
            location.write(state, value);
            state.retire(location);
        }
        Instruction::Alu {
            op,
            destination,
            source,
        } => {
            let rhs = source.value(state);
            let location = destination.locate(state);
            let width = location.width();
            let result = op.apply(location.read(state), rhs, width);
            location.write(state, result);
            state.set_flags(result, width);
            state.retire(location);
        }
        Instruction::Cmp { lhs, rhs } => {
            let width = lhs.width();
            let result = AluOp::Sub.apply(lhs.value(state), rhs.value(state), width);
            state.set_flags(result, width);
            state.advance();
        }
        Instruction::Call { target } => {
            state.push(ip as u64 + 1);
            state.set_instruction_pointer(target.index);
        }
        Instruction::Ret => {
            let return_address = state.pop();
            state.registers.set(RegisterId::Rip, return_address);
        }
        Instruction::Jmp { target } => state.set_instruction_pointer(target.index),
        Instruction::Jcc { condition, target } => {
            if state.condition_holds(*condition) {
                state.set_instruction_pointer(target.index);
            } else {
                state.advance();
            }
        }
        Instruction::Nop => state.advance(),
        Instruction::Syscall => {
            syscalls::dispatch(state, io)?;
            state.advance();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use x86e_core::{Cpu, SharedBuffer};

    use super::*;
    use crate::assembler::Program;
    use crate::decoder::decode_program;
    use crate::error::EmulatorError;
    use crate::registers::RegisterRef;

    fn load(source: &str, io: IoSinks) -> Cpu<Amd64Cpu> {
        let program = decode_program(&Program::parse(source)).unwrap();
        let state = CpuState::new(Kernel::LinuxAmd64, 1023);
        Cpu::new(Amd64Cpu::new(program, state, io, false))
    }

    fn run(source: &str) -> Cpu<Amd64Cpu> {
        let mut cpu = load(source, IoSinks::new());
        while cpu.step().unwrap() {}
        cpu
    }

    fn reg(cpu: &Cpu<Amd64Cpu>, name: &str) -> u64 {
        let reg = RegisterRef::lookup(name).unwrap();
        cpu.inner().state().registers.read(reg)
    }

    #[test]
    fn mov_masks_to_register_width() {
        for (name, value, expected) in [
            ("rax", "0x1122334455667788", 0x1122_3344_5566_7788),
            ("eax", "0x100000001", 0x1),
            ("ax", "0x12345", 0x2345),
            ("al", "0x1ff", 0xff),
            ("r9d", "-1", 0xFFFF_FFFF),
        ] {
            let cpu = run(&format!("mov {}, {}", name, value));
            assert_eq!(reg(&cpu, name), expected, "{}", name);
        }
    }

    #[test]
    fn sub_width_write_clears_upper_bits() {
        let cpu = run("mov rax, -1\nmov eax, 0x100000001");
        assert_eq!(reg(&cpu, "eax"), 1);
        assert_eq!(reg(&cpu, "rax"), 1);
    }

    #[test]
    fn push_pop_round_trips_through_stack() {
        let cpu = run("mov rbx, 0x1234567890\npush rbx\npop ecx");
        assert_eq!(reg(&cpu, "rcx"), 0x3456_7890);
        assert_eq!(reg(&cpu, "rsp"), 1023);
    }

    #[test]
    fn call_pushes_return_index_and_ret_resumes() {
        let cpu = run("call f\nmov rbx, 2\njmp end\nf:\nmov rax, 1\nret\nend:\nnop");
        assert_eq!(reg(&cpu, "rax"), 1);
        assert_eq!(reg(&cpu, "rbx"), 2);
        assert_eq!(reg(&cpu, "rsp"), 1023);
        assert_eq!(cpu.inner().state().memory.read_le(1015, 8), 1);
    }

    #[test]
    fn cmp_drives_conditional_jumps() {
        let cpu = run("cmp 5, 5\nje taken\nmov rax, 99\ntaken:\nmov rbx, 1");
        assert_eq!(reg(&cpu, "rax"), 0);
        assert_eq!(reg(&cpu, "rbx"), 1);
        assert_eq!(reg(&cpu, "zf"), 1);

        let cpu = run("cmp 5, 6\njne taken\nmov rax, 99\ntaken:\nmov rbx, 1");
        assert_eq!(reg(&cpu, "rax"), 0);
        assert_eq!(reg(&cpu, "zf"), 0);
        assert_eq!(reg(&cpu, "sf"), 1);
    }

    #[test]
    fn jge_follows_sign_flag() {
        let cpu = run("mov eax, 3\ncmp eax, 2\njge ok\nmov rbx, 99\nok:\nnop");
        assert_eq!(reg(&cpu, "rbx"), 0);

        let cpu = run("mov eax, 1\ncmp eax, 2\njge ok\nmov rbx, 99\nok:\nnop");
        assert_eq!(reg(&cpu, "rbx"), 99);
    }

    #[test]
    fn flags_use_destination_width() {
        let cpu = run("mov eax, 0x7fffffff\nadd eax, 1");
        assert_eq!(reg(&cpu, "rax"), 0x8000_0000);
        assert_eq!(reg(&cpu, "sf"), 1);
        assert_eq!(reg(&cpu, "of"), 0);

        let cpu = run("mov eax, 0xffffffff\nadd eax, 1");
        assert_eq!(reg(&cpu, "rax"), 0);
        assert_eq!(reg(&cpu, "zf"), 1);
    }

    #[test]
    fn bitwise_and_shifts() {
        let cpu = run("mov rax, 0b1100\nand rax, 0b1010\nmov rbx, 1\nshl rbx, 4\nor rbx, 1\nmov rcx, 0x80\nshr rcx, 7");
        assert_eq!(reg(&cpu, "rax"), 0b1000);
        assert_eq!(reg(&cpu, "rbx"), 0x11);
        assert_eq!(reg(&cpu, "rcx"), 1);
    }

    #[test]
    fn arithmetic_on_memory_destination() {
        let cpu = run("mov rbp, 100\nmov dword ptr [rbp - 4], 40\nadd dword ptr [rbp - 4], 2\nmov eax, dword ptr [rbp - 4]");
        assert_eq!(reg(&cpu, "rax"), 42);
        assert_eq!(cpu.inner().state().memory.read_le(96, 4), 42);
    }

    #[test]
    fn write_syscall_reaches_sink() {
        let out = SharedBuffer::new();
        let io = IoSinks::new().with_descriptor(1, out.clone());
        let mut cpu = load(
            "mov rbp, 200\nmov byte ptr [rbp - 2], 104\nmov byte ptr [rbp - 1], 105\nmov rax, 1\nmov rdi, 1\nmov rsi, 198\nmov rdx, 2\nsyscall",
            io,
        );
        while cpu.step().unwrap() {}
        assert_eq!(out.contents(), b"hi");
    }

    #[test]
    fn exit_syscall_halts() {
        let cpu = run("mov rax, 60\nmov rdi, 6\nsyscall\nmov rbx, 1");
        assert!(cpu.inner().halted());
        assert_eq!(cpu.inner().state().exit_code, Some(6));
        assert_eq!(reg(&cpu, "rbx"), 0);
        assert_eq!(cpu.steps(), 3);
    }

    #[test]
    fn unmapped_syscall_aborts_before_advancing() {
        let mut cpu = load("mov rax, 999\nsyscall", IoSinks::new());
        assert!(cpu.step().unwrap());
        let err = cpu.step().unwrap_err();
        assert!(matches!(err, EmulatorError::UnsupportedSyscall { number: 999, .. }));
        assert_eq!(cpu.inner().state().instruction_pointer(), 1);
    }

    #[test]
    fn writes_to_rip_branch_instead_of_advancing() {
        let cpu = run("mov rip, 2\nmov rax, 9\nmov rbx, 1");
        assert_eq!(reg(&cpu, "rax"), 0);
        assert_eq!(reg(&cpu, "rbx"), 1);
        assert_eq!(cpu.steps(), 2);
    }

    #[test]
    fn out_of_range_rip_halts_cleanly() {
        for source in [
            "mov rip, -1\nnop",
            "push -1\npop rip\nnop",
            "add rip, -1\nnop",
        ] {
            let mut cpu = load(source, IoSinks::new());
            while cpu.step().unwrap() {}
            assert!(cpu.inner().halted(), "{}", source);
            assert_eq!(reg(&cpu, "rip"), u64::MAX, "{}", source);
            assert!(cpu.inner().current_instruction().is_none());
        }
    }

    #[test]
    fn running_past_the_end_halts() {
        let mut cpu = load("nop\nnop", IoSinks::new());
        assert!(cpu.step().unwrap());
        assert!(cpu.step().unwrap());
        assert!(!cpu.step().unwrap());
        assert!(cpu.inner().current_instruction().is_none());
    }
}
