use std::fmt;

use crate::operand::{Destination, Operand};
use crate::registers::Width;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Shl,
    Shr,
}

impl AluOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Shl => "shl",
            AluOp::Shr => "shr",
        }
    }

    /// Computes `lhs op rhs` at `width`. Shift counts are masked to 5 bits,
    /// or 6 bits for 64-bit operands.
    pub fn apply(self, lhs: u64, rhs: u64, width: Width) -> u64 {
        let lhs = lhs & width.mask();
        let count_mask = if width == Width::Qword { 0x3F } else { 0x1F };
        let result = match self {
            AluOp::Add => lhs.wrapping_add(rhs),
            AluOp::Sub => lhs.wrapping_sub(rhs),
            AluOp::And => lhs & rhs,
            AluOp::Or => lhs | rhs,
            AluOp::Shl => lhs << (rhs & count_mask),
            AluOp::Shr => lhs >> (rhs & count_mask),
        };
        result & width.mask()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Condition {
    /// `jz` / `je`
    Zero,
    /// `jnz` / `jne`
    NotZero,
    /// `jge`: SF == OF
    GreaterOrEqual,
}

impl Condition {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Condition::Zero => "je",
            Condition::NotZero => "jne",
            Condition::GreaterOrEqual => "jge",
        }
    }
}

/// A branch target, resolved to an instruction index when decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub index: usize,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Push { source: Operand },
    Pop { destination: Destination },
    Mov { destination: Destination, source: Operand },
    Alu { op: AluOp, destination: Destination, source: Operand },
    Cmp { lhs: Operand, rhs: Operand },
    Call { target: Label },
    Ret,
    Jmp { target: Label },
    Jcc { condition: Condition, target: Label },
    Nop,
    Syscall,
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Push { .. } => "push",
            Instruction::Pop { .. } => "pop",
            Instruction::Mov { .. } => "mov",
            Instruction::Alu { op, .. } => op.mnemonic(),
            Instruction::Cmp { .. } => "cmp",
            Instruction::Call { .. } => "call",
            Instruction::Ret => "ret",
            Instruction::Jmp { .. } => "jmp",
            Instruction::Jcc { condition, .. } => condition.mnemonic(),
            Instruction::Nop => "nop",
            Instruction::Syscall => "syscall",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            Instruction::Push { source } => write!(f, "{} {}", mnemonic, source),
            Instruction::Pop { destination } => write!(f, "{} {}", mnemonic, destination),
            Instruction::Mov {
                destination,
                source,
            }
            | Instruction::Alu {
                destination,
                source,
                ..
            } => write!(f, "{} {}, {}", mnemonic, destination, source),
            Instruction::Cmp { lhs, rhs } => write!(f, "{} {}, {}", mnemonic, lhs, rhs),
            Instruction::Call { target }
            | Instruction::Jmp { target }
            | Instruction::Jcc { target, .. } => write!(f, "{} {}", mnemonic, target),
            Instruction::Ret | Instruction::Nop | Instruction::Syscall => f.write_str(mnemonic),
        }
    }
}
