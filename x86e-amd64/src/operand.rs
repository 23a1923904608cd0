use std::fmt;

use crate::cpu::CpuState;
use crate::error::{EmulatorError, Result};
use crate::registers::{RegisterId, RegisterRef, Width};

/// `<width> ptr [base - offset]`; the only addressing form supported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryOperand {
    pub width: Width,
    pub base: Box<Operand>,
    pub offset: Box<Operand>,
}

impl MemoryOperand {
    pub fn address(&self, state: &CpuState) -> u64 {
        self.base.value(state).wrapping_sub(self.offset.value(state))
    }
}

impl fmt::Display for MemoryOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ptr [{} - {}]",
            self.width.keyword(),
            self.base,
            self.offset
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(RegisterRef),
    Memory(MemoryOperand),
    Immediate(i64),
}

impl Operand {
    /// Decodes operand text. Forms are tried in order: register (full width,
    /// then sub-width alias), memory reference, immediate.
    pub fn parse(text: &str) -> Result<Operand> {
        let lowered = text.trim().to_lowercase();

        if let Some(reg) = RegisterRef::lookup(&lowered) {
            return Ok(Operand::Register(reg));
        }

        if let Some(memory) = parse_memory(&lowered)? {
            return Ok(Operand::Memory(memory));
        }

        if lowered.contains('[') {
            return Err(EmulatorError::UnsupportedAddressingMode(text.trim().to_string()));
        }

        parse_immediate(&lowered).map(Operand::Immediate)
    }

    /// Reads the operand as an r-value: register views are masked to their
    /// width, memory is read little-endian at the operand's width.
    pub fn value(&self, state: &CpuState) -> u64 {
        match self {
            Operand::Register(reg) => state.registers.read(*reg),
            Operand::Memory(mem) => state.memory.read_le(mem.address(state), mem.width.bytes()),
            Operand::Immediate(value) => *value as u64,
        }
    }

    pub fn width(&self) -> Width {
        match self {
            Operand::Register(reg) => reg.width,
            Operand::Memory(mem) => mem.width,
            Operand::Immediate(_) => Width::Qword,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(reg) => write!(f, "{}", reg),
            Operand::Memory(mem) => write!(f, "{}", mem),
            Operand::Immediate(value) => write!(f, "{}", value),
        }
    }
}

/// An operand in l-value position. Immediates are rejected when decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Register(RegisterRef),
    Memory(MemoryOperand),
}

impl Destination {
    pub fn parse(text: &str) -> Result<Destination> {
        match Operand::parse(text)? {
            Operand::Register(reg) => Ok(Destination::Register(reg)),
            Operand::Memory(mem) => Ok(Destination::Memory(mem)),
            Operand::Immediate(_) => Err(EmulatorError::InvalidDestination(text.trim().to_string())),
        }
    }

    /// Computes the concrete location against the current state.
    pub fn locate(&self, state: &CpuState) -> Location {
        match self {
            Destination::Register(reg) => Location::Register(*reg),
            Destination::Memory(mem) => Location::Memory {
                address: mem.address(state),
                width: mem.width,
            },
        }
    }

    pub fn width(&self) -> Width {
        match self {
            Destination::Register(reg) => reg.width,
            Destination::Memory(mem) => mem.width,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Register(reg) => write!(f, "{}", reg),
            Destination::Memory(mem) => write!(f, "{}", mem),
        }
    }
}

/// A resolved, writable place in the CPU state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    Register(RegisterRef),
    Memory { address: u64, width: Width },
}

impl Location {
    pub fn width(&self) -> Width {
        match self {
            Location::Register(reg) => reg.width,
            Location::Memory { width, .. } => *width,
        }
    }

    pub fn is_instruction_pointer(&self) -> bool {
        matches!(self, Location::Register(reg) if reg.id == RegisterId::Rip)
    }

    pub fn read(&self, state: &CpuState) -> u64 {
        match self {
            Location::Register(reg) => state.registers.read(*reg),
            Location::Memory { address, width } => state.memory.read_le(*address, width.bytes()),
        }
    }

    /// Registers are masked to the view's width; memory receives exactly
    /// `width` little-endian bytes.
    pub fn write(&self, state: &mut CpuState, value: u64) {
        match self {
            Location::Register(reg) => state.registers.write(*reg, value),
            Location::Memory { address, width } => {
                state.memory.write_le(*address, value, width.bytes())
            }
        }
    }
}

fn parse_memory(text: &str) -> Result<Option<MemoryOperand>> {
    let Some((keyword, rest)) = text.split_once(char::is_whitespace) else {
        return Ok(None);
    };
    let Some(width) = Width::from_keyword(keyword) else {
        return Ok(None);
    };
    let Some(rest) = rest.trim_start().strip_prefix("ptr") else {
        return Ok(None);
    };

    let unsupported = || EmulatorError::UnsupportedAddressingMode(text.to_string());
    let inner = rest
        .trim()
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .ok_or_else(unsupported)?;
    let (base, offset) = inner.split_once('-').ok_or_else(unsupported)?;

    Ok(Some(MemoryOperand {
        width,
        base: Box::new(parse_address_term(base).ok_or_else(unsupported)?),
        offset: Box::new(parse_address_term(offset).ok_or_else(unsupported)?),
    }))
}

// Each side of `A - B` must be a single register or immediate.
fn parse_address_term(text: &str) -> Option<Operand> {
    let term = text.trim();
    if let Some(reg) = RegisterRef::lookup(term) {
        return Some(Operand::Register(reg));
    }
    parse_immediate(term).ok().map(Operand::Immediate)
}

/// Parses a signed integer literal (decimal, `0x`, `0o` or `0b`, `_`
/// separators allowed) and wraps it to 64-bit two's complement.
pub fn parse_immediate(text: &str) -> Result<i64> {
    let malformed = || EmulatorError::MalformedImmediate(text.to_string());
    let literal = text.trim();

    let (negative, unsigned) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal.strip_prefix('+').unwrap_or(literal)),
    };
    let lowered = unsigned.to_ascii_lowercase();
    let (radix, digits) = if let Some(hex) = lowered.strip_prefix("0x") {
        (16, hex)
    } else if let Some(oct) = lowered.strip_prefix("0o") {
        (8, oct)
    } else if let Some(bin) = lowered.strip_prefix("0b") {
        (2, bin)
    } else {
        (10, lowered.as_str())
    };

    let digits: String = digits.chars().filter(|c| *c != '_').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(malformed());
    }
    let magnitude = u128::from_str_radix(&digits, radix).map_err(|_| malformed())?;

    let truncated = magnitude as u64;
    let value = if negative {
        truncated.wrapping_neg()
    } else {
        truncated
    };
    Ok(value as i64)
}
