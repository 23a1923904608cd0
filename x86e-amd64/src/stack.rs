use crate::cpu::CpuState;
use crate::registers::RegisterId;

/// Every stack slot is a full quadword regardless of operand width.
pub const SLOT_SIZE: u64 = 8;

impl CpuState {
    pub fn push(&mut self, value: u64) {
        let sp = self.registers.get(RegisterId::Rsp).wrapping_sub(SLOT_SIZE);
        self.registers.set(RegisterId::Rsp, sp);
        self.memory.write_le(sp, value, SLOT_SIZE as usize);
    }

    pub fn pop(&mut self) -> u64 {
        let sp = self.registers.get(RegisterId::Rsp);
        let value = self.memory.read_le(sp, SLOT_SIZE as usize);
        self.registers.set(RegisterId::Rsp, sp.wrapping_add(SLOT_SIZE));
        value
    }
}
