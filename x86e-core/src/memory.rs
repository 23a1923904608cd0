use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

/// Byte-addressable, growable guest memory. Any address may be written;
/// addresses that were never written read as zero. Multi-byte values are
/// little-endian.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Memory {
    cells: BTreeMap<u64, u8>,
    size: u64,
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Memory[size: 0x{:X}, touched: {}]",
            self.size,
            self.cells.len()
        )
    }
}

impl Memory {
    pub fn new(size: u64) -> Self {
        Self {
            cells: BTreeMap::new(),
            size,
        }
    }

    /// Nominal size of the store; also the address the stack grows down from.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn read_u8(&self, address: u64) -> u8 {
        self.cells.get(&address).copied().unwrap_or(0)
    }

    pub fn read(&self, address: u64, length: usize) -> Bytes {
        let data: Vec<u8> = (0..length as u64)
            .map(|offset| self.read_u8(address.wrapping_add(offset)))
            .collect();
        Bytes::from(data)
    }

    /// Reads `width` bytes (at most 8) starting at `address` as a
    /// little-endian value.
    pub fn read_le(&self, address: u64, width: usize) -> u64 {
        let mut value: u64 = 0;
        for offset in 0..width.min(8) {
            let byte = self.read_u8(address.wrapping_add(offset as u64));
            value |= (byte as u64) << (offset * 8);
        }
        value
    }

    pub fn write_u8(&mut self, address: u64, value: u8) {
        self.cells.insert(address, value);
        if address >= self.size {
            self.size = address.saturating_add(1);
        }
    }

    pub fn write(&mut self, address: u64, data: &[u8]) {
        for (offset, byte) in data.iter().enumerate() {
            self.write_u8(address.wrapping_add(offset as u64), *byte);
        }
    }

    /// Writes the low `width` bytes (at most 8) of `value` little-endian.
    pub fn write_le(&mut self, address: u64, value: u64, width: usize) {
        let bytes = value.to_le_bytes();
        self.write(address, &bytes[..width.min(8)]);
    }

    /// Every written cell in address order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u8)> + '_ {
        self.cells.iter().map(|(address, byte)| (*address, *byte))
    }

    pub fn touched(&self) -> usize {
        self.cells.len()
    }
}
