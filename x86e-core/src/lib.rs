pub mod clock;
pub mod cpu;
pub mod io;
pub mod memory;

pub use crate::clock::{Clock, ClockError, FreeRunningClock, GatedClock, GatedClockRef, OscillatorClock};
pub use crate::cpu::{Cpu, CpuComponent, Observer};
pub use crate::io::{IoError, IoSinks, SharedBuffer};
pub use crate::memory::Memory;
