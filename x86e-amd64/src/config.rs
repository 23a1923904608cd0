use crate::syscalls::Kernel;

/// Top of the memory store and the initial `rsp`.
pub const DEFAULT_MEMORY_SIZE: u64 = 1023;
pub const DEFAULT_ENTRY_LABEL: &str = "_start";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachineConfig {
    pub kernel: Kernel,
    pub trace_instructions: bool,
    pub memory_size: u64,
    pub entry_label: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            kernel: Kernel::default(),
            trace_instructions: false,
            memory_size: DEFAULT_MEMORY_SIZE,
            entry_label: String::from(DEFAULT_ENTRY_LABEL),
        }
    }
}

impl MachineConfig {
    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_trace_instructions(mut self, trace: bool) -> Self {
        self.trace_instructions = trace;
        self
    }

    pub fn with_memory_size(mut self, memory_size: u64) -> Self {
        self.memory_size = memory_size;
        self
    }

    pub fn with_entry_label(mut self, label: impl Into<String>) -> Self {
        self.entry_label = label.into();
        self
    }
}
