use crate::assembler::Program;
use crate::config::DEFAULT_ENTRY_LABEL;
use crate::error::{EmulatorError, Result};
use crate::syscalls::{Kernel, Syscall};

/// Calls `main_label` and passes its return value to the exit syscall.
pub fn start_stub(kernel: Kernel, main_label: &str) -> String {
    format!(
        "{}:\nCALL {}\nMOV RDI, RAX\nMOV RAX, {}\nSYSCALL\n",
        DEFAULT_ENTRY_LABEL,
        main_label,
        kernel.number(Syscall::Exit)
    )
}

/// Returns `source` unchanged when it defines `_start`, otherwise appends a
/// start stub that calls `_main` (or `main`).
pub fn with_entry_point(source: &str, kernel: Kernel) -> Result<String> {
    let program = Program::parse(source);
    if program.label(DEFAULT_ENTRY_LABEL).is_some() {
        return Ok(String::from(source));
    }

    let main_label = ["_main", "main"]
        .into_iter()
        .find(|label| program.label(label).is_some())
        .ok_or_else(|| EmulatorError::MissingEntryPoint(String::from("main")))?;
    tracing::debug!("appending start stub calling '{}' for {}", main_label, kernel);

    let mut with_stub = String::from(source);
    if !with_stub.is_empty() && !with_stub.ends_with('\n') {
        with_stub.push('\n');
    }
    with_stub.push_str(&start_stub(kernel, main_label));
    Ok(with_stub)
}
