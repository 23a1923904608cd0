use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("file descriptor {0} is not open for writing")]
    UnknownDescriptor(u64),
    #[error("failed to write to file descriptor {fd}")]
    Write {
        fd: u64,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, IoError>;

pub type Sink = Box<dyn Write + Send>;
pub type ExitHandler = Box<dyn FnMut(i64) + Send>;

/// Host-side endpoints a guest program can reach through syscalls: writable
/// file descriptors and the process exit hook.
#[derive(Default)]
pub struct IoSinks {
    descriptors: BTreeMap<u64, Sink>,
    exit_handler: Option<ExitHandler>,
}

impl fmt::Debug for IoSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoSinks")
            .field("descriptors", &self.descriptors.keys().collect::<Vec<_>>())
            .field("exit_handler", &self.exit_handler.is_some())
            .finish()
    }
}

impl IoSinks {
    pub fn new() -> Self {
        Default::default()
    }

    /// Descriptor 1 wired to stdout and 2 to stderr.
    pub fn stdio() -> Self {
        Self::new()
            .with_descriptor(1, io::stdout())
            .with_descriptor(2, io::stderr())
    }

    pub fn with_descriptor(mut self, fd: u64, sink: impl Write + Send + 'static) -> Self {
        self.descriptors.insert(fd, Box::new(sink));
        self
    }

    pub fn on_exit(mut self, handler: impl FnMut(i64) + Send + 'static) -> Self {
        self.exit_handler = Some(Box::new(handler));
        self
    }

    pub fn is_open(&self, fd: u64) -> bool {
        self.descriptors.contains_key(&fd)
    }

    pub fn write_byte(&mut self, fd: u64, byte: u8) -> Result<()> {
        let sink = self
            .descriptors
            .get_mut(&fd)
            .ok_or(IoError::UnknownDescriptor(fd))?;
        sink.write_all(&[byte])
            .map_err(|source| IoError::Write { fd, source })
    }

    pub fn flush(&mut self, fd: u64) -> Result<()> {
        let sink = self
            .descriptors
            .get_mut(&fd)
            .ok_or(IoError::UnknownDescriptor(fd))?;
        sink.flush().map_err(|source| IoError::Write { fd, source })
    }

    pub fn exit(&mut self, code: i64) {
        match self.exit_handler.as_mut() {
            Some(handler) => handler(code),
            None => tracing::info!("guest exited with code {} (no exit handler)", code),
        }
    }
}

/// Cloneable in-memory sink; every clone appends to the same buffer.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "shared buffer poisoned"))?;
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
