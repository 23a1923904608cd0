use std::fmt;

use crate::clock::{Clock, ClockError};

/// A CPU that retires one instruction per `execute_step` call.
pub trait CpuComponent: Send {
    type Error: From<ClockError>;

    fn halted(&self) -> bool;
    fn execute_step(&mut self) -> Result<(), Self::Error>;
}

/// Invoked after every retired instruction, before the next permit is requested.
pub type Observer<'a, T> = dyn FnMut(&T) + Send + 'a;

/// Drives a [`CpuComponent`] from a [`Clock`], one permit per instruction.
pub struct Cpu<T: CpuComponent> {
    inner: T,
    steps: u64,
}

impl<T: CpuComponent + fmt::Debug> fmt::Debug for Cpu<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("inner", &self.inner)
            .field("steps", &self.steps)
            .finish()
    }
}

impl<T: CpuComponent> Cpu<T> {
    pub fn new(cpu: T) -> Self {
        Cpu { inner: cpu, steps: 0 }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Executes exactly one instruction without consulting a clock. Returns
    /// `false` when the CPU had already halted.
    pub fn step(&mut self) -> Result<bool, T::Error> {
        if self.inner.halted() {
            return Ok(false);
        }
        self.inner.execute_step()?;
        self.steps += 1;
        Ok(true)
    }

    /// Runs until the CPU halts or an error (including a clock error) aborts
    /// the run. Returns the number of instructions retired by this call.
    pub async fn run(
        &mut self,
        clock: &mut dyn Clock,
        mut observer: Option<&mut Observer<'_, T>>,
    ) -> Result<u64, T::Error> {
        let start = self.steps;
        while !self.inner.halted() {
            clock.tick().await?;
            self.inner.execute_step()?;
            self.steps += 1;
            if let Some(observer) = observer.as_deref_mut() {
                observer(&self.inner);
            }
        }
        tracing::info!("cpu halted after {} step(s)", self.steps - start);
        Ok(self.steps - start)
    }
}
