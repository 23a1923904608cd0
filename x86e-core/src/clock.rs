use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock was cancelled, no further steps will be granted")]
    Cancelled,
    #[error("no step permit was posted within {0:?}")]
    TimedOut(Duration),
}

pub type Result<T> = std::result::Result<T, ClockError>;

/// Supplies step permits to a CPU. Awaiting `tick` is the only point at which
/// a running CPU yields.
#[async_trait]
pub trait Clock: Send {
    async fn tick(&mut self) -> Result<()>;
}

/// Grants every permit immediately, for running a program to completion.
#[derive(Debug, Default)]
pub struct FreeRunningClock;

#[async_trait]
impl Clock for FreeRunningClock {
    async fn tick(&mut self) -> Result<()> {
        Ok(())
    }
}

impl FreeRunningClock {
    pub fn new() -> Self {
        Self
    }
}

/// Grants one permit per message posted through a [`GatedClockRef`]. Posted
/// permits queue without bound and are drained one per step.
#[derive(Debug)]
pub struct GatedClock {
    permits: async_channel::Receiver<()>,
    timeout: Option<Duration>,
}

#[async_trait]
impl Clock for GatedClock {
    async fn tick(&mut self) -> Result<()> {
        let recv = self.permits.recv();
        let res = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, recv)
                .await
                .map_err(|_| ClockError::TimedOut(limit))?,
            None => recv.await,
        };
        res.map_err(|_| ClockError::Cancelled)
    }
}

impl GatedClock {
    pub fn create() -> (GatedClock, GatedClockRef) {
        let (sender, receiver) = async_channel::unbounded();
        let clock = Self {
            permits: receiver,
            timeout: None,
        };
        (clock, GatedClockRef { sender })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Handle used by an external actor (a debugger, a test) to post permits.
#[derive(Clone, Debug)]
pub struct GatedClockRef {
    sender: async_channel::Sender<()>,
}

impl GatedClockRef {
    pub fn step(&self) -> Result<()> {
        self.sender
            .try_send(())
            .map_err(|_| ClockError::Cancelled)
    }

    pub fn step_many(&self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.step()?;
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    pub fn cancel(&self) {
        if self.sender.close() {
            tracing::info!("gated clock cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Grants permits at a fixed frequency, correcting for drift against the
/// expected elapsed time since the first tick.
#[derive(Debug)]
pub struct OscillatorClock {
    cycles: u64,
    frequency_hz: u64,
    period: Duration,
    start_time: Option<Instant>,
}

#[async_trait]
impl Clock for OscillatorClock {
    async fn tick(&mut self) -> Result<()> {
        let start_time = *self.start_time.get_or_insert_with(Instant::now);
        self.cycles += 1;

        let expected_elapsed = self.period.mul_f64(self.cycles as f64);
        let deadline = start_time + expected_elapsed;
        tokio::time::sleep_until(deadline).await;

        tracing::trace!(
            "tick: {} | total: {}s",
            self.cycles,
            (Instant::now() - start_time).as_secs_f32()
        );
        Ok(())
    }
}

impl OscillatorClock {
    pub fn new(frequency_hz: u64) -> Self {
        let freq = frequency_hz.max(1);
        tracing::info!("starting oscillator at {}hz", freq);
        Self {
            cycles: 0,
            frequency_hz: freq,
            period: Duration::from_secs_f64(1.0 / freq as f64),
            start_time: None,
        }
    }

    pub fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
