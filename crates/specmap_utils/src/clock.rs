use std::time::Instant;

use once_cell::sync::Lazy;

/// Ticks per second reported by [`ticks`].
pub const TICK_FREQUENCY: u64 = 1_000_000_000;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic tick counter, in nanoseconds since the first call in this process.
pub fn ticks() -> u64 {
    u64::try_from(EPOCH.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Stopwatch measuring elapsed ticks for a single routine invocation.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: u64,
}

impl Stopwatch {
    pub fn start_new() -> Self {
        Self { start: ticks() }
    }

    pub fn elapsed_ticks(&self) -> u64 {
        ticks().saturating_sub(self.start)
    }
}
