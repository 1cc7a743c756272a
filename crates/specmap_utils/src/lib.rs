pub mod clock;
pub mod logger;

pub use clock::{Stopwatch, TICK_FREQUENCY, ticks};
