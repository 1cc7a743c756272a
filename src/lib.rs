//! Specialization cache for dynamically generated routines.
//!
//! A [`SpecializationCache`] maps selector keys to routines, producing each
//! routine once and collecting per-key usage statistics; a
//! [`CodeGenProducer`] fills it with machine code emitted into an
//! [`ExecutableArena`].

pub mod cli;
pub mod config;
pub mod runtime;

pub use config::{ConfigError, MapConfig};
pub use runtime::jit::{
    CodeBuffer, CodeBufferError, CodeGenMap, CodeGenProducer, EntryPoint, ExecutableArena,
    NoopAgent, PerfMapAgent, Producer, ProfilingAgent, ReportRow, RoutineGenerator, Selector,
    SelectorKey, SpecializationCache, SpecializationRecord,
};
