// JIT Runtime System Module
pub mod cache;
pub mod code_buffer;
pub mod profiling;
pub mod specialization;

pub use cache::{Producer, ReportRow, SpecializationCache, SpecializationRecord};
pub use code_buffer::{CodeBuffer, CodeBufferError, ExecutableArena};
pub use profiling::{NoopAgent, PerfMapAgent, ProfilingAgent};
pub use specialization::{
    CodeGenMap, CodeGenProducer, EntryPoint, RoutineGenerator, Selector, SelectorKey,
};
