use std::collections::HashMap;
use std::hash::Hash;
use std::ptr::NonNull;

use ahash::RandomState;
use tracing::{debug, trace};

use super::generator::{EntryPoint, RoutineGenerator};
use super::key::SelectorKey;
use crate::config::MapConfig;
use crate::runtime::jit::cache::{Producer, SpecializationCache};
use crate::runtime::jit::code_buffer::{CodeBuffer, ExecutableArena};
use crate::runtime::jit::profiling::{NoopAgent, PerfMapAgent, ProfilingAgent};

/// Default per-routine code budget, in bytes.
pub const DEFAULT_ROUTINE_CAPACITY: usize = 8192;

/// Specialization cache whose routines are generated machine code.
pub type CodeGenMap<G, B = ExecutableArena> =
    SpecializationCache<<G as RoutineGenerator>::Key, EntryPoint, CodeGenProducer<G, B>>;

/// Producer emitting one routine per key into a shared code buffer.
///
/// Keeps its own key to entry point table, so a key whose cache record was
/// dropped gets its existing code back instead of a second copy.
pub struct CodeGenProducer<G: RoutineGenerator, B = ExecutableArena> {
    name: String,
    context: G::Context,
    generated: HashMap<G::Key, EntryPoint, RandomState>,
    buffer: B,
    agent: Box<dyn ProfilingAgent>,
    routine_capacity: usize,
    total_code_size: usize,
}

impl<G: RoutineGenerator, B> CodeGenProducer<G, B> {
    pub fn new(name: impl Into<String>, context: G::Context, buffer: B) -> Self {
        Self {
            name: name.into(),
            context,
            generated: HashMap::default(),
            buffer,
            agent: Box::new(NoopAgent),
            routine_capacity: DEFAULT_ROUTINE_CAPACITY,
            total_code_size: 0,
        }
    }

    /// Set the code budget every routine must stay strictly below.
    pub fn with_routine_capacity(mut self, routine_capacity: usize) -> Self {
        self.routine_capacity = routine_capacity;
        self
    }

    pub fn with_agent(mut self, agent: Box<dyn ProfilingAgent>) -> Self {
        self.agent = agent;
        self
    }

    /// Wrap the producer in a cache named after it.
    pub fn into_map(self) -> CodeGenMap<G, B> {
        let name = self.name.clone();
        SpecializationCache::with_name(name, self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &G::Context {
        &self.context
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn routine_capacity(&self) -> usize {
        self.routine_capacity
    }

    /// Bytes of machine code emitted across all keys.
    pub fn total_code_size(&self) -> usize {
        self.total_code_size
    }

    pub fn generated_count(&self) -> usize {
        self.generated.len()
    }
}

impl<G: RoutineGenerator> CodeGenProducer<G, ExecutableArena> {
    /// Producer over a fresh executable arena, sized and instrumented from `config`.
    pub fn from_config(name: impl Into<String>, context: G::Context, config: &MapConfig) -> Self {
        let producer = Self::new(name, context, ExecutableArena::new(config.arena_block_size))
            .with_routine_capacity(config.routine_capacity);

        if config.perf_map {
            producer.with_agent(Box::new(PerfMapAgent::for_current_process()))
        } else {
            producer
        }
    }
}

impl<G, B> CodeGenProducer<G, B>
where
    G: RoutineGenerator,
    G::Key: Eq + Hash,
{
    /// Entry point already emitted for `key`, if any.
    pub fn generated(&self, key: &G::Key) -> Option<EntryPoint> {
        self.generated.get(key).copied()
    }
}

impl<G, B> Producer<G::Key, EntryPoint> for CodeGenProducer<G, B>
where
    G: RoutineGenerator,
    G::Key: SelectorKey + Clone,
    B: CodeBuffer,
{
    fn produce(&mut self, key: &G::Key) -> EntryPoint {
        if let Some(&entry) = self.generated.get(key) {
            return entry;
        }

        let capacity = self.routine_capacity;
        let code = self.buffer.reserve(capacity).unwrap_or_else(|err| {
            panic!("{}: cannot reserve {capacity} bytes of code: {err}", self.name)
        });
        let base = NonNull::from(&mut *code).cast::<u8>();

        let routine = G::generate(&self.context, key, code);
        let size = routine.size();

        assert!(
            size < capacity,
            "{}: routine for key {:016x} needs {size} bytes, capacity is {capacity}",
            self.name,
            key.bits()
        );

        self.total_code_size += size;

        if let Err(err) = self.buffer.commit(size) {
            panic!("{}: cannot commit {size} bytes of code: {err}", self.name);
        }

        let offset = routine.entry_offset();
        assert!(offset < capacity, "{}: entry offset {offset} outside the code region", self.name);
        // SAFETY: `offset` is inside the reserved region starting at `base`.
        let entry = EntryPoint::new(unsafe { base.add(offset) });

        trace!(
            map = %self.name,
            location = ?entry.as_ptr(),
            size,
            key = %format!("{:016x}", key.bits()),
            "generated routine"
        );

        self.generated.insert(key.clone(), entry);

        if self.agent.is_active() {
            let method = format!("{}<{:016x}>()", self.name, key.bits());
            self.agent.notify_method_loaded(&method, entry.as_ptr(), size);
        }

        entry
    }
}

impl<G: RoutineGenerator, B> Drop for CodeGenProducer<G, B> {
    fn drop(&mut self) {
        debug!(
            "{} generated {} bytes of instruction",
            self.name, self.total_code_size
        );
    }
}
