// Routine specialization: selector keys, generators and the code-generating map
pub mod codegen_map;
pub mod generator;
pub mod key;

pub use codegen_map::{CodeGenMap, CodeGenProducer, DEFAULT_ROUTINE_CAPACITY};
pub use generator::{
    ConstantFn, ConstantRoutine, EntryPoint, RoutineContext, RoutineGenerator, call_constant,
};
pub use key::{Selector, SelectorKey};
