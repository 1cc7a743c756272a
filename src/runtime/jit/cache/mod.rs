// Specialization caching and usage statistics
pub mod function_cache;
pub mod metadata;
pub mod report;

pub use function_cache::{Producer, SpecializationCache};
pub use metadata::{SpecializationRecord, UNSEEN_FRAME};
pub use report::ReportRow;
