//! Email processing pipeline.
//!
//! Every fetched message flows through:
//! 1. `MailSource::fetch()`: source-specific I/O
//! 2. `Pipeline::process_batch()`: dedup, normalize, extract, summarize, persist
//! 3. Optional knowledge sink page, with its reference written back
//!
//! `spawn_scheduler` repeats the whole run on an interval.

pub mod coordinator;
pub mod scheduler;
pub mod types;

pub use coordinator::{Pipeline, resolve_identity};
pub use scheduler::spawn_scheduler;
