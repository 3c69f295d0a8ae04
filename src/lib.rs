//! mailbrief: email normalization, heuristic extraction and summarization.

pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod store;
pub mod summarize;
