//! Log processing for logscope
//!
//! This crate provides the bounded line buffer and the read-only
//! classification and filtering pipeline over it.

mod buffer;
mod filter;

pub use buffer::{LogBuffer, MAX_LINES};
pub use filter::{LevelCounts, LogFilter, classify, filter, level_counts};

// Re-export types used in our public API
pub use logscope_types::{LevelFilter, Severity};
