//! Utility modules

pub mod paths;
pub mod tools;

pub use paths::{find_by_prefix, is_partial_file, prepare_scratch_dir, remove_by_prefix};
pub use tools::{Tool, ToolAvailability, ToolStatus};
