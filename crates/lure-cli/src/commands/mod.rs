pub mod backup;
pub mod common;
pub mod completions;
pub mod config;
pub mod conflicts;
pub mod draft;
pub mod queue;
pub mod save;
