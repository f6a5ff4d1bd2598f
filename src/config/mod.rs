//! Configuration types for task submission: `TaskConfig` per crawl task,
//! `GlobalConfig` shared across the process, plus a type-safe builder.

pub mod builder;
pub mod types;

pub use builder::{TaskConfigBuilder, WithEntry, WithName};
pub use types::{Cookie, GlobalConfig, TaskConfig};
