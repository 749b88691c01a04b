//! Backend implementations for the render module
//!
//! Only the headless backend ships with the core; graphics API backends
//! implement the traits in [`crate::render::api`] outside this crate.

/// In-memory backend used by tests and the demo
pub mod headless;

pub use headless::{DrawCall, HeadlessBackend, HeadlessStats, UploadedBuffer};
