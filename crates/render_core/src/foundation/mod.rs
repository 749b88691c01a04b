//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Math types and rotation hygiene
//! - Collections (bounded binding-slot tables, handle maps)
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod logging;
