//! Configuration loading.
//!
//! This module loads the monitor settings from the `.pipewatch/` directory
//! and applies environment overrides.

pub mod error;
pub mod loader;
