//! Utility modules for the asset pipeline and audit harness.

pub mod exec;
pub mod fs;
pub mod glob;
pub mod minify;
pub mod purge;
