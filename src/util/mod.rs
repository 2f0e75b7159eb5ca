//! Shared utilities.

pub mod fs;
pub mod hash;
pub mod process;
pub mod shell;
