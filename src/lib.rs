//! berth - build and installer orchestrator for the completion-engine host
//!
//! This crate configures and compiles the native engine core, then
//! conditionally fetches and builds the selected third-party language
//! backends.

pub mod archive;
pub mod build;
pub mod cache;
pub mod installers;
pub mod layout;
pub mod ops;
pub mod python;
pub mod util;

pub use layout::Layout;
pub use python::{Interpreter, Platform, ResolvedRuntime, RuntimeDescriptor};
