//! Per-backend install recipes.
//!
//! Each backend is a short recipe: locate the external tool, run its build
//! or install command in the backend's vendored directory. The orchestrator
//! iterates [`Backend::ALL`] once and installs every selected backend, so
//! adding a backend never touches orchestration logic.

mod cs;
mod go;
mod java;
mod js;
mod rust;

use anyhow::Result;

use crate::layout::Layout;
use crate::util::process::ProcessBuilder;

/// Shared state every install recipe needs.
pub struct InstallContext<'a> {
    pub layout: &'a Layout,
    pub quiet: bool,
    pub ci: bool,
}

/// A supported completion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    CSharp,
    Go,
    JavaScript,
    Rust,
    Java,
}

impl Backend {
    /// Every supported backend, in install order.
    pub const ALL: [Backend; 5] = [
        Backend::CSharp,
        Backend::Go,
        Backend::JavaScript,
        Backend::Rust,
        Backend::Java,
    ];

    /// The source language this backend completes.
    pub fn language(&self) -> &'static str {
        match self {
            Backend::CSharp => "C#",
            Backend::Go => "Go",
            Backend::JavaScript => "JavaScript",
            Backend::Rust => "Rust",
            Backend::Java => "Java",
        }
    }

    /// Run this backend's install recipe.
    pub fn install(&self, ctx: &InstallContext<'_>) -> Result<()> {
        tracing::info!("installing {} backend", self.language());
        match self {
            Backend::CSharp => cs::install(ctx),
            Backend::Go => go::install(ctx),
            Backend::JavaScript => js::install(ctx),
            Backend::Rust => rust::install(ctx),
            Backend::Java => java::install(ctx),
        }
    }
}

/// Run one recipe command, honoring quiet mode.
fn run_step(ctx: &InstallContext<'_>, builder: ProcessBuilder, status: &str) -> Result<()> {
    if ctx.quiet {
        builder.run_quiet(status)?;
    } else {
        builder.run()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_backends_listed_once() {
        let mut seen = Backend::ALL.to_vec();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_languages() {
        assert_eq!(Backend::CSharp.language(), "C#");
        assert_eq!(Backend::Java.language(), "Java");
    }
}
