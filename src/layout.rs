//! Project directory bookkeeping.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::util::fs::write_string;

/// Name of the marker file recording which interpreter performed the build.
pub const BUILD_MARKER_FILE: &str = "PYTHON_USED_DURING_BUILDING";

/// Paths of the checkout berth operates on.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Use the given directory as the project root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Layout { root: root.into() }
    }

    /// Use the current working directory as the project root.
    pub fn discover() -> Result<Self> {
        let root = std::env::current_dir().context("failed to determine current directory")?;
        Ok(Layout::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the vendored third-party backends.
    pub fn third_party(&self) -> PathBuf {
        self.root.join("third_party")
    }

    /// Directory of a single vendored backend.
    pub fn backend_dir(&self, name: &str) -> PathBuf {
        self.third_party().join(name)
    }

    /// Source directory of the native engine core.
    pub fn native_source_dir(&self) -> PathBuf {
        self.root.join("cpp")
    }

    /// The built core library on Windows, used for the in-use check.
    pub fn core_library_artifact(&self) -> PathBuf {
        self.root.join("engine_core.pyd")
    }

    pub fn build_marker(&self) -> PathBuf {
        self.root.join(BUILD_MARKER_FILE)
    }

    /// Record which interpreter executable performed a successful build.
    pub fn write_build_marker(&self, python: &Path) -> Result<()> {
        write_string(&self.build_marker(), &python.display().to_string())
    }

    /// Fail if any vendored backend directory is empty, which means the
    /// submodules were never initialized.
    pub fn check_third_party_populated(&self) -> Result<()> {
        let third_party = self.third_party();
        if !third_party.is_dir() {
            return Ok(());
        }

        for entry in std::fs::read_dir(&third_party)
            .with_context(|| format!("failed to read {}", third_party.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() && std::fs::read_dir(&path)?.next().is_none() {
                bail!(
                    "some folders in {} are empty; you probably forgot to run:\n\
                     \tgit submodule update --init --recursive",
                    third_party.display()
                );
            }
        }

        Ok(())
    }
}
