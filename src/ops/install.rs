//! The install operation: build the engine core, then install the selected
//! backends.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::build::{ensure_core_library_not_in_use, BuildOptions, BuildPipeline, ProcessRunner};
use crate::installers::{Backend, InstallContext};
use crate::layout::Layout;
use crate::python::Interpreter;
use crate::util::process::{first_existing_executable, require_executable};

/// Everything the install operation needs, assembled by the CLI layer.
pub struct InstallOptions {
    /// Backends to install, in [`Backend::ALL`] order.
    pub backends: Vec<Backend>,
    pub build: BuildOptions,
    /// Interpreter to build against; discovered on PATH when unset.
    pub python: Option<PathBuf>,
    pub skip_build: bool,
}

pub fn execute(layout: &Layout, opts: &InstallOptions) -> Result<()> {
    layout.check_third_party_populated()?;

    if !opts.skip_build {
        build_engine_core(layout, opts)?;
    }

    let ctx = InstallContext {
        layout,
        quiet: opts.build.quiet,
        ci: opts.build.ci,
    };

    for backend in &opts.backends {
        backend.install(&ctx)?;
    }

    Ok(())
}

fn build_engine_core(layout: &Layout, opts: &InstallOptions) -> Result<()> {
    ensure_core_library_not_in_use(layout)?;

    let python = match opts.python.clone() {
        Some(python) => python,
        None => match first_existing_executable(["python3", "python"]) {
            Some(python) => python,
            None => bail!("unable to find a Python interpreter on PATH"),
        },
    };

    let interpreter = Interpreter::probe(&python)?;

    if !opts.build.quiet {
        println!(
            "Searching Python {}.{} libraries...",
            interpreter.major, interpreter.minor
        );
    }

    let runtime = interpreter.resolve_runtime()?;

    if !opts.build.quiet {
        println!("Found Python library: {}", runtime.library.display());
        println!(
            "Found Python headers folder: {}",
            runtime.include_dir.display()
        );
    }

    let cmake = require_executable("cmake", "cmake is required to build the engine core.")?;

    BuildPipeline::new(&opts.build, layout, cmake, &ProcessRunner).run(&runtime)?;

    layout.write_build_marker(&interpreter.executable)?;
    Ok(())
}
