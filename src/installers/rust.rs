//! Rust backend: build racerd with cargo.

use anyhow::Result;

use super::{run_step, InstallContext};
use crate::util::process::{require_executable, ProcessBuilder};

pub(crate) fn install(ctx: &InstallContext<'_>) -> Result<()> {
    let cargo = require_executable("cargo", "cargo is required for the Rust backend.")?;

    let mut builder = ProcessBuilder::new(cargo)
        .arg("build")
        .cwd(ctx.layout.backend_dir("racerd"));

    // A release build is 2.5x slower and CI does not care about the speed of
    // the produced binary.
    if !ctx.ci {
        builder = builder.arg("--release");
    }

    run_step(ctx, builder, "Building racerd for Rust completion")
}
