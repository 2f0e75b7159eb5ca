//! Go backend: build gocode for completion and godef for definitions.

use anyhow::Result;

use super::{run_step, InstallContext};
use crate::util::process::{require_executable, ProcessBuilder};

pub(crate) fn install(ctx: &InstallContext<'_>) -> Result<()> {
    let go = require_executable("go", "go is required to build gocode.")?;

    run_step(
        ctx,
        ProcessBuilder::new(&go)
            .arg("build")
            .cwd(ctx.layout.backend_dir("gocode")),
        "Building gocode for Go completion",
    )?;

    run_step(
        ctx,
        ProcessBuilder::new(&go)
            .args(["build", "godef.go"])
            .cwd(ctx.layout.backend_dir("godef")),
        "Building godef for Go definitions",
    )
}
