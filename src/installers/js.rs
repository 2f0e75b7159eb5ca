//! JavaScript backend: install the Tern runtime with npm.
//!
//! Tern is installed into a dedicated runtime directory rather than a
//! submodule checkout so that users can add third-party Tern plugins to the
//! runtime's node_modules without clobbering the vendored sources.

use anyhow::{bail, Result};

use super::{run_step, InstallContext};
use crate::util::process::{first_existing_executable, require_executable, ProcessBuilder};

pub(crate) fn install(ctx: &InstallContext<'_>) -> Result<()> {
    // On Debian-based distributions node is installed as nodejs by default.
    if first_existing_executable(["nodejs", "node"]).is_none() {
        bail!("node is required to set up Tern.");
    }
    let npm = require_executable("npm", "npm is required to set up Tern.")?;

    let builder = ProcessBuilder::new(npm)
        .args(["install", "--production"])
        .cwd(ctx.layout.backend_dir("tern_runtime"));

    run_step(ctx, builder, "Setting up Tern for JavaScript completion")
}
